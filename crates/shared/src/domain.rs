use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filter value partitioning users into named groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Domain {
    #[default]
    #[serde(rename = "a.shop.com")]
    AShop,
    #[serde(rename = "b.shop.com")]
    BShop,
}

impl Domain {
    pub const ALL: [Domain; 2] = [Domain::AShop, Domain::BShop];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::AShop => "a.shop.com",
            Domain::BShop => "b.shop.com",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown domain '{0}'; expected one of a.shop.com, b.shop.com")]
pub struct UnknownDomain(pub String);

impl FromStr for Domain {
    type Err = UnknownDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Domain::ALL
            .into_iter()
            .find(|domain| domain.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownDomain(trimmed.to_string()))
    }
}

/// Write payload shared by both stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub domain: Domain,
}

/// A stored user. Identifiers are assigned by the owning store and are never
/// comparable across stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UserRecordWire")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub domain: Domain,
}

/// REST documents may carry `id`, `_id` or both; `id` wins when non-empty.
#[derive(Deserialize)]
struct UserRecordWire {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "_id")]
    mongo_id: Option<String>,
    name: String,
    email: String,
    domain: Domain,
}

impl From<UserRecordWire> for UserRecord {
    fn from(wire: UserRecordWire) -> Self {
        let id = wire
            .id
            .filter(|id| !id.is_empty())
            .or(wire.mongo_id)
            .unwrap_or_default();
        Self {
            id,
            name: wire.name,
            email: wire.email,
            domain: wire.domain,
        }
    }
}

impl UserRecord {
    pub fn from_new(id: impl Into<String>, user: NewUser) -> Self {
        Self {
            id: id.into(),
            name: user.name,
            email: user.email,
            domain: user.domain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please enter both name and email")]
    MissingNameOrEmail,
}

/// Raw form input as typed by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserForm {
    pub name: String,
    pub email: String,
}

impl UserForm {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Checks trimmed emptiness only; the payload keeps the values as typed.
    pub fn validate(&self, domain: Domain) -> Result<NewUser, ValidationError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(ValidationError::MissingNameOrEmail);
        }
        Ok(NewUser {
            name: self.name.clone(),
            email: self.email.clone(),
            domain,
        })
    }

    pub fn clear(&mut self) {
        self.name.clear();
        self.email.clear();
    }
}
