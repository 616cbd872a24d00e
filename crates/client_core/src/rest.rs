use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use shared::{
    domain::{Domain, NewUser, UserRecord},
    error::{error_message, parse_body, DEFAULT_ERROR_MESSAGE},
    protocol::{UserListQuery, USER_GET_PATH, USER_POST_PATH},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RestError {
    #[error("backend address is not configured")]
    MissingBaseUrl,
    #[error("request to {path} failed: {source}")]
    Transport {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{message}")]
    Status { status: StatusCode, message: String },
}

/// HTTP client for the REST user store.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(Client::new(), base_url)
    }

    pub fn with_http(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lists users for `domain`. A body whose `data` is not an array yields an
    /// empty list rather than an error.
    pub async fn fetch_users(&self, domain: Domain) -> Result<Vec<UserRecord>, RestError> {
        let url = self.url(USER_GET_PATH)?;
        let body = self
            .send(
                USER_GET_PATH,
                self.http.get(url).query(&UserListQuery { domain }),
            )
            .await?;
        let users = users_from_body(&body);
        debug!(%domain, count = users.len(), "rest: fetched users");
        Ok(users)
    }

    pub async fn create_user(&self, user: &NewUser) -> Result<Value, RestError> {
        let url = self.url(USER_POST_PATH)?;
        let body = self
            .send(USER_POST_PATH, self.http.post(url).json(user))
            .await?;
        debug!(domain = %user.domain, "rest: created user");
        Ok(body)
    }

    fn url(&self, path: &str) -> Result<String, RestError> {
        if self.base_url.trim().is_empty() {
            return Err(RestError::MissingBaseUrl);
        }
        Ok(format!("{}{path}", self.base_url))
    }

    async fn send(&self, path: &'static str, request: RequestBuilder) -> Result<Value, RestError> {
        let response = request
            .send()
            .await
            .map_err(|source| RestError::Transport { path, source })?;
        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|source| RestError::Transport { path, source })?;
        let body = parse_body(&raw);

        if !status.is_success() {
            let message =
                error_message(&body).unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
            warn!(path, status = status.as_u16(), %message, "rest: request failed");
            return Err(RestError::Status { status, message });
        }

        Ok(body)
    }
}

fn users_from_body(body: &Value) -> Vec<UserRecord> {
    let Some(entries) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(%err, "rest: skipping malformed user record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/rest_tests.rs"]
mod tests;
