use std::sync::Arc;

use serde_json::Value;
use shared::domain::{Domain, NewUser, UserForm, ValidationError};
use thiserror::Error;
use tracing::{info, warn};

use crate::{realtime::RealtimeStore, rest::RestError, rest::RestClient};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to add user: {0}")]
    Rest(#[from] RestError),
}

/// Outcome of the second (realtime) write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeWrite {
    Stored { id: String },
    /// The REST store holds the record but the realtime store does not. Not
    /// rolled back or retried.
    Diverged { reason: String },
}

#[derive(Debug, Clone)]
pub struct SubmitReport {
    pub user: NewUser,
    pub rest_response: Value,
    pub realtime: RealtimeWrite,
}

impl SubmitReport {
    pub fn is_diverged(&self) -> bool {
        matches!(self.realtime, RealtimeWrite::Diverged { .. })
    }
}

/// Writes one submission to both stores: REST first, realtime only after the
/// REST write succeeded. The two records are not linked.
#[derive(Clone)]
pub struct DualWriteCoordinator {
    rest: RestClient,
    realtime: Arc<dyn RealtimeStore>,
}

impl DualWriteCoordinator {
    pub fn new(rest: RestClient, realtime: Arc<dyn RealtimeStore>) -> Self {
        Self { rest, realtime }
    }

    pub async fn submit(
        &self,
        form: &UserForm,
        domain: Domain,
    ) -> Result<SubmitReport, SubmitError> {
        let user = form.validate(domain)?;

        let rest_response = self.rest.create_user(&user).await?;

        let realtime = match self.realtime.insert_user(&user).await {
            Ok(id) => RealtimeWrite::Stored { id },
            Err(err) => {
                warn!(
                    domain = %user.domain,
                    error = %err,
                    "dual-write: realtime insert failed after REST create; stores diverged"
                );
                RealtimeWrite::Diverged {
                    reason: err.to_string(),
                }
            }
        };
        info!(
            domain = %user.domain,
            diverged = matches!(realtime, RealtimeWrite::Diverged { .. }),
            "dual-write: submitted user"
        );

        Ok(SubmitReport {
            user,
            rest_response,
            realtime,
        })
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;
