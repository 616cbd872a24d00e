use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

/// `error` field of a backend error body. Backends send either a bare string
/// or a `{ code, message }` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Structured {
        #[serde(default)]
        code: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail::Text(message.into()),
        }
    }

    pub fn message(&self) -> &str {
        match &self.error {
            ErrorDetail::Text(message) => message,
            ErrorDetail::Structured { message, .. } => message,
        }
    }
}

/// Parses a response body, wrapping text that is not JSON into an
/// error-shaped object instead of failing.
pub fn parse_body(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "error": raw }))
}

/// Extracts the server-provided error message from a parsed body, if any.
pub fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    serde_json::from_value::<ErrorDetail>(error.clone())
        .ok()
        .map(|detail| ErrorBody { error: detail }.message().to_string())
        .filter(|message| !message.trim().is_empty())
}
