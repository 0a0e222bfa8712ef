use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body the backend returns alongside non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiException {
    pub status: u16,
    pub message: String,
}

impl ApiException {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Builds the exception from a raw response body, preferring the `detail`
    /// field when the body is the backend's error shape.
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ApiErrorBody>(body)
            .map(|parsed| parsed.detail)
            .unwrap_or_else(|_| body.trim().to_string());
        Self::new(status, message)
    }
}
