use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Conflict,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            400 | 422 => ErrorCode::Validation,
            _ => ErrorCode::Internal,
        }
    }

    pub fn is_auth(self) -> bool {
        matches!(self, ErrorCode::Unauthorized | ErrorCode::Forbidden)
    }
}

/// Error body the backend sends on failed requests (`{"message": ...}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ApiErrorBody {
    /// Best human message from a raw response body: JSON `message`/`error`
    /// fields first, then the plain text itself.
    pub fn message_from(raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(body) = serde_json::from_str::<ApiErrorBody>(raw) {
            if let Some(message) = body.message.or(body.error) {
                let message = message.trim().to_string();
                if !message.is_empty() {
                    return Some(message);
                }
            }
            if raw.starts_with('{') {
                return None;
            }
        }
        Some(raw.to_string())
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_response(status: u16, raw_body: &str) -> Self {
        let code = ErrorCode::from_status(status);
        let message =
            ApiErrorBody::message_from(raw_body).unwrap_or_else(|| format!("HTTP {status}"));
        Self::new(code, message)
    }
}
