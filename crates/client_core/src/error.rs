use shared::{domain::Role, error::ApiError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Auth,
    Permission,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the backend (is it running and is the URL right?): {0}")]
    Network(#[source] reqwest::Error),
    #[error("not authorized (token invalid or expired, HTTP {status})")]
    Unauthorized { status: u16 },
    #[error("endpoint {endpoint} not found (404)")]
    NotFound { endpoint: String },
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Validation(String),
    #[error("invalid email or password")]
    InvalidLogin,
    #[error("not logged in")]
    NotAuthenticated,
    #[error("{required} role required")]
    PermissionDenied { required: Role },
    #[error("unexpected response body: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("invalid API base url '{url}': {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("credential store failure: {0:#}")]
    Credential(anyhow::Error),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    pub(crate) fn from_response(status: u16, endpoint: &str, raw_body: &str) -> Self {
        match status {
            401 | 403 => ClientError::Unauthorized { status },
            404 => ClientError::NotFound {
                endpoint: endpoint.to_string(),
            },
            _ => ClientError::Http {
                status,
                message: ApiError::from_response(status, raw_body).message,
            },
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Unauthorized { .. } | ClientError::NotAuthenticated => ErrorCategory::Auth,
            ClientError::PermissionDenied { .. } => ErrorCategory::Permission,
            ClientError::Network(_) => ErrorCategory::Transport,
            ClientError::Validation(_) | ClientError::InvalidLogin => ErrorCategory::Validation,
            ClientError::NotFound { .. }
            | ClientError::Http { .. }
            | ClientError::Decode(_)
            | ClientError::BaseUrl { .. }
            | ClientError::Credential(_) => ErrorCategory::Unknown,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category() == ErrorCategory::Auth
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized { status } | ClientError::Http { status, .. } => {
                Some(*status)
            }
            ClientError::NotFound { .. } => Some(404),
            _ => None,
        }
    }
}
