//! Server error types.

use std::io;
use std::time::Duration;

use civicfeed_core::EventStatus;
use civicfeed_protocol::{ErrorCode, ErrorResponse};
use thiserror::Error;

use crate::store::StoreError;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the pipeline, the moderation service and the HTTP layer.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// No or invalid credentials.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Missing, or not visible to the caller.
    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Cannot move event from {from} to {to}")]
    InvalidTransition { from: EventStatus, to: EventStatus },

    #[error("{message}")]
    PolicyViolation { message: String },

    #[error("Please wait {} seconds before commenting again", .retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// The wire error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config { .. } => ErrorCode::ConfigurationError,
            Self::Store(StoreError::NotFound { .. }) => ErrorCode::NotFound,
            Self::Store(StoreError::Conflict { .. }) => ErrorCode::InvalidTransition,
            Self::Store(_) | Self::Io(_) | Self::Json(_) => ErrorCode::InternalError,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::PolicyViolation { .. } => ErrorCode::PolicyViolation,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::InvalidInput { .. } => ErrorCode::InvalidRequest,
        }
    }

    /// The JSON body shown to the caller.
    ///
    /// Internal failures get a generic message; details stay in the logs.
    pub fn to_response(&self) -> ErrorResponse {
        let code = self.code();
        match self {
            Self::RateLimited { retry_after } => ErrorResponse::new(code, self.to_string())
                .with_retry_after(retry_after.as_secs().max(1)),
            Self::Store(StoreError::NotFound { .. } | StoreError::Conflict { .. })
            | Self::Unauthorized
            | Self::Forbidden { .. }
            | Self::NotFound { .. }
            | Self::InvalidTransition { .. }
            | Self::PolicyViolation { .. }
            | Self::InvalidInput { .. } => ErrorResponse::new(code, self.to_string()),
            Self::Config { .. } | Self::Store(_) | Self::Io(_) | Self::Json(_) => {
                ErrorResponse::from_code(code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(ServerError::Unauthorized.code(), ErrorCode::Unauthorized);
        assert_eq!(
            ServerError::InvalidTransition {
                from: EventStatus::Active,
                to: EventStatus::Hidden
            }
            .code(),
            ErrorCode::InvalidTransition
        );
        assert_eq!(
            ServerError::Store(StoreError::backend("disk")).code(),
            ErrorCode::InternalError
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let response = ServerError::Store(StoreError::backend("secret path /var/x")).to_response();
        assert!(!response.message.contains("/var/x"));
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let response = ServerError::RateLimited {
            retry_after: Duration::from_millis(12_400),
        }
        .to_response();
        assert_eq!(response.code, ErrorCode::RateLimited);
        assert_eq!(response.retry_after_secs, Some(12));
    }
}
