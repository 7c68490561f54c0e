//! Error bodies returned by every endpoint.

use serde::{Deserialize, Serialize};

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or wrong trigger secret / admin token.
    Unauthorized,
    /// Authenticated, but not allowed to act on this resource.
    Forbidden,
    NotFound,
    /// The requested status change is not a legal transition.
    InvalidTransition,
    /// Content was rejected by the comment policy.
    PolicyViolation,
    /// Comment cooldown has not elapsed.
    RateLimited,
    InvalidRequest,
    /// Source list or other server configuration is unusable.
    ConfigurationError,
    InternalError,
}

impl ErrorCode {
    /// HTTP status used for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::InvalidTransition => 409,
            Self::PolicyViolation | Self::InvalidRequest => 422,
            Self::RateLimited => 429,
            Self::ConfigurationError | Self::InternalError => 500,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Authorization required",
            Self::Forbidden => "Not allowed",
            Self::NotFound => "Not found",
            Self::InvalidTransition => "Status change not allowed from the current status",
            Self::PolicyViolation => "Content violates the community guidelines",
            Self::RateLimited => "Please wait before posting again",
            Self::InvalidRequest => "The request was invalid",
            Self::ConfigurationError => "Server configuration error",
            Self::InternalError => "An internal error occurred",
        }
    }
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    /// Message suitable for showing inline to the acting user.
    pub message: String,
    /// Seconds until a rate-limited action may be retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Uses the code's generic description as message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.description())
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}
