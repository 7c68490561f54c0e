//! Error types for feed retrieval and parsing.
//!
//! A [`FeedError`] is always scoped to one configured source: the pipeline
//! records it against that source and moves on to the next one.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The category of a feed error.
///
/// Reported verbatim in ingestion results, so the variants are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedErrorCode {
    /// URL is empty, malformed or not http/https. No request was made.
    InvalidUrl,
    /// Connection, DNS or TLS failure.
    NetworkError,
    /// The request did not complete within the fetch timeout.
    Timeout,
    /// The server answered with a non-success status.
    HttpStatus,
    /// The body is too small, not a calendar, or does not parse.
    InvalidContent,
    /// The source list itself is malformed.
    ConfigurationError,
    InternalError,
}

impl FeedErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::InvalidContent => "invalid_content",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for FeedErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while fetching or parsing one feed.
#[derive(Debug, Error)]
pub struct FeedError {
    code: FeedErrorCode,
    message: String,
    /// HTTP status, for [`FeedErrorCode::HttpStatus`].
    status: Option<u16>,
    /// Key of the source that produced the error.
    source_key: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FeedError {
    pub fn new(code: FeedErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source_key: None,
            source: None,
        }
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::InvalidUrl, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::Timeout, message)
    }

    /// Creates an error for a non-success HTTP status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(FeedErrorCode::HttpStatus, message);
        err.status = Some(status);
        err
    }

    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::InvalidContent, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::ConfigurationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FeedErrorCode::InternalError, message)
    }

    /// Classifies a reqwest failure as timeout or network error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let base = if err.is_timeout() {
            Self::timeout(format!("request timed out: {}", err))
        } else {
            Self::network(format!("request failed: {}", err))
        };
        base.with_source(err)
    }

    /// Sets the source key for this error.
    pub fn with_source_key(mut self, key: impl Into<String>) -> Self {
        self.source_key = Some(key.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> FeedErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn source_key(&self) -> Option<&str> {
        self.source_key.as_deref()
    }

    /// Returns true if a later run may succeed without a config change.
    pub fn is_retryable(&self) -> bool {
        match self.code {
            FeedErrorCode::NetworkError | FeedErrorCode::Timeout => true,
            FeedErrorCode::HttpStatus => self.status.is_some_and(|s| s == 429 || s >= 500),
            _ => false,
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref key) = self.source_key {
            write!(f, "[{}] ", key)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(FeedError::network("reset").is_retryable());
        assert!(FeedError::timeout("slow").is_retryable());
        assert!(FeedError::http_status(503, "unavailable").is_retryable());
        assert!(FeedError::http_status(429, "slow down").is_retryable());
        assert!(!FeedError::http_status(404, "gone").is_retryable());
        assert!(!FeedError::invalid_url("ftp://x").is_retryable());
        assert!(!FeedError::invalid_content("not ics").is_retryable());
    }

    #[test]
    fn display_includes_source_key() {
        let err = FeedError::timeout("after 20s").with_source_key("county");
        let display = err.to_string();
        assert!(display.starts_with("[county] "));
        assert!(display.contains("timeout"));
        assert!(display.contains("after 20s"));
    }

    #[test]
    fn code_serializes_snake_case() {
        let json = serde_json::to_string(&FeedErrorCode::InvalidContent).unwrap();
        assert_eq!(json, "\"invalid_content\"");
    }

    #[test]
    fn keeps_source() {
        use std::error::Error;
        let err = FeedError::internal("wrap").with_source(std::io::Error::other("boom"));
        assert!(err.source().is_some());
    }
}
