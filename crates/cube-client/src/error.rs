//! Error types for `cube-mcp-client`.

use crate::safety::sanitize_reqwest_error;
use thiserror::Error;

/// Main error type for the semantic-layer client.
///
/// Every message is safe to surface: secrets and raw response bodies never end up in here.
#[derive(Error, Debug)]
pub enum CubeError {
    /// Configuration errors (malformed endpoint, missing secret, bad signing payload).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The remote API rejected our credentials and refreshing cannot help.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The remote API kept asking us to wait past the backoff ceiling.
    #[error("Request timed out: {0}")]
    Transient(String),

    /// Non-success response or terminal transport failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// Unknown resource identifier.
    #[error("Resource not found: {0}")]
    NotFound(String),
}

/// Stable classification of a [`CubeError`], suitable for structured surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    TransientRequest,
    Request,
    NotFound,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Authentication => "authentication_error",
            Self::TransientRequest => "transient_request_error",
            Self::Request => "request_error",
            Self::NotFound => "not_found_error",
        }
    }
}

impl CubeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Authentication(_) => ErrorKind::Authentication,
            Self::Transient(_) => ErrorKind::TransientRequest,
            Self::Request(_) => ErrorKind::Request,
            Self::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

impl From<reqwest::Error> for CubeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(sanitize_reqwest_error(&value))
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, CubeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_stable_names() {
        let err = CubeError::NotFound("data://x".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.kind().as_str(), "not_found_error");
        assert_eq!(
            CubeError::Transient("x".to_string()).kind().as_str(),
            "transient_request_error"
        );
    }
}
