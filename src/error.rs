//! Error types for evogate
//!
//! This module defines the error types used throughout the gateway.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for evogate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request body or parameters were rejected before reaching WhatsApp.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A recipient could not be normalized into a WhatsApp number.
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// The WhatsApp session is not connected.
    #[error("WhatsApp session is not connected: {0}")]
    NotReady(String),

    /// Failures reported by the WhatsApp client or bridge.
    #[error("WhatsApp error: {0}")]
    WhatsApp(String),

    /// A send did not complete in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Resource not found (instances, routes)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication failures
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Per-minute request budget exhausted
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GateError {
    /// Returns the HTTP status code this error maps to on the REST surface.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::InvalidRequest(_) | GateError::InvalidNumber(_) | GateError::Json(_) => 400,
            GateError::Unauthorized(_) => 401,
            GateError::NotFound(_) => 404,
            GateError::RateLimited(_) => 429,
            GateError::NotReady(_) => 503,
            GateError::Timeout(_) => 504,
            GateError::Config(_) | GateError::WhatsApp(_) | GateError::Io(_) => 500,
        }
    }
}

/// A specialized `Result` type for evogate operations.
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let gate_err: GateError = io_err.into();
        assert!(matches!(gate_err, GateError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let gate_err: GateError = json_err.into();
        assert!(matches!(gate_err, GateError::Json(_)));
        assert_eq!(gate_err.status_code(), 400);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GateError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(GateError::InvalidNumber("x".into()).status_code(), 400);
        assert_eq!(GateError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(GateError::NotFound("x".into()).status_code(), 404);
        assert_eq!(GateError::RateLimited("x".into()).status_code(), 429);
        assert_eq!(GateError::NotReady("x".into()).status_code(), 503);
        assert_eq!(GateError::Timeout("x".into()).status_code(), 504);
        assert_eq!(GateError::WhatsApp("x".into()).status_code(), 500);
        assert_eq!(GateError::Config("x".into()).status_code(), 500);
    }

    #[test]
    fn test_not_ready_display() {
        let err = GateError::NotReady("state is close".to_string());
        assert_eq!(
            err.to_string(),
            "WhatsApp session is not connected: state is close"
        );
    }
}
