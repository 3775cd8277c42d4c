//! Remote API error types.

use serde_json::Value;
use thiserror::Error;

/// Errors raised by remote API calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Server answered with a non-success status.
    #[error("{message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, or a generic status message.
        message: String,
    },

    /// Request never produced a response (unreachable host, DNS, reset).
    #[error("network error: {0}")]
    Network(String),

    /// Response body was not the JSON we expected.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Builds an HTTP error, preferring the body's `error` or `message` field.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| {
                ["error", "message"].iter().find_map(|field| {
                    value
                        .get(*field)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
            })
            .unwrap_or_else(|| format!("HTTP error: status {}", status));

        RemoteError::Http { status, message }
    }

    /// HTTP status for [`RemoteError::Http`].
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_error_field() {
        let err = RemoteError::from_status(400, r#"{"error": "Patient ID is required"}"#);
        assert_eq!(err.to_string(), "Patient ID is required");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_from_status_falls_back_to_message_field() {
        let err = RemoteError::from_status(503, r#"{"message": "Database not configured"}"#);
        assert_eq!(err.to_string(), "Database not configured");
    }

    #[test]
    fn test_from_status_generic_message() {
        let err = RemoteError::from_status(502, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "HTTP error: status 502");

        let err = RemoteError::from_status(500, r#"{"error": 42}"#);
        assert_eq!(err.to_string(), "HTTP error: status 500");
    }

    #[test]
    fn test_network_error_has_no_status() {
        let err = RemoteError::Network("connection refused".into());
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("connection refused"));
    }
}
