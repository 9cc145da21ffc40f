//! MCP-specific error types.

use std::time::Duration;

use petstore_core::ErrorDescriptor;
use serde_json::Value;
use thiserror::Error;

/// Failure category of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    ConnectionLost,
    Timeout,
    ProtocolViolation,
    RemoteError,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost => write!(f, "connection_lost"),
            Self::Timeout => write!(f, "timeout"),
            Self::ProtocolViolation => write!(f, "protocol_violation"),
            Self::RemoteError => write!(f, "remote_error"),
        }
    }
}

/// Errors that can occur while talking to the tool server.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The channel to the server could not be opened or was closed.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// No response arrived within the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request or response broke the protocol (unknown tool, malformed
    /// message, bad arguments).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The server reported an error.
    #[error("remote error (code {code}): {message}")]
    RemoteError {
        code: i64,
        message: String,
        detail: Option<Value>,
    },
}

impl TransportError {
    /// Create a connection-lost error.
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost(msg.into())
    }

    /// Create a protocol violation.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a remote error.
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self::RemoteError {
            code,
            message: message.into(),
            detail: None,
        }
    }

    /// Failure category.
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::ConnectionLost(_) => TransportErrorKind::ConnectionLost,
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::ProtocolViolation(_) => TransportErrorKind::ProtocolViolation,
            Self::RemoteError { .. } => TransportErrorKind::RemoteError,
        }
    }

    /// Whether a retry may succeed without caller intervention.
    ///
    /// Connection loss and timeouts are transient. Remote errors are
    /// transient only for server-side (5xx) codes.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionLost(_) | Self::Timeout(_) => true,
            Self::RemoteError { code, .. } => (500..=599).contains(code),
            Self::ProtocolViolation(_) => false,
        }
    }

    /// Project this error into a structured descriptor.
    pub fn descriptor(&self) -> ErrorDescriptor {
        let descriptor = ErrorDescriptor::new(self.kind().to_string(), self.to_string());
        match self {
            Self::RemoteError { code, detail, .. } => descriptor.with_detail(serde_json::json!({
                "code": code,
                "detail": detail,
            })),
            Self::Timeout(after) => descriptor
                .with_detail(serde_json::json!({ "timeout_ms": after.as_millis() as u64 })),
            _ => descriptor,
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::ProtocolViolation(format!("JSON error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::connection_lost("server stdout closed");
        assert_eq!(err.to_string(), "connection lost: server stdout closed");

        let err = TransportError::remote(-32600, "Invalid request");
        assert_eq!(err.to_string(), "remote error (code -32600): Invalid request");
    }

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::connection_lost("eof").is_transient());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(TransportError::remote(503, "unavailable").is_transient());
        assert!(!TransportError::remote(404, "not found").is_transient());
        assert!(!TransportError::remote(-32601, "Method not found").is_transient());
        assert!(!TransportError::protocol("unknown tool").is_transient());
    }

    #[test]
    fn test_descriptor_codes() {
        let descriptor = TransportError::protocol("unknown tool 'x'").descriptor();
        assert_eq!(descriptor.code, "protocol_violation");
        assert!(descriptor.message.contains("unknown tool"));

        let descriptor = TransportError::remote(404, "Pet not found").descriptor();
        assert_eq!(descriptor.code, "remote_error");
        assert_eq!(descriptor.detail.unwrap()["code"], 404);
    }
}
