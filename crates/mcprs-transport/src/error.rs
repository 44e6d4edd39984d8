//! Transport-level error taxonomy.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors a [`Transport`](crate::Transport) implementation can surface.
///
/// Kept distinct from [`mcprs_core::McpError`] because a transport crate should not
/// need to depend on session-level concerns to describe its own I/O failures; the
/// session engine converts these into [`mcprs_core::McpError`] at the boundary.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("server responded with HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("failed to serialize or deserialize message: {0}")]
    SerializationFailed(String),

    #[error("message exceeds maximum size ({actual} > {limit} bytes)")]
    MessageTooLarge { actual: usize, limit: usize },

    #[error("request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("transport is not connected")]
    NotConnected,

    #[error("transport does not support this operation: {0}")]
    Unsupported(String),

    #[error("invalid transport configuration: {0}")]
    Configuration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransportError> for mcprs_core::McpError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Configuration(ref msg) => {
                mcprs_core::McpError::new(mcprs_core::ErrorKind::Configuration, msg.clone())
            }
            other => mcprs_core::McpError::transport(other.to_string()),
        }
    }
}

/// Validate that an outgoing payload does not exceed the configured size limit.
pub fn validate_message_size(payload_len: usize, limit: usize) -> TransportResult<()> {
    if payload_len > limit {
        Err(TransportError::MessageTooLarge {
            actual: payload_len,
            limit,
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_message_size_rejects_oversized_payload() {
        assert!(validate_message_size(10, 5).is_err());
        assert!(validate_message_size(5, 5).is_ok());
    }

    #[test]
    fn converts_into_mcp_error_as_transport_kind() {
        let err: mcprs_core::McpError = TransportError::NotConnected.into();
        assert_eq!(err.kind, mcprs_core::ErrorKind::Transport);
    }

    #[test]
    fn http_status_is_distinct_from_connection_failed() {
        let status = TransportError::HttpStatus {
            status: 404,
            body: "not found".to_string(),
        };
        assert!(!matches!(status, TransportError::ConnectionFailed(_)));
        let err: mcprs_core::McpError = status.into();
        assert_eq!(err.kind, mcprs_core::ErrorKind::Transport);
    }
}
