//! Unified error type for MCP operations.
//!
//! A single [`McpError`] is used across every crate in this workspace so that session
//! engine, transports, and the client facade can all convert into and propagate the
//! same type, and so that every error carries enough information to become a JSON-RPC
//! error reply via [`McpError::jsonrpc_code`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type alias used throughout the workspace.
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Unified error type for MCP session, transport, and protocol failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    /// Error classification, used for JSON-RPC code mapping and retry decisions.
    pub kind: ErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Additional structured context, boxed to keep `McpError` small.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Box<ErrorContext>>,
}

/// Additional error context attached by the layer that raised the error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Operation being performed when the error occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Component where the error occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    /// Request id associated with the error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error classification for programmatic handling and JSON-RPC code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// JSON-RPC parse error (-32700).
    ParseError,
    /// JSON-RPC invalid request (-32600).
    InvalidRequest,
    /// No handler registered for the method (-32601).
    MethodNotFound,
    /// Request params did not match the handler's expected shape (-32602).
    InvalidParams,
    /// Unclassified internal error (-32603).
    Internal,
    /// Client or server protocol version mismatch during handshake.
    ProtocolVersionMismatch,
    /// Handshake did not complete within the configured timeout.
    HandshakeTimeout,
    /// A request was cancelled locally or by the peer.
    Cancelled,
    /// A request exceeded its per-call timeout.
    Timeout,
    /// Transport-level failure (connection, I/O, serialization over the wire).
    Transport,
    /// The session is not in a state that permits the requested operation.
    InvalidState,
    /// A filter or handler rejected the message for application reasons.
    Rejected,
    /// Serialization or deserialization failure outside the JSON-RPC envelope itself.
    Serialization,
    /// Configuration value was invalid or missing.
    Configuration,
}

impl McpError {
    /// Create a new error with the given kind and message.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    /// Set the operation context.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(|| Box::new(ErrorContext::default()))
            .operation = Some(operation.into());
        self
    }

    /// Set the component context.
    #[must_use]
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(|| Box::new(ErrorContext::default()))
            .component = Some(component.into());
        self
    }

    /// Set the request id context.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(|| Box::new(ErrorContext::default()))
            .request_id = Some(request_id.into());
        self
    }

    /// Shorthand for [`ErrorKind::ParseError`].
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// Shorthand for [`ErrorKind::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Shorthand for [`ErrorKind::MethodNotFound`].
    #[must_use]
    pub fn method_not_found(method: impl Into<String>) -> Self {
        let method = method.into();
        Self::new(ErrorKind::MethodNotFound, format!("method not found: {method}"))
    }

    /// Shorthand for [`ErrorKind::InvalidParams`].
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Shorthand for [`ErrorKind::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Shorthand for [`ErrorKind::ProtocolVersionMismatch`].
    #[must_use]
    pub fn protocol_version_mismatch(requested: impl Into<String>, agreed: impl Into<String>) -> Self {
        let requested = requested.into();
        let agreed = agreed.into();
        Self::new(
            ErrorKind::ProtocolVersionMismatch,
            format!("protocol version mismatch: requested={requested}, agreed={agreed}"),
        )
    }

    /// Shorthand for [`ErrorKind::Cancelled`].
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Shorthand for [`ErrorKind::Timeout`].
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Shorthand for [`ErrorKind::Transport`].
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Shorthand for [`ErrorKind::InvalidState`].
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, message)
    }

    /// True if retrying the operation that produced this error might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::Transport)
    }

    /// Map this error to the JSON-RPC error code it should be reported as.
    #[must_use]
    pub const fn jsonrpc_code(&self) -> i32 {
        match self.kind {
            ErrorKind::ParseError => -32700,
            ErrorKind::InvalidRequest => -32600,
            ErrorKind::MethodNotFound => -32601,
            ErrorKind::InvalidParams | ErrorKind::Serialization => -32602,
            ErrorKind::Internal => -32603,
            ErrorKind::Cancelled => -32800,
            ErrorKind::Timeout => -32801,
            ErrorKind::ProtocolVersionMismatch => -32802,
            ErrorKind::HandshakeTimeout => -32803,
            ErrorKind::Transport => -32804,
            ErrorKind::InvalidState => -32805,
            ErrorKind::Rejected => -32806,
            ErrorKind::Configuration => -32807,
        }
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ctx) = &self.context {
            if let Some(op) = &ctx.operation {
                write!(f, " (operation: {op})")?;
            }
            if let Some(comp) = &ctx.component {
                write!(f, " (component: {comp})")?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for McpError {}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        let kind = if err.is_syntax() || err.is_eof() {
            ErrorKind::ParseError
        } else if err.is_data() {
            ErrorKind::InvalidParams
        } else {
            ErrorKind::Serialization
        };
        Self::new(kind, format!("JSON error: {err}"))
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as IoKind;
        let kind = match err.kind() {
            IoKind::TimedOut => ErrorKind::Timeout,
            IoKind::ConnectionRefused
            | IoKind::ConnectionReset
            | IoKind::ConnectionAborted
            | IoKind::NotConnected
            | IoKind::BrokenPipe => ErrorKind::Transport,
            _ => ErrorKind::Internal,
        };
        Self::new(kind, format!("IO error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_creation_carries_message() {
        let err = McpError::invalid_params("missing field");
        assert_eq!(err.kind, ErrorKind::InvalidParams);
        assert!(err.message.contains("missing field"));
    }

    #[test]
    fn error_context_round_trips() {
        let err = McpError::internal("boom")
            .with_operation("test_op")
            .with_component("test_comp")
            .with_request_id("req-1");
        let ctx = err.context.unwrap();
        assert_eq!(ctx.operation.as_deref(), Some("test_op"));
        assert_eq!(ctx.component.as_deref(), Some("test_comp"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn jsonrpc_codes_match_spec_table() {
        assert_eq!(McpError::method_not_found("x").jsonrpc_code(), -32601);
        assert_eq!(McpError::invalid_params("x").jsonrpc_code(), -32602);
        assert_eq!(McpError::internal("x").jsonrpc_code(), -32603);
        assert_eq!(McpError::cancelled("x").jsonrpc_code(), -32800);
    }

    #[test]
    fn retryable_classification() {
        assert!(McpError::timeout("x").is_retryable());
        assert!(McpError::transport("x").is_retryable());
        assert!(!McpError::invalid_params("x").is_retryable());
    }
}
