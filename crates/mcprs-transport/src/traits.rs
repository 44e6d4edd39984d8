//! The core transport trait.

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::message::TransportMessage;
use crate::types::{TransportCapabilities, TransportState, TransportType};

/// A bidirectional, message-oriented communication channel.
///
/// Implementations own whatever I/O is underneath (a pipe, an HTTP client, an in-memory
/// channel pair for tests) and expose it uniformly to the session engine: connect,
/// disconnect, send one message, and poll for the next inbound message without
/// blocking. `receive` returning `Ok(None)` means "nothing available right now", not
/// end-of-stream; the session engine distinguishes "nothing yet" from "the transport
/// died" via `Err` and from "the peer closed" via the transport's own state transition
/// to [`TransportState::Disconnected`].
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Which concrete transport this is, for diagnostics.
    fn transport_type(&self) -> TransportType;

    /// What this transport supports.
    fn capabilities(&self) -> &TransportCapabilities;

    /// Current lifecycle state.
    async fn state(&self) -> TransportState;

    /// Establish the connection. Idempotent: calling `connect` while already connected
    /// is a no-op.
    async fn connect(&self) -> TransportResult<()>;

    /// Tear down the connection. Idempotent and infallible from the caller's point of
    /// view — implementations should best-effort the underlying teardown (e.g. a DELETE
    /// to terminate a server-side session) and not fail the caller's own shutdown path
    /// over it.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Send one message.
    async fn send(&self, message: TransportMessage) -> TransportResult<()>;

    /// Poll for the next inbound message without blocking.
    async fn receive(&self) -> TransportResult<Option<TransportMessage>>;

    /// The server-assigned session id, once known. `None` for transports (like stdio)
    /// that have no concept of one.
    async fn session_id(&self) -> Option<String> {
        None
    }

    /// True if the transport reports itself connected.
    async fn is_connected(&self) -> bool {
        matches!(self.state().await, TransportState::Connected)
    }
}

/// A factory that constructs a boxed transport from nothing but its own captured
/// configuration, used wherever a caller wants to defer transport construction (e.g.
/// the auto-detect transport's fallback path).
pub trait TransportFactory: Send + Sync + std::fmt::Debug {
    fn create(&self) -> TransportResult<Box<dyn Transport>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_trait_object_safe(_t: &dyn Transport) {}
}
