//! The opaque envelope a [`Transport`](crate::Transport) moves: a correlation id plus a
//! raw payload. Transports do not interpret the payload as JSON-RPC themselves — that
//! is the session engine's job — they only need an id for internal bookkeeping (e.g.
//! matching an SSE event id to a queued response).

use bytes::Bytes;
use mcprs_core::MessageId;

/// A single message crossing a transport boundary.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub id: MessageId,
    pub payload: Bytes,
    pub metadata: Option<TransportMessageMetadata>,
}

impl TransportMessage {
    #[must_use]
    pub fn new(id: MessageId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: TransportMessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Transport-specific metadata attached to a message, such as the SSE event id it
/// arrived with. The session engine does not read this; it exists for transports that
/// need to correlate their own retries (e.g. Last-Event-ID resumption).
#[derive(Debug, Clone, Default)]
pub struct TransportMessageMetadata {
    pub event_id: Option<String>,
}
