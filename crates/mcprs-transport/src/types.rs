//! Small value types shared by [`Transport`](crate::Transport) implementations.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a transport, observable by the session engine for logging and
/// for deciding whether a send should be attempted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Identifies which concrete transport kind is in use, mostly for diagnostics and for
/// the auto-detect transport's logging of which mode it settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportType {
    Stdio,
    StreamableHttp,
    LegacySse,
}

/// What a transport can and cannot do, queried by the session engine to decide, e.g.,
/// whether progress notifications over this transport are even worth sending.
#[derive(Debug, Clone, Default)]
pub struct TransportCapabilities {
    pub max_message_size: Option<usize>,
    pub supports_streaming: bool,
    pub supports_bidirectional: bool,
}
