//! The session engine: correlation table, filter pipeline, handler registry, and the
//! state machine that drives the handshake and read loop on top of a
//! [`mcprs_transport::Transport`].
//!
//! A [`Session`] is usable from either role (`Client` or `Server`); the role only
//! changes which side is expected to send `initialize` first.

mod correlation;
mod engine;
mod filter;
mod registry;

pub use correlation::{CorrelationTable, PendingSlot};
pub use engine::{
    HandshakeConfig, ProgressUpdate, RequestOptions, Role, Session, SessionHandle, SessionState,
};
pub use filter::{BoxFuture, Filter, MessageContext, MessageDirection, Next};
pub use registry::{
    HandlerRegistry, HandlerRegistryBuilder, NotificationContext, NotificationHandler,
    ProgressSink, PromptCollection, PromptHandler, RequestContext, RequestHandler,
    ResourceCollection, ResourceHandler, SubscriptionId, ToolCollection, ToolHandler,
    TypedRequestHandler,
};
