//! The transport abstraction that the session engine (`mcprs-session`) drives: a
//! bidirectional, lazily-polled sequence of messages with explicit connect/disconnect
//! lifecycle, independent of whatever wire format or I/O a concrete transport uses
//! underneath.

mod error;
mod message;
mod traits;
mod types;

pub use error::{TransportError, TransportResult};
pub use message::{TransportMessage, TransportMessageMetadata};
pub use traits::{Transport, TransportFactory};
pub use types::{TransportCapabilities, TransportState, TransportType};
