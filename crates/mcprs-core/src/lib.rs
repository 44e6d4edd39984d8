//! Wire types and unified error handling shared by every layer of the session engine.
//!
//! `mcprs-core` has no transport, no I/O, and no async runtime dependency: it is the
//! vocabulary the rest of the workspace speaks. It defines the JSON-RPC 2.0 envelope
//! (§ [`jsonrpc`]), the MCP protocol types layered on top of it (§ [`types`]), and the
//! single [`McpError`] used across every crate in this workspace.

pub mod error;
pub mod jsonrpc;
pub mod types;

pub use error::{ErrorKind, McpError, McpResult};
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcVersion, MessageId, RequestId,
};

/// Protocol version this workspace negotiates by default.
///
/// Servers and clients built on this crate advertise this version during the
/// `initialize` handshake unless a caller overrides it explicitly.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Hard cap on a single JSON-RPC message's serialized size, in bytes.
///
/// Enforced by transports before attempting to send or after receiving, so that a
/// misbehaving peer cannot exhaust memory with one oversized payload.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
