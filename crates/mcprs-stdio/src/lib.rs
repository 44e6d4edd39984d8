//! Newline-delimited JSON transport (C2, stdio variant): the default way an MCP
//! server talks to a host process that spawned it.
//!
//! Per the MCP stdio transport contract, every message is one line of UTF-8 JSON with
//! no embedded `\n` or `\r`; `tracing` output goes to stderr, never stdout, so it can
//! never be mistaken for a protocol message. Spawning a child process is out of
//! scope here — callers who need that hand this transport an arbitrary
//! [`AsyncRead`](tokio::io::AsyncRead)/[`AsyncWrite`](tokio::io::AsyncWrite) pair
//! (e.g. a child's stdout/stdin) via [`StdioTransport::from_raw`].

mod transport;

pub use transport::StdioTransport;
