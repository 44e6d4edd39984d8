//! The streamable HTTP client transport (C7) and its auto-detecting wrapper (C8): a
//! single MCP endpoint speaking POST for outbound requests, an optional long-lived GET
//! for unsolicited server pushes, and DELETE to terminate the session on dispose,
//! resumable via `Last-Event-ID`; plus a minimal legacy SSE-only fallback for servers
//! that predate the streamable transport.

mod auto_detect;
mod client;
mod config;
mod legacy;
mod sse;

pub use auto_detect::AutoDetectTransport;
pub use client::{StreamableHttpTransport, start_background_reader};
pub use config::{ResumeSession, RetryPolicy, StreamableHttpClientConfig};
pub use legacy::{LegacySseConfig, LegacySseTransport, start as start_legacy_reader};
pub use sse::{SseEvent, drain_events, parse_event};
