//! The client facade (C9): a typed wrapper over [`mcprs_session::SessionHandle`] that
//! speaks `tools/*`, `prompts/*`, `resources/*`, `completion/complete`, and
//! `logging/setLevel` as plain async methods, and registers handlers for the
//! server-initiated requests a host application chooses to support
//! (`sampling/createMessage`, `elicitation/create`, `roots/list`).
//!
//! This crate deliberately does not implement an LLM backend: [`SamplingHandler`] is a
//! single method the caller fills in with whatever model access it has.

mod builder;
mod client;
mod elicitation;
mod pagination;
mod roots;
mod sampling;

pub use builder::ClientBuilder;
pub use client::Client;
pub use elicitation::ElicitationHandler;
pub use roots::RootsHandler;
pub use sampling::SamplingHandler;
