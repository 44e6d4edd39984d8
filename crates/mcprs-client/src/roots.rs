//! `roots/list`: reports the filesystem (or other URI) roots the client is willing to
//! let a server operate within. Most callers have a static set decided at startup, so
//! [`ClientBuilder::with_roots`](crate::ClientBuilder::with_roots) wraps a plain
//! `Vec<Root>` in [`StaticRoots`] rather than asking every caller to implement this
//! trait by hand.

use async_trait::async_trait;
use mcprs_core::McpResult;
use mcprs_core::types::{ListRootsResult, Root};

#[async_trait]
pub trait RootsHandler: Send + Sync {
    async fn list_roots(&self) -> McpResult<ListRootsResult>;
}

pub(crate) struct StaticRoots(pub Vec<Root>);

#[async_trait]
impl RootsHandler for StaticRoots {
    async fn list_roots(&self) -> McpResult<ListRootsResult> {
        Ok(ListRootsResult {
            roots: self.0.clone(),
        })
    }
}
