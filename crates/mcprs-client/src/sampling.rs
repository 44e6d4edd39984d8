//! A thin seam for `sampling/createMessage`. The client stays in control of which
//! model actually answers and what the user sees before a result is sent back to the
//! server; this crate only defines the boundary, not a provider behind it.

use async_trait::async_trait;
use mcprs_core::McpResult;
use mcprs_core::types::{CreateMessageRequest, CreateMessageResult};

/// Implemented by host applications that want to answer `sampling/createMessage`.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn create_message(&self, request: CreateMessageRequest) -> McpResult<CreateMessageResult>;
}

#[async_trait]
impl<F, Fut> SamplingHandler for F
where
    F: Fn(CreateMessageRequest) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<CreateMessageResult>> + Send,
{
    async fn create_message(&self, request: CreateMessageRequest) -> McpResult<CreateMessageResult> {
        (self)(request).await
    }
}
