//! A thin seam for `elicitation/create`: the server asks the user to fill in a small
//! schema-described form. The host application decides how (and whether) to surface
//! that prompt.

use async_trait::async_trait;
use mcprs_core::McpResult;
use mcprs_core::types::{ElicitRequest, ElicitResult};

#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    async fn elicit(&self, request: ElicitRequest) -> McpResult<ElicitResult>;
}

#[async_trait]
impl<F, Fut> ElicitationHandler for F
where
    F: Fn(ElicitRequest) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<ElicitResult>> + Send,
{
    async fn elicit(&self, request: ElicitRequest) -> McpResult<ElicitResult> {
        (self)(request).await
    }
}
