//! The connected client handle returned by [`crate::ClientBuilder::connect`].

use std::collections::HashMap;

use futures::{Stream, TryStreamExt};
use mcprs_core::McpResult;
use mcprs_core::types::{
    CallToolRequest, CallToolResult, CompleteRequest, CompleteResult, CompletionContext,
    CompletionReference, GetPromptRequest, GetPromptResult, Implementation, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListToolsResult, LogLevel, Prompt,
    ReadResourceRequest, ReadResourceResult, Resource, ResourceTemplate, ServerCapabilities,
    SetLevelRequest, SetLevelResult, SubscribeRequest, Tool, UnsubscribeRequest,
};
use mcprs_session::{ProgressUpdate, RequestOptions, SessionHandle};
use tokio::sync::mpsc;

use crate::pagination::paginate;

/// A connected, handshake-complete session viewed through typed MCP operations.
///
/// Cloning a [`Client`] is cheap; it shares the same underlying
/// [`SessionHandle`] and read loop.
#[derive(Clone)]
pub struct Client {
    pub(crate) session: SessionHandle,
    pub(crate) server_info: Implementation,
    pub(crate) server_capabilities: ServerCapabilities,
}

fn validate_non_blank(field: &str, value: &str) -> McpResult<()> {
    if value.trim().is_empty() {
        return Err(mcprs_core::McpError::invalid_params(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

impl Client {
    #[must_use]
    pub fn negotiated_protocol_version(&self) -> Option<String> {
        self.session.negotiated_protocol_version()
    }

    #[must_use]
    pub fn server_info(&self) -> &Implementation {
        &self.server_info
    }

    #[must_use]
    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server_capabilities
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.session
            .send_request("ping", None, RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Fetch every page of `tools/list` and return the whole collection at once.
    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        self.list_tools_stream().try_collect().await
    }

    /// Lazily re-query `tools/list`, yielding one tool at a time and fetching the next
    /// page only once the buffered page is drained.
    pub fn list_tools_stream(&self) -> impl Stream<Item = McpResult<Tool>> {
        paginate(self.session.clone(), "tools/list", |raw| {
            let result: ListToolsResult = serde_json::from_value(raw)?;
            Ok((result.tools, result.next_cursor))
        })
    }

    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, serde_json::Value>>,
    ) -> McpResult<CallToolResult> {
        self.call_tool_with_progress(name, arguments, None).await
    }

    /// Call a tool, optionally observing `notifications/progress` the server reports
    /// for this invocation. `progress` receives one [`ProgressUpdate`] per report, in
    /// arrival order, for as long as the channel's receiver stays alive.
    pub async fn call_tool_with_progress(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, serde_json::Value>>,
        progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
    ) -> McpResult<CallToolResult> {
        let name = name.into();
        validate_non_blank("tool name", &name)?;
        let request = CallToolRequest { name, arguments };
        let params = serde_json::to_value(&request)?;
        let mut options = RequestOptions::default();
        if let Some(sink) = progress {
            options = options.with_progress(sink);
        }
        let raw = self
            .session
            .send_request("tools/call", Some(params), options)
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn list_prompts(&self) -> McpResult<Vec<Prompt>> {
        self.list_prompts_stream().try_collect().await
    }

    pub fn list_prompts_stream(&self) -> impl Stream<Item = McpResult<Prompt>> {
        paginate(self.session.clone(), "prompts/list", |raw| {
            let result: ListPromptsResult = serde_json::from_value(raw)?;
            Ok((result.prompts, result.next_cursor))
        })
    }

    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        let name = name.into();
        validate_non_blank("prompt name", &name)?;
        let request = GetPromptRequest { name, arguments };
        let params = serde_json::to_value(&request)?;
        let raw = self
            .session
            .send_request("prompts/get", Some(params), RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn list_resources(&self) -> McpResult<Vec<Resource>> {
        self.list_resources_stream().try_collect().await
    }

    pub fn list_resources_stream(&self) -> impl Stream<Item = McpResult<Resource>> {
        paginate(self.session.clone(), "resources/list", |raw| {
            let result: ListResourcesResult = serde_json::from_value(raw)?;
            Ok((result.resources, result.next_cursor))
        })
    }

    pub async fn list_resource_templates(&self) -> McpResult<Vec<ResourceTemplate>> {
        self.list_resource_templates_stream().try_collect().await
    }

    pub fn list_resource_templates_stream(&self) -> impl Stream<Item = McpResult<ResourceTemplate>> {
        paginate(self.session.clone(), "resources/templates/list", |raw| {
            let result: ListResourceTemplatesResult = serde_json::from_value(raw)?;
            Ok((result.resource_templates, result.next_cursor))
        })
    }

    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        let uri = uri.into();
        validate_non_blank("resource uri", &uri)?;
        let request = ReadResourceRequest { uri };
        let params = serde_json::to_value(&request)?;
        let raw = self
            .session
            .send_request("resources/read", Some(params), RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let uri = uri.into();
        validate_non_blank("resource uri", &uri)?;
        let params = serde_json::to_value(&SubscribeRequest { uri })?;
        self.session
            .send_request("resources/subscribe", Some(params), RequestOptions::default())
            .await?;
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let uri = uri.into();
        validate_non_blank("resource uri", &uri)?;
        let params = serde_json::to_value(&UnsubscribeRequest { uri })?;
        self.session
            .send_request("resources/unsubscribe", Some(params), RequestOptions::default())
            .await?;
        Ok(())
    }

    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument_name: impl Into<String>,
        argument_value: impl Into<String>,
        context: Option<CompletionContext>,
    ) -> McpResult<CompleteResult> {
        let request = CompleteRequest {
            argument: mcprs_core::types::ArgumentInfo {
                name: argument_name.into(),
                value: argument_value.into(),
            },
            reference,
            context,
        };
        let params = serde_json::to_value(&request)?;
        let raw = self
            .session
            .send_request("completion/complete", Some(params), RequestOptions::default())
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn set_logging_level(&self, level: LogLevel) -> McpResult<()> {
        let params = serde_json::to_value(&SetLevelRequest { level })?;
        let raw = self
            .session
            .send_request("logging/setLevel", Some(params), RequestOptions::default())
            .await?;
        let _: SetLevelResult = serde_json::from_value(raw)?;
        Ok(())
    }

    pub async fn dispose(&self, reason: impl Into<String>) {
        self.session.dispose(reason).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_non_blank_rejects_whitespace() {
        assert!(validate_non_blank("tool name", "   ").is_err());
        assert!(validate_non_blank("tool name", "echo").is_ok());
    }
}
