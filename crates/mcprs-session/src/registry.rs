//! The handler registry (C6): typed request handlers keyed by method string,
//! append-only notification multihandlers, and per-request filter stacks.
//!
//! Handler lookup is read-only once the session starts running — registration happens
//! serially while building a [`HandlerRegistryBuilder`], before any message is
//! dispatched. Notification subscribers remain mutable at runtime, guarded by a
//! `parking_lot::RwLock`, so hooks can be added after startup.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use mcprs_core::{McpError, McpResult};
use mcprs_core::types::{
    CallToolRequest, CallToolResult, GetPromptRequest, GetPromptResult, ListPromptsResult,
    ListResourcesResult, ListToolsResult, Prompt, ReadResourceRequest, ReadResourceResult,
    Resource, Tool,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::filter::{BoxFuture, Filter};

/// Reports progress for the request it was constructed against, echoing the caller's
/// progress token. A no-op sink is used when the request carried none.
#[derive(Clone)]
pub struct ProgressSink {
    token: Option<Value>,
    report: Option<Arc<dyn Fn(Value, f64, Option<u64>, Option<String>) -> BoxFuture<'static, ()> + Send + Sync>>,
}

impl ProgressSink {
    #[must_use]
    pub fn new(
        token: Option<Value>,
        report: Arc<dyn Fn(Value, f64, Option<u64>, Option<String>) -> BoxFuture<'static, ()> + Send + Sync>,
    ) -> Self {
        Self {
            token,
            report: Some(report),
        }
    }

    /// A sink that drops every report, used for requests with no progress token.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            token: None,
            report: None,
        }
    }

    pub async fn report(&self, progress: f64, total: Option<u64>, message: Option<String>) {
        if let (Some(token), Some(report)) = (&self.token, &self.report) {
            report(token.clone(), progress, total, message).await;
        }
    }
}

/// Per-request ambient context handed to a [`RequestHandler`]: the session's reply
/// metadata, the filter-bag contributions made upstream, a progress sink, and a
/// cancellation signal wired to an inbound `notifications/cancelled` for this id.
pub struct RequestContext {
    pub method: String,
    pub meta: Option<Value>,
    pub bag: serde_json::Map<String, Value>,
    pub progress: ProgressSink,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(method: impl Into<String>, meta: Option<Value>) -> Self {
        Self {
            method: method.into(),
            meta,
            bag: serde_json::Map::new(),
            progress: ProgressSink::noop(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// Ambient context handed to a [`NotificationHandler`]. Notifications never reply, so
/// this carries less than [`RequestContext`].
pub struct NotificationContext {
    pub method: String,
    pub bag: serde_json::Map<String, Value>,
}

/// A type-erased handler for one request method. Implementations receive raw params
/// and return a raw result so the registry can store heterogeneous handlers behind one
/// map; [`TypedRequestHandler`] is the usual way to get one from a typed closure.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> McpResult<Value>;
}

/// Wraps a typed async closure as a [`RequestHandler`], deserializing `params` into
/// `Req` and serializing the closure's `Res` back to `Value` — the "boxed closure plus
/// type descriptors" shape the design notes call for, with `Req`/`Res` standing in for
/// the type descriptors via their `serde` impls rather than a separate reflection step.
pub struct TypedRequestHandler<F> {
    func: F,
}

impl<F> TypedRequestHandler<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Req, Res, Fut> RequestHandler for TypedRequestHandler<F>
where
    F: Fn(Req, RequestContext) -> Fut + Send + Sync + 'static,
    Req: DeserializeOwned + Send + 'static,
    Res: Serialize + 'static,
    Fut: Future<Output = McpResult<Res>> + Send + 'static,
{
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> McpResult<Value> {
        let req: Req = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::invalid_params(e.to_string()))?;
        let res = (self.func)(req, ctx).await?;
        serde_json::to_value(res)
            .map_err(|e| McpError::new(mcprs_core::ErrorKind::Serialization, e.to_string()))
    }
}

/// A type-erased handler for one notification method. Multiple may be registered per
/// method; all run, in registration order, against a snapshot taken at dispatch time.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: NotificationContext);
}

#[async_trait]
impl<F, Fut> NotificationHandler for F
where
    F: Fn(Option<Value>, NotificationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, params: Option<Value>, ctx: NotificationContext) {
        (self)(params, ctx).await;
    }
}

/// A single callable tool plus the closure that runs it, synthesized by the registry
/// into `tools/list` and `tools/call` handlers unless the caller registered its own.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Option<Value>, ctx: RequestContext) -> McpResult<CallToolResult>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
{
    async fn call(&self, arguments: Option<Value>, ctx: RequestContext) -> McpResult<CallToolResult> {
        (self)(arguments, ctx).await
    }
}

/// A simple, in-memory bulk store of tools, synthesizing `tools/list`/`tools/call`
/// when non-empty and unoverridden, per the registry's build-time synthesis contract.
#[derive(Default)]
pub struct ToolCollection {
    entries: Vec<(Tool, Arc<dyn ToolHandler>)>,
}

impl ToolCollection {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, tool: Tool, handler: Arc<dyn ToolHandler>) {
        self.entries.retain(|(t, _)| t.name != tool.name);
        self.entries.push((tool, handler));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn list(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.entries.iter().map(|(t, _)| t.clone()).collect(),
            next_cursor: None,
        }
    }

    async fn call(&self, request: CallToolRequest, ctx: RequestContext) -> McpResult<CallToolResult> {
        let Some((_, handler)) = self.entries.iter().find(|(t, _)| t.name == request.name) else {
            return Err(McpError::invalid_params(format!("unknown tool: {}", request.name)));
        };
        let arguments = request.arguments.map(Value::Object);
        handler.call(arguments, ctx).await
    }
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(
        &self,
        arguments: Option<HashMap<String, String>>,
        ctx: RequestContext,
    ) -> McpResult<GetPromptResult>;
}

#[async_trait]
impl<F, Fut> PromptHandler for F
where
    F: Fn(Option<HashMap<String, String>>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
{
    async fn get(
        &self,
        arguments: Option<HashMap<String, String>>,
        ctx: RequestContext,
    ) -> McpResult<GetPromptResult> {
        (self)(arguments, ctx).await
    }
}

#[derive(Default)]
pub struct PromptCollection {
    entries: Vec<(Prompt, Arc<dyn PromptHandler>)>,
}

impl PromptCollection {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, prompt: Prompt, handler: Arc<dyn PromptHandler>) {
        self.entries.retain(|(p, _)| p.name != prompt.name);
        self.entries.push((prompt, handler));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn list(&self) -> ListPromptsResult {
        ListPromptsResult {
            prompts: self.entries.iter().map(|(p, _)| p.clone()).collect(),
            next_cursor: None,
        }
    }

    async fn get(&self, request: GetPromptRequest, ctx: RequestContext) -> McpResult<GetPromptResult> {
        let Some((_, handler)) = self.entries.iter().find(|(p, _)| p.name == request.name) else {
            return Err(McpError::invalid_params(format!("unknown prompt: {}", request.name)));
        };
        handler.get(request.arguments, ctx).await
    }
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &str, ctx: RequestContext) -> McpResult<ReadResourceResult>;
}

#[async_trait]
impl<F, Fut> ResourceHandler for F
where
    F: Fn(String, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<ReadResourceResult>> + Send + 'static,
{
    async fn read(&self, uri: &str, ctx: RequestContext) -> McpResult<ReadResourceResult> {
        (self)(uri.to_string(), ctx).await
    }
}

#[derive(Default)]
pub struct ResourceCollection {
    entries: Vec<(Resource, Arc<dyn ResourceHandler>)>,
}

impl ResourceCollection {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, resource: Resource, handler: Arc<dyn ResourceHandler>) {
        self.entries.retain(|(r, _)| r.uri != resource.uri);
        self.entries.push((resource, handler));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn list(&self) -> ListResourcesResult {
        ListResourcesResult {
            resources: self.entries.iter().map(|(r, _)| r.clone()).collect(),
            next_cursor: None,
        }
    }

    async fn read(&self, request: ReadResourceRequest, ctx: RequestContext) -> McpResult<ReadResourceResult> {
        let Some((_, handler)) = self.entries.iter().find(|(r, _)| r.uri == request.uri) else {
            return Err(McpError::invalid_params(format!("unknown resource: {}", request.uri)));
        };
        handler.read(&request.uri, ctx).await
    }
}

/// Identifies one `subscribe_notification` registration so it can later be removed
/// with `unsubscribe_notification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The read-only routing table the session engine dispatches through once running.
pub struct HandlerRegistry {
    requests: HashMap<String, Arc<dyn RequestHandler>>,
    request_filters: HashMap<String, Vec<Arc<dyn Filter>>>,
    notifications: RwLock<HashMap<String, Vec<(SubscriptionId, Arc<dyn NotificationHandler>)>>>,
    next_subscription_id: AtomicU64,
    has_tools: bool,
    has_prompts: bool,
    has_resources: bool,
}

impl HandlerRegistry {
    #[must_use]
    pub fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.get(method).cloned()
    }

    #[must_use]
    pub fn request_filters(&self, method: &str) -> &[Arc<dyn Filter>] {
        self.request_filters
            .get(method)
            .map_or(&[], |filters| filters.as_slice())
    }

    /// Snapshot of the notification subscribers for `method` at the time of the call,
    /// so that dispatch is unaffected by concurrent `subscribe`/`unsubscribe` calls.
    #[must_use]
    pub fn notification_handlers(&self, method: &str) -> Vec<Arc<dyn NotificationHandler>> {
        self.notifications
            .read()
            .get(method)
            .map(|subscribers| subscribers.iter().map(|(_, handler)| handler.clone()).collect())
            .unwrap_or_default()
    }

    /// Append a notification subscriber at runtime, returning a handle that can later
    /// be passed to `unsubscribe_notification` to remove it.
    pub fn subscribe_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id.fetch_add(1, Ordering::Relaxed));
        self.notifications
            .write()
            .entry(method.into())
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a notification subscriber previously registered with
    /// `subscribe_notification`. A no-op if `id` is unknown or already removed.
    pub fn unsubscribe_notification(&self, method: &str, id: SubscriptionId) {
        if let Some(subscribers) = self.notifications.write().get_mut(method) {
            subscribers.retain(|(existing, _)| *existing != id);
        }
    }

    /// Whether a `tools/*` handler (explicit or synthesized) is routable — used to
    /// derive `ServerCapabilities.tools` at build time, per the capability
    /// self-advertisement design note.
    #[must_use]
    pub fn advertises_tools(&self) -> bool {
        self.has_tools
    }

    #[must_use]
    pub fn advertises_prompts(&self) -> bool {
        self.has_prompts
    }

    #[must_use]
    pub fn advertises_resources(&self) -> bool {
        self.has_resources
    }
}

/// Builds a [`HandlerRegistry`]. Registration is serial and must complete before the
/// session starts; the synthesis decision (collection vs. explicit handler) is made
/// once, in [`HandlerRegistryBuilder::build`], not re-evaluated per request.
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    requests: HashMap<String, Arc<dyn RequestHandler>>,
    request_filters: HashMap<String, Vec<Arc<dyn Filter>>>,
    notifications: HashMap<String, Vec<Arc<dyn NotificationHandler>>>,
    tools: Option<ToolCollection>,
    prompts: Option<PromptCollection>,
    resources: Option<ResourceCollection>,
}

impl HandlerRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request handler for `method`. Last writer wins: registering a
    /// handler is a set operation keyed on method.
    #[must_use]
    pub fn register_request_handler(
        mut self,
        method: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> Self {
        self.requests.insert(method.into(), Arc::new(handler));
        self
    }

    /// Register a typed request handler from a plain async closure.
    #[must_use]
    pub fn register_typed<F, Req, Res, Fut>(self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Req, RequestContext) -> Fut + Send + Sync + 'static,
        Req: DeserializeOwned + Send + 'static,
        Res: Serialize + 'static,
        Fut: Future<Output = McpResult<Res>> + Send + 'static,
    {
        self.register_request_handler(method, TypedRequestHandler::new(handler))
    }

    #[must_use]
    pub fn register_notification_handler(
        mut self,
        method: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) -> Self {
        self.notifications.entry(method.into()).or_default().push(handler);
        self
    }

    /// Append a filter to the per-request stack for `method`, run between the
    /// session's inbound filter chain and the handler body.
    #[must_use]
    pub fn register_request_filter(mut self, method: impl Into<String>, filter: Arc<dyn Filter>) -> Self {
        self.request_filters.entry(method.into()).or_default().push(filter);
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolCollection) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptCollection) -> Self {
        self.prompts = Some(prompts);
        self
    }

    #[must_use]
    pub fn with_resources(mut self, resources: ResourceCollection) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Finalize the registry, synthesizing `tools/list`/`tools/call` (respectively
    /// prompts/resources) from any non-empty collection whose methods were not given
    /// explicit handlers above.
    #[must_use]
    pub fn build(mut self) -> HandlerRegistry {
        if let Some(tools) = self.tools.take() {
            if !tools.is_empty() {
                let tools = Arc::new(tools);
                let for_list = tools.clone();
                self.requests
                    .entry("tools/list".to_string())
                    .or_insert_with(|| {
                        Arc::new(TypedRequestHandler::new(
                            move |_req: mcprs_core::types::ListToolsRequest, _ctx: RequestContext| {
                                let tools = for_list.clone();
                                async move { Ok(tools.list()) }
                            },
                        ))
                    });
                self.requests.entry("tools/call".to_string()).or_insert_with(|| {
                    Arc::new(TypedRequestHandler::new(
                        move |req: CallToolRequest, ctx: RequestContext| {
                            let tools = tools.clone();
                            async move { tools.call(req, ctx).await }
                        },
                    ))
                });
            }
        }

        if let Some(prompts) = self.prompts.take() {
            if !prompts.is_empty() {
                let prompts = Arc::new(prompts);
                let for_list = prompts.clone();
                self.requests
                    .entry("prompts/list".to_string())
                    .or_insert_with(|| {
                        Arc::new(TypedRequestHandler::new(
                            move |_req: mcprs_core::types::ListPromptsRequest, _ctx: RequestContext| {
                                let prompts = for_list.clone();
                                async move { Ok(prompts.list()) }
                            },
                        ))
                    });
                self.requests.entry("prompts/get".to_string()).or_insert_with(|| {
                    Arc::new(TypedRequestHandler::new(
                        move |req: GetPromptRequest, ctx: RequestContext| {
                            let prompts = prompts.clone();
                            async move { prompts.get(req, ctx).await }
                        },
                    ))
                });
            }
        }

        if let Some(resources) = self.resources.take() {
            if !resources.is_empty() {
                let resources = Arc::new(resources);
                let for_list = resources.clone();
                self.requests
                    .entry("resources/list".to_string())
                    .or_insert_with(|| {
                        Arc::new(TypedRequestHandler::new(
                            move |_req: mcprs_core::types::ListResourcesRequest, _ctx: RequestContext| {
                                let resources = for_list.clone();
                                async move { Ok(resources.list()) }
                            },
                        ))
                    });
                self.requests.entry("resources/read".to_string()).or_insert_with(|| {
                    Arc::new(TypedRequestHandler::new(
                        move |req: ReadResourceRequest, ctx: RequestContext| {
                            let resources = resources.clone();
                            async move { resources.read(req, ctx).await }
                        },
                    ))
                });
            }
        }

        let has_tools = self.requests.contains_key("tools/list");
        let has_prompts = self.requests.contains_key("prompts/list");
        let has_resources = self.requests.contains_key("resources/list");

        let next_subscription_id = AtomicU64::new(0);
        let notifications = self
            .notifications
            .into_iter()
            .map(|(method, handlers)| {
                let tagged = handlers
                    .into_iter()
                    .map(|handler| {
                        let id = SubscriptionId(next_subscription_id.fetch_add(1, Ordering::Relaxed));
                        (id, handler)
                    })
                    .collect();
                (method, tagged)
            })
            .collect();

        HandlerRegistry {
            requests: self.requests,
            request_filters: self.request_filters,
            notifications: RwLock::new(notifications),
            next_subscription_id,
            has_tools,
            has_prompts,
            has_resources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_core::types::{CallToolResult, Tool};

    #[tokio::test]
    async fn explicit_handler_takes_precedence_over_synthesis() {
        let mut tools = ToolCollection::new();
        tools.register(
            Tool::new("echo", "echoes"),
            Arc::new(|_args: Option<Value>, _ctx: RequestContext| async move {
                Ok(CallToolResult::text("from collection"))
            }),
        );

        let registry = HandlerRegistryBuilder::new()
            .with_tools(tools)
            .register_typed("tools/call", |_req: CallToolRequest, _ctx: RequestContext| async move {
                Ok(CallToolResult::text("from explicit handler"))
            })
            .build();

        let handler = registry.request_handler("tools/call").unwrap();
        let ctx = RequestContext::new("tools/call", None);
        let result = handler
            .handle(Some(serde_json::json!({"name": "echo"})), ctx)
            .await
            .unwrap();
        let result: CallToolResult = serde_json::from_value(result).unwrap();
        assert_eq!(result.content.len(), 1);
    }

    #[tokio::test]
    async fn synthesizes_tools_list_from_non_empty_collection() {
        let mut tools = ToolCollection::new();
        tools.register(
            Tool::new("echo", "echoes"),
            Arc::new(|_args: Option<Value>, _ctx: RequestContext| async move { Ok(CallToolResult::text("ok")) }),
        );

        let registry = HandlerRegistryBuilder::new().with_tools(tools).build();
        assert!(registry.advertises_tools());
        assert!(registry.request_handler("tools/list").is_some());
    }

    #[tokio::test]
    async fn empty_collection_synthesizes_nothing() {
        let registry = HandlerRegistryBuilder::new()
            .with_tools(ToolCollection::new())
            .build();
        assert!(!registry.advertises_tools());
        assert!(registry.request_handler("tools/list").is_none());
    }

    #[tokio::test]
    async fn unknown_method_has_no_handler() {
        let registry = HandlerRegistryBuilder::new().build();
        assert!(registry.request_handler("nonexistent").is_none());
    }

    #[tokio::test]
    async fn notification_handlers_snapshot_at_dispatch_time() {
        let registry = HandlerRegistryBuilder::new().build();
        let calls = Arc::new(parking_lot::Mutex::new(0));
        let calls_clone = calls.clone();
        registry.subscribe_notification(
            "notifications/initialized",
            Arc::new(move |_params: Option<Value>, _ctx: NotificationContext| {
                let calls = calls_clone.clone();
                async move {
                    *calls.lock() += 1;
                }
            }),
        );
        let handlers = registry.notification_handlers("notifications/initialized");
        assert_eq!(handlers.len(), 1);
        handlers[0]
            .handle(None, NotificationContext { method: "notifications/initialized".into(), bag: serde_json::Map::new() })
            .await;
        assert_eq!(*calls.lock(), 1);
    }
}
