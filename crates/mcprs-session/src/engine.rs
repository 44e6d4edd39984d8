//! The session engine (C5): the read loop, write path, handshake, and the single
//! in-memory state machine that ties the correlation table, filter pipeline, and
//! handler registry together over one [`Transport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcprs_core::jsonrpc::utils::parse_message;
use mcprs_core::types::{ClientCapabilities, Implementation, InitializeRequest, InitializeResult};
use mcprs_core::{
    ErrorKind, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    McpError, McpResult, RequestId,
};
use mcprs_transport::Transport;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::correlation::CorrelationTable;
use crate::filter::{BoxFuture, Filter, MessageContext, MessageDirection};
use crate::registry::{HandlerRegistry, NotificationContext, ProgressSink, RequestContext};

/// Which side of the conversation this session is driving. A client sends
/// `initialize` first; a server waits for one and never initiates a handshake of its
/// own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The session's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Opening,
    Running,
    ShuttingDown,
    Closed,
}

/// Client-side handshake configuration: which protocol version to request, how long
/// to wait for the server's reply, and what to advertise as `clientInfo`/capabilities.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    /// A specific version to require, or `None` to request the latest and accept any
    /// version in `supported_versions`.
    pub requested_version: Option<String>,
    pub supported_versions: Vec<String>,
    pub timeout: Duration,
    pub client_info: Implementation,
    pub capabilities: ClientCapabilities,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            requested_version: None,
            supported_versions: vec![mcprs_core::PROTOCOL_VERSION.to_string()],
            timeout: Duration::from_secs(60),
            client_info: Implementation::default(),
            capabilities: ClientCapabilities::default(),
        }
    }
}

impl HandshakeConfig {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_requested_version(mut self, version: impl Into<String>) -> Self {
        self.requested_version = Some(version.into());
        self
    }

    #[must_use]
    pub fn with_client_info(mut self, client_info: Implementation) -> Self {
        self.client_info = client_info;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn requested(&self) -> &str {
        self.requested_version
            .as_deref()
            .unwrap_or(mcprs_core::PROTOCOL_VERSION)
    }
}

/// One progress report the peer emitted for a request this side sent, correlated back
/// to the caller by the progress token `send_request` assigned.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Per-call overrides for [`Session::send_request`].
#[derive(Default, Clone)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub cancellation: Option<CancellationToken>,
    pub meta: Option<Value>,
    /// If set, `send_request` assigns a progress token, carries it in
    /// `_meta.progressToken`, and forwards every `notifications/progress` the peer
    /// sends back bearing that token to this channel.
    pub progress: Option<mpsc::UnboundedSender<ProgressUpdate>>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, sink: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        self.progress = Some(sink);
        self
    }
}

/// The session engine itself. Always accessed through a [`SessionHandle`], which is
/// just a cheap `Clone` wrapper so the read-loop task and every caller share one
/// instance.
pub struct Session {
    role: Role,
    transport: Arc<dyn Transport>,
    correlation: CorrelationTable,
    registry: Arc<HandlerRegistry>,
    inbound_filters: Vec<Arc<dyn Filter>>,
    outbound_filters: Vec<Arc<dyn Filter>>,
    state: RwLock<SessionState>,
    negotiated_version: RwLock<Option<String>>,
    write_lock: tokio::sync::Mutex<()>,
    inbound_cancellations: Mutex<HashMap<RequestId, CancellationToken>>,
    progress_subscribers: Mutex<HashMap<String, mpsc::UnboundedSender<ProgressUpdate>>>,
}

impl Session {
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn negotiated_protocol_version(&self) -> Option<String> {
        self.negotiated_version.read().clone()
    }

    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.correlation.pending_count()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    async fn send_outbound(&self, message: JsonRpcMessage) -> McpResult<()> {
        let mut ctx = MessageContext::new(MessageDirection::Outbound, message);
        let transport = self.transport.clone();
        let terminal = move |ctx: &mut MessageContext| -> BoxFuture<'static, McpResult<()>> {
            let transport = transport.clone();
            let message = std::mem::replace(
                &mut ctx.message,
                JsonRpcMessage::Notification(JsonRpcNotification::new("", None)),
            );
            Box::pin(async move {
                let bytes = mcprs_core::jsonrpc::utils::serialize_message(&message)?;
                let id = message.id().cloned().unwrap_or(RequestId::Number(0));
                transport
                    .send(mcprs_transport::TransportMessage::new(id, bytes))
                    .await
                    .map_err(McpError::from)
            })
        };
        let _guard = self.write_lock.lock().await;
        crate::filter::run_chain(&self.outbound_filters, &mut ctx, &terminal).await
    }

    async fn send_cancelled_notification(&self, id: RequestId, reason: &str) {
        let params = serde_json::json!({ "requestId": id, "reason": reason });
        let note = JsonRpcNotification::new("notifications/cancelled", Some(params));
        if let Err(err) = self.send_outbound(JsonRpcMessage::Notification(note)).await {
            tracing::warn!(%err, "failed to send notifications/cancelled");
        }
    }

    /// Send a fire-and-forget notification.
    pub async fn send_notification(&self, method: impl Into<String>, params: Option<Value>) -> McpResult<()> {
        let note = JsonRpcNotification::new(method, params);
        self.send_outbound(JsonRpcMessage::Notification(note)).await
    }

    /// Send a request and await its response, honoring an optional timeout and
    /// cancellation signal. The underlying id is allocated monotonically by the
    /// correlation table.
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        let method = method.into();
        if matches!(self.state(), SessionState::Closed | SessionState::ShuttingDown) {
            return Err(McpError::invalid_state(format!(
                "cannot send {method}: session is {:?}",
                self.state()
            )));
        }

        let slot = self.correlation.register(method.clone());
        let id = slot.id.clone();

        let progress_key = options.progress.as_ref().map(|_| id.to_string());
        let mut meta = options.meta;
        if let (Some(sender), Some(key)) = (options.progress, progress_key.clone()) {
            let mut fields = meta
                .take()
                .and_then(|value| match value {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .unwrap_or_default();
            fields.insert("progressToken".to_string(), Value::String(key.clone()));
            meta = Some(Value::Object(fields));
            self.progress_subscribers.lock().insert(key, sender);
        }

        let mut request = JsonRpcRequest::new(id.clone(), method, params);
        request.meta = meta;
        if let Err(err) = self.send_outbound(JsonRpcMessage::Request(request)).await {
            if let Some(key) = &progress_key {
                self.progress_subscribers.lock().remove(key);
            }
            return Err(err);
        }

        let wait = slot.wait(options.cancellation.clone());
        let result = match options.timeout {
            Some(duration) => match tokio::time::timeout(duration, wait).await {
                Ok(result) => result,
                Err(_) => {
                    self.correlation.cancel(&id, "request timed out");
                    if let Some(key) = &progress_key {
                        self.progress_subscribers.lock().remove(key);
                    }
                    return Err(McpError::timeout(format!(
                        "request {id} timed out after {duration:?}"
                    )));
                }
            },
            None => wait.await,
        };

        if options.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            self.correlation.cancel(&id, "cancelled by caller");
            self.send_cancelled_notification(id, "cancelled by caller").await;
        }

        if let Some(key) = &progress_key {
            self.progress_subscribers.lock().remove(key);
        }

        result
    }

    /// Perform the client-side `initialize` handshake. Only meaningful for
    /// [`Role::Client`]; moves the session from `Opening` to `Running` on success, or
    /// to `Closed` on any failure (version mismatch, timeout, transport error).
    pub async fn initialize(&self, config: &HandshakeConfig) -> McpResult<InitializeResult> {
        if self.role != Role::Client {
            return Err(McpError::invalid_state("only a client session performs initialize"));
        }

        let request = InitializeRequest {
            protocol_version: config.requested().to_string(),
            capabilities: config.capabilities.clone(),
            client_info: config.client_info.clone(),
        };
        let params = serde_json::to_value(&request)?;

        let outcome = self
            .send_request(
                "initialize",
                Some(params),
                RequestOptions {
                    timeout: Some(config.timeout),
                    ..Default::default()
                },
            )
            .await;

        let result = match outcome {
            Ok(value) => value,
            Err(err) => {
                self.set_state(SessionState::Closed);
                return Err(err);
            }
        };

        let result: InitializeResult = match serde_json::from_value(result) {
            Ok(result) => result,
            Err(err) => {
                self.set_state(SessionState::Closed);
                return Err(McpError::parse_error(err.to_string()));
            }
        };

        let agreed = result.protocol_version.clone();
        let version_ok = match &config.requested_version {
            Some(requested) => &agreed == requested,
            None => config.supported_versions.iter().any(|v| v == &agreed),
        };
        if !version_ok {
            self.set_state(SessionState::Closed);
            return Err(McpError::protocol_version_mismatch(config.requested(), agreed));
        }

        *self.negotiated_version.write() = Some(agreed);

        if let Err(err) = self.send_notification("notifications/initialized", None).await {
            self.set_state(SessionState::Closed);
            return Err(err);
        }

        self.set_state(SessionState::Running);
        Ok(result)
    }

    async fn dispatch_inbound(self: &Arc<Self>, mut ctx: MessageContext) {
        let session = self.clone();
        let terminal = move |ctx: &mut MessageContext| -> BoxFuture<'static, McpResult<()>> {
            let session = session.clone();
            let message = std::mem::replace(
                &mut ctx.message,
                JsonRpcMessage::Notification(JsonRpcNotification::new("", None)),
            );
            let bag = std::mem::take(&mut ctx.bag);
            Box::pin(async move { session.dispatch_terminal(message, bag).await })
        };
        if let Err(err) = crate::filter::run_chain(&self.inbound_filters, &mut ctx, &terminal).await {
            tracing::warn!(%err, "inbound filter chain rejected message");
        }
    }

    async fn dispatch_terminal(
        self: Arc<Self>,
        message: JsonRpcMessage,
        bag: serde_json::Map<String, Value>,
    ) -> McpResult<()> {
        match message {
            JsonRpcMessage::Response(response) => {
                self.correlation.complete(&response.id, response.payload);
                Ok(())
            }
            JsonRpcMessage::Notification(note) => {
                self.dispatch_notification(note, bag).await;
                Ok(())
            }
            JsonRpcMessage::Request(request) => {
                self.dispatch_request(request, bag).await;
                Ok(())
            }
        }
    }

    async fn dispatch_notification(self: &Arc<Self>, note: JsonRpcNotification, bag: serde_json::Map<String, Value>) {
        if note.method == "notifications/cancelled" {
            if let Some(id) = note
                .params
                .as_ref()
                .and_then(|p| p.get("requestId"))
                .and_then(|v| {
                    v.as_str()
                        .map(|s| RequestId::String(s.to_string()))
                        .or_else(|| v.as_i64().map(RequestId::Number))
                })
            {
                if let Some(token) = self.inbound_cancellations.lock().get(&id) {
                    token.cancel();
                }
            }
            return;
        }

        if note.method == "notifications/progress" {
            let token = note.params.as_ref().and_then(|p| p.get("progressToken"));
            let key = match token {
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None => None,
            };
            if let Some(key) = key {
                let sender = self.progress_subscribers.lock().get(&key).cloned();
                if let Some(sender) = sender {
                    let progress = note
                        .params
                        .as_ref()
                        .and_then(|p| p.get("progress"))
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    let total = note.params.as_ref().and_then(|p| p.get("total")).and_then(Value::as_u64);
                    let message = note
                        .params
                        .as_ref()
                        .and_then(|p| p.get("message"))
                        .and_then(|v| v.as_str().map(str::to_string));
                    let _ = sender.send(ProgressUpdate { progress, total, message });
                    return;
                }
            }
        }

        let handlers = self.registry.notification_handlers(&note.method);
        if handlers.is_empty() {
            tracing::debug!(method = %note.method, "no subscriber for notification");
            return;
        }
        for handler in handlers {
            let ctx = NotificationContext {
                method: note.method.clone(),
                bag: bag.clone(),
            };
            let params = note.params.clone();
            tokio::spawn(async move {
                handler.handle(params, ctx).await;
            });
        }
    }

    async fn dispatch_request(self: &Arc<Self>, request: JsonRpcRequest, bag: serde_json::Map<String, Value>) {
        let Some(handler) = self.registry.request_handler(&request.method) else {
            let response = JsonRpcResponse::error(
                request.id,
                JsonRpcError::new(-32601, format!("method not found: {}", request.method)),
            );
            if let Err(err) = self.send_outbound(JsonRpcMessage::Response(response)).await {
                tracing::warn!(%err, "failed to send method-not-found response");
            }
            return;
        };

        let token = CancellationToken::new();
        self.inbound_cancellations.lock().insert(request.id.clone(), token.clone());

        let progress_token = request.progress_token().cloned();
        let session = self.clone();
        let progress = ProgressSink::new(
            progress_token,
            Arc::new(move |token, progress, total, message| {
                let session = session.clone();
                Box::pin(async move {
                    let params = serde_json::json!({
                        "progressToken": token,
                        "progress": progress,
                        "total": total,
                        "message": message,
                    });
                    let _ = session.send_notification("notifications/progress", Some(params)).await;
                })
            }),
        );

        let filters = self.registry.request_filters(&request.method).to_vec();
        let id = request.id.clone();
        let params = request.params.clone();
        let meta = request.meta.clone();
        let method = request.method.clone();

        // Per-request filters run between the session's inbound chain and the
        // handler body; whatever they add to the bag is visible to the handler.
        let mut message_ctx = MessageContext::new(MessageDirection::Inbound, JsonRpcMessage::Request(request));
        message_ctx.bag = bag;
        let terminal = |_ctx: &mut MessageContext| -> BoxFuture<'static, McpResult<()>> {
            Box::pin(async move { Ok(()) })
        };
        let filter_result = crate::filter::run_chain(&filters, &mut message_ctx, &terminal).await;

        let outcome = match filter_result {
            Ok(()) => {
                let ctx = RequestContext {
                    method,
                    meta,
                    bag: message_ctx.bag,
                    progress,
                    cancellation: token,
                };
                handler.handle(params, ctx).await
            }
            Err(err) => Err(err),
        };

        self.inbound_cancellations.lock().remove(&id);

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::error(id, JsonRpcError::from(&err)),
        };
        if let Err(err) = self.send_outbound(JsonRpcMessage::Response(response)).await {
            tracing::warn!(%err, "failed to send response");
        }
    }

    async fn read_loop(self: Arc<Self>) {
        loop {
            if matches!(self.state(), SessionState::Closed) {
                break;
            }
            match self.transport.receive().await {
                Ok(Some(message)) => match parse_message(&message.payload) {
                    Ok(parsed) => {
                        let ctx = MessageContext::new(MessageDirection::Inbound, parsed);
                        self.dispatch_inbound(ctx).await;
                    }
                    Err(err) => {
                        tracing::warn!(%err, "dropping malformed inbound message");
                    }
                },
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(err) => {
                    tracing::error!(%err, "transport read failed, closing session");
                    self.correlation.dispose(format!("transport error: {err}"));
                    self.set_state(SessionState::Closed);
                    break;
                }
            }
        }
    }

    /// Tear down the session: stop accepting new work, fail every outstanding
    /// request, and disconnect the transport. Idempotent.
    pub async fn dispose(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.set_state(SessionState::ShuttingDown);
        self.correlation.dispose(reason);
        if let Err(err) = self.transport.disconnect().await {
            tracing::warn!(%err, "transport disconnect failed during dispose");
        }
        self.set_state(SessionState::Closed);
    }
}

/// A cheap, `Clone`-able reference to a running [`Session`], returned by
/// [`SessionHandle::spawn`]. The read loop owns its own clone of the same `Arc`, so
/// the session stays alive as long as either the handle or the read-loop task does.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Session>,
}

impl SessionHandle {
    /// Connect `transport` and start the read loop in the background.
    pub async fn spawn(
        role: Role,
        transport: Arc<dyn Transport>,
        registry: Arc<HandlerRegistry>,
        inbound_filters: Vec<Arc<dyn Filter>>,
        outbound_filters: Vec<Arc<dyn Filter>>,
    ) -> McpResult<Self> {
        transport.connect().await.map_err(McpError::from)?;
        let session = Arc::new(Session {
            role,
            transport,
            correlation: CorrelationTable::new(),
            registry,
            inbound_filters,
            outbound_filters,
            state: RwLock::new(SessionState::Opening),
            negotiated_version: RwLock::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            inbound_cancellations: Mutex::new(HashMap::new()),
            progress_subscribers: Mutex::new(HashMap::new()),
        });
        tokio::spawn(Session::read_loop(session.clone()));
        Ok(Self { session })
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    #[must_use]
    pub fn negotiated_protocol_version(&self) -> Option<String> {
        self.session.negotiated_protocol_version()
    }

    pub async fn initialize(&self, config: &HandshakeConfig) -> McpResult<InitializeResult> {
        self.session.initialize(config).await
    }

    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        self.session.send_request(method, params, options).await
    }

    pub async fn send_notification(&self, method: impl Into<String>, params: Option<Value>) -> McpResult<()> {
        self.session.send_notification(method, params).await
    }

    pub async fn dispose(&self, reason: impl Into<String>) {
        self.session.dispose(reason).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistryBuilder;
    use mcprs_core::types::{ClientCapabilities, Implementation, ServerCapabilities};
    use mcprs_transport::{TransportCapabilities, TransportMessage, TransportResult, TransportState, TransportType};
    use tokio::sync::Mutex as AsyncMutex;

    #[derive(Debug)]
    struct MockTransport {
        inbound: AsyncMutex<std::collections::VecDeque<TransportMessage>>,
        outbound: AsyncMutex<Vec<TransportMessage>>,
        state: AsyncMutex<TransportState>,
        capabilities: TransportCapabilities,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                inbound: AsyncMutex::new(std::collections::VecDeque::new()),
                outbound: AsyncMutex::new(Vec::new()),
                state: AsyncMutex::new(TransportState::Disconnected),
                capabilities: TransportCapabilities::default(),
            }
        }

        async fn push_server_response(&self, id: RequestId, result: Value) {
            let response = JsonRpcResponse::success(id, result);
            let bytes = mcprs_core::jsonrpc::utils::serialize_message(&JsonRpcMessage::Response(response)).unwrap();
            self.inbound
                .lock()
                .await
                .push_back(TransportMessage::new(RequestId::Number(0), bytes));
        }

        async fn push_server_notification(&self, method: &str, params: Value) {
            let note = JsonRpcNotification::new(method, Some(params));
            let bytes = mcprs_core::jsonrpc::utils::serialize_message(&JsonRpcMessage::Notification(note)).unwrap();
            self.inbound
                .lock()
                .await
                .push_back(TransportMessage::new(RequestId::Number(0), bytes));
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        fn transport_type(&self) -> TransportType {
            TransportType::Stdio
        }

        fn capabilities(&self) -> &TransportCapabilities {
            &self.capabilities
        }

        async fn state(&self) -> TransportState {
            *self.state.lock().await
        }

        async fn connect(&self) -> TransportResult<()> {
            *self.state.lock().await = TransportState::Connected;
            Ok(())
        }

        async fn disconnect(&self) -> TransportResult<()> {
            *self.state.lock().await = TransportState::Disconnected;
            Ok(())
        }

        async fn send(&self, message: TransportMessage) -> TransportResult<()> {
            self.outbound.lock().await.push(message);
            Ok(())
        }

        async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
            Ok(self.inbound.lock().await.pop_front())
        }
    }

    async fn spawn_client(transport: Arc<MockTransport>) -> SessionHandle {
        SessionHandle::spawn(
            Role::Client,
            transport,
            Arc::new(HandlerRegistryBuilder::new().build()),
            Vec::new(),
            Vec::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn handshake_happy_path_reaches_running() {
        let transport = Arc::new(MockTransport::new());
        let handle = spawn_client(transport.clone()).await;

        let server_task = {
            let transport = transport.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    if let Some(outbound) = transport.outbound.lock().await.pop() {
                        let message: JsonRpcMessage =
                            serde_json::from_slice(&outbound.payload).unwrap();
                        let id = message.id().cloned().unwrap();
                        let result = serde_json::to_value(InitializeResult {
                            protocol_version: mcprs_core::PROTOCOL_VERSION.to_string(),
                            capabilities: ServerCapabilities::default(),
                            server_info: Implementation::default(),
                        })
                        .unwrap();
                        transport.push_server_response(id, result).await;
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let config = HandshakeConfig::default().with_capabilities(ClientCapabilities::default());
        let result = handle.initialize(&config).await.unwrap();
        server_task.await.unwrap();

        assert_eq!(handle.state(), SessionState::Running);
        assert_eq!(result.protocol_version, mcprs_core::PROTOCOL_VERSION);
        assert_eq!(
            handle.negotiated_protocol_version().as_deref(),
            Some(mcprs_core::PROTOCOL_VERSION)
        );
    }

    #[tokio::test]
    async fn version_mismatch_closes_the_session() {
        let transport = Arc::new(MockTransport::new());
        let handle = spawn_client(transport.clone()).await;

        let server_task = {
            let transport = transport.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    if let Some(outbound) = transport.outbound.lock().await.pop() {
                        let message: JsonRpcMessage =
                            serde_json::from_slice(&outbound.payload).unwrap();
                        let id = message.id().cloned().unwrap();
                        let result = serde_json::to_value(InitializeResult {
                            protocol_version: "9999-01-01".to_string(),
                            capabilities: ServerCapabilities::default(),
                            server_info: Implementation::default(),
                        })
                        .unwrap();
                        transport.push_server_response(id, result).await;
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };

        let config = HandshakeConfig::default().with_requested_version(mcprs_core::PROTOCOL_VERSION);
        let err = handle.initialize(&config).await.unwrap_err();
        server_task.await.unwrap();

        assert_eq!(err.kind, ErrorKind::ProtocolVersionMismatch);
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_fails_pending_requests() {
        let transport = Arc::new(MockTransport::new());
        let handle = spawn_client(transport.clone()).await;
        handle.dispose("shutting down").await;
        handle.dispose("shutting down again").await;
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn progress_notifications_are_delivered_in_order_to_the_caller_sink() {
        let transport = Arc::new(MockTransport::new());
        let handle = spawn_client(transport.clone()).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let server_task = {
            let transport = transport.clone();
            tokio::spawn(async move {
                let (id, token) = loop {
                    if let Some(outbound) = transport.outbound.lock().await.pop() {
                        let message: JsonRpcMessage = serde_json::from_slice(&outbound.payload).unwrap();
                        let JsonRpcMessage::Request(request) = message else {
                            panic!("expected a request");
                        };
                        let token = request.progress_token().cloned().unwrap();
                        break (request.id, token);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                };

                for progress in [1.0, 2.0, 3.0] {
                    transport
                        .push_server_notification(
                            "notifications/progress",
                            serde_json::json!({ "progressToken": token, "progress": progress }),
                        )
                        .await;
                }
                transport.push_server_response(id, serde_json::json!({"done": true})).await;
            })
        };

        let options = RequestOptions::default().with_progress(tx);
        let result = handle.send_request("tools/call", None, options).await.unwrap();
        server_task.await.unwrap();

        assert_eq!(result, serde_json::json!({"done": true}));

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.progress);
        }
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);
    }
}
