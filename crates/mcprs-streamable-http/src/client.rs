//! The streamable HTTP client transport (C7): a single MCP endpoint speaking POST for
//! outbound requests, an optional long-lived GET for unsolicited server pushes, and
//! DELETE to terminate the session on dispose. Resumable via `Last-Event-ID`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mcprs_core::MessageId;
use reqwest::{Client as HttpClient, header};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info, warn};

use mcprs_transport::{
    Transport, TransportCapabilities, TransportError, TransportMessage, TransportMessageMetadata,
    TransportResult, TransportState, TransportType,
};

use crate::config::StreamableHttpClientConfig;
use crate::sse::{SseEvent, drain_events};

const INITIALIZE_METHOD: &str = "initialize";

/// Streamable HTTP client transport.
///
/// `connect`/`disconnect` only toggle lifecycle state; the actual HTTP session begins
/// with the first `send` (the `Mcp-Session-Id` and negotiated protocol version are
/// captured off that exchange) and the background GET/SSE reader is started lazily
/// once a session id is known, matching the "GET initiated at most once per session"
/// contract.
pub struct StreamableHttpTransport {
    config: StreamableHttpClientConfig,
    http: HttpClient,
    state: RwLock<TransportState>,
    capabilities: TransportCapabilities,

    session_id: RwLock<Option<String>>,
    owns_session: RwLock<bool>,
    negotiated_protocol_version: RwLock<Option<String>>,
    last_event_id: RwLock<Option<String>>,
    retry_interval: RwLock<Option<Duration>>,

    inbound_tx: mpsc::Sender<TransportMessage>,
    inbound_rx: Mutex<mpsc::Receiver<TransportMessage>>,
    get_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

impl StreamableHttpTransport {
    pub fn new(config: StreamableHttpClientConfig) -> TransportResult<Self> {
        config
            .validate()
            .map_err(TransportError::Configuration)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(1000);
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let session_id = config.resume.as_ref().map(|r| r.session_id.clone());
        let owns_session = config.resume.is_none();

        Ok(Self {
            config,
            http,
            state: RwLock::new(TransportState::Disconnected),
            capabilities: TransportCapabilities {
                max_message_size: Some(mcprs_core::MAX_MESSAGE_SIZE),
                supports_streaming: true,
                supports_bidirectional: true,
            },
            session_id: RwLock::new(session_id),
            owns_session: RwLock::new(owns_session),
            negotiated_protocol_version: RwLock::new(None),
            last_event_id: RwLock::new(None),
            retry_interval: RwLock::new(None),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            get_task: Mutex::new(None),
        })
    }

    async fn build_headers(&self, accept: &str) -> TransportResult<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_str(accept)
                .map_err(|e| TransportError::Configuration(e.to_string()))?,
        );

        if let Some(version) = self.negotiated_protocol_version.read().await.as_ref() {
            headers.insert(
                "MCP-Protocol-Version",
                header::HeaderValue::from_str(version)
                    .map_err(|e| TransportError::Configuration(e.to_string()))?,
            );
        }

        if let Some(session_id) = self.session_id.read().await.as_ref() {
            headers.insert(
                "Mcp-Session-Id",
                header::HeaderValue::from_str(session_id)
                    .map_err(|e| TransportError::Configuration(e.to_string()))?,
            );
        }

        if let Some(token) = &self.config.auth_token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| TransportError::Configuration(e.to_string()))?,
            );
        }

        for (key, value) in &self.config.headers {
            let name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| TransportError::Configuration(e.to_string()))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| TransportError::Configuration(e.to_string()))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    fn sniff_method(payload: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
        value.get("method")?.as_str().map(str::to_string)
    }

    fn sniff_initialize_protocol_version(payload: &[u8]) -> Option<String> {
        let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
        value
            .get("result")?
            .get("protocolVersion")?
            .as_str()
            .map(str::to_string)
    }

    async fn capture_session_headers(&self, response: &reqwest::Response) {
        if let Some(sid) = response
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(sid.to_string());
            info!(session_id = sid, "captured session id");
        }
    }

    async fn forward_sse_event(&self, event: SseEvent) -> TransportResult<()> {
        if let Some(id) = event.id.clone() {
            *self.last_event_id.write().await = Some(id);
        }
        if let Some(interval) = event.retry_interval() {
            *self.retry_interval.write().await = Some(interval);
        }
        if !event.has_data() {
            return Ok(());
        }

        let json: serde_json::Value = serde_json::from_str(&event.data)
            .map_err(|e| TransportError::SerializationFailed(format!("invalid SSE data: {e}")))?;
        let payload = serde_json::to_vec(&json)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;

        let message = TransportMessage::new(MessageId::from("sse-message"), Bytes::from(payload))
            .with_metadata(TransportMessageMetadata {
                event_id: event.id,
            });

        self.inbound_tx
            .send(message)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))
    }

    async fn drain_stream_into_inbound(&self, response: reqwest::Response) -> TransportResult<bool> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut saw_event = false;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            for event in drain_events(&mut buffer) {
                saw_event = true;
                if let Err(e) = self.forward_sse_event(event).await {
                    warn!(error = %e, "failed to forward SSE event");
                }
            }
        }
        Ok(saw_event)
    }

    /// Ensure the background GET/SSE reader is running. Idempotent; the GET is
    /// initiated at most once per session, per the transport contract.
    async fn ensure_get_task(self: &Arc<Self>) {
        let mut guard = self.get_task.lock().await;
        if guard.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            this.get_reader_loop().await;
        }));
    }

    /// The resumable GET/SSE reader. Implements the reconnection algorithm from the
    /// transport contract: delay before retrying once a `last-event-id` is known,
    /// give up outright on a non-5xx failure status, and reset the attempt counter
    /// whenever a reconnect makes progress (at least one event is read).
    async fn get_reader_loop(self: Arc<Self>) {
        let mut attempts: u32 = 0;
        let mut should_delay = self.last_event_id.read().await.is_some();

        loop {
            if attempts >= self.config_max_attempts() {
                warn!("GET/SSE reader giving up after max attempts");
                break;
            }
            if should_delay {
                let delay = self
                    .retry_interval
                    .read()
                    .await
                    .unwrap_or(self.config.default_retry_interval);
                tokio::time::sleep(delay).await;
            }
            should_delay = true;

            let headers = match self.build_headers("text/event-stream").await {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "failed to build GET headers, stopping reader");
                    break;
                }
            };

            match self.http.get(&self.config.endpoint).headers(headers).send().await {
                Ok(response) if response.status().is_server_error() => {
                    attempts += 1;
                }
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "GET/SSE reconnection refused, giving up");
                    break;
                }
                Ok(response) => {
                    debug!("GET/SSE stream established");
                    match self.drain_stream_into_inbound(response).await {
                        Ok(true) => attempts = 0,
                        Ok(false) => attempts += 1,
                        Err(e) => {
                            warn!(error = %e, "GET/SSE stream read failed");
                            attempts += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "GET/SSE connection attempt failed");
                    attempts += 1;
                }
            }
        }

        *self.state.write().await = TransportState::Disconnected;
    }

    fn config_max_attempts(&self) -> u32 {
        match &self.config.retry_policy {
            crate::config::RetryPolicy::Fixed { max_attempts, .. }
            | crate::config::RetryPolicy::Exponential { max_attempts, .. } => {
                max_attempts.unwrap_or(u32::MAX)
            }
            crate::config::RetryPolicy::Never => 0,
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::StreamableHttp
    }

    fn capabilities(&self) -> &TransportCapabilities {
        &self.capabilities
    }

    async fn state(&self) -> TransportState {
        *self.state.read().await
    }

    async fn connect(&self) -> TransportResult<()> {
        if *self.state.read().await == TransportState::Connected {
            return Ok(());
        }
        *self.state.write().await = TransportState::Connecting;
        *self.state.write().await = TransportState::Connected;
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        *self.state.write().await = TransportState::Disconnecting;

        if let Some(handle) = self.get_task.lock().await.take() {
            handle.abort();
        }

        if *self.owns_session.read().await
            && let Some(session_id) = self.session_id.read().await.clone()
        {
            if let Ok(mut headers) = self.build_headers("application/json").await {
                headers.remove(header::ACCEPT);
                let _ = self
                    .http
                    .delete(&self.config.endpoint)
                    .headers(headers)
                    .send()
                    .await;
            }
            debug!(session_id, "sent session termination DELETE (best effort)");
        }

        *self.state.write().await = TransportState::Disconnected;
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let method = Self::sniff_method(&message.payload);
        let is_initialize = method.as_deref() == Some(INITIALIZE_METHOD);

        if is_initialize && self.config.resume.is_some() {
            return Err(TransportError::Configuration(
                "cannot send 'initialize' on a transport constructed to resume an existing session"
                    .to_string(),
            ));
        }

        let headers = self.build_headers("application/json, text/event-stream").await?;
        let response = self
            .http
            .post(&self.config.endpoint)
            .headers(headers)
            .header(header::CONTENT_TYPE, "application/json")
            .body(message.payload.to_vec())
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(1024).collect();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: truncated,
            });
        }

        self.capture_session_headers(&response).await;

        if response.status() == reqwest::StatusCode::ACCEPTED {
            debug!("202 Accepted, no response body expected");
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/json") {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

            if is_initialize
                && let Some(version) = Self::sniff_initialize_protocol_version(&bytes)
            {
                *self.negotiated_protocol_version.write().await = Some(version);
            }

            let message = TransportMessage::new(MessageId::from("http-response"), bytes);
            self.inbound_tx
                .send(message)
                .await
                .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        } else if content_type.contains("text/event-stream") {
            debug!("processing inline SSE response to POST");
            match self.drain_stream_into_inbound(response).await {
                Ok(_) => {}
                Err(e) => warn!(error = %e, "inline POST SSE stream ended with an error"),
            }
        }

        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut receiver = self.inbound_rx.lock().await;
        match receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::ConnectionLost(
                "inbound channel disconnected".to_string(),
            )),
        }
    }

    async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }
}

/// Starts the background GET/SSE reader once a session id is known. The session
/// engine calls this (via [`crate::client::start_background_reader`]) after a
/// successful handshake, since the contract only allows one GET per session and it
/// needs the negotiated headers to already be in place.
pub async fn start_background_reader(transport: &Arc<StreamableHttpTransport>) {
    transport.ensure_get_task().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn construction_rejects_reserved_header() {
        let mut config = StreamableHttpClientConfig::default();
        config
            .headers
            .insert("Last-Event-ID".to_string(), "7".to_string());
        assert!(StreamableHttpTransport::new(config).is_err());
    }

    #[tokio::test]
    async fn connect_and_disconnect_toggle_state() {
        let transport = StreamableHttpTransport::new(StreamableHttpClientConfig::default()).unwrap();
        assert_eq!(transport.state().await, TransportState::Disconnected);
        transport.connect().await.unwrap();
        assert_eq!(transport.state().await, TransportState::Connected);
        transport.disconnect().await.unwrap();
        assert_eq!(transport.state().await, TransportState::Disconnected);
    }

    #[tokio::test]
    async fn resume_config_refuses_initialize() {
        let mut config = StreamableHttpClientConfig::default();
        config.resume = Some(crate::config::ResumeSession {
            session_id: "abc".to_string(),
        });
        let transport = StreamableHttpTransport::new(config).unwrap();
        let payload = serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        let message = TransportMessage::new(
            MessageId::from(1i64),
            Bytes::from(serde_json::to_vec(&payload).unwrap()),
        );
        let err = transport.send(message).await.unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));
    }

    #[test]
    fn sniffs_method_from_payload() {
        let payload = br#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        assert_eq!(
            StreamableHttpTransport::sniff_method(payload),
            Some("tools/list".to_string())
        );
    }

    #[test]
    fn sniffs_negotiated_protocol_version_from_initialize_result() {
        let payload = br#"{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18"}}"#;
        assert_eq!(
            StreamableHttpTransport::sniff_initialize_protocol_version(payload),
            Some("2025-06-18".to_string())
        );
    }
}
