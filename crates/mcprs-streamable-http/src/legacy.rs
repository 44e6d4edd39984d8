//! A minimal legacy SSE-only transport, scoped to exactly what the auto-detect
//! transport (C8) needs to prove the permanent-switchover invariant: GET an event
//! stream, discover the POST message endpoint from an `endpoint` event (a plain
//! string, not the JSON-object form the streamable client uses), then POST subsequent
//! outbound messages there. All server traffic — including responses to requests —
//! arrives over the one open GET stream.

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
    Transport, TransportCapabilities, TransportError, TransportMessage, TransportResult,
    TransportState, TransportType,
};

use crate::config::validate_http_endpoint;
use crate::sse::drain_events;

/// Configuration for [`LegacySseTransport`].
#[derive(Clone, Debug)]
pub struct LegacySseConfig {
    /// URL of the GET event stream endpoint.
    pub sse_endpoint: String,
    pub timeout: Duration,
    pub auth_token: Option<String>,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl LegacySseConfig {
    pub fn new(sse_endpoint: impl Into<String>) -> Self {
        Self {
            sse_endpoint: sse_endpoint.into(),
            timeout: Duration::from_secs(30),
            auth_token: None,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 5,
        }
    }
}

pub struct LegacySseTransport {
    config: LegacySseConfig,
    http: HttpClient,
    state: RwLock<TransportState>,
    capabilities: TransportCapabilities,
    message_endpoint: RwLock<Option<String>>,
    last_event_id: RwLock<Option<String>>,
    inbound_tx: mpsc::Sender<TransportMessage>,
    inbound_rx: Mutex<mpsc::Receiver<TransportMessage>>,
    reader_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for LegacySseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacySseTransport")
            .field("sse_endpoint", &self.config.sse_endpoint)
            .finish()
    }
}

impl LegacySseTransport {
    pub fn new(config: LegacySseConfig) -> TransportResult<Self> {
        validate_http_endpoint(&config.sse_endpoint).map_err(TransportError::Configuration)?;

        let (inbound_tx, inbound_rx) = mpsc::channel(1000);
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            config,
            http,
            state: RwLock::new(TransportState::Disconnected),
            capabilities: TransportCapabilities {
                max_message_size: Some(mcprs_core::MAX_MESSAGE_SIZE),
                supports_streaming: true,
                supports_bidirectional: true,
            },
            message_endpoint: RwLock::new(None),
            last_event_id: RwLock::new(None),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            reader_task: Mutex::new(None),
        })
    }

    async fn ensure_reader(self: &Arc<Self>) {
        let mut guard = self.reader_task.lock().await;
        if guard.is_some() {
            return;
        }
        let this = Arc::clone(self);
        *guard = Some(tokio::spawn(async move {
            this.reader_loop().await;
        }));
    }

    async fn reader_loop(self: Arc<Self>) {
        let mut attempts = 0u32;

        loop {
            if self.config.max_reconnect_attempts > 0 && attempts >= self.config.max_reconnect_attempts {
                warn!("legacy SSE reader giving up after max reconnect attempts");
                break;
            }

            let mut request = self
                .http
                .get(&self.config.sse_endpoint)
                .header(header::ACCEPT, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache");

            if let Some(token) = &self.config.auth_token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            if let Some(last_id) = self.last_event_id.read().await.as_ref() {
                request = request.header("Last-Event-ID", last_id);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("legacy SSE connection established");
                    attempts = 0;
                    *self.state.write().await = TransportState::Connected;

                    if let Err(e) = self.drain_into_inbound(response).await {
                        warn!(error = %e, "legacy SSE stream ended with error");
                    }
                    *self.state.write().await = TransportState::Disconnected;
                }
                Ok(response) => {
                    warn!(status = %response.status(), "legacy SSE connection rejected");
                    attempts += 1;
                }
                Err(e) => {
                    warn!(error = %e, "legacy SSE connection attempt failed");
                    attempts += 1;
                }
            }

            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn drain_into_inbound(&self, response: reqwest::Response) -> TransportResult<()> {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            for event in drain_events(&mut buffer) {
                if let Some(id) = event.id.clone() {
                    *self.last_event_id.write().await = Some(id);
                }

                match event.event.as_deref() {
                    Some("endpoint") => {
                        let uri = event.data.trim().to_string();
                        info!(endpoint = %uri, "discovered legacy message endpoint");
                        *self.message_endpoint.write().await = Some(uri);
                    }
                    _ if event.has_data() => {
                        let json: serde_json::Value =
                            serde_json::from_str(&event.data).map_err(|e| {
                                TransportError::SerializationFailed(format!(
                                    "invalid SSE data: {e}"
                                ))
                            })?;
                        let payload = serde_json::to_vec(&json)
                            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;
                        let message =
                            TransportMessage::new(MessageId::from("legacy-sse-message"), payload);
                        self.inbound_tx
                            .send(message)
                            .await
                            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    async fn message_endpoint_url(&self) -> Option<String> {
        self.message_endpoint.read().await.clone()
    }
}

#[async_trait]
impl Transport for LegacySseTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::LegacySse
    }

    fn capabilities(&self) -> &TransportCapabilities {
        &self.capabilities
    }

    async fn state(&self) -> TransportState {
        *self.state.read().await
    }

    async fn connect(&self) -> TransportResult<()> {
        Err(TransportError::Unsupported(
            "LegacySseTransport must be connected via Arc (see start)".to_string(),
        ))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        *self.state.write().await = TransportState::Disconnecting;
        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        *self.state.write().await = TransportState::Disconnected;
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        let Some(url) = self.message_endpoint_url().await else {
            return Err(TransportError::NotConnected);
        };

        let mut request = self
            .http
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(message.payload.to_vec());

        if let Some(token) = &self.config.auth_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        debug!("legacy SSE POST delivered");
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
}

/// `connect()` on the plain `Transport` trait cannot spawn a self-referential
/// background task (it needs an `Arc<Self>`), so callers that construct a
/// `LegacySseTransport` directly (outside the auto-detect wrapper) must start it this
/// way before the first `receive()` will yield anything.
pub async fn start(transport: &Arc<LegacySseTransport>) -> TransportResult<()> {
    *transport.state.write().await = TransportState::Connecting;
    transport.ensure_reader().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_without_discovered_endpoint_fails() {
        let transport = LegacySseTransport::new(LegacySseConfig::new("http://localhost/sse")).unwrap();
        let message = TransportMessage::new(MessageId::from(1i64), Bytes::from_static(b"{}"));
        let err = transport.send(message).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn receive_with_nothing_queued_is_none() {
        let transport = LegacySseTransport::new(LegacySseConfig::new("http://localhost/sse")).unwrap();
        assert!(transport.receive().await.unwrap().is_none());
    }

    #[test]
    fn non_http_scheme_is_rejected_at_construction() {
        let err = LegacySseTransport::new(LegacySseConfig::new("ftp://localhost/sse")).unwrap_err();
        assert!(matches!(err, TransportError::Configuration(_)));
    }
}
