//! Auto-detect transport (C8): tries the streamable HTTP path first and falls back to
//! the legacy SSE transport if the very first POST comes back with a status outside
//! the expected set. The fallback happens on the first message at most — once a mode
//! is chosen it is permanent for the life of the session.

use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use mcprs_transport::{
    Transport, TransportCapabilities, TransportError, TransportMessage, TransportResult,
    TransportState, TransportType,
};

use crate::client::{StreamableHttpTransport, start_background_reader};
use crate::config::StreamableHttpClientConfig;
use crate::legacy::{self, LegacySseConfig, LegacySseTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Undecided,
    Streamable,
    Legacy,
}

/// Wraps [`StreamableHttpTransport`] and [`LegacySseTransport`], switching to the
/// latter at most once, on the first `send`.
pub struct AutoDetectTransport {
    streamable: Arc<StreamableHttpTransport>,
    legacy: Arc<LegacySseTransport>,
    mode: StdRwLock<Mode>,
}

impl std::fmt::Debug for AutoDetectTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoDetectTransport")
            .field("mode", &*self.mode.read().unwrap())
            .finish()
    }
}

impl AutoDetectTransport {
    pub fn new(
        streamable_config: StreamableHttpClientConfig,
        legacy_config: LegacySseConfig,
    ) -> TransportResult<Self> {
        Ok(Self {
            streamable: Arc::new(StreamableHttpTransport::new(streamable_config)?),
            legacy: Arc::new(LegacySseTransport::new(legacy_config)?),
            mode: StdRwLock::new(Mode::Undecided),
        })
    }

    fn mode(&self) -> Mode {
        *self.mode.read().unwrap()
    }

    fn lock_in(&self, mode: Mode) {
        let mut guard = self.mode.write().unwrap();
        if *guard == Mode::Undecided {
            *guard = mode;
        }
    }
}

#[async_trait]
impl Transport for AutoDetectTransport {
    fn transport_type(&self) -> TransportType {
        match self.mode() {
            Mode::Legacy => TransportType::LegacySse,
            _ => TransportType::StreamableHttp,
        }
    }

    fn capabilities(&self) -> &TransportCapabilities {
        self.streamable.capabilities()
    }

    async fn state(&self) -> TransportState {
        match self.mode() {
            Mode::Legacy => self.legacy.state().await,
            _ => self.streamable.state().await,
        }
    }

    async fn connect(&self) -> TransportResult<()> {
        self.streamable.connect().await
    }

    async fn disconnect(&self) -> TransportResult<()> {
        match self.mode() {
            Mode::Legacy => self.legacy.disconnect().await,
            _ => self.streamable.disconnect().await,
        }
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        match self.mode() {
            Mode::Legacy => self.legacy.send(message).await,
            Mode::Streamable => self.streamable.send(message).await,
            Mode::Undecided => {
                let cloned = message.clone();
                match self.streamable.send(message).await {
                    Ok(()) => {
                        info!("streamable HTTP POST accepted, locking in streamable mode");
                        self.lock_in(Mode::Streamable);
                        start_background_reader(&self.streamable).await;
                        Ok(())
                    }
                    Err(TransportError::HttpStatus { status, body }) => {
                        warn!(
                            status,
                            body, "first POST returned an unexpected HTTP status, falling back to legacy SSE transport"
                        );
                        self.lock_in(Mode::Legacy);
                        legacy::start(&self.legacy).await?;
                        self.legacy.send(cloned).await
                    }
                    Err(other) => Err(other),
                }
            }
        }
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        match self.mode() {
            Mode::Legacy => self.legacy.receive().await,
            _ => self.streamable.receive().await,
        }
    }

    async fn session_id(&self) -> Option<String> {
        match self.mode() {
            Mode::Legacy => None,
            _ => self.streamable.session_id().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use mcprs_core::MessageId;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn starts_undecided_and_reports_streamable_type_by_default() {
        let transport = AutoDetectTransport::new(
            StreamableHttpClientConfig::default(),
            LegacySseConfig::new("http://localhost/sse"),
        )
        .unwrap();
        assert_eq!(transport.transport_type(), TransportType::StreamableHttp);
    }

    #[tokio::test]
    async fn non_2xx_response_falls_back_to_legacy_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let transport = AutoDetectTransport::new(
            StreamableHttpClientConfig::new(server.uri()),
            LegacySseConfig::new(format!("{}/sse", server.uri())),
        )
        .unwrap();

        let message = TransportMessage::new(MessageId::from(1i64), Bytes::from_static(b"{}"));
        // The legacy transport has not discovered a message endpoint yet, so the
        // fallback send itself fails, but the mode switch is what we're checking here.
        let _ = transport.send(message).await;
        assert_eq!(transport.transport_type(), TransportType::LegacySse);
    }

    #[tokio::test]
    async fn genuine_connection_failure_does_not_lock_in_legacy_mode() {
        let transport = AutoDetectTransport::new(
            StreamableHttpClientConfig::new("http://127.0.0.1:1"),
            LegacySseConfig::new("http://127.0.0.1:1/sse"),
        )
        .unwrap();

        let message = TransportMessage::new(MessageId::from(1i64), Bytes::from_static(b"{}"));
        let err = transport.send(message).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
        assert_eq!(transport.transport_type(), TransportType::StreamableHttp);
    }
}
