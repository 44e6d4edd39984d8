//! [`StdioTransport`]: newline-delimited JSON over the current process's stdio, or
//! over any raw async read/write pair.
//!
//! # Interior mutability
//!
//! State lives behind `parking_lot::Mutex` (short-lived, never held across `.await`);
//! the framed I/O streams and the background reader's output channel live behind
//! `tokio::sync::Mutex` because using them spans `.await` points.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use mcprs_core::MessageId;
use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, trace, warn};

use mcprs_transport::{
    Transport, TransportCapabilities, TransportError, TransportMessage, TransportResult,
    TransportState, TransportType,
};

type BoxedRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type StdinReader = FramedRead<BufReader<BoxedRead>, LinesCodec>;
type StdoutWriter = FramedWrite<BoxedWrite, LinesCodec>;

enum StreamSource {
    ProcessStdio,
    Raw {
        reader: Option<BoxedRead>,
        writer: Option<BoxedWrite>,
    },
}

/// Newline-delimited JSON transport over stdin/stdout (or a raw stream pair).
pub struct StdioTransport {
    state: Arc<SyncMutex<TransportState>>,
    capabilities: TransportCapabilities,
    stream_source: AsyncMutex<Option<StreamSource>>,
    writer: AsyncMutex<Option<StdoutWriter>>,
    inbound_rx: AsyncMutex<Option<mpsc::Receiver<TransportMessage>>>,
    reader_task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl StdioTransport {
    /// Use the current process's stdin/stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::from_source(StreamSource::ProcessStdio)
    }

    /// Use an arbitrary async read/write pair, e.g. a spawned child's stdout/stdin.
    /// Spawning the child itself is the caller's responsibility.
    pub fn from_raw<R, W>(reader: R, writer: W) -> TransportResult<Self>
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        Ok(Self::from_source(StreamSource::Raw {
            reader: Some(Box::pin(reader)),
            writer: Some(Box::pin(writer)),
        }))
    }

    fn from_source(source: StreamSource) -> Self {
        Self {
            state: Arc::new(SyncMutex::new(TransportState::Disconnected)),
            capabilities: TransportCapabilities {
                max_message_size: Some(mcprs_core::MAX_MESSAGE_SIZE),
                supports_streaming: true,
                supports_bidirectional: true,
            },
            stream_source: AsyncMutex::new(Some(source)),
            writer: AsyncMutex::new(None),
            inbound_rx: AsyncMutex::new(None),
            reader_task: AsyncMutex::new(None),
        }
    }

    fn set_state(&self, state: TransportState) {
        *self.state.lock() = state;
    }

    async fn setup_streams(&self) -> TransportResult<()> {
        let mut guard = self.stream_source.lock().await;
        let source = guard.take().ok_or_else(|| {
            TransportError::Configuration("stdio streams already set up".to_string())
        })?;

        let reader: StdinReader = match source {
            StreamSource::ProcessStdio => {
                let boxed: BoxedRead = Box::pin(tokio::io::stdin());
                let boxed_out: BoxedWrite = Box::pin(tokio::io::stdout());
                *self.writer.lock().await = Some(FramedWrite::new(boxed_out, LinesCodec::new()));
                FramedRead::new(BufReader::new(boxed), LinesCodec::new())
            }
            StreamSource::Raw {
                mut reader,
                mut writer,
            } => {
                let reader = reader.take().ok_or_else(|| {
                    TransportError::Configuration("raw reader already consumed".to_string())
                })?;
                let writer = writer.take().ok_or_else(|| {
                    TransportError::Configuration("raw writer already consumed".to_string())
                })?;
                *self.writer.lock().await = Some(FramedWrite::new(writer, LinesCodec::new()));
                FramedRead::new(BufReader::new(reader), LinesCodec::new())
            }
        };

        let (tx, rx) = mpsc::channel(1000);
        *self.inbound_rx.lock().await = Some(rx);

        let handle = tokio::spawn(read_loop(reader, tx));
        *self.reader_task.lock().await = Some(handle);

        Ok(())
    }

    fn parse_line(line: &str) -> TransportResult<TransportMessage> {
        let line = line.trim();
        if line.is_empty() {
            return Err(TransportError::SerializationFailed(
                "empty stdio line".to_string(),
            ));
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;
        let id = value
            .get("id")
            .and_then(|id| match id {
                serde_json::Value::String(s) => Some(MessageId::from(s.clone())),
                serde_json::Value::Number(n) => n.as_i64().map(MessageId::from),
                _ => None,
            })
            .unwrap_or_else(|| MessageId::from("notification"));
        Ok(TransportMessage::new(id, Bytes::from(line.to_string())))
    }

    /// Serialize to a single line, enforcing the no-embedded-newline contract.
    fn render_line(message: &TransportMessage) -> TransportResult<String> {
        let text = std::str::from_utf8(&message.payload)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;
        if text.contains('\n') || text.contains('\r') {
            return Err(TransportError::SerializationFailed(
                "message contains an embedded newline, forbidden by the stdio transport"
                    .to_string(),
            ));
        }
        let _: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;
        Ok(text.to_string())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_loop(mut reader: StdinReader, sender: mpsc::Sender<TransportMessage>) {
    while let Some(result) = reader.next().await {
        match result {
            Ok(line) => {
                trace!(bytes = line.len(), "stdio line received");
                match StdioTransport::parse_line(&line) {
                    Ok(message) => {
                        if sender.send(message).await.is_err() {
                            debug!("stdio receive channel closed, stopping reader");
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "dropping malformed stdio line"),
                }
            }
            Err(err) => {
                error!(%err, "stdio read failed");
                break;
            }
        }
    }
    debug!("stdio reader loop exited");
}

#[async_trait]
impl Transport for StdioTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Stdio
    }

    fn capabilities(&self) -> &TransportCapabilities {
        &self.capabilities
    }

    async fn state(&self) -> TransportState {
        *self.state.lock()
    }

    async fn connect(&self) -> TransportResult<()> {
        if matches!(self.state().await, TransportState::Connected) {
            return Ok(());
        }
        self.set_state(TransportState::Connecting);
        self.setup_streams().await?;
        self.set_state(TransportState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.set_state(TransportState::Disconnecting);
        *self.writer.lock().await = None;
        *self.inbound_rx.lock().await = None;
        if let Some(handle) = self.reader_task.lock().await.take() {
            handle.abort();
        }
        self.set_state(TransportState::Disconnected);
        Ok(())
    }

    async fn send(&self, message: TransportMessage) -> TransportResult<()> {
        if !matches!(self.state().await, TransportState::Connected) {
            return Err(TransportError::NotConnected);
        }
        let line = Self::render_line(&message)?;
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        writer
            .send(line)
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Option<TransportMessage>> {
        let mut rx = self.inbound_rx.lock().await;
        let Some(receiver) = rx.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        match receiver.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(TransportError::ConnectionLost(
                "stdio reader task ended".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_reports_stdio_type_and_capabilities() {
        let transport = StdioTransport::new();
        assert_eq!(transport.transport_type(), TransportType::Stdio);
        assert!(transport.capabilities.supports_streaming);
        assert!(transport.capabilities.supports_bidirectional);
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let transport = StdioTransport::new();
        assert_eq!(transport.state().await, TransportState::Disconnected);
    }

    #[test]
    fn parses_string_id() {
        let message = StdioTransport::parse_line(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        assert_eq!(message.id, MessageId::from("abc"));
    }

    #[test]
    fn parses_numeric_id() {
        let message = StdioTransport::parse_line(r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#).unwrap();
        assert_eq!(message.id, MessageId::from(7i64));
    }

    #[test]
    fn rejects_empty_line() {
        assert!(StdioTransport::parse_line("").is_err());
        assert!(StdioTransport::parse_line("   ").is_err());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(StdioTransport::parse_line("not json").is_err());
    }

    #[test]
    fn render_rejects_embedded_newline() {
        let message = TransportMessage::new(
            MessageId::from("x"),
            Bytes::from_static(b"{\"jsonrpc\":\"2.0\",\"id\":\"x\",\"text\":\"a\nb\"}"),
        );
        assert!(StdioTransport::render_line(&message).is_err());
    }

    #[test]
    fn render_allows_escaped_newline() {
        let json = r#"{"jsonrpc":"2.0","id":"x","params":{"text":"a\nb"}}"#;
        let message = TransportMessage::new(MessageId::from("x"), Bytes::from(json.to_string()));
        assert_eq!(StdioTransport::render_line(&message).unwrap(), json);
    }

    #[tokio::test]
    async fn from_raw_connects_over_duplex_streams() {
        let (client_tx, server_rx) = tokio::io::duplex(4096);
        let (server_tx, client_rx) = tokio::io::duplex(4096);

        let server = StdioTransport::from_raw(server_rx, server_tx).unwrap();
        let client = StdioTransport::from_raw(client_rx, client_tx).unwrap();

        server.connect().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(server.state().await, TransportState::Connected);
        assert_eq!(client.state().await, TransportState::Connected);

        server.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
    }
}
