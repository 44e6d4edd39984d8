//! Maps outgoing request ids to the slot waiting on their response.
//!
//! One [`CorrelationTable`] per [`Session`](crate::Session), shared between the write
//! path (which registers a slot before sending) and the read loop (which completes a
//! slot when a matching response arrives). Ids are allocated monotonically from an
//! atomic counter rather than left to the caller, so collisions within one session are
//! structurally impossible.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use mcprs_core::{JsonRpcResponsePayload, McpError, McpResult, RequestId};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// A slot awaiting a single response, created by [`CorrelationTable::register`] and
/// consumed by exactly one of [`CorrelationTable::complete`] or
/// [`CorrelationTable::cancel`].
pub struct PendingSlot {
    pub id: RequestId,
    pub method: String,
    receiver: oneshot::Receiver<McpResult<serde_json::Value>>,
}

impl PendingSlot {
    /// Wait for the response, or for `cancel_signal` to fire first.
    pub async fn wait(self, cancel_signal: Option<tokio_util::sync::CancellationToken>) -> McpResult<serde_json::Value> {
        match cancel_signal {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(McpError::cancelled(format!(
                    "request {} ({}) cancelled by caller",
                    self.id, self.method
                ))),
                result = self.receiver => result.unwrap_or_else(|_| {
                    Err(McpError::internal("correlation slot dropped without a response"))
                }),
            },
            None => self
                .receiver
                .await
                .unwrap_or_else(|_| Err(McpError::internal("correlation slot dropped without a response"))),
        }
    }
}

struct Slot {
    method: String,
    sender: oneshot::Sender<McpResult<serde_json::Value>>,
}

/// The per-session table of outstanding requests.
#[derive(Clone)]
pub struct CorrelationTable {
    inner: Arc<Mutex<HashMap<RequestId, Slot>>>,
    next_id: Arc<AtomicI64>,
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Allocate a fresh id and register a slot for it. The caller is expected to send a
    /// request carrying this exact id immediately afterward.
    pub fn register(&self, method: impl Into<String>) -> PendingSlot {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let method = method.into();
        let (tx, rx) = oneshot::channel();
        self.inner.lock().insert(
            id.clone(),
            Slot {
                method: method.clone(),
                sender: tx,
            },
        );
        PendingSlot {
            id,
            method,
            receiver: rx,
        }
    }

    /// Complete the slot for `payload`'s id with its result or error. Returns `false`
    /// (and logs a warning) if no slot is registered for that id — a protocol error on
    /// the peer's part, not a local bug, so the read loop should not abort over it.
    pub fn complete(&self, id: &RequestId, payload: JsonRpcResponsePayload) -> bool {
        let Some(slot) = self.inner.lock().remove(id) else {
            tracing::warn!(%id, "response for unknown or already-completed request id");
            return false;
        };
        let result = match payload {
            JsonRpcResponsePayload::Success { result } => Ok(result),
            JsonRpcResponsePayload::Error { error } => Err(McpError::new(
                mcprs_core::ErrorKind::Internal,
                error.message,
            )
            .with_request_id(id.to_string())),
        };
        let _ = slot.sender.send(result);
        true
    }

    /// Fail the slot for `id` with a local cancellation, without waiting on the peer.
    pub fn cancel(&self, id: &RequestId, reason: impl Into<String>) {
        if let Some(slot) = self.inner.lock().remove(id) {
            let _ = slot.sender.send(Err(McpError::cancelled(reason.into())));
        }
    }

    /// Fail every outstanding slot, e.g. because the transport died or the session is
    /// closing. Idempotent: calling this twice leaves the table empty both times.
    pub fn dispose(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut table = self.inner.lock();
        for (_, slot) in table.drain() {
            let _ = slot.sender.send(Err(McpError::cancelled(reason.clone())));
        }
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_core::JsonRpcError;

    #[tokio::test]
    async fn complete_resolves_the_matching_slot() {
        let table = CorrelationTable::new();
        let slot = table.register("ping");
        let id = slot.id.clone();

        table.complete(&id, JsonRpcResponsePayload::Success { result: serde_json::json!({"ok": true}) });

        let result = slot.wait(None).await.unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn complete_on_unknown_id_is_a_noop() {
        let table = CorrelationTable::new();
        let handled = table.complete(&RequestId::Number(999), JsonRpcResponsePayload::Success { result: serde_json::json!(null) });
        assert!(!handled);
    }

    #[tokio::test]
    async fn dispose_fails_every_outstanding_slot() {
        let table = CorrelationTable::new();
        let a = table.register("a");
        let b = table.register("b");
        table.dispose("shutting down");

        assert!(a.wait(None).await.is_err());
        assert!(b.wait(None).await.is_err());
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn error_payload_propagates_as_err() {
        let table = CorrelationTable::new();
        let slot = table.register("tools/call");
        let id = slot.id.clone();
        table.complete(
            &id,
            JsonRpcResponsePayload::Error {
                error: JsonRpcError::new(-32601, "method not found"),
            },
        );
        let err = slot.wait(None).await.unwrap_err();
        assert!(err.message.contains("method not found"));
    }

    #[tokio::test]
    async fn cancel_signal_wins_the_race() {
        let table = CorrelationTable::new();
        let slot = table.register("slow");
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();

        let err = slot.wait(Some(token)).await.unwrap_err();
        assert_eq!(err.kind, mcprs_core::ErrorKind::Cancelled);
    }
}
