//! The message-level filter pipeline wrapping inbound and outbound traffic.
//!
//! Unlike the HTTP-layer middleware stack this workspace's sibling crates build with
//! `tower` (compile-time `Layer`/`Service` composition over HTTP requests), filters
//! here wrap individual JSON-RPC messages and are composed at runtime from whatever
//! list the registry holds at the time a message is dispatched — closer in spirit to
//! the ordered, appendable plugin chain a client-side middleware registry drives, but
//! generalized into a true onion: a filter may decline to call `next` at all (short-
//! circuiting the chain), and whatever it writes into the [`MessageContext`] bag is
//! visible to every filter and handler downstream of it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use mcprs_core::{JsonRpcMessage, McpResult};
use serde_json::Value;

/// A boxed, `Send` future — the shape every [`Filter`] step and the pipeline's
/// terminal step return, so that a chain of arbitrary length can be driven without the
/// compiler needing to know its concrete, infinitely-recursive `impl Future` type.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which direction a message is travelling, relevant to filters that only care about
/// one side (e.g. an outbound-only request-signing filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Per-message state shared across the whole filter chain and the eventual handler
/// invocation. The `bag` is the open extension point: an authentication filter can
/// stash a principal under a well-known key and a later filter or the handler itself
/// can read it back.
pub struct MessageContext {
    pub direction: MessageDirection,
    pub message: JsonRpcMessage,
    pub bag: serde_json::Map<String, Value>,
}

impl MessageContext {
    #[must_use]
    pub fn new(direction: MessageDirection, message: JsonRpcMessage) -> Self {
        Self {
            direction,
            message,
            bag: serde_json::Map::new(),
        }
    }
}

/// One step in the pipeline. Implementations decide whether, and when, to call
/// `next.run(ctx)`: not calling it at all short-circuits the chain (the handler, and
/// every filter after this one, never run); calling it and inspecting the result lets
/// a filter observe or rewrite what happened downstream.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn process(&self, ctx: &mut MessageContext, next: Next<'_>) -> McpResult<()>;
}

/// The remaining portion of the chain, handed to each [`Filter::process`] call.
///
/// Implemented as a slice of the filter list plus a terminal closure rather than a
/// linked list so that building the chain for a dispatch is just slicing a `Vec` —
/// no allocation beyond the boxed futures `next.run` itself produces.
pub struct Next<'a> {
    filters: &'a [Arc<dyn Filter>],
    terminal: &'a (dyn Fn(&mut MessageContext) -> BoxFuture<'static, McpResult<()>> + Send + Sync),
}

impl<'a> Next<'a> {
    #[must_use]
    pub fn new(
        filters: &'a [Arc<dyn Filter>],
        terminal: &'a (dyn Fn(&mut MessageContext) -> BoxFuture<'static, McpResult<()>> + Send + Sync),
    ) -> Self {
        Self { filters, terminal }
    }

    /// Advance to the next filter, or to the terminal step if this was the last one.
    pub fn run(self, ctx: &mut MessageContext) -> BoxFuture<'_, McpResult<()>> {
        Box::pin(async move {
            match self.filters.split_first() {
                Some((first, rest)) => {
                    let next = Next {
                        filters: rest,
                        terminal: self.terminal,
                    };
                    first.process(ctx, next).await
                }
                None => (self.terminal)(ctx).await,
            }
        })
    }
}

/// Run `filters` over `ctx`, finally invoking `terminal`. Used identically for both
/// inbound dispatch (terminal = route to a handler) and outbound send (terminal =
/// hand the message to the transport).
pub async fn run_chain(
    filters: &[Arc<dyn Filter>],
    ctx: &mut MessageContext,
    terminal: &(dyn Fn(&mut MessageContext) -> BoxFuture<'static, McpResult<()>> + Send + Sync),
) -> McpResult<()> {
    Next::new(filters, terminal).run(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprs_core::{JsonRpcRequest, RequestId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingFilter {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    use std::sync::Mutex;

    #[async_trait]
    impl Filter for RecordingFilter {
        async fn process(&self, ctx: &mut MessageContext, next: Next<'_>) -> McpResult<()> {
            self.order.lock().unwrap().push(self.name);
            next.run(ctx).await
        }
    }

    struct ShortCircuitFilter;

    #[async_trait]
    impl Filter for ShortCircuitFilter {
        async fn process(&self, _ctx: &mut MessageContext, _next: Next<'_>) -> McpResult<()> {
            Err(mcprs_core::McpError::internal("rejected"))
        }
    }

    fn sample_ctx() -> MessageContext {
        MessageContext::new(
            MessageDirection::Inbound,
            JsonRpcMessage::Request(JsonRpcRequest::new(RequestId::Number(1), "ping", None)),
        )
    }

    #[tokio::test]
    async fn filters_run_in_registration_order_outermost_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let filters: Vec<Arc<dyn Filter>> = vec![
            Arc::new(RecordingFilter { name: "a", order: order.clone() }),
            Arc::new(RecordingFilter { name: "b", order: order.clone() }),
        ];
        let terminal_hits = Arc::new(AtomicUsize::new(0));
        let terminal_hits_clone = terminal_hits.clone();
        let terminal = move |_ctx: &mut MessageContext| -> BoxFuture<'static, McpResult<()>> {
            let hits = terminal_hits_clone.clone();
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        let mut ctx = sample_ctx();
        run_chain(&filters, &mut ctx, &terminal).await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(terminal_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_filter_can_short_circuit_the_chain() {
        let filters: Vec<Arc<dyn Filter>> = vec![Arc::new(ShortCircuitFilter)];
        let terminal_hits = Arc::new(AtomicUsize::new(0));
        let terminal_hits_clone = terminal_hits.clone();
        let terminal = move |_ctx: &mut MessageContext| -> BoxFuture<'static, McpResult<()>> {
            let hits = terminal_hits_clone.clone();
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };

        let mut ctx = sample_ctx();
        let result = run_chain(&filters, &mut ctx, &terminal).await;

        assert!(result.is_err());
        assert_eq!(terminal_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_chain_runs_terminal_directly() {
        let filters: Vec<Arc<dyn Filter>> = vec![];
        let terminal = |_ctx: &mut MessageContext| -> BoxFuture<'static, McpResult<()>> {
            Box::pin(async { Ok(()) })
        };
        let mut ctx = sample_ctx();
        assert!(run_chain(&filters, &mut ctx, &terminal).await.is_ok());
    }
}
