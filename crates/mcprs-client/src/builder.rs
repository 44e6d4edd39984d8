//! Assembles a [`Client`](crate::Client): picks the transport, wires up handlers for
//! any server-initiated requests the caller wants to answer, and drives the
//! `initialize` handshake.

use std::sync::Arc;

use mcprs_core::McpResult;
use mcprs_core::types::{
    ClientCapabilities, ElicitationCapabilities, Implementation, ListRootsRequest, Root,
    RootsCapabilities, SamplingCapabilities,
};
use mcprs_session::{Filter, HandlerRegistryBuilder, HandshakeConfig, Role, SessionHandle};
use mcprs_transport::Transport;

use crate::client::Client;
use crate::elicitation::ElicitationHandler;
use crate::roots::{RootsHandler, StaticRoots};
use crate::sampling::SamplingHandler;

/// Builds a [`Client`] around a transport, a handshake configuration, and whichever
/// server-initiated request handlers the caller supplies. Each `with_*` handler
/// registration also flips on the matching [`ClientCapabilities`] field, so capability
/// advertisement always matches what's actually wired up.
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    handshake: HandshakeConfig,
    inbound_filters: Vec<Arc<dyn Filter>>,
    outbound_filters: Vec<Arc<dyn Filter>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    roots: Option<Arc<dyn RootsHandler>>,
}

impl ClientBuilder {
    #[must_use]
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            handshake: HandshakeConfig::default(),
            inbound_filters: Vec::new(),
            outbound_filters: Vec::new(),
            sampling: None,
            elicitation: None,
            roots: None,
        }
    }

    #[must_use]
    pub fn with_client_info(mut self, client_info: Implementation) -> Self {
        self.handshake = self.handshake.with_client_info(client_info);
        self
    }

    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    #[must_use]
    pub fn with_inbound_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.inbound_filters.push(filter);
        self
    }

    #[must_use]
    pub fn with_outbound_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.outbound_filters.push(filter);
        self
    }

    /// Answer `sampling/createMessage` requests from the server through `handler`.
    #[must_use]
    pub fn with_sampling_handler(mut self, handler: impl SamplingHandler + 'static) -> Self {
        self.sampling = Some(Arc::new(handler));
        self
    }

    /// Answer `elicitation/create` requests from the server through `handler`.
    #[must_use]
    pub fn with_elicitation_handler(mut self, handler: impl ElicitationHandler + 'static) -> Self {
        self.elicitation = Some(Arc::new(handler));
        self
    }

    /// Advertise a static set of roots, answering `roots/list` with them.
    #[must_use]
    pub fn with_roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = Some(Arc::new(StaticRoots(roots)));
        self
    }

    fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: self.roots.as_ref().map(|_| RootsCapabilities {
                list_changed: Some(true),
            }),
            sampling: self.sampling.as_ref().map(|_| SamplingCapabilities),
            elicitation: self.elicitation.as_ref().map(|_| ElicitationCapabilities),
        }
    }

    fn build_registry(&self) -> mcprs_session::HandlerRegistry {
        let mut builder = HandlerRegistryBuilder::new();

        if let Some(handler) = self.sampling.clone() {
            builder = builder.register_typed(
                "sampling/createMessage",
                move |req: mcprs_core::types::CreateMessageRequest, _ctx: mcprs_session::RequestContext| {
                    let handler = handler.clone();
                    async move { handler.create_message(req).await }
                },
            );
        }

        if let Some(handler) = self.elicitation.clone() {
            builder = builder.register_typed(
                "elicitation/create",
                move |req: mcprs_core::types::ElicitRequest, _ctx: mcprs_session::RequestContext| {
                    let handler = handler.clone();
                    async move { handler.elicit(req).await }
                },
            );
        }

        if let Some(handler) = self.roots.clone() {
            builder = builder.register_typed(
                "roots/list",
                move |_req: ListRootsRequest, _ctx: mcprs_session::RequestContext| {
                    let handler = handler.clone();
                    async move { handler.list_roots().await }
                },
            );
        }

        builder.build()
    }

    /// Connect the transport, spawn the session's read loop, and run `initialize`.
    pub async fn connect(self) -> McpResult<Client> {
        let capabilities = self.capabilities();
        let mut handshake = self.handshake.clone();
        handshake.capabilities = capabilities;

        let registry = Arc::new(self.build_registry());
        let session = SessionHandle::spawn(
            Role::Client,
            self.transport.clone(),
            registry,
            self.inbound_filters,
            self.outbound_filters,
        )
        .await?;

        let result = session.initialize(&handshake).await?;

        Ok(Client {
            session,
            server_info: result.server_info,
            server_capabilities: result.capabilities,
        })
    }
}
