//! Public relay client handle.

use std::sync::Arc;

use pasarela_common::SessionId;
use pasarela_config::PasarelaConfig;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::debug;

use super::state::SessionCore;
use super::types::{ClientOptions, ConnectionState, SessionCommand};
use crate::errors::{ConnectionError, RelayError};
use crate::identity::{load_or_create, FileSessionStore};
use crate::message::{InboundMessage, RelayMessage};
use crate::registry::Subscription;
use crate::scope::{DeliveryScope, OutboundMessage};
use crate::transport::{Connector, Endpoint, FallbackConnector};

struct ClientInner {
    core: Arc<SessionCore>,
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        // The connection task only holds the core, so it is stopped here.
        let _ = self.core.disconnect();
    }
}

/// Client for one relay session.
///
/// Clones share the same connection. Nothing connects until
/// [`connect`](Self::connect) is called, and nothing reconnects on its own.
#[derive(Clone)]
pub struct RelayClient {
    inner: Arc<ClientInner>,
}

impl RelayClient {
    pub fn new(
        endpoint: Endpoint,
        session_id: SessionId,
        connector: Arc<dyn Connector>,
        options: ClientOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                core: Arc::new(SessionCore::new(session_id, options)),
                connector,
                endpoint,
            }),
        }
    }

    /// Resolve the endpoint, load (or create) the persisted session id and
    /// use the configured transports.
    pub fn from_config(config: &PasarelaConfig) -> Result<Self, RelayError> {
        let endpoint = Endpoint::resolve(&config.relay)?;
        let store = FileSessionStore::from_config(&config.session)?;
        let session_id = load_or_create(&store)?;
        let connector = Arc::new(FallbackConnector::new(&config.relay.transports));
        Ok(Self::new(
            endpoint,
            session_id,
            connector,
            ClientOptions::from(&config.relay),
        ))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Open the connection and wait for the relay to accept it.
    ///
    /// Resolves on the first successful connect or fails on the first
    /// connection error. Calling it while a connection is live joins that
    /// connection's outcome. If [`disconnect`](Self::disconnect) runs before
    /// the attempt settles, the returned future never completes.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut outcome = SessionCore::begin(
            &self.inner.core,
            &self.inner.connector,
            &self.inner.endpoint,
        );
        let settled = outcome
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| (*value).clone());
        match settled {
            Some(result) => result,
            None => {
                debug!("connection attempt abandoned before it settled");
                std::future::pending().await
            }
        }
    }

    /// Close the connection. Safe to call any number of times.
    pub async fn disconnect(&self) {
        if let Some(task) = self.inner.core.disconnect() {
            if let Err(e) = task.await {
                debug!(error = %e, "connection task ended abnormally");
            }
        }
    }

    /// Re-run the identification handshake. Resolves to the relay's answer,
    /// or `false` when not connected or the connection drops first.
    pub async fn identify(&self) -> bool {
        if !self.is_connected() {
            debug!("not connected, skipping identify");
            return false;
        }
        let (tx, rx) = oneshot::channel();
        if !self.inner.core.command(SessionCommand::Identify(Some(tx))) {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Send to everyone, sender included.
    pub fn send(&self, message: &RelayMessage) {
        self.send_with_scope(message, DeliveryScope::default());
    }

    /// Send with an explicit scope. A no-op while not connected.
    pub fn send_with_scope(&self, message: &RelayMessage, scope: DeliveryScope) {
        if !self.is_connected() {
            debug!(tipo = %message.kind(), "not connected, dropping send");
            return;
        }
        let outbound = OutboundMessage::new(message, scope);
        debug!(tipo = %outbound.kind(), scope = %scope, "sending");
        self.inner
            .core
            .command(SessionCommand::Emit(outbound.into_value()));
    }

    pub fn send_to_self(&self, message: &RelayMessage) {
        self.send_with_scope(message, DeliveryScope::SelfOnly);
    }

    pub fn send_to_others(&self, message: &RelayMessage) {
        self.send_with_scope(message, DeliveryScope::Others);
    }

    pub fn send_to_all(&self, message: &RelayMessage) {
        self.send_with_scope(message, DeliveryScope::All);
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.inner.core.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.core.watch_state()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_identified(&self) -> bool {
        self.state().is_identified()
    }

    /// The most recent inbound message, if any arrived.
    pub fn latest_message(&self) -> Option<InboundMessage> {
        self.inner.core.latest()
    }

    pub fn watch_latest(&self) -> watch::Receiver<Option<InboundMessage>> {
        self.inner.core.watch_latest()
    }

    /// Call `callback` for every inbound message from now on.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.inner.core.registry.subscribe(callback)
    }

    /// Stream of inbound messages from now on.
    pub fn messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.core.registry.events()
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.core.session_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }
}
