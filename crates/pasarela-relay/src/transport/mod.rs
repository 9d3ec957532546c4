//! Engine.IO transports.
//!
//! A [`Connector`] performs the Engine.IO open handshake and hands back a
//! [`Link`]: a pair of channels carrying Socket.IO packet text, with the
//! transport's own heartbeat handled by a background worker. Dropping the
//! outbound sender asks the worker to close the transport.

pub mod endpoint;
pub mod fallback;
pub mod memory;
pub mod polling;
pub mod websocket;

pub use endpoint::{derive_relay_url, Endpoint};
pub use fallback::FallbackConnector;
pub use memory::{MemoryConnector, MemoryPeer, PeerHandle};
pub use polling::PollingConnector;
pub use websocket::WebSocketConnector;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::errors::TransportError;

/// Queue depth of both link directions.
pub const LINK_BUFFER: usize = 64;

/// What a transport worker reports upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Text of one Socket.IO packet.
    Packet(String),
    /// The transport is gone; carries the close reason.
    Closed(String),
}

/// An open Engine.IO session.
pub struct Link {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<LinkEvent>,
    pub worker: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(
        outbound: mpsc::Sender<String>,
        inbound: mpsc::Receiver<LinkEvent>,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            worker,
        }
    }
}

/// Close the outbound direction and wait for the worker to flush it.
pub async fn close_link(outbound: mpsc::Sender<String>, worker: Option<JoinHandle<()>>) {
    drop(outbound);
    if let Some(worker) = worker {
        if let Err(e) = worker.await {
            debug!(error = %e, "transport worker ended abnormally");
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport session against the endpoint.
    async fn open(&self, endpoint: &Endpoint) -> Result<Link, TransportError>;
}
