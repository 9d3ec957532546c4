//! In-process transport.
//!
//! Every successful [`MemoryConnector::open`] yields a [`MemoryPeer`] on the
//! connector's peer channel. The peer plays the relay server: it reads the
//! packets the client writes and pushes packets back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Connector, Endpoint, Link, LinkEvent, LINK_BUFFER};
use crate::errors::TransportError;
use crate::protocol::SocketPacket;

struct MemoryInner {
    peers: Option<mpsc::UnboundedSender<MemoryPeer>>,
    refusal: Option<String>,
    opened: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<MemoryInner>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(MemoryInner {
                peers: Some(tx),
                refusal: None,
                opened: AtomicUsize::new(0),
            }),
        };
        (connector, rx)
    }

    /// A connector whose every open fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                peers: None,
                refusal: Some(reason.into()),
                opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Number of links opened so far.
    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Link, TransportError> {
        if let Some(reason) = &self.inner.refusal {
            return Err(TransportError::Refused(reason.clone()));
        }
        let peers = self
            .inner
            .peers
            .as_ref()
            .ok_or_else(|| TransportError::Refused("no peer listening".into()))?;

        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
        let peer = MemoryPeer {
            from_client: out_rx,
            to_client: in_tx,
        };
        peers
            .send(peer)
            .map_err(|_| TransportError::Refused("no peer listening".into()))?;

        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        debug!(endpoint = %endpoint, "memory transport open");
        Ok(Link::new(out_tx, in_rx, None))
    }
}

/// Server side of an in-process link.
pub struct MemoryPeer {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<LinkEvent>,
}

impl MemoryPeer {
    /// Next packet the client wrote, or `None` once the client closed.
    pub async fn recv(&mut self) -> Option<SocketPacket> {
        loop {
            let text = self.from_client.recv().await?;
            match SocketPacket::decode(&text) {
                Ok(packet) => return Some(packet),
                Err(e) => debug!(error = %e, text = %text, "peer ignoring undecodable packet"),
            }
        }
    }

    pub async fn send(&self, packet: SocketPacket) -> bool {
        self.handle().send(packet).await
    }

    /// Drop the transport with `reason`, as a server-side close would.
    pub async fn close(&self, reason: &str) -> bool {
        self.to_client
            .send(LinkEvent::Closed(reason.to_string()))
            .await
            .is_ok()
    }

    /// A cloneable sender into this link, for routing from other tasks.
    pub fn handle(&self) -> PeerHandle {
        PeerHandle {
            to_client: self.to_client.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PeerHandle {
    to_client: mpsc::Sender<LinkEvent>,
}

impl PeerHandle {
    pub async fn send(&self, packet: SocketPacket) -> bool {
        self.to_client
            .send(LinkEvent::Packet(packet.encode()))
            .await
            .is_ok()
    }
}
