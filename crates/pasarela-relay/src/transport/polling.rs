//! HTTP long-polling transport.
//!
//! One GET is always in flight; outbound packets are batched into POSTs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Connector, Endpoint, Link, LinkEvent, LINK_BUFFER};
use crate::errors::TransportError;
use crate::protocol::{decode_payload, EnginePacket, PAYLOAD_SEPARATOR};

const TEXT_PLAIN: &str = "text/plain;charset=UTF-8";

#[derive(Debug, Clone, Default)]
pub struct PollingConnector {
    client: Client,
}

impl PollingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for PollingConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Link, TransportError> {
        let body = self
            .client
            .get(endpoint.polling_url(None))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let mut packets = decode_payload(&body)?.into_iter();
        let handshake = match packets.next() {
            Some(EnginePacket::Open(handshake)) => handshake,
            other => {
                return Err(TransportError::Handshake(format!(
                    "expected open packet, got {other:?}"
                )))
            }
        };
        info!(sid = %handshake.sid, "polling transport open");

        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
        let session = PollSession {
            client: self.client.clone(),
            url: endpoint.polling_url(Some(&handshake.sid)),
            liveness: handshake.liveness(),
            inbound: in_tx,
        };

        // Anything the server piggybacked on the handshake response.
        for packet in packets {
            if let Err(reason) = session.deliver(packet).await {
                return Err(TransportError::Handshake(reason.to_string()));
            }
        }

        let worker = tokio::spawn(session.run(out_rx));
        Ok(Link::new(out_tx, in_rx, Some(worker)))
    }
}

struct PollSession {
    client: Client,
    url: Url,
    liveness: Duration,
    inbound: mpsc::Sender<LinkEvent>,
}

impl PollSession {
    async fn run(self, mut outbound: mpsc::Receiver<String>) {
        let mut poll = Box::pin(fetch(self.client.clone(), self.url.clone(), self.liveness));

        let reason = loop {
            tokio::select! {
                packet = outbound.recv() => match packet {
                    Some(packet) => {
                        let mut batch = vec![EnginePacket::Message(packet).encode()];
                        while let Ok(more) = outbound.try_recv() {
                            batch.push(EnginePacket::Message(more).encode());
                        }
                        if let Err(e) = self.post(batch).await {
                            warn!(error = %e, "polling send failed");
                            break "transport error";
                        }
                    }
                    None => {
                        let _ = self.post(vec![EnginePacket::Close.encode()]).await;
                        debug!("polling transport closed locally");
                        return;
                    }
                },
                body = &mut poll => match body {
                    Ok(body) => {
                        let packets = match decode_payload(&body) {
                            Ok(packets) => packets,
                            Err(e) => {
                                debug!(error = %e, "ignoring undecodable polling payload");
                                Vec::new()
                            }
                        };
                        let mut closed = None;
                        for packet in packets {
                            if let Err(reason) = self.deliver(packet).await {
                                closed = Some(reason);
                                break;
                            }
                        }
                        if let Some(reason) = closed {
                            break reason;
                        }
                        poll.set(fetch(self.client.clone(), self.url.clone(), self.liveness));
                    }
                    Err(e) => {
                        warn!(error = %e, "polling request failed");
                        break "transport error";
                    }
                },
            }
        };

        let _ = self.inbound.send(LinkEvent::Closed(reason.to_string())).await;
    }

    /// Handle one inbound engine packet. `Err` carries the close reason.
    async fn deliver(&self, packet: EnginePacket) -> Result<(), &'static str> {
        match packet {
            EnginePacket::Ping(data) => {
                if let Err(e) = self.post(vec![EnginePacket::Pong(data).encode()]).await {
                    warn!(error = %e, "polling pong failed");
                    return Err("transport error");
                }
            }
            EnginePacket::Message(body) => {
                if self.inbound.send(LinkEvent::Packet(body)).await.is_err() {
                    return Err("transport close");
                }
            }
            EnginePacket::Close => return Err("transport close"),
            _ => {}
        }
        Ok(())
    }

    async fn post(&self, packets: Vec<String>) -> Result<(), TransportError> {
        let body = packets.join(&PAYLOAD_SEPARATOR.to_string());
        self.client
            .post(self.url.clone())
            .header(CONTENT_TYPE, TEXT_PLAIN)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// One long-poll GET. Times out once the server has missed its ping window.
async fn fetch(client: Client, url: Url, timeout: Duration) -> Result<String, TransportError> {
    Ok(client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?)
}
