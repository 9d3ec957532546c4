//! WebSocket transport.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Connector, Endpoint, Link, LinkEvent, LINK_BUFFER};
use crate::errors::TransportError;
use crate::protocol::{EnginePacket, OpenHandshake};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Link, TransportError> {
        let url = endpoint.websocket_url();
        debug!(url = %url, "opening websocket transport");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (sink, mut stream) = ws.split();

        let handshake = read_open(&mut stream).await?;
        info!(sid = %handshake.sid, "websocket transport open");

        let (out_tx, out_rx) = mpsc::channel(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel(LINK_BUFFER);
        let worker = tokio::spawn(pump(sink, stream, handshake.liveness(), out_rx, in_tx));
        Ok(Link::new(out_tx, in_rx, Some(worker)))
    }
}

/// The first frame on a fresh Engine.IO socket must be `open`.
async fn read_open(stream: &mut SplitStream<WsStream>) -> Result<OpenHandshake, TransportError> {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                return match EnginePacket::decode(text.as_str())? {
                    EnginePacket::Open(handshake) => Ok(handshake),
                    other => Err(TransportError::Handshake(format!(
                        "expected open packet, got {other:?}"
                    ))),
                };
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Handshake(
                    "socket closed during handshake".into(),
                ))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
        }
    }
}

async fn send_text(
    sink: &mut SplitSink<WsStream, Message>,
    packet: EnginePacket,
) -> Result<(), TransportError> {
    sink.send(Message::Text(packet.encode().into()))
        .await
        .map_err(|e| TransportError::WebSocket(e.to_string()))
}

/// Shuttle packets between the socket and the link until either side ends.
async fn pump(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    liveness: Duration,
    mut outbound: mpsc::Receiver<String>,
    inbound: mpsc::Sender<LinkEvent>,
) {
    let deadline = tokio::time::sleep(liveness);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            packet = outbound.recv() => match packet {
                Some(packet) => {
                    if let Err(e) = send_text(&mut sink, EnginePacket::Message(packet)).await {
                        warn!(error = %e, "websocket send failed");
                        break "transport error";
                    }
                }
                None => {
                    let _ = send_text(&mut sink, EnginePacket::Close).await;
                    let _ = sink.close().await;
                    debug!("websocket transport closed locally");
                    return;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    deadline.as_mut().reset(Instant::now() + liveness);
                    match EnginePacket::decode(text.as_str()) {
                        Ok(EnginePacket::Ping(data)) => {
                            if let Err(e) = send_text(&mut sink, EnginePacket::Pong(data)).await {
                                warn!(error = %e, "websocket pong failed");
                                break "transport error";
                            }
                        }
                        Ok(EnginePacket::Message(body)) => {
                            if inbound.send(LinkEvent::Packet(body)).await.is_err() {
                                return;
                            }
                        }
                        Ok(EnginePacket::Close) => break "transport close",
                        Ok(_) => {}
                        Err(e) => debug!(error = %e, "ignoring undecodable engine packet"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break "transport close",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "websocket read failed");
                    break "transport error";
                }
            },
            _ = &mut deadline => {
                warn!(timeout_ms = liveness.as_millis() as u64, "no ping from relay");
                break "ping timeout";
            }
        }
    };

    let _ = inbound.send(LinkEvent::Closed(reason.to_string())).await;
}
