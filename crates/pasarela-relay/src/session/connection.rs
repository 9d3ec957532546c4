//! Background task owning one transport connection.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::handler::{handle_packet, Flow};
use super::state::{SessionCore, Settle};
use super::types::{ConnectionState, SessionCommand};
use crate::errors::ConnectionError;
use crate::message::{Channel, InboundMessage};
use crate::protocol::SocketPacket;
use crate::transport::{close_link, Connector, Endpoint, Link, LinkEvent};

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Ended {
    /// `disconnect()` or the last client handle went away.
    Local,
    /// The relay or the transport closed it.
    Remote(String),
}

// ---------------------------------------------------------------------------
// Connection Task
// ---------------------------------------------------------------------------

pub(crate) async fn run_connection(
    core: Arc<SessionCore>,
    generation: u64,
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    mut settle: Settle,
) {
    let link = tokio::select! {
        result = connector.open(&endpoint) => match result {
            Ok(link) => link,
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "failed to reach relay");
                settle.fail(ConnectionError::Transport(e.to_string()));
                core.release(generation);
                return;
            }
        },
        _ = until_disconnect(&mut commands) => {
            info!("connection attempt abandoned");
            settle.abandon();
            core.release(generation);
            return;
        }
    };

    let Link {
        outbound,
        mut inbound,
        worker,
    } = link;
    let mut session = Session {
        core,
        generation,
        namespace: endpoint.namespace().to_string(),
        outbound,
        settle,
        connected: false,
        pending_acks: HashMap::new(),
        next_ack: 0,
    };

    session.write(SocketPacket::connect(&session.namespace)).await;

    let ended = loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::Emit(payload)) => session.emit(payload).await,
                Some(SessionCommand::Identify(responder)) => session.identify(responder).await,
                Some(SessionCommand::Disconnect) | None => {
                    if session.connected {
                        session.write(SocketPacket::disconnect(&session.namespace)).await;
                    }
                    break Ended::Local;
                }
            },
            event = inbound.recv() => match event {
                Some(LinkEvent::Packet(text)) => {
                    if let Flow::Stop(ended) = handle_packet(&mut session, &text).await {
                        break ended;
                    }
                }
                Some(LinkEvent::Closed(reason)) => break Ended::Remote(reason),
                None => break Ended::Remote("transport close".into()),
            },
        }
    };

    session.finish(ended, worker).await;
}

/// Resolves once a disconnect is requested while the transport is opening.
async fn until_disconnect(commands: &mut mpsc::UnboundedReceiver<SessionCommand>) {
    loop {
        match commands.recv().await {
            Some(SessionCommand::Disconnect) | None => return,
            Some(SessionCommand::Identify(Some(responder))) => {
                let _ = responder.send(false);
            }
            Some(other) => debug!(command = ?other, "dropping command while connecting"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Protocol state of one live connection.
pub(crate) struct Session {
    pub(crate) core: Arc<SessionCore>,
    pub(crate) generation: u64,
    pub(crate) namespace: String,
    outbound: mpsc::Sender<String>,
    pub(crate) settle: Settle,
    /// The relay accepted our namespace connect.
    pub(crate) connected: bool,
    pending_acks: HashMap<u64, Option<oneshot::Sender<bool>>>,
    next_ack: u64,
}

impl Session {
    pub(crate) async fn write(&self, packet: SocketPacket) -> bool {
        match self.outbound.send(packet.encode()).await {
            Ok(()) => true,
            Err(_) => {
                debug!("transport gone, packet dropped");
                false
            }
        }
    }

    async fn emit(&self, payload: Value) {
        if !self.connected {
            debug!("not connected, dropping outbound message");
            return;
        }
        let event = self.core.options.relay_event.clone();
        self.write(SocketPacket::event(&self.namespace, &event, vec![payload], None))
            .await;
    }

    /// Assert the session id; the ack settles `responder`.
    pub(crate) async fn identify(&mut self, responder: Option<oneshot::Sender<bool>>) {
        if !self.connected {
            if let Some(responder) = responder {
                let _ = responder.send(false);
            }
            return;
        }

        let id = self.next_ack;
        self.next_ack += 1;
        self.pending_acks.insert(id, responder);

        let packet = SocketPacket::event(
            &self.namespace,
            &self.core.options.identify_event,
            vec![Value::String(self.core.session_id.to_string())],
            Some(id),
        );
        debug!(ack_id = id, session_id = %self.core.session_id, "identifying");
        self.write(packet).await;
    }

    /// The relay answered ack `id`.
    pub(crate) fn acknowledge(&mut self, id: u64, args: &[Value]) {
        let Some(responder) = self.pending_acks.remove(&id) else {
            debug!(ack_id = id, "ack for unknown request");
            return;
        };

        let accepted = args.first().and_then(Value::as_bool).unwrap_or(false);
        let state = if accepted {
            ConnectionState::Identified
        } else {
            ConnectionState::Connected
        };
        if self.core.transition(self.generation, state) {
            if accepted {
                info!(session_id = %self.core.session_id, "identified with relay");
            } else {
                debug!(session_id = %self.core.session_id, "relay did not accept session id");
            }
        }
        if let Some(responder) = responder {
            let _ = responder.send(accepted);
        }
    }

    pub(crate) fn publish(&self, channel: Channel, payload: Value) {
        let message = InboundMessage::new(channel, payload);
        debug!(tipo = %message.kind(), channel = ?channel, "inbound message");
        self.core.publish(self.generation, message);
    }

    async fn finish(mut self, ended: Ended, worker: Option<tokio::task::JoinHandle<()>>) {
        match &ended {
            Ended::Local => {
                self.settle.abandon();
                info!("disconnected from relay");
            }
            Ended::Remote(reason) => {
                if self
                    .settle
                    .fail(ConnectionError::Closed(reason.clone()))
                {
                    warn!(reason = %reason, "connection closed before the relay answered");
                } else {
                    warn!(reason = %reason, "connection to relay lost");
                }
            }
        }

        // Unanswered identify requests resolve as not identified.
        self.pending_acks.clear();
        self.core.release(self.generation);
        close_link(self.outbound, worker).await;
    }
}
