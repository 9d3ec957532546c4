//! Incoming Socket.IO packet router.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::connection::{Ended, Session};
use super::types::ConnectionState;
use crate::errors::ConnectionError;
use crate::message::Channel;
use crate::protocol::{PacketType, SocketPacket};

pub(crate) enum Flow {
    Continue,
    Stop(Ended),
}

/// Handle one packet from the transport.
pub(crate) async fn handle_packet(session: &mut Session, text: &str) -> Flow {
    let packet = match SocketPacket::decode(text) {
        Ok(packet) => packet,
        Err(e) => {
            debug!(error = %e, "ignoring undecodable packet");
            return Flow::Continue;
        }
    };
    if packet.namespace != session.namespace {
        debug!(namespace = %packet.namespace, "ignoring packet for another namespace");
        return Flow::Continue;
    }

    match packet.kind {
        PacketType::Connect => {
            on_connect(session).await;
            Flow::Continue
        }
        PacketType::ConnectError => {
            let message = packet.error_message();
            if session.settle.fail(ConnectionError::Refused(message.clone())) {
                warn!(error = %message, "relay refused connection");
            } else {
                warn!(error = %message, "relay reported a connection error");
            }
            Flow::Stop(Ended::Remote(format!("connect error: {message}")))
        }
        PacketType::Disconnect => Flow::Stop(Ended::Remote("io server disconnect".into())),
        PacketType::Event => {
            on_event(session, &packet);
            Flow::Continue
        }
        PacketType::Ack => {
            match packet.id {
                Some(id) => session.acknowledge(id, packet.args()),
                None => debug!("ack without id"),
            }
            Flow::Continue
        }
    }
}

async fn on_connect(session: &mut Session) {
    if session.connected {
        debug!("duplicate namespace connect");
        return;
    }
    session.connected = true;
    session
        .core
        .transition(session.generation, ConnectionState::Connected);
    info!(namespace = %session.namespace, "connected to relay");
    session.settle.succeed();

    // Every fresh connection asserts the session id once.
    session.identify(None).await;
}

fn on_event(session: &Session, packet: &SocketPacket) {
    let Some(name) = packet.event_name() else {
        debug!("event without a name");
        return;
    };
    let payload = packet.args().first().cloned().unwrap_or(Value::Null);

    let options = &session.core.options;
    if name == options.relay_event {
        session.publish(Channel::Relay, payload);
    } else if name == options.notify_event {
        session.publish(Channel::Notify, payload);
    } else {
        debug!(event = %name, "unhandled relay event");
    }
}
