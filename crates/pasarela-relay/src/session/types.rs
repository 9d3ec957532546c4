//! Connection state, client options and driver commands.

use std::fmt;

use pasarela_config::RelayConfig;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::ConnectionError;

// ---------------------------------------------------------------------------
// Connection State
// ---------------------------------------------------------------------------

/// Lifecycle of the one connection a client owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Namespace joined; the relay has not vouched for our session id.
    Connected,
    /// Connected, and the relay acknowledged our session id.
    Identified,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Identified)
    }

    pub fn is_identified(&self) -> bool {
        matches!(self, Self::Identified)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Identified => "identified",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Event names and buffer sizes used by a [`RelayClient`](super::RelayClient).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Event carrying application payloads in both directions.
    pub relay_event: String,
    /// Secondary inbound event; its payloads are tagged as notifications.
    pub notify_event: String,
    /// Event used to assert the session id.
    pub identify_event: String,
    /// How far a `messages()` receiver may lag before it skips.
    pub message_capacity: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for ClientOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            relay_event: config.relay_event.clone(),
            notify_event: config.notify_event.clone(),
            identify_event: config.identify_event.clone(),
            message_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// Driver plumbing
// ---------------------------------------------------------------------------

/// Requests from client handles to the connection task.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Emit a payload on the relay event.
    Emit(Value),
    /// Run the identification handshake; the responder gets the ack.
    Identify(Option<oneshot::Sender<bool>>),
    Disconnect,
}

/// Result of one `connect()` attempt.
pub(crate) type Outcome = Result<(), ConnectionError>;
