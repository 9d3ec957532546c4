use pasarela_common::{ConfigError, PasarelaError, StorageError};

/// Outcome of a failed `connect()`. Surfaced exactly once per attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport failed: {0}")]
    Transport(String),

    #[error("relay refused connection: {0}")]
    Refused(String),

    #[error("connection closed before the relay answered: {0}")]
    Closed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("refused: {0}")]
    Refused(String),

    #[error("no transports configured")]
    NoTransports,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type '{0}'")]
    UnknownPacketType(char),

    #[error("binary packets are not supported")]
    Binary,

    #[error("invalid packet id '{0}'")]
    InvalidId(String),

    #[error("invalid packet json: {0}")]
    Json(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid relay endpoint: {0}")]
    Endpoint(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl From<RelayError> for PasarelaError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Storage(e) => PasarelaError::Storage(e),
            RelayError::Config(e) => PasarelaError::Config(e),
            other => PasarelaError::Relay(other.to_string()),
        }
    }
}

impl From<ConnectionError> for PasarelaError {
    fn from(e: ConnectionError) -> Self {
        PasarelaError::Relay(e.to_string())
    }
}
