//! Try transports in order until one opens.

use async_trait::async_trait;
use pasarela_config::TransportKind;
use tracing::{info, warn};

use super::{Connector, Endpoint, Link, PollingConnector, WebSocketConnector};
use crate::errors::TransportError;

pub struct FallbackConnector {
    connectors: Vec<(TransportKind, Box<dyn Connector>)>,
}

impl FallbackConnector {
    /// Real transports in the given preference order. Duplicates are skipped.
    pub fn new(kinds: &[TransportKind]) -> Self {
        let mut connectors: Vec<(TransportKind, Box<dyn Connector>)> = Vec::new();
        for kind in kinds {
            if connectors.iter().any(|(existing, _)| existing == kind) {
                continue;
            }
            let connector: Box<dyn Connector> = match kind {
                TransportKind::Websocket => Box::new(WebSocketConnector::new()),
                TransportKind::Polling => Box::new(PollingConnector::new()),
            };
            connectors.push((*kind, connector));
        }
        Self { connectors }
    }

    pub fn with_connectors(connectors: Vec<(TransportKind, Box<dyn Connector>)>) -> Self {
        Self { connectors }
    }

    pub fn kinds(&self) -> Vec<TransportKind> {
        self.connectors.iter().map(|(kind, _)| *kind).collect()
    }
}

#[async_trait]
impl Connector for FallbackConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Link, TransportError> {
        let mut last_error = None;
        for (kind, connector) in &self.connectors {
            match connector.open(endpoint).await {
                Ok(link) => {
                    info!(transport = %kind, endpoint = %endpoint, "transport connected");
                    return Ok(link);
                }
                Err(e) => {
                    warn!(transport = %kind, error = %e, "transport failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(TransportError::NoTransports))
    }
}
