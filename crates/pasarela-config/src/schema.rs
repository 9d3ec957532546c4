//! Configuration schema types for the pasarela client.
//!
//! All structs use `serde(default)` so partial configs work correctly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PasarelaConfig {
    pub relay: RelayConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Transport mechanisms, tried in the configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Websocket => f.write_str("websocket"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Where the relay lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Explicit relay URL. Skips environment derivation when set.
    pub url: Option<String>,
    /// Origin the client is served from, e.g. `https://coderic.org`.
    pub origin: Option<String>,
    pub namespace: String,
    pub transports: Vec<TransportKind>,
    pub relay_event: String,
    pub notify_event: String,
    pub identify_event: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: None,
            origin: None,
            namespace: "/relay".into(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
            relay_event: "relay".into(),
            notify_event: "notificar".into(),
            identify_event: "identificar".into(),
        }
    }
}

/// Session id persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session file override. Defaults to the platform data directory.
    pub storage_path: Option<PathBuf>,
}

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}
