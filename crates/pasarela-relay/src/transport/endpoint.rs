//! Where the relay lives.

use pasarela_config::RelayConfig;
use reqwest::Url;

use crate::errors::RelayError;
use crate::protocol::ENGINE_IO_VERSION;

/// Used when nothing is known about the runtime environment.
pub const DEFAULT_RELAY_URL: &str = "http://localhost:5000";
/// Public relay for the hosted demo.
pub const DEMO_RELAY_URL: &str = "wss://demo.relay.coderic.net";
/// Port the relay listens on next to a self-hosted page.
pub const RELAY_PORT: u16 = 5000;

const ENGINE_PATH: &str = "/socket.io/";

/// Pick a relay URL from the page origin the client is served from.
pub fn derive_relay_url(origin: Option<&str>) -> Result<String, RelayError> {
    let Some(origin) = origin else {
        return Ok(DEFAULT_RELAY_URL.to_string());
    };
    let origin = Url::parse(origin).map_err(|e| RelayError::Endpoint(format!("{origin}: {e}")))?;
    let host = origin
        .host_str()
        .ok_or_else(|| RelayError::Endpoint(format!("origin '{origin}' has no host")))?;

    let url = match (host, origin.port()) {
        ("localhost", Some(8000)) => DEFAULT_RELAY_URL.to_string(),
        ("coderic.org" | "www.coderic.org", _) => DEMO_RELAY_URL.to_string(),
        _ => format!("{}://{host}:{RELAY_PORT}", origin.scheme()),
    };
    Ok(url)
}

/// A relay server plus the Socket.IO namespace to join on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    namespace: String,
}

impl Endpoint {
    pub fn new(url: &str, namespace: &str) -> Result<Self, RelayError> {
        let base = Url::parse(url).map_err(|e| RelayError::Endpoint(format!("{url}: {e}")))?;
        match base.scheme() {
            "http" | "https" | "ws" | "wss" => {}
            other => {
                return Err(RelayError::Endpoint(format!(
                    "{url}: unsupported scheme '{other}'"
                )))
            }
        }
        if !namespace.starts_with('/') {
            return Err(RelayError::Endpoint(format!(
                "namespace '{namespace}' must start with '/'"
            )));
        }
        Ok(Self {
            base,
            namespace: namespace.to_string(),
        })
    }

    /// Explicit `url` wins; otherwise derive from `origin`.
    pub fn resolve(config: &RelayConfig) -> Result<Self, RelayError> {
        let url = match &config.url {
            Some(url) => url.clone(),
            None => derive_relay_url(config.origin.as_deref())?,
        };
        Self::new(&url, &config.namespace)
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn is_secure(&self) -> bool {
        matches!(self.base.scheme(), "https" | "wss")
    }

    fn engine_url(&self, scheme: &str, transport: &str, sid: Option<&str>) -> Url {
        let mut url = self.base.clone();
        // ws, wss, http and https are all special schemes, so this never fails.
        let _ = url.set_scheme(scheme);
        url.set_path(ENGINE_PATH);
        url.set_fragment(None);
        {
            let mut query = url.query_pairs_mut();
            query
                .clear()
                .append_pair("EIO", &ENGINE_IO_VERSION.to_string())
                .append_pair("transport", transport);
            if let Some(sid) = sid {
                query.append_pair("sid", sid);
            }
        }
        url
    }

    pub fn websocket_url(&self) -> Url {
        let scheme = if self.is_secure() { "wss" } else { "ws" };
        self.engine_url(scheme, "websocket", None)
    }

    pub fn polling_url(&self, sid: Option<&str>) -> Url {
        let scheme = if self.is_secure() { "https" } else { "http" };
        self.engine_url(scheme, "polling", sid)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let base = self.base.as_str().trim_end_matches('/');
        write!(f, "{base}{}", self.namespace)
    }
}
