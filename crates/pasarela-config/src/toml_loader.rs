//! TOML config file loading and creation.

use crate::schema::PasarelaConfig;
use crate::validation;
use pasarela_common::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable that overrides `relay.url`.
pub const URL_ENV_VAR: &str = "PASARELA_URL";

/// Load config from a specific TOML file path.
///
/// Missing fields fall back to serde defaults. A config that fails
/// validation is an error; it is never swapped for the defaults.
pub fn load_from_path(path: &Path) -> Result<PasarelaConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: PasarelaConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("invalid config at {}: {e}", path.display());
        return Err(e);
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/pasarela/config.toml`
///
/// If the file does not exist, creates a default config file and returns defaults.
pub fn load_default() -> Result<PasarelaConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        create_default_config(&path)?;
        return Ok(PasarelaConfig::default());
    }

    load_from_path(&path)
}

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("pasarela").join("config.toml"))
}

/// Apply an explicit relay URL override (normally read from `PASARELA_URL`).
pub fn apply_url_override(config: &mut PasarelaConfig, url: Option<String>) {
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
        info!(url = %url, "relay url overridden from environment");
        config.relay.url = Some(url);
    }
}

/// Create a default TOML config file with documentation comments.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, default_config_toml()).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}

fn default_config_toml() -> &'static str {
    r##"# Pasarela Configuration
# Only override what you want to change -- missing fields use defaults.

[relay]
# url = "http://localhost:5000"        # explicit relay, also PASARELA_URL
# origin = "https://coderic.org"       # page origin used to derive the relay
# namespace = "/relay"
# transports = ["websocket", "polling"]
# relay_event = "relay"
# notify_event = "notificar"
# identify_event = "identificar"

[session]
# storage_path = "/path/to/session.json"

[logging]
# level = "info"                       # trace, debug, info, warn, error
"##
}
