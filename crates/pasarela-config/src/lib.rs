//! Pasarela configuration system.
//!
//! TOML-based configuration with validation. All sections use defaults
//! so partial configs work out of the box.

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{LogLevel, LoggingConfig, PasarelaConfig, RelayConfig, SessionConfig, TransportKind};

use pasarela_common::ConfigError;

/// Load config from the platform default path (or `path` when given),
/// apply the `PASARELA_URL` override and validate the result.
pub fn load_config(path: Option<&std::path::Path>) -> Result<PasarelaConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    toml_loader::apply_url_override(&mut config, std::env::var(toml_loader::URL_ENV_VAR).ok());
    validation::validate(&config)?;
    Ok(config)
}
