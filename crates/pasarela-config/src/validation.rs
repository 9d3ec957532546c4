//! Configuration validation. Collects every problem before failing.

use std::collections::HashSet;

use crate::schema::PasarelaConfig;
use pasarela_common::ConfigError;

const URL_SCHEMES: &[&str] = &["http://", "https://", "ws://", "wss://"];

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PasarelaConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let relay = &config.relay;

    if !relay.namespace.starts_with('/') {
        errors.push(format!(
            "relay.namespace must start with '/', got '{}'",
            relay.namespace
        ));
    }

    if relay.transports.is_empty() {
        errors.push("relay.transports must list at least one transport".into());
    }
    let mut seen = HashSet::new();
    for kind in &relay.transports {
        if !seen.insert(kind) {
            errors.push(format!("relay.transports lists '{kind}' more than once"));
        }
    }

    for (field, url) in [("relay.url", &relay.url), ("relay.origin", &relay.origin)] {
        if let Some(url) = url {
            if !URL_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
                errors.push(format!(
                    "{field} must use http, https, ws or wss, got '{url}'"
                ));
            }
        }
    }

    for (field, name) in [
        ("relay.relay_event", &relay.relay_event),
        ("relay.notify_event", &relay.notify_event),
        ("relay.identify_event", &relay.identify_event),
    ] {
        if name.trim().is_empty() {
            errors.push(format!("{field} must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
