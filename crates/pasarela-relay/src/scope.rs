//! Delivery scopes and the outbound envelope.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::RelayMessage;

/// Key the relay reads to decide who receives a message.
pub const SCOPE_KEY: &str = "destino";

/// Which connected sessions receive an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeliveryScope {
    /// Only the sending session.
    #[serde(rename = "yo")]
    SelfOnly,
    /// Everyone except the sending session.
    #[serde(rename = "ustedes")]
    Others,
    /// Everyone, sender included.
    #[default]
    #[serde(rename = "nosotros")]
    All,
}

impl DeliveryScope {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::SelfOnly => "yo",
            Self::Others => "ustedes",
            Self::All => "nosotros",
        }
    }
}

impl fmt::Display for DeliveryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for DeliveryScope {
    type Err = String;

    /// Accepts the wire names and their English aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yo" | "self" => Ok(Self::SelfOnly),
            "ustedes" | "others" => Ok(Self::Others),
            "nosotros" | "all" => Ok(Self::All),
            other => Err(format!(
                "unknown delivery scope '{other}' (expected yo, ustedes or nosotros)"
            )),
        }
    }
}

/// A payload tagged with its delivery scope, ready for the wire.
///
/// The scope is written under `destino` and replaces any `destino` field
/// the payload already carried.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    fields: Map<String, Value>,
    scope: DeliveryScope,
}

impl OutboundMessage {
    pub fn new(message: &RelayMessage, scope: DeliveryScope) -> Self {
        let mut fields = message.to_fields();
        fields.insert(
            SCOPE_KEY.to_string(),
            Value::String(scope.as_wire().to_string()),
        );
        Self { fields, scope }
    }

    pub fn scope(&self) -> DeliveryScope {
        self.scope
    }

    pub fn kind(&self) -> &str {
        self.fields
            .get(crate::message::KIND_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
