//! Application payloads carried by relay frames.
//!
//! Every payload has a `tipo` discriminant. Payment kinds used by the
//! simulation get an explicit struct; anything else passes through as
//! [`RelayMessage::Unrecognized`]. Typed fields are optional and unknown
//! fields are kept in `extra`; a payload is forwarded exactly as the peer
//! sent it.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// Discriminant key present in every payload.
pub const KIND_KEY: &str = "tipo";
/// Marker added to messages that arrived on the notify frame kind.
pub const CHANNEL_KEY: &str = "_channel";
/// Value of [`CHANNEL_KEY`] for notify frames.
pub const NOTIFY_CHANNEL: &str = "notificar";

/// Known `tipo` values.
pub mod kinds {
    pub const PAYMENT_SENT: &str = "pago_enviado";
    pub const PAYMENT_REQUEST: &str = "solicitud_pago";
    pub const PAYMENT_RECEIVED: &str = "pago_recibido";
    pub const PAYMENT_COMPLETED: &str = "pago_completado";
    pub const PAYMENT_REJECTED: &str = "pago_rechazado";
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A payer announces a transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "origen", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "destino", skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(rename = "monto", skip_serializing_if = "Option::is_none")]
    pub amount: Option<Number>,
    #[serde(rename = "concepto", skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A payee asks to be paid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentRequest {
    #[serde(rename = "destino", skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(rename = "monto", skip_serializing_if = "Option::is_none")]
    pub amount: Option<Number>,
    #[serde(rename = "concepto", skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The payee accepted a transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentReceived {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "origen", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "destino", skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(rename = "monto", skip_serializing_if = "Option::is_none")]
    pub amount: Option<Number>,
    #[serde(rename = "concepto", skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The transfer settled on the payer side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentCompleted {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "origen", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "destino", skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(rename = "monto", skip_serializing_if = "Option::is_none")]
    pub amount: Option<Number>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The payee declined a transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentRejected {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "origen", skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(rename = "destino", skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wire form of an amount. Whole amounts stay integers so `1000` is not
/// re-encoded as `1000.0`.
pub fn amount_number(amount: f64) -> Option<Number> {
    if amount.fract() == 0.0 && amount.abs() < i64::MAX as f64 {
        Some(Number::from(amount as i64))
    } else {
        Number::from_f64(amount)
    }
}

// ---------------------------------------------------------------------------
// Tagged union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    PaymentSent(PaymentSent),
    PaymentRequest(PaymentRequest),
    PaymentReceived(PaymentReceived),
    PaymentCompleted(PaymentCompleted),
    PaymentRejected(PaymentRejected),
    /// Any other `tipo`, or a known one whose fields do not map exactly onto
    /// its struct.
    Unrecognized {
        tipo: String,
        fields: Map<String, Value>,
    },
}

impl RelayMessage {
    /// Build a message of an arbitrary kind from loose fields.
    pub fn custom(tipo: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self::from_fields(tipo.into(), fields)
    }

    /// Normalize a raw payload. Never fails; non-object payloads become an
    /// `Unrecognized` message with an empty `tipo`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let tipo = match fields.remove(KIND_KEY) {
                    Some(Value::String(tipo)) => tipo,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                fields.remove(CHANNEL_KEY);
                Self::from_fields(tipo, fields)
            }
            other => {
                debug!(payload = %other, "relay payload is not an object");
                Self::Unrecognized {
                    tipo: String::new(),
                    fields: Map::new(),
                }
            }
        }
    }

    fn from_fields(tipo: String, fields: Map<String, Value>) -> Self {
        match tipo.as_str() {
            kinds::PAYMENT_SENT => typed(tipo, fields, Self::PaymentSent),
            kinds::PAYMENT_REQUEST => typed(tipo, fields, Self::PaymentRequest),
            kinds::PAYMENT_RECEIVED => typed(tipo, fields, Self::PaymentReceived),
            kinds::PAYMENT_COMPLETED => typed(tipo, fields, Self::PaymentCompleted),
            kinds::PAYMENT_REJECTED => typed(tipo, fields, Self::PaymentRejected),
            _ => Self::Unrecognized { tipo, fields },
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::PaymentSent(_) => kinds::PAYMENT_SENT,
            Self::PaymentRequest(_) => kinds::PAYMENT_REQUEST,
            Self::PaymentReceived(_) => kinds::PAYMENT_RECEIVED,
            Self::PaymentCompleted(_) => kinds::PAYMENT_COMPLETED,
            Self::PaymentRejected(_) => kinds::PAYMENT_REJECTED,
            Self::Unrecognized { tipo, .. } => tipo,
        }
    }

    /// Payload fields with `tipo` included.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = match self {
            Self::PaymentSent(p) => object_of(p),
            Self::PaymentRequest(p) => object_of(p),
            Self::PaymentReceived(p) => object_of(p),
            Self::PaymentCompleted(p) => object_of(p),
            Self::PaymentRejected(p) => object_of(p),
            Self::Unrecognized { fields, .. } => fields.clone(),
        };
        fields.insert(KIND_KEY.to_string(), Value::String(self.kind().to_string()));
        fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.to_fields())
    }
}

impl From<PaymentSent> for RelayMessage {
    fn from(p: PaymentSent) -> Self {
        Self::PaymentSent(p)
    }
}

impl From<PaymentRequest> for RelayMessage {
    fn from(p: PaymentRequest) -> Self {
        Self::PaymentRequest(p)
    }
}

impl From<PaymentReceived> for RelayMessage {
    fn from(p: PaymentReceived) -> Self {
        Self::PaymentReceived(p)
    }
}

impl From<PaymentCompleted> for RelayMessage {
    fn from(p: PaymentCompleted) -> Self {
        Self::PaymentCompleted(p)
    }
}

impl From<PaymentRejected> for RelayMessage {
    fn from(p: PaymentRejected) -> Self {
        Self::PaymentRejected(p)
    }
}

fn typed<T: DeserializeOwned + Serialize>(
    tipo: String,
    fields: Map<String, Value>,
    wrap: fn(T) -> RelayMessage,
) -> RelayMessage {
    match serde_json::from_value::<T>(Value::Object(fields.clone())) {
        Ok(payload) if object_of(&payload) == fields => wrap(payload),
        Ok(_) => {
            debug!(tipo = %tipo, "payload does not round-trip through its kind, passing through");
            RelayMessage::Unrecognized { tipo, fields }
        }
        Err(e) => {
            debug!(tipo = %tipo, error = %e, "payload does not match its kind, passing through");
            RelayMessage::Unrecognized { tipo, fields }
        }
    }
}

fn object_of<T: Serialize>(payload: &T) -> Map<String, Value> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Which inbound frame kind a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Relay,
    Notify,
}

/// A routed inbound message. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message: RelayMessage,
    pub channel: Channel,
}

impl InboundMessage {
    pub fn new(channel: Channel, payload: Value) -> Self {
        Self {
            message: RelayMessage::from_value(payload),
            channel,
        }
    }

    pub fn kind(&self) -> &str {
        self.message.kind()
    }

    pub fn is_notification(&self) -> bool {
        self.channel == Channel::Notify
    }

    /// Flat JSON view: payload fields, `tipo`, and `_channel` for notify frames.
    pub fn to_value(&self) -> Value {
        let mut fields = self.message.to_fields();
        if self.is_notification() {
            fields.insert(
                CHANNEL_KEY.to_string(),
                Value::String(NOTIFY_CHANNEL.to_string()),
            );
        }
        Value::Object(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payment_sent_is_typed() {
        let msg = RelayMessage::from_value(json!({
            "tipo": "pago_enviado",
            "id": "txn_1",
            "origen": "user_a",
            "destino": "user_b",
            "monto": 1000,
            "concepto": "Almuerzo",
            "timestamp": 1700000000000_i64
        }));
        let RelayMessage::PaymentSent(payment) = msg else {
            panic!("expected pago_enviado");
        };
        assert_eq!(payment.amount, Some(Number::from(1000)));
        assert_eq!(payment.origin.as_deref(), Some("user_a"));
        assert_eq!(payment.recipient.as_deref(), Some("user_b"));
        assert_eq!(payment.concept.as_deref(), Some("Almuerzo"));
        assert!(payment.extra.is_empty());
    }

    #[test]
    fn missing_fields_stay_missing() {
        let raw = json!({ "tipo": "pago_rechazado", "id": "txn_9" });
        let msg = RelayMessage::from_value(raw.clone());
        let RelayMessage::PaymentRejected(ref rejected) = msg else {
            panic!("expected pago_rechazado");
        };
        assert_eq!(rejected.id.as_deref(), Some("txn_9"));
        assert_eq!(rejected.origin, None);
        assert_eq!(rejected.timestamp, None);
        assert_eq!(msg.to_value(), raw);
    }

    #[test]
    fn known_kinds_forward_exactly_what_was_sent() {
        for raw in [
            json!({ "tipo": "pago_enviado", "monto": 1000 }),
            json!({ "tipo": "pago_enviado", "id": "txn_1", "monto": 1000.5, "timestamp": 1700000000000_i64 }),
            json!({ "tipo": "solicitud_pago", "destino": "", "monto": 0, "moneda": "COP" }),
            json!({ "tipo": "pago_recibido", "origen": "user_a", "concepto": "Almuerzo" }),
            json!({ "tipo": "pago_completado", "monto": -3 }),
            json!({ "tipo": "pago_rechazado" }),
        ] {
            assert_eq!(RelayMessage::from_value(raw.clone()).to_value(), raw);
        }
    }

    #[test]
    fn explicit_null_passes_through_untyped() {
        let raw = json!({ "tipo": "pago_enviado", "origen": null, "monto": 5 });
        let msg = RelayMessage::from_value(raw.clone());
        assert!(matches!(msg, RelayMessage::Unrecognized { .. }));
        assert_eq!(msg.to_value(), raw);
    }

    #[test]
    fn whole_amounts_encode_as_integers() {
        assert_eq!(amount_number(1000.0), Some(Number::from(1000)));
        assert_eq!(json!(amount_number(12.5)), json!(12.5));
        assert_eq!(amount_number(f64::NAN), None);
    }

    #[test]
    fn unknown_kind_passes_through() {
        let msg = RelayMessage::from_value(json!({ "tipo": "saludo", "texto": "hola" }));
        assert_eq!(msg.kind(), "saludo");
        assert_eq!(msg.to_value(), json!({ "tipo": "saludo", "texto": "hola" }));
    }

    #[test]
    fn mistyped_known_kind_passes_through() {
        let msg = RelayMessage::from_value(json!({ "tipo": "pago_enviado", "monto": "mucho" }));
        assert!(matches!(msg, RelayMessage::Unrecognized { .. }));
        assert_eq!(msg.kind(), "pago_enviado");
        assert_eq!(msg.to_fields()["monto"], json!("mucho"));
    }

    #[test]
    fn extra_fields_survive() {
        let msg = RelayMessage::from_value(json!({
            "tipo": "solicitud_pago",
            "monto": 2500,
            "moneda": "COP"
        }));
        let fields = msg.to_fields();
        assert_eq!(fields["moneda"], json!("COP"));
        assert_eq!(fields["tipo"], json!("solicitud_pago"));
    }

    #[test]
    fn non_object_payload_is_unrecognized() {
        let msg = RelayMessage::from_value(json!("hola"));
        assert_eq!(msg.kind(), "");
    }

    #[test]
    fn notify_messages_carry_channel_marker() {
        let inbound = InboundMessage::new(
            Channel::Notify,
            json!({ "tipo": "aviso", "_channel": "otro" }),
        );
        assert!(inbound.is_notification());
        assert_eq!(inbound.to_value()["_channel"], json!("notificar"));

        let relayed = InboundMessage::new(Channel::Relay, json!({ "tipo": "aviso" }));
        assert!(relayed.to_value().get("_channel").is_none());
    }

    #[test]
    fn payment_serializes_with_wire_names() {
        let msg = RelayMessage::from(PaymentRequest {
            recipient: Some("user_b".into()),
            amount: amount_number(2500.0),
            concept: Some("Solicitud de pago".into()),
            timestamp: Some(1),
            extra: Map::new(),
        });
        let fields = msg.to_fields();
        assert_eq!(fields["destino"], json!("user_b"));
        assert_eq!(fields["concepto"], json!("Solicitud de pago"));
        assert_eq!(fields["tipo"], json!("solicitud_pago"));
        assert_eq!(fields["monto"], json!(2500));
    }
}
