//! Socket.IO v5 over Engine.IO v4 framing.
//!
//! The relay speaks Socket.IO. Engine.IO packets carry transport-level
//! chatter (open handshake, ping/pong, close); Socket.IO packets ride inside
//! Engine.IO `message` packets and carry namespace connects, events and acks.
//! Only the text encoding is supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// Record separator between packets in a long-polling payload.
pub const PAYLOAD_SEPARATOR: char = '\x1e';

/// Engine.IO protocol revision sent in the `EIO` query parameter.
pub const ENGINE_IO_VERSION: u8 = 4;

// ---------------------------------------------------------------------------
// Engine.IO
// ---------------------------------------------------------------------------

/// Body of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenHandshake {
    /// How long the transport may stay silent before it counts as dead.
    pub fn liveness(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let body = chars.as_str();
        match kind {
            '0' => serde_json::from_str(body)
                .map(EnginePacket::Open)
                .map_err(|e| ProtocolError::Json(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            'b' => Err(ProtocolError::Binary),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                format!("0{}", serde_json::to_string(handshake).unwrap_or_default())
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Split a long-polling response body into packets.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, ProtocolError> {
    body.split(PAYLOAD_SEPARATOR)
        .filter(|chunk| !chunk.is_empty())
        .map(EnginePacket::decode)
        .collect()
}

// ---------------------------------------------------------------------------
// Socket.IO
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
}

impl PacketType {
    fn code(self) -> char {
        match self {
            PacketType::Connect => '0',
            PacketType::Disconnect => '1',
            PacketType::Event => '2',
            PacketType::Ack => '3',
            PacketType::ConnectError => '4',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SocketPacket {
    pub kind: PacketType,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn new(kind: PacketType, namespace: &str, id: Option<u64>, data: Option<Value>) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            id,
            data,
        }
    }

    pub fn connect(namespace: &str) -> Self {
        Self::new(PacketType::Connect, namespace, None, None)
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self::new(PacketType::Disconnect, namespace, None, None)
    }

    /// An event packet: `[name, ...args]`, optionally requesting an ack.
    pub fn event(namespace: &str, name: &str, args: Vec<Value>, id: Option<u64>) -> Self {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Value::String(name.to_string()));
        items.extend(args);
        Self::new(PacketType::Event, namespace, id, Some(Value::Array(items)))
    }

    pub fn ack(namespace: &str, id: u64, args: Vec<Value>) -> Self {
        Self::new(PacketType::Ack, namespace, Some(id), Some(Value::Array(args)))
    }

    pub fn connect_error(namespace: &str, message: &str) -> Self {
        Self::new(
            PacketType::ConnectError,
            namespace,
            None,
            Some(serde_json::json!({ "message": message })),
        )
    }

    /// Event name of an `Event` packet.
    pub fn event_name(&self) -> Option<&str> {
        match (&self.kind, &self.data) {
            (PacketType::Event, Some(Value::Array(items))) => items.first()?.as_str(),
            _ => None,
        }
    }

    /// Arguments following the event name, or the ack arguments.
    pub fn args(&self) -> &[Value] {
        match (&self.kind, &self.data) {
            (PacketType::Event, Some(Value::Array(items))) if !items.is_empty() => &items[1..],
            (PacketType::Ack, Some(Value::Array(items))) => items,
            _ => &[],
        }
    }

    /// Human readable reason carried by a `ConnectError` packet.
    pub fn error_message(&self) -> String {
        match &self.data {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Object(map)) => map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            _ => "unknown error".to_string(),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.code());
        if self.namespace != "/" {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = match chars.next().ok_or(ProtocolError::Empty)? {
            '0' => PacketType::Connect,
            '1' => PacketType::Disconnect,
            '2' => PacketType::Event,
            '3' => PacketType::Ack,
            '4' => PacketType::ConnectError,
            '5' | '6' => return Err(ProtocolError::Binary),
            other => return Err(ProtocolError::UnknownPacketType(other)),
        };
        let mut rest = chars.as_str();

        let mut namespace = "/";
        if rest.starts_with('/') {
            match rest.find(',') {
                Some(comma) => {
                    namespace = &rest[..comma];
                    rest = &rest[comma + 1..];
                }
                None => {
                    namespace = rest;
                    rest = "";
                }
            }
        }

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let id = if digits > 0 {
            let raw = &rest[..digits];
            Some(
                raw.parse::<u64>()
                    .map_err(|_| ProtocolError::InvalidId(raw.to_string()))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(rest).map_err(|e| ProtocolError::Json(e.to_string()))?)
        };

        Ok(Self {
            kind,
            namespace: namespace.to_string(),
            id,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .unwrap();
        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(handshake.liveness(), std::time::Duration::from_millis(45_000));
        assert_eq!(handshake.max_payload, Some(1_000_000));
    }

    #[test]
    fn engine_ping_pong_and_message() {
        assert_eq!(EnginePacket::decode("2").unwrap(), EnginePacket::Ping(String::new()));
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
        assert_eq!(
            EnginePacket::decode("40/relay,").unwrap(),
            EnginePacket::Message("0/relay,".into())
        );
        assert_eq!(EnginePacket::Message("0/relay,".into()).encode(), "40/relay,");
    }

    #[test]
    fn engine_rejects_unknown_and_binary() {
        assert_eq!(EnginePacket::decode(""), Err(ProtocolError::Empty));
        assert_eq!(EnginePacket::decode("9"), Err(ProtocolError::UnknownPacketType('9')));
        assert_eq!(EnginePacket::decode("bAQID"), Err(ProtocolError::Binary));
    }

    #[test]
    fn polling_payload_splits_on_separator() {
        let packets = decode_payload("2\x1e42/relay,[\"relay\",{}]\x1e6").unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], EnginePacket::Ping(String::new()));
        assert_eq!(packets[2], EnginePacket::Noop);
    }

    #[test]
    fn encodes_namespace_connect() {
        assert_eq!(SocketPacket::connect("/relay").encode(), "0/relay,");
        assert_eq!(SocketPacket::connect("/").encode(), "0");
        assert_eq!(SocketPacket::disconnect("/relay").encode(), "1/relay,");
    }

    #[test]
    fn encodes_event_with_ack_id() {
        let packet = SocketPacket::event("/relay", "identificar", vec![json!("user_abc123")], Some(0));
        assert_eq!(packet.encode(), r#"2/relay,0["identificar","user_abc123"]"#);
    }

    #[test]
    fn decodes_ack() {
        let packet = SocketPacket::decode("3/relay,17[true]").unwrap();
        assert_eq!(packet.kind, PacketType::Ack);
        assert_eq!(packet.namespace, "/relay");
        assert_eq!(packet.id, Some(17));
        assert_eq!(packet.args(), &[json!(true)]);
    }

    #[test]
    fn decodes_event_on_default_namespace() {
        let packet = SocketPacket::decode(r#"2["notificar",{"tipo":"aviso"}]"#).unwrap();
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.id, None);
        assert_eq!(packet.event_name(), Some("notificar"));
        assert_eq!(packet.args(), &[json!({"tipo": "aviso"})]);
    }

    #[test]
    fn decodes_connect_reply_and_error() {
        let ok = SocketPacket::decode(r#"0/relay,{"sid":"abc"}"#).unwrap();
        assert_eq!(ok.kind, PacketType::Connect);
        assert_eq!(ok.data, Some(json!({"sid": "abc"})));

        let err = SocketPacket::decode(r#"4/relay,{"message":"Invalid namespace"}"#).unwrap();
        assert_eq!(err.kind, PacketType::ConnectError);
        assert_eq!(err.error_message(), "Invalid namespace");
    }

    #[test]
    fn namespace_without_trailing_comma() {
        let packet = SocketPacket::decode("1/relay").unwrap();
        assert_eq!(packet.kind, PacketType::Disconnect);
        assert_eq!(packet.namespace, "/relay");
        assert!(packet.data.is_none());
    }

    #[test]
    fn rejects_binary_and_bad_json() {
        assert_eq!(SocketPacket::decode("5"), Err(ProtocolError::Binary));
        assert!(matches!(
            SocketPacket::decode("2/relay,[oops"),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn decode_reads_what_encode_writes() {
        let packet = SocketPacket::event("/pasarela", "pasarela", vec![json!({"monto": 5})], None);
        assert_eq!(SocketPacket::decode(&packet.encode()).unwrap(), packet);
    }
}
