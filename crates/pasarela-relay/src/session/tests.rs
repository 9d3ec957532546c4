use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pasarela_common::SessionId;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::*;
use crate::errors::ConnectionError;
use crate::message::{InboundMessage, RelayMessage};
use crate::protocol::{PacketType, SocketPacket};
use crate::transport::{Endpoint, MemoryConnector, MemoryPeer};

const NS: &str = "/relay";
const WAIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn client_with(connector: &MemoryConnector, session: &str) -> RelayClient {
    RelayClient::new(
        Endpoint::new("http://localhost:5000", NS).unwrap(),
        SessionId::from(session),
        Arc::new(connector.clone()),
        ClientOptions::default(),
    )
}

struct Harness {
    client: RelayClient,
    connector: MemoryConnector,
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

fn harness(session: &str) -> Harness {
    let (connector, peers) = MemoryConnector::new();
    Harness {
        client: client_with(&connector, session),
        connector,
        peers,
    }
}

/// Take the next link, expect the namespace connect and accept it.
async fn accept(peers: &mut mpsc::UnboundedReceiver<MemoryPeer>) -> MemoryPeer {
    let mut peer = peers.recv().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), SocketPacket::connect(NS));
    peer.send(SocketPacket::new(
        PacketType::Connect,
        NS,
        None,
        Some(json!({ "sid": "srv_1" })),
    ))
    .await;
    peer
}

/// Connect, then consume the automatic identify request.
async fn connected(h: &mut Harness) -> (MemoryPeer, u64) {
    let (result, mut peer) = tokio::join!(h.client.connect(), accept(&mut h.peers));
    result.unwrap();
    let identify = peer.recv().await.unwrap();
    assert_eq!(identify.event_name(), Some("identificar"));
    (peer, identify.id.unwrap())
}

async fn wait_for_state(client: &RelayClient, state: ConnectionState) {
    let mut rx = client.watch_state();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached in time")
        .unwrap();
}

fn relay_event(payload: Value) -> SocketPacket {
    SocketPacket::event(NS, "relay", vec![payload], None)
}

fn payment() -> RelayMessage {
    RelayMessage::from_value(json!({
        "tipo": "pago_enviado",
        "id": "txn_1",
        "origen": "user_a",
        "destino": "user_b",
        "monto": 1000,
        "concepto": "Almuerzo",
        "timestamp": 1
    }))
}

async fn next_message(rx: &mut tokio::sync::broadcast::Receiver<InboundMessage>) -> InboundMessage {
    timeout(WAIT, rx.recv()).await.expect("no message in time").unwrap()
}

// ---------------------------------------------------------------------------
// Connect and identify
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_then_identify_with_persisted_id() {
    let mut h = harness("user_abc123");
    let (result, mut peer) = tokio::join!(h.client.connect(), accept(&mut h.peers));
    result.unwrap();
    assert!(h.client.is_connected());
    assert!(!h.client.is_identified());

    let identify = peer.recv().await.unwrap();
    assert_eq!(identify.kind, PacketType::Event);
    assert_eq!(identify.event_name(), Some("identificar"));
    assert_eq!(identify.args(), &[json!("user_abc123")]);
    assert_eq!(identify.id, Some(0));

    peer.send(SocketPacket::ack(NS, 0, vec![json!(true)])).await;
    wait_for_state(&h.client, ConnectionState::Identified).await;
    assert!(h.client.is_connected());
}

#[tokio::test]
async fn rejected_identity_stays_connected() {
    let mut h = harness("user_abc123");
    let (peer, ack_id) = connected(&mut h).await;
    let mut messages = h.client.messages();

    peer.send(SocketPacket::ack(NS, ack_id, vec![json!(false)])).await;
    // Packets are handled in order, so the ack is applied once this arrives.
    peer.send(relay_event(json!({ "tipo": "marca" }))).await;
    next_message(&mut messages).await;

    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert!(!h.client.is_identified());
}

#[tokio::test]
async fn connect_error_rejects_connect() {
    let mut h = harness("user_abc123");
    let peers = &mut h.peers;
    let relay = async {
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.recv().await.unwrap(), SocketPacket::connect(NS));
        peer.send(SocketPacket::connect_error(NS, "Invalid namespace")).await;
        peer
    };
    let (result, mut peer) = tokio::join!(h.client.connect(), relay);

    assert_eq!(
        result,
        Err(ConnectionError::Refused("Invalid namespace".into()))
    );
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert_eq!(timeout(WAIT, peer.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn transport_failure_rejects_connect() {
    let connector = MemoryConnector::refusing("connection refused");
    let client = client_with(&connector, "user_abc123");

    let err = client.connect().await.unwrap_err();
    assert_eq!(
        err,
        ConnectionError::Transport("refused: connection refused".into())
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn transport_close_before_answer_rejects_connect() {
    let mut h = harness("user_abc123");
    let peers = &mut h.peers;
    let relay = async {
        let mut peer = peers.recv().await.unwrap();
        peer.recv().await.unwrap();
        peer.close("transport close").await;
        peer
    };
    let (result, _peer) = tokio::join!(h.client.connect(), relay);
    assert_eq!(
        result,
        Err(ConnectionError::Closed("transport close".into()))
    );
}

#[tokio::test]
async fn connect_is_idempotent_while_live() {
    let mut h = harness("user_abc123");
    let (first, second, _peer) = tokio::join!(
        h.client.connect(),
        h.client.connect(),
        accept(&mut h.peers)
    );
    first.unwrap();
    second.unwrap();

    h.client.connect().await.unwrap();
    assert_eq!(h.connector.opened(), 1);
}

#[tokio::test]
async fn connect_after_disconnect_opens_a_new_link() {
    let mut h = harness("user_abc123");
    let (mut peer, _) = connected(&mut h).await;

    h.client.disconnect().await;
    assert_eq!(peer.recv().await, Some(SocketPacket::disconnect(NS)));
    assert_eq!(peer.recv().await, None);

    let (result, _peer) = tokio::join!(h.client.connect(), accept(&mut h.peers));
    result.unwrap();
    assert!(h.client.is_connected());
    assert_eq!(h.connector.opened(), 2);
}

#[tokio::test]
async fn disconnect_while_connecting_never_settles() {
    let mut h = harness("user_abc123");
    let client = h.client.clone();
    let mut attempt = tokio::spawn(async move { client.connect().await });

    let mut peer = h.peers.recv().await.unwrap();
    assert_eq!(peer.recv().await.unwrap(), SocketPacket::connect(NS));

    h.client.disconnect().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(timeout(Duration::from_millis(100), &mut attempt).await.is_err());
    attempt.abort();
}

#[tokio::test]
async fn late_connect_error_only_changes_state() {
    let mut h = harness("user_abc123");
    let (peer, _) = connected(&mut h).await;

    peer.send(SocketPacket::connect_error(NS, "session expired")).await;
    wait_for_state(&h.client, ConnectionState::Disconnected).await;
}

#[tokio::test]
async fn server_disconnect_clears_identification() {
    let mut h = harness("user_abc123");
    let (peer, ack_id) = connected(&mut h).await;
    peer.send(SocketPacket::ack(NS, ack_id, vec![json!(true)])).await;
    wait_for_state(&h.client, ConnectionState::Identified).await;

    peer.send(SocketPacket::disconnect(NS)).await;
    wait_for_state(&h.client, ConnectionState::Disconnected).await;
    assert!(!h.client.is_identified());
}

#[tokio::test]
async fn explicit_identify_resolves_with_ack() {
    let mut h = harness("user_abc123");
    let (mut peer, first) = connected(&mut h).await;

    let client = h.client.clone();
    let pending = tokio::spawn(async move { client.identify().await });

    let again = peer.recv().await.unwrap();
    assert_eq!(again.event_name(), Some("identificar"));
    assert_eq!(again.id, Some(first + 1));
    peer.send(SocketPacket::ack(NS, first + 1, vec![json!(true)])).await;

    assert!(timeout(WAIT, pending).await.unwrap().unwrap());
    assert!(h.client.is_identified());
}

#[tokio::test]
async fn identify_while_disconnected_is_false() {
    let h = harness("user_abc123");
    assert!(!h.client.identify().await);
}

#[tokio::test]
async fn dropping_the_client_closes_the_link() {
    let mut h = harness("user_abc123");
    let (mut peer, _) = connected(&mut h).await;
    let state = h.client.watch_state();

    drop(h.client);
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    assert_eq!(peer.recv().await, Some(SocketPacket::disconnect(NS)));
    assert_eq!(peer.recv().await, None);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let mut h = harness("user_abc123");
    h.client.disconnect().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    let _ = connected(&mut h).await;
    h.client.disconnect().await;
    h.client.disconnect().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_before_connect_is_dropped() {
    let mut h = harness("user_abc123");
    h.client.send(&payment());

    let (mut peer, _) = connected(&mut h).await;
    h.client.send_to_self(&RelayMessage::from_value(json!({ "tipo": "despues" })));

    let packet = peer.recv().await.unwrap();
    assert_eq!(packet.event_name(), Some("relay"));
    assert_eq!(packet.args()[0]["tipo"], json!("despues"));
}

#[tokio::test]
async fn sends_are_tagged_with_their_scope() {
    let mut h = harness("user_abc123");
    let (mut peer, _) = connected(&mut h).await;

    h.client.send(&payment());
    h.client.send_to_self(&payment());
    h.client.send_to_others(&payment());
    h.client.send_to_all(&payment());

    let mut scopes = Vec::new();
    for _ in 0..4 {
        let packet = peer.recv().await.unwrap();
        assert_eq!(packet.namespace, NS);
        assert_eq!(packet.event_name(), Some("relay"));
        let payload = &packet.args()[0];
        assert_eq!(payload["tipo"], json!("pago_enviado"));
        assert_eq!(payload["monto"], json!(1000));
        scopes.push(payload["destino"].as_str().unwrap().to_string());
    }
    assert_eq!(scopes, vec!["nosotros", "yo", "ustedes", "nosotros"]);
}

// ---------------------------------------------------------------------------
// Inbound routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn latest_message_is_last_write_wins() {
    let mut h = harness("user_abc123");
    let (peer, _) = connected(&mut h).await;
    assert!(h.client.latest_message().is_none());

    let mut messages = h.client.messages();
    peer.send(relay_event(json!({ "tipo": "pago_enviado", "monto": 10 }))).await;
    peer.send(relay_event(json!({ "tipo": "pago_recibido", "monto": 10 }))).await;
    next_message(&mut messages).await;
    next_message(&mut messages).await;

    assert_eq!(h.client.latest_message().unwrap().kind(), "pago_recibido");
}

#[tokio::test]
async fn notify_frames_are_tagged() {
    let mut h = harness("user_abc123");
    let (peer, _) = connected(&mut h).await;
    let mut messages = h.client.messages();

    peer.send(SocketPacket::event(
        NS,
        "notificar",
        vec![json!({ "tipo": "aviso", "texto": "hola" })],
        None,
    ))
    .await;

    let message = next_message(&mut messages).await;
    assert!(message.is_notification());
    assert_eq!(
        message.to_value(),
        json!({ "tipo": "aviso", "texto": "hola", "_channel": "notificar" })
    );
}

#[tokio::test]
async fn unknown_events_and_namespaces_are_ignored() {
    let mut h = harness("user_abc123");
    let (peer, _) = connected(&mut h).await;
    let mut messages = h.client.messages();

    peer.send(SocketPacket::event(NS, "otro", vec![json!({ "tipo": "x" })], None))
        .await;
    peer.send(SocketPacket::event("/admin", "relay", vec![json!({ "tipo": "y" })], None))
        .await;
    peer.send(relay_event(json!({ "tipo": "z" }))).await;

    assert_eq!(next_message(&mut messages).await.kind(), "z");
}

#[tokio::test]
async fn subscribers_fan_out_and_unsubscribe() {
    let mut h = harness("user_abc123");
    let (peer, _) = connected(&mut h).await;
    let mut messages = h.client.messages();

    let count_a = Arc::new(AtomicUsize::new(0));
    let count_b = Arc::new(AtomicUsize::new(0));
    let seen_a = Arc::clone(&count_a);
    let seen_b = Arc::clone(&count_b);
    let a = h.client.subscribe(move |_| {
        seen_a.fetch_add(1, Ordering::SeqCst);
    });
    let _b = h.client.subscribe(move |_| {
        seen_b.fetch_add(1, Ordering::SeqCst);
    });

    peer.send(relay_event(json!({ "tipo": "uno" }))).await;
    next_message(&mut messages).await;

    assert!(a.unsubscribe());
    assert!(!a.unsubscribe());

    peer.send(relay_event(json!({ "tipo": "dos" }))).await;
    next_message(&mut messages).await;

    assert_eq!(count_a.load(Ordering::SeqCst), 1);
    assert_eq!(count_b.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Two clients through a scope-routing relay
// ---------------------------------------------------------------------------

/// Minimal relay: accepts every namespace connect, acks every identify with
/// `true`, and routes relay events by their `destino` scope.
fn spawn_relay(mut peers: Vec<mpsc::UnboundedReceiver<MemoryPeer>>) {
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, SocketPacket)>();
        let mut handles = Vec::new();
        for (index, incoming) in peers.iter_mut().enumerate() {
            let mut peer = incoming.recv().await.unwrap();
            handles.push(peer.handle());
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(packet) = peer.recv().await {
                    if tx.send((index, packet)).is_err() {
                        break;
                    }
                }
            });
        }

        while let Some((from, packet)) = rx.recv().await {
            match packet.kind {
                PacketType::Connect => {
                    handles[from]
                        .send(SocketPacket::new(PacketType::Connect, NS, None, Some(json!({}))))
                        .await;
                }
                PacketType::Event if packet.event_name() == Some("identificar") => {
                    if let Some(id) = packet.id {
                        handles[from].send(SocketPacket::ack(NS, id, vec![json!(true)])).await;
                    }
                }
                PacketType::Event if packet.event_name() == Some("relay") => {
                    let payload = packet.args()[0].clone();
                    let targets: Vec<usize> = match payload["destino"].as_str() {
                        Some("yo") => vec![from],
                        Some("ustedes") => (0..handles.len()).filter(|i| *i != from).collect(),
                        _ => (0..handles.len()).collect(),
                    };
                    for target in targets {
                        handles[target].send(relay_event(payload.clone())).await;
                    }
                }
                _ => {}
            }
        }
    });
}

#[tokio::test]
async fn send_to_others_reaches_only_the_other_session() {
    let (connector_a, peers_a) = MemoryConnector::new();
    let (connector_b, peers_b) = MemoryConnector::new();
    let a = client_with(&connector_a, "user_a");
    let b = client_with(&connector_b, "user_b");
    spawn_relay(vec![peers_a, peers_b]);

    let (ra, rb) = tokio::join!(a.connect(), b.connect());
    ra.unwrap();
    rb.unwrap();
    wait_for_state(&a, ConnectionState::Identified).await;
    wait_for_state(&b, ConnectionState::Identified).await;

    let mut inbox_a = a.messages();
    let mut inbox_b = b.messages();

    a.send_to_others(&payment());
    let received = next_message(&mut inbox_b).await;
    assert_eq!(received.kind(), "pago_enviado");
    assert_eq!(received.to_value()["destino"], json!("ustedes"));
    assert_eq!(received.to_value()["monto"], json!(1000));
    assert_eq!(
        received.to_value(),
        json!({
            "tipo": "pago_enviado",
            "id": "txn_1",
            "origen": "user_a",
            "destino": "ustedes",
            "monto": 1000,
            "concepto": "Almuerzo",
            "timestamp": 1
        })
    );

    // A's first delivery is its own marker, so the payment never reached it.
    a.send_to_self(&RelayMessage::from_value(json!({ "tipo": "marca" })));
    assert_eq!(next_message(&mut inbox_a).await.kind(), "marca");
    assert_eq!(a.latest_message().unwrap().kind(), "marca");
}
