//! Subcommand implementations.

use std::time::Duration;

use pasarela_common::{new_transaction_id, now_millis, PasarelaError};
use pasarela_config::PasarelaConfig;
use pasarela_relay::{
    amount_number, load_or_create, ConnectionState, DeliveryScope, FileSessionStore,
    OutboundMessage, PaymentRequest, PaymentSent, RelayClient, RelayMessage,
};
use serde_json::{json, Map, Number, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::Command;

/// How long one-shot sends wait for the relay to confirm the session id.
const IDENTIFY_WAIT: Duration = Duration::from_secs(5);

pub async fn run(command: Command, config: &PasarelaConfig) -> Result<(), PasarelaError> {
    match command {
        Command::SessionId => session_id(config),
        Command::Listen => listen(config).await,
        Command::Send { scope, payload } => {
            let message = parse_payload(&payload)?;
            let client = RelayClient::from_config(config)?;
            deliver(&client, message, scope).await
        }
        Command::Pay {
            to,
            amount,
            concept,
        } => {
            let amount = check_amount(amount)?;
            let client = RelayClient::from_config(config)?;
            let payment = PaymentSent {
                id: Some(new_transaction_id()),
                origin: Some(client.session_id().to_string()),
                recipient: Some(to),
                amount: Some(amount),
                concept: Some(concept),
                timestamp: Some(now_millis()),
                extra: Map::new(),
            };
            deliver(&client, payment.into(), DeliveryScope::All).await
        }
        Command::Request { amount, concept } => {
            let amount = check_amount(amount)?;
            let client = RelayClient::from_config(config)?;
            let request = PaymentRequest {
                recipient: Some(client.session_id().to_string()),
                amount: Some(amount),
                concept: Some(concept),
                timestamp: Some(now_millis()),
                extra: Map::new(),
            };
            deliver(&client, request.into(), DeliveryScope::All).await
        }
    }
}

fn session_id(config: &PasarelaConfig) -> Result<(), PasarelaError> {
    let store = FileSessionStore::from_config(&config.session)?;
    let id = load_or_create(&store)?;
    println!("{id}");
    Ok(())
}

async fn listen(config: &PasarelaConfig) -> Result<(), PasarelaError> {
    let client = RelayClient::from_config(config)?;
    let mut states = client.watch_state();
    let mut messages = client.messages();

    client.connect().await?;
    info!(session_id = %client.session_id(), endpoint = %client.endpoint(), "listening");
    let current = *states.borrow_and_update();
    print_state(current);

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                print_state(state);
                if state == ConnectionState::Disconnected {
                    warn!("relay connection ended");
                    break;
                }
            }
            message = messages.recv() => match message {
                Ok(message) => println!("{}", message.to_value()),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "output fell behind, messages skipped"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    client.disconnect().await;
    Ok(())
}

/// Connect, send once and close, printing what went out.
async fn deliver(
    client: &RelayClient,
    message: RelayMessage,
    scope: DeliveryScope,
) -> Result<(), PasarelaError> {
    client.connect().await?;

    let mut states = client.watch_state();
    let identified = tokio::time::timeout(IDENTIFY_WAIT, states.wait_for(|s| s.is_identified()))
        .await
        .is_ok_and(|result| result.is_ok());
    if !identified {
        warn!(session_id = %client.session_id(), "relay did not confirm the session id, sending anyway");
    }

    client.send_with_scope(&message, scope);
    println!("{}", OutboundMessage::new(&message, scope).into_value());

    client.disconnect().await;
    Ok(())
}

fn parse_payload(payload: &str) -> Result<RelayMessage, PasarelaError> {
    match serde_json::from_str::<Value>(payload)? {
        value @ Value::Object(_) => Ok(RelayMessage::from_value(value)),
        _ => Err(PasarelaError::Other("payload must be a JSON object".into())),
    }
}

fn check_amount(amount: f64) -> Result<Number, PasarelaError> {
    match amount_number(amount) {
        Some(number) if amount > 0.0 => Ok(number),
        _ => Err(PasarelaError::Other(format!(
            "amount must be a positive number, got {amount}"
        ))),
    }
}

fn print_state(state: ConnectionState) {
    println!("{}", json!({ "estado": state.to_string() }));
}
