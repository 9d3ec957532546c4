use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pasarela_relay::DeliveryScope;

/// pasarela: relay client for the payment simulation.
#[derive(Parser, Debug)]
#[command(name = "pasarela", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Relay URL override.
    #[arg(long, global = true)]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print this device's session id, creating it on first use.
    SessionId,

    /// Connect and print state changes and inbound messages as JSON lines.
    Listen,

    /// Send a raw JSON payload.
    Send {
        /// Who receives it: yo, ustedes or nosotros.
        #[arg(long, default_value = "nosotros")]
        scope: DeliveryScope,

        /// JSON object with at least a `tipo` field.
        payload: String,
    },

    /// Announce a payment to another session.
    Pay {
        /// Recipient session id or phone number.
        #[arg(long)]
        to: String,

        #[arg(long)]
        amount: f64,

        #[arg(long, default_value = "Transferencia")]
        concept: String,
    },

    /// Ask to be paid into this session.
    Request {
        #[arg(long)]
        amount: f64,

        #[arg(long, default_value = "Solicitud de pago")]
        concept: String,
    },
}

pub fn parse() -> Args {
    Args::parse()
}
