//! Relay session: connection lifecycle, identification, sending and
//! inbound routing.
//!
//! A [`RelayClient`] owns at most one live connection. Each connection runs
//! as a background task that holds the transport link and applies every
//! protocol transition; client handles reach it through a command channel
//! and observe it through watch and broadcast channels.

mod client;
mod connection;
mod handler;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use client::RelayClient;
pub use types::{ClientOptions, ConnectionState};
