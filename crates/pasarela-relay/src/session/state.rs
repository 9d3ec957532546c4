//! State shared between client handles and the connection task.
//!
//! Every connection task carries the generation it was started with.
//! Transitions and publishes from a task whose generation is no longer the
//! active one are dropped, so a connection that is being torn down can
//! never overwrite the state of its successor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pasarela_common::SessionId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::connection::run_connection;
use super::types::{ClientOptions, ConnectionState, Outcome, SessionCommand};
use crate::errors::ConnectionError;
use crate::message::InboundMessage;
use crate::registry::SubscriberRegistry;
use crate::transport::{Connector, Endpoint};

struct ActiveConnection {
    generation: u64,
    commands: mpsc::UnboundedSender<SessionCommand>,
    outcome: watch::Receiver<Option<Outcome>>,
    task: Option<JoinHandle<()>>,
}

pub(crate) struct SessionCore {
    pub(crate) session_id: SessionId,
    pub(crate) options: ClientOptions,
    pub(crate) registry: SubscriberRegistry,
    state: watch::Sender<ConnectionState>,
    latest: watch::Sender<Option<InboundMessage>>,
    active: Mutex<Option<ActiveConnection>>,
    generation: AtomicU64,
}

impl SessionCore {
    pub(crate) fn new(session_id: SessionId, options: ClientOptions) -> Self {
        let registry = SubscriberRegistry::new(options.message_capacity);
        Self {
            session_id,
            options,
            registry,
            state: watch::Sender::new(ConnectionState::Disconnected),
            latest: watch::Sender::new(None),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveConnection>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the live connection attempt, or start one.
    pub(crate) fn begin(
        core: &Arc<Self>,
        connector: &Arc<dyn Connector>,
        endpoint: &Endpoint,
    ) -> watch::Receiver<Option<Outcome>> {
        let mut active = core.active();
        if let Some(existing) = active.as_ref() {
            debug!(generation = existing.generation, "joining live connection");
            return existing.outcome.clone();
        }

        let generation = core.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome) = watch::channel(None);

        core.state.send_replace(ConnectionState::Connecting);
        info!(endpoint = %endpoint, generation, "connecting to relay");

        let task = tokio::spawn(run_connection(
            Arc::clone(core),
            generation,
            Arc::clone(connector),
            endpoint.clone(),
            command_rx,
            Settle::new(outcome_tx),
        ));

        *active = Some(ActiveConnection {
            generation,
            commands,
            outcome: outcome.clone(),
            task: Some(task),
        });
        outcome
    }

    /// Queue a command for the live connection. `false` when there is none.
    pub(crate) fn command(&self, command: SessionCommand) -> bool {
        match self.active().as_ref() {
            Some(active) => active.commands.send(command).is_ok(),
            None => false,
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.active()
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    /// Apply a state transition on behalf of connection `generation`.
    pub(crate) fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let active = self.active();
        if active.as_ref().map(|a| a.generation) != Some(generation) {
            return false;
        }
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
        true
    }

    /// Record and fan out an inbound message from connection `generation`.
    pub(crate) fn publish(&self, generation: u64, message: InboundMessage) {
        if !self.is_current(generation) {
            return;
        }
        self.latest.send_replace(Some(message.clone()));
        self.registry.dispatch(&message);
    }

    /// Called by a connection task as it ends.
    pub(crate) fn release(&self, generation: u64) {
        let mut active = self.active();
        if active.as_ref().map(|a| a.generation) == Some(generation) {
            *active = None;
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Detach the live connection and ask it to close. Returns its task so
    /// the caller may wait for the transport to shut.
    pub(crate) fn disconnect(&self) -> Option<JoinHandle<()>> {
        let taken = self.active().take();
        self.state.send_replace(ConnectionState::Disconnected);
        let mut active = taken?;
        let _ = active.commands.send(SessionCommand::Disconnect);
        active.task.take()
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn latest(&self) -> Option<InboundMessage> {
        self.latest.borrow().clone()
    }

    pub(crate) fn watch_latest(&self) -> watch::Receiver<Option<InboundMessage>> {
        self.latest.subscribe()
    }
}

/// Settles a `connect()` attempt at most once.
pub(crate) struct Settle {
    sender: Option<watch::Sender<Option<Outcome>>>,
    settled: bool,
}

impl Settle {
    pub(crate) fn new(sender: watch::Sender<Option<Outcome>>) -> Self {
        Self {
            sender: Some(sender),
            settled: false,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.settled
    }

    pub(crate) fn succeed(&mut self) -> bool {
        self.settle(Ok(()))
    }

    /// Reject the attempt. `false` if it had already settled.
    pub(crate) fn fail(&mut self, error: ConnectionError) -> bool {
        self.settle(Err(error))
    }

    /// Leave an unsettled attempt pending for good.
    pub(crate) fn abandon(&mut self) {
        if !self.settled {
            self.sender = None;
        }
    }

    fn settle(&mut self, outcome: Outcome) -> bool {
        if self.settled {
            return false;
        }
        match &self.sender {
            Some(sender) => {
                sender.send_replace(Some(outcome));
                self.settled = true;
                true
            }
            None => false,
        }
    }
}
