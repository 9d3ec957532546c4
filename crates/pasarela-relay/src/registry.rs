//! Fan-out of inbound messages to independent consumers.
//!
//! Consumers either register a callback (and get back a [`Subscription`]
//! handle) or take a broadcast receiver. Neither path replays history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;

use crate::message::InboundMessage;

type Callback = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct RegistryInner {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<SubscriberId, Callback>>,
    bus: broadcast::Sender<InboundMessage>,
}

impl RegistryInner {
    fn callbacks(&self) -> MutexGuard<'_, HashMap<SubscriberId, Callback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct SubscriberRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriberRegistry {
    /// `capacity` bounds how far a slow broadcast receiver may lag.
    pub fn new(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                callbacks: Mutex::new(HashMap::new()),
                bus,
            }),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.callbacks().insert(id, Arc::new(callback));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// A receiver that sees every message dispatched from now on.
    pub fn events(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.bus.subscribe()
    }

    /// Deliver a message to every callback and broadcast receiver.
    /// Returns the number of callbacks invoked.
    ///
    /// Callbacks run outside the registry lock, so they may subscribe or
    /// unsubscribe while being called.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let callbacks: Vec<Callback> = self.inner.callbacks().values().cloned().collect();
        for callback in &callbacks {
            callback(message);
        }
        let _ = self.inner.bus.send(message.clone());
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.inner.callbacks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Handle returned by [`SubscriberRegistry::subscribe`].
///
/// Dropping the handle keeps the callback registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback. Safe to call any number of times; returns
    /// whether this call removed it.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => inner.callbacks().remove(&self.id).is_some(),
            None => false,
        }
    }
}
