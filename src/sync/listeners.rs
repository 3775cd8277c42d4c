//! Listener fan-out for sync events.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::state::SyncEvent;

type Callback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

#[derive(Default)]
struct Inner {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Set of callbacks notified on every [`SyncEvent`].
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback. It stays registered while the returned handle lives.
    pub fn add_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.callbacks.insert(id, Arc::new(callback));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Invokes every callback with `event`, in registration order.
    ///
    /// The registry lock is not held while callbacks run, so a callback may
    /// add or remove listeners. A panicking callback is logged and skipped.
    pub fn notify(&self, event: &SyncEvent) {
        let callbacks: Vec<(u64, Callback)> = lock(&self.inner)
            .callbacks
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(listener = id, %event, "Sync listener panicked");
            }
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Inner>>,
    active: bool,
}

impl Subscription {
    /// Removes the listener.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keeps the listener registered for the lifetime of the registry.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.registry.upgrade() {
            lock(&inner).callbacks.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}
