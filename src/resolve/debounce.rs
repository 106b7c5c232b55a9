//! Cancellable scheduled tasks keyed by an id
//!
//! Scheduling a key that already has a task aborts the old task and bumps the
//! key's generation. Work that survives past an `.await` checks its
//! [`Ticket`] before mutating shared state, so a superseded task never
//! applies its result even if it was already past its sleep when replaced.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Slots<K> {
    next_generation: u64,
    slots: HashMap<K, Slot>,
}

/// Table of at most one scheduled task per key
pub struct Debouncer<K> {
    inner: Arc<Mutex<Slots<K>>>,
}

/// Proof of which scheduling a running task belongs to
pub struct Ticket<K> {
    key: K,
    generation: u64,
    inner: Arc<Mutex<Slots<K>>>,
}

fn lock<K>(inner: &Mutex<Slots<K>>) -> MutexGuard<'_, Slots<K>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K> Ticket<K>
where
    K: Eq + Hash,
{
    /// True while no newer scheduling or cancellation replaced this one
    pub fn is_current(&self) -> bool {
        lock(&self.inner)
            .slots
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Release the key's slot if it still belongs to this ticket
    fn finish(&self) {
        let mut slots = lock(&self.inner);
        if slots
            .slots
            .get(&self.key)
            .is_some_and(|slot| slot.generation == self.generation)
        {
            slots.slots.remove(&self.key);
        }
    }
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slots {
                next_generation: 0,
                slots: HashMap::new(),
            })),
        }
    }

    /// Run `task` after `delay`, replacing any task already scheduled for `key`
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, task: F)
    where
        F: FnOnce(Ticket<K>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = lock(&self.inner);
        slots.next_generation += 1;
        let generation = slots.next_generation;

        if let Some(previous) = slots.slots.remove(&key) {
            previous.handle.abort();
        }

        let ticket = Ticket {
            key: key.clone(),
            generation,
            inner: Arc::clone(&self.inner),
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let finisher = Ticket {
                key: ticket.key.clone(),
                generation: ticket.generation,
                inner: Arc::clone(&ticket.inner),
            };
            task(ticket).await;
            finisher.finish();
        });

        // Held lock keeps the task from finishing before its slot exists
        slots.slots.insert(key, Slot { generation, handle });
    }

    /// Abort the task scheduled for `key`; returns whether one existed
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.inner).slots.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Abort every scheduled task
    pub fn cancel_all(&self) {
        for (_, slot) in lock(&self.inner).slots.drain() {
            slot.handle.abort();
        }
    }

    pub fn is_scheduled(&self, key: &K) -> bool {
        lock(&self.inner).slots.contains_key(key)
    }

    /// Number of keys with a live task
    pub fn pending(&self) -> usize {
        lock(&self.inner).slots.len()
    }
}

impl<K> Clone for Debouncer<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
