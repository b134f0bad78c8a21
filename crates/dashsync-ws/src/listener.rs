//! Ordered listener registry.
//!
//! Handlers are stored in registration order and invoked synchronously in
//! that order. Dispatch runs against a snapshot, so a handler may register
//! or remove listeners without deadlocking.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide counter so ids are unique across registries.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<K, E> {
    id: ListenerId,
    key: K,
    handler: Handler<E>,
}

/// Handlers keyed by `K`, receiving `&E`.
pub struct ListenerRegistry<K, E> {
    entries: RwLock<Vec<Entry<K, E>>>,
}

impl<K, E> Default for ListenerRegistry<K, E> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<K: Copy + PartialEq, E> ListenerRegistry<K, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: K, handler: Handler<E>) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push(Entry { id, key, handler });
        id
    }

    /// Returns `false` if `id` was not registered here.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Invoke every handler registered for `key`. Returns how many ran.
    pub fn dispatch(&self, key: K, event: &E) -> usize {
        let handlers: Vec<Handler<E>> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.key == key)
            .map(|entry| entry.handler.clone())
            .collect();

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
