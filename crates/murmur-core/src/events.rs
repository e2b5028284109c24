use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nostr_sdk::prelude::PublicKey;
use parking_lot::Mutex;

/// Login state changes pushed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn {
        public_key: PublicKey,
        /// True when only a public key is held and nothing can be signed
        read_only: bool,
    },
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Explicit listener registry for session changes.
#[derive(Default)]
pub struct SessionObservers {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl SessionObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if the listener was already removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn notify(&self, event: &SessionEvent) {
        // Snapshot first so a listener may add/remove listeners re-entrantly.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}
