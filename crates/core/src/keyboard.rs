//! Host keyboard hub
//!
//! The host forwards key presses to [`KeyboardHub::dispatch`]. Components
//! that own shortcuts while visible register a listener and unregister it when
//! they go away. Listeners run newest first; the first one that handles a
//! chord stops propagation.

use scorebook_viewer_core::KeyChord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type ListenerId = u64;

/// Returns `true` if the chord was handled.
pub type KeyListener = Arc<dyn Fn(&KeyChord) -> bool + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: ListenerId,
    entries: Vec<(ListenerId, KeyListener)>,
}

#[derive(Clone, Default)]
pub struct KeyboardHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl KeyboardHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, listener: KeyListener) -> ListenerId {
        let mut listeners = self.lock();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.entries.push((id, listener));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.entries.len();
        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
        listeners.entries.len() != before
    }

    /// Offer `chord` to listeners; returns whether one handled it.
    pub fn dispatch(&self, chord: &KeyChord) -> bool {
        // Listeners may call back into the hub, so never run them under the lock.
        let snapshot: Vec<KeyListener> =
            self.lock().entries.iter().rev().map(|(_, listener)| listener.clone()).collect();

        snapshot.iter().any(|listener| listener(chord))
    }

    pub fn listener_count(&self) -> usize {
        self.lock().entries.len()
    }
}
