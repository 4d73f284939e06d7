//! Simulated collaborator services.

mod messaging;
mod records;
mod text;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use messaging::{Delivery, VirtualMailer, VirtualNotifier};
pub use records::{StoredDocument, VirtualDocumentStore, VirtualStatusStore, VirtualTaskBoard};
pub use text::VirtualTextGenerator;

/// Results already handed out, by idempotency key.
///
/// Clones share the same journal, so every handle of a service sees the
/// keys recorded through any other.
#[derive(Debug)]
pub(crate) struct Journal<T> {
    entries: Arc<Mutex<HashMap<String, T>>>,
}

impl<T> Clone for Journal<T> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<T> Default for Journal<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T: Clone> Journal<T> {
    /// Return the recorded result for `key`, or run `perform` once and
    /// record what it returns.
    ///
    /// The lock is held across `perform`, so two concurrent calls with the
    /// same key never both perform the side effect.
    pub(crate) fn once(&self, key: &str, perform: impl FnOnce() -> T) -> (T, bool) {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(key) {
            return (existing.clone(), false);
        }
        let value = perform();
        entries.insert(key.to_string(), value.clone());
        (value, true)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.entries).len()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
