//! Process-wide table of opaque resources keyed by generated tokens.
//!
//! Anything that must cross the transport's callback boundary is stored
//! here and referred to by its token, never by address. A retired token
//! simply stops resolving.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Token-indexed resource table.
pub struct HandleTable<T> {
    entries: Mutex<HashMap<u64, T>>,
    next_token: AtomicU64,
}

impl<T> HandleTable<T> {
    /// Create an empty table. Tokens start at 1; 0 never resolves.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a resource and return its token.
    pub fn insert(&self, value: T) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries().insert(token, value);
        token
    }

    /// Run `f` against the resource while the table is locked.
    ///
    /// Returns `None` if the token was never issued or has been retired.
    pub fn with<R>(&self, token: u64, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.entries().get(&token).map(f)
    }

    /// Retire a token, handing back the resource it referred to.
    pub fn remove(&self, token: u64) -> Option<T> {
        self.entries().remove(&token)
    }

    pub fn contains(&self, token: u64) -> bool {
        self.entries().contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
