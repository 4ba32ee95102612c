//! Session-scoped cache of unwrapped record keys.
//!
//! Unwrapping goes through the signing agent, which may prompt the user, so
//! a session keeps the keys it has already recovered. The cache is owned by
//! the caller and shared by `Arc`; it is never persisted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use medvault_core::{SymmetricKey, WalletAddress};

type SessionEndHook = Arc<dyn Fn() + Send + Sync>;

/// Keys recovered during the current session, keyed by record subject.
#[derive(Default)]
pub struct SessionKeyCache {
    keys: RwLock<HashMap<WalletAddress, SymmetricKey>>,
    hooks: Mutex<Vec<SessionEndHook>>,
}

impl SessionKeyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached key for `subject`'s record.
    pub fn get(&self, subject: &WalletAddress) -> Option<SymmetricKey> {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject)
            .cloned()
    }

    /// Cache `key` for `subject`, replacing any previous entry.
    pub fn put(&self, subject: WalletAddress, key: SymmetricKey) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject, key);
    }

    /// Drop `subject`'s entry. Returns true if one existed.
    pub fn invalidate(&self, subject: &WalletAddress) -> bool {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(subject)
            .is_some()
    }

    /// Drop `subject`'s entry only if it is still `stale`.
    ///
    /// A concurrent reader may already have replaced it with a fresh key.
    pub fn invalidate_if(&self, subject: &WalletAddress, stale: &SymmetricKey) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.get(subject) == Some(stale) {
            keys.remove(subject);
            true
        } else {
            false
        }
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a callback to run whenever the session ends.
    pub fn on_session_end<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// End the session: forget every key, then run the session-end hooks.
    ///
    /// Hooks stay registered for later sessions. The hooks run on a snapshot
    /// of the list, so a hook may register further hooks; those first run at
    /// the next session end.
    pub fn end_session(&self) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        let hooks = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in &hooks {
            hook();
        }
    }
}

impl std::fmt::Debug for SessionKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyCache")
            .field("entries", &self.len())
            .finish()
    }
}
