//! Per-subject mutation locks.
//!
//! Every read-modify-publish cycle holds its subject's lock from fetch to
//! pointer update. Different subjects proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use medvault_core::WalletAddress;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table of async mutexes, one per subject.
#[derive(Debug, Default)]
pub struct SubjectLocks {
    table: Mutex<HashMap<WalletAddress, Arc<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `subject`.
    ///
    /// The guard releases the lock when dropped, including when the holding
    /// future is cancelled.
    pub async fn lock(&self, subject: &WalletAddress) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on can go.
            table.retain(|_, m| Arc::strong_count(m) > 1);
            table.entry(*subject).or_default().clone()
        };
        mutex.lock_owned().await
    }

    /// Number of subjects with a live lock entry.
    pub fn active(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|m| Arc::strong_count(m) > 1)
            .count()
    }
}
