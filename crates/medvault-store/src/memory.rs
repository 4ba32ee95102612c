//! In-memory implementations of the collaborator traits.
//!
//! These are primarily for testing. They have the same semantics as the
//! SQLite backend but keep everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use medvault_core::{ContentId, WalletAddress};

use crate::cid::content_id_for;
use crate::error::{Result, StoreError};
use crate::now_millis;
use crate::traits::{AdminDirectory, ContentStore, PointerReceipt, PointerRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Content store
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory content-addressed store.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<ContentId, StoredBlob>>,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Bytes,
    name_hint: String,
}

impl MemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `id` is stored.
    pub fn contains(&self, id: &ContentId) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// The name hint recorded with `id`.
    pub fn name_hint(&self, id: &ContentId) -> Option<String> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|b| b.name_hint.clone())
    }

    /// Store bytes under an arbitrary identifier, bypassing content
    /// addressing. Used to simulate a provider serving corrupted content.
    pub fn insert_unchecked(&self, id: ContentId, bytes: Bytes) {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                StoredBlob {
                    bytes,
                    name_hint: String::new(),
                },
            );
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, bytes: Bytes, name_hint: &str) -> Result<ContentId> {
        let id = content_id_for(&bytes);
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert_with(|| StoredBlob {
                bytes,
                name_hint: name_hint.to_string(),
            });
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pointer registry
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory pointer registry with a full update history.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    pointers: BTreeMap<WalletAddress, ContentId>,
    history: Vec<PointerReceipt>,
}

impl MemoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every accepted update for `subject`, oldest first.
    pub fn history(&self, subject: &WalletAddress) -> Vec<PointerReceipt> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .iter()
            .filter(|r| r.subject == *subject)
            .cloned()
            .collect()
    }

    /// Total number of accepted updates.
    pub fn update_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .history
            .len()
    }
}

#[async_trait]
impl PointerRegistry for MemoryRegistry {
    async fn get_pointer(&self, subject: &WalletAddress) -> Result<Option<ContentId>> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pointers
            .get(subject)
            .cloned())
    }

    async fn set_pointer(
        &self,
        subject: &WalletAddress,
        content_id: &ContentId,
    ) -> Result<PointerReceipt> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let receipt = PointerReceipt {
            subject: *subject,
            content_id: content_id.clone(),
            sequence: inner.history.len() as u64 + 1,
            recorded_at: now_millis(),
        };
        inner.pointers.insert(*subject, content_id.clone());
        inner.history.push(receipt.clone());
        Ok(receipt)
    }

    async fn list_subjects(&self) -> Result<Vec<WalletAddress>> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pointers
            .keys()
            .copied()
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Administrator directory
// ─────────────────────────────────────────────────────────────────────────────

/// A fixed, editable set of administrators.
#[derive(Debug, Default)]
pub struct StaticAdminDirectory {
    admins: RwLock<BTreeSet<WalletAddress>>,
}

impl StaticAdminDirectory {
    /// Create a directory listing `admins`.
    pub fn new(admins: impl IntoIterator<Item = WalletAddress>) -> Self {
        Self {
            admins: RwLock::new(admins.into_iter().collect()),
        }
    }

    /// Authorize another administrator.
    pub fn add(&self, admin: WalletAddress) -> bool {
        self.admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(admin)
    }

    /// Withdraw an administrator. Existing records keep their entries.
    pub fn remove(&self, admin: &WalletAddress) -> bool {
        self.admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(admin)
    }
}

#[async_trait]
impl AdminDirectory for StaticAdminDirectory {
    async fn list_authorized_administrators(&self) -> Result<BTreeSet<WalletAddress>> {
        Ok(self
            .admins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
