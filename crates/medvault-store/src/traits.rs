//! Collaborator traits: content storage, the pointer registry, and the
//! administrator directory.
//!
//! The vault is generic over these so it can run against in-memory maps in
//! tests, SQLite on a workstation, or adapters for a pinning service and an
//! on-chain registry contract.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use medvault_core::{ContentId, WalletAddress};

use crate::error::Result;

/// Confirmation that a pointer update was recorded.
///
/// Stands in for a transaction receipt: `sequence` increases by one for every
/// accepted update across all subjects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerReceipt {
    /// The subject whose pointer changed.
    pub subject: WalletAddress,
    /// The new pointer value.
    pub content_id: ContentId,
    /// Registry-wide sequence number of this update.
    pub sequence: u64,
    /// When the update was recorded (Unix ms).
    pub recorded_at: i64,
}

/// Content-addressed, immutable blob storage.
///
/// # Design Notes
///
/// - **Immutable**: the bytes behind an identifier never change; envelopes are
///   superseded, never rewritten.
/// - **Idempotent puts**: storing the same bytes twice yields the same identifier.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` and return their identifier.
    ///
    /// `name_hint` is a human-readable label some providers record alongside
    /// the content; it does not affect the identifier.
    async fn put(&self, bytes: Bytes, name_hint: &str) -> Result<ContentId>;

    /// Fetch the bytes behind `id`. Fails with `NotFound` if absent.
    async fn get(&self, id: &ContentId) -> Result<Bytes>;
}

/// Last-writer-wins mapping from subject to the current envelope location.
#[async_trait]
pub trait PointerRegistry: Send + Sync {
    /// The current pointer for `subject`, if one was ever set.
    async fn get_pointer(&self, subject: &WalletAddress) -> Result<Option<ContentId>>;

    /// Point `subject` at `content_id`, returning the confirmation.
    async fn set_pointer(
        &self,
        subject: &WalletAddress,
        content_id: &ContentId,
    ) -> Result<PointerReceipt>;

    /// Every subject that has a pointer, in address order.
    async fn list_subjects(&self) -> Result<Vec<WalletAddress>>;
}

/// Source of the administrators included in every new record's recipients.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// The currently authorized administrator identities.
    async fn list_authorized_administrators(&self) -> Result<BTreeSet<WalletAddress>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared handles
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl<T: ContentStore + ?Sized> ContentStore for Arc<T> {
    async fn put(&self, bytes: Bytes, name_hint: &str) -> Result<ContentId> {
        (**self).put(bytes, name_hint).await
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        (**self).get(id).await
    }
}

#[async_trait]
impl<T: PointerRegistry + ?Sized> PointerRegistry for Arc<T> {
    async fn get_pointer(&self, subject: &WalletAddress) -> Result<Option<ContentId>> {
        (**self).get_pointer(subject).await
    }

    async fn set_pointer(
        &self,
        subject: &WalletAddress,
        content_id: &ContentId,
    ) -> Result<PointerReceipt> {
        (**self).set_pointer(subject, content_id).await
    }

    async fn list_subjects(&self) -> Result<Vec<WalletAddress>> {
        (**self).list_subjects().await
    }
}

#[async_trait]
impl<T: AdminDirectory + ?Sized> AdminDirectory for Arc<T> {
    async fn list_authorized_administrators(&self) -> Result<BTreeSet<WalletAddress>> {
        (**self).list_authorized_administrators().await
    }
}
