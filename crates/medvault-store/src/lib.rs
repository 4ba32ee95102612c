//! # medvault store
//!
//! The external collaborators of the record vault, behind traits, with
//! in-memory and SQLite implementations.
//!
//! ## Key Types
//!
//! - [`ContentStore`] - immutable content-addressed blob storage
//! - [`PointerRegistry`] - the per-subject pointer to the latest envelope
//! - [`AdminDirectory`] - administrators added to every new record
//! - [`SqliteStore`] - all three, persisted in one SQLite file
//! - [`MemoryContentStore`], [`MemoryRegistry`], [`StaticAdminDirectory`] - for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use medvault_core::WalletAddress;
//! use medvault_store::{ContentStore, PointerRegistry, SqliteStore};
//!
//! async fn example() -> medvault_store::Result<()> {
//!     let store = SqliteStore::open("medvault.db")?;
//!
//!     let subject = WalletAddress::from_bytes([1; 20]);
//!     let cid = store.put(Bytes::from_static(b"{}"), "0x01.json").await?;
//!     let receipt = store.set_pointer(&subject, &cid).await?;
//!     assert_eq!(receipt.content_id, cid);
//!     Ok(())
//! }
//! ```

pub mod cid;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use cid::{content_id_for, matches_content};
pub use error::{Result, StoreError};
pub use memory::{MemoryContentStore, MemoryRegistry, StaticAdminDirectory};
pub use sqlite::SqliteStore;
pub use traits::{AdminDirectory, ContentStore, PointerReceipt, PointerRegistry};

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
