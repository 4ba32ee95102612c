//! SQLite implementation of the collaborator traits.
//!
//! One database file holds content, pointers and administrators, so a
//! workstation deployment needs no external services. Uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use medvault_core::{ContentId, WalletAddress};

use crate::cid::{content_id_for, matches_content};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::now_millis;
use crate::traits::{AdminDirectory, ContentStore, PointerReceipt, PointerRegistry};

/// SQLite-backed content store, pointer registry and administrator directory.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Authorize an administrator. Returns false if already present.
    pub async fn add_administrator(&self, admin: &WalletAddress) -> Result<bool> {
        let admin = *admin;
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO administrators (address, added_at) VALUES (?1, ?2)",
                params![admin.as_bytes().as_slice(), now_millis()],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    /// Withdraw an administrator. Returns false if absent.
    pub async fn remove_administrator(&self, admin: &WalletAddress) -> Result<bool> {
        let admin = *admin;
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM administrators WHERE address = ?1",
                params![admin.as_bytes().as_slice()],
            )?;
            Ok(removed == 1)
        })
        .await
    }

    /// Every accepted pointer update for `subject`, oldest first.
    pub async fn pointer_history(&self, subject: &WalletAddress) -> Result<Vec<PointerReceipt>> {
        let subject = *subject;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sequence, cid, recorded_at FROM pointer_history
                 WHERE subject = ?1 ORDER BY sequence ASC",
            )?;
            let rows = stmt.query_map(params![subject.as_bytes().as_slice()], |row| {
                Ok(PointerReceipt {
                    subject,
                    content_id: ContentId::new(row.get::<_, String>(1)?),
                    sequence: row.get::<_, i64>(0)? as u64,
                    recorded_at: row.get(2)?,
                })
            })?;
            let history = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(history)
        })
        .await
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {e}")),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {e}")))?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn address_from_blob(bytes: Vec<u8>) -> Result<WalletAddress> {
    let arr: [u8; 20] = bytes.as_slice().try_into().map_err(|_| {
        StoreError::InvalidData(format!("address column has {} bytes", bytes.len()))
    })?;
    Ok(WalletAddress::from_bytes(arr))
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn put(&self, bytes: Bytes, name_hint: &str) -> Result<ContentId> {
        let name_hint = name_hint.to_string();

        self.run(move |conn| {
            let id = content_id_for(&bytes);
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO blobs (cid, name_hint, data, stored_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), name_hint, bytes.as_ref(), now_millis()],
            )?;
            debug!(cid = %id, size = bytes.len(), new = inserted == 1, "stored blob");
            Ok(id)
        })
        .await
    }

    async fn get(&self, id: &ContentId) -> Result<Bytes> {
        let id = id.clone();

        self.run(move |conn| {
            let data: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT data FROM blobs WHERE cid = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            let data = data.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if !matches_content(&id, &data) {
                return Err(StoreError::InvalidData(format!(
                    "content under {id} does not match its identifier"
                )));
            }
            Ok(Bytes::from(data))
        })
        .await
    }
}

#[async_trait]
impl PointerRegistry for SqliteStore {
    async fn get_pointer(&self, subject: &WalletAddress) -> Result<Option<ContentId>> {
        let subject = *subject;

        self.run(move |conn| {
            let cid: Option<String> = conn
                .query_row(
                    "SELECT cid FROM pointers WHERE subject = ?1",
                    params![subject.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(cid.map(ContentId::new))
        })
        .await
    }

    async fn set_pointer(
        &self,
        subject: &WalletAddress,
        content_id: &ContentId,
    ) -> Result<PointerReceipt> {
        let subject = *subject;
        let content_id = content_id.clone();

        self.run(move |conn| {
            let now = now_millis();
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO pointer_history (subject, cid, recorded_at) VALUES (?1, ?2, ?3)",
                params![subject.as_bytes().as_slice(), content_id.as_str(), now],
            )?;
            let sequence = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO pointers (subject, cid, sequence, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(subject) DO UPDATE SET
                    cid = excluded.cid,
                    sequence = excluded.sequence,
                    updated_at = excluded.updated_at",
                params![subject.as_bytes().as_slice(), content_id.as_str(), sequence, now],
            )?;
            tx.commit()?;

            debug!(subject = %subject, cid = %content_id, sequence, "pointer updated");
            Ok(PointerReceipt {
                subject,
                content_id,
                sequence: sequence as u64,
                recorded_at: now,
            })
        })
        .await
    }

    async fn list_subjects(&self) -> Result<Vec<WalletAddress>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT subject FROM pointers ORDER BY subject ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

            let mut subjects = Vec::new();
            for row in rows {
                subjects.push(address_from_blob(row?)?);
            }
            Ok(subjects)
        })
        .await
    }
}

#[async_trait]
impl AdminDirectory for SqliteStore {
    async fn list_authorized_administrators(&self) -> Result<BTreeSet<WalletAddress>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT address FROM administrators")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

            let mut admins = BTreeSet::new();
            for row in rows {
                admins.insert(address_from_blob(row?)?);
            }
            Ok(admins)
        })
        .await
    }
}
