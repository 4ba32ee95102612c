//! Versioned schema for the SQLite backend.
//!
//! `schema_migrations` records every applied version; opening a database
//! applies whatever is missing in one transaction and refuses a schema newer
//! than this build understands.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::now_millis;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// v1: blobs, pointers with their history, administrators.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Immutable content, addressed by CID
        CREATE TABLE blobs (
            cid TEXT PRIMARY KEY,
            name_hint TEXT NOT NULL,
            data BLOB NOT NULL,
            stored_at INTEGER NOT NULL       -- Unix ms
        );

        -- Current pointer per subject
        CREATE TABLE pointers (
            subject BLOB PRIMARY KEY,        -- 20-byte wallet address
            cid TEXT NOT NULL,
            sequence INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Every accepted pointer update; rowid is the registry sequence
        CREATE TABLE pointer_history (
            sequence INTEGER PRIMARY KEY AUTOINCREMENT,
            subject BLOB NOT NULL,
            cid TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        );

        -- Administrators added to every new record
        CREATE TABLE administrators (
            address BLOB PRIMARY KEY,
            added_at INTEGER NOT NULL
        );

        CREATE INDEX idx_pointer_history_subject ON pointer_history(subject);
        "#,
    )?;

    Ok(())
}
