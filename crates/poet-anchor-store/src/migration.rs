//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
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
            "database schema version {} is newer than supported {}",
            current, CURRENT_VERSION
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
            tracing::debug!(version, "applied store migration");
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
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Blocks and their processing status
        CREATE TABLE blocks (
            block_id BLOB PRIMARY KEY,        -- 32 bytes, content hash
            canonical_bytes BLOB NOT NULL,    -- canonical CBOR encoding
            status TEXT NOT NULL,             -- seen | retry_pending | confirmed
            seen_at INTEGER NOT NULL,         -- local time of first sighting (Unix ms)
            updated_at INTEGER NOT NULL
        );

        -- Claims, keyed by content hash; a claim keeps the block it arrived in
        CREATE TABLE claims (
            claim_id BLOB PRIMARY KEY,        -- 32 bytes
            block_id BLOB NOT NULL,
            position INTEGER NOT NULL,        -- index inside the block
            claim_type TEXT NOT NULL,
            public_key BLOB NOT NULL,         -- 32 bytes, Ed25519
            canonical_bytes BLOB NOT NULL
        );

        -- One anchor record per block
        CREATE TABLE anchor_records (
            block_id BLOB PRIMARY KEY,
            transaction_hash BLOB NOT NULL,
            chain_block_hash BLOB,            -- null until mined
            chain_block_height INTEGER,       -- null until mined
            timestamp INTEGER,                -- null until confirmed
            retracted INTEGER NOT NULL DEFAULT 0
        );

        -- Single-row checkpoint
        CREATE TABLE sync_checkpoint (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            last_processed_height INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX idx_blocks_status ON blocks(status);
        CREATE INDEX idx_claims_block ON claims(block_id);
        CREATE INDEX idx_claims_type ON claims(claim_type);
        CREATE INDEX idx_anchor_records_pending ON anchor_records(timestamp, retracted);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
