//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for Poet Anchor. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use poet_anchor_core::{
    decode_block, decode_claim, encode_claim, Block, BlockId, BlockStatus, ChainAnchorRecord,
    ChainBlockHash, Claim, ClaimId, TransactionHash,
};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
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

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn blob_to<T: From<[u8; 32]>>(bytes: Vec<u8>, column: usize) -> rusqlite::Result<T> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(column, "expected 32 bytes".into(), rusqlite::types::Type::Blob)
    })?;
    Ok(T::from(arr))
}

fn status_from_text(text: String, column: usize) -> rusqlite::Result<BlockStatus> {
    text.parse().map_err(|_| {
        rusqlite::Error::InvalidColumnType(column, format!("unknown status {text}"), rusqlite::types::Type::Text)
    })
}

// Columns: block_id, transaction_hash, chain_block_hash, chain_block_height, timestamp, retracted
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChainAnchorRecord> {
    let chain_block_hash: Option<Vec<u8>> = row.get(2)?;
    let chain_block_height: Option<i64> = row.get(3)?;
    Ok(ChainAnchorRecord {
        block_id: blob_to::<BlockId>(row.get(0)?, 0)?,
        transaction_hash: blob_to::<TransactionHash>(row.get(1)?, 1)?,
        chain_block_hash: chain_block_hash
            .map(|b| blob_to::<ChainBlockHash>(b, 2))
            .transpose()?,
        chain_block_height: chain_block_height.map(|h| h as u64),
        timestamp: row.get(4)?,
        retracted: row.get(5)?,
    })
}

const RECORD_COLUMNS: &str =
    "block_id, transaction_hash, chain_block_hash, chain_block_height, timestamp, retracted";

fn write_record(conn: &Connection, record: &ChainAnchorRecord) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO anchor_records (
            block_id, transaction_hash, chain_block_hash, chain_block_height, timestamp, retracted
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.block_id.as_bytes().as_slice(),
            record.transaction_hash.as_bytes().as_slice(),
            record.chain_block_hash.as_ref().map(|h| h.as_bytes().to_vec()),
            record.chain_block_height.map(|h| h as i64),
            record.timestamp,
            record.retracted,
        ],
    )?;
    Ok(())
}

fn block_exists(conn: &Connection, id: &BlockId) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM blocks WHERE block_id = ?1)",
        params![id.as_bytes().as_slice()],
        |row| row.get(0),
    )?)
}

#[async_trait]
impl Store for SqliteStore {
    async fn get_claim(&self, id: &ClaimId) -> Result<Option<Claim>> {
        let id = *id;
        self.blocking(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT canonical_bytes FROM claims WHERE claim_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            bytes
                .map(|b| decode_claim(&b).map_err(|e| StoreError::InvalidData(e.to_string())))
                .transpose()
        })
        .await
    }

    async fn get_block(&self, id: &BlockId) -> Result<Option<Block>> {
        let id = *id;
        self.blocking(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT canonical_bytes FROM blocks WHERE block_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            bytes
                .map(|b| decode_block(&b).map_err(|e| StoreError::InvalidData(e.to_string())))
                .transpose()
        })
        .await
    }

    async fn get_block_status(&self, id: &BlockId) -> Result<Option<BlockStatus>> {
        let id = *id;
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT status FROM blocks WHERE block_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| status_from_text(row.get(0)?, 0),
                )
                .optional()?)
        })
        .await
    }

    async fn save_block_seen(&self, block: &Block, canonical: &[u8]) -> Result<InsertResult> {
        let block = block.clone();
        let canonical = canonical.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            if block_exists(&tx, &block.id)? {
                return Ok(InsertResult::AlreadyExists);
            }

            let now = now_millis();
            tx.execute(
                "INSERT INTO blocks (block_id, canonical_bytes, status, seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![
                    block.id.as_bytes().as_slice(),
                    canonical.as_slice(),
                    BlockStatus::Seen.as_str(),
                    now,
                ],
            )?;

            for (position, claim) in block.claims.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO claims (
                        claim_id, block_id, position, claim_type, public_key, canonical_bytes
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        claim.id.as_bytes().as_slice(),
                        block.id.as_bytes().as_slice(),
                        position as i64,
                        claim.claim_type,
                        claim.public_key.as_bytes().as_slice(),
                        encode_claim(claim),
                    ],
                )?;
            }

            tx.commit()?;
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn set_block_status(&self, id: &BlockId, status: BlockStatus) -> Result<()> {
        let id = *id;
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE blocks SET status = ?2, updated_at = ?3 WHERE block_id = ?1",
                params![id.as_bytes().as_slice(), status.as_str(), now_millis()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("block {}", id.to_hex())));
            }
            Ok(())
        })
        .await
    }

    async fn find_by_status(&self, status: BlockStatus) -> Result<Vec<BlockId>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT block_id FROM blocks WHERE status = ?1 ORDER BY seen_at, block_id",
            )?;
            let ids = stmt
                .query_map(params![status.as_str()], |row| blob_to::<BlockId>(row.get(0)?, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn get_anchor_record(&self, block_id: &BlockId) -> Result<Option<ChainAnchorRecord>> {
        let block_id = *block_id;
        self.blocking(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {RECORD_COLUMNS} FROM anchor_records WHERE block_id = ?1"),
                    params![block_id.as_bytes().as_slice()],
                    row_to_record,
                )
                .optional()?)
        })
        .await
    }

    async fn save_anchor_record(&self, record: &ChainAnchorRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |conn| write_record(conn, &record)).await
    }

    async fn pending_anchor_records(&self) -> Result<Vec<ChainAnchorRecord>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM anchor_records
                 WHERE timestamp IS NULL AND retracted = 0
                 ORDER BY block_id"
            ))?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn confirm_block(&self, record: &ChainAnchorRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            if !block_exists(&tx, &record.block_id)? {
                return Err(StoreError::NotFound(format!("block {}", record.block_id.to_hex())));
            }

            write_record(&tx, &record)?;
            tx.execute(
                "UPDATE blocks SET status = ?2, updated_at = ?3 WHERE block_id = ?1",
                params![
                    record.block_id.as_bytes().as_slice(),
                    BlockStatus::Confirmed.as_str(),
                    now_millis(),
                ],
            )?;

            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn retract_block(&self, block_id: &BlockId) -> Result<bool> {
        let block_id = *block_id;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE anchor_records SET retracted = 1 WHERE block_id = ?1 AND retracted = 0",
                params![block_id.as_bytes().as_slice()],
            )?;
            if changed == 0 {
                return Ok(false);
            }

            tx.execute(
                "UPDATE blocks SET status = ?2, updated_at = ?3 WHERE block_id = ?1 AND status = ?4",
                params![
                    block_id.as_bytes().as_slice(),
                    BlockStatus::Seen.as_str(),
                    now_millis(),
                    BlockStatus::Confirmed.as_str(),
                ],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn get_last_processed_height(&self) -> Result<Option<u64>> {
        self.blocking(move |conn| {
            let height: Option<i64> = conn
                .query_row(
                    "SELECT last_processed_height FROM sync_checkpoint WHERE id = 0",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(height.map(|h| h as u64))
        })
        .await
    }

    async fn set_last_processed_height(&self, height: u64) -> Result<u64> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO sync_checkpoint (id, last_processed_height, updated_at)
                 VALUES (0, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    last_processed_height = MAX(last_processed_height, excluded.last_processed_height),
                    updated_at = excluded.updated_at",
                params![height as i64, now_millis()],
            )?;
            let stored: i64 = conn.query_row(
                "SELECT last_processed_height FROM sync_checkpoint WHERE id = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(stored as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poet_anchor_core::{encode_block, ClaimBuilder, Keypair};

    fn make_test_block(tag: &str) -> Block {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        Block::new(vec![
            ClaimBuilder::new("Work").attribute("name", tag).sign(&keypair),
            ClaimBuilder::new("Work").attribute("name", format!("{tag}-2")).sign(&keypair),
        ])
    }

    fn confirmed_record(block_id: BlockId, height: u64) -> ChainAnchorRecord {
        ChainAnchorRecord {
            block_id,
            transaction_hash: TransactionHash::from_bytes([0x11; 32]),
            chain_block_hash: Some(ChainBlockHash::from_bytes([0x22; 32])),
            chain_block_height: Some(height),
            timestamp: Some(1_500_000_000),
            retracted: false,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_block() {
        let store = SqliteStore::open_memory().unwrap();
        let block = make_test_block("a");

        let result = store.save_block_seen(&block, &encode_block(&block)).await.unwrap();
        assert_eq!(result, InsertResult::Inserted);

        assert_eq!(store.get_block(&block.id).await.unwrap(), Some(block.clone()));
        assert_eq!(store.get_block_status(&block.id).await.unwrap(), Some(BlockStatus::Seen));

        let claim = &block.claims[1];
        assert_eq!(store.get_claim(&claim.id).await.unwrap().as_ref(), Some(claim));
    }

    #[tokio::test]
    async fn test_idempotent_save() {
        let store = SqliteStore::open_memory().unwrap();
        let block = make_test_block("a");
        let canonical = encode_block(&block);

        store.save_block_seen(&block, &canonical).await.unwrap();
        store.set_block_status(&block.id, BlockStatus::Confirmed).await.unwrap();

        let again = store.save_block_seen(&block, &canonical).await.unwrap();
        assert_eq!(again, InsertResult::AlreadyExists);
        assert_eq!(store.get_block_status(&block.id).await.unwrap(), Some(BlockStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_unknown_block_is_unseen() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.get_block_status(&BlockId::ZERO).await.unwrap(), None);
        assert!(matches!(
            store.set_block_status(&BlockId::ZERO, BlockStatus::Seen).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_and_retract() {
        let store = SqliteStore::open_memory().unwrap();
        let block = make_test_block("a");
        store.save_block_seen(&block, &encode_block(&block)).await.unwrap();

        store.confirm_block(&confirmed_record(block.id, 10)).await.unwrap();
        assert_eq!(store.get_block_status(&block.id).await.unwrap(), Some(BlockStatus::Confirmed));
        assert_eq!(store.find_by_status(BlockStatus::Confirmed).await.unwrap(), vec![block.id]);

        assert!(store.retract_block(&block.id).await.unwrap());
        assert!(!store.retract_block(&block.id).await.unwrap());

        let record = store.get_anchor_record(&block.id).await.unwrap().unwrap();
        assert!(record.retracted);
        assert_eq!(store.get_block_status(&block.id).await.unwrap(), Some(BlockStatus::Seen));
    }

    #[tokio::test]
    async fn test_confirm_unknown_block_fails() {
        let store = SqliteStore::open_memory().unwrap();
        let record = confirmed_record(BlockId::from_bytes([7; 32]), 3);
        assert!(matches!(store.confirm_block(&record).await, Err(StoreError::NotFound(_))));
        assert_eq!(store.get_anchor_record(&record.block_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_anchor_records() {
        let store = SqliteStore::open_memory().unwrap();
        let pending = ChainAnchorRecord::pending(BlockId::from_bytes([1; 32]), TransactionHash::from_bytes([2; 32]));
        store.save_anchor_record(&pending).await.unwrap();
        store
            .save_anchor_record(&confirmed_record(BlockId::from_bytes([3; 32]), 5))
            .await
            .unwrap();

        assert_eq!(store.pending_anchor_records().await.unwrap(), vec![pending]);
    }

    #[tokio::test]
    async fn test_checkpoint_is_monotonic() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(store.get_last_processed_height().await.unwrap(), None);

        assert_eq!(store.set_last_processed_height(100).await.unwrap(), 100);
        assert_eq!(store.set_last_processed_height(90).await.unwrap(), 100);
        assert_eq!(store.set_last_processed_height(101).await.unwrap(), 101);
        assert_eq!(store.get_last_processed_height().await.unwrap(), Some(101));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anchor.db");
        let block = make_test_block("durable");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_block_seen(&block, &encode_block(&block)).await.unwrap();
            store.confirm_block(&confirmed_record(block.id, 42)).await.unwrap();
            store.set_last_processed_height(42).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get_block_status(&block.id).await.unwrap(), Some(BlockStatus::Confirmed));
        assert_eq!(store.get_last_processed_height().await.unwrap(), Some(42));
        assert_eq!(
            store.get_anchor_record(&block.id).await.unwrap().unwrap().chain_block_height,
            Some(42)
        );
    }
}
