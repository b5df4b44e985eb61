//! Durable implementation of the Queue trait on SQLite.
//!
//! Events are stored CBOR-encoded. Items left in flight by a previous process
//! are reset to ready when the queue is opened, keeping their position.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Notify;

use poet_anchor_core::{QueueEvent, Topic};

use crate::error::{QueueError, Result};
use crate::traits::{Delivery, DeliveryId, Queue, QueueConfig};

const READY: &str = "ready";
const IN_FLIGHT: &str = "in_flight";
const DEAD: &str = "dead";

/// SQLite-backed queue.
pub struct SqliteQueue {
    conn: Arc<Mutex<Connection>>,
    wakers: HashMap<Topic, Notify>,
    closed: AtomicBool,
    config: QueueConfig,
}

impl SqliteQueue {
    /// Open (or create) a queue database at the given path.
    pub fn open(path: impl AsRef<Path>, config: QueueConfig) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, config)
    }

    /// Open an in-memory queue database. Useful for testing.
    pub fn open_memory(config: QueueConfig) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, config)
    }

    fn from_connection(conn: Connection, config: QueueConfig) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                position INTEGER NOT NULL,      -- FIFO order; nack moves below the minimum
                state TEXT NOT NULL,            -- ready | in_flight | dead
                deliveries INTEGER NOT NULL DEFAULT 0,
                event BLOB NOT NULL,            -- CBOR-encoded QueueEvent
                enqueued_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_queue_items_topic
                ON queue_items(topic, state, position);
            "#,
        )?;

        let recovered = conn.execute(
            "UPDATE queue_items SET state = ?1 WHERE state = ?2",
            params![READY, IN_FLIGHT],
        )?;
        if recovered > 0 {
            tracing::info!(recovered, "requeued items left in flight");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            wakers: Topic::ALL.into_iter().map(|t| (t, Notify::new())).collect(),
            closed: AtomicBool::new(false),
            config,
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
                .map_err(|e| QueueError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| QueueError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }

    fn wake(&self, topic: Topic) {
        if let Some(notify) = self.wakers.get(&topic) {
            notify.notify_one();
        }
    }

    async fn try_take(&self, topic: Topic) -> Result<Option<Delivery>> {
        self.blocking(move |conn| loop {
            let tx = conn.transaction()?;
            let row: Option<(i64, Vec<u8>, u32)> = tx
                .query_row(
                    "SELECT id, event, deliveries FROM queue_items
                     WHERE topic = ?1 AND state = ?2
                     ORDER BY position LIMIT 1",
                    params![topic.as_str(), READY],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let Some((id, bytes, deliveries)) = row else {
                return Ok(None);
            };

            match QueueEvent::from_cbor(&bytes) {
                Ok(event) => {
                    tx.execute(
                        "UPDATE queue_items SET state = ?2, deliveries = deliveries + 1 WHERE id = ?1",
                        params![id, IN_FLIGHT],
                    )?;
                    tx.commit()?;
                    return Ok(Some(Delivery {
                        id: id as DeliveryId,
                        topic,
                        event,
                        deliveries: deliveries + 1,
                    }));
                }
                Err(e) => {
                    tracing::error!(id, %topic, error = %e, "stored event does not decode, parking it");
                    tx.execute(
                        "UPDATE queue_items SET state = ?2 WHERE id = ?1",
                        params![id, DEAD],
                    )?;
                    tx.commit()?;
                }
            }
        })
        .await
    }
}

#[async_trait]
impl Queue for SqliteQueue {
    async fn dispatch_work(&self, event: QueueEvent) -> Result<DeliveryId> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Unavailable("queue closed".into()));
        }
        let topic = event.topic();
        let bytes = event.to_cbor()?;
        let capacity = self.config.capacity as i64;

        let id = self
            .blocking(move |conn| {
                let tx = conn.transaction()?;
                let held: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM queue_items WHERE state != ?1",
                    params![DEAD],
                    |row| row.get(0),
                )?;
                if held >= capacity {
                    return Err(QueueError::Unavailable(format!("queue full ({} items)", capacity)));
                }
                tx.execute(
                    "INSERT INTO queue_items (topic, position, state, event, enqueued_at)
                     VALUES (?1, COALESCE((SELECT MAX(position) FROM queue_items), 0) + 1, ?2, ?3, ?4)",
                    params![topic.as_str(), READY, bytes, now_millis()],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok(id as DeliveryId)
            })
            .await
            .map_err(|e| match e {
                QueueError::Database(db) => QueueError::Unavailable(db.to_string()),
                other => other,
            })?;

        self.wake(topic);
        tracing::trace!(%topic, id, "dispatched");
        Ok(id)
    }

    async fn next(&self, topic: Topic) -> Result<Delivery> {
        let notify = self
            .wakers
            .get(&topic)
            .ok_or_else(|| QueueError::Unavailable(format!("no waker for {topic}")))?;

        loop {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return Err(QueueError::Closed);
            }
            if let Some(delivery) = self.try_take(topic).await? {
                return Ok(delivery);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    async fn ack(&self, id: DeliveryId) -> Result<()> {
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM queue_items WHERE id = ?1 AND state = ?2",
                params![id as i64, IN_FLIGHT],
            )?;
            if removed == 0 {
                return Err(QueueError::UnknownDelivery(id));
            }
            Ok(())
        })
        .await
    }

    async fn nack(&self, id: DeliveryId) -> Result<()> {
        let topic = self
            .blocking(move |conn| {
                let tx = conn.transaction()?;
                let topic: Option<String> = tx
                    .query_row(
                        "SELECT topic FROM queue_items WHERE id = ?1 AND state = ?2",
                        params![id as i64, IN_FLIGHT],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(topic) = topic else {
                    return Err(QueueError::UnknownDelivery(id));
                };
                tx.execute(
                    "UPDATE queue_items
                     SET state = ?2,
                         position = (SELECT MIN(position) FROM queue_items WHERE topic = ?3) - 1
                     WHERE id = ?1",
                    params![id as i64, READY, topic],
                )?;
                tx.commit()?;
                Ok(topic.parse::<Topic>()?)
            })
            .await?;
        self.wake(topic);
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize> {
        let moved = self
            .blocking(|conn| {
                Ok(conn.execute(
                    "UPDATE queue_items SET state = ?1 WHERE state = ?2",
                    params![READY, IN_FLIGHT],
                )?)
            })
            .await?;
        for notify in self.wakers.values() {
            notify.notify_one();
        }
        Ok(moved)
    }

    async fn backlog(&self, topic: Topic) -> Result<usize> {
        self.blocking(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queue_items WHERE topic = ?1 AND state = ?2",
                params![topic.as_str(), READY],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for notify in self.wakers.values() {
            notify.notify_waiters();
        }
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
