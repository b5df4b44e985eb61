//! The block processor: the only writer of block confirmation state.
//!
//! Every handler takes one queue event, changes state under the block's lock
//! and, on failure, hands the work back to the queue with a bumped attempt
//! counter. Handlers only return `Err` when the work could not be handed back
//! (the queue itself failed); the caller must then keep the delivery.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use poet_anchor_core::{
    decode_block, validate_block, AnchorTransaction, Block, BlockId, BlockStatus,
    ChainAnchorRecord, ChainBlockHash, ChainStateSnapshot, QueueEvent, Topic,
};
use poet_anchor_queue::{ProgressAnnouncer, Queue};
use poet_anchor_store::{InsertResult, Store};

use crate::anchor::AnchorBuilder;
use crate::client::ChainClient;
use crate::error::{Result, SyncError};
use crate::locks::BlockLocks;
use crate::reorg::ReorgDelta;

/// Configuration for the block processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Redrives allowed for a permanently failing item before it is reported
    /// and dropped. Transient failures are redriven without limit.
    pub max_retry_attempts: u32,

    /// Address that funds anchor transactions and receives the change.
    pub anchor_address: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 5,
            anchor_address: String::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alerts
// ─────────────────────────────────────────────────────────────────────────────

/// Something an operator has to look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// A work item kept failing with a permanent error and was dropped.
    PermanentFailure {
        topic: Topic,
        attempts: u32,
        error: String,
    },

    /// Two consecutive chain snapshots share no ancestor within the window.
    ReorgTooDeep {
        window: usize,
        previous_tip: u64,
        current_tip: u64,
    },
}

/// Receives alerts.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

/// Logs alerts at `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: Alert) {
        match alert {
            Alert::PermanentFailure {
                topic,
                attempts,
                error,
            } => tracing::error!(%topic, attempts, %error, "work item abandoned"),
            Alert::ReorgTooDeep {
                window,
                previous_tip,
                current_tip,
            } => tracing::error!(window, previous_tip, current_tip, "reorg too deep, operator action needed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stats
// ─────────────────────────────────────────────────────────────────────────────

/// Processing counters.
#[derive(Debug, Default)]
pub struct ProcessorStats {
    seen: AtomicU64,
    confirmed: AtomicU64,
    duplicates: AtomicU64,
    retried: AtomicU64,
    retracted: AtomicU64,
    permanent_failures: AtomicU64,
}

/// A point-in-time copy of [`ProcessorStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub seen: u64,
    pub confirmed: u64,
    pub duplicates: u64,
    pub retried: u64,
    pub retracted: u64,
    pub permanent_failures: u64,
}

impl ProcessorStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            seen: self.seen.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            retracted: self.retracted.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// How a work item ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// State was changed, or there was nothing to change.
    Done,
    /// The item failed and a follow-up was queued.
    Redriven,
    /// The item failed permanently too often and was reported.
    Abandoned,
}

/// What happened to a single observed anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnchorOutcome {
    Confirmed,
    /// The block is not downloaded yet; the record waits for it.
    Recorded,
    Duplicate,
    Foreign,
    /// Mined in a chain block a reorg has dropped.
    Abandoned,
}

// ─────────────────────────────────────────────────────────────────────────────
// Processor
// ─────────────────────────────────────────────────────────────────────────────

/// Drives blocks through `Seen -> Confirmed`, with `RetryPending` on the side.
pub struct BlockProcessor<S: Store, Q: Queue, C: ChainClient> {
    store: Arc<S>,
    queue: Arc<Q>,
    anchors: AnchorBuilder<C>,
    progress: Arc<ProgressAnnouncer>,
    alerts: Arc<dyn AlertSink>,
    locks: BlockLocks,
    /// Chain blocks dropped by applied reorgs. Anchors mined there are never
    /// confirmed, whatever queue item carries them.
    abandoned: Mutex<HashSet<ChainBlockHash>>,
    stats: ProcessorStats,
    config: ProcessorConfig,
}

impl<S: Store, Q: Queue, C: ChainClient> BlockProcessor<S, Q, C> {
    pub fn new(
        store: Arc<S>,
        queue: Arc<Q>,
        client: Arc<C>,
        progress: Arc<ProgressAnnouncer>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            anchors: AnchorBuilder::new(client),
            progress,
            alerts: Arc::new(TracingAlertSink),
            locks: BlockLocks::new(),
            abandoned: Mutex::new(HashSet::new()),
            stats: ProcessorStats::default(),
            config,
        }
    }

    /// Replace the default tracing alert sink.
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<Q> {
        &self.queue
    }

    pub fn progress(&self) -> &Arc<ProgressAnnouncer> {
        &self.progress
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether a reorg applied by this processor dropped `hash`.
    pub fn is_abandoned(&self, hash: &ChainBlockHash) -> bool {
        self.lock_abandoned().contains(hash)
    }

    fn lock_abandoned(&self) -> MutexGuard<'_, HashSet<ChainBlockHash>> {
        self.abandoned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forward an alert raised outside the processor.
    pub fn report(&self, alert: Alert) {
        self.alerts.alert(alert);
    }

    /// Route a queue event to its handler.
    pub async fn handle(&self, event: QueueEvent) -> Result<Handled> {
        match event {
            QueueEvent::BlockDownloaded { raw, attempt } => self.on_block_downloaded(raw, attempt).await,
            QueueEvent::BlocksToSend { raw, attempt } => self.on_block_to_send(raw, attempt).await,
            QueueEvent::BlockRetry { raw, attempt } => self.on_block_retry(raw, attempt).await,
            QueueEvent::ChainBlockObserved { snapshot } => self.on_chain_block_observed(&snapshot).await,
            QueueEvent::ConfirmRetry { anchor, attempt } => self.on_confirm_retry(anchor, attempt).await,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Blocks
    // ─────────────────────────────────────────────────────────────────────────

    /// Decode, validate and persist a block fetched from a peer.
    pub async fn on_block_downloaded(&self, raw: Bytes, attempt: u32) -> Result<Handled> {
        match self.accept_block(&raw).await {
            Ok(_) => Ok(Handled::Done),
            Err(e) => {
                let next = QueueEvent::BlockRetry {
                    raw,
                    attempt: attempt + 1,
                };
                self.redrive(next, attempt + 1, e).await
            }
        }
    }

    /// Redrive of a block that failed before.
    pub async fn on_block_retry(&self, raw: Bytes, attempt: u32) -> Result<Handled> {
        tracing::debug!(attempt, "block retry");
        self.on_block_downloaded(raw, attempt).await
    }

    /// Persist a locally created block and anchor it on-chain.
    pub async fn on_block_to_send(&self, raw: Bytes, attempt: u32) -> Result<Handled> {
        match self.send_block(&raw).await {
            Ok(()) => Ok(Handled::Done),
            Err(e) => {
                let next = QueueEvent::BlocksToSend {
                    raw,
                    attempt: attempt + 1,
                };
                self.redrive(next, attempt + 1, e).await
            }
        }
    }

    async fn accept_block(&self, raw: &[u8]) -> Result<Block> {
        let block = decode_block(raw)?;
        validate_block(&block)?;

        let _guard = self.locks.lock(block.id).await;
        let inserted = self.store.save_block_seen(&block, raw).await?;
        if inserted == InsertResult::Inserted {
            ProcessorStats::bump(&self.stats.seen);
            tracing::info!(block_id = %block.id, claims = block.len(), "block seen");
        }

        // The anchor may have been mined before the block arrived.
        let confirmed = self.confirm_recorded_anchor(&block.id).await?;
        if inserted == InsertResult::AlreadyExists && !confirmed {
            ProcessorStats::bump(&self.stats.duplicates);
            tracing::debug!(block_id = %block.id, "block already known");
        }
        Ok(block)
    }

    /// Confirm a known, unconfirmed block whose record already carries a live
    /// timestamp. Caller holds the block lock.
    async fn confirm_recorded_anchor(&self, block_id: &BlockId) -> Result<bool> {
        let Some(record) = self.store.get_anchor_record(block_id).await? else {
            return Ok(false);
        };
        if !record.is_confirmed() {
            return Ok(false);
        }
        if self.store.get_block_status(block_id).await? == Some(BlockStatus::Confirmed) {
            return Ok(false);
        }
        self.store.confirm_block(&record).await?;
        ProcessorStats::bump(&self.stats.confirmed);
        tracing::info!(block_id = %block_id, height = ?record.chain_block_height, "block confirmed on arrival");
        Ok(true)
    }

    async fn send_block(&self, raw: &[u8]) -> Result<()> {
        let block = self.accept_block(raw).await?;

        let _guard = self.locks.lock(block.id).await;
        if let Some(record) = self.store.get_anchor_record(&block.id).await? {
            if !record.retracted {
                tracing::debug!(block_id = %block.id, tx = %record.transaction_hash, "block already anchored");
                return Ok(());
            }
        }

        let tx = self
            .anchors
            .anchor_block(&self.config.anchor_address, &block.id)
            .await?;
        self.store
            .save_anchor_record(&ChainAnchorRecord::pending(block.id, tx))
            .await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chain
    // ─────────────────────────────────────────────────────────────────────────

    /// Confirm every block anchored in `snapshot`, then advance the checkpoint
    /// and announce it.
    ///
    /// A failing anchor is redriven on its own and does not stop the pass.
    pub async fn on_chain_block_observed(&self, snapshot: &ChainStateSnapshot) -> Result<Handled> {
        let mut failed = 0usize;
        for anchor in &snapshot.anchors {
            if let Err(e) = self.confirm_anchor(anchor).await {
                failed += 1;
                self.fail_confirm(anchor, 1, e).await?;
            }
        }

        let height = self.store.set_last_processed_height(snapshot.height).await?;
        self.progress.bitcoin_block_processed(height);
        tracing::info!(height, anchors = snapshot.anchors.len(), failed, "chain block processed");
        Ok(Handled::Done)
    }

    /// Redrive of a single anchor whose confirmation failed before.
    pub async fn on_confirm_retry(&self, anchor: AnchorTransaction, attempt: u32) -> Result<Handled> {
        if let Ok(Some(block_id)) = anchor.block_id() {
            let _guard = self.locks.lock(block_id).await;
            if self.store.get_block_status(&block_id).await? == Some(BlockStatus::RetryPending) {
                self.store.set_block_status(&block_id, BlockStatus::Seen).await?;
            }
        }

        match self.confirm_anchor(&anchor).await {
            Ok(_) => Ok(Handled::Done),
            Err(e) => self.fail_confirm(&anchor, attempt + 1, e).await,
        }
    }

    /// Apply a reorg delta: every retraction first, then every confirmation.
    ///
    /// A record is retracted only when it points into the abandoned branch.
    /// From here on, anchors from abandoned chain blocks are ignored, so a
    /// stale snapshot or retry still in the queue cannot confirm them again.
    pub async fn apply_reorg(&self, delta: &ReorgDelta) -> Result<()> {
        {
            let mut abandoned = self.lock_abandoned();
            abandoned.extend(delta.abandoned.iter().copied());
            abandoned.retain(|hash| !delta.adopted.contains(hash));
        }

        for block_id in &delta.retract {
            let _guard = self.locks.lock(*block_id).await;
            let Some(record) = self.store.get_anchor_record(block_id).await? else {
                continue;
            };
            let on_abandoned = record
                .chain_block_hash
                .is_some_and(|hash| delta.abandoned.contains(&hash));
            if !on_abandoned {
                tracing::debug!(block_id = %block_id, tx = %record.transaction_hash, "record not on abandoned branch, kept");
                continue;
            }
            if self.store.retract_block(block_id).await? {
                ProcessorStats::bump(&self.stats.retracted);
                tracing::info!(block_id = %block_id, at = delta.common_ancestor.height, "anchor retracted");
            }
        }

        for anchor in delta.confirm.values() {
            if let Err(e) = self.confirm_anchor(anchor).await {
                self.fail_confirm(anchor, 1, e).await?;
            }
        }
        Ok(())
    }

    async fn confirm_anchor(&self, anchor: &AnchorTransaction) -> Result<AnchorOutcome> {
        let Some(block_id) = anchor.block_id()? else {
            return Ok(AnchorOutcome::Foreign);
        };

        let _guard = self.locks.lock(block_id).await;
        if self.is_abandoned(&anchor.chain_block_hash) {
            tracing::debug!(block_id = %block_id, tx = %anchor.transaction_hash, height = anchor.chain_block_height, "anchor on abandoned chain block ignored");
            return Ok(AnchorOutcome::Abandoned);
        }
        if let Some(existing) = self.store.get_anchor_record(&block_id).await? {
            if existing.is_confirmed() {
                ProcessorStats::bump(&self.stats.duplicates);
                return Ok(AnchorOutcome::Duplicate);
            }
        }

        let record = ChainAnchorRecord::mined(block_id, anchor);
        if self.store.get_block_status(&block_id).await?.is_none() {
            self.store.save_anchor_record(&record).await?;
            tracing::debug!(block_id = %block_id, height = anchor.chain_block_height, "anchor observed before block");
            return Ok(AnchorOutcome::Recorded);
        }

        self.store.confirm_block(&record).await?;
        ProcessorStats::bump(&self.stats.confirmed);
        tracing::info!(block_id = %block_id, height = anchor.chain_block_height, tx = %anchor.transaction_hash, "block confirmed");
        Ok(AnchorOutcome::Confirmed)
    }

    async fn fail_confirm(&self, anchor: &AnchorTransaction, attempt: u32, error: SyncError) -> Result<Handled> {
        if let Ok(Some(block_id)) = anchor.block_id() {
            let _guard = self.locks.lock(block_id).await;
            let marked = match self.store.get_block_status(&block_id).await {
                Ok(Some(BlockStatus::Seen)) => self
                    .store
                    .set_block_status(&block_id, BlockStatus::RetryPending)
                    .await
                    .map_err(SyncError::from),
                Ok(_) => Ok(()),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = marked {
                tracing::warn!(block_id = %block_id, error = %e, "could not mark block retry pending");
            }
        }

        let next = QueueEvent::ConfirmRetry {
            anchor: anchor.clone(),
            attempt,
        };
        self.redrive(next, attempt, error).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Failure handling
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue `next` as the follow-up of a failed item, or report the item if
    /// it failed permanently more than `max_retry_attempts` times.
    async fn redrive(&self, next: QueueEvent, attempt: u32, error: SyncError) -> Result<Handled> {
        let topic = next.topic();
        if !error.is_transient() && attempt > self.config.max_retry_attempts {
            ProcessorStats::bump(&self.stats.permanent_failures);
            self.alerts.alert(Alert::PermanentFailure {
                topic,
                attempts: attempt,
                error: error.to_string(),
            });
            return Ok(Handled::Abandoned);
        }

        tracing::warn!(%topic, attempt, error = %error, transient = error.is_transient(), "redriving work item");
        self.queue.dispatch_work(next).await?;
        ProcessorStats::bump(&self.stats.retried);
        Ok(Handled::Redriven)
    }
}
