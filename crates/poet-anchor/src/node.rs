//! The Node: process-scoped runtime that wires store, queue, chain client and
//! block processor together.
//!
//! A node starts empty, spawns one worker per topic plus a chain watcher on
//! [`Node::start`], and drains on [`Node::shutdown`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use poet_anchor_core::{
    encode_block, validate_block, validate_claim, Block, BlockId, ChainStateSnapshot, Claim,
    QueueEvent, Topic,
};
use poet_anchor_queue::{DeliveryId, ProgressAnnouncer, Queue, QueueError};
use poet_anchor_store::Store;
use poet_anchor_sync::{
    Alert, AlertSink, BlockProcessor, ChainClient, Handled, ReorgDetector, StatsSnapshot,
    SyncError, TracingAlertSink,
};

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use crate::relay::SignRequests;

/// The main Node struct.
///
/// Provides a unified API for:
/// - Submitting local claims and blocks for anchoring
/// - Feeding blocks downloaded from peers
/// - Following the chain and reconciling reorgs
/// - Tracking sign requests for the signing relay
pub struct Node<S, Q, C>
where
    S: Store + 'static,
    Q: Queue + 'static,
    C: ChainClient + 'static,
{
    processor: Arc<BlockProcessor<S, Q, C>>,
    client: Arc<C>,
    relay: SignRequests,
    config: NodeConfig,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<S, Q, C> Node<S, Q, C>
where
    S: Store + 'static,
    Q: Queue + 'static,
    C: ChainClient + 'static,
{
    /// Create a node that reports alerts through `tracing`.
    pub fn new(store: S, queue: Q, client: C, config: NodeConfig) -> Self {
        Self::with_alert_sink(store, queue, client, config, Arc::new(TracingAlertSink))
    }

    /// Create a node with a custom alert sink.
    pub fn with_alert_sink(
        store: S,
        queue: Q,
        client: C,
        config: NodeConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        let client = Arc::new(client);
        let processor = BlockProcessor::new(
            Arc::new(store),
            Arc::new(queue),
            client.clone(),
            Arc::new(ProgressAnnouncer::new()),
            config.processor(),
        )
        .with_alert_sink(alerts);
        let (shutdown, _) = watch::channel(false);

        Self {
            processor: Arc::new(processor),
            client,
            relay: SignRequests::new(config.sign_request_ttl),
            config,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &S {
        self.processor.store()
    }

    pub fn queue(&self) -> &Q {
        self.processor.queue()
    }

    pub fn progress(&self) -> &ProgressAnnouncer {
        self.processor.progress()
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn relay(&self) -> &SignRequests {
        &self.relay
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.processor.stats()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Requeue leftovers, announce the checkpoint and start consuming.
    pub async fn start(&self) -> Result<()> {
        if !self.lock_tasks().is_empty() {
            return Err(NodeError::InvalidOperation("node already started".into()));
        }
        if *self.shutdown.borrow() {
            return Err(NodeError::InvalidOperation("node was shut down".into()));
        }

        let recovered = self.queue().recover_in_flight().await?;
        let checkpoint = self.store().get_last_processed_height().await?;
        if let Some(height) = checkpoint {
            self.progress().bitcoin_block_processed(height);
        }
        tracing::info!(recovered, checkpoint = ?checkpoint, "node starting");

        let mut tasks = self.lock_tasks();
        for topic in Topic::ALL {
            let worker = Worker {
                processor: self.processor.clone(),
                topic,
                backoff: self.config.loop_backoff,
            };
            tasks.push(tokio::spawn(worker.run(self.shutdown.subscribe())));
        }

        let watcher = ChainWatcher {
            processor: self.processor.clone(),
            client: self.client.clone(),
            detector: ReorgDetector::new(self.config.reorg()),
            interval: self.config.chain_poll_interval,
        };
        tasks.push(tokio::spawn(watcher.run(self.shutdown.subscribe())));
        Ok(())
    }

    /// Stop consuming. In-flight items get `shutdown_grace` to finish; what
    /// is left is requeued, never dropped.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.send_replace(true);
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_tasks());
        let total = tasks.len();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        let mut aborted = 0usize;
        for mut task in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }

        let requeued = self.queue().recover_in_flight().await?;
        self.queue().close();
        tracing::info!(tasks = total, aborted, requeued, "node stopped");
        Ok(())
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Batch locally created claims into a block and queue it for anchoring.
    ///
    /// Invalid claims are rejected here and never reach the queue.
    pub async fn publish_claims(&self, claims: Vec<Claim>) -> Result<BlockId> {
        claims.iter().try_for_each(validate_claim)?;
        let block = Block::new(claims);
        self.submit_block(&block).await?;
        Ok(block.id)
    }

    /// Queue a locally created block for anchoring.
    pub async fn submit_block(&self, block: &Block) -> Result<DeliveryId> {
        validate_block(block)?;
        let raw = Bytes::from(encode_block(block));
        let id = self
            .queue()
            .dispatch_work(QueueEvent::BlocksToSend { raw, attempt: 0 })
            .await?;
        tracing::debug!(block_id = %block.id, claims = block.len(), "block submitted");
        Ok(id)
    }

    /// Queue a block fetched from a peer. Validation happens in the worker.
    pub async fn block_downloaded(&self, raw: Bytes) -> Result<DeliveryId> {
        Ok(self
            .queue()
            .dispatch_work(QueueEvent::BlockDownloaded { raw, attempt: 0 })
            .await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chain
    // ─────────────────────────────────────────────────────────────────────────

    /// Poll the chain once against `previous`, as the watcher does.
    pub async fn observe_chain(&self, previous: Option<&ChainStateSnapshot>) -> Result<ChainStateSnapshot> {
        let detector = ReorgDetector::new(self.config.reorg());
        Ok(observe(&self.processor, self.client.as_ref(), &detector, previous).await?)
    }

    /// Ask the chain about anchors that were broadcast but never seen mined.
    /// Mined ones are queued for confirmation; returns how many.
    pub async fn reconcile_pending(&self) -> Result<usize> {
        let pending = self.store().pending_anchor_records().await?;
        let mut found = 0;
        for record in &pending {
            match self.client.get_block_info_by_anchor_hash(&record.transaction_hash).await {
                Ok(Some(anchor)) => {
                    self.queue()
                        .dispatch_work(QueueEvent::ConfirmRetry { anchor, attempt: 0 })
                        .await?;
                    found += 1;
                }
                Ok(None) => {
                    tracing::debug!(block_id = %record.block_id, tx = %record.transaction_hash, "anchor not mined yet");
                }
                Err(e) => {
                    tracing::warn!(block_id = %record.block_id, error = %e, "anchor lookup failed");
                }
            }
        }
        tracing::info!(pending = pending.len(), found, "pending anchors reconciled");
        Ok(found)
    }
}

/// One chain poll: diff against `previous`, apply the delta, then queue the
/// snapshot for a full confirmation pass.
async fn observe<S, Q, C>(
    processor: &BlockProcessor<S, Q, C>,
    client: &C,
    detector: &ReorgDetector,
    previous: Option<&ChainStateSnapshot>,
) -> std::result::Result<ChainStateSnapshot, SyncError>
where
    S: Store,
    Q: Queue,
    C: ChainClient,
{
    let current = client.get_chain_state_snapshot().await?;
    if let Some(previous) = previous {
        if previous.block_hash == current.block_hash {
            return Ok(current);
        }
        let delta = detector.diff(previous, &current)?;
        if !delta.is_empty() {
            processor.apply_reorg(&delta).await?;
        }
    }
    processor
        .queue()
        .dispatch_work(QueueEvent::ChainBlockObserved {
            snapshot: current.clone(),
        })
        .await?;
    Ok(current)
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

struct Worker<S: Store, Q: Queue, C: ChainClient> {
    processor: Arc<BlockProcessor<S, Q, C>>,
    topic: Topic,
    backoff: Duration,
}

impl<S: Store, Q: Queue, C: ChainClient> Worker<S, Q, C> {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let queue = self.processor.queue().clone();
        tracing::debug!(topic = %self.topic, "worker started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = queue.next(self.topic) => next,
            };

            let delivery = match next {
                Ok(delivery) => delivery,
                Err(QueueError::Closed) => break,
                Err(e) => {
                    tracing::warn!(topic = %self.topic, error = %e, "queue read failed");
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            };

            let id = delivery.id;
            let outcome = self.processor.handle(delivery.event).await;
            let settled = match &outcome {
                Ok(_) => queue.ack(id).await,
                Err(_) => queue.nack(id).await,
            };
            if let Err(e) = settled {
                tracing::warn!(topic = %self.topic, id, error = %e, "could not settle delivery");
            }

            match outcome {
                Ok(Handled::Done) | Ok(Handled::Abandoned) => {}
                Ok(Handled::Redriven) => tokio::time::sleep(self.backoff).await,
                Err(e) => {
                    tracing::warn!(topic = %self.topic, id, error = %e, "work item kept for later");
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
        tracing::debug!(topic = %self.topic, "worker stopped");
    }
}

struct ChainWatcher<S: Store, Q: Queue, C: ChainClient> {
    processor: Arc<BlockProcessor<S, Q, C>>,
    client: Arc<C>,
    detector: ReorgDetector,
    interval: Duration,
}

impl<S: Store, Q: Queue, C: ChainClient> ChainWatcher<S, Q, C> {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut previous: Option<ChainStateSnapshot> = None;
        loop {
            match observe(&self.processor, self.client.as_ref(), &self.detector, previous.as_ref()).await {
                Ok(snapshot) => previous = Some(snapshot),
                Err(SyncError::ReorgTooDeep {
                    window,
                    previous_tip,
                    current_tip,
                }) => {
                    // The old baseline is kept so retractions are not lost.
                    self.processor.report(Alert::ReorgTooDeep {
                        window,
                        previous_tip,
                        current_tip,
                    });
                }
                Err(e) => tracing::warn!(error = %e, "chain poll failed"),
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
        }
        tracing::debug!("chain watcher stopped");
    }
}
