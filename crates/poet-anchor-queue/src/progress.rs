//! Progress announcements for downstream consumers.

use tokio::sync::watch;

/// Broadcasts the last chain height whose anchors were fully processed.
///
/// Late subscribers see the latest value immediately; intermediate heights
/// may be skipped by slow subscribers.
#[derive(Debug)]
pub struct ProgressAnnouncer {
    tx: watch::Sender<Option<u64>>,
}

impl ProgressAnnouncer {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Announce that every anchor at or below `height` has been processed.
    pub fn bitcoin_block_processed(&self, height: u64) {
        self.tx.send_replace(Some(height));
        tracing::debug!(height, "announced processed height");
    }

    /// Subscribe to announcements.
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.tx.subscribe()
    }

    /// The most recent announcement.
    pub fn latest(&self) -> Option<u64> {
        *self.tx.borrow()
    }
}

impl Default for ProgressAnnouncer {
    fn default() -> Self {
        Self::new()
    }
}
