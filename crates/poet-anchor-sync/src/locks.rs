//! Per-block mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use poet_anchor_core::BlockId;

type LockMap = HashMap<BlockId, Arc<AsyncMutex<()>>>;

/// Keyed async mutexes, one per block id.
///
/// Entries exist only while someone holds or waits for the lock, so the map
/// stays as small as the number of blocks being worked on.
#[derive(Clone, Default)]
pub struct BlockLocks {
    map: Arc<Mutex<LockMap>>,
}

/// Held while a block's state is being changed. Dropping releases the lock.
pub struct BlockGuard {
    block_id: BlockId,
    map: Arc<Mutex<LockMap>>,
    entry: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl BlockLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds `block_id`, then hold it.
    pub async fn lock(&self, block_id: BlockId) -> BlockGuard {
        let entry = {
            let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(block_id).or_default().clone()
        };
        let guard = entry.clone().lock_owned().await;
        BlockGuard {
            block_id,
            map: self.map.clone(),
            entry,
            guard: Some(guard),
        }
    }

    /// Number of blocks currently locked or waited on.
    pub fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map and one here: nobody else is waiting.
        if Arc::strong_count(&self.entry) <= 2 {
            map.remove(&self.block_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = BlockLocks::new();
        let id = BlockId::from_bytes([1; 32]);
        {
            let _guard = locks.lock(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_block_is_exclusive() {
        let locks = BlockLocks::new();
        let id = BlockId::from_bytes([2; 32]);
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock(id).await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_blocks_do_not_contend() {
        let locks = BlockLocks::new();
        let _a = locks.lock(BlockId::from_bytes([1; 32])).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(BlockId::from_bytes([2; 32])))
            .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
