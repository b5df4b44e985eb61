//! Process-local implementation of the Queue trait.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use poet_anchor_core::{QueueEvent, Topic};

use crate::error::{QueueError, Result};
use crate::traits::{Delivery, DeliveryId, Queue, QueueConfig};

/// In-memory queue. Contents are lost when the process exits.
pub struct MemoryQueue {
    inner: Mutex<MemoryQueueInner>,
    wakers: HashMap<Topic, Notify>,
    config: QueueConfig,
}

#[derive(Default)]
struct MemoryQueueInner {
    ready: HashMap<Topic, VecDeque<Item>>,
    in_flight: HashMap<DeliveryId, Item>,
    next_id: DeliveryId,
    closed: bool,
}

struct Item {
    id: DeliveryId,
    event: QueueEvent,
    deliveries: u32,
}

impl MemoryQueueInner {
    fn len(&self) -> usize {
        self.in_flight.len() + self.ready.values().map(VecDeque::len).sum::<usize>()
    }
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(MemoryQueueInner::default()),
            wakers: Topic::ALL.into_iter().map(|t| (t, Notify::new())).collect(),
            config,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryQueueInner>> {
        self.inner
            .lock()
            .map_err(|e| QueueError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn wake(&self, topic: Topic) {
        if let Some(notify) = self.wakers.get(&topic) {
            notify.notify_one();
        }
    }

    fn try_take(&self, topic: Topic) -> Result<Option<Delivery>> {
        let mut inner = self.lock()?;
        if inner.closed {
            return Err(QueueError::Closed);
        }
        let Some(mut item) = inner.ready.get_mut(&topic).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        item.deliveries += 1;
        let delivery = Delivery {
            id: item.id,
            topic,
            event: item.event.clone(),
            deliveries: item.deliveries,
        };
        inner.in_flight.insert(item.id, item);
        Ok(Some(delivery))
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn dispatch_work(&self, event: QueueEvent) -> Result<DeliveryId> {
        let topic = event.topic();
        let id = {
            let mut inner = self.lock()?;
            if inner.closed {
                return Err(QueueError::Unavailable("queue closed".into()));
            }
            if inner.len() >= self.config.capacity {
                return Err(QueueError::Unavailable(format!(
                    "queue full ({} items)",
                    self.config.capacity
                )));
            }
            let id = inner.next_id;
            inner.next_id += 1;
            inner.ready.entry(topic).or_default().push_back(Item {
                id,
                event,
                deliveries: 0,
            });
            id
        };
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

            if let Some(delivery) = self.try_take(topic)? {
                return Ok(delivery);
            }
            notified.await;
        }
    }

    async fn ack(&self, id: DeliveryId) -> Result<()> {
        self.lock()?
            .in_flight
            .remove(&id)
            .map(|_| ())
            .ok_or(QueueError::UnknownDelivery(id))
    }

    async fn nack(&self, id: DeliveryId) -> Result<()> {
        let topic = {
            let mut inner = self.lock()?;
            let item = inner
                .in_flight
                .remove(&id)
                .ok_or(QueueError::UnknownDelivery(id))?;
            let topic = item.event.topic();
            inner.ready.entry(topic).or_default().push_front(item);
            topic
        };
        self.wake(topic);
        Ok(())
    }

    async fn recover_in_flight(&self) -> Result<usize> {
        let topics: Vec<Topic> = {
            let mut inner = self.lock()?;
            let mut items: Vec<Item> = inner.in_flight.drain().map(|(_, item)| item).collect();
            // Highest id first so the oldest item ends up at the head.
            items.sort_by(|a, b| b.id.cmp(&a.id));
            items
                .into_iter()
                .map(|item| {
                    let topic = item.event.topic();
                    inner.ready.entry(topic).or_default().push_front(item);
                    topic
                })
                .collect()
        };
        for topic in &topics {
            self.wake(*topic);
        }
        Ok(topics.len())
    }

    async fn backlog(&self, topic: Topic) -> Result<usize> {
        Ok(self.lock()?.ready.get(&topic).map_or(0, VecDeque::len))
    }

    fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        for notify in self.wakers.values() {
            notify.notify_waiters();
        }
    }
}
