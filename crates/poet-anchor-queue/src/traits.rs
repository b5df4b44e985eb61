//! Queue trait: per-topic FIFOs with at-least-once delivery.

use std::time::Duration;

use async_trait::async_trait;
use poet_anchor_core::{QueueEvent, Topic};

use crate::error::Result;

/// Identifier of a queued item, stable across redeliveries.
pub type DeliveryId = u64;

/// An item handed to a consumer. It stays in flight until acked or nacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: DeliveryId,
    pub topic: Topic,
    pub event: QueueEvent,
    /// How many times this item has been handed out, including this one.
    pub deliveries: u32,
}

/// Configuration for queue backends.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of items held (ready plus in flight).
    pub capacity: usize,

    /// How often a durable queue re-checks storage while idle.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// The Queue trait: at-least-once work distribution by topic.
///
/// # Design Notes
///
/// - **FIFO within a topic**, no ordering across topics.
/// - **Non-blocking dispatch**: a queue that cannot take work returns
///   `QueueError::Unavailable` instead of waiting.
/// - **Nothing is dropped**: un-acked items return to the head of their topic
///   on `nack` or `recover_in_flight`.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue an event on its topic.
    async fn dispatch_work(&self, event: QueueEvent) -> Result<DeliveryId>;

    /// Wait for the next item on `topic` and move it in flight.
    ///
    /// Returns `QueueError::Closed` once the queue is closed.
    async fn next(&self, topic: Topic) -> Result<Delivery>;

    /// Remove an in-flight item for good.
    async fn ack(&self, id: DeliveryId) -> Result<()>;

    /// Return an in-flight item to the head of its topic.
    async fn nack(&self, id: DeliveryId) -> Result<()>;

    /// Requeue everything in flight. Returns the number of items moved.
    async fn recover_in_flight(&self) -> Result<usize>;

    /// Number of ready (not in flight) items on `topic`.
    async fn backlog(&self, topic: Topic) -> Result<usize>;

    /// Stop handing out work and refuse new work. Waiters in `next` return
    /// `QueueError::Closed`.
    fn close(&self);
}
