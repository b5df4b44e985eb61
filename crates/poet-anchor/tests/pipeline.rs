//! End-to-end tests: a running node against the mock chain.
//!
//! Blocks go in through the submission API, the chain is scripted through
//! `MockChainClient`, and the tests wait for the store to catch up.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use poet_anchor::core::{content_hash, encode_block, ChainAnchorRecord, QueueEvent, Topic};
use poet_anchor::queue::{MemoryQueue, Queue, QueueConfig, SqliteQueue};
use poet_anchor::store::{MemoryStore, SqliteStore, Store};
use poet_anchor::sync::{Alert, AlertSink};
use poet_anchor::{BlockStatus, Keypair, Node, NodeConfig, NodeError, Signature};
use poet_anchor_testkit::{broadcast_hash, ChainFixture, MockChainClient, TestFixture};

type MemoryNode = Node<MemoryStore, MemoryQueue, MockChainClient>;

fn test_config() -> NodeConfig {
    NodeConfig {
        anchor_address: "anchor-address".into(),
        chain_poll_interval: Duration::from_millis(20),
        loop_backoff: Duration::from_millis(10),
        queue_poll_interval: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(500),
        ..NodeConfig::default()
    }
}

fn memory_node(config: NodeConfig) -> MemoryNode {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Node::new(MemoryStore::new(), MemoryQueue::default(), MockChainClient::new(), config)
}

/// Poll `check` until it holds, failing the test after a few seconds.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn status_of<S: Store>(store: &S, block_id: &poet_anchor::BlockId) -> Option<BlockStatus> {
    store.get_block_status(block_id).await.unwrap()
}

#[derive(Default)]
struct CollectingSink(Mutex<Vec<Alert>>);

impl AlertSink for CollectingSink {
    fn alert(&self, alert: Alert) {
        self.0.lock().unwrap().push(alert);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Anchoring
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_anchor_confirm() {
    let node = memory_node(test_config());
    let mut chain = ChainFixture::new(100);
    node.client().fund(50_000);
    node.client().set_snapshot(chain.snapshot());
    node.start().await.unwrap();

    let fixture = TestFixture::with_seed([1; 32]);
    let claims = vec![
        fixture.make_work("The Raven", "Edgar Allan Poe"),
        fixture.make_work("Annabel Lee", "Edgar Allan Poe"),
    ];
    let block_id = node.publish_claims(claims).await.unwrap();

    // The worker stores the block and broadcasts exactly one anchor.
    let n = &node;
    eventually("pending anchor record", move || async move {
        n.store().get_anchor_record(&block_id).await.unwrap().is_some()
    })
    .await;
    let pending = node.store().get_anchor_record(&block_id).await.unwrap().unwrap();
    assert_eq!(pending.transaction_hash, broadcast_hash(0));
    assert!(!pending.is_confirmed());
    assert_eq!(status_of(node.store(), &block_id).await, Some(BlockStatus::Seen));

    let broadcasts = node.client().broadcasts();
    assert_eq!(broadcasts.len(), 1);
    assert_eq!(broadcasts[0].change_address, "anchor-address");
    assert_eq!(broadcasts[0].change_value, 50_000);

    // The anchor gets mined; the watcher picks it up.
    chain.extend();
    let anchor = chain.anchor(&block_id);
    node.client().set_snapshot(chain.snapshot());

    eventually("confirmation", move || async move {
        status_of(n.store(), &block_id).await == Some(BlockStatus::Confirmed)
    })
    .await;
    eventually("checkpoint", move || async move { n.progress().latest() == Some(101) }).await;

    let record = node.store().get_anchor_record(&block_id).await.unwrap().unwrap();
    assert_eq!(record.chain_block_height, Some(101));
    assert_eq!(record.chain_block_hash, Some(anchor.chain_block_hash));
    assert_eq!(node.store().get_last_processed_height().await.unwrap(), Some(101));
    assert_eq!(node.stats().confirmed, 1);

    node.shutdown().await.unwrap();
    assert_eq!(node.client().broadcasts().len(), 1);
}

#[tokio::test]
async fn test_publish_rejects_invalid_claim() {
    let node = memory_node(test_config());
    let fixture = TestFixture::new();
    let mut claim = fixture.make_work("Lenore", "Edgar Allan Poe");
    claim.attributes.insert("name".into(), "Ulalume".into());

    let err = node.publish_claims(vec![claim]).await.unwrap_err();
    assert!(matches!(err, NodeError::Validation(_)));
    assert!(!err.is_transient());
    assert_eq!(node.queue().backlog(Topic::BlocksToSend).await.unwrap(), 0);
}

#[tokio::test]
async fn test_anchor_seen_before_block() {
    let node = memory_node(test_config());
    let mut chain = ChainFixture::new(500);
    let fixture = TestFixture::with_seed([2; 32]);
    let block = fixture.make_block("peer", 2);

    chain.extend();
    chain.anchor(&block.id);
    node.client().set_snapshot(chain.snapshot());
    node.start().await.unwrap();

    let n = &node;
    let block_id = block.id;
    eventually("mined record", move || async move {
        n.store().get_anchor_record(&block_id).await.unwrap().is_some()
    })
    .await;
    assert_eq!(status_of(node.store(), &block.id).await, None);

    // The block arrives from a peer after its anchor.
    node.block_downloaded(Bytes::from(encode_block(&block))).await.unwrap();
    eventually("confirmation", move || async move {
        status_of(n.store(), &block_id).await == Some(BlockStatus::Confirmed)
    })
    .await;
    assert!(node.client().broadcasts().is_empty());

    node.shutdown().await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Reorgs
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reorg_retracts_and_confirms() {
    let node = memory_node(test_config());
    let fixture = TestFixture::with_seed([3; 32]);
    let a = fixture.make_block("a", 1);
    let b = fixture.make_block("b", 1);
    let c = fixture.make_block("c", 1);

    let mut main = ChainFixture::new(200);
    main.extend();
    main.anchor(&a.id);
    let fork_point = main.tip().height;
    main.extend();
    main.anchor(&b.id);
    node.client().set_snapshot(main.snapshot());
    node.start().await.unwrap();

    for block in [&a, &b, &c] {
        node.block_downloaded(Bytes::from(encode_block(block))).await.unwrap();
    }

    let n = &node;
    let (a_id, b_id, c_id) = (a.id, b.id, c.id);
    eventually("a and b confirmed", move || async move {
        status_of(n.store(), &a_id).await == Some(BlockStatus::Confirmed)
            && status_of(n.store(), &b_id).await == Some(BlockStatus::Confirmed)
            && status_of(n.store(), &c_id).await == Some(BlockStatus::Seen)
    })
    .await;

    // The chain switches to a branch where c replaced b.
    let mut fork = main.fork_at(fork_point, 1);
    fork.extend();
    fork.anchor(&c.id);
    fork.extend();
    node.client().set_snapshot(fork.snapshot());

    eventually("reorg applied", move || async move {
        status_of(n.store(), &b_id).await == Some(BlockStatus::Seen)
            && status_of(n.store(), &c_id).await == Some(BlockStatus::Confirmed)
    })
    .await;

    assert_eq!(status_of(node.store(), &a.id).await, Some(BlockStatus::Confirmed));
    let retracted = node.store().get_anchor_record(&b.id).await.unwrap().unwrap();
    assert!(retracted.retracted);
    assert_eq!(node.stats().retracted, 1);
    eventually("checkpoint", move || async move { n.progress().latest() == Some(203) }).await;

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reorg_beyond_window_alerts() {
    let alerts = Arc::new(CollectingSink::default());
    let config = NodeConfig {
        lookback_window: 2,
        ..test_config()
    };
    let node = Node::with_alert_sink(
        MemoryStore::new(),
        MemoryQueue::default(),
        MockChainClient::new(),
        config,
        alerts.clone(),
    );

    let mut main = ChainFixture::new(10);
    for _ in 0..5 {
        main.extend();
    }
    node.client().set_snapshot(main.snapshot());
    node.start().await.unwrap();

    let n = &node;
    eventually("baseline checkpoint", move || async move { n.progress().latest() == Some(15) })
        .await;

    // A branch off the first header, longer than the lookback window.
    let mut fork = main.fork_at(10, 9);
    for _ in 0..6 {
        fork.extend();
    }
    node.client().set_snapshot(fork.snapshot());

    let sink = alerts.clone();
    eventually("reorg alert", move || {
        let sink = sink.clone();
        async move { !sink.0.lock().unwrap().is_empty() }
    })
    .await;

    let first = alerts.0.lock().unwrap()[0].clone();
    assert_eq!(
        first,
        Alert::ReorgTooDeep {
            window: 2,
            previous_tip: 15,
            current_tip: 16,
        }
    );
    // The old baseline stays, so nothing from the new branch is processed.
    assert_eq!(node.progress().latest(), Some(15));

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_observe_chain_once() {
    let node = memory_node(test_config());
    let fixture = TestFixture::with_seed([4; 32]);
    let block = fixture.make_block("manual", 1);
    let mut chain = ChainFixture::new(40);
    node.client().set_snapshot(chain.snapshot());

    let first = node.observe_chain(None).await.unwrap();
    assert_eq!(node.queue().backlog(Topic::ChainBlockObserved).await.unwrap(), 1);

    // Same tip: nothing new is queued.
    let again = node.observe_chain(Some(&first)).await.unwrap();
    assert_eq!(again, first);
    assert_eq!(node.queue().backlog(Topic::ChainBlockObserved).await.unwrap(), 1);

    chain.extend();
    chain.anchor(&block.id);
    node.client().set_snapshot(chain.snapshot());
    let next = node.observe_chain(Some(&first)).await.unwrap();
    assert_eq!(next.height, 41);
    assert_eq!(node.queue().backlog(Topic::ChainBlockObserved).await.unwrap(), 2);

    // The extension confirms the new anchor as a mined record.
    let record = node.store().get_anchor_record(&block.id).await.unwrap().unwrap();
    assert_eq!(record.chain_block_height, Some(41));
}

// ─────────────────────────────────────────────────────────────────────────────
// Recovery
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconcile_pending_anchor() {
    let node = memory_node(test_config());
    let fixture = TestFixture::with_seed([5; 32]);
    let block = fixture.make_block("lost", 1);
    let mut chain = ChainFixture::new(300);
    chain.extend();
    let mined = chain.anchor(&block.id);

    // A broadcast the node never saw mined: the snapshot was missed.
    node.store()
        .save_block_seen(&block, &encode_block(&block))
        .await
        .unwrap();
    node.store()
        .save_anchor_record(&ChainAnchorRecord::pending(block.id, mined.transaction_hash))
        .await
        .unwrap();
    node.client().mine(mined);

    assert_eq!(node.reconcile_pending().await.unwrap(), 1);
    assert_eq!(node.queue().backlog(Topic::ConfirmRetry).await.unwrap(), 1);

    node.client().set_snapshot(ChainFixture::new(300).snapshot());
    node.start().await.unwrap();
    let n = &node;
    let block_id = block.id;
    eventually("confirmation", move || async move {
        status_of(n.store(), &block_id).await == Some(BlockStatus::Confirmed)
    })
    .await;
    let record = node.store().get_anchor_record(&block.id).await.unwrap().unwrap();
    assert_eq!(record.chain_block_height, Some(301));

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_keeps_queued_work() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("store.db");
    let queue_path = dir.path().join("queue.db");
    let fixture = TestFixture::with_seed([6; 32]);
    let block = fixture.make_block("durable", 2);

    {
        let node = Node::new(
            SqliteStore::open(&store_path).unwrap(),
            SqliteQueue::open(&queue_path, QueueConfig::default()).unwrap(),
            MockChainClient::new(),
            test_config(),
        );
        node.block_downloaded(Bytes::from(encode_block(&block))).await.unwrap();
        node.shutdown().await.unwrap();
    }

    let queue = SqliteQueue::open(&queue_path, QueueConfig::default()).unwrap();
    assert_eq!(queue.backlog(Topic::BlockDownloaded).await.unwrap(), 1);

    let node = Node::new(
        SqliteStore::open(&store_path).unwrap(),
        queue,
        MockChainClient::new(),
        test_config(),
    );
    node.client().set_snapshot(ChainFixture::new(1).snapshot());
    node.start().await.unwrap();

    let n = &node;
    let block_id = block.id;
    eventually("block stored", move || async move {
        status_of(n.store(), &block_id).await == Some(BlockStatus::Seen)
    })
    .await;
    assert_eq!(node.store().get_block(&block.id).await.unwrap(), Some(block));

    node.shutdown().await.unwrap();
    assert!(node.start().await.is_err());
}

#[tokio::test]
async fn test_permanent_failure_is_dropped() {
    let node = memory_node(NodeConfig {
        max_retry_attempts: 2,
        ..test_config()
    });
    node.client().set_snapshot(ChainFixture::new(1).snapshot());
    node.start().await.unwrap();

    node.block_downloaded(Bytes::from_static(b"not a block")).await.unwrap();

    let n = &node;
    eventually("abandoned", move || async move { n.stats().permanent_failures == 1 }).await;
    assert_eq!(node.queue().backlog(Topic::BlockRetry).await.unwrap(), 0);
    assert_eq!(node.stats().seen, 0);

    node.shutdown().await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Signing relay
// ─────────────────────────────────────────────────────────────────────────────

fn relay_signature(keypair: &Keypair, message_hex: &str) -> Signature {
    let digest = content_hash(&hex::decode(message_hex).unwrap());
    Signature {
        signature: keypair.sign(digest.as_bytes()).to_hex(),
        public_key: keypair.public_key().to_hex(),
        message: message_hex.to_string(),
    }
}

#[tokio::test]
async fn test_relay_round_trip() {
    let node = memory_node(test_config());
    let keypair = Keypair::from_seed(&[7; 32]);
    let relay = node.relay();

    let request = relay.create_multiple(vec!["0a0b".into(), "0c0d".into()], "upload-17");
    let waiter = relay.associate(&request.id).unwrap();

    // A batch with one wrong signature changes nothing.
    let mut wrong = relay_signature(&keypair, "0c0d");
    wrong.public_key = Keypair::from_seed(&[8; 32]).public_key().to_hex();
    let rejected = vec![relay_signature(&keypair, "0a0b"), wrong];
    assert!(!relay.respond(&request.id, rejected).unwrap());
    assert_eq!(relay.lookup(&request.id), Some(request.clone()));

    let accepted = vec![relay_signature(&keypair, "0a0b"), relay_signature(&keypair, "0c0d")];
    assert!(relay.respond(&request.id, accepted.clone()).unwrap());

    let response = waiter.await.unwrap();
    assert_eq!(response.request.reference, "upload-17");
    assert_eq!(response.signatures, accepted);
    assert!(relay.is_empty());
    assert!(matches!(
        relay.respond(&request.id, accepted),
        Err(NodeError::UnknownRequest(_))
    ));
}

#[tokio::test]
async fn test_dispatch_after_shutdown_fails() {
    let node = memory_node(test_config());
    node.shutdown().await.unwrap();
    let event = QueueEvent::BlockDownloaded {
        raw: Bytes::from_static(b"late"),
        attempt: 0,
    };
    assert!(node.queue().dispatch_work(event).await.is_err());
}
