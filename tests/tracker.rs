//! Block tracker tests against mock nodes.

use alloy::primitives::U256;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

use shard_messenger::tracker::{TrackerListener, TrackerStrategy};
use shard_messenger::{BlockTracker, LifecycleEvent};

mod common;

async fn next_latest(listener: &mut TrackerListener) -> U256 {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), listener.recv()).await {
            Ok(Ok(LifecycleEvent::Latest(height))) => return height,
            Ok(Ok(_)) => continue,
            other => panic!("no latest event: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_polling_tracker_only_moves_forward() {
    let node = common::MockNode::start().await;
    node.state.script_blocks(&[5, 7, 6, 7, 9]);
    node.state.block.store(9, Ordering::SeqCst);
    node.state.block_step.store(0, Ordering::SeqCst);

    let tracker = BlockTracker::polling(common::http_messenger(&node), None);
    let mut events = tracker.events();
    let mut listener = tracker.listen();

    let mut latest = Vec::new();
    while latest.last() != Some(&U256::from(9)) {
        latest.push(next_latest(&mut listener).await);
    }
    assert_eq!(latest, vec![U256::from(5), U256::from(7), U256::from(9)]);
    assert_eq!(tracker.current_block(), Some(U256::from(9)));

    let mut syncs = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::Sync { old, new } = event {
            syncs.push((old, new));
        }
    }
    assert_eq!(
        syncs,
        vec![
            (None, U256::from(5)),
            (Some(U256::from(5)), U256::from(7)),
            (Some(U256::from(7)), U256::from(9)),
        ]
    );
}

#[tokio::test]
async fn test_tracker_stops_with_last_listener() {
    let node = common::MockNode::start().await;
    let tracker = BlockTracker::polling(common::http_messenger(&node), None);

    let mut listener = tracker.listen();
    next_latest(&mut listener).await;
    assert!(tracker.is_running());
    assert_eq!(tracker.listener_count(), 1);

    drop(listener);
    let watched = tracker.clone();
    assert!(common::wait_until(Duration::from_secs(2), move || !watched.is_running()).await);

    let polls = node.state.calls("blockNumber");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(node.state.calls("blockNumber"), polls);
}

#[tokio::test]
async fn test_latest_block_fetches_once_running() {
    let node = common::MockNode::start().await;
    let tracker = BlockTracker::for_messenger(common::http_messenger(&node), None);
    assert_eq!(tracker.strategy(), TrackerStrategy::Polling);

    let height = tracker.latest_block().await.unwrap();
    assert_eq!(height, U256::from(100));
}

#[tokio::test]
async fn test_subscription_tracker_follows_pushed_heads() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;
    let tracker = BlockTracker::for_messenger(messenger, None);
    assert_eq!(tracker.strategy(), TrackerStrategy::Subscription);

    let mut listener = tracker.listen();
    assert_eq!(next_latest(&mut listener).await, U256::from(100));

    let state = node.state.clone();
    assert!(common::wait_until(Duration::from_secs(2), move || state.subscribe_calls.load(Ordering::SeqCst) == 1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    node.state.push("newHeads", json!({ "number": "0x70" }));
    assert_eq!(next_latest(&mut listener).await, U256::from(0x70));

    // A lower height is ignored; the next higher one comes through.
    node.state.push("newHeads", json!({ "number": "0x60" }));
    node.state.push("newHeads", json!({ "number": "0x71" }));
    assert_eq!(next_latest(&mut listener).await, U256::from(0x71));

    tracker.stop().await.unwrap();
    assert!(!tracker.is_running());
    let state = node.state.clone();
    assert!(common::wait_until(Duration::from_secs(2), move || state.calls("unsubscribe") == 1).await);
}

#[tokio::test]
async fn test_cached_height_expires_unless_refreshed() {
    let node = common::MockNode::start().await;
    node.state.block_step.store(0, Ordering::SeqCst);

    let mut config = common::fast_config(&node.http_url());
    config.tracker.stale_timeout_ms = 300;
    let transport = std::sync::Arc::new(shard_messenger::transport::HttpTransport::with_config(
        node.http_url(),
        &config.transport,
        None,
    ));
    let messenger = std::sync::Arc::new(shard_messenger::Messenger::with_config(transport, config));
    let tracker = BlockTracker::polling(messenger, None);

    assert!(tracker.observe(U256::from(500)));
    tokio::time::sleep(Duration::from_millis(200)).await;
    // A newer block restarts the expiry window.
    assert!(tracker.observe(U256::from(501)));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(tracker.current_block(), Some(U256::from(501)));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(tracker.current_block(), None);
    assert_eq!(node.state.calls("blockNumber"), 0);

    // With the cache gone the next read goes back to the node.
    assert_eq!(tracker.latest_block().await.unwrap(), U256::from(100));
    assert!(node.state.calls("blockNumber") >= 1);
}
