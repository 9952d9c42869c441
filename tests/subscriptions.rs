//! Typed subscriptions against a push-capable mock node.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use shard_messenger::subscription::{LogSubscription, PendingTransactions, Syncing};
use shard_messenger::rpc::RpcRequest;
use shard_messenger::{LifecycleEvent, Transport};

mod common;

async fn next_event(events: &mut broadcast::Receiver<LifecycleEvent>) -> LifecycleEvent {
    match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
        Ok(Ok(event)) => event,
        other => panic!("no event: {:?}", other),
    }
}

/// Wait until the node has seen `n` subscribe calls and the client has had
/// time to route pushes for them.
async fn subscribed(node: &common::MockNode, n: u32) {
    let state = node.state.clone();
    assert!(common::wait_until(Duration::from_secs(2), move || state.subscribe_calls.load(Ordering::SeqCst) >= n).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_logs_replay_history_then_follow() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;

    let logs = LogSubscription::new(
        messenger,
        json!({ "fromBlock": "0x1", "address": "0x1111111111111111111111111111111111111111" }),
        None,
    )
    .unwrap();
    let mut events = logs.subscription().events();
    logs.start().await.unwrap();

    assert_eq!(node.state.calls("getLogs"), 1);
    let first = next_event(&mut events).await;
    let second = next_event(&mut events).await;
    assert!(matches!(first, LifecycleEvent::Data(ref log) if log["logIndex"] == "0x0"));
    assert!(matches!(second, LifecycleEvent::Data(ref log) if log["logIndex"] == "0x1"));

    subscribed(&node, 1).await;
    node.state.push("logs", json!({ "logIndex": "0x2", "removed": true }));

    // A reorg-removed log is flagged before it is delivered.
    assert!(matches!(next_event(&mut events).await, LifecycleEvent::Changed(ref log) if log["logIndex"] == "0x2"));
    assert!(matches!(next_event(&mut events).await, LifecycleEvent::Data(ref log) if log["logIndex"] == "0x2"));
}

#[tokio::test]
async fn test_logs_history_survives_failed_start() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;
    let failed_once = Arc::new(AtomicBool::new(false));
    let flag = failed_once.clone();
    messenger.transport().middleware().use_request("hmy_getLogs", move |mut payload: RpcRequest| {
        if !flag.swap(true, Ordering::SeqCst) {
            payload.method = "hmy_noSuchMethod".to_string();
        }
        payload
    });

    let logs = LogSubscription::new(messenger, json!({ "fromBlock": "0x1" }), None).unwrap();
    let mut events = logs.subscription().events();

    assert!(logs.start().await.is_err());
    assert!(failed_once.load(Ordering::SeqCst));
    assert_eq!(node.state.subscribe_calls.load(Ordering::SeqCst), 0);

    logs.start().await.unwrap();
    assert_eq!(node.state.calls("getLogs"), 1);
    assert!(matches!(next_event(&mut events).await, LifecycleEvent::Data(ref log) if log["logIndex"] == "0x0"));
    assert!(matches!(next_event(&mut events).await, LifecycleEvent::Data(ref log) if log["logIndex"] == "0x1"));
}

#[tokio::test]
async fn test_logs_from_latest_skip_history() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;

    let logs = LogSubscription::new(messenger, json!({ "fromBlock": "latest" }), None).unwrap();
    logs.start().await.unwrap();
    assert_eq!(node.state.calls("getLogs"), 0);
    assert_eq!(node.state.subscribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_syncing_reports_transitions_only() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;

    let syncing = Syncing::new(messenger, None);
    let mut events = syncing.subscription().events();
    syncing.start().await.unwrap();
    subscribed(&node, 1).await;

    for flag in [true, true, false] {
        node.state.push("syncing", json!({ "syncing": flag }));
    }

    let mut changed = Vec::new();
    let mut data = 0;
    while data < 3 {
        match next_event(&mut events).await {
            LifecycleEvent::Changed(value) => changed.push(value),
            LifecycleEvent::Data(_) => data += 1,
            _ => {}
        }
    }
    assert_eq!(changed, vec![Value::Bool(true), Value::Bool(false)]);
}

#[tokio::test]
async fn test_pending_transactions_deliver_hashes() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;

    let pending = PendingTransactions::new(messenger, None);
    let mut events = pending.subscription().events();
    let id = pending.start().await.unwrap();
    assert!(id.starts_with("0x"));
    subscribed(&node, 1).await;

    node.state.push("newPendingTransactions", json!(common::TX_HASH));
    assert_eq!(next_event(&mut events).await, LifecycleEvent::Data(json!(common::TX_HASH)));

    assert!(pending.subscription().unsubscribe().await.unwrap());
    assert!(!pending.subscription().is_active().await);
    assert!(!pending.subscription().unsubscribe().await.unwrap());
}
