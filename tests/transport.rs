//! Transport behavior against mock nodes: middleware, errors, reconnects.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use shard_messenger::rpc::{ChainType, RpcMethod, RpcRequest, RpcResponse};
use shard_messenger::subscription::NewHeaders;
use shard_messenger::transport::{HttpTransport, Transport, TransportEvent, WsTransport};
use shard_messenger::{LifecycleEvent, Messenger, SdkError};

mod common;

fn tag(label: &'static str) -> impl Fn(Value) -> Value + Send + Sync + 'static {
    move |mut raw: Value| {
        if let Some(result) = raw.get("result").and_then(Value::as_str) {
            raw["result"] = json!(format!("{}|{}", result, label));
        }
        raw
    }
}

#[tokio::test]
async fn test_middleware_runs_exact_then_pattern_then_wildcard() {
    let node = common::MockNode::start().await;
    let transport = HttpTransport::new(node.http_url());

    // Registered in reverse so the order comes from the match class.
    transport.middleware().use_response("*", tag("wildcard"));
    transport.middleware().use_response("hmy_*", tag("pattern"));
    transport.middleware().use_response("hmy_blockNumber", tag("exact"));
    transport.middleware().use_response("hmy_getBalance", tag("other"));

    let messenger = Messenger::new(Arc::new(transport), ChainType::Harmony);
    let result = messenger.request(RpcMethod::BlockNumber, (), None).await.unwrap();
    assert_eq!(result, json!("0x64|exact|pattern|wildcard"));
}

#[tokio::test]
async fn test_request_middleware_rewrites_payload() {
    let node = common::MockNode::start().await;
    let transport = HttpTransport::new(node.http_url());
    transport.middleware().use_request("hmy_getBalance", |mut payload: RpcRequest| {
        payload.method = "hmy_blockNumber".to_string();
        payload
    });

    let response = transport
        .send(RpcRequest::new("hmy_getBalance", json!(["0xabc"])))
        .await
        .unwrap();
    assert!(!response.is_error());
    assert_eq!(node.state.calls("blockNumber"), 1);
    assert_eq!(node.state.calls("getBalance"), 0);
}

#[tokio::test]
async fn test_rpc_error_is_wrapped() {
    let node = common::MockNode::start().await;
    let messenger = common::http_messenger(&node);

    let response = messenger.send("hmy_noSuchMethod", (), None, None).await.unwrap();
    assert!(response.is_error());
    assert!(matches!(
        response.into_result(),
        Err(SdkError::Rpc { code: -32601, .. })
    ));
}

#[tokio::test]
async fn test_http_connection_refused() {
    let transport = HttpTransport::new("http://127.0.0.1:1");
    let result = transport.send(RpcRequest::new("hmy_blockNumber", ())).await;
    assert!(matches!(result, Err(SdkError::Transport(_))));
}

#[tokio::test]
async fn test_prefix_rewrite_reaches_node() {
    let node = common::MockNode::start().await;
    let messenger = common::http_messenger(&node);

    messenger.send("hmy_blockNumber", (), Some("eth"), None).await.unwrap();
    messenger.send("blockNumber", (), None, None).await.unwrap();

    let methods = node.state.methods.lock().unwrap().clone();
    assert_eq!(methods, vec!["eth_blockNumber", "hmy_blockNumber"]);
}

#[tokio::test]
async fn test_ws_request_response() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;
    assert!(messenger.supports_subscriptions(None));

    let results = futures_util::future::join_all(
        (0..5).map(|_| messenger.request(RpcMethod::BlockNumber, (), None)),
    )
    .await;
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(node.state.calls("blockNumber"), 5);
}

async fn next_data(events: &mut broadcast::Receiver<LifecycleEvent>) -> Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(LifecycleEvent::Data(item))) => return item,
            Ok(Ok(_)) => continue,
            other => panic!("no data event: {:?}", other),
        }
    }
}

async fn wait_for_resubscribe(events: &mut broadcast::Receiver<TransportEvent>) -> Vec<TransportEvent> {
    let mut seen = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(event)) => {
                let done = matches!(event, TransportEvent::Resubscribed { .. });
                seen.push(event);
                if done {
                    return seen;
                }
            }
            other => panic!("transport never resubscribed: {:?} after {:?}", other, seen),
        }
    }
}

#[tokio::test]
async fn test_subscription_survives_reconnect() {
    let node = common::MockNode::start().await;
    let messenger = common::ws_messenger(&node).await;
    let mut transport_events = messenger.transport().events().unwrap();

    let heads = NewHeaders::new(messenger.clone(), None);
    let mut data = heads.subscription().events();
    let first_id = heads.start().await.unwrap();

    node.state.push("newHeads", json!({ "number": "0x1" }));
    assert_eq!(next_data(&mut data).await["number"], "0x1");

    node.state.drop_connections();
    let seen = wait_for_resubscribe(&mut transport_events).await;
    assert!(seen.contains(&TransportEvent::Disconnected));
    assert!(seen.iter().any(|e| matches!(e, TransportEvent::Reconnecting { .. })));
    assert!(seen.iter().any(|e| matches!(e, TransportEvent::Connected)));

    // The id watch carries the reissued id before any new push arrives.
    let second_id = heads.subscription().id().await.unwrap();
    assert_ne!(first_id, second_id);
    let reissued = seen.iter().find_map(|e| match e {
        TransportEvent::Resubscribed { old_id, new_id } => Some((old_id.clone(), new_id.clone())),
        _ => None,
    });
    assert_eq!(reissued, Some((first_id.clone(), second_id.clone())));

    node.state.push("newHeads", json!({ "number": "0x2" }));
    assert_eq!(next_data(&mut data).await["number"], "0x2");

    // Exactly one delivery per push after the reissue.
    tokio::time::sleep(Duration::from_millis(100)).await;
    loop {
        match data.try_recv() {
            Ok(LifecycleEvent::Data(item)) => panic!("duplicate delivery: {}", item),
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    assert_eq!(heads.subscription().id().await.unwrap(), second_id);
    assert_eq!(node.state.subscribe_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert!(heads.subscription().unsubscribe().await.unwrap());
}

#[tokio::test]
async fn test_failed_unsubscribe_still_forgets_subscription() {
    let node = common::MockNode::start().await;
    let config = common::fast_config(&node.http_url());
    let transport = Arc::new(WsTransport::connect(node.ws_url(), &config.transport).await.unwrap());
    transport.middleware().use_request("hmy_unsubscribe", |mut payload: RpcRequest| {
        payload.method = "hmy_noSuchMethod".to_string();
        payload
    });
    let messenger = Arc::new(Messenger::with_config(transport.clone(), config));
    let mut transport_events = transport.events().unwrap();

    let heads = NewHeaders::new(messenger, None);
    heads.start().await.unwrap();
    assert_eq!(transport.subscription_count(), 1);

    let result = heads.subscription().unsubscribe().await;
    assert!(matches!(result, Err(SdkError::Rpc { code: -32601, .. })));
    assert!(!heads.subscription().is_active().await);
    assert_eq!(transport.subscription_count(), 0);

    // Nothing is reissued after a reconnect.
    node.state.drop_connections();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), transport_events.recv()).await {
            Ok(Ok(TransportEvent::Connected)) => break,
            Ok(Ok(_)) => continue,
            other => panic!("transport never reconnected: {:?}", other),
        }
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(node.state.subscribe_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_response_middleware_sees_subscribe_reply() {
    let node = common::MockNode::start().await;
    let config = common::fast_config(&node.http_url());
    let transport = Arc::new(WsTransport::connect(node.ws_url(), &config.transport).await.unwrap());
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = seen.clone();
    transport.middleware().use_response("hmy_subscribe", move |raw: Value| {
        record.lock().unwrap().push(raw["result"].clone());
        raw
    });
    let messenger = Arc::new(Messenger::with_config(transport.clone(), config));

    let heads = NewHeaders::new(messenger, None);
    let id = heads.start().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![json!(id)]);
}

#[tokio::test]
async fn test_http_messenger_cannot_subscribe() {
    let node = common::MockNode::start().await;
    let messenger = common::http_messenger(&node);

    let heads = NewHeaders::new(messenger, None);
    assert!(matches!(heads.start().await, Err(SdkError::SubscriptionsUnsupported)));
}

#[test]
fn test_response_wrapper_keeps_unknown_shapes() {
    let response = RpcResponse::from_raw(json!({ "jsonrpc": "2.0", "id": 1 }));
    assert!(matches!(response, RpcResponse::Raw(_)));
}
