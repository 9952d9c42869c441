//! Shared utilities for integration testing: a scriptable mock node.
//!
//! One axum server answers JSON-RPC over HTTP POST and over a WebSocket on
//! the same port. Block numbers, receipt availability and pushes are driven
//! from the test through [`NodeState`].

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use shard_messenger::config::{ConfirmationConfig, SdkConfig};
use shard_messenger::transport::{HttpTransport, Transport, WsTransport};
use shard_messenger::{Messenger, TransactionParams, Wallet};

/// Well-known development key; never holds funds.
pub const TEST_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const TX_HASH: &str = "0x5c1f2bd4a0f4f1c3a1e7c6f8d9b0a1b2c3d4e5f60718293a4b5c6d7e8f901234";

/// Scripted behavior and call counters of a mock node.
pub struct NodeState {
    /// Returned (then advanced by `block_step`) once `block_script` is empty.
    pub block: AtomicU64,
    pub block_step: AtomicU64,
    pub block_script: Mutex<VecDeque<u64>>,
    /// Receipt appears on this receipt query (1-based); `0` means never.
    pub receipt_on: AtomicU32,
    pub receipt_queries: AtomicU32,
    pub cx_receipt_on: AtomicU32,
    pub cx_receipt_queries: AtomicU32,
    pub receipt_status: Mutex<String>,
    pub sharding: Mutex<Value>,
    pub methods: Mutex<Vec<String>>,
    pub subscribe_calls: AtomicU32,
    pushes: broadcast::Sender<(String, Value)>,
    frames: broadcast::Sender<String>,
    kills: broadcast::Sender<()>,
}

impl NodeState {
    fn new() -> Self {
        let (pushes, _) = broadcast::channel(64);
        let (frames, _) = broadcast::channel(16);
        let (kills, _) = broadcast::channel(4);
        Self {
            block: AtomicU64::new(100),
            block_step: AtomicU64::new(1),
            block_script: Mutex::new(VecDeque::new()),
            receipt_on: AtomicU32::new(0),
            receipt_queries: AtomicU32::new(0),
            cx_receipt_on: AtomicU32::new(0),
            cx_receipt_queries: AtomicU32::new(0),
            receipt_status: Mutex::new("0x1".to_string()),
            sharding: Mutex::new(json!([])),
            methods: Mutex::new(Vec::new()),
            subscribe_calls: AtomicU32::new(0),
            pushes,
            frames,
            kills,
        }
    }

    /// Make the receipt appear on the `n`th query.
    pub fn receipt_on(&self, n: u32) {
        self.receipt_on.store(n, Ordering::SeqCst);
    }

    pub fn cx_receipt_on(&self, n: u32) {
        self.cx_receipt_on.store(n, Ordering::SeqCst);
    }

    /// Serve these block numbers first, in order.
    pub fn script_blocks(&self, blocks: &[u64]) {
        self.block_script.lock().unwrap().extend(blocks.iter().copied());
    }

    /// Number of calls whose method ends with `_<name>`.
    pub fn calls(&self, name: &str) -> usize {
        let suffix = format!("_{}", name);
        self.methods.lock().unwrap().iter().filter(|m| m.ends_with(&suffix)).count()
    }

    /// Push `item` to every live subscription of `kind` ("newHeads", ...).
    pub fn push(&self, kind: &str, item: Value) {
        let _ = self.pushes.send((kind.to_string(), item));
    }

    /// Send `text` verbatim on every open WebSocket connection.
    pub fn send_frame(&self, text: &str) {
        let _ = self.frames.send(text.to_string());
    }

    /// Drop every open WebSocket connection.
    pub fn drop_connections(&self) {
        let _ = self.kills.send(());
    }

    fn next_block(&self) -> u64 {
        if let Some(block) = self.block_script.lock().unwrap().pop_front() {
            return block;
        }
        let step = self.block_step.load(Ordering::SeqCst);
        self.block.fetch_add(step, Ordering::SeqCst)
    }

    fn handle(&self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request["method"].as_str().unwrap_or_default().to_string();
        self.methods.lock().unwrap().push(method.clone());

        let name = method.split_once('_').map(|(_, n)| n).unwrap_or(&method);
        let result = match name {
            "blockNumber" => json!(format!("0x{:x}", self.next_block())),
            "getTransactionReceipt" => {
                let n = self.receipt_queries.fetch_add(1, Ordering::SeqCst) + 1;
                let on = self.receipt_on.load(Ordering::SeqCst);
                if on != 0 && n >= on {
                    json!({
                        "transactionHash": request["params"][0],
                        "blockNumber": format!("0x{:x}", self.block.load(Ordering::SeqCst)),
                        "status": self.receipt_status.lock().unwrap().clone(),
                    })
                } else {
                    Value::Null
                }
            }
            "getCXReceiptByHash" => {
                let n = self.cx_receipt_queries.fetch_add(1, Ordering::SeqCst) + 1;
                let on = self.cx_receipt_on.load(Ordering::SeqCst);
                if on != 0 && n >= on {
                    json!({ "transactionHash": request["params"][0], "toShardID": 1 })
                } else {
                    Value::Null
                }
            }
            "sendRawTransaction" => json!(TX_HASH),
            "getTransactionCount" => json!("0x0"),
            "getShardingStructure" => self.sharding.lock().unwrap().clone(),
            "getLogs" => json!([
                { "logIndex": "0x0", "blockNumber": "0x1", "removed": false },
                { "logIndex": "0x1", "blockNumber": "0x2", "removed": false },
            ]),
            "unsubscribe" => json!(true),
            _ => {
                return json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": format!("method {} not found", method) },
                });
            }
        };
        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }
}

/// A running mock node.
pub struct MockNode {
    pub addr: SocketAddr,
    pub state: Arc<NodeState>,
}

impl MockNode {
    pub async fn start() -> Self {
        let state = Arc::new(NodeState::new());
        let app = Router::new()
            .route("/", post(rpc_handler).get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

async fn rpc_handler(State(state): State<Arc<NodeState>>, Json(request): Json<Value>) -> Json<Value> {
    Json(state.handle(&request))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<NodeState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, state))
}

async fn serve_socket(mut socket: WebSocket, state: Arc<NodeState>) {
    let mut pushes = state.pushes.subscribe();
    let mut frames = state.frames.subscribe();
    let mut kills = state.kills.subscribe();
    // (subscription id, kind) registered on this connection
    let mut subscriptions: Vec<(String, String)> = Vec::new();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => break,
                };
                let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };

                let method = request["method"].as_str().unwrap_or_default();
                let reply = if method.ends_with("_subscribe") {
                    state.methods.lock().unwrap().push(method.to_string());
                    state.subscribe_calls.fetch_add(1, Ordering::SeqCst);
                    let sub_id = format!("0x{}", uuid::Uuid::new_v4().simple());
                    let kind = request["params"][0].as_str().unwrap_or_default().to_string();
                    subscriptions.push((sub_id.clone(), kind));
                    json!({ "jsonrpc": "2.0", "id": request["id"], "result": sub_id })
                } else {
                    if method.ends_with("_unsubscribe") {
                        let sub_id = request["params"][0].as_str().unwrap_or_default();
                        subscriptions.retain(|(id, _)| id != sub_id);
                    }
                    state.handle(&request)
                };

                if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                    break;
                }
            }
            pushed = pushes.recv() => {
                let Ok((kind, item)) = pushed else { continue };
                for (sub_id, _) in subscriptions.iter().filter(|(_, k)| *k == kind) {
                    let frame = json!({
                        "jsonrpc": "2.0",
                        "method": "hmy_subscription",
                        "params": { "subscription": sub_id, "result": item },
                    });
                    if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
                        return;
                    }
                }
            }
            frame = frames.recv() => {
                let Ok(text) = frame else { continue };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = kills.recv() => break,
        }
    }
}

/// Settings that keep tests fast.
pub fn fast_config(http_url: &str) -> SdkConfig {
    let mut config = SdkConfig::default();
    config.network.http_url = http_url.to_string();
    config.transport.request_timeout_ms = 2_000;
    config.transport.reconnect_delay_ms = 100;
    config.tracker.polling_interval_ms = 20;
    config.confirmation = ConfirmationConfig {
        max_attempts: 10,
        interval_ms: 10,
    };
    config
}

pub fn http_messenger(node: &MockNode) -> Arc<Messenger> {
    let config = fast_config(&node.http_url());
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::with_config(node.http_url(), &config.transport, None));
    Arc::new(Messenger::with_config(transport, config))
}

pub async fn ws_messenger(node: &MockNode) -> Arc<Messenger> {
    let config = fast_config(&node.http_url());
    let transport = WsTransport::connect(node.ws_url(), &config.transport).await.unwrap();
    Arc::new(Messenger::with_config(Arc::new(transport), config))
}

pub fn wallet() -> Wallet {
    Wallet::from_private_key(TEST_PRIVATE_KEY).unwrap()
}

pub fn transfer(shard_id: u32, to_shard_id: u32) -> TransactionParams {
    TransactionParams {
        nonce: 0,
        gas_price: alloy::primitives::U256::from(1_000_000_000u64),
        gas_limit: alloy::primitives::U256::from(21_000u64),
        shard_id,
        to_shard_id,
        to: Some(alloy::primitives::Address::repeat_byte(0x11)),
        value: alloy::primitives::U256::from(1u64),
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
