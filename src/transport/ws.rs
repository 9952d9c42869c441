//! Persistent transport over WebSocket.
//!
//! # Responsibilities
//! - Keep one connection open, reconnecting after the configured delay
//! - Correlate responses to requests by JSON-RPC id
//! - Route subscription pushes by subscription id to their feeds
//! - After a reconnect, reissue in-flight requests and resubscribe every
//!   live subscription record, re-keying routes transparently
//!
//! # Data Flow
//! ```text
//! send() ──▶ pending[id] ──▶ outbound queue ──▶ connection task ──▶ socket
//!                                                      │
//! socket ──▶ connection task ──▶ dispatch ─┬─ has id ──▶ pending[id].reply
//!                                          └─ push  ──▶ routes[sub id] ──▶ feed
//! ```

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::TransportConfig;
use crate::error::{SdkError, SdkResult};
use crate::observability::metrics;
use crate::resilience::{with_timeout, ReconnectPolicy};
use crate::rpc::{RpcRequest, RpcResponse};
use crate::transport::middleware::MiddlewareRegistry;
use crate::transport::{SubscriptionFeed, Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Prune the per-connection sent set once it grows past this.
const SENT_SET_PRUNE_THRESHOLD: usize = 1024;

struct PendingRequest {
    text: String,
    reply: oneshot::Sender<Value>,
}

struct SubscriptionRecord {
    /// Subscribe payload, replayed verbatim (with a fresh id) after reconnect.
    request: RpcRequest,
    id: watch::Sender<String>,
    sink: mpsc::UnboundedSender<Value>,
}

enum Outbound {
    Request(u64),
    Close,
}

struct WsInner {
    url: String,
    timeout: Duration,
    reconnect_delay_ms: u64,
    policy: ReconnectPolicy,
    pending: DashMap<u64, PendingRequest>,
    subscriptions: DashMap<u64, SubscriptionRecord>,
    /// Server-assigned subscription id → local record key.
    routes: DashMap<String, u64>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: broadcast::Sender<TransportEvent>,
    connected: watch::Sender<bool>,
    next_key: AtomicU64,
}

/// JSON-RPC over a persistent WebSocket connection with server push.
pub struct WsTransport {
    inner: Arc<WsInner>,
    middleware: MiddlewareRegistry,
}

impl WsTransport {
    /// Create the transport and start connecting in the background.
    ///
    /// Requests issued before the connection is up are queued and sent once
    /// it is. Must be called inside a Tokio runtime.
    pub fn new(url: impl Into<String>, config: &TransportConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let (connected, _) = watch::channel(false);

        let inner = Arc::new(WsInner {
            url: url.into(),
            timeout: config.request_timeout(),
            reconnect_delay_ms: config.reconnect_delay_ms,
            policy: config.reconnect_policy,
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
            routes: DashMap::new(),
            outbound,
            events,
            connected,
            next_key: AtomicU64::new(1),
        });

        tokio::spawn(connection_loop(inner.clone(), outbound_rx));

        Self {
            inner,
            middleware: MiddlewareRegistry::new(),
        }
    }

    /// Create the transport and wait until the first connection is up.
    pub async fn connect(url: impl Into<String>, config: &TransportConfig) -> SdkResult<Self> {
        let transport = Self::new(url, config);
        let mut connected = transport.inner.connected.subscribe();
        let url = transport.inner.url.clone();

        with_timeout(transport.inner.timeout, async {
            connected
                .wait_for(|up| *up)
                .await
                .map_err(|_| SdkError::Transport(format!("Connection task for {} stopped", url)))?;
            Ok(())
        })
        .await?;

        Ok(transport)
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Number of live subscription records.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Shut the connection down. Outstanding requests fail.
    pub fn close(&self) {
        let _ = self.inner.outbound.send(Outbound::Close);
    }

    async fn send_wrapped(&self, payload: RpcRequest) -> SdkResult<RpcResponse> {
        let payload = self.middleware.apply_request(payload);
        let method = payload.method.clone();

        let raw = match self.inner.request(payload).await {
            Ok(raw) => raw,
            Err(e) => {
                let outcome = if matches!(e, SdkError::Timeout(_)) { "timeout" } else { "transport_error" };
                tracing::warn!(method = %method, error = %e, "WebSocket request failed");
                metrics::record_rpc_request(&method, outcome);
                return Err(e);
            }
        };

        let response = RpcResponse::from_raw(self.middleware.apply_response(&method, raw));
        metrics::record_rpc_request(&method, if response.is_error() { "rpc_error" } else { "ok" });
        Ok(response)
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn url(&self) -> &str {
        &self.inner.url
    }

    fn supports_subscriptions(&self) -> bool {
        true
    }

    fn middleware(&self) -> &MiddlewareRegistry {
        &self.middleware
    }

    async fn send(&self, payload: RpcRequest) -> SdkResult<RpcResponse> {
        self.send_wrapped(payload).await
    }

    async fn subscribe(&self, payload: RpcRequest) -> SdkResult<SubscriptionFeed> {
        let payload = self.middleware.apply_request(payload);
        let template = payload.clone();

        let method = payload.method.clone();
        let raw = self.inner.request(payload).await?;
        let id = subscription_id(RpcResponse::from_raw(self.middleware.apply_response(&method, raw)))?;

        let key = self.inner.next_key.fetch_add(1, Ordering::Relaxed);
        let (id_tx, id_rx) = watch::channel(id.clone());
        let (sink, items) = mpsc::unbounded_channel();

        self.inner.subscriptions.insert(
            key,
            SubscriptionRecord {
                request: template,
                id: id_tx,
                sink,
            },
        );
        self.inner.routes.insert(id.clone(), key);
        metrics::record_active_subscriptions(self.inner.subscriptions.len());

        tracing::info!(subscription_id = %id, key, "Subscription registered");
        Ok(SubscriptionFeed::new(key, id_rx, items))
    }

    async fn unsubscribe(&self, payload: RpcRequest) -> SdkResult<bool> {
        let id = payload
            .params
            .first()
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SdkError::Malformed("unsubscribe needs a subscription id".into()))?;

        let result = self.send_wrapped(payload).await.and_then(RpcResponse::into_result);

        // The local record goes away whatever the node answers.
        // Routes are cleared while disconnected, so fall back to the records.
        let key = self.inner.routes.get(&id).map(|k| *k).or_else(|| {
            self.inner
                .subscriptions
                .iter()
                .find(|record| *record.value().id.borrow() == id)
                .map(|record| *record.key())
        });
        if let Some(key) = key {
            self.detach_subscription(key);
        }

        let removed = result?.as_bool().unwrap_or(false);
        tracing::info!(subscription_id = %id, removed, "Subscription cancelled");
        Ok(removed)
    }

    fn detach_subscription(&self, key: u64) -> bool {
        let removed = self.inner.subscriptions.remove(&key).is_some();
        self.inner.routes.retain(|_, k| *k != key);
        metrics::record_active_subscriptions(self.inner.subscriptions.len());
        removed
    }

    fn has_subscription(&self, key: u64) -> bool {
        self.inner.subscriptions.contains_key(&key)
    }

    fn events(&self) -> Option<broadcast::Receiver<TransportEvent>> {
        Some(self.inner.events.subscribe())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .field("pending", &self.inner.pending.len())
            .field("subscriptions", &self.inner.subscriptions.len())
            .finish()
    }
}

impl WsInner {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Queue a request and wait for the raw response carrying its id.
    async fn request(&self, payload: RpcRequest) -> SdkResult<Value> {
        let id = payload.id;
        let text = serde_json::to_string(&payload)?;
        let (reply, response) = oneshot::channel();

        self.pending.insert(id, PendingRequest { text, reply });
        if self.outbound.send(Outbound::Request(id)).is_err() {
            self.pending.remove(&id);
            return Err(SdkError::Transport("Connection task stopped".into()));
        }

        let result = with_timeout(self.timeout, async {
            response
                .await
                .map_err(|_| SdkError::Transport("Request dropped before a response arrived".into()))
        })
        .await;

        if result.is_err() {
            self.pending.remove(&id);
        }
        result
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(batch)) => batch.into_iter().for_each(|v| self.dispatch_value(v)),
            Ok(value) => self.dispatch_value(value),
            Err(e) => {
                tracing::warn!(error = %e, "Malformed frame from node");
                self.emit(TransportEvent::Error(format!("Malformed frame: {}", e)));
            }
        }
    }

    fn dispatch_value(&self, value: Value) {
        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            match self.pending.remove(&id) {
                Some((_, pending)) => {
                    let _ = pending.reply.send(value);
                }
                None => tracing::trace!(id, "Response for unknown or completed request"),
            }
            return;
        }

        let Some(params) = value.get("params") else {
            tracing::debug!("Frame is neither a response nor a push");
            return;
        };
        let Some(subscription) = params.get("subscription").and_then(Value::as_str) else {
            return;
        };

        let key = self.routes.get(subscription).map(|k| *k);
        match key.and_then(|k| self.subscriptions.get(&k)) {
            Some(record) => {
                let item = params.get("result").cloned().unwrap_or(Value::Null);
                let _ = record.sink.send(item);
            }
            None => tracing::debug!(subscription_id = %subscription, "Push for unknown subscription"),
        }
    }

    /// Run one connection until it drops. Returns true if it was closed on request.
    async fn run_connection(
        &self,
        stream: WsStream,
        outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    ) -> bool {
        let (mut write, mut read) = stream.split();
        let mut sent: HashSet<u64> = HashSet::new();

        // Reissue everything still waiting for a response, oldest first.
        let mut backlog: Vec<(u64, String)> = self
            .pending
            .iter()
            .map(|entry| (*entry.key(), entry.value().text.clone()))
            .collect();
        backlog.sort_by_key(|(id, _)| *id);
        for (id, text) in backlog {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                tracing::warn!(error = %e, "Failed to reissue pending request");
                return false;
            }
            sent.insert(id);
        }

        loop {
            tokio::select! {
                msg = outbound.recv() => match msg {
                    Some(Outbound::Request(id)) => {
                        if !sent.insert(id) {
                            continue;
                        }
                        if sent.len() > SENT_SET_PRUNE_THRESHOLD {
                            sent.retain(|id| self.pending.contains_key(id));
                        }
                        let text = self.pending.get(&id).map(|p| p.text.clone());
                        if let Some(text) = text {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                tracing::warn!(error = %e, "WebSocket write failed");
                                return false;
                            }
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return true;
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.dispatch(text),
                        Err(_) => self.emit(TransportEvent::Error("Non UTF-8 binary frame".into())),
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(frame = ?frame, "Node closed the connection");
                        return false;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket read failed");
                        return false;
                    }
                    None => return false,
                }
            }
        }
    }
}

/// Connection loop with reconnection logic.
async fn connection_loop(inner: Arc<WsInner>, mut outbound: mpsc::UnboundedReceiver<Outbound>) {
    let mut failures = 0u32;
    let mut connections = 0u64;

    loop {
        match connect_async(inner.url.as_str()).await {
            Ok((stream, _)) => {
                failures = 0;
                connections += 1;
                inner.connected.send_replace(true);
                inner.emit(TransportEvent::Connected);
                tracing::info!(url = %inner.url, connections, "WebSocket connected");

                if connections > 1 && !inner.subscriptions.is_empty() {
                    tokio::spawn(resubscribe_all(inner.clone()));
                }

                let closed_by_us = inner.run_connection(stream, &mut outbound).await;

                inner.connected.send_replace(false);
                inner.routes.clear();

                if closed_by_us {
                    tracing::info!(url = %inner.url, "WebSocket closed");
                    inner.emit(TransportEvent::Closed);
                    return;
                }
                tracing::warn!(url = %inner.url, "WebSocket disconnected");
                inner.emit(TransportEvent::Disconnected);
            }
            Err(e) => {
                tracing::warn!(url = %inner.url, error = %e, "WebSocket connection failed");
            }
        }

        failures += 1;
        let delay = inner.policy.delay(failures, inner.reconnect_delay_ms);
        inner.emit(TransportEvent::Reconnecting {
            attempt: failures,
            delay,
        });
        metrics::record_reconnect();
        tracing::info!(attempt = failures, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        // Requests queued meanwhile stay pending and are reissued on connect.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                msg = outbound.recv() => match msg {
                    Some(Outbound::Request(_)) => {}
                    Some(Outbound::Close) | None => {
                        inner.emit(TransportEvent::Closed);
                        return;
                    }
                }
            }
        }
    }
}

/// Reissue every subscription record and re-key its route.
async fn resubscribe_all(inner: Arc<WsInner>) {
    let records: Vec<(u64, RpcRequest, String)> = inner
        .subscriptions
        .iter()
        .map(|r| (*r.key(), r.value().request.clone(), r.value().id.borrow().clone()))
        .collect();

    for (key, request, old_id) in records {
        let result = inner
            .request(request.with_fresh_id())
            .await
            .and_then(|raw| subscription_id(RpcResponse::from_raw(raw)));

        match result {
            Ok(new_id) => {
                let Some(record) = inner.subscriptions.get(&key) else {
                    // Unsubscribed while the reissue was in flight.
                    continue;
                };
                record.id.send_replace(new_id.clone());
                drop(record);
                inner.routes.insert(new_id.clone(), key);

                tracing::info!(old_id = %old_id, new_id = %new_id, key, "Subscription reissued");
                inner.emit(TransportEvent::Resubscribed { old_id, new_id });
            }
            Err(e) => {
                tracing::warn!(subscription_id = %old_id, error = %e, "Failed to reissue subscription");
            }
        }
    }
}

fn subscription_id(response: RpcResponse) -> SdkResult<String> {
    match response.into_result()? {
        Value::String(id) => Ok(id),
        other => Err(SdkError::Malformed(format!(
            "Subscription id must be a string, got {}",
            other
        ))),
    }
}
