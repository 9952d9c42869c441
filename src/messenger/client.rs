//! Routing and envelope-building façade over the transports.

use arc_swap::ArcSwap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{SdkConfig, TrackerConfig};
use crate::error::{SdkError, SdkResult};
use crate::messenger::shard::ShardingTable;
use crate::rpc::{set_rpc_prefix, ChainType, Params, RpcMethod, RpcRequest, RpcResponse};
use crate::transport::{HttpTransport, SubscriptionFeed, Transport, TransportEvent, WsTransport};

/// Holds one transport per shard and routes every call to the right one.
pub struct Messenger {
    transport: Arc<dyn Transport>,
    shard_transports: ArcSwap<HashMap<u32, Arc<dyn Transport>>>,
    sharding: ArcSwap<ShardingTable>,
    default_shard_id: ArcSwap<Option<u32>>,
    chain_type: ChainType,
    config: SdkConfig,
}

impl Messenger {
    /// Create a messenger around an existing transport with default settings.
    pub fn new(transport: Arc<dyn Transport>, chain_type: ChainType) -> Self {
        let mut config = SdkConfig::default();
        config.network.chain_type = chain_type;
        Self::with_config(transport, config)
    }

    /// Create a messenger around an existing transport.
    pub fn with_config(transport: Arc<dyn Transport>, config: SdkConfig) -> Self {
        tracing::info!(
            url = %transport.url(),
            chain_type = config.network.chain_type.prefix(),
            push = transport.supports_subscriptions(),
            "Messenger created"
        );

        Self {
            transport,
            shard_transports: ArcSwap::from_pointee(HashMap::new()),
            sharding: ArcSwap::from_pointee(ShardingTable::new()),
            default_shard_id: ArcSwap::from_pointee(config.network.default_shard_id),
            chain_type: config.network.chain_type,
            config,
        }
    }

    /// Build a messenger from configuration alone.
    ///
    /// Uses the persistent transport when `network.ws_url` is set (waiting for
    /// the first connection), the request/response transport otherwise.
    pub async fn default_config(config: SdkConfig) -> SdkResult<Arc<Self>> {
        let transport: Arc<dyn Transport> = match &config.network.ws_url {
            Some(ws_url) => Arc::new(WsTransport::connect(ws_url.clone(), &config.transport).await?),
            None => Arc::new(HttpTransport::with_config(
                config.network.http_url.clone(),
                &config.transport,
                config.network.basic_auth.clone(),
            )),
        };
        Ok(Arc::new(Self::with_config(transport, config)))
    }

    pub fn chain_type(&self) -> ChainType {
        self.chain_type
    }

    pub fn chain_prefix(&self) -> &'static str {
        self.chain_type.prefix()
    }

    pub fn chain_id(&self) -> u64 {
        self.config.network.chain_id
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn tracker_config(&self) -> &TrackerConfig {
        &self.config.tracker
    }

    /// The default transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    // ------------------------------------------------------------------
    // Routing table
    // ------------------------------------------------------------------

    /// Snapshot of the routing table.
    pub fn sharding(&self) -> Arc<ShardingTable> {
        self.sharding.load_full()
    }

    pub fn shard_ids(&self) -> Vec<u32> {
        self.sharding.load().shard_ids()
    }

    pub fn set_default_shard_id(&self, shard_id: Option<u32>) {
        self.default_shard_id.store(Arc::new(shard_id));
    }

    /// Shard served by the default transport.
    ///
    /// The entry flagged current or whose endpoint matches the default
    /// transport, else the caller-set default shard, else 0.
    pub fn current_shard(&self) -> u32 {
        self.sharding
            .load()
            .current_for(self.transport.url())
            .or(**self.default_shard_id.load())
            .unwrap_or(0)
    }

    /// Replace the routing table and build one transport per shard.
    ///
    /// Shards reuse the default transport when their endpoint is the default
    /// endpoint; otherwise a transport of the same kind is created. Must run
    /// inside a Tokio runtime when the default transport is persistent.
    pub fn set_sharding(&self, table: ShardingTable) {
        let push = self.transport.supports_subscriptions();
        let default_url = self.transport.url().trim_end_matches('/').to_string();
        let mut transports: HashMap<u32, Arc<dyn Transport>> = HashMap::new();

        for (shard_id, entry) in table.iter() {
            let endpoint = if push { &entry.ws } else { &entry.http };
            if endpoint.is_empty() {
                tracing::warn!(shard_id, "Shard has no endpoint for this transport kind");
                continue;
            }

            let transport: Arc<dyn Transport> = if endpoint.trim_end_matches('/') == default_url {
                self.transport.clone()
            } else if push {
                Arc::new(WsTransport::new(endpoint.clone(), &self.config.transport))
            } else {
                Arc::new(HttpTransport::with_config(
                    endpoint.clone(),
                    &self.config.transport,
                    self.config.network.basic_auth.clone(),
                ))
            };
            transports.insert(shard_id, transport);
        }

        tracing::info!(shards = table.len(), "Routing table updated");
        self.shard_transports.store(Arc::new(transports));
        self.sharding.store(Arc::new(table));
    }

    /// Query the node's sharding structure and install it as the routing table.
    pub async fn refresh_sharding(&self) -> SdkResult<Arc<ShardingTable>> {
        let result = self
            .transport
            .send(RpcRequest::new(
                set_rpc_prefix(RpcMethod::GetShardingStructure.as_str(), self.chain_prefix())?,
                (),
            ))
            .await?
            .into_result()?;

        self.set_sharding(ShardingTable::from_structure(&result)?);
        Ok(self.sharding())
    }

    /// Make sure `shard_id` has a route, fetching the table when it is missing.
    ///
    /// Returns whether the shard is routed after the refresh.
    pub async fn ensure_shard_route(&self, shard_id: u32) -> SdkResult<bool> {
        if self.shard_transports.load().contains_key(&shard_id) {
            return Ok(true);
        }
        self.refresh_sharding().await?;
        Ok(self.shard_transports.load().contains_key(&shard_id))
    }

    /// Transport for `shard_id`, falling back to the default transport.
    pub fn transport_for(&self, shard_id: Option<u32>) -> Arc<dyn Transport> {
        let shard_id = shard_id.unwrap_or_else(|| self.current_shard());
        self.shard_transports
            .load()
            .get(&shard_id)
            .cloned()
            .unwrap_or_else(|| self.transport.clone())
    }

    /// Whether calls to `shard_id` can use subscriptions.
    pub fn supports_subscriptions(&self, shard_id: Option<u32>) -> bool {
        self.transport_for(shard_id).supports_subscriptions()
    }

    fn rewrite_method(&self, method: &str, prefix: Option<&str>) -> SdkResult<String> {
        match prefix {
            Some(p) if p != self.chain_prefix() => set_rpc_prefix(method, p),
            _ => set_rpc_prefix(method, self.chain_prefix()),
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Send one call to `shard_id` (default: the current shard).
    ///
    /// The method's prefix is rewritten to `prefix` when given and different
    /// from the messenger's chain prefix, to the chain prefix otherwise.
    /// JSON-RPC errors come back inside the wrapped response.
    pub async fn send(
        &self,
        method: &str,
        params: impl Into<Params>,
        prefix: Option<&str>,
        shard_id: Option<u32>,
    ) -> SdkResult<RpcResponse> {
        let method = self.rewrite_method(method, prefix)?;
        let transport = self.transport_for(shard_id);

        tracing::debug!(method = %method, shard_id = ?shard_id, url = %transport.url(), "Sending");
        transport.send(RpcRequest::new(method, params)).await
    }

    /// Send a call and convert a JSON-RPC error into [`SdkError::Rpc`].
    pub async fn request(
        &self,
        method: RpcMethod,
        params: impl Into<Params>,
        shard_id: Option<u32>,
    ) -> SdkResult<Value> {
        self.send(method.as_str(), params, None, shard_id)
            .await?
            .into_result()
    }

    /// Open a subscription on `shard_id`.
    ///
    /// Fails with [`SdkError::SubscriptionsUnsupported`] when that shard's
    /// transport has no push support. The first protocol error reported by the
    /// transport detaches the subscription.
    pub async fn subscribe(
        &self,
        method: &str,
        params: impl Into<Params>,
        prefix: Option<&str>,
        shard_id: Option<u32>,
    ) -> SdkResult<MessengerSubscription> {
        let transport = self.transport_for(shard_id);
        if !transport.supports_subscriptions() {
            return Err(SdkError::SubscriptionsUnsupported);
        }

        let method = self.rewrite_method(method, prefix)?;
        // Attach before subscribing so no error between the two is missed.
        let events = transport.events();
        let feed = transport.subscribe(RpcRequest::new(method, params)).await?;
        let error_relay = events.map(|rx| spawn_error_relay(transport.clone(), feed.key(), rx));

        tracing::info!(subscription_id = %feed.id(), shard_id = ?shard_id, "Subscribed");
        Ok(MessengerSubscription {
            transport,
            feed,
            error_relay,
        })
    }

    /// Cancel subscription `id` on `shard_id`.
    pub async fn unsubscribe(
        &self,
        id: &str,
        prefix: Option<&str>,
        shard_id: Option<u32>,
    ) -> SdkResult<bool> {
        let transport = self.transport_for(shard_id);
        if !transport.supports_subscriptions() {
            return Err(SdkError::SubscriptionsUnsupported);
        }

        let method = self.rewrite_method(RpcMethod::Unsubscribe.as_str(), prefix)?;
        transport
            .unsubscribe(RpcRequest::new(method, json!([id])))
            .await
    }
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("transport", &self.transport)
            .field("chain_type", &self.chain_type)
            .field("shards", &self.shard_ids())
            .field("current_shard", &self.current_shard())
            .finish()
    }
}

fn spawn_error_relay(
    transport: Arc<dyn Transport>,
    key: u64,
    mut events: tokio::sync::broadcast::Receiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TransportEvent::Error(message)) => {
                    tracing::warn!(key, error = %message, "Transport error; detaching subscription");
                    transport.detach_subscription(key);
                    return;
                }
                Ok(TransportEvent::Closed) => return,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

/// A live subscription opened through the messenger.
///
/// Gives access to the transport, the (possibly re-keyed) id, or both.
pub struct MessengerSubscription {
    transport: Arc<dyn Transport>,
    feed: SubscriptionFeed,
    error_relay: Option<JoinHandle<()>>,
}

impl MessengerSubscription {
    /// Current server-assigned id.
    pub fn id(&self) -> String {
        self.feed.id()
    }

    pub fn id_watch(&self) -> watch::Receiver<String> {
        self.feed.id_watch()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether the transport still routes pushes to this subscription.
    pub fn is_attached(&self) -> bool {
        self.transport.has_subscription(self.feed.key())
    }

    /// Next pushed item, or `None` once the subscription was detached.
    pub async fn recv(&mut self) -> Option<Value> {
        self.feed.recv().await
    }
}

impl Drop for MessengerSubscription {
    fn drop(&mut self) {
        if let Some(relay) = self.error_relay.take() {
            relay.abort();
        }
    }
}

impl std::fmt::Debug for MessengerSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerSubscription")
            .field("id", &self.id())
            .field("url", &self.transport.url())
            .finish()
    }
}
