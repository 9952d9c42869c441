//! Generic subscription over the messenger.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::SdkResult;
use crate::events::{EventEmitter, LifecycleEvent};
use crate::messenger::Messenger;
use crate::rpc::{Params, RpcMethod};

/// Reshapes a pushed item before it is emitted as `data`.
///
/// Specializations may also emit extra events (such as `changed`) from here.
pub trait SubscriptionHandler: Send + 'static {
    fn on_new_subscription_item(&mut self, item: Value, _events: &EventEmitter) -> Value {
        item
    }
}

/// Emits items unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl SubscriptionHandler for Identity {}

struct Active {
    id: watch::Receiver<String>,
    relay: JoinHandle<()>,
}

/// One live subscription, stable across reconnects.
///
/// The server-assigned id may change after the persistent transport
/// reconnects; consumers keep the `Subscription` and its event stream.
pub struct Subscription {
    messenger: Arc<Messenger>,
    params: Vec<Value>,
    shard_id: Option<u32>,
    events: EventEmitter,
    active: Mutex<Option<Active>>,
}

impl Subscription {
    /// `params` is `[subscriptionName, ...filterArgs]`.
    pub fn new(messenger: Arc<Messenger>, params: impl Into<Params>, shard_id: Option<u32>) -> Self {
        Self {
            messenger,
            params: params.into().0,
            shard_id,
            events: EventEmitter::new(),
            active: Mutex::new(None),
        }
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn shard_id(&self) -> Option<u32> {
        self.shard_id
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.events
    }

    /// Attach an observer for `data` / `changed` / `error`.
    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Current server-assigned id, if started.
    pub async fn id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.id.borrow().clone())
    }

    pub async fn is_active(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|active| !active.relay.is_finished())
    }

    /// Subscribe, emitting items unchanged.
    pub async fn start(&self) -> SdkResult<String> {
        self.start_with(Identity).await
    }

    /// Subscribe, passing every item through `handler`. Returns the id.
    ///
    /// Starting an already started subscription returns its current id.
    pub async fn start_with<H: SubscriptionHandler>(&self, mut handler: H) -> SdkResult<String> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.relay.is_finished() {
                return Ok(current.id.borrow().clone());
            }
        }

        let mut subscription = self
            .messenger
            .subscribe(
                RpcMethod::Subscribe.as_str(),
                self.params.clone(),
                None,
                self.shard_id,
            )
            .await?;
        let id = subscription.id_watch();
        let events = self.events.clone();
        let name = self.name().to_string();

        let relay = tokio::spawn(async move {
            while let Some(item) = subscription.recv().await {
                let processed = handler.on_new_subscription_item(item, &events);
                events.emit(LifecycleEvent::Data(processed));
            }
            tracing::debug!(subscription = %name, "Subscription feed closed");
            events.emit(LifecycleEvent::Error(format!("Subscription '{}' closed", name)));
        });

        let current = id.borrow().clone();
        tracing::info!(subscription = %self.name(), subscription_id = %current, "Subscription started");
        *active = Some(Active { id, relay });
        Ok(current)
    }

    /// Cancel on the node and stop emitting. `false` if never started.
    pub async fn unsubscribe(&self) -> SdkResult<bool> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(false);
        };
        active.relay.abort();

        let id = active.id.borrow().clone();
        let removed = self.messenger.unsubscribe(&id, None, self.shard_id).await?;
        tracing::info!(subscription = %self.name(), subscription_id = %id, removed, "Unsubscribed");
        Ok(removed)
    }

    /// Subscription name, the first parameter.
    pub fn name(&self) -> &str {
        self.params.first().and_then(Value::as_str).unwrap_or("unknown")
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(active) = self.active.get_mut().take() else {
            return;
        };
        active.relay.abort();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let messenger = self.messenger.clone();
            let shard_id = self.shard_id;
            let id = active.id.borrow().clone();
            handle.spawn(async move {
                if let Err(e) = messenger.unsubscribe(&id, None, shard_id).await {
                    tracing::debug!(subscription_id = %id, error = %e, "Unsubscribe on drop failed");
                }
            });
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("params", &self.params)
            .field("shard_id", &self.shard_id)
            .finish()
    }
}
