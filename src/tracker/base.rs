//! Shared tracker state: cached height, stale timer, listener bookkeeping.

use alloy::primitives::U256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::{SdkError, SdkResult};
use crate::events::{EventEmitter, LifecycleEvent};
use crate::messenger::Messenger;
use crate::rpc::{parse_quantity, RpcMethod};
use crate::tracker::{polling, subscribe};

/// How a tracker learns about new blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStrategy {
    /// Repeatedly ask for the block number.
    Polling,
    /// Subscribe to new headers on a persistent transport.
    Subscription,
}

/// Background work of a running tracker.
pub(crate) struct Running {
    pub(crate) handle: JoinHandle<()>,
    /// Set by the subscription strategy.
    pub(crate) subscription_id: Option<watch::Receiver<String>>,
}

pub(crate) struct TrackerInner {
    pub(crate) messenger: Arc<Messenger>,
    pub(crate) shard_id: Option<u32>,
    pub(crate) strategy: TrackerStrategy,
    pub(crate) polling_interval: Duration,
    pub(crate) retry_interval: Duration,
    stale_timeout: Duration,
    pub(crate) events: EventEmitter,
    current: watch::Sender<Option<U256>>,
    running: watch::Sender<bool>,
    listeners: AtomicUsize,
    stale_timer: Mutex<Option<JoinHandle<()>>>,
    task: tokio::sync::Mutex<Option<Running>>,
}

impl TrackerInner {
    pub(crate) fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub(crate) fn running_watch(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    pub(crate) async fn fetch_block_number(&self) -> SdkResult<U256> {
        let result = self
            .messenger
            .request(RpcMethod::BlockNumber, (), self.shard_id)
            .await?;
        parse_quantity(&result)
    }

    /// Record `height` if it is strictly greater than the cached height.
    pub(crate) fn new_potential_latest(self: &Arc<Self>, height: U256) -> bool {
        let old = *self.current.borrow();
        if matches!(old, Some(current) if height <= current) {
            return false;
        }

        self.current.send_replace(Some(height));
        self.arm_stale_timer();

        tracing::debug!(block = %height, shard_id = ?self.shard_id, "New latest block");
        self.events.emit(LifecycleEvent::Latest(height));
        self.events.emit(LifecycleEvent::Sync { old, new: height });
        true
    }

    fn arm_stale_timer(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let timeout = self.stale_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                tracing::debug!("Cached block height is stale; clearing");
                inner.current.send_replace(None);
            }
        });

        if let Ok(mut slot) = self.stale_timer.lock() {
            if let Some(previous) = slot.replace(timer) {
                previous.abort();
            }
        }
    }

    fn cancel_stale_timer(&self) {
        if let Ok(mut slot) = self.stale_timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }
    }

    async fn start(self: &Arc<Self>) -> SdkResult<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        self.cancel_stale_timer();
        self.running.send_replace(true);

        let started = match self.strategy {
            TrackerStrategy::Polling => Ok(polling::spawn(self)),
            TrackerStrategy::Subscription => subscribe::spawn(self).await,
        };

        match started {
            Ok(running) => {
                tracing::info!(strategy = ?self.strategy, shard_id = ?self.shard_id, "Block tracker started");
                *task = Some(running);
                Ok(())
            }
            Err(e) => {
                self.running.send_replace(false);
                tracing::warn!(error = %e, "Block tracker failed to start");
                self.events.emit(LifecycleEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn stop(self: &Arc<Self>) -> SdkResult<()> {
        let mut task = self.task.lock().await;
        let Some(running) = task.take() else {
            return Ok(());
        };

        self.running.send_replace(false);
        running.handle.abort();
        // Cached height expires on its own once nothing refreshes it.
        self.arm_stale_timer();
        tracing::info!(strategy = ?self.strategy, "Block tracker stopped");

        if let Some(id) = running.subscription_id {
            let id = id.borrow().clone();
            self.messenger.unsubscribe(&id, None, self.shard_id).await?;
        }
        Ok(())
    }

    /// Start or stop to match the listener count.
    async fn reconcile(self: &Arc<Self>) {
        let wanted = self.listeners.load(Ordering::SeqCst) > 0;
        let result = if wanted { self.start().await } else { self.stop().await };
        if let Err(e) = result {
            tracing::debug!(error = %e, wanted, "Tracker reconcile failed");
        }
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.stale_timer.lock() {
            if let Some(timer) = slot.take() {
                timer.abort();
            }
        }

        let Some(running) = self.task.get_mut().take() else {
            return;
        };
        running.handle.abort();

        if let (Some(id), Ok(handle)) = (running.subscription_id, tokio::runtime::Handle::try_current()) {
            let messenger = self.messenger.clone();
            let shard_id = self.shard_id;
            let id = id.borrow().clone();
            handle.spawn(async move {
                let _ = messenger.unsubscribe(&id, None, shard_id).await;
            });
        }
    }
}

/// Surfaces "new highest block" and "sync window advanced" notifications.
///
/// Starts on its own when the first [`TrackerListener`] attaches and stops
/// when the last one is dropped. `start`/`stop` can also be called directly.
#[derive(Clone)]
pub struct BlockTracker {
    inner: Arc<TrackerInner>,
}

impl BlockTracker {
    pub fn new(messenger: Arc<Messenger>, strategy: TrackerStrategy, shard_id: Option<u32>) -> Self {
        let config = messenger.tracker_config().clone();
        let (current, _) = watch::channel(None);
        let (running, _) = watch::channel(false);

        Self {
            inner: Arc::new(TrackerInner {
                messenger,
                shard_id,
                strategy,
                polling_interval: config.polling_interval(),
                retry_interval: config.retry_interval(),
                stale_timeout: config.stale_timeout(),
                events: EventEmitter::new(),
                current,
                running,
                listeners: AtomicUsize::new(0),
                stale_timer: Mutex::new(None),
                task: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn polling(messenger: Arc<Messenger>, shard_id: Option<u32>) -> Self {
        Self::new(messenger, TrackerStrategy::Polling, shard_id)
    }

    /// Requires a push-capable transport for `shard_id`; starting fails otherwise.
    pub fn subscription(messenger: Arc<Messenger>, shard_id: Option<u32>) -> Self {
        Self::new(messenger, TrackerStrategy::Subscription, shard_id)
    }

    /// Pick the subscription strategy when the shard's transport supports push.
    pub fn for_messenger(messenger: Arc<Messenger>, shard_id: Option<u32>) -> Self {
        let strategy = if messenger.supports_subscriptions(shard_id) {
            TrackerStrategy::Subscription
        } else {
            TrackerStrategy::Polling
        };
        Self::new(messenger, strategy, shard_id)
    }

    pub fn strategy(&self) -> TrackerStrategy {
        self.inner.strategy
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// Cached height, if it is not stale.
    pub fn current_block(&self) -> Option<U256> {
        *self.inner.current.borrow()
    }

    /// Cached height, or the next height the tracker observes.
    ///
    /// Runs the tracker for as long as it waits. Fails if the tracker cannot
    /// start; transient polling errors are waited out.
    pub async fn latest_block(&self) -> SdkResult<U256> {
        let mut listener = self.listen();
        if let Some(height) = self.current_block() {
            return Ok(height);
        }

        loop {
            match listener.recv().await {
                Ok(LifecycleEvent::Latest(height)) => return Ok(height),
                Ok(LifecycleEvent::Error(message)) if !self.is_running() => {
                    return Err(SdkError::Transport(message));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(height) = self.current_block() {
                        return Ok(height);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SdkError::Transport("Tracker event stream closed".into()));
                }
            }
        }
    }

    pub async fn start(&self) -> SdkResult<()> {
        self.inner.start().await
    }

    pub async fn stop(&self) -> SdkResult<()> {
        self.inner.stop().await
    }

    /// Attach a listener for `latest` / `sync` / `error` events.
    pub fn listen(&self) -> TrackerListener {
        let rx = self.inner.events.subscribe();
        if self.inner.listeners.fetch_add(1, Ordering::SeqCst) == 0 {
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.reconcile().await });
        }
        TrackerListener {
            rx,
            inner: self.inner.clone(),
        }
    }

    /// Observe events without counting as a listener.
    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.load(Ordering::SeqCst)
    }

    /// Feed a height observed elsewhere through the monotonic update rule.
    pub fn observe(&self, height: U256) -> bool {
        self.inner.new_potential_latest(height)
    }
}

impl std::fmt::Debug for BlockTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTracker")
            .field("strategy", &self.inner.strategy)
            .field("shard_id", &self.inner.shard_id)
            .field("running", &self.is_running())
            .field("current_block", &self.current_block())
            .finish()
    }
}

/// An attached tracker observer. Dropping the last one stops the tracker.
pub struct TrackerListener {
    rx: broadcast::Receiver<LifecycleEvent>,
    inner: Arc<TrackerInner>,
}

impl TrackerListener {
    pub async fn recv(&mut self) -> Result<LifecycleEvent, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

impl Drop for TrackerListener {
    fn drop(&mut self) {
        if self.inner.listeners.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let inner = self.inner.clone();
                handle.spawn(async move { inner.reconcile().await });
            }
        }
    }
}
