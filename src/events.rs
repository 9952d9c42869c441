//! Lifecycle events shared by trackers, subscriptions and transactions.
//!
//! Every emitting object owns an [`EventEmitter`] backed by a broadcast
//! channel. Events are not buffered for late subscribers: attach a receiver
//! before starting the operation you want to observe.

use alloy::primitives::U256;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::transaction::TxStatus;

/// Default per-emitter channel capacity.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One confirmation attempt, as reported by `track` / `cxTrack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub tx_hash: String,
    pub attempt: u32,
    pub current_block: U256,
    pub shard_id: u32,
}

/// Every event the engine emits, tagged by name.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A new highest block height was observed.
    Latest(U256),
    /// The tracked sync window advanced.
    Sync { old: Option<U256>, new: U256 },
    /// A (processed) subscription item.
    Data(Value),
    Error(String),
    /// A subscription item signalled a state change (reorg removal, sync flip).
    Changed(Value),
    TransactionHash(String),
    Receipt(Value),
    Confirmation(TxStatus),
    Track(TrackInfo),
    CxReceipt(Value),
    CxConfirmation(TxStatus),
    CxTrack(TrackInfo),
}

impl LifecycleEvent {
    /// Wire-compatible event name.
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Latest(_) => "latest",
            LifecycleEvent::Sync { .. } => "sync",
            LifecycleEvent::Data(_) => "data",
            LifecycleEvent::Error(_) => "error",
            LifecycleEvent::Changed(_) => "changed",
            LifecycleEvent::TransactionHash(_) => "transactionHash",
            LifecycleEvent::Receipt(_) => "receipt",
            LifecycleEvent::Confirmation(_) => "confirmation",
            LifecycleEvent::Track(_) => "track",
            LifecycleEvent::CxReceipt(_) => "cxReceipt",
            LifecycleEvent::CxConfirmation(_) => "cxConfirmation",
            LifecycleEvent::CxTrack(_) => "cxTrack",
        }
    }
}

/// Broadcast-backed observer registration for one emitting object.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventEmitter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no observers is not an error.
    pub fn emit(&self, event: LifecycleEvent) {
        tracing::trace!(event = event.name(), "Emitting lifecycle event");
        let _ = self.tx.send(event);
    }

    /// Number of attached observers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}
