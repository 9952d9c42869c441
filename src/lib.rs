//! Sharded blockchain client engine.
//!
//! # Architecture Overview
//!
//! ```text
//!   Transaction ──┐          BlockTracker ──┐       Subscription ──┐
//!   (confirm)     │          (latest/sync)  │       (data/changed) │
//!                 ▼                         ▼                      ▼
//!          ┌──────────────────────────────────────────────────────────┐
//!          │ Messenger: method prefix rewrite, shard routing table     │
//!          └───────────────┬──────────────────────────┬───────────────┘
//!                          ▼                          ▼
//!                 ┌─────────────────┐        ┌─────────────────┐
//!                 │ HttpTransport   │        │ WsTransport     │
//!                 │ request/reply   │        │ push, reconnect │
//!                 └─────────────────┘        └─────────────────┘
//!                      middleware pipeline around every call
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod messenger;
pub mod observability;
pub mod resilience;
pub mod rpc;
pub mod subscription;
pub mod tracker;
pub mod transaction;
pub mod transport;

pub use config::SdkConfig;
pub use error::{SdkError, SdkResult};
pub use events::{EventEmitter, LifecycleEvent, TrackInfo};
pub use messenger::{Messenger, MessengerSubscription, ShardingTable};
pub use tracker::BlockTracker;
pub use transaction::{Transaction, TransactionFactory, TransactionParams, TxStatus, Wallet};
pub use transport::{HttpTransport, Transport, WsTransport};
