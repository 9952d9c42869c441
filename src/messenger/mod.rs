//! Messenger subsystem.
//!
//! # Data Flow
//! ```text
//! send(method, params, prefix?, shard?)
//!     → rewrite method prefix to the chain type (or caller override)
//!     → shard.rs (routing table: shard id → transport, default fallback)
//!     → Transport::send / subscribe / unsubscribe
//! ```
//!
//! # Design Decisions
//! - The routing table changes only through `set_sharding` / `refresh_sharding`
//! - Table and per-shard transports are swapped atomically as a whole
//! - No process-wide default messenger; `Messenger::default_config` builds one

pub mod client;
pub mod shard;

pub use client::{Messenger, MessengerSubscription};
pub use shard::{ShardEntry, ShardingTable};
