//! Subscription subsystem.
//!
//! # Data Flow
//! ```text
//! Subscription::start_with(handler)
//!     → Messenger::subscribe(<prefix>_subscribe, [name, ...filter])
//!     → relay task: feed item → handler.on_new_subscription_item → emit Data
//!
//! Persistent transport reconnects
//!     → record reissued, id re-keyed; the feed (and this relay) is unchanged
//! ```
//!
//! # Specializations
//! - `LogSubscription`: historical `getLogs` first, `changed` on removed logs
//! - `NewHeaders`, `PendingTransactions`: live push only
//! - `Syncing`: `changed` only on flag transitions

pub mod base;
pub mod logs;
pub mod new_headers;
pub mod syncing;

pub use base::{Identity, Subscription, SubscriptionHandler};
pub use logs::{LogHandler, LogSubscription};
pub use new_headers::{header_number, NewHeaders, PendingTransactions};
pub use syncing::{Syncing, SyncingHandler};
