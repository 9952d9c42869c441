//! New-headers and pending-transactions subscriptions.

use alloy::primitives::U256;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::SdkResult;
use crate::messenger::Messenger;
use crate::rpc::parse_quantity;
use crate::subscription::base::Subscription;

/// Block number of a pushed header.
///
/// Accepts both the flat shape (`{"number": ...}`) and the nested shape
/// (`{"Header": {"number": ...}}`) some nodes push.
pub fn header_number(item: &Value) -> Option<U256> {
    item.get("number")
        .or_else(|| item.get("Header").and_then(|h| h.get("number")))
        .and_then(|n| parse_quantity(n).ok())
}

/// Live push of new block headers.
#[derive(Debug)]
pub struct NewHeaders {
    inner: Subscription,
}

impl NewHeaders {
    pub fn new(messenger: Arc<Messenger>, shard_id: Option<u32>) -> Self {
        Self {
            inner: Subscription::new(messenger, json!(["newHeads"]), shard_id),
        }
    }

    pub async fn start(&self) -> SdkResult<String> {
        self.inner.start().await
    }

    pub fn subscription(&self) -> &Subscription {
        &self.inner
    }
}

/// Live push of pending transaction hashes.
#[derive(Debug)]
pub struct PendingTransactions {
    inner: Subscription,
}

impl PendingTransactions {
    pub fn new(messenger: Arc<Messenger>, shard_id: Option<u32>) -> Self {
        Self {
            inner: Subscription::new(messenger, json!(["newPendingTransactions"]), shard_id),
        }
    }

    pub async fn start(&self) -> SdkResult<String> {
        self.inner.start().await
    }

    pub fn subscription(&self) -> &Subscription {
        &self.inner
    }
}
