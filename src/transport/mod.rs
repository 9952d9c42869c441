//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! RpcRequest
//!     → middleware.rs (request transforms for the method)
//!     → http.rs  (POST, basic auth, URL composition)   request/response
//!       ws.rs    (text frame, correlate by id)         persistent + push
//!     → middleware.rs (response transforms)
//!     → RpcResponse::from_raw (default wrapper)
//! ```
//!
//! # Design Decisions
//! - Callers branch on `supports_subscriptions()`, never on concrete type
//! - Every call races the configured timeout; nothing is retried here
//! - The persistent transport reconnects on its own and reissues in-flight
//!   requests and live subscriptions (at-least-once)

pub mod http;
pub mod middleware;
pub mod ws;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::{SdkError, SdkResult};
use crate::rpc::{RpcRequest, RpcResponse};

pub use http::HttpTransport;
pub use middleware::{MatchKey, MethodPattern, MiddlewareRegistry};
pub use ws::WsTransport;

/// Connection lifecycle notifications from a persistent transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// The connection dropped; live subscription ids are no longer valid.
    Disconnected,
    Reconnecting { attempt: u32, delay: Duration },
    /// A subscription record was reissued after reconnect.
    Resubscribed { old_id: String, new_id: String },
    /// A protocol-level failure that is not a connection loss.
    Error(String),
    /// The transport was shut down.
    Closed,
}

/// Common contract of both transports.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Endpoint this transport talks to.
    fn url(&self) -> &str;

    /// Whether `subscribe`/`unsubscribe` are available.
    fn supports_subscriptions(&self) -> bool {
        false
    }

    /// Middleware applied to every call.
    fn middleware(&self) -> &MiddlewareRegistry;

    /// Send one request and wait for its response.
    async fn send(&self, payload: RpcRequest) -> SdkResult<RpcResponse>;

    /// Issue a subscribe request and start routing its pushes.
    async fn subscribe(&self, _payload: RpcRequest) -> SdkResult<SubscriptionFeed> {
        Err(SdkError::Unsupported("subscribe"))
    }

    /// Issue an unsubscribe request for the id in `payload.params[0]`.
    async fn unsubscribe(&self, _payload: RpcRequest) -> SdkResult<bool> {
        Err(SdkError::Unsupported("unsubscribe"))
    }

    /// Stop routing pushes for a subscription without contacting the node.
    fn detach_subscription(&self, _key: u64) -> bool {
        false
    }

    /// Whether the subscription record `key` is still attached.
    fn has_subscription(&self, _key: u64) -> bool {
        false
    }

    /// Connection lifecycle notifications, if the transport has any.
    fn events(&self) -> Option<broadcast::Receiver<TransportEvent>> {
        None
    }
}

/// Consumer side of one subscription record.
///
/// The server-assigned id may change after a reconnect; the feed itself does
/// not, so consumers keep receiving items without doing anything.
#[derive(Debug)]
pub struct SubscriptionFeed {
    key: u64,
    id: watch::Receiver<String>,
    items: mpsc::UnboundedReceiver<Value>,
}

impl SubscriptionFeed {
    pub(crate) fn new(
        key: u64,
        id: watch::Receiver<String>,
        items: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self { key, id, items }
    }

    /// Stable local key of the subscription record.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Current server-assigned subscription id.
    pub fn id(&self) -> String {
        self.id.borrow().clone()
    }

    /// Watch the server-assigned id for re-keying.
    pub fn id_watch(&self) -> watch::Receiver<String> {
        self.id.clone()
    }

    /// Next pushed item, or `None` once the record is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.items.recv().await
    }
}
