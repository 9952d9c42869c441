//! JSON-RPC request envelopes.
//!
//! Message ids come from one process-wide counter: they start at 0, only grow,
//! and are never reused. The persistent transport correlates responses by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for JSON-RPC message ids.
static MESSAGE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Allocate the next message id.
pub fn next_message_id() -> u64 {
    MESSAGE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Ordered JSON-RPC parameter list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Vec<Value>);

impl From<Value> for Params {
    /// `null` is an empty list, an array is used as the list, anything else
    /// becomes a single-element list.
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Params(Vec::new()),
            Value::Array(items) => Params(items),
            other => Params(vec![other]),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(items: Vec<Value>) -> Self {
        Params(items)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params(Vec::new())
    }
}

impl From<&str> for Params {
    fn from(s: &str) -> Self {
        Params(vec![Value::String(s.to_string())])
    }
}

impl<T: Into<Params>> From<Option<T>> for Params {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Build a request with a freshly allocated id.
    pub fn new(method: impl Into<String>, params: impl Into<Params>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: next_message_id(),
            method: method.into(),
            params: params.into().0,
        }
    }

    /// Re-stamp this request with a new id, keeping method and params.
    pub fn with_fresh_id(mut self) -> Self {
        self.id = next_message_id();
        self
    }
}

/// Shorthand for [`RpcRequest::new`].
pub fn to_payload(method: &str, params: impl Into<Params>) -> RpcRequest {
    RpcRequest::new(method, params)
}
