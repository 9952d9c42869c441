//! JSON-RPC responses and the default response wrapper.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SdkError, SdkResult};

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A wrapped JSON-RPC response.
///
/// Exactly one of `result`/`error` is expected; anything else is kept as `Raw`.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Result { id: Option<u64>, result: Value },
    Error { id: Option<u64>, error: RpcErrorObject },
    Raw(Value),
}

impl RpcResponse {
    /// Wrap a raw response into a typed result/error/raw value.
    pub fn from_raw(raw: Value) -> Self {
        let id = raw.get("id").and_then(Value::as_u64);
        let result = raw.get("result");
        let error = raw.get("error").filter(|e| !e.is_null());

        match (result, error) {
            (Some(result), None) => RpcResponse::Result {
                id,
                result: result.clone(),
            },
            (None, Some(error)) => match serde_json::from_value::<RpcErrorObject>(error.clone()) {
                Ok(error) => RpcResponse::Error { id, error },
                Err(_) => RpcResponse::Raw(raw),
            },
            _ => RpcResponse::Raw(raw),
        }
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            RpcResponse::Result { id, .. } | RpcResponse::Error { id, .. } => *id,
            RpcResponse::Raw(raw) => raw.get("id").and_then(Value::as_u64),
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, RpcResponse::Result { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RpcResponse::Error { .. })
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, RpcResponse::Raw(_))
    }

    /// Borrow the result value, if any.
    pub fn result(&self) -> Option<&Value> {
        match self {
            RpcResponse::Result { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Convert to a `Result`, turning a JSON-RPC error into [`SdkError::Rpc`].
    /// Raw responses are returned as-is.
    pub fn into_result(self) -> SdkResult<Value> {
        match self {
            RpcResponse::Result { result, .. } => Ok(result),
            RpcResponse::Error { error, .. } => Err(SdkError::Rpc {
                code: error.code,
                message: error.message,
            }),
            RpcResponse::Raw(raw) => Ok(raw),
        }
    }

    /// Deserialize the result into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> SdkResult<T> {
        let value = self.into_result()?;
        Ok(serde_json::from_value(value)?)
    }
}
