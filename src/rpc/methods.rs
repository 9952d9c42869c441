//! Method names and chain-prefix handling.
//!
//! Methods use two-part `prefix_name` naming. Names here carry the `hmy`
//! prefix; the messenger rewrites the prefix to its own chain type.

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Method-prefix family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
pub enum ChainType {
    #[default]
    #[serde(rename = "hmy")]
    Harmony,
    #[serde(rename = "eth")]
    Ethereum,
}

impl ChainType {
    pub fn prefix(&self) -> &'static str {
        match self {
            ChainType::Harmony => "hmy",
            ChainType::Ethereum => "eth",
        }
    }
}

/// Methods the engine itself issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    BlockNumber,
    GetBlockByNumber,
    GetTransactionReceipt,
    GetCxReceiptByHash,
    SendRawTransaction,
    GetTransactionCount,
    GetShardingStructure,
    GetPastLogs,
    Subscribe,
    Unsubscribe,
}

impl RpcMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::BlockNumber => "hmy_blockNumber",
            RpcMethod::GetBlockByNumber => "hmy_getBlockByNumber",
            RpcMethod::GetTransactionReceipt => "hmy_getTransactionReceipt",
            RpcMethod::GetCxReceiptByHash => "hmy_getCXReceiptByHash",
            RpcMethod::SendRawTransaction => "hmy_sendRawTransaction",
            RpcMethod::GetTransactionCount => "hmy_getTransactionCount",
            RpcMethod::GetShardingStructure => "hmy_getShardingStructure",
            RpcMethod::GetPastLogs => "hmy_getLogs",
            RpcMethod::Subscribe => "hmy_subscribe",
            RpcMethod::Unsubscribe => "hmy_unsubscribe",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rewrite `method` so that it carries `prefix`.
///
/// `hmy_blockNumber` with prefix `eth` becomes `eth_blockNumber`; a bare
/// `blockNumber` becomes `eth_blockNumber`; an already-matching method is
/// returned unchanged.
pub fn set_rpc_prefix(method: &str, prefix: &str) -> SdkResult<String> {
    if method.is_empty() || prefix.is_empty() || prefix.contains('_') {
        return Err(SdkError::InvalidPrefix(format!(
            "method '{}' with prefix '{}'",
            method, prefix
        )));
    }

    match method.split_once('_') {
        Some((current, name)) if !name.is_empty() => {
            if current == prefix {
                Ok(method.to_string())
            } else {
                Ok(format!("{}_{}", prefix, name))
            }
        }
        Some(_) => Err(SdkError::InvalidPrefix(format!("method '{}' has no name", method))),
        None => Ok(format!("{}_{}", prefix, method)),
    }
}
