//! Local key holder and digest signing.
//!
//! # Security
//! - Private keys are loaded from a hex string or an environment variable
//! - Keys are never logged or serialized

use alloy::primitives::{hex, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, Signer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{SdkError, SdkResult};
use crate::messenger::Messenger;
use crate::rpc::{parse_quantity, RpcMethod};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "SHARD_PRIVATE_KEY";

/// Signs transaction digests with a secp256k1 key and tracks the next nonce.
#[derive(Debug, Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
    nonce: Arc<AtomicU64>,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key (with or without `0x`).
    pub fn from_private_key(private_key_hex: &str) -> SdkResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| SdkError::Signing(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Wallet initialized");

        Ok(Self {
            signer,
            nonce: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Load the key from `SHARD_PRIVATE_KEY`.
    pub fn from_env() -> SdkResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            SdkError::Signing(format!("Environment variable {} not set", PRIVATE_KEY_ENV_VAR))
        })?;

        Self::from_private_key(&private_key)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get and increment the nonce atomically.
    pub fn get_and_increment_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn current_nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    /// Load the account's transaction count on `shard_id` as the next nonce.
    pub async fn sync_nonce(&self, messenger: &Messenger, shard_id: Option<u32>) -> SdkResult<u64> {
        let count = messenger
            .request(
                RpcMethod::GetTransactionCount,
                serde_json::json!([hex::encode_prefixed(self.address()), "latest"]),
                shard_id,
            )
            .await?;
        let nonce = u64::try_from(parse_quantity(&count)?)
            .map_err(|_| SdkError::Malformed("Transaction count out of range".into()))?;

        self.set_nonce(nonce);
        tracing::debug!(address = %self.address(), nonce, "Nonce synchronized");
        Ok(nonce)
    }

    /// Sign a 32-byte digest.
    pub async fn sign_hash(&self, hash: B256) -> SdkResult<Signature> {
        self.signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SdkError::Signing(format!("Signing failed: {}", e)))
    }
}
