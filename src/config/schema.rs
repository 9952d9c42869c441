//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::backoff::ReconnectPolicy;
use crate::rpc::ChainType;

/// Root configuration for a messenger and everything built on it.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SdkConfig {
    /// Node endpoints and chain identity.
    pub network: NetworkConfig,

    /// Transport timeouts and reconnect behavior.
    pub transport: TransportConfig,

    /// Block tracker pacing.
    pub tracker: TrackerConfig,

    /// Confirmation budget.
    pub confirmation: ConfirmationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node endpoints and chain identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Request/response endpoint (e.g., "http://localhost:9500").
    pub http_url: String,

    /// Persistent endpoint (e.g., "ws://localhost:9800").
    pub ws_url: Option<String>,

    /// Method-prefix family used when building JSON-RPC envelopes.
    pub chain_type: ChainType,

    /// Chain ID for EIP-155 replay protection.
    pub chain_id: u64,

    /// Shard used when the routing table cannot resolve a current shard.
    pub default_shard_id: Option<u32>,

    /// Optional HTTP basic-auth credentials.
    pub basic_auth: Option<BasicAuth>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_url: "http://localhost:9500".to_string(),
            ws_url: None,
            chain_type: ChainType::Harmony,
            chain_id: 2,
            default_shard_id: None,
            basic_auth: None,
        }
    }
}

/// HTTP basic-auth credentials injected into request/response calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-call timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Delay before a persistent transport reconnects, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Reconnect schedule.
    pub reconnect_policy: ReconnectPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 120_000,
            reconnect_delay_ms: 5_000,
            reconnect_policy: ReconnectPolicy::Fixed,
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Block tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Interval between successful polls, in milliseconds.
    pub polling_interval_ms: u64,

    /// Interval after a failed poll. Defaults to a tenth of the polling interval.
    pub retry_interval_ms: Option<u64>,

    /// Cached height is dropped if no update arrives within this window.
    pub stale_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            polling_interval_ms: 20_000,
            retry_interval_ms: None,
            stale_timeout_ms: 20_000,
        }
    }
}

impl TrackerConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(
            self.retry_interval_ms
                .unwrap_or(self.polling_interval_ms / 10),
        )
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

/// Confirmation budget.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Attempts (polls or pushed headers) before a transaction is rejected.
    pub max_attempts: u32,

    /// Sleep between polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
