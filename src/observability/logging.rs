//! Structured logging.
//!
//! Installs a `tracing-subscriber` registry: an `EnvFilter` (the `RUST_LOG`
//! environment variable wins over the configured level) plus a fmt layer,
//! human-readable or JSON.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;
use crate::error::{SdkError, SdkResult};

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &ObservabilityConfig) -> SdkResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("shard_messenger={}", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| SdkError::Config(format!("Failed to install tracing subscriber: {}", e)))
}
