//! Reconnect scheduling for persistent transports.
//!
//! The default schedule is a fixed delay. An exponential schedule with jitter
//! is available as an opt-in through configuration.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a persistent transport waits before reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Always wait the configured base delay.
    #[default]
    Fixed,
    /// Double the base delay per consecutive failure, capped, with up to 10% jitter.
    Exponential { max_delay_ms: u64 },
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32, base_ms: u64) -> Duration {
        match self {
            ReconnectPolicy::Fixed => Duration::from_millis(base_ms),
            ReconnectPolicy::Exponential { max_delay_ms } => {
                calculate_backoff(attempt, base_ms, *max_delay_ms)
            }
        }
    }
}

/// Calculate exponential backoff delay with jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}
