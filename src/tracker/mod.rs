//! Block tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Polling:       loop { blockNumber → compare → sleep(polling | retry) }
//! Subscription:  blockNumber once → subscribe(newHeads) → compare per push
//!
//! compare: height > cached  →  emit Latest(height), Sync { old, new }
//!                              re-arm stale timer (clears the cache)
//! ```
//!
//! # Design Decisions
//! - Heights are compared as `U256`, never as strings
//! - Listener guards drive start/stop so no loop outlives its consumers
//! - Background tasks hold weak references to the tracker

pub mod base;
pub(crate) mod polling;
pub(crate) mod subscribe;

pub use base::{BlockTracker, TrackerListener, TrackerStrategy};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LifecycleEvent;
    use crate::messenger::Messenger;
    use crate::rpc::ChainType;
    use crate::transport::HttpTransport;
    use alloy::primitives::U256;
    use std::sync::Arc;

    fn tracker() -> BlockTracker {
        let messenger = Arc::new(Messenger::new(
            Arc::new(HttpTransport::new("http://127.0.0.1:1")),
            ChainType::Harmony,
        ));
        BlockTracker::polling(messenger, None)
    }

    #[tokio::test]
    async fn test_monotonic_latest() {
        let tracker = tracker();

        assert!(tracker.observe(U256::from(0x10)));
        assert!(!tracker.observe(U256::from(0x10)));
        assert!(!tracker.observe(U256::from(0x0f)));
        assert!(tracker.observe(U256::from(0x11)));
        assert_eq!(tracker.current_block(), Some(U256::from(0x11)));
    }

    #[tokio::test]
    async fn test_sync_carries_previous_height() {
        let tracker = tracker();
        tracker.observe(U256::from(1));

        let mut rx = tracker.events();
        tracker.observe(U256::from(2));

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Latest(U256::from(2)));
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Sync {
                old: Some(U256::from(1)),
                new: U256::from(2)
            }
        );
    }

    #[tokio::test]
    async fn test_subscription_strategy_needs_push_transport() {
        let messenger = Arc::new(Messenger::new(
            Arc::new(HttpTransport::new("http://127.0.0.1:1")),
            ChainType::Harmony,
        ));
        let tracker = BlockTracker::for_messenger(messenger, None);
        assert_eq!(tracker.strategy(), TrackerStrategy::Polling);
    }
}
