//! Poll-based block tracking.

use std::sync::{Arc, Weak};

use crate::events::LifecycleEvent;
use crate::tracker::base::{Running, TrackerInner};

/// Start the polling loop.
///
/// The loop holds only a weak reference and exits when the tracker is
/// dropped or its running flag clears.
pub(crate) fn spawn(inner: &Arc<TrackerInner>) -> Running {
    let weak = Arc::downgrade(inner);
    let running = inner.running_watch();
    Running {
        handle: tokio::spawn(run(weak, running)),
        subscription_id: None,
    }
}

async fn run(weak: Weak<TrackerInner>, mut running: tokio::sync::watch::Receiver<bool>) {
    let mut tick = 0u64;
    loop {
        if !*running.borrow() {
            break;
        }
        let Some(inner) = weak.upgrade() else {
            break;
        };

        tick += 1;
        let wait = match inner.fetch_block_number().await {
            Ok(height) => {
                tracing::trace!(tick, block = %height, "Polled block number");
                inner.new_potential_latest(height);
                inner.polling_interval
            }
            Err(e) => {
                tracing::warn!(tick, error = %e, "Block number poll failed");
                inner.events.emit(LifecycleEvent::Error(e.to_string()));
                inner.retry_interval
            }
        };
        drop(inner);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = running.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(tick, "Polling loop ended");
}
