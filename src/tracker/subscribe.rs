//! Push-based block tracking over a new-headers subscription.

use serde_json::json;
use std::sync::Arc;

use crate::error::SdkResult;
use crate::events::LifecycleEvent;
use crate::rpc::RpcMethod;
use crate::subscription::header_number;
use crate::tracker::base::{Running, TrackerInner};

/// Fetch the current height once, then follow pushed headers.
pub(crate) async fn spawn(inner: &Arc<TrackerInner>) -> SdkResult<Running> {
    let height = inner.fetch_block_number().await?;
    inner.new_potential_latest(height);

    let mut subscription = inner
        .messenger
        .subscribe(
            RpcMethod::Subscribe.as_str(),
            json!(["newHeads"]),
            None,
            inner.shard_id,
        )
        .await?;
    let subscription_id = subscription.id_watch();
    let weak = Arc::downgrade(inner);

    let handle = tokio::spawn(async move {
        while let Some(item) = subscription.recv().await {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match header_number(&item) {
                Some(height) => {
                    inner.new_potential_latest(height);
                }
                None => {
                    tracing::debug!(item = %item, "Pushed header without a number");
                    inner
                        .events
                        .emit(LifecycleEvent::Error("Pushed header without a number".into()));
                }
            }
        }

        if let Some(inner) = weak.upgrade() {
            tracing::warn!("New-headers subscription ended");
            inner
                .events
                .emit(LifecycleEvent::Error("New-headers subscription ended".into()));
        }
    });

    Ok(Running {
        handle,
        subscription_id: Some(subscription_id),
    })
}
