//! Sync-status subscription.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::SdkResult;
use crate::events::{EventEmitter, LifecycleEvent};
use crate::messenger::Messenger;
use crate::subscription::base::{Subscription, SubscriptionHandler};

/// Emits `changed` only when the syncing flag flips.
#[derive(Debug, Default)]
pub struct SyncingHandler {
    is_syncing: Option<bool>,
}

impl SyncingHandler {
    pub fn is_syncing(&self) -> Option<bool> {
        self.is_syncing
    }
}

impl SubscriptionHandler for SyncingHandler {
    fn on_new_subscription_item(&mut self, item: Value, events: &EventEmitter) -> Value {
        let syncing = item
            .get("syncing")
            .and_then(Value::as_bool)
            .or_else(|| item.as_bool());

        if let Some(syncing) = syncing {
            if self.is_syncing != Some(syncing) {
                self.is_syncing = Some(syncing);
                events.emit(LifecycleEvent::Changed(Value::Bool(syncing)));
            }
        }
        item
    }
}

/// Node sync status.
#[derive(Debug)]
pub struct Syncing {
    inner: Subscription,
}

impl Syncing {
    pub fn new(messenger: Arc<Messenger>, shard_id: Option<u32>) -> Self {
        Self {
            inner: Subscription::new(messenger, json!(["syncing"]), shard_id),
        }
    }

    pub async fn start(&self) -> SdkResult<String> {
        self.inner.start_with(SyncingHandler::default()).await
    }

    pub fn subscription(&self) -> &Subscription {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_only_on_transitions() {
        let events = EventEmitter::new();
        let mut rx = events.subscribe();
        let mut handler = SyncingHandler::default();

        for syncing in [true, true, false, false, true] {
            handler.on_new_subscription_item(json!({"syncing": syncing}), &events);
        }

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                LifecycleEvent::Changed(json!(true)),
                LifecycleEvent::Changed(json!(false)),
                LifecycleEvent::Changed(json!(true)),
            ]
        );
        assert_eq!(handler.is_syncing(), Some(true));
    }

    #[test]
    fn test_bare_boolean_push() {
        let events = EventEmitter::new();
        let mut rx = events.subscribe();
        let mut handler = SyncingHandler::default();

        handler.on_new_subscription_item(json!(false), &events);
        assert_eq!(rx.try_recv().unwrap(), LifecycleEvent::Changed(json!(false)));
    }
}
