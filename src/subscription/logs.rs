//! Log-filter subscription with an optional historical phase.

use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{SdkError, SdkResult};
use crate::events::{EventEmitter, LifecycleEvent};
use crate::messenger::Messenger;
use crate::rpc::{parse_quantity, RpcMethod};
use crate::subscription::base::{Subscription, SubscriptionHandler};

/// Emits `changed` for logs removed by a reorg.
#[derive(Debug, Default)]
pub struct LogHandler;

impl SubscriptionHandler for LogHandler {
    fn on_new_subscription_item(&mut self, item: Value, events: &EventEmitter) -> Value {
        if item.get("removed").and_then(Value::as_bool).unwrap_or(false) {
            events.emit(LifecycleEvent::Changed(item.clone()));
        }
        item
    }
}

/// Logs matching a filter, historical first when `fromBlock` asks for it.
#[derive(Debug)]
pub struct LogSubscription {
    filter: Map<String, Value>,
    history_pending: AtomicBool,
    inner: Subscription,
}

impl LogSubscription {
    /// `filter` is a log filter object (`address`, `topics`, `fromBlock`, ...).
    pub fn new(messenger: Arc<Messenger>, filter: Value, shard_id: Option<u32>) -> SdkResult<Self> {
        let Value::Object(filter) = filter else {
            return Err(SdkError::Malformed("Log filter must be an object".into()));
        };

        let history_pending = needs_history(filter.get("fromBlock"));
        let mut live = filter.clone();
        if history_pending {
            // Resubscription after a reconnect must not replay history.
            live.remove("fromBlock");
        }

        Ok(Self {
            filter,
            history_pending: AtomicBool::new(history_pending),
            inner: Subscription::new(messenger, json!(["logs", Value::Object(live)]), shard_id),
        })
    }

    /// Emit historical logs (once), then switch to live push.
    pub async fn start(&self) -> SdkResult<String> {
        // Cleared only once the history has been emitted, so a failed start retries it.
        if self.history_pending.load(Ordering::SeqCst) {
            let past = self
                .inner
                .messenger()
                .request(
                    RpcMethod::GetPastLogs,
                    json!([Value::Object(self.filter.clone())]),
                    self.inner.shard_id(),
                )
                .await?;

            let logs = match past {
                Value::Array(logs) => logs,
                Value::Null => Vec::new(),
                other => {
                    return Err(SdkError::Malformed(format!(
                        "Past logs must be an array, got {}",
                        other
                    )))
                }
            };

            tracing::debug!(count = logs.len(), "Emitting historical logs");
            let mut handler = LogHandler;
            let events = self.inner.emitter();
            for log in logs {
                let processed = handler.on_new_subscription_item(log, events);
                events.emit(LifecycleEvent::Data(processed));
            }
            self.history_pending.store(false, Ordering::SeqCst);
        }

        self.inner.start_with(LogHandler).await
    }

    pub fn subscription(&self) -> &Subscription {
        &self.inner
    }
}

/// History is fetched unless `fromBlock` is unset, `latest` or zero.
fn needs_history(from_block: Option<&Value>) -> bool {
    match from_block {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) if s == "latest" => false,
        Some(value) => !matches!(parse_quantity(value), Ok(n) if n.is_zero()),
    }
}
