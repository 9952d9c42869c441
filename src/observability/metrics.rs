//! Metrics collection.
//!
//! # Metrics
//! - `shard_rpc_requests_total` (counter): transport calls by method, outcome
//! - `shard_ws_reconnects_total` (counter): persistent transport reconnects
//! - `shard_subscriptions_active` (gauge): live subscription records
//! - `shard_confirmations_total` (counter): terminal confirmations by phase, status
//!
//! Recorded through the `metrics` facade; installing an exporter is left to
//! the embedding application.

use crate::transaction::TxStatus;

pub fn record_rpc_request(method: &str, outcome: &'static str) {
    metrics::counter!(
        "shard_rpc_requests_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_reconnect() {
    metrics::counter!("shard_ws_reconnects_total").increment(1);
}

pub fn record_active_subscriptions(count: usize) {
    metrics::gauge!("shard_subscriptions_active").set(count as f64);
}

pub fn record_confirmation(phase: &'static str, status: TxStatus) {
    metrics::counter!(
        "shard_confirmations_total",
        "phase" => phase,
        "status" => status.as_str()
    )
    .increment(1);
}
