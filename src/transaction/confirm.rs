//! Confirmation state machine.
//!
//! # Data Flow
//! ```text
//! confirm()
//!     → direct phase on shardID      (poll or push, by transport capability)
//!     → if CONFIRMED and shardID != toShardID:
//!         cross phase on toShardID   (same algorithm, cx* events, cxStatus)
//!
//! poll:  record height → loop attempts { blockNumber → advanced? → track → receipt? } sleep
//! push:  receipt? → subscribe(newHeads) → per unseen header: track → receipt?
//! ```
//!
//! # Invariants
//! - Every attempt emits exactly one track event
//! - A terminal status is set, and its confirmation event emitted, before
//!   any error is returned
//! - The push path always unsubscribes before returning

use alloy::primitives::U256;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::config::ConfirmationConfig;
use crate::error::{SdkError, SdkResult};
use crate::events::{LifecycleEvent, TrackInfo};
use crate::observability::metrics;
use crate::subscription::{header_number, NewHeaders};
use crate::transaction::status::TxStatus;
use crate::transaction::record::{receipt_status, Phase, Transaction};

impl Transaction {
    /// Wait for the receipt, then for the cross-shard receipt if needed.
    ///
    /// Returns the status of the last phase that ran. Exhausting the attempt
    /// budget sets `REJECTED`, emits the confirmation and then fails.
    pub async fn confirm(&mut self) -> SdkResult<TxStatus> {
        let budget = self.confirmation;
        self.confirm_with(budget).await
    }

    pub async fn confirm_with(&mut self, budget: ConfirmationConfig) -> SdkResult<TxStatus> {
        let direct = self.confirm_phase(Phase::Direct, budget).await?;
        if !self.is_cross_shard() || direct != TxStatus::Confirmed {
            return Ok(direct);
        }
        self.confirm_phase(Phase::Cross, budget).await
    }

    /// Run one phase with the strategy the phase's shard supports.
    pub async fn confirm_phase(
        &mut self,
        phase: Phase,
        budget: ConfirmationConfig,
    ) -> SdkResult<TxStatus> {
        let shard_id = self.phase_shard(phase);
        let push = match self.messenger() {
            Ok(messenger) => messenger.supports_subscriptions(Some(shard_id)),
            Err(e) => return Err(self.fail(phase, e)),
        };
        tracing::info!(
            tx_hash = %self.hash_or_empty(),
            phase = phase.as_str(),
            shard_id,
            push,
            max_attempts = budget.max_attempts,
            "Confirming"
        );

        self.set_status(phase, TxStatus::Pending);
        if push {
            self.push_confirm(phase, budget).await
        } else {
            self.poll_confirm(phase, budget).await
        }
    }

    async fn poll_confirm(&mut self, phase: Phase, budget: ConfirmationConfig) -> SdkResult<TxStatus> {
        let shard_id = self.phase_shard(phase);
        let interval = Duration::from_millis(budget.interval_ms);
        let mut checked = match self.block_number(shard_id).await {
            Ok(block) => block,
            Err(e) => return Err(self.fail(phase, e)),
        };

        for attempt in 0..budget.max_attempts {
            let new_block = match self.block_number(shard_id).await {
                Ok(block) => block,
                Err(e) => return Err(self.fail(phase, e)),
            };

            // The first check only needs "not less than"; later ones need a fresh block.
            let advanced = if attempt == 0 {
                new_block >= checked
            } else {
                new_block >= checked + U256::from(1)
            };

            if advanced {
                checked = new_block;
                self.track(phase, attempt, new_block);
                match self.check_receipt(phase).await {
                    Ok(Some(status)) => return Ok(status),
                    Ok(None) => {}
                    Err(e) => return Err(self.fail(phase, e)),
                }
            } else {
                tracing::trace!(attempt, block = %new_block, recorded = %checked, "Block has not advanced");
                if attempt == 0 {
                    continue;
                }
            }

            if attempt + 1 < budget.max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        Err(self.exhaust(phase, budget.max_attempts))
    }

    async fn push_confirm(&mut self, phase: Phase, budget: ConfirmationConfig) -> SdkResult<TxStatus> {
        match self.check_receipt(phase).await {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => return Err(self.fail(phase, e)),
        }

        let messenger = match self.messenger() {
            Ok(messenger) => messenger,
            Err(e) => return Err(self.fail(phase, e)),
        };
        let heads = NewHeaders::new(messenger, Some(self.phase_shard(phase)));
        let mut events = heads.subscription().events();
        if let Err(e) = heads.start().await {
            return Err(self.fail(phase, e));
        }

        let result = self.follow_heads(phase, budget, &mut events).await;

        if let Err(e) = heads.subscription().unsubscribe().await {
            tracing::debug!(error = %e, "Unsubscribing new heads failed");
        }
        result
    }

    async fn follow_heads(
        &mut self,
        phase: Phase,
        budget: ConfirmationConfig,
        events: &mut tokio::sync::broadcast::Receiver<LifecycleEvent>,
    ) -> SdkResult<TxStatus> {
        let mut seen: HashSet<U256> = HashSet::new();
        let mut attempt = 0u32;

        while attempt < budget.max_attempts {
            let header = match events.recv().await {
                Ok(LifecycleEvent::Data(header)) => header,
                Ok(LifecycleEvent::Error(message)) => {
                    return Err(self.fail(phase, SdkError::Transport(message)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Header events lagged");
                    continue;
                }
                Err(RecvError::Closed) => {
                    let error = SdkError::Transport("Header stream closed".into());
                    return Err(self.fail(phase, error));
                }
            };

            let Some(number) = header_number(&header) else {
                tracing::debug!(header = %header, "Header without a number");
                continue;
            };
            if !seen.insert(number) {
                continue;
            }

            self.track(phase, attempt, number);
            match self.check_receipt(phase).await {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => attempt += 1,
                Err(e) => return Err(self.fail(phase, e)),
            }
        }

        Err(self.exhaust(phase, budget.max_attempts))
    }

    fn track(&self, phase: Phase, attempt: u32, block: U256) {
        let info = TrackInfo {
            tx_hash: self.hash_or_empty(),
            attempt,
            current_block: block,
            shard_id: self.phase_shard(phase),
        };
        tracing::debug!(
            tx_hash = %info.tx_hash,
            phase = phase.as_str(),
            attempt,
            block = %block,
            shard_id = info.shard_id,
            "Confirmation attempt"
        );
        self.emit(match phase {
            Phase::Direct => LifecycleEvent::Track(info),
            Phase::Cross => LifecycleEvent::CxTrack(info),
        });
    }

    /// `Some(terminal status)` once the receipt exists.
    ///
    /// A JSON-RPC error is reported as an error event and counts as "not yet".
    async fn check_receipt(&mut self, phase: Phase) -> SdkResult<Option<TxStatus>> {
        let receipt = match self.fetch_receipt(phase).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return Ok(None),
            Err(SdkError::Rpc { code, message }) => {
                tracing::debug!(code, message = %message, "Receipt query returned an error");
                self.emit(LifecycleEvent::Error(message));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let status = match phase {
            Phase::Direct => receipt_status(&receipt),
            Phase::Cross => TxStatus::Confirmed,
        };

        self.set_receipt(phase, receipt.clone());
        self.emit(receipt_event(phase, receipt));
        self.finish(phase, status);
        Ok(Some(status))
    }

    fn finish(&mut self, phase: Phase, status: TxStatus) {
        self.set_status(phase, status);
        metrics::record_confirmation(phase.as_str(), status);
        tracing::info!(tx_hash = %self.hash_or_empty(), phase = phase.as_str(), status = %status, "Confirmation finished");
        self.emit(match phase {
            Phase::Direct => LifecycleEvent::Confirmation(status),
            Phase::Cross => LifecycleEvent::CxConfirmation(status),
        });
    }

    fn fail(&mut self, phase: Phase, error: SdkError) -> SdkError {
        tracing::warn!(phase = phase.as_str(), error = %error, "Confirmation failed");
        self.finish(phase, TxStatus::Rejected);
        self.emit(LifecycleEvent::Error(error.to_string()));
        error
    }

    fn exhaust(&mut self, phase: Phase, attempts: u32) -> SdkError {
        self.finish(phase, TxStatus::Rejected);
        SdkError::ConfirmationExhausted {
            attempts,
            phase: phase.as_str(),
        }
    }
}

fn receipt_event(phase: Phase, receipt: Value) -> LifecycleEvent {
    match phase {
        Phase::Direct => LifecycleEvent::Receipt(receipt),
        Phase::Cross => LifecycleEvent::CxReceipt(receipt),
    }
}
