//! Transaction record: build, sign, broadcast, receipts.

use alloy::primitives::{hex, keccak256, Address, Bytes, B256, U256};
use alloy::signers::Signature;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;

use crate::config::ConfirmationConfig;
use crate::error::{SdkError, SdkResult};
use crate::events::{EventEmitter, LifecycleEvent};
use crate::messenger::Messenger;
use crate::rpc::{parse_quantity, RpcMethod, RpcResponse};
use crate::transaction::codec::{self, Trailer, TxFields};
use crate::transaction::status::TxStatus;
use crate::transaction::wallet::Wallet;

/// Caller-supplied transaction fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionParams {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub shard_id: u32,
    pub to_shard_id: u32,
    /// `None` deploys a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    /// Chain id for EIP-155; the messenger's chain id when unset.
    pub chain_id: Option<u64>,
}

impl TransactionParams {
    fn fields(&self) -> TxFields {
        TxFields {
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            shard_id: self.shard_id,
            to_shard_id: self.to_shard_id,
            to: self.to,
            value: self.value,
            data: self.data.clone(),
        }
    }
}

/// Which receipt a confirmation phase is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The receipt on the sending shard.
    Direct,
    /// The cross-shard receipt on the receiving shard.
    Cross,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Direct => "direct-shard",
            Phase::Cross => "cross-shard",
        }
    }
}

/// One transaction and its lifecycle.
///
/// Holds the messenger weakly: once the messenger is dropped, network
/// operations fail with [`SdkError::MessengerNotFound`].
pub struct Transaction {
    messenger: Weak<Messenger>,
    params: TransactionParams,
    from: Option<Address>,
    signature: Option<Signature>,
    raw: Option<Bytes>,
    unsigned_raw: Bytes,
    id: Option<String>,
    receipt: Option<Value>,
    cx_receipt: Option<Value>,
    tx_status: TxStatus,
    cx_status: TxStatus,
    status_history: Vec<TxStatus>,
    cx_status_history: Vec<TxStatus>,
    pub(crate) confirmation: ConfirmationConfig,
    events: EventEmitter,
}

impl Transaction {
    pub fn new(messenger: &Arc<Messenger>, mut params: TransactionParams) -> Self {
        params.chain_id.get_or_insert(messenger.chain_id());
        let unsigned_raw = encode_unsigned(&params);

        let mut tx = Self {
            messenger: Arc::downgrade(messenger),
            params,
            from: None,
            signature: None,
            raw: None,
            unsigned_raw,
            id: None,
            receipt: None,
            cx_receipt: None,
            tx_status: TxStatus::None,
            cx_status: TxStatus::None,
            status_history: Vec::new(),
            cx_status_history: Vec::new(),
            confirmation: messenger.config().confirmation,
            events: EventEmitter::new(),
        };
        tx.set_status(Phase::Direct, TxStatus::Initialized);
        tx
    }

    /// Rebuild a signed transaction from its raw bytes.
    pub fn recover(messenger: &Arc<Messenger>, raw: &[u8]) -> SdkResult<Self> {
        let (fields, trailer) = codec::decode(raw)?;
        let Trailer::Signature { v, r, s } = trailer else {
            return Err(SdkError::InvalidRawTransaction("transaction is not signed".into()));
        };

        let chain_id = trailer.chain_id();
        let signature = Signature::new(r, s, codec::parity_from_v(v)?);
        let unsigned_trailer = chain_id.map_or(Trailer::None, Trailer::ChainId);
        let unsigned_raw = codec::encode(&fields, unsigned_trailer);
        let from = signature
            .recover_address_from_prehash(&keccak256(&unsigned_raw))
            .map_err(|e| SdkError::InvalidRawTransaction(format!("unrecoverable signature: {}", e)))?;

        let params = TransactionParams {
            nonce: fields.nonce,
            gas_price: fields.gas_price,
            gas_limit: fields.gas_limit,
            shard_id: fields.shard_id,
            to_shard_id: fields.to_shard_id,
            to: fields.to,
            value: fields.value,
            data: fields.data,
            chain_id,
        };

        let mut tx = Self::new(messenger, params);
        // Legacy signatures carry no chain id; keep it that way.
        tx.params.chain_id = chain_id;
        tx.unsigned_raw = Bytes::from(unsigned_raw);
        tx.from = Some(from);
        tx.signature = Some(signature);
        tx.raw = Some(Bytes::copy_from_slice(raw));
        tx.id = Some(hex::encode_prefixed(keccak256(raw)));
        tx.set_status(Phase::Direct, TxStatus::Signed);
        Ok(tx)
    }

    pub(crate) fn messenger(&self) -> SdkResult<Arc<Messenger>> {
        self.messenger.upgrade().ok_or(SdkError::MessengerNotFound)
    }

    pub fn params(&self) -> &TransactionParams {
        &self.params
    }

    pub fn from(&self) -> Option<Address> {
        self.from
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    /// Transaction hash, once signed or broadcast.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Signed wire bytes.
    pub fn raw(&self) -> Option<&Bytes> {
        self.raw.as_ref()
    }

    /// Bytes whose keccak hash is signed.
    pub fn unsigned_raw(&self) -> &Bytes {
        &self.unsigned_raw
    }

    pub fn receipt(&self) -> Option<&Value> {
        self.receipt.as_ref()
    }

    pub fn cx_receipt(&self) -> Option<&Value> {
        self.cx_receipt.as_ref()
    }

    pub fn tx_status(&self) -> TxStatus {
        self.tx_status
    }

    pub fn cx_status(&self) -> TxStatus {
        self.cx_status
    }

    /// Every status the transaction went through, in order.
    pub fn status_history(&self) -> &[TxStatus] {
        &self.status_history
    }

    pub fn cx_status_history(&self) -> &[TxStatus] {
        &self.cx_status_history
    }

    pub fn is_cross_shard(&self) -> bool {
        self.params.shard_id != self.params.to_shard_id
    }

    pub fn is_initialized(&self) -> bool {
        self.tx_status == TxStatus::Initialized
    }

    pub fn is_signed(&self) -> bool {
        self.tx_status == TxStatus::Signed
    }

    pub fn is_pending(&self) -> bool {
        self.tx_status == TxStatus::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.tx_status == TxStatus::Confirmed
    }

    pub fn is_rejected(&self) -> bool {
        self.tx_status == TxStatus::Rejected
    }

    pub fn is_cx_confirmed(&self) -> bool {
        self.cx_status == TxStatus::Confirmed
    }

    /// Budget used by [`Transaction::confirm`].
    pub fn set_confirmation(&mut self, confirmation: ConfirmationConfig) {
        self.confirmation = confirmation;
    }

    /// Attach an observer. Events are not replayed; attach before acting.
    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: LifecycleEvent) {
        self.events.emit(event);
    }

    pub(crate) fn set_status(&mut self, phase: Phase, status: TxStatus) {
        tracing::debug!(phase = phase.as_str(), status = %status, tx_hash = ?self.id, "Status change");
        match phase {
            Phase::Direct => {
                self.tx_status = status;
                self.status_history.push(status);
            }
            Phase::Cross => {
                self.cx_status = status;
                self.cx_status_history.push(status);
            }
        }
    }

    pub(crate) fn set_receipt(&mut self, phase: Phase, receipt: Value) {
        match phase {
            Phase::Direct => {
                if let Some(hash) = receipt.get("transactionHash").and_then(Value::as_str) {
                    self.id = Some(hash.to_string());
                }
                self.receipt = Some(receipt);
            }
            Phase::Cross => self.cx_receipt = Some(receipt),
        }
    }

    /// Sign with `wallet`, moving to `SIGNED`.
    pub async fn sign(&mut self, wallet: &Wallet) -> SdkResult<()> {
        let chain_id = self.params.chain_id.unwrap_or_default();
        let digest = keccak256(&self.unsigned_raw);
        let signature = wallet.sign_hash(digest).await?;

        let raw = codec::encode(
            &self.params.fields(),
            Trailer::Signature {
                v: codec::eip155_v(chain_id, signature.v())?,
                r: signature.r(),
                s: signature.s(),
            },
        );

        self.id = Some(hex::encode_prefixed(keccak256(&raw)));
        self.raw = Some(Bytes::from(raw));
        self.signature = Some(signature);
        self.from = Some(wallet.address());
        self.set_status(Phase::Direct, TxStatus::Signed);

        tracing::info!(tx_hash = ?self.id, from = %wallet.address(), "Transaction signed");
        Ok(())
    }

    /// Broadcast to the sending shard, moving to `PENDING`.
    ///
    /// A rejected broadcast moves to `REJECTED` and emits the confirmation.
    pub async fn send(&mut self) -> SdkResult<String> {
        let raw = self.raw.as_ref().ok_or(SdkError::NotSigned)?;
        let messenger = self.messenger()?;
        let raw_hex = hex::encode_prefixed(raw);

        let response = match messenger
            .send(
                RpcMethod::SendRawTransaction.as_str(),
                json!([raw_hex]),
                None,
                Some(self.params.shard_id),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.reject_broadcast(&e);
                return Err(e);
            }
        };

        match response {
            RpcResponse::Result { result: Value::String(hash), .. } => {
                tracing::info!(tx_hash = %hash, shard_id = self.params.shard_id, "Transaction broadcast");
                self.id = Some(hash.clone());
                self.emit(LifecycleEvent::TransactionHash(hash.clone()));
                self.set_status(Phase::Direct, TxStatus::Pending);
                Ok(hash)
            }
            other => {
                let error = match other.into_result() {
                    Err(e) => e,
                    Ok(v) => SdkError::Malformed(format!("Unexpected broadcast result: {}", v)),
                };
                self.reject_broadcast(&error);
                Err(error)
            }
        }
    }

    fn reject_broadcast(&mut self, error: &SdkError) {
        tracing::warn!(error = %error, "Broadcast failed");
        self.set_status(Phase::Direct, TxStatus::Rejected);
        self.emit(LifecycleEvent::Error(format!("transaction failed: {}", error)));
        self.emit(LifecycleEvent::Confirmation(TxStatus::Rejected));
    }

    /// Ask the sending shard for the receipt.
    pub async fn get_receipt(&self) -> SdkResult<Option<Value>> {
        self.fetch_receipt(Phase::Direct).await
    }

    /// Ask the receiving shard for the cross-shard receipt.
    pub async fn get_cx_receipt(&self) -> SdkResult<Option<Value>> {
        self.fetch_receipt(Phase::Cross).await
    }

    pub(crate) fn phase_shard(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Direct => self.params.shard_id,
            Phase::Cross => self.params.to_shard_id,
        }
    }

    /// `None` while the receipt does not exist yet.
    pub(crate) async fn fetch_receipt(&self, phase: Phase) -> SdkResult<Option<Value>> {
        let hash = self.id.clone().ok_or(SdkError::NotSigned)?;
        let method = match phase {
            Phase::Direct => RpcMethod::GetTransactionReceipt,
            Phase::Cross => RpcMethod::GetCxReceiptByHash,
        };

        let receipt = self
            .messenger()?
            .request(method, json!([hash]), Some(self.phase_shard(phase)))
            .await?;
        Ok(Some(receipt).filter(|r| !r.is_null()))
    }

    pub(crate) async fn block_number(&self, shard_id: u32) -> SdkResult<U256> {
        let result = self
            .messenger()?
            .request(RpcMethod::BlockNumber, (), Some(shard_id))
            .await?;
        parse_quantity(&result)
    }

    pub(crate) fn hash_or_empty(&self) -> String {
        self.id.clone().unwrap_or_default()
    }

    /// Digest the signature covers.
    pub fn digest(&self) -> B256 {
        keccak256(&self.unsigned_raw)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("tx_status", &self.tx_status)
            .field("cx_status", &self.cx_status)
            .finish()
    }
}

/// Status a receipt implies: `0x1` confirms, anything else rejects.
///
/// Pre-byzantium receipts carry a state `root` instead of `status` and count
/// as confirmed.
pub fn receipt_status(receipt: &Value) -> TxStatus {
    match receipt.get("status").filter(|s| !s.is_null()) {
        Some(status) => match parse_quantity(status) {
            Ok(n) if n == U256::from(1) => TxStatus::Confirmed,
            _ => TxStatus::Rejected,
        },
        None if receipt.get("root").is_some_and(|r| !r.is_null()) => TxStatus::Confirmed,
        None => TxStatus::Rejected,
    }
}

fn encode_unsigned(params: &TransactionParams) -> Bytes {
    let trailer = params.chain_id.map_or(Trailer::None, Trailer::ChainId);
    Bytes::from(codec::encode(&params.fields(), trailer))
}
