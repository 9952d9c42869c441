//! Entry point for building transactions bound to a messenger.

use alloy::primitives::hex;
use std::sync::Arc;

use crate::error::{SdkError, SdkResult};
use crate::messenger::Messenger;
use crate::transaction::record::{Transaction, TransactionParams};

/// Builds transactions that share one messenger.
#[derive(Debug, Clone)]
pub struct TransactionFactory {
    messenger: Arc<Messenger>,
}

impl TransactionFactory {
    pub fn new(messenger: Arc<Messenger>) -> Self {
        Self { messenger }
    }

    pub fn messenger(&self) -> &Arc<Messenger> {
        &self.messenger
    }

    /// A new `INITIALIZED` transaction.
    pub fn new_tx(&self, params: TransactionParams) -> Transaction {
        Transaction::new(&self.messenger, params)
    }

    /// A `SIGNED` transaction rebuilt from hex-encoded raw bytes.
    pub fn recover(&self, raw_hex: &str) -> SdkResult<Transaction> {
        let raw = hex::decode(raw_hex)
            .map_err(|e| SdkError::InvalidRawTransaction(format!("not hex: {}", e)))?;
        Transaction::recover(&self.messenger, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ChainType;
    use crate::transaction::TxStatus;
    use crate::transport::HttpTransport;

    fn factory() -> TransactionFactory {
        TransactionFactory::new(Arc::new(Messenger::new(
            Arc::new(HttpTransport::new("http://127.0.0.1:1")),
            ChainType::Harmony,
        )))
    }

    #[test]
    fn test_new_tx_is_initialized() {
        let tx = factory().new_tx(TransactionParams::default());
        assert_eq!(tx.tx_status(), TxStatus::Initialized);
        assert_eq!(tx.cx_status(), TxStatus::None);
        assert!(!tx.is_cross_shard());
    }

    #[test]
    fn test_recover_rejects_bad_input() {
        let factory = factory();
        assert!(matches!(factory.recover("0xzz"), Err(SdkError::InvalidRawTransaction(_))));
        assert!(matches!(factory.recover("0x01"), Err(SdkError::InvalidRawTransaction(_))));
    }
}
