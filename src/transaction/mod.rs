//! Transaction subsystem.
//!
//! # Data Flow
//! ```text
//! TransactionFactory::new_tx(params)        INITIALIZED
//!     → sign(wallet)   codec.rs + wallet.rs  SIGNED
//!     → send()         sendRawTransaction    PENDING   (failure: REJECTED)
//!     → confirm()      confirm.rs            CONFIRMED | REJECTED
//!         └─ cross-shard: cx phase           cxStatus CONFIRMED | REJECTED
//! ```

pub mod codec;
mod confirm;
pub mod factory;
pub mod record;
pub mod status;
pub mod wallet;

pub use factory::TransactionFactory;
pub use status::TxStatus;
pub use record::{receipt_status, Phase, Transaction, TransactionParams};
pub use wallet::Wallet;
