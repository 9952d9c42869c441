//! JSON-RPC envelope subsystem.
//!
//! # Data Flow
//! ```text
//! Messenger::send(method, params)
//!     → methods.rs (rewrite chain prefix)
//!     → payload.rs (allocate id, build envelope)
//!     → [transport + middleware]
//!     → response.rs (wrap into Result / Error / Raw)
//! ```

pub mod codes;
pub mod methods;
pub mod payload;
pub mod quantity;
pub mod response;

pub use methods::{set_rpc_prefix, ChainType, RpcMethod};
pub use payload::{next_message_id, to_payload, Params, RpcRequest};
pub use quantity::{parse_quantity, to_quantity};
pub use response::{RpcErrorObject, RpcResponse};
