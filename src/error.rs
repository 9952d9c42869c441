//! Error taxonomy for the client engine.
//!
//! # Categories
//! - Transport: connection refused, timeout, malformed response
//! - Protocol: a well-formed JSON-RPC `error` object
//! - Application: misuse of the API (unsigned transaction, missing messenger, ...)
//! - Confirmation exhaustion: no receipt within the attempt budget

use thiserror::Error;

use crate::rpc::codes;

/// Errors that can occur anywhere in the messenger/transport/confirmation stack.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Network-level failure talking to a node.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The per-call timeout elapsed before the node answered.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The node answered with something that is not JSON-RPC.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// A well-formed JSON-RPC error object.
    #[error("RPC error {code} ({}): {message}", codes::describe(*code))]
    Rpc { code: i64, message: String },

    /// Operation not available on this transport.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Subscribe was requested on a request/response transport.
    #[error("Provider does not support subscriptions")]
    SubscriptionsUnsupported,

    /// Broadcast was attempted before signing.
    #[error("Transaction not signed")]
    NotSigned,

    /// The messenger a transaction was bound to has been dropped.
    #[error("Messenger not found")]
    MessengerNotFound,

    /// The method name could not be rewritten to the configured chain prefix.
    #[error("Could not set prefix: {0}")]
    InvalidPrefix(String),

    /// Raw transaction bytes could not be decoded.
    #[error("Invalid rawTransaction: {0}")]
    InvalidRawTransaction(String),

    /// No receipt was observed within the confirmation budget.
    #[error("The {phase} transaction is still not confirmed after {attempts} attempts")]
    ConfirmationExhausted { attempts: u32, phase: &'static str },

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing failed in the wallet.
    #[error("Signing error: {0}")]
    Signing(String),
}

/// Result type for client engine operations.
pub type SdkResult<T> = Result<T, SdkError>;

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::Malformed(e.to_string())
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(e: reqwest::Error) -> Self {
        SdkError::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SdkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SdkError::Transport(e.to_string())
    }
}
