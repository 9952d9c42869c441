//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Transport call:
//!     → timeouts.rs (race the call against the per-call deadline)
//!
//! Persistent connection lost:
//!     → backoff.rs (pick the reconnect delay from the configured policy)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every transport call has a deadline
//! - No retries here: retrying is the confirmation layer's job
//! - Fixed reconnect delay by default; exponential is opt-in

pub mod backoff;
pub mod timeouts;

pub use backoff::ReconnectPolicy;
pub use timeouts::with_timeout;
