//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (human-readable or JSON)
//!     → whatever metrics recorder the application installs
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
