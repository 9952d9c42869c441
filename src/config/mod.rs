//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SdkConfig (validated, immutable)
//!     → handed to Messenger / trackers / transactions by value
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BasicAuth;
pub use schema::ConfirmationConfig;
pub use schema::NetworkConfig;
pub use schema::ObservabilityConfig;
pub use schema::SdkConfig;
pub use schema::TrackerConfig;
pub use schema::TransportConfig;
