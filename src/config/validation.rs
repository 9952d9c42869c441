//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics (URL schemes, non-zero
//! intervals and budgets). All violations are collected, not just the first.

use url::Url;

use crate::config::schema::SdkConfig;

/// A single semantic violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every violation found.
pub fn validate_config(config: &SdkConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(
        &mut errors,
        "network.http_url",
        &config.network.http_url,
        &["http", "https"],
    );
    if let Some(ws) = &config.network.ws_url {
        check_url(&mut errors, "network.ws_url", ws, &["ws", "wss"]);
    }

    if config.transport.request_timeout_ms == 0 {
        errors.push(ValidationError {
            field: "transport.request_timeout_ms",
            message: "must be greater than zero".into(),
        });
    }
    if config.tracker.polling_interval_ms == 0 {
        errors.push(ValidationError {
            field: "tracker.polling_interval_ms",
            message: "must be greater than zero".into(),
        });
    }
    if config.confirmation.max_attempts == 0 {
        errors.push(ValidationError {
            field: "confirmation.max_attempts",
            message: "must be at least 1".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
    schemes: &[&str],
) {
    match Url::parse(value) {
        Ok(url) if schemes.contains(&url.scheme()) => {}
        Ok(url) => errors.push(ValidationError {
            field,
            message: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError {
            field,
            message: format!("invalid URL '{}': {}", value, e),
        }),
    }
}
