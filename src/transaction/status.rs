//! Transaction lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of a transaction (and, separately, of its cross-shard receipt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    #[default]
    None,
    Initialized,
    Signed,
    Pending,
    Confirmed,
    Rejected,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::None => "NONE",
            TxStatus::Initialized => "INITIALIZED",
            TxStatus::Signed => "SIGNED",
            TxStatus::Pending => "PENDING",
            TxStatus::Confirmed => "CONFIRMED",
            TxStatus::Rejected => "REJECTED",
        }
    }

    /// `Confirmed` or `Rejected`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Rejected)
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&TxStatus::Confirmed).unwrap(), "\"CONFIRMED\"");
        assert_eq!(TxStatus::default(), TxStatus::None);
        assert!(TxStatus::Rejected.is_terminal());
        assert!(!TxStatus::Pending.is_terminal());
    }
}
