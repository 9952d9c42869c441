//! Hex quantities on the wire.
//!
//! Block heights and other numeric fields travel as `0x`-prefixed hex strings.
//! Comparisons are done on `U256`, never on the strings.

use alloy::primitives::U256;
use serde_json::Value;

use crate::error::{SdkError, SdkResult};

/// Parse a quantity from a hex string, a decimal string or a JSON number.
pub fn parse_quantity(value: &Value) -> SdkResult<U256> {
    match value {
        Value::String(s) => parse_quantity_str(s),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| SdkError::Malformed(format!("Not an unsigned quantity: {}", n))),
        other => Err(SdkError::Malformed(format!("Not a quantity: {}", other))),
    }
}

pub fn parse_quantity_str(s: &str) -> SdkResult<U256> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|e| SdkError::Malformed(format!("Invalid quantity '{}': {}", s, e)))
}

/// Format a quantity as `0x`-prefixed lowercase hex.
pub fn to_quantity(value: U256) -> String {
    format!("0x{:x}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse_quantity(&json!("0x10")).unwrap(), U256::from(16));
        assert_eq!(parse_quantity(&json!("16")).unwrap(), U256::from(16));
        assert_eq!(parse_quantity(&json!(16)).unwrap(), U256::from(16));
        assert_eq!(parse_quantity(&json!("0x")).unwrap(), U256::ZERO);
        assert!(parse_quantity(&json!(null)).is_err());
        assert!(parse_quantity(&json!("0xzz")).is_err());
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let a = parse_quantity(&json!("0x9")).unwrap();
        let b = parse_quantity(&json!("0x10")).unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_format() {
        assert_eq!(to_quantity(U256::from(255)), "0xff");
        assert_eq!(to_quantity(U256::ZERO), "0x0");
    }
}
