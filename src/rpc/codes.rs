//! Named JSON-RPC error codes.
//!
//! The reserved JSON-RPC 2.0 range plus the application-specific codes nodes
//! return for node-side failures.

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

pub const MISC_ERROR: i64 = -1;
pub const TYPE_ERROR: i64 = -3;
pub const INVALID_ADDRESS_OR_KEY: i64 = -5;
pub const INVALID_PARAMETER: i64 = -8;
pub const DATABASE_ERROR: i64 = -20;
pub const DESERIALIZATION_ERROR: i64 = -22;
pub const VERIFY_ERROR: i64 = -25;
pub const VERIFY_REJECTED: i64 = -26;
/// Node is still warming up.
pub const IN_WARMUP: i64 = -28;
pub const METHOD_DEPRECATED: i64 = -32;

/// Human-readable name for a code.
pub fn describe(code: i64) -> &'static str {
    match code {
        PARSE_ERROR => "parse error",
        INVALID_REQUEST => "invalid request",
        METHOD_NOT_FOUND => "method not found",
        INVALID_PARAMS => "invalid params",
        INTERNAL_ERROR => "internal error",
        MISC_ERROR => "misc error",
        TYPE_ERROR => "type error",
        INVALID_ADDRESS_OR_KEY => "invalid address or key",
        INVALID_PARAMETER => "invalid parameter",
        DATABASE_ERROR => "database error",
        DESERIALIZATION_ERROR => "deserialization error",
        VERIFY_ERROR => "verify error",
        VERIFY_REJECTED => "verify rejected",
        IN_WARMUP => "node still warming up",
        METHOD_DEPRECATED => "method deprecated",
        -32099..=-32000 => "server error",
        _ => "unknown error",
    }
}
