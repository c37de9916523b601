//! Retryable/fatal classification of endpoint failures.
//!
//! Upstream error shapes vary across endpoint vendors, so the default policy
//! matches on message text and numeric codes. It is deliberately loose: a
//! fatal error whose text happens to contain "limit" or "rate" (a revert
//! reason, for instance) is classified as retryable. That precision gap is
//! known and kept; vendors needing a tighter rule plug in their own
//! [`ErrorClassifier`].

use crate::error::RpcError;

/// HTTP status for "Too Many Requests".
pub const HTTP_TOO_MANY_REQUESTS: i64 = 429;
/// JSON-RPC code used by several providers for "request limit exceeded".
pub const JSON_RPC_LIMIT_EXCEEDED: i64 = -32005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient: try the next endpoint.
    Retryable,
    /// Will fail the same way everywhere: surface immediately.
    Fatal,
}

/// Policy deciding whether a failed attempt may fail over to another endpoint.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &RpcError) -> ErrorClass;
}

/// Text/code heuristic shared by all endpoints unless overridden.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &RpcError) -> ErrorClass {
        classify_error(error)
    }
}

impl<F> ErrorClassifier for F
where
    F: Fn(&RpcError) -> ErrorClass + Send + Sync,
{
    fn classify(&self, error: &RpcError) -> ErrorClass {
        self(error)
    }
}

pub fn classify_error(error: &RpcError) -> ErrorClass {
    match error {
        RpcError::Timeout(_) => return ErrorClass::Retryable,
        RpcError::NoEndpoints
        | RpcError::InvalidRequest { .. } => return ErrorClass::Fatal,
        _ => {}
    }

    if matches!(
        error.code(),
        Some(HTTP_TOO_MANY_REQUESTS) | Some(JSON_RPC_LIMIT_EXCEEDED)
    ) {
        return ErrorClass::Retryable;
    }

    if is_retryable_message(&error.to_string()) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

/// Matches rate-limit and timeout wording in a provider message.
pub fn is_retryable_message(message: &str) -> bool {
    let msg = message.to_lowercase();
    msg.contains("429")
        || msg.contains("rate")
        || msg.contains("limit")
        || msg.contains("timeout")
        || msg.contains("timed out")
}

/// "No such block" answers. Several providers report an unknown height with
/// an error object (`-32000 header not found`) instead of a `null` result.
pub fn is_missing_block_error(error: &RpcError) -> bool {
    match error {
        RpcError::JsonRpc(e) => {
            let msg = e.message.to_lowercase();
            msg.contains("header not found")
                || msg.contains("block not found")
                || msg.contains("unknown block")
        }
        _ => false,
    }
}
