// src/error.rs

use ethers::providers::JsonRpcError;
use std::time::Duration;

/// Failure of a single RPC attempt against one endpoint.
///
/// Payloads are kept as the endpoint reported them so callers keep the full
/// diagnostic detail; the pool never rewrites them.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// JSON-RPC error object returned by the node.
    #[error("json-rpc error: {0}")]
    JsonRpc(#[from] JsonRpcError),
    /// Non-success HTTP status (429, 503, ...).
    #[error("http status {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection-level failure (DNS, TLS, refused, reset).
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid request for {method}: {reason}")]
    InvalidRequest { method: String, reason: String },
    #[error("invalid response for {method}: {reason}")]
    InvalidResponse { method: String, reason: String },
    #[error("no endpoint attempted")]
    NoEndpoints,
}

impl RpcError {
    /// Numeric code carried by the error, if any (JSON-RPC code or HTTP status).
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::JsonRpc(e) => Some(e.code),
            RpcError::Http { status, .. } => Some(i64::from(*status)),
            _ => None,
        }
    }
}

/// Construction-time failures. A component that fails with one of these is
/// never handed out.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no usable RPC endpoints ({configured} configured, all rejected or empty)")]
    NoUsableEndpoints { configured: usize },
    #[error("invalid endpoint {label}: {reason}")]
    InvalidEndpoint { label: String, reason: String },
    #[error("required event `{0}` not found in ABI")]
    MissingEventSignature(String),
    #[error("no required events configured")]
    NoRequiredEvents,
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error(transparent)]
    Settings(#[from] config::ConfigError),
}

/// Errors surfaced by the block-time resolver, window planner and scanner.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("operation cancelled")]
    Cancelled,
}
