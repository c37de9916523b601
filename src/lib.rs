//! # EventScan SDK
//!
//! Chain-access layer for EVM event indexers: rate-limited JSON-RPC dispatch
//! across several endpoints, timestamp → block resolution, scan window
//! planning, and local revalidation of provider-returned logs.
//!
//! ## Overview
//!
//! The SDK owns the *reading* side of an indexer. It does not decode event
//! payloads, write to storage or schedule polling; an external loop drives it:
//!
//! 1. [`WindowPlanner`] picks a `[fromBlock, toBlock]` range.
//! 2. [`LogMatcher`] builds `eth_getLogs` filter parameters for that range.
//! 3. [`RpcPool`] sends the request, rotating and failing over between endpoints.
//! 4. [`LogMatcher::accept`] re-checks every returned log.
//!
//! [`LogScanner`] bundles steps 2-4 for a single range.
//!
//! ## Architecture
//!
//! ### Provider Layer
//! Endpoint transports, the shared throttle and round-robin failover, and the
//! retryable/fatal error policy.
//!
//! ### Block Layer
//! Binary search from timestamps to block heights, and window planning on top.
//!
//! ### Matching Layer
//! Event signature sets, address allow-lists, filter construction and the
//! revalidation predicate.

// Core Types
/// Error types
pub mod error;
/// Block heights, timestamps, ranges and string conversions
pub mod types;

// Provider Layer
/// Retryable/fatal error classification
pub mod retry_policy;
/// JSON-RPC transports
pub mod transport;
/// RPC provider pool with throttling and failover
pub mod rpc_pool;

// Block Layer
/// Timestamp to block height resolution
pub mod block_time;
/// Scan window planning
pub mod window_planner;

// Matching Layer
/// Event signature and address filtering
pub mod log_matcher;
/// Chunked log fetching with revalidation
pub mod scanner;

// Infrastructure
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use block_time::BlockTimeResolver;
pub use error::{ConfigError, RpcError, ScanError};
pub use log_matcher::{AddressAllowList, EventSignatureSet, LogFilterParams, LogMatcher};
pub use rpc_pool::{PoolConfig, RpcPool};
pub use scanner::LogScanner;
pub use settings::Settings;
pub use types::{BlockHeight, BlockInterval, BlockRange, Timestamp};
pub use window_planner::WindowPlanner;
