// src/metrics.rs

#[cfg(feature = "observability")]
pub use ::metrics::{counter, describe_counter, describe_histogram, histogram, increment_counter};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_histogram, histogram, increment_counter};

/// Registers descriptions for every metric emitted by the SDK.
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    describe_counter!(
        "rpc_dispatch_attempts_total",
        "Network attempts made by the provider pool, labeled by method and endpoint."
    );
    describe_counter!(
        "rpc_failovers_total",
        "Attempts that failed with a retryable error and moved on to the next endpoint."
    );
    describe_counter!(
        "rpc_fatal_errors_total",
        "Dispatches aborted by a non-retryable endpoint error."
    );
    describe_counter!(
        "rpc_exhausted_total",
        "Dispatches that failed on every endpoint with retryable errors."
    );
    describe_histogram!(
        "rpc_call_latency_ms",
        "Latency of individual endpoint attempts in milliseconds."
    );
    describe_histogram!(
        "block_search_probes",
        "Block headers fetched per timestamp-to-height resolution."
    );
    describe_counter!(
        "logs_rejected_total",
        "Provider-returned logs dropped by local revalidation."
    );
}

pub fn increment_rpc_attempt(method: &str, endpoint: &str) {
    increment_counter!("rpc_dispatch_attempts_total",
                       "method" => method.to_string(),
                       "endpoint" => endpoint.to_string());
}

pub fn increment_rpc_failover(method: &str, endpoint: &str) {
    increment_counter!("rpc_failovers_total",
                       "method" => method.to_string(),
                       "endpoint" => endpoint.to_string());
}

pub fn increment_rpc_fatal(method: &str) {
    increment_counter!("rpc_fatal_errors_total", "method" => method.to_string());
}

pub fn increment_rpc_exhausted(method: &str) {
    increment_counter!("rpc_exhausted_total", "method" => method.to_string());
}

pub fn record_rpc_call_latency(method: &str, duration: std::time::Duration) {
    histogram!("rpc_call_latency_ms", duration.as_millis() as f64,
               "method" => method.to_string());
}

pub fn record_block_search_probes(probes: u32) {
    histogram!("block_search_probes", probes as f64);
}

pub fn add_logs_rejected(count: usize) {
    counter!("logs_rejected_total", count as u64);
}
