// src/rpc_pool.rs

use crate::error::{ConfigError, RpcError};
use crate::log_matcher::LogFilterParams;
use crate::metrics;
use crate::retry_policy::{is_missing_block_error, DefaultClassifier, ErrorClass, ErrorClassifier};
use crate::settings::{usable_endpoint_urls, Settings};
use crate::transport::{redact_url, HttpTransport, RpcTransport};
use crate::types::{BlockHeight, Timestamp};
use ethers::types::{Log, U64};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_RATE_LIMIT_RPS: u32 = 2;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Keeps the minimum gap at one microsecond or more.
pub const MAX_RATE_LIMIT_RPS: u32 = 1_000_000;

/// Maximum requests per second for one pool, floored at 1.
///
/// The pool never starts two attempts less than [`RateBudget::min_gap`] apart.
/// An attempt that has to wait for its slot waits up to 20% of that gap longer,
/// at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget(u32);

impl RateBudget {
    pub fn new(requests_per_second: u32) -> Self {
        Self(requests_per_second.clamp(1, MAX_RATE_LIMIT_RPS))
    }

    pub fn per_second(self) -> u32 {
        self.0
    }

    pub fn min_gap(self) -> Duration {
        Duration::from_millis(1000) / self.0
    }

    pub fn max_jitter(self) -> Duration {
        self.min_gap() / 5
    }

    /// One cell per `min_gap`, no burst.
    pub fn quota(self) -> Quota {
        Quota::with_period(self.min_gap()).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_RPS)
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub rate_budget: RateBudget,
    /// Upper bound for a single attempt against one endpoint.
    pub request_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            rate_budget: RateBudget::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rate_budget: RateBudget::new(settings.rpc.rate_limit_rps),
            request_timeout: Duration::from_millis(settings.rpc.request_timeout_ms.max(1)),
        }
    }
}

/// One RPC target. Only the redacted label is ever logged.
pub struct Endpoint {
    ordinal: usize,
    label: String,
    transport: Arc<dyn RpcTransport>,
}

impl Endpoint {
    pub fn new(label: impl Into<String>, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            ordinal: 0,
            label: label.into(),
            transport,
        }
    }

    /// HTTP endpoint labelled with the redacted form of `url`.
    pub fn http(url: &str, request_timeout: Duration) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(url, request_timeout)?;
        Ok(Self::new(redact_url(url), Arc::new(transport)))
    }

    /// Position in the pool, fixed at construction.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("ordinal", &self.ordinal)
            .field("label", &self.label)
            .finish()
    }
}

/// Rotation cursor. Only touched while holding the throttle lock.
#[derive(Debug, Default)]
struct PoolState {
    cursor: usize,
}

#[derive(Deserialize)]
struct BlockStamp {
    timestamp: U64,
}

/// Rate-limited, round-robin JSON-RPC dispatcher with failover.
///
/// ## Dispatch
///
/// - Starts at the rotation cursor and tries each endpoint at most once.
/// - Retryable failures (rate limits, timeouts) move on to the next endpoint.
/// - A fatal failure is returned immediately.
/// - On success the cursor moves to the endpoint after the one that answered.
///
/// Every attempt first waits for the throttle gap. The gap wait and the
/// cursor go through one mutex: a caller picks its starting endpoint only
/// once its slot is granted, and claims it by moving the cursor on, so
/// concurrent callers spread over the endpoints the way sequential ones do.
/// A claim is handed back if the call fails. The network call itself runs
/// outside the lock.
///
/// ## Usage
///
/// ```rust,no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use eventscan_sdk::rpc_pool::{PoolConfig, RpcPool};
///
/// let urls = vec!["https://rpc.example.org".to_string()];
/// let pool = RpcPool::from_urls(&urls, PoolConfig::default())?;
/// let tip = pool.block_number().await?;
/// # let _ = tip;
/// # Ok(())
/// # }
/// ```
pub struct RpcPool {
    endpoints: Vec<Endpoint>,
    state: Mutex<PoolState>,
    limiter: DefaultDirectRateLimiter,
    config: PoolConfig,
    classifier: Arc<dyn ErrorClassifier>,
}

impl RpcPool {
    /// Builds a pool over `endpoints`, in order. Zero endpoints is a
    /// configuration error.
    pub fn new(endpoints: Vec<Endpoint>, config: PoolConfig) -> Result<Self, ConfigError> {
        if endpoints.is_empty() {
            return Err(ConfigError::NoUsableEndpoints { configured: 0 });
        }

        let endpoints: Vec<Endpoint> = endpoints
            .into_iter()
            .enumerate()
            .map(|(ordinal, mut endpoint)| {
                endpoint.ordinal = ordinal;
                endpoint
            })
            .collect();

        info!(
            "RpcPool: {} endpoint(s), budget {} req/s (min gap {:?}), timeout {:?}",
            endpoints.len(),
            config.rate_budget.per_second(),
            config.rate_budget.min_gap(),
            config.request_timeout
        );

        Ok(Self {
            endpoints,
            state: Mutex::new(PoolState::default()),
            limiter: RateLimiter::direct(config.rate_budget.quota()),
            config,
            classifier: Arc::new(DefaultClassifier),
        })
    }

    /// Builds HTTP endpoints from raw URLs, dropping placeholders and URLs that
    /// cannot be parsed.
    pub fn from_urls(urls: &[String], config: PoolConfig) -> Result<Self, ConfigError> {
        let endpoints: Vec<Endpoint> = usable_endpoint_urls(urls)
            .into_iter()
            .filter_map(|url| match Endpoint::http(&url, config.request_timeout) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!("RpcPool: skipping endpoint: {}", e);
                    None
                }
            })
            .collect();

        if endpoints.is_empty() {
            return Err(ConfigError::NoUsableEndpoints {
                configured: urls.len(),
            });
        }
        Self::new(endpoints, config)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::from_urls(&settings.rpc.http_urls, PoolConfig::from_settings(settings))
    }

    /// Replaces the retryable/fatal policy.
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn endpoint_labels(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.label.clone()).collect()
    }

    pub fn rate_budget(&self) -> RateBudget {
        self.config.rate_budget
    }

    /// Ordinal of the endpoint the next dispatch starts from.
    pub async fn cursor(&self) -> usize {
        self.state.lock().await.cursor
    }

    /// Sends one logical call, failing over across endpoints as described on
    /// [`RpcPool`]. Errors are returned exactly as the endpoint produced them.
    pub async fn dispatch(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let count = self.endpoints.len();
        let start = self.claim_start().await;
        let mut last_error = None;

        for step in 0..count {
            let index = (start + step) % count;
            let endpoint = &self.endpoints[index];

            if step > 0 {
                self.wait_for_slot().await;
            }
            metrics::increment_rpc_attempt(method, &endpoint.label);
            debug!("RpcPool: {} -> {}", method, endpoint.label);

            let started = Instant::now();
            let outcome = match timeout(
                self.config.request_timeout,
                endpoint.transport.request(method, params.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout(self.config.request_timeout)),
            };
            metrics::record_rpc_call_latency(method, started.elapsed());

            match outcome {
                Ok(value) => {
                    if step > 0 {
                        self.settle_cursor(start, index + 1).await;
                        info!(
                            "RpcPool: {} succeeded on {} after {} failover(s)",
                            method, endpoint.label, step
                        );
                    }
                    return Ok(value);
                }
                Err(error) => match self.classifier.classify(&error) {
                    ErrorClass::Retryable => {
                        warn!(
                            "RpcPool: retryable error from {} on {}: {}",
                            endpoint.label, method, error
                        );
                        metrics::increment_rpc_failover(method, &endpoint.label);
                        last_error = Some(error);
                    }
                    ErrorClass::Fatal => {
                        warn!(
                            "RpcPool: fatal error from {} on {}: {}",
                            endpoint.label, method, error
                        );
                        metrics::increment_rpc_fatal(method);
                        self.settle_cursor(start, start).await;
                        return Err(error);
                    }
                },
            }
        }

        self.settle_cursor(start, start).await;
        metrics::increment_rpc_exhausted(method);
        warn!(
            "RpcPool: {} failed on all {} endpoint(s) with retryable errors",
            method, count
        );
        Err(last_error.unwrap_or(RpcError::NoEndpoints))
    }

    /// Typed wrapper over [`RpcPool::dispatch`].
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(|e| RpcError::InvalidRequest {
            method: method.to_string(),
            reason: e.to_string(),
        })?;
        let value = self.dispatch(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::InvalidResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Current chain tip (`eth_blockNumber`).
    pub async fn block_number(&self) -> Result<BlockHeight, RpcError> {
        let height: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(BlockHeight(height.as_u64()))
    }

    /// Timestamp of block `height`, or `None` when the node does not have it
    /// (pruned, or not produced yet). Both a `null` result and a "header not
    /// found" style error count as missing.
    pub async fn block_timestamp(&self, height: BlockHeight) -> Result<Option<Timestamp>, RpcError> {
        let block: Option<BlockStamp> = match self
            .request("eth_getBlockByNumber", (U64::from(height.0), false))
            .await
        {
            Ok(block) => block,
            Err(e) if is_missing_block_error(&e) => {
                debug!("RpcPool: block {} reported missing: {}", height, e);
                None
            }
            Err(e) => return Err(e),
        };
        Ok(block.map(|b| Timestamp(b.timestamp.as_u64())))
    }

    /// Raw `eth_getLogs`. Results are not revalidated here; see
    /// [`crate::log_matcher::LogMatcher::accept`].
    pub async fn get_logs(&self, params: &LogFilterParams) -> Result<Vec<Log>, RpcError> {
        self.request("eth_getLogs", [params]).await
    }

    /// Waits for a throttle slot, then claims the endpoint under the cursor
    /// as this call's starting point.
    async fn claim_start(&self) -> usize {
        let mut state = self.state.lock().await;
        self.until_ready().await;
        let count = self.endpoints.len();
        let start = state.cursor % count;
        state.cursor = (start + 1) % count;
        start
    }

    /// Waits for a throttle slot for a failover attempt.
    async fn wait_for_slot(&self) {
        let _state = self.state.lock().await;
        self.until_ready().await;
    }

    async fn until_ready(&self) {
        self.limiter
            .until_ready_with_jitter(Jitter::up_to(self.config.rate_budget.max_jitter()))
            .await;
    }

    /// Replaces the claim taken by [`claim_start`](Self::claim_start) with
    /// `next`, unless another call has moved the cursor since.
    async fn settle_cursor(&self, start: usize, next: usize) {
        let count = self.endpoints.len();
        let mut state = self.state.lock().await;
        if state.cursor == (start + 1) % count {
            state.cursor = next % count;
        }
    }
}

impl fmt::Debug for RpcPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcPool")
            .field("endpoints", &self.endpoints)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_budget_floor_and_gap() {
        assert_eq!(RateBudget::new(0).per_second(), 1);
        assert_eq!(RateBudget::new(0).min_gap(), Duration::from_millis(1000));
        assert_eq!(RateBudget::new(2).min_gap(), Duration::from_millis(500));
        assert_eq!(RateBudget::new(2).max_jitter(), Duration::from_millis(100));
        assert_eq!(RateBudget::default().per_second(), DEFAULT_RATE_LIMIT_RPS);
        assert_eq!(RateBudget::new(u32::MAX).min_gap(), Duration::from_micros(1));
    }

    #[test]
    fn test_quota_has_no_burst() {
        let quota = RateBudget::new(4).quota();
        assert_eq!(quota.replenish_interval(), Duration::from_millis(250));
        assert_eq!(quota.burst_size().get(), 1);
    }

    #[test]
    fn test_empty_pool_is_config_error() {
        let err = RpcPool::new(Vec::new(), PoolConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoUsableEndpoints { configured: 0 }));
    }

    #[test]
    fn test_placeholder_urls_leave_no_endpoints() {
        let urls = vec![
            "https://mainnet.infura.io/v3/<key>".to_string(),
            "https://arb-mainnet.g.alchemy.com/v2/your-key".to_string(),
        ];
        let err = RpcPool::from_urls(&urls, PoolConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoUsableEndpoints { configured: 2 }));
    }

    #[test]
    fn test_from_urls_assigns_ordinals_and_redacts() {
        let urls = vec![
            "https://rpc-a.example.org/secret-a".to_string(),
            "https://rpc-b.example.org".to_string(),
        ];
        let pool = RpcPool::from_urls(&urls, PoolConfig::default()).unwrap();
        assert_eq!(pool.endpoint_count(), 2);
        assert_eq!(pool.endpoints[1].ordinal(), 1);
        assert_eq!(
            pool.endpoint_labels(),
            vec![
                "https://rpc-a.example.org/***".to_string(),
                "https://rpc-b.example.org".to_string()
            ]
        );
        assert!(!format!("{:?}", pool).contains("secret-a"));
    }
}
