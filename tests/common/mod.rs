//! Shared mocks for integration tests.
//!
//! - [`ScriptedTransport`]: replays a fixed sequence of replies and records
//!   when each attempt started.
//! - [`MockChain`]: an in-memory chain answering `eth_blockNumber`,
//!   `eth_getBlockByNumber` and `eth_getLogs`.

#![allow(dead_code)]

use async_trait::async_trait;
use ethers::providers::JsonRpcError;
use ethers::types::{Log, U64};
use eventscan_sdk::error::RpcError;
use eventscan_sdk::rpc_pool::{Endpoint, PoolConfig, RateBudget, RpcPool};
use eventscan_sdk::transport::RpcTransport;
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Canned outcome of one attempt.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    /// HTTP 429 with a provider-style body.
    RateLimited,
    /// JSON-RPC -32005.
    LimitExceeded,
    /// JSON-RPC error that is not retryable.
    Fatal(String),
    /// Never answers; only the pool's timeout ends the attempt.
    Hang,
}

impl Reply {
    async fn play(self) -> Result<Value, RpcError> {
        match self {
            Reply::Value(v) => Ok(v),
            Reply::RateLimited => Err(RpcError::Http {
                status: 429,
                body: "Too Many Requests".to_string(),
            }),
            Reply::LimitExceeded => Err(RpcError::JsonRpc(JsonRpcError {
                code: -32005,
                message: "request limit exceeded".to_string(),
                data: None,
            })),
            Reply::Fatal(message) => Err(RpcError::JsonRpc(JsonRpcError {
                code: -32602,
                message,
                data: None,
            })),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Start times of every attempt across the endpoints sharing this log.
pub type CallLog = Arc<Mutex<Vec<(String, Instant)>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

#[derive(Debug)]
pub struct ScriptedTransport {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    attempts: AtomicUsize,
    calls: CallLog,
}

impl ScriptedTransport {
    /// Plays `script` in order, then `fallback` forever.
    pub fn new(name: &str, script: Vec<Reply>, fallback: Reply, calls: CallLog) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            fallback,
            attempts: AtomicUsize::new(0),
            calls,
        })
    }

    pub fn always(name: &str, reply: Reply, calls: CallLog) -> Arc<Self> {
        Self::new(name, Vec::new(), reply, calls)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn request(&self, _method: &str, _params: Value) -> Result<Value, RpcError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((self.name.clone(), Instant::now()));
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        reply.play().await
    }
}

/// In-memory chain. `timestamps[h]` is the timestamp of block `h`; the last
/// index is the tip.
#[derive(Debug, Default)]
pub struct MockChain {
    timestamps: Vec<u64>,
    missing: HashSet<u64>,
    missing_as_error: bool,
    logs: Vec<Log>,
    probe_delay: Option<Duration>,
    probes: AtomicU32,
    log_queries: AtomicU32,
}

impl MockChain {
    pub fn new(timestamps: Vec<u64>) -> Self {
        Self {
            timestamps,
            ..Default::default()
        }
    }

    /// Chain with `tip + 1` blocks (genesis included), `interval` seconds apart
    /// starting at `genesis_ts`.
    pub fn regular(tip: u64, genesis_ts: u64, interval: u64) -> Self {
        Self::new((0..=tip).map(|h| genesis_ts + h * interval).collect())
    }

    pub fn with_missing(mut self, heights: impl IntoIterator<Item = u64>) -> Self {
        self.missing.extend(heights);
        self
    }

    /// Missing blocks answer `-32000 header not found` instead of `null`.
    pub fn with_missing_as_error(mut self) -> Self {
        self.missing_as_error = true;
        self
    }

    pub fn with_logs(mut self, logs: Vec<Log>) -> Self {
        self.logs = logs;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    pub fn tip(&self) -> u64 {
        self.timestamps.len().saturating_sub(1) as u64
    }

    pub fn timestamp(&self, height: u64) -> u64 {
        self.timestamps[height as usize]
    }

    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn log_queries(&self) -> u32 {
        self.log_queries.load(Ordering::SeqCst)
    }

    fn block(&self, height: u64) -> Result<Value, RpcError> {
        if height > self.tip() || self.missing.contains(&height) {
            if self.missing_as_error {
                return Err(RpcError::JsonRpc(JsonRpcError {
                    code: -32000,
                    message: "header not found".to_string(),
                    data: None,
                }));
            }
            return Ok(Value::Null);
        }
        Ok(json!({
            "number": U64::from(height),
            "timestamp": U64::from(self.timestamp(height)),
        }))
    }

    fn logs_between(&self, filter: &Value) -> Value {
        let from: U64 = serde_json::from_value(filter["fromBlock"].clone()).unwrap();
        let to: U64 = serde_json::from_value(filter["toBlock"].clone()).unwrap();
        let logs: Vec<&Log> = self
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .map_or(false, |b| b >= from && b <= to)
            })
            .collect();
        serde_json::to_value(logs).unwrap()
    }
}

#[async_trait]
impl RpcTransport for MockChain {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "eth_blockNumber" => Ok(json!(U64::from(self.tip()))),
            "eth_getBlockByNumber" => {
                self.probes.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = self.probe_delay {
                    tokio::time::sleep(delay).await;
                }
                let height: U64 = serde_json::from_value(params[0].clone()).unwrap();
                self.block(height.as_u64())
            }
            "eth_getLogs" => {
                self.log_queries.fetch_add(1, Ordering::SeqCst);
                Ok(self.logs_between(&params[0]))
            }
            other => Err(RpcError::JsonRpc(JsonRpcError {
                code: -32601,
                message: format!("method {} not found", other),
                data: None,
            })),
        }
    }
}

/// Pool whose throttle (100µs gap) is fast enough not to matter.
pub fn fast_config() -> PoolConfig {
    PoolConfig {
        rate_budget: RateBudget::new(10_000),
        request_timeout: Duration::from_secs(10),
    }
}

pub fn pool_of(transports: Vec<Arc<dyn RpcTransport>>, config: PoolConfig) -> RpcPool {
    let endpoints = transports
        .into_iter()
        .enumerate()
        .map(|(i, t)| Endpoint::new(format!("mock-{}", i), t))
        .collect();
    RpcPool::new(endpoints, config).unwrap()
}

pub fn chain_pool(chain: Arc<MockChain>) -> Arc<RpcPool> {
    Arc::new(pool_of(vec![chain as Arc<dyn RpcTransport>], fast_config()))
}
