// src/scanner.rs

use crate::error::ScanError;
use crate::log_matcher::LogMatcher;
use crate::rpc_pool::RpcPool;
use crate::types::BlockRange;
use ethers::types::Log;
use log::{debug, info};
use std::sync::Arc;

pub const DEFAULT_MAX_BLOCKS_PER_QUERY: u64 = 2_000;

/// One-shot `eth_getLogs` over a block range: chunked, sequential, and
/// revalidated locally. Scheduling repeated scans is left to the caller.
#[derive(Debug, Clone)]
pub struct LogScanner {
    pool: Arc<RpcPool>,
    matcher: Arc<LogMatcher>,
    max_span: u64,
}

impl LogScanner {
    pub fn new(pool: Arc<RpcPool>, matcher: Arc<LogMatcher>, max_span: u64) -> Self {
        Self {
            pool,
            matcher,
            max_span: max_span.max(1),
        }
    }

    pub fn max_span(&self) -> u64 {
        self.max_span
    }

    pub fn matcher(&self) -> &LogMatcher {
        &self.matcher
    }

    /// Matching logs in `range`, in provider order. A failed chunk fails the
    /// whole call; nothing fetched before it is returned.
    pub async fn fetch_matching(&self, range: BlockRange) -> Result<Vec<Log>, ScanError> {
        let chunks = range.chunks(self.max_span);
        let mut matched = Vec::new();
        let mut fetched = 0usize;

        for chunk in &chunks {
            let params = self.matcher.build_filter_params(*chunk);
            let logs = self.pool.get_logs(&params).await?;
            fetched += logs.len();
            let kept = self.matcher.retain_matching(logs);
            debug!("LogScanner: chunk {} -> {} matching log(s)", chunk, kept.len());
            matched.extend(kept);
        }

        info!(
            "LogScanner: {} in {} chunk(s): {} fetched, {} matched",
            range,
            chunks.len(),
            fetched,
            matched.len()
        );
        Ok(matched)
    }
}
