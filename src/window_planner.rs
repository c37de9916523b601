//! Scan window planning.
//!
//! The approximate path turns a lookback duration into a block offset using
//! an average block interval; it costs one `eth_blockNumber` call. The precise
//! path resolves the start block through [`BlockTimeResolver`].

use crate::block_time::BlockTimeResolver;
use crate::error::ScanError;
use crate::rpc_pool::RpcPool;
use crate::types::{BlockHeight, BlockInterval, BlockRange, Timestamp};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Number of blocks expected in `lookback` at the given average interval,
/// rounded down. An unusable interval (zero, negative, NaN) gives 0.
pub fn offset_blocks(lookback: Duration, interval: BlockInterval) -> u64 {
    if !interval.is_usable() {
        return 0;
    }
    let blocks = (lookback.as_secs_f64() / interval.secs()).floor();
    if blocks >= u64::MAX as f64 {
        u64::MAX
    } else {
        blocks as u64
    }
}

#[derive(Debug, Clone)]
pub struct WindowPlanner {
    pool: Arc<RpcPool>,
    resolver: BlockTimeResolver,
}

impl WindowPlanner {
    pub fn new(pool: Arc<RpcPool>) -> Self {
        let resolver = BlockTimeResolver::new(Arc::clone(&pool));
        Self { pool, resolver }
    }

    pub fn resolver(&self) -> &BlockTimeResolver {
        &self.resolver
    }

    /// `[max(1, tip - offset), tip]` with `offset = floor(lookback / interval)`.
    pub async fn initial_window(
        &self,
        lookback: Duration,
        interval: BlockInterval,
    ) -> Result<BlockRange, ScanError> {
        if !interval.is_usable() {
            warn!(
                "WindowPlanner: unusable block interval {}s, window collapses to the tip",
                interval.secs()
            );
        }
        let tip = self.pool.block_number().await?.as_u64();
        let offset = offset_blocks(lookback, interval);
        let range = window_ending_at(tip.saturating_sub(offset), tip);
        info!(
            "WindowPlanner: approximate window {} (lookback {:?}, interval {}s, offset {})",
            range,
            lookback,
            interval.secs(),
            offset
        );
        Ok(range)
    }

    /// Window from the first block at or after `since` up to the current tip.
    pub async fn window_since(&self, since: Timestamp) -> Result<BlockRange, ScanError> {
        let from = self.resolver.find_block_at_or_after(since).await?;
        let tip = self.pool.block_number().await?;
        // The tip may have been re-read from a lagging endpoint.
        let range = window_ending_at(from.as_u64(), tip.as_u64().max(from.as_u64()));
        info!("WindowPlanner: window since {} is {}", since, range);
        Ok(range)
    }

    /// Catch-up window after `last_scanned`, at most `max_span` blocks long.
    /// `None` when nothing new has been produced.
    pub async fn next_window(
        &self,
        last_scanned: BlockHeight,
        max_span: u64,
    ) -> Result<Option<BlockRange>, ScanError> {
        let tip = self.pool.block_number().await?.as_u64();
        let range = next_range(last_scanned.as_u64(), tip, max_span);
        match &range {
            Some(r) => debug!("WindowPlanner: next window {}", r),
            None => debug!("WindowPlanner: up to date at block {}", last_scanned),
        }
        Ok(range)
    }
}

fn window_ending_at(from: u64, tip: u64) -> BlockRange {
    let to = tip.max(1);
    let from = from.clamp(1, to);
    BlockRange::new(from, to).unwrap_or_else(|| BlockRange::single(BlockHeight(to)))
}

fn next_range(last_scanned: u64, tip: u64, max_span: u64) -> Option<BlockRange> {
    let from = last_scanned.saturating_add(1).max(1);
    if from > tip {
        return None;
    }
    let to = tip.min(from.saturating_add(max_span.max(1) - 1));
    BlockRange::new(from, to)
}
