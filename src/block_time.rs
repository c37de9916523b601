//! Timestamp → block height resolution.
//!
//! Binary search over `[1, tip]` using one `eth_getBlockByNumber` per step.
//! Block timestamps are assumed non-decreasing with height.

use crate::error::{RpcError, ScanError};
use crate::metrics;
use crate::rpc_pool::RpcPool;
use crate::types::{BlockHeight, Timestamp};
use log::debug;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct BlockTimeResolver {
    pool: Arc<RpcPool>,
}

impl BlockTimeResolver {
    pub fn new(pool: Arc<RpcPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<RpcPool> {
        &self.pool
    }

    /// Earliest block whose timestamp is `>= target`.
    ///
    /// Returns 1 when `target` precedes genesis and the tip height when every
    /// block is older than `target`. A block the node reports as missing is
    /// treated as "not before target" and narrows the upper bound. Read-only:
    /// repeated calls against an unchanged chain give the same answer.
    pub async fn find_block_at_or_after(&self, target: Timestamp) -> Result<BlockHeight, ScanError> {
        self.search(target, None).await
    }

    /// Same as [`find_block_at_or_after`](Self::find_block_at_or_after), but
    /// gives up with [`ScanError::Cancelled`] as soon as `shutdown` reads
    /// `true`, including while a probe is in flight.
    pub async fn find_block_at_or_after_until(
        &self,
        target: Timestamp,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<BlockHeight, ScanError> {
        self.search(target, Some(shutdown)).await
    }

    async fn search(
        &self,
        target: Timestamp,
        mut shutdown: Option<&mut watch::Receiver<bool>>,
    ) -> Result<BlockHeight, ScanError> {
        let tip = guarded(self.pool.block_number(), shutdown.as_deref_mut()).await?;

        let mut lo = BlockHeight::FIRST_SCANNABLE.as_u64();
        let mut hi = tip.as_u64().max(lo);
        let mut probes: u32 = 0;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let stamp = guarded(
                self.pool.block_timestamp(BlockHeight(mid)),
                shutdown.as_deref_mut(),
            )
            .await?;
            probes += 1;

            match stamp {
                Some(ts) if ts < target => lo = mid + 1,
                Some(_) => hi = mid,
                None => {
                    debug!("BlockTimeResolver: block {} missing, narrowing upper bound", mid);
                    hi = mid;
                }
            }
        }

        metrics::record_block_search_probes(probes);
        debug!(
            "BlockTimeResolver: timestamp {} -> block {} ({} probes, tip {})",
            target, lo, probes, tip
        );
        Ok(BlockHeight(lo))
    }
}

/// Runs `fut`, aborting early if the optional shutdown signal fires.
async fn guarded<T, F>(fut: F, shutdown: Option<&mut watch::Receiver<bool>>) -> Result<T, ScanError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    let Some(shutdown) = shutdown else {
        return Ok(fut.await?);
    };
    if *shutdown.borrow_and_update() {
        return Err(ScanError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => Err(ScanError::Cancelled),
        result = fut => Ok(result?),
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if shutdown.changed().await.is_err() {
            // Sender gone: nobody can request shutdown any more.
            std::future::pending::<()>().await;
        }
        if *shutdown.borrow_and_update() {
            return;
        }
    }
}
