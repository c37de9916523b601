use serde::{Deserialize, Serialize};
use std::fmt;

/// Height of a block in the chain's append-only sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// Lowest height ever scanned. Block 0 is excluded by convention.
    pub const FIRST_SCANNABLE: BlockHeight = BlockHeight(1);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for BlockHeight {
    fn from(value: u64) -> Self {
        BlockHeight(value)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UNIX timestamp in seconds, as reported in block headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn as_secs(self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Timestamp(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Approximate average time between blocks, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockInterval(pub f64);

impl BlockInterval {
    pub fn secs(self) -> f64 {
        self.0
    }

    /// Usable as a divisor: finite and strictly positive.
    pub fn is_usable(self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

/// Inclusive `[from_block, to_block]` window.
///
/// Invariant: `1 <= from_block <= to_block`. Instances are only built through
/// [`BlockRange::new`], so every value in circulation satisfies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRange {
    from_block: BlockHeight,
    to_block: BlockHeight,
}

impl BlockRange {
    /// Clamps both bounds to at least 1. Returns `None` if `from > to` after
    /// clamping.
    pub fn new(from_block: u64, to_block: u64) -> Option<Self> {
        let from_block = from_block.max(1);
        let to_block = to_block.max(1);
        if from_block > to_block {
            return None;
        }
        Some(Self {
            from_block: BlockHeight(from_block),
            to_block: BlockHeight(to_block),
        })
    }

    /// One-block range, with height 0 lifted to 1.
    pub fn single(height: BlockHeight) -> Self {
        let height = BlockHeight(height.0.max(1));
        Self {
            from_block: height,
            to_block: height,
        }
    }

    pub fn from_block(&self) -> BlockHeight {
        self.from_block
    }

    pub fn to_block(&self) -> BlockHeight {
        self.to_block
    }

    /// Number of blocks covered (always >= 1).
    pub fn len(&self) -> u64 {
        self.to_block.0 - self.from_block.0 + 1
    }

    /// Splits the range into consecutive sub-ranges of at most `max_span`
    /// blocks. A `max_span` of 0 is treated as 1.
    pub fn chunks(&self, max_span: u64) -> Vec<BlockRange> {
        let span = max_span.max(1);
        let mut chunks = Vec::new();
        let mut current_from = self.from_block.0;
        while current_from <= self.to_block.0 {
            let current_to = current_from.saturating_add(span - 1).min(self.to_block.0);
            chunks.push(BlockRange {
                from_block: BlockHeight(current_from),
                to_block: BlockHeight(current_to),
            });
            if current_to == u64::MAX {
                break;
            }
            current_from = current_to + 1;
        }
        chunks
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from_block, self.to_block)
    }
}
