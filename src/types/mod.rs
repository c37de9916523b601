//! Value types shared by the chain-access components.

pub mod block;
pub mod conversions;

pub use block::{BlockHeight, BlockInterval, BlockRange, Timestamp};
