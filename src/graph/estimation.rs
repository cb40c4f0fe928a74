//! Memory estimation for compressed graphs

use crate::compression::{Compression, TailStrategy, BLOCK_SIZE};
use crate::compression::varint::MAX_VAR_LONG_BYTES;
use serde::{Deserialize, Serialize};

/// Inclusive byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRange {
    pub min: u64,
    pub max: u64,
}

impl MemoryRange {
    pub fn of(bytes: u64) -> Self {
        Self { min: bytes, max: bytes }
    }

    pub fn of_range(min: u64, max: u64) -> Self {
        Self { min, max: max.max(min) }
    }

    pub fn add(self, other: MemoryRange) -> Self {
        Self {
            min: self.min + other.min,
            max: self.max + other.max,
        }
    }

    pub fn times(self, factor: u64) -> Self {
        Self {
            min: self.min * factor,
            max: self.max * factor,
        }
    }

    pub fn contains(&self, bytes: u64) -> bool {
        self.min <= bytes && bytes <= self.max
    }
}

/// Offsets (`u64` per node + 1) and degrees (`u32` per node).
fn fixed_overhead(node_count: u64) -> u64 {
    (node_count + 1) * 8 + node_count * 4
}

pub(crate) fn estimate(
    node_count: u64,
    relationship_count: u64,
    compression: Compression,
    with_properties: bool,
) -> MemoryRange {
    let rels = relationship_count;
    let block = BLOCK_SIZE as u64;
    // every list with a partial block adds one (padded) tail
    let max_tails = node_count.min(rels);

    let topology = match compression {
        Compression::Uncompressed => MemoryRange::of(rels * 8),
        // one byte per gap at best, a full var-long per value at worst
        Compression::VarLong => MemoryRange::of_range(rels, rels * MAX_VAR_LONG_BYTES as u64),
        Compression::Packed(tail) => {
            // duplicate targets pack to zero-width blocks
            let min_bytes = rels / block;
            let max_headers = rels / block + max_tails;
            let max_bytes = match tail {
                TailStrategy::BlockAligned => max_headers + (rels + max_tails * block) * 8,
                TailStrategy::PackedTail => max_headers + rels * 8,
                TailStrategy::VarLongTail => {
                    rels / block + rels * MAX_VAR_LONG_BYTES as u64
                }
            };
            MemoryRange::of_range(min_bytes, max_bytes)
        }
    };

    let properties = if with_properties {
        MemoryRange::of(rels * 8)
    } else {
        MemoryRange::of(0)
    };

    topology
        .add(properties)
        .add(MemoryRange::of(fixed_overhead(node_count)))
}
