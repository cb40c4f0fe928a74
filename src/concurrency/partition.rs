//! Contiguous node-range partitions

use crate::NodeId;
use std::ops::Range;

/// A half-open range `[start, start + len)` of node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    start: NodeId,
    len: u64,
}

impl Partition {
    pub fn new(start: NodeId, len: u64) -> Self {
        Self { start, len }
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> NodeId {
        self.start + self.len
    }

    pub fn range(&self) -> Range<NodeId> {
        self.start..self.end()
    }

    pub fn iter(&self) -> Range<NodeId> {
        self.range()
    }

    pub fn consume<F: FnMut(NodeId)>(&self, mut f: F) {
        for node_id in self.range() {
            f(node_id);
        }
    }
}

pub struct PartitionUtils;

impl PartitionUtils {
    /// Batch size used for `node_count` nodes over `concurrency` workers,
    /// never smaller than `min_batch_size`.
    pub fn adjusted_batch_size(node_count: u64, concurrency: usize, min_batch_size: u64) -> u64 {
        let concurrency = concurrency.max(1) as u64;
        node_count.div_ceil(concurrency).max(min_batch_size).max(1)
    }

    /// Split `[0, node_count)` into at most `concurrency` ascending,
    /// contiguous partitions of at least `min_batch_size` nodes (the last
    /// one may be shorter) and map each through `factory`.
    pub fn range_partition<T, F>(
        concurrency: usize,
        node_count: u64,
        min_batch_size: Option<u64>,
        mut factory: F,
    ) -> Vec<T>
    where
        F: FnMut(Partition) -> T,
    {
        let batch_size =
            Self::adjusted_batch_size(node_count, concurrency, min_batch_size.unwrap_or(1));

        let mut tasks = Vec::with_capacity(node_count.div_ceil(batch_size) as usize);
        let mut start = 0;
        while start < node_count {
            let len = batch_size.min(node_count - start);
            tasks.push(factory(Partition::new(start, len)));
            start += len;
        }
        tasks
    }

    pub fn range_partitions(
        concurrency: usize,
        node_count: u64,
        min_batch_size: Option<u64>,
    ) -> Vec<Partition> {
        Self::range_partition(concurrency, node_count, min_batch_size, |p| p)
    }
}
