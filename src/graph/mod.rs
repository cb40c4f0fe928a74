//! Compact, immutable graph store
//!
//! Topology is stored CSR style: one contiguous byte buffer holding every
//! node's encoded adjacency list, plus per-node offsets and degrees. The
//! buffers never change after `GraphBuilder::build`; handles and cursors
//! share them through `Arc`.

pub mod builder;
pub mod cursor;
pub mod estimation;
pub mod persistence;
pub mod properties;

pub use builder::GraphBuilder;
pub use cursor::AdjacencyCursor;
pub use estimation::MemoryRange;
pub use properties::{NodePropertyStore, NodePropertyValues, ValueType};

use crate::compression::{AdjacencyDecoder, Compression};
use crate::{KnnError, NodeId, Result};
use memmap2::Mmap;
use std::ops::Deref;
use std::sync::Arc;

/// Encoded adjacency of all nodes, either built in memory or mapped from a
/// graph file.
pub(crate) enum AdjacencyBytes {
    Owned(Vec<u8>),
    /// The adjacency section runs from `start` to the end of the mapping.
    Mapped { map: Mmap, start: usize },
}

impl Deref for AdjacencyBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            AdjacencyBytes::Owned(bytes) => bytes,
            AdjacencyBytes::Mapped { map, start } => &map[*start..],
        }
    }
}

pub(crate) struct CsrTopology {
    pub(crate) compression: Compression,
    pub(crate) node_count: u64,
    pub(crate) relationship_count: u64,
    pub(crate) has_properties: bool,
    /// `node_count + 1` byte offsets into `adjacency`.
    pub(crate) offsets: Vec<u64>,
    pub(crate) degrees: Vec<u32>,
    pub(crate) adjacency: AdjacencyBytes,
}

/// Read-only graph handle. Cloning (or `concurrent_copy`) is cheap and
/// shares all buffers.
#[derive(Clone)]
pub struct CompressedGraph {
    topology: Arc<CsrTopology>,
    properties: NodePropertyStore,
}

impl CompressedGraph {
    pub(crate) fn from_parts(topology: CsrTopology, properties: NodePropertyStore) -> Self {
        Self {
            topology: Arc::new(topology),
            properties,
        }
    }

    pub(crate) fn topology(&self) -> &CsrTopology {
        &self.topology
    }

    /// A graph without relationships, e.g. for pure property similarity.
    pub fn empty(node_count: u64) -> Self {
        Self::from_parts(
            CsrTopology {
                compression: Compression::default(),
                node_count,
                relationship_count: 0,
                has_properties: false,
                offsets: vec![0; node_count as usize + 1],
                degrees: vec![0; node_count as usize],
                adjacency: AdjacencyBytes::Owned(Vec::new()),
            },
            NodePropertyStore::new(),
        )
    }

    pub fn node_count(&self) -> u64 {
        self.topology.node_count
    }

    pub fn relationship_count(&self) -> u64 {
        self.topology.relationship_count
    }

    pub fn compression(&self) -> Compression {
        self.topology.compression
    }

    pub fn has_properties(&self) -> bool {
        self.topology.has_properties
    }

    #[inline]
    pub fn degree(&self, node: NodeId) -> usize {
        self.topology
            .degrees
            .get(node as usize)
            .map_or(0, |&d| d as usize)
    }

    /// Independent handle over the same buffers for another worker.
    pub fn concurrent_copy(&self) -> Self {
        self.clone()
    }

    fn list_bytes(&self, node: NodeId) -> Result<&[u8]> {
        let idx = node as usize;
        if node >= self.topology.node_count {
            return Err(KnnError::InvalidArgument(format!(
                "node {} out of range (node count {})",
                node, self.topology.node_count
            )));
        }
        let start = self.topology.offsets[idx] as usize;
        let end = self.topology.offsets[idx + 1] as usize;
        self.topology.adjacency.get(start..end).ok_or_else(|| {
            KnnError::Corruption(format!(
                "adjacency of node {} ({}..{}) outside buffer of {} bytes",
                node,
                start,
                end,
                self.topology.adjacency.len()
            ))
        })
    }

    pub fn adjacency_cursor(&self, node: NodeId) -> Result<AdjacencyCursor<'_>> {
        let bytes = self.list_bytes(node)?;
        let decoder = AdjacencyDecoder::new(
            self.topology.compression,
            self.degree(node),
            bytes.len(),
            self.topology.has_properties,
        );
        Ok(AdjacencyCursor::new(bytes, decoder, self.topology.has_properties))
    }

    pub fn neighbors(&self, node: NodeId) -> Result<Vec<NodeId>> {
        self.adjacency_cursor(node)?.collect_targets()
    }

    /// Visit `(target, property)` of every relationship of `node`.
    pub fn for_each_relationship<F>(&self, node: NodeId, mut f: F) -> Result<()>
    where
        F: FnMut(NodeId, f64),
    {
        let mut cursor = self.adjacency_cursor(node)?;
        while let Some((target, property)) = cursor.next_with_property()? {
            f(target, property);
        }
        Ok(())
    }

    /// The `index`-th target of `node` in ascending order.
    pub fn nth_neighbor(&self, node: NodeId, index: usize) -> Result<Option<NodeId>> {
        if index >= self.degree(node) {
            return Ok(None);
        }
        self.adjacency_cursor(node)?.nth_target(index)
    }

    pub fn exists(&self, source: NodeId, target: NodeId) -> Result<bool> {
        Ok(self.adjacency_cursor(source)?.skip_until(target)? == Some(target))
    }

    pub fn node_properties(&self, name: &str) -> Result<Arc<NodePropertyValues>> {
        self.properties.get(name)
    }

    pub fn property_store(&self) -> &NodePropertyStore {
        &self.properties
    }

    /// Attach (or replace) a node property column.
    pub fn with_node_property(
        mut self,
        name: impl Into<String>,
        values: NodePropertyValues,
    ) -> Result<Self> {
        self.properties.insert(name, values, self.node_count())?;
        Ok(self)
    }

    /// Decode every list once; fails on the first malformed one.
    pub fn validate(&self) -> Result<()> {
        for node in 0..self.node_count() {
            let mut cursor = self.adjacency_cursor(node)?;
            let mut seen = 0usize;
            while cursor.next_target()?.is_some() {
                seen += 1;
            }
            if seen != self.degree(node) {
                return Err(KnnError::Corruption(format!(
                    "node {} decoded {} targets, degree is {}",
                    node,
                    seen,
                    self.degree(node)
                )));
            }
        }
        Ok(())
    }

    /// Bytes held by the topology buffers.
    pub fn memory_usage(&self) -> usize {
        let t = &self.topology;
        t.adjacency.len() + t.offsets.len() * 8 + t.degrees.len() * 4
    }

    /// Whether the adjacency bytes are served from a mapped graph file.
    pub fn is_memory_mapped(&self) -> bool {
        matches!(self.topology.adjacency, AdjacencyBytes::Mapped { .. })
    }

    /// Best/worst case footprint of a graph with the given dimensions.
    pub fn memory_estimation(
        node_count: u64,
        relationship_count: u64,
        compression: Compression,
        with_properties: bool,
    ) -> MemoryRange {
        estimation::estimate(node_count, relationship_count, compression, with_properties)
    }
}

impl std::fmt::Debug for CompressedGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedGraph")
            .field("node_count", &self.node_count())
            .field("relationship_count", &self.relationship_count())
            .field("compression", &self.compression())
            .field("properties", &self.properties.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{Aggregation, TailStrategy};

    fn ring(n: u64, compression: Compression) -> CompressedGraph {
        let mut builder = GraphBuilder::new(n).compression(compression);
        for i in 0..n {
            builder.add_relationship(i, (i + 1) % n).unwrap();
            builder.add_relationship(i, (i + 2) % n).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_degree_and_neighbors() {
        for compression in [
            Compression::Uncompressed,
            Compression::VarLong,
            Compression::Packed(TailStrategy::VarLongTail),
        ] {
            let graph = ring(10, compression);
            assert_eq!(graph.node_count(), 10);
            assert_eq!(graph.relationship_count(), 20);
            assert_eq!(graph.degree(3), 2);
            assert_eq!(graph.neighbors(3).unwrap(), vec![4, 5]);
            assert_eq!(graph.neighbors(9).unwrap(), vec![0, 1]);
            assert!(graph.exists(8, 9).unwrap());
            assert!(!graph.exists(8, 7).unwrap());
            graph.validate().unwrap();
        }
    }

    #[test]
    fn test_concurrent_copies_share_buffers() {
        let graph = ring(100, Compression::VarLong);
        let copy = graph.concurrent_copy();
        assert!(Arc::ptr_eq(&graph.topology, &copy.topology));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let g = graph.concurrent_copy();
                std::thread::spawn(move || {
                    (0..100u64)
                        .filter(|n| n % 4 == t)
                        .map(|n| g.neighbors(n).unwrap().len())
                        .sum::<usize>()
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 200);
    }

    #[test]
    fn test_nth_neighbor() {
        let graph = ring(10, Compression::Packed(TailStrategy::PackedTail));
        assert_eq!(graph.nth_neighbor(0, 0).unwrap(), Some(1));
        assert_eq!(graph.nth_neighbor(0, 1).unwrap(), Some(2));
        assert_eq!(graph.nth_neighbor(0, 2).unwrap(), None);
    }

    #[test]
    fn test_cursor_iterates_and_skips() {
        let mut builder = GraphBuilder::new(200).compression(Compression::Packed(TailStrategy::BlockAligned));
        for t in (1..200).step_by(2) {
            builder.add_relationship(0, t).unwrap();
        }
        let graph = builder.build().unwrap();

        let cursor = graph.adjacency_cursor(0).unwrap();
        assert_eq!(cursor.size_hint(), (100, Some(100)));
        let all: Vec<NodeId> = cursor.collect::<Result<_>>().unwrap();
        assert_eq!(all.len(), 100);

        let mut cursor = graph.adjacency_cursor(0).unwrap();
        assert_eq!(cursor.skip_until(150).unwrap(), Some(151));
        assert_eq!(cursor.remaining(), 24);
        assert_eq!(cursor.next().transpose().unwrap(), Some(153));
    }

    #[test]
    fn test_out_of_range_node() {
        let graph = ring(4, Compression::VarLong);
        assert_eq!(graph.degree(99), 0);
        assert!(graph.adjacency_cursor(99).is_err());
    }

    #[test]
    fn test_relationship_properties() {
        let mut builder = GraphBuilder::new(3)
            .compression(Compression::Packed(TailStrategy::BlockAligned))
            .aggregation(Aggregation::Max);
        builder.add_relationship_with_property(0, 2, 1.0).unwrap();
        builder.add_relationship_with_property(0, 1, 0.5).unwrap();
        builder.add_relationship_with_property(0, 2, 3.0).unwrap();
        let graph = builder.build().unwrap();

        let mut seen = Vec::new();
        graph.for_each_relationship(0, |t, p| seen.push((t, p))).unwrap();
        assert_eq!(seen, vec![(1, 0.5), (2, 3.0)]);
    }

    #[test]
    fn test_empty_graph() {
        let graph = CompressedGraph::empty(5);
        assert_eq!(graph.node_count(), 5);
        assert_eq!(graph.degree(2), 0);
        assert!(graph.neighbors(2).unwrap().is_empty());
    }

    #[test]
    fn test_node_property_attach() {
        let graph = CompressedGraph::empty(2)
            .with_node_property("score", NodePropertyValues::Double(vec![1.0, 2.0]))
            .unwrap();
        assert_eq!(graph.node_properties("score").unwrap().double_value(1), Some(2.0));
        assert!(graph.node_properties("nope").is_err());
    }
}
