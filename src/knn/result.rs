//! Immutable KNN output

use super::neighbor_list::{Neighbor, NeighborList};
use crate::compression::{Aggregation, Compression};
use crate::graph::{CompressedGraph, GraphBuilder};
use crate::{NodeId, Result};
use serde::{Deserialize, Serialize};

/// One `(source, target, similarity)` row of the result stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub source: NodeId,
    pub target: NodeId,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnnStats {
    pub node_count: u64,
    pub ran_iterations: usize,
    pub did_converge: bool,
    pub node_pairs_considered: u64,
    /// Nodes with at least one neighbor.
    pub nodes_compared: u64,
    pub relationships: u64,
}

/// Distribution of all result similarities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilaritySummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stdev: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub p100: f64,
}

#[derive(Debug, Clone)]
pub struct KnnResult {
    neighbors: Vec<NeighborList>,
    ran_iterations: usize,
    did_converge: bool,
    node_pairs_considered: u64,
    node_count: u64,
}

impl KnnResult {
    pub(crate) fn new(
        neighbors: Vec<NeighborList>,
        ran_iterations: usize,
        did_converge: bool,
        node_pairs_considered: u64,
        node_count: u64,
    ) -> Self {
        Self {
            neighbors,
            ran_iterations,
            did_converge,
            node_pairs_considered,
            node_count,
        }
    }

    /// Result of a run that had nothing to compare.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, false, 0, 0)
    }

    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    pub fn ran_iterations(&self) -> usize {
        self.ran_iterations
    }

    pub fn did_converge(&self) -> bool {
        self.did_converge
    }

    pub fn node_pairs_considered(&self) -> u64 {
        self.node_pairs_considered
    }

    /// Neighbors of `node`, best first. Empty for unknown nodes.
    pub fn neighbor_list(&self, node: NodeId) -> &[Neighbor] {
        self.neighbors
            .get(node as usize)
            .map_or(&[][..], |list| list.as_slice())
    }

    pub fn neighbors_of(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbor_list(node).iter().map(|n| n.id).collect()
    }

    pub fn similarities_of(&self, node: NodeId) -> Vec<f64> {
        self.neighbor_list(node).iter().map(|n| n.similarity).collect()
    }

    /// Total number of `(source, target)` pairs.
    pub fn size(&self) -> u64 {
        self.neighbors.iter().map(|l| l.len() as u64).sum()
    }

    pub fn nodes_compared(&self) -> u64 {
        self.neighbors.iter().filter(|l| !l.is_empty()).count() as u64
    }

    /// Every pair in node order, each node's neighbors best first.
    pub fn stream_similarity_result(&self) -> impl Iterator<Item = SimilarityResult> + '_ {
        self.neighbors.iter().enumerate().flat_map(|(source, list)| {
            list.iter().map(move |n| SimilarityResult {
                source: source as NodeId,
                target: n.id,
                similarity: n.similarity,
            })
        })
    }

    pub fn stats(&self) -> KnnStats {
        KnnStats {
            node_count: self.node_count,
            ran_iterations: self.ran_iterations,
            did_converge: self.did_converge,
            node_pairs_considered: self.node_pairs_considered,
            nodes_compared: self.nodes_compared(),
            relationships: self.size(),
        }
    }

    /// `None` when the result holds no pairs.
    pub fn similarity_summary(&self) -> Option<SimilaritySummary> {
        let mut values: Vec<f64> = self.stream_similarity_result().map(|r| r.similarity).collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);

        let len = values.len() as f64;
        let mean = values.iter().sum::<f64>() / len;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / len;
        let percentile = |p: f64| {
            let rank = ((p / 100.0) * len).ceil() as usize;
            values[rank.clamp(1, values.len()) - 1]
        };

        Some(SimilaritySummary {
            min: values[0],
            max: values[values.len() - 1],
            mean,
            stdev: variance.sqrt(),
            p50: percentile(50.0),
            p75: percentile(75.0),
            p90: percentile(90.0),
            p95: percentile(95.0),
            p99: percentile(99.0),
            p100: percentile(100.0),
        })
    }

    /// Directed KNN graph with the similarity as relationship property.
    pub fn to_graph(&self, compression: Compression) -> Result<CompressedGraph> {
        let mut builder = GraphBuilder::new(self.node_count)
            .compression(compression)
            .aggregation(Aggregation::None);
        for row in self.stream_similarity_result() {
            builder.add_relationship_with_property(row.source, row.target, row.similarity)?;
        }
        builder.build()
    }
}
