//! Builds a `CompressedGraph` from relationship batches
//!
//! Relationships are buffered per source node; `build` aggregates, sorts
//! and compresses every adjacency list in parallel and lays the results
//! out back to back.

use super::properties::{NodePropertyStore, NodePropertyValues};
use super::{AdjacencyBytes, CompressedGraph, CsrTopology};
use crate::compression::{self, Aggregation, Compression};
use crate::{KnnError, NodeId, Result};
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

pub struct GraphBuilder {
    node_count: u64,
    compression: Compression,
    aggregation: Aggregation,
    undirected: bool,
    targets: Vec<Vec<u64>>,
    properties: Option<Vec<Vec<f64>>>,
    node_properties: NodePropertyStore,
}

impl GraphBuilder {
    pub fn new(node_count: u64) -> Self {
        Self {
            node_count,
            compression: Compression::default(),
            aggregation: Aggregation::default(),
            undirected: false,
            targets: vec![Vec::new(); node_count as usize],
            properties: None,
            node_properties: NodePropertyStore::new(),
        }
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    /// Store every relationship in both directions.
    pub fn undirected(mut self, undirected: bool) -> Self {
        self.undirected = undirected;
        self
    }

    fn check(&self, source: NodeId, target: NodeId) -> Result<()> {
        if source >= self.node_count || target >= self.node_count {
            return Err(KnnError::InvalidArgument(format!(
                "relationship ({}, {}) outside node range 0..{}",
                source, target, self.node_count
            )));
        }
        Ok(())
    }

    fn push(&mut self, source: NodeId, target: NodeId, property: Option<f64>) {
        self.targets[source as usize].push(target);
        if let Some(props) = self.properties.as_mut() {
            props[source as usize].push(property.unwrap_or(f64::NAN));
        }
    }

    pub fn add_relationship(&mut self, source: NodeId, target: NodeId) -> Result<()> {
        self.check(source, target)?;
        self.push(source, target, None);
        if self.undirected && source != target {
            self.push(target, source, None);
        }
        Ok(())
    }

    /// Switches the builder to property mode; relationships added without a
    /// property get NaN.
    pub fn add_relationship_with_property(
        &mut self,
        source: NodeId,
        target: NodeId,
        property: f64,
    ) -> Result<()> {
        self.check(source, target)?;
        if self.properties.is_none() {
            let props = self
                .targets
                .iter()
                .map(|t| vec![f64::NAN; t.len()])
                .collect();
            self.properties = Some(props);
        }
        self.push(source, target, Some(property));
        if self.undirected && source != target {
            self.push(target, source, Some(property));
        }
        Ok(())
    }

    pub fn add_node_property(
        &mut self,
        name: impl Into<String>,
        values: NodePropertyValues,
    ) -> Result<()> {
        self.node_properties.insert(name, values, self.node_count)
    }

    pub fn build(self) -> Result<CompressedGraph> {
        let start = Instant::now();
        let GraphBuilder {
            node_count,
            compression,
            aggregation,
            targets,
            properties,
            node_properties,
            ..
        } = self;
        let has_properties = properties.is_some();

        let encoded: Vec<(Vec<u8>, usize)> = match properties {
            Some(properties) => targets
                .into_par_iter()
                .zip(properties.into_par_iter())
                .map(|(mut t, mut p)| {
                    let mut out = Vec::new();
                    let degree =
                        compression::compress(compression, &mut t, Some(&mut p), aggregation, &mut out)?;
                    Ok((out, degree))
                })
                .collect::<Result<_>>()?,
            None => targets
                .into_par_iter()
                .map(|mut t| {
                    let mut out = Vec::new();
                    let degree = compression::compress(compression, &mut t, None, aggregation, &mut out)?;
                    Ok((out, degree))
                })
                .collect::<Result<_>>()?,
        };

        let total_bytes: usize = encoded.iter().map(|(b, _)| b.len()).sum();
        let mut adjacency = Vec::with_capacity(total_bytes);
        let mut offsets = Vec::with_capacity(node_count as usize + 1);
        let mut degrees = Vec::with_capacity(node_count as usize);
        let mut relationship_count = 0u64;

        for (bytes, degree) in encoded {
            if degree > u32::MAX as usize {
                return Err(KnnError::InvalidArgument(format!(
                    "degree {} exceeds u32 range",
                    degree
                )));
            }
            offsets.push(adjacency.len() as u64);
            adjacency.extend_from_slice(&bytes);
            degrees.push(degree as u32);
            relationship_count += degree as u64;
        }
        offsets.push(adjacency.len() as u64);

        debug!(
            "[Graph] Built {} nodes / {} relationships ({:?}, {} bytes) in {:?}",
            node_count,
            relationship_count,
            compression,
            adjacency.len(),
            start.elapsed()
        );

        Ok(CompressedGraph::from_parts(
            CsrTopology {
                compression,
                node_count,
                relationship_count,
                has_properties,
                offsets,
                degrees,
                adjacency: AdjacencyBytes::Owned(adjacency),
            },
            node_properties,
        ))
    }
}
