//! Node similarity over typed property columns
//!
//! A [`SimilarityComputer`] is resolved once per run from the configured
//! property specs. Each property gets a metric (explicit or the default for
//! its value type); several properties are combined by their mean.
//! Evaluation returns `None` for pairs that cannot be compared (absent
//! values, dimension mismatch, empty or zero-variance vectors), and the
//! engine never inserts such pairs.

pub mod cosine;
pub mod euclidean;
pub mod sets;

use crate::config::KnnNodePropertySpec;
use crate::graph::{CompressedGraph, NodePropertyValues, ValueType};
use crate::{KnnError, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Numeric element of a property array.
pub trait Scalar: Copy {
    fn as_f64(self) -> f64;
}

impl Scalar for i64 {
    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f32 {
    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimilarityMetric {
    #[default]
    Default,
    Euclidean,
    Cosine,
    Pearson,
    Jaccard,
    Overlap,
}

impl SimilarityMetric {
    /// Concrete metric for `value_type`, or a configuration error when the
    /// combination is not supported.
    pub fn resolve(self, value_type: ValueType) -> Result<SimilarityMetric> {
        use SimilarityMetric::*;
        let resolved = match (value_type, self) {
            (ValueType::Long | ValueType::Double, Default | Euclidean) => Euclidean,
            (ValueType::LongArray, Default) => Jaccard,
            (ValueType::LongArray, m) => m,
            (ValueType::DoubleArray | ValueType::FloatArray, Default) => Cosine,
            (ValueType::DoubleArray | ValueType::FloatArray, m @ (Euclidean | Cosine | Pearson)) => m,
            (t, m) => {
                return Err(KnnError::InvalidConfig(format!(
                    "metric {:?} is not supported for {:?} properties",
                    m, t
                )))
            }
        };
        Ok(resolved)
    }
}

/// Pairwise similarity used by the engine.
pub trait NodeSimilarity: Send + Sync {
    fn similarity(&self, a: NodeId, b: NodeId) -> Option<f64>;
}

impl<F> NodeSimilarity for F
where
    F: Fn(NodeId, NodeId) -> Option<f64> + Send + Sync,
{
    fn similarity(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self(a, b)
    }
}

/// Shared handle the engine's workers evaluate through.
#[derive(Clone)]
pub struct SimilarityFunction {
    inner: Arc<dyn NodeSimilarity>,
}

impl SimilarityFunction {
    pub fn new<S: NodeSimilarity + 'static>(similarity: S) -> Self {
        Self {
            inner: Arc::new(similarity),
        }
    }

    /// Resolve `specs` against the graph's node properties.
    pub fn of_properties(graph: &CompressedGraph, specs: &[KnnNodePropertySpec]) -> Result<Self> {
        Ok(Self::new(SimilarityComputer::of_properties(graph, specs)?))
    }

    /// `None` when the pair is incomparable; finite values are in `[0, 1]`
    /// for all built-in metrics.
    #[inline]
    pub fn compute(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.inner.similarity(a, b).filter(|s| !s.is_nan())
    }
}

impl fmt::Debug for SimilarityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SimilarityFunction")
    }
}

/// Similarity of one property column under one concrete metric.
#[derive(Debug, Clone)]
pub struct PropertySimilarity {
    name: String,
    values: Arc<NodePropertyValues>,
    metric: SimilarityMetric,
}

impl PropertySimilarity {
    pub fn new(
        name: impl Into<String>,
        values: Arc<NodePropertyValues>,
        metric: SimilarityMetric,
    ) -> Result<Self> {
        let metric = metric.resolve(values.value_type())?;
        let values = match (&*values, metric) {
            // set metrics merge sorted, deduplicated arrays
            (NodePropertyValues::LongArray(arrays), SimilarityMetric::Jaccard | SimilarityMetric::Overlap) => {
                let normalized = arrays
                    .iter()
                    .map(|a| {
                        a.as_ref().map(|a| {
                            let mut a = a.clone();
                            sets::normalize(&mut a);
                            a
                        })
                    })
                    .collect();
                Arc::new(NodePropertyValues::LongArray(normalized))
            }
            _ => values,
        };
        Ok(Self {
            name: name.into(),
            values,
            metric,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    pub fn similarity(&self, a: NodeId, b: NodeId) -> Option<f64> {
        use SimilarityMetric::*;
        let values = &*self.values;
        let score = match values {
            NodePropertyValues::Long(_) => {
                let (x, y) = (values.long_value(a)?, values.long_value(b)?);
                euclidean::distance_to_similarity((x as f64 - y as f64).abs())
            }
            NodePropertyValues::Double(_) => {
                let (x, y) = (values.double_value(a)?, values.double_value(b)?);
                euclidean::distance_to_similarity((x - y).abs())
            }
            NodePropertyValues::LongArray(_) => {
                let (x, y) = (values.long_array_value(a)?, values.long_array_value(b)?);
                match self.metric {
                    Jaccard => sets::jaccard(x, y),
                    Overlap => sets::overlap(x, y),
                    _ => vector_similarity(self.metric, x, y)?,
                }
            }
            NodePropertyValues::DoubleArray(_) => {
                let (x, y) = (values.double_array_value(a)?, values.double_array_value(b)?);
                vector_similarity(self.metric, x, y)?
            }
            NodePropertyValues::FloatArray(_) => {
                let (x, y) = (values.float_array_value(a)?, values.float_array_value(b)?);
                if x.len() != y.len() || x.is_empty() {
                    return None;
                }
                match self.metric {
                    Euclidean => euclidean::euclidean_similarity_f32(x, y),
                    Cosine => cosine::cosine_similarity_f32(x, y),
                    _ => cosine::pearson_similarity(x, y),
                }
            }
        };
        (!score.is_nan()).then_some(score)
    }
}

fn vector_similarity<T: Scalar>(metric: SimilarityMetric, a: &[T], b: &[T]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    Some(match metric {
        SimilarityMetric::Euclidean => euclidean::euclidean_similarity(a, b),
        SimilarityMetric::Pearson => cosine::pearson_similarity(a, b),
        _ => cosine::cosine_similarity(a, b),
    })
}

/// Mean over one or more property similarities.
#[derive(Debug, Clone)]
pub struct SimilarityComputer {
    properties: Vec<PropertySimilarity>,
}

impl SimilarityComputer {
    pub fn of_properties(graph: &CompressedGraph, specs: &[KnnNodePropertySpec]) -> Result<Self> {
        if specs.is_empty() {
            return Err(KnnError::InvalidConfig(
                "at least one node property is required".into(),
            ));
        }
        let properties = specs
            .iter()
            .map(|spec| {
                let values = graph.node_properties(&spec.name)?;
                PropertySimilarity::new(spec.name.clone(), values, spec.metric)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { properties })
    }

    pub fn properties(&self) -> &[PropertySimilarity] {
        &self.properties
    }
}

impl NodeSimilarity for SimilarityComputer {
    fn similarity(&self, a: NodeId, b: NodeId) -> Option<f64> {
        if let [single] = self.properties.as_slice() {
            return single.similarity(a, b);
        }
        let mut sum = 0.0;
        for property in &self.properties {
            sum += property.similarity(a, b)?;
        }
        Some(sum / self.properties.len() as f64)
    }
}
