//! Node property columns
//!
//! Absent values follow one convention per type:
//! - `Long`: `i64::MIN`
//! - `Double`: NaN
//! - arrays: `None`

use crate::{KnnError, NodeId, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const LONG_DEFAULT_FALLBACK: i64 = i64::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Long,
    Double,
    LongArray,
    DoubleArray,
    FloatArray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodePropertyValues {
    Long(Vec<i64>),
    Double(Vec<f64>),
    LongArray(Vec<Option<Vec<i64>>>),
    DoubleArray(Vec<Option<Vec<f64>>>),
    FloatArray(Vec<Option<Vec<f32>>>),
}

impl NodePropertyValues {
    pub fn value_type(&self) -> ValueType {
        match self {
            NodePropertyValues::Long(_) => ValueType::Long,
            NodePropertyValues::Double(_) => ValueType::Double,
            NodePropertyValues::LongArray(_) => ValueType::LongArray,
            NodePropertyValues::DoubleArray(_) => ValueType::DoubleArray,
            NodePropertyValues::FloatArray(_) => ValueType::FloatArray,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            NodePropertyValues::Long(v) => v.len(),
            NodePropertyValues::Double(v) => v.len(),
            NodePropertyValues::LongArray(v) => v.len(),
            NodePropertyValues::DoubleArray(v) => v.len(),
            NodePropertyValues::FloatArray(v) => v.len(),
        }
    }

    pub fn long_value(&self, node: NodeId) -> Option<i64> {
        match self {
            NodePropertyValues::Long(v) => v
                .get(node as usize)
                .copied()
                .filter(|&x| x != LONG_DEFAULT_FALLBACK),
            _ => None,
        }
    }

    pub fn double_value(&self, node: NodeId) -> Option<f64> {
        match self {
            NodePropertyValues::Double(v) => v.get(node as usize).copied().filter(|x| !x.is_nan()),
            _ => None,
        }
    }

    pub fn long_array_value(&self, node: NodeId) -> Option<&[i64]> {
        match self {
            NodePropertyValues::LongArray(v) => v.get(node as usize)?.as_deref(),
            _ => None,
        }
    }

    pub fn double_array_value(&self, node: NodeId) -> Option<&[f64]> {
        match self {
            NodePropertyValues::DoubleArray(v) => v.get(node as usize)?.as_deref(),
            _ => None,
        }
    }

    pub fn float_array_value(&self, node: NodeId) -> Option<&[f32]> {
        match self {
            NodePropertyValues::FloatArray(v) => v.get(node as usize)?.as_deref(),
            _ => None,
        }
    }

    /// Length of the first present array value, if this is an array column.
    pub fn dimension(&self) -> Option<usize> {
        match self {
            NodePropertyValues::LongArray(v) => v.iter().flatten().map(|a| a.len()).next(),
            NodePropertyValues::DoubleArray(v) => v.iter().flatten().map(|a| a.len()).next(),
            NodePropertyValues::FloatArray(v) => v.iter().flatten().map(|a| a.len()).next(),
            _ => None,
        }
    }
}

/// Named property columns of one graph. Cloning shares the columns.
#[derive(Debug, Clone, Default)]
pub struct NodePropertyStore {
    properties: AHashMap<String, Arc<NodePropertyValues>>,
}

impl NodePropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column; it must hold exactly `node_count` values.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        values: NodePropertyValues,
        node_count: u64,
    ) -> Result<()> {
        let name = name.into();
        if values.node_count() as u64 != node_count {
            return Err(KnnError::InvalidArgument(format!(
                "property '{}' has {} values for {} nodes",
                name,
                values.node_count(),
                node_count
            )));
        }
        self.properties.insert(name, Arc::new(values));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<NodePropertyValues>> {
        self.properties
            .get(name)
            .cloned()
            .ok_or_else(|| KnnError::PropertyNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Columns in name order (stable for persistence).
    pub fn to_sorted_vec(&self) -> Vec<(String, NodePropertyValues)> {
        let mut columns: Vec<_> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), (**v).clone()))
            .collect();
        columns.sort_by(|a, b| a.0.cmp(&b.0));
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_values() {
        let longs = NodePropertyValues::Long(vec![1, LONG_DEFAULT_FALLBACK]);
        assert_eq!(longs.long_value(0), Some(1));
        assert_eq!(longs.long_value(1), None);
        assert_eq!(longs.long_value(7), None);

        let doubles = NodePropertyValues::Double(vec![f64::NAN, 2.5]);
        assert_eq!(doubles.double_value(0), None);
        assert_eq!(doubles.double_value(1), Some(2.5));

        let arrays = NodePropertyValues::DoubleArray(vec![None, Some(vec![1.0, 2.0])]);
        assert_eq!(arrays.double_array_value(0), None);
        assert_eq!(arrays.double_array_value(1), Some(&[1.0, 2.0][..]));
        assert_eq!(arrays.dimension(), Some(2));
    }

    #[test]
    fn test_wrong_type_accessor_is_none() {
        let floats = NodePropertyValues::FloatArray(vec![Some(vec![1.0])]);
        assert_eq!(floats.value_type(), ValueType::FloatArray);
        assert!(floats.double_array_value(0).is_none());
        assert!(floats.float_array_value(0).is_some());
    }

    #[test]
    fn test_store_checks_length() {
        let mut store = NodePropertyStore::new();
        assert!(store
            .insert("age", NodePropertyValues::Long(vec![1, 2]), 3)
            .is_err());
        store
            .insert("age", NodePropertyValues::Long(vec![1, 2, 3]), 3)
            .unwrap();
        assert!(store.contains("age"));
        assert!(matches!(store.get("missing"), Err(KnnError::PropertyNotFound(_))));
    }
}
