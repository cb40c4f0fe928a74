//! Reduction of parallel relationships before compression
//!
//! Duplicate targets for the same source are collapsed according to an
//! [`Aggregation`]. This has to happen before delta computation because it
//! changes the value sequence.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Aggregation {
    /// Resolves to `None`.
    #[default]
    Default,
    /// Keep every parallel relationship.
    None,
    /// Keep the first relationship (and its property) only.
    Single,
    Sum,
    Min,
    Max,
    /// Keep one relationship whose property is the number of duplicates.
    Count,
}

impl Aggregation {
    pub fn resolve(self) -> Self {
        match self {
            Aggregation::Default => Aggregation::None,
            other => other,
        }
    }

    /// Whether duplicate targets are collapsed into one.
    pub fn deduplicates(self) -> bool {
        !matches!(self.resolve(), Aggregation::None)
    }

    /// Property value a fresh relationship starts out with.
    #[inline]
    pub fn initial(self, property: f64) -> f64 {
        match self.resolve() {
            Aggregation::Count => 1.0,
            _ => property,
        }
    }

    /// Fold `next` into the running aggregate.
    #[inline]
    pub fn merge(self, running: f64, next: f64) -> f64 {
        match self.resolve() {
            Aggregation::Sum => running + next,
            Aggregation::Min => running.min(next),
            Aggregation::Max => running.max(next),
            Aggregation::Count => running + 1.0,
            Aggregation::Single | Aggregation::None | Aggregation::Default => running,
        }
    }
}

/// Sort `targets` ascending and drop duplicates when the aggregation asks
/// for it. Returns the resulting degree.
pub fn aggregate_targets(targets: &mut Vec<u64>, aggregation: Aggregation) -> usize {
    targets.sort_unstable();
    if aggregation.deduplicates() {
        targets.dedup();
    }
    targets.len()
}

/// Sort `(target, property)` pairs by target and reduce runs of equal
/// targets. The sort is stable so `Single` keeps the first inserted
/// property. Returns the resulting degree.
pub fn aggregate_with_properties(
    targets: &mut Vec<u64>,
    properties: &mut Vec<f64>,
    aggregation: Aggregation,
) -> usize {
    debug_assert_eq!(targets.len(), properties.len());

    let mut pairs: Vec<(u64, f64)> = targets
        .iter()
        .copied()
        .zip(properties.iter().copied())
        .collect();
    pairs.sort_by_key(|&(t, _)| t);

    targets.clear();
    properties.clear();

    if !aggregation.deduplicates() {
        for (t, p) in pairs {
            targets.push(t);
            properties.push(p);
        }
        return targets.len();
    }

    for (t, p) in pairs {
        match targets.last() {
            Some(&last) if last == t => {
                if let Some(running) = properties.last_mut() {
                    *running = aggregation.merge(*running, p);
                }
            }
            _ => {
                targets.push(t);
                properties.push(aggregation.initial(p));
            }
        }
    }

    targets.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolves_to_none() {
        assert_eq!(Aggregation::Default.resolve(), Aggregation::None);
        assert!(!Aggregation::Default.deduplicates());
        assert!(Aggregation::Single.deduplicates());
    }

    #[test]
    fn test_targets_without_dedup() {
        let mut targets = vec![5, 1, 5, 3];
        let degree = aggregate_targets(&mut targets, Aggregation::None);
        assert_eq!(degree, 4);
        assert_eq!(targets, vec![1, 3, 5, 5]);
    }

    #[test]
    fn test_targets_dedup() {
        let mut targets = vec![5, 1, 5, 3, 1];
        let degree = aggregate_targets(&mut targets, Aggregation::Single);
        assert_eq!(degree, 3);
        assert_eq!(targets, vec![1, 3, 5]);
    }

    #[test]
    fn test_properties_sum() {
        let mut targets = vec![2, 1, 2];
        let mut props = vec![1.5, 4.0, 2.5];
        aggregate_with_properties(&mut targets, &mut props, Aggregation::Sum);
        assert_eq!(targets, vec![1, 2]);
        assert_eq!(props, vec![4.0, 4.0]);
    }

    #[test]
    fn test_properties_single_keeps_first() {
        let mut targets = vec![7, 7, 7];
        let mut props = vec![3.0, 1.0, 2.0];
        aggregate_with_properties(&mut targets, &mut props, Aggregation::Single);
        assert_eq!(targets, vec![7]);
        assert_eq!(props, vec![3.0]);
    }

    #[test]
    fn test_properties_min_max_count() {
        let base_t = vec![4, 4, 9];
        let base_p = vec![3.0, -1.0, 8.0];

        let (mut t, mut p) = (base_t.clone(), base_p.clone());
        aggregate_with_properties(&mut t, &mut p, Aggregation::Min);
        assert_eq!(p, vec![-1.0, 8.0]);

        let (mut t, mut p) = (base_t.clone(), base_p.clone());
        aggregate_with_properties(&mut t, &mut p, Aggregation::Max);
        assert_eq!(p, vec![3.0, 8.0]);

        let (mut t, mut p) = (base_t, base_p);
        aggregate_with_properties(&mut t, &mut p, Aggregation::Count);
        assert_eq!(t, vec![4, 9]);
        assert_eq!(p, vec![2.0, 1.0]);
    }
}
