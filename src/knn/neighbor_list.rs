//! Bounded, ordered neighbor lists
//!
//! Entries are kept best first: higher similarity first, equal similarity
//! ordered by ascending neighbor id. A list never holds its owner and never
//! holds the same id twice.

use crate::NodeId;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: NodeId,
    pub similarity: f64,
    /// Set once the entry has taken part in a join as a "new" neighbor.
    checked: bool,
}

impl Neighbor {
    pub fn is_checked(&self) -> bool {
        self.checked
    }
}

/// Total order used for insertion and eviction.
#[inline]
fn rank(a_similarity: f64, a_id: NodeId, b_similarity: f64, b_id: NodeId) -> Ordering {
    b_similarity
        .partial_cmp(&a_similarity)
        .unwrap_or(Ordering::Equal)
        .then(a_id.cmp(&b_id))
}

#[derive(Debug, Clone)]
pub struct NeighborList {
    capacity: usize,
    entries: Vec<Neighbor>,
}

impl NeighborList {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.iter().any(|n| n.id == id)
    }

    /// Offer `candidate` to the list owned by `owner`. Returns whether the
    /// list changed. A full list only takes a candidate that ranks before
    /// its current worst entry.
    pub fn add(&mut self, owner: NodeId, candidate: NodeId, similarity: f64) -> bool {
        if candidate == owner || self.capacity == 0 || similarity.is_nan() {
            return false;
        }
        if self.contains(candidate) {
            return false;
        }

        let position = self
            .entries
            .partition_point(|e| rank(e.similarity, e.id, similarity, candidate) == Ordering::Less);

        if self.entries.len() == self.capacity {
            if position == self.entries.len() {
                return false;
            }
            self.entries.pop();
        }
        self.entries.insert(
            position,
            Neighbor {
                id: candidate,
                similarity,
                checked: false,
            },
        );
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Neighbor> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Neighbor] {
        &self.entries
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|n| n.id)
    }

    pub fn worst_similarity(&self) -> Option<f64> {
        self.entries.last().map(|n| n.similarity)
    }

    /// Checked ids go to `old`; unchecked ids go to `new`, shuffled and cut
    /// down to `sampled_k`. The surviving new entries become checked.
    pub fn split_old_and_new<R: Rng + ?Sized>(
        &mut self,
        sampled_k: usize,
        rng: &mut R,
        old: &mut Vec<NodeId>,
        new: &mut Vec<NodeId>,
    ) {
        old.clear();
        new.clear();
        for entry in &self.entries {
            if entry.checked {
                old.push(entry.id);
            } else {
                new.push(entry.id);
            }
        }

        if new.len() > sampled_k {
            new.shuffle(rng);
            new.truncate(sampled_k);
        }
        for entry in self.entries.iter_mut() {
            if !entry.checked && new.contains(&entry.id) {
                entry.checked = true;
            }
        }
    }

    /// Drop every entry with similarity below `cutoff`.
    pub fn filter_high_similarity(&mut self, cutoff: f64) {
        self.entries.retain(|n| n.similarity >= cutoff);
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.entries
    }
}

/// One lock-guarded list per node. Lists may receive inserts from any
/// partition during the join phase.
pub struct Neighbors {
    lists: Vec<Mutex<NeighborList>>,
}

impl Neighbors {
    pub fn new(node_count: u64, capacity: usize) -> Self {
        Self {
            lists: (0..node_count).map(|_| Mutex::new(NeighborList::new(capacity))).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    #[inline]
    pub fn get(&self, node: NodeId) -> &Mutex<NeighborList> {
        &self.lists[node as usize]
    }

    #[inline]
    pub fn add(&self, owner: NodeId, candidate: NodeId, similarity: f64) -> bool {
        self.lists[owner as usize].lock().add(owner, candidate, similarity)
    }

    pub fn into_lists(self) -> Vec<NeighborList> {
        self.lists.into_iter().map(Mutex::into_inner).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ids(list: &NeighborList) -> Vec<NodeId> {
        list.ids().collect()
    }

    #[test]
    fn test_ordered_and_bounded() {
        let mut list = NeighborList::new(3);
        assert!(list.add(0, 1, 0.5));
        assert!(list.add(0, 2, 0.9));
        assert!(list.add(0, 3, 0.1));
        assert_eq!(ids(&list), vec![2, 1, 3]);

        // worse than the worst: rejected
        assert!(!list.add(0, 4, 0.05));
        // better: evicts the worst
        assert!(list.add(0, 5, 0.6));
        assert_eq!(ids(&list), vec![2, 5, 1]);
        assert_eq!(list.worst_similarity(), Some(0.5));
    }

    #[test]
    fn test_rejects_self_and_duplicates() {
        let mut list = NeighborList::new(3);
        assert!(!list.add(7, 7, 1.0));
        assert!(list.add(7, 1, 0.5));
        assert!(!list.add(7, 1, 0.5));
        assert!(!list.add(7, 1, 0.9));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_equal_similarity_lower_id_wins() {
        let mut list = NeighborList::new(1);
        assert!(list.add(0, 5, 0.5));
        assert!(!list.add(0, 9, 0.5));
        assert!(list.add(0, 3, 0.5));
        assert_eq!(ids(&list), vec![3]);

        let mut list = NeighborList::new(3);
        for id in [8, 2, 5] {
            list.add(0, id, 1.0);
        }
        assert_eq!(ids(&list), vec![2, 5, 8]);
    }

    #[test]
    fn test_zero_capacity_and_nan() {
        let mut list = NeighborList::new(0);
        assert!(!list.add(0, 1, 1.0));
        let mut list = NeighborList::new(2);
        assert!(!list.add(0, 1, f64::NAN));
    }

    #[test]
    fn test_split_marks_sampled_new_as_checked() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut list = NeighborList::new(4);
        for (id, s) in [(1, 0.9), (2, 0.8), (3, 0.7), (4, 0.6)] {
            list.add(0, id, s);
        }

        let (mut old, mut new) = (Vec::new(), Vec::new());
        list.split_old_and_new(2, &mut rng, &mut old, &mut new);
        assert!(old.is_empty());
        assert_eq!(new.len(), 2);
        assert_eq!(list.iter().filter(|n| n.is_checked()).count(), 2);

        list.split_old_and_new(2, &mut rng, &mut old, &mut new);
        assert_eq!(old.len(), 2);
        assert_eq!(new.len(), 2);
        assert!(new.iter().all(|id| !old.contains(id)));

        list.split_old_and_new(2, &mut rng, &mut old, &mut new);
        assert_eq!(old.len(), 4);
        assert!(new.is_empty());
    }

    #[test]
    fn test_filter_high_similarity() {
        let mut list = NeighborList::new(3);
        list.add(0, 1, 0.9);
        list.add(0, 2, 0.4);
        list.add(0, 3, 0.5);
        list.filter_high_similarity(0.5);
        assert_eq!(ids(&list), vec![1, 3]);
    }

    #[test]
    fn test_concurrent_inserts() {
        let neighbors = Neighbors::new(2, 8);
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let neighbors = &neighbors;
                scope.spawn(move || {
                    for i in 0..50u64 {
                        let candidate = 2 + t * 50 + i;
                        neighbors.add(0, candidate, (candidate % 17) as f64 / 17.0);
                    }
                });
            }
        });
        let list = neighbors.get(0).lock();
        assert_eq!(list.len(), 8);
        let sims: Vec<f64> = list.iter().map(|n| n.similarity).collect();
        assert!(sims.windows(2).all(|w| w[0] >= w[1]));
    }
}
