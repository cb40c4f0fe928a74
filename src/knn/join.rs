//! Local join: compare candidate pairs around every node

use super::neighbor_list::Neighbors;
use crate::concurrency::{Partition, Task, TerminationFlag};
use crate::progress::ProgressTracker;
use crate::similarity::SimilarityFunction;
use crate::{NodeId, Result};
use ahash::AHashSet;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;

/// Read-only candidate maps of one iteration, indexed by node id.
#[derive(Clone, Copy)]
pub struct CandidateMaps<'a> {
    pub old: &'a [Vec<NodeId>],
    pub new: &'a [Vec<NodeId>],
    pub reverse_old: &'a [Vec<NodeId>],
    pub reverse_new: &'a [Vec<NodeId>],
}

pub struct JoinNeighbors<'a> {
    partition: Partition,
    rng: StdRng,
    similarity: &'a SimilarityFunction,
    neighbors: &'a Neighbors,
    candidates: CandidateMaps<'a>,
    sampled_k: usize,
    perturbation_rate: f64,
    random_joins: usize,
    node_count: u64,
    termination_flag: &'a TerminationFlag,
    progress: &'a dyn ProgressTracker,
    update_count: u64,
    node_pairs_considered: u64,
}

impl<'a> JoinNeighbors<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partition: Partition,
        rng: StdRng,
        similarity: &'a SimilarityFunction,
        neighbors: &'a Neighbors,
        candidates: CandidateMaps<'a>,
        sampled_k: usize,
        perturbation_rate: f64,
        random_joins: usize,
        termination_flag: &'a TerminationFlag,
        progress: &'a dyn ProgressTracker,
    ) -> Self {
        Self {
            partition,
            rng,
            similarity,
            neighbors,
            node_count: neighbors.len() as u64,
            candidates,
            sampled_k,
            perturbation_rate,
            random_joins,
            termination_flag,
            progress,
            update_count: 0,
            node_pairs_considered: 0,
        }
    }

    /// Successful list insertions from candidate pairs. Random joins do not
    /// count.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn node_pairs_considered(&self) -> u64 {
        self.node_pairs_considered
    }

    /// Score `a`/`b` once and offer the pair to both lists.
    fn join(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        self.node_pairs_considered += 1;
        if let Some(similarity) = self.similarity.compute(a, b) {
            self.update_count += self.neighbors.add(a, b, similarity) as u64;
            self.update_count += self.neighbors.add(b, a, similarity) as u64;
        }
    }

    fn random_join(&mut self, node: NodeId) {
        let mut other = self.rng.gen_range(0..self.node_count - 1);
        if other >= node {
            other += 1;
        }
        self.node_pairs_considered += 1;
        if let Some(similarity) = self.similarity.compute(node, other) {
            self.neighbors.add(node, other, similarity);
            if self.perturbation_rate > 0.0 && self.rng.gen_bool(self.perturbation_rate) {
                self.neighbors.add(other, node, similarity);
            }
        }
    }
}

/// `forward ∪ sample(reverse, sampled_k)` without duplicates, into `out`.
fn combine<R: Rng + ?Sized>(
    forward: &[NodeId],
    reverse: &[NodeId],
    sampled_k: usize,
    rng: &mut R,
    seen: &mut AHashSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    out.clear();
    seen.clear();
    for &id in forward {
        if seen.insert(id) {
            out.push(id);
        }
    }
    if reverse.len() <= sampled_k {
        for &id in reverse {
            if seen.insert(id) {
                out.push(id);
            }
        }
    } else {
        for idx in index::sample(rng, reverse.len(), sampled_k) {
            let id = reverse[idx];
            if seen.insert(id) {
                out.push(id);
            }
        }
    }
}

impl Task for JoinNeighbors<'_> {
    fn run(&mut self) -> Result<()> {
        let mut seen = AHashSet::new();
        let mut new_candidates = Vec::new();
        let mut old_candidates = Vec::new();
        let maps = self.candidates;

        for (processed, node) in self.partition.range().enumerate() {
            self.termination_flag.check_every(processed as u64)?;
            let idx = node as usize;

            combine(
                &maps.new[idx],
                &maps.reverse_new[idx],
                self.sampled_k,
                &mut self.rng,
                &mut seen,
                &mut new_candidates,
            );
            combine(
                &maps.old[idx],
                &maps.reverse_old[idx],
                self.sampled_k,
                &mut self.rng,
                &mut seen,
                &mut old_candidates,
            );

            for i in 0..new_candidates.len() {
                let a = new_candidates[i];
                for j in (i + 1)..new_candidates.len() {
                    self.join(a, new_candidates[j]);
                }
                for &b in &old_candidates {
                    self.join(a, b);
                }
            }

            for _ in 0..self.random_joins {
                self.random_join(node);
            }
        }

        self.progress.log_progress(self.partition.len());
        Ok(())
    }
}
