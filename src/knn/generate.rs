//! Initialization: random candidate lists per partition

use super::neighbor_list::Neighbors;
use super::sampler::KnnSampler;
use crate::concurrency::{Partition, Task, TerminationFlag};
use crate::progress::ProgressTracker;
use crate::similarity::SimilarityFunction;
use crate::Result;
use rand::rngs::StdRng;

pub struct GenerateRandomNeighbors<'a> {
    partition: Partition,
    rng: StdRng,
    sampler: KnnSampler,
    similarity: &'a SimilarityFunction,
    neighbors: &'a Neighbors,
    bounded_k: usize,
    termination_flag: &'a TerminationFlag,
    progress: &'a dyn ProgressTracker,
    neighbors_found: u64,
}

impl<'a> GenerateRandomNeighbors<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partition: Partition,
        rng: StdRng,
        sampler: KnnSampler,
        similarity: &'a SimilarityFunction,
        neighbors: &'a Neighbors,
        bounded_k: usize,
        termination_flag: &'a TerminationFlag,
        progress: &'a dyn ProgressTracker,
    ) -> Self {
        Self {
            partition,
            rng,
            sampler,
            similarity,
            neighbors,
            bounded_k,
            termination_flag,
            progress,
            neighbors_found: 0,
        }
    }

    /// Candidates scored by this task, comparable or not.
    pub fn neighbors_found(&self) -> u64 {
        self.neighbors_found
    }
}

impl Task for GenerateRandomNeighbors<'_> {
    fn run(&mut self) -> Result<()> {
        let mut candidates = Vec::with_capacity(self.bounded_k);

        for (processed, node) in self.partition.range().enumerate() {
            self.termination_flag.check_every(processed as u64)?;

            self.sampler
                .sample(node, self.bounded_k, &mut self.rng, &mut candidates)?;

            let mut list = self.neighbors.get(node).lock();
            for &candidate in &candidates {
                self.neighbors_found += 1;
                if let Some(similarity) = self.similarity.compute(node, candidate) {
                    list.add(node, candidate, similarity);
                }
            }
        }

        self.progress.log_progress(self.partition.len());
        Ok(())
    }
}
