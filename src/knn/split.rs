//! Split every neighbor list into old and sampled new candidates

use super::neighbor_list::Neighbors;
use crate::concurrency::{Partition, Task, TerminationFlag};
use crate::progress::ProgressTracker;
use crate::{NodeId, Result};
use rand::rngs::StdRng;

/// Works on one partition; `old` and `new` are that partition's slots.
pub struct SplitOldAndNewNeighbors<'a> {
    partition: Partition,
    rng: StdRng,
    neighbors: &'a Neighbors,
    old: &'a mut [Vec<NodeId>],
    new: &'a mut [Vec<NodeId>],
    sampled_k: usize,
    termination_flag: &'a TerminationFlag,
    progress: &'a dyn ProgressTracker,
}

impl<'a> SplitOldAndNewNeighbors<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partition: Partition,
        rng: StdRng,
        neighbors: &'a Neighbors,
        old: &'a mut [Vec<NodeId>],
        new: &'a mut [Vec<NodeId>],
        sampled_k: usize,
        termination_flag: &'a TerminationFlag,
        progress: &'a dyn ProgressTracker,
    ) -> Self {
        debug_assert_eq!(old.len() as u64, partition.len());
        debug_assert_eq!(new.len() as u64, partition.len());
        Self {
            partition,
            rng,
            neighbors,
            old,
            new,
            sampled_k,
            termination_flag,
            progress,
        }
    }
}

impl Task for SplitOldAndNewNeighbors<'_> {
    fn run(&mut self) -> Result<()> {
        let start = self.partition.start();
        for node in self.partition.range() {
            let local = (node - start) as usize;
            self.termination_flag.check_every(local as u64)?;

            self.neighbors.get(node).lock().split_old_and_new(
                self.sampled_k,
                &mut self.rng,
                &mut self.old[local],
                &mut self.new[local],
            );
        }
        self.progress.log_progress(self.partition.len());
        Ok(())
    }
}
