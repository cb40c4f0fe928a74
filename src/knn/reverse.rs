//! Reverse old/new candidate maps

use crate::concurrency::{PartitionUtils, TerminationFlag};
use crate::progress::ProgressTracker;
use crate::{KnnError, NodeId, Result};

/// For every `node` and each `n` in `forward[node]`, push `node` onto
/// `reverse[n]`. `reverse` must be empty and as long as `forward`.
fn reverse_neighbors(node: NodeId, forward: &[Vec<NodeId>], reverse: &mut [Vec<NodeId>]) -> Result<()> {
    for &neighbor in &forward[node as usize] {
        if neighbor == node {
            return Err(KnnError::Corruption(format!(
                "node {} lists itself as candidate",
                node
            )));
        }
        reverse[neighbor as usize].push(node);
    }
    Ok(())
}

/// Sequential over all nodes; the flag is polled at the usual cadence.
#[allow(clippy::too_many_arguments)]
pub fn reverse_old_and_new(
    old: &[Vec<NodeId>],
    new: &[Vec<NodeId>],
    reverse_old: &mut [Vec<NodeId>],
    reverse_new: &mut [Vec<NodeId>],
    concurrency: usize,
    min_batch_size: u64,
    termination_flag: &TerminationFlag,
    progress: &dyn ProgressTracker,
) -> Result<()> {
    let node_count = new.len() as u64;
    let log_batch = PartitionUtils::adjusted_batch_size(node_count, concurrency, min_batch_size);

    for node in 0..node_count {
        termination_flag.check_every(node)?;
        reverse_neighbors(node, old, reverse_old)?;
        reverse_neighbors(node, new, reverse_new)?;

        if (node + 1) % log_batch == 0 {
            progress.log_progress(log_batch);
        }
    }
    Ok(())
}
