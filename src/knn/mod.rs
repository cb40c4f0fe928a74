//! NN-Descent approximate k-nearest-neighbor graph construction
//!
//! A run is a sequence of barrier-separated phases over range partitions
//! of the node id space:
//!
//! 1. initialization: every node gets `bounded_k` sampled candidates
//! 2. per iteration: split (parallel), reverse (sequential), join (parallel)
//! 3. optional similarity cutoff (parallel)
//!
//! Neighbor lists are the only state shared between workers; each one is
//! guarded by its own lock. Every partition task owns an RNG derived from
//! the run's master RNG, so a fixed seed together with a single worker
//! reproduces a run exactly.

pub mod generate;
pub mod join;
pub mod neighbor_list;
pub mod result;
pub mod reverse;
pub mod sampler;
pub mod split;

pub use join::CandidateMaps;
pub use neighbor_list::{Neighbor, NeighborList, Neighbors};
pub use result::{KnnResult, KnnStats, SimilarityResult, SimilaritySummary};
pub use sampler::KnnSampler;

use crate::concurrency::{Executor, ParallelUtil, PartitionUtils, RunWithConcurrency, Task, TerminationFlag};
use crate::config::KnnConfig;
use crate::graph::CompressedGraph;
use crate::progress::{NoopProgressTracker, ProgressTracker};
use crate::similarity::SimilarityFunction;
use crate::{NodeId, Result};
use generate::GenerateRandomNeighbors;
use join::JoinNeighbors;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reverse::reverse_old_and_new;
use split::SplitOldAndNewNeighbors;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runtime collaborators of a run.
#[derive(Clone)]
pub struct KnnContext {
    executor: Executor,
    progress: Arc<dyn ProgressTracker>,
    termination_flag: TerminationFlag,
}

impl KnnContext {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            progress: Arc::new(NoopProgressTracker),
            termination_flag: TerminationFlag::new(),
        }
    }

    /// Context with a fresh pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self> {
        Ok(Self::new(Executor::new(threads)?))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_termination_flag(mut self, flag: TerminationFlag) -> Self {
        self.termination_flag = flag;
        self
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn progress(&self) -> &dyn ProgressTracker {
        &*self.progress
    }

    /// Handle for stopping the run from another thread.
    pub fn termination_flag(&self) -> &TerminationFlag {
        &self.termination_flag
    }
}

impl std::fmt::Debug for KnnContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnnContext")
            .field("executor", &self.executor)
            .field("terminated", &!self.termination_flag.running())
            .finish()
    }
}

/// Per-iteration candidate buffers, reused across iterations.
struct CandidateBuffers {
    old: Vec<Vec<NodeId>>,
    new: Vec<Vec<NodeId>>,
    reverse_old: Vec<Vec<NodeId>>,
    reverse_new: Vec<Vec<NodeId>>,
}

impl CandidateBuffers {
    fn new(node_count: u64) -> Self {
        let n = node_count as usize;
        Self {
            old: vec![Vec::new(); n],
            new: vec![Vec::new(); n],
            reverse_old: vec![Vec::new(); n],
            reverse_new: vec![Vec::new(); n],
        }
    }

    fn clear_reverse(&mut self) {
        self.reverse_old.iter_mut().for_each(Vec::clear);
        self.reverse_new.iter_mut().for_each(Vec::clear);
    }

    fn maps(&self) -> CandidateMaps<'_> {
        CandidateMaps {
            old: &self.old,
            new: &self.new,
            reverse_old: &self.reverse_old,
            reverse_new: &self.reverse_new,
        }
    }
}

/// Outcome of one join phase.
#[derive(Debug, Clone, Copy, Default)]
struct IterationStats {
    update_count: u64,
    node_pairs_considered: u64,
}

pub struct Knn {
    graph: CompressedGraph,
    config: KnnConfig,
    similarity: SimilarityFunction,
    context: KnnContext,
}

impl Knn {
    pub fn new(
        graph: CompressedGraph,
        config: KnnConfig,
        similarity: SimilarityFunction,
        context: KnnContext,
    ) -> Self {
        Self {
            graph,
            config,
            similarity,
            context,
        }
    }

    /// Engine comparing nodes over the properties named in
    /// `config.node_properties`.
    pub fn of_properties(graph: CompressedGraph, config: KnnConfig, context: KnnContext) -> Result<Self> {
        config.validate()?;
        let similarity = SimilarityFunction::of_properties(&graph, &config.node_properties)?;
        Ok(Self::new(graph, config, similarity, context))
    }

    pub fn config(&self) -> &KnnConfig {
        &self.config
    }

    pub fn context(&self) -> &KnnContext {
        &self.context
    }

    pub fn compute(&self) -> Result<KnnResult> {
        let node_count = self.graph.node_count();
        if node_count < 2 || self.config.top_k == 0 {
            debug!("[KNN] Nothing to compare: {} nodes, topK {}", node_count, self.config.top_k);
            return Ok(KnnResult::empty());
        }
        self.config.validate()?;

        let started = Instant::now();
        let progress = self.context.progress();
        let mut master = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let bounded_k = self.config.bounded_k(node_count);
        let sampled_k = self.config.sampled_k(node_count);
        let update_threshold = self.config.update_threshold(node_count);
        info!(
            "[KNN] Start: {} nodes, topK {}, sampledK {}, threshold {}, concurrency {}",
            node_count, bounded_k, sampled_k, update_threshold, self.config.concurrency
        );

        progress.begin_subtask("Initialize random neighbors");
        let neighbors = Neighbors::new(node_count, bounded_k);
        let mut node_pairs_considered = self.initialize(&neighbors, bounded_k, &mut master)?;
        progress.end_subtask("Initialize random neighbors");

        progress.begin_subtask("Iteration");
        let mut buffers = CandidateBuffers::new(node_count);
        let mut iteration = 0;
        let mut did_converge = false;
        while iteration < self.config.max_iterations {
            let stats = self.iteration(&neighbors, sampled_k, &mut buffers, &mut master)?;
            node_pairs_considered += stats.node_pairs_considered;
            debug!(
                "[KNN] Iteration {}: {} updates, {} pairs",
                iteration + 1,
                stats.update_count,
                stats.node_pairs_considered
            );
            iteration += 1;
            if stats.update_count <= update_threshold {
                did_converge = true;
                break;
            }
        }
        progress.end_subtask("Iteration");

        if self.config.similarity_cutoff > 0.0 {
            progress.begin_subtask("Filter results");
            let cutoff = self.config.similarity_cutoff;
            ParallelUtil::read_parallel(
                self.config.concurrency,
                node_count,
                Some(self.config.min_batch_size),
                &self.context.executor,
                &self.context.termination_flag,
                |partition| {
                    for node in partition.iter() {
                        neighbors.get(node).lock().filter_high_similarity(cutoff);
                    }
                    progress.log_progress(partition.len());
                    Ok(())
                },
            )?;
            progress.end_subtask("Filter results");
        }

        info!(
            "[KNN] Finished in {:?}: {} iterations, converged={}, {} pairs considered",
            started.elapsed(),
            iteration,
            did_converge,
            node_pairs_considered
        );

        Ok(KnnResult::new(
            neighbors.into_lists(),
            iteration,
            did_converge,
            node_pairs_considered,
            node_count,
        ))
    }

    fn initialize(&self, neighbors: &Neighbors, bounded_k: usize, master: &mut StdRng) -> Result<u64> {
        let node_count = self.graph.node_count();
        let progress = self.context.progress();
        let flag = self.context.termination_flag.child();

        let tasks = PartitionUtils::range_partition(
            self.config.concurrency,
            node_count,
            Some(self.config.min_batch_size),
            |partition| {
                GenerateRandomNeighbors::new(
                    partition,
                    StdRng::seed_from_u64(master.gen()),
                    KnnSampler::new(self.config.initial_sampler, &self.graph),
                    &self.similarity,
                    neighbors,
                    bounded_k,
                    &flag,
                    progress,
                )
            },
        );

        let done = self.run_tasks(tasks, &flag)?;
        Ok(done.iter().map(GenerateRandomNeighbors::neighbors_found).sum())
    }

    fn iteration(
        &self,
        neighbors: &Neighbors,
        sampled_k: usize,
        buffers: &mut CandidateBuffers,
        master: &mut StdRng,
    ) -> Result<IterationStats> {
        let node_count = self.graph.node_count();
        let progress = self.context.progress();
        let flag = &self.context.termination_flag;

        progress.begin_subtask("Split old and new neighbors");
        {
            let split_flag = flag.child();
            let mut old_rest: &mut [Vec<NodeId>] = &mut buffers.old;
            let mut new_rest: &mut [Vec<NodeId>] = &mut buffers.new;
            let tasks = PartitionUtils::range_partition(
                self.config.concurrency,
                node_count,
                Some(self.config.min_batch_size),
                |partition| {
                    let len = partition.len() as usize;
                    let (old, rest) = std::mem::take(&mut old_rest).split_at_mut(len);
                    old_rest = rest;
                    let (new, rest) = std::mem::take(&mut new_rest).split_at_mut(len);
                    new_rest = rest;
                    SplitOldAndNewNeighbors::new(
                        partition,
                        StdRng::seed_from_u64(master.gen()),
                        neighbors,
                        old,
                        new,
                        sampled_k,
                        &split_flag,
                        progress,
                    )
                },
            );
            self.run_tasks(tasks, &split_flag)?;
        }
        progress.end_subtask("Split old and new neighbors");

        progress.begin_subtask("Reverse old and new neighbors");
        buffers.clear_reverse();
        reverse_old_and_new(
            &buffers.old,
            &buffers.new,
            &mut buffers.reverse_old,
            &mut buffers.reverse_new,
            self.config.concurrency,
            self.config.min_batch_size,
            flag,
            progress,
        )?;
        progress.end_subtask("Reverse old and new neighbors");

        progress.begin_subtask("Join neighbors");
        let maps = buffers.maps();
        let join_flag = flag.child();
        let tasks = PartitionUtils::range_partition(
            self.config.concurrency,
            node_count,
            Some(self.config.min_batch_size),
            |partition| {
                JoinNeighbors::new(
                    partition,
                    StdRng::seed_from_u64(master.gen()),
                    &self.similarity,
                    neighbors,
                    maps,
                    sampled_k,
                    self.config.perturbation_rate,
                    self.config.random_joins,
                    &join_flag,
                    progress,
                )
            },
        );
        let done = self.run_tasks(tasks, &join_flag)?;
        progress.end_subtask("Join neighbors");

        Ok(done.iter().fold(IterationStats::default(), |acc, task| IterationStats {
            update_count: acc.update_count + task.update_count(),
            node_pairs_considered: acc.node_pairs_considered + task.node_pairs_considered(),
        }))
    }

    /// Run one phase. `flag` must be a child of the context flag so a
    /// failing task stops its siblings without cancelling the caller.
    fn run_tasks<T: Task>(&self, tasks: Vec<T>, flag: &TerminationFlag) -> Result<Vec<T>> {
        RunWithConcurrency::builder()
            .concurrency(self.config.concurrency)
            .tasks(tasks)
            .termination_flag(flag.clone())
            .executor(&self.context.executor)
            .run()
    }
}
