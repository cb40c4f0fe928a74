//! Initial neighbor candidates

use crate::config::SamplerType;
use crate::graph::CompressedGraph;
use crate::{NodeId, Result};
use ahash::AHashSet;
use rand::seq::index;
use rand::Rng;

/// Chance of jumping back to the start node on each walk step.
const RESTART_PROBABILITY: f64 = 0.25;
/// Walk steps allowed per wanted candidate before topping up uniformly.
const STEPS_PER_CANDIDATE: usize = 16;

pub enum KnnSampler {
    Uniform {
        node_count: u64,
    },
    RandomWalk {
        graph: CompressedGraph,
        node_count: u64,
    },
}

impl KnnSampler {
    pub fn new(sampler: SamplerType, graph: &CompressedGraph) -> Self {
        let node_count = graph.node_count();
        match sampler {
            SamplerType::Uniform => KnnSampler::Uniform { node_count },
            SamplerType::RandomWalk => KnnSampler::RandomWalk {
                graph: graph.concurrent_copy(),
                node_count,
            },
        }
    }

    /// Fill `out` with `k` distinct ids other than `node`. `k` must not
    /// exceed `node_count - 1`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        node: NodeId,
        k: usize,
        rng: &mut R,
        out: &mut Vec<NodeId>,
    ) -> Result<()> {
        out.clear();
        match self {
            KnnSampler::Uniform { node_count } => {
                uniform(node, *node_count, k, rng, out);
                Ok(())
            }
            KnnSampler::RandomWalk { graph, node_count } => {
                random_walk(graph, node, *node_count, k, rng, out)
            }
        }
    }
}

/// `k` distinct ids from `[0, node_count)` without `node`, appended to `out`.
fn uniform<R: Rng + ?Sized>(node: NodeId, node_count: u64, k: usize, rng: &mut R, out: &mut Vec<NodeId>) {
    let others = node_count.saturating_sub(1) as usize;
    let k = k.min(others);
    for idx in index::sample(rng, others, k) {
        let id = idx as NodeId;
        // skip over `node` itself
        out.push(if id >= node { id + 1 } else { id });
    }
}

fn random_walk<R: Rng + ?Sized>(
    graph: &CompressedGraph,
    node: NodeId,
    node_count: u64,
    k: usize,
    rng: &mut R,
    out: &mut Vec<NodeId>,
) -> Result<()> {
    let mut seen = AHashSet::with_capacity(k);
    let mut current = node;

    for _ in 0..k * STEPS_PER_CANDIDATE {
        if out.len() >= k {
            break;
        }
        let degree = graph.degree(current);
        if degree == 0 || (current != node && rng.gen_bool(RESTART_PROBABILITY)) {
            if current == node {
                break;
            }
            current = node;
            continue;
        }
        let Some(next) = graph.nth_neighbor(current, rng.gen_range(0..degree))? else {
            break;
        };
        if next != node && next < node_count && seen.insert(next) {
            out.push(next);
        }
        current = next;
    }

    if out.len() < k {
        // a uniform sample of k ids always brings at least k - |seen| new ones
        let mut fill = Vec::with_capacity(k);
        uniform(node, node_count, k, rng, &mut fill);
        for id in fill {
            if out.len() >= k {
                break;
            }
            if seen.insert(id) {
                out.push(id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_valid(out: &[NodeId], node: NodeId, k: usize, node_count: u64) {
        assert_eq!(out.len(), k);
        let set: AHashSet<_> = out.iter().copied().collect();
        assert_eq!(set.len(), k, "duplicates in {:?}", out);
        assert!(!set.contains(&node));
        assert!(out.iter().all(|&id| id < node_count));
    }

    #[test]
    fn test_uniform_sampler() {
        let graph = CompressedGraph::empty(20);
        let sampler = KnnSampler::new(SamplerType::Uniform, &graph);
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = Vec::new();
        for node in 0..20 {
            sampler.sample(node, 5, &mut rng, &mut out).unwrap();
            assert_valid(&out, node, 5, 20);
        }
        // k = n - 1 picks everyone else
        sampler.sample(3, 19, &mut rng, &mut out).unwrap();
        assert_valid(&out, 3, 19, 20);
    }

    #[test]
    fn test_random_walk_prefers_topology() {
        // two disjoint cliques of 5
        let mut builder = GraphBuilder::new(10).undirected(true);
        for base in [0u64, 5] {
            for a in base..base + 5 {
                for b in (a + 1)..base + 5 {
                    builder.add_relationship(a, b).unwrap();
                }
            }
        }
        let graph = builder.build().unwrap();
        let sampler = KnnSampler::new(SamplerType::RandomWalk, &graph);
        let mut rng = StdRng::seed_from_u64(3);
        let mut out = Vec::new();

        sampler.sample(0, 4, &mut rng, &mut out).unwrap();
        assert_valid(&out, 0, 4, 10);
        assert!(out.iter().all(|&id| id < 5), "walk left the clique: {:?}", out);
    }

    #[test]
    fn test_random_walk_tops_up_isolated_nodes() {
        let graph = CompressedGraph::empty(6);
        let sampler = KnnSampler::new(SamplerType::RandomWalk, &graph);
        let mut rng = StdRng::seed_from_u64(9);
        let mut out = Vec::new();
        sampler.sample(2, 5, &mut rng, &mut out).unwrap();
        assert_valid(&out, 2, 5, 6);
    }
}
