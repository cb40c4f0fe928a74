//! KNN configuration
//!
//! Plain serde structs with defaults and named presets. Everything is
//! checked by [`KnnConfig::validate`] before any parallel work starts.

use crate::similarity::SimilarityMetric;
use crate::{KnnError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 初始邻居采样方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplerType {
    /// 均匀随机采样 bounded_k 个不同的非自身节点
    #[default]
    Uniform,
    /// 在图拓扑上做带重启的随机游走，不足部分再均匀补齐
    #[serde(alias = "RANDOMWALK")]
    RandomWalk,
}

/// One node property that feeds the similarity, with its metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnNodePropertySpec {
    pub name: String,
    #[serde(default)]
    pub metric: SimilarityMetric,
}

impl KnnNodePropertySpec {
    pub fn new(name: impl Into<String>, metric: SimilarityMetric) -> Self {
        Self {
            name: name.into(),
            metric,
        }
    }

    /// Property with the default metric of its value type.
    pub fn of(name: impl Into<String>) -> Self {
        Self::new(name, SimilarityMetric::Default)
    }
}

/// KNN 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    /// 每个节点保留的邻居数
    pub top_k: usize,

    /// 并发度（分区数上限）
    pub concurrency: usize,

    pub max_iterations: usize,

    /// Fraction of new neighbors joined per iteration, in (0, 1].
    pub sample_rate: f64,

    /// Stop once an iteration changes at most this fraction of the
    /// maximum possible updates.
    pub delta_threshold: f64,

    /// Fixed seed for reproducible runs (with `concurrency = 1`).
    pub random_seed: Option<u64>,

    pub initial_sampler: SamplerType,

    /// Neighbors below this similarity are dropped from the result.
    pub similarity_cutoff: f64,

    /// Probability that a random join also updates the random node.
    pub perturbation_rate: f64,

    /// 每个节点每轮的随机连接次数
    pub random_joins: usize,

    pub min_batch_size: u64,

    pub node_properties: Vec<KnnNodePropertySpec>,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            concurrency: 4,
            max_iterations: 100,
            sample_rate: 0.5,
            delta_threshold: 0.001,
            random_seed: None,
            initial_sampler: SamplerType::Uniform,
            similarity_cutoff: 0.0,
            perturbation_rate: 0.0,
            random_joins: 10,
            min_batch_size: 1_000,
            node_properties: Vec::new(),
        }
    }
}

impl KnnConfig {
    pub fn new(top_k: usize, node_properties: Vec<KnnNodePropertySpec>) -> Self {
        Self {
            top_k,
            node_properties,
            ..Default::default()
        }
    }

    /// 单线程 + 固定种子，结果可复现
    pub fn deterministic(top_k: usize, seed: u64, node_properties: Vec<KnnNodePropertySpec>) -> Self {
        Self {
            top_k,
            concurrency: 1,
            random_seed: Some(seed),
            node_properties,
            ..Default::default()
        }
    }

    /// Exhaustive joins, no early stop before `max_iterations` unless the
    /// graph stops changing.
    pub fn for_quality(top_k: usize, node_properties: Vec<KnnNodePropertySpec>) -> Self {
        Self {
            top_k,
            sample_rate: 1.0,
            delta_threshold: 0.0,
            random_joins: 10,
            node_properties,
            ..Default::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.initial_sampler = sampler;
        self
    }

    /// Parse and validate a configuration. Well-formed JSON carrying an
    /// unknown sampler, metric or a mistyped field is an `InvalidConfig`;
    /// malformed JSON is a `Serialization` error.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: KnnConfig = serde_json::from_str(json).map_err(|e| {
            if e.is_data() {
                KnnError::InvalidConfig(e.to_string())
            } else {
                KnnError::from(e)
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        fn unit_interval(name: &str, value: f64, allow_zero: bool) -> Result<()> {
            let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
            if !(lower_ok && value <= 1.0) {
                return Err(KnnError::InvalidConfig(format!(
                    "{} must be in {}0, 1], got {}",
                    name,
                    if allow_zero { "[" } else { "(" },
                    value
                )));
            }
            Ok(())
        }

        if self.concurrency == 0 {
            return Err(KnnError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.max_iterations == 0 {
            return Err(KnnError::InvalidConfig("max_iterations must be at least 1".into()));
        }
        if self.top_k > i32::MAX as usize {
            return Err(KnnError::InvalidConfig(format!("top_k {} is too large", self.top_k)));
        }
        unit_interval("sample_rate", self.sample_rate, false)?;
        unit_interval("delta_threshold", self.delta_threshold, true)?;
        unit_interval("similarity_cutoff", self.similarity_cutoff, true)?;
        unit_interval("perturbation_rate", self.perturbation_rate, true)?;
        if let Some(dup) = self
            .node_properties
            .iter()
            .enumerate()
            .find(|(i, p)| self.node_properties[..*i].iter().any(|q| q.name == p.name))
        {
            return Err(KnnError::InvalidConfig(format!(
                "node property '{}' listed twice",
                dup.1.name
            )));
        }
        Ok(())
    }

    /// `min(top_k, node_count - 1)`: a node cannot neighbor itself.
    pub fn bounded_k(&self, node_count: u64) -> usize {
        (self.top_k as u64).min(node_count.saturating_sub(1)) as usize
    }

    /// New neighbors joined per node and iteration.
    pub fn sampled_k(&self, node_count: u64) -> usize {
        (self.sample_rate * self.bounded_k(node_count) as f64).ceil() as usize
    }

    /// Updates at or below which an iteration counts as converged.
    pub fn update_threshold(&self, node_count: u64) -> u64 {
        let max_updates = (self.sample_rate * self.top_k as f64 * node_count as f64).ceil();
        (self.delta_threshold * max_updates).floor() as u64
    }
}
