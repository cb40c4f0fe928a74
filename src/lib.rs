//! knngraph: approximate k-nearest-neighbor graphs over compressed adjacency
//!
//! 在紧凑的压缩图上并行构建近似 KNN 图 (NN-Descent)
//!
//! ## 架构
//! - 压缩层: zig-zag delta varint + bit-packed blocks (三种 tail 策略)
//! - 图存储: 不可变 CSR 拓扑 + 节点属性 + 持久化 (bincode + CRC32 + mmap)
//! - 调度层: range partition + 有界并发执行 + 终止标志
//! - 算法层: 初始化采样 → split → reverse → join → 收敛判断 → 相似度过滤

pub mod compression;
pub mod concurrency;
pub mod config;
pub mod graph;
pub mod knn;
pub mod progress;
pub mod similarity;

mod error;

/// Dense node identifier in `[0, node_count)`.
pub type NodeId = u64;

pub use compression::{Aggregation, Compression, TailStrategy};
pub use concurrency::{Executor, TerminationFlag};
pub use config::{KnnConfig, KnnNodePropertySpec, SamplerType};
pub use error::{KnnError, Result};
pub use graph::{CompressedGraph, GraphBuilder, NodePropertyValues};
pub use knn::{Knn, KnnContext, KnnResult, KnnStats, SimilarityResult};
pub use progress::{LoggingProgressTracker, NoopProgressTracker, ProgressTracker};
pub use similarity::{SimilarityFunction, SimilarityMetric};
