//! Partitioned task scheduling
//!
//! - `partition`: contiguous node ranges sized for a worker count
//! - `executor`: explicit worker pool + bounded task runner
//! - `termination`: cooperative cancellation flag

pub mod executor;
pub mod partition;
pub mod termination;

pub use executor::{Executor, ParallelUtil, RunWithConcurrency, Task};
pub use partition::{Partition, PartitionUtils};
pub use termination::{TerminationFlag, RUN_CHECK_NODE_COUNT};
