//! Bounded execution of partition tasks
//!
//! Tasks are handed out through a lock-free index queue to at most
//! `concurrency` workers of an explicitly passed [`Executor`]. The caller
//! blocks until every task finished; tasks are returned afterwards so their
//! per-partition statistics can be reduced at the barrier.

use super::partition::{Partition, PartitionUtils};
use super::termination::TerminationFlag;
use crate::{KnnError, Result};
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of partition-scoped work.
pub trait Task: Send {
    fn run(&mut self) -> Result<()>;
}

impl<F> Task for F
where
    F: FnMut() -> Result<()> + Send,
{
    fn run(&mut self) -> Result<()> {
        self()
    }
}

/// Worker pool handle injected into the engine.
#[derive(Clone)]
pub struct Executor {
    pool: Arc<rayon::ThreadPool>,
    threads: usize,
}

impl Executor {
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(KnnError::InvalidConfig(
                "executor needs at least one thread".into(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("knn-worker-{}", i))
            .build()
            .map_err(|e| KnnError::InvalidConfig(format!("failed to build thread pool: {}", e)))?;

        Ok(Self {
            pool: Arc::new(pool),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub(crate) fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").field("threads", &self.threads).finish()
    }
}

pub struct RunWithConcurrency<'a, T> {
    concurrency: usize,
    tasks: Vec<T>,
    termination_flag: TerminationFlag,
    executor: Option<&'a Executor>,
}

pub struct RunWithConcurrencyBuilder<'a, T> {
    inner: RunWithConcurrency<'a, T>,
}

impl<'a, T: Task> RunWithConcurrency<'a, T> {
    pub fn builder() -> RunWithConcurrencyBuilder<'a, T> {
        RunWithConcurrencyBuilder {
            inner: RunWithConcurrency {
                concurrency: 1,
                tasks: Vec::new(),
                termination_flag: TerminationFlag::default(),
                executor: None,
            },
        }
    }

    /// Run all tasks and hand them back once every one has finished.
    ///
    /// The first error (or panic, reported as `TaskFailed`) wins; after it
    /// no further task is started and the run's termination flag is raised,
    /// so running tasks that poll it stop early. Pass a
    /// [`TerminationFlag::child`] to keep that from reaching the caller's
    /// flag. A flag raised from outside surfaces as `KnnError::Terminated`.
    pub fn run(self) -> Result<Vec<T>> {
        let RunWithConcurrency {
            concurrency,
            tasks,
            termination_flag,
            executor,
        } = self;

        if tasks.is_empty() {
            return Ok(tasks);
        }
        termination_flag.assert_running()?;

        let workers = concurrency.max(1).min(tasks.len());
        let slots: Vec<Mutex<T>> = tasks.into_iter().map(Mutex::new).collect();
        let queue = ArrayQueue::new(slots.len());
        for idx in 0..slots.len() {
            // capacity == len, push cannot fail
            let _ = queue.push(idx);
        }

        let first_error: Mutex<Option<KnnError>> = Mutex::new(None);
        let failed = AtomicBool::new(false);

        let record = |err: KnnError| {
            {
                let mut slot = first_error.lock();
                if slot.is_none() {
                    *slot = Some(err);
                }
            }
            failed.store(true, Ordering::Release);
            termination_flag.terminate();
        };

        let work = || {
            while let Some(idx) = queue.pop() {
                if failed.load(Ordering::Acquire) {
                    break;
                }
                if !termination_flag.running() {
                    record(KnnError::Terminated);
                    break;
                }

                let mut task = slots[idx].lock();
                match catch_unwind(AssertUnwindSafe(|| task.run())) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => record(err),
                    Err(payload) => record(KnnError::TaskFailed(panic_message(&payload))),
                }
            }
        };

        match executor {
            Some(executor) if workers > 1 => {
                let work = &work;
                executor.pool().scope(|scope| {
                    for _ in 0..workers {
                        scope.spawn(move |_| work());
                    }
                });
            }
            _ => work(),
        }

        if let Some(err) = first_error.into_inner() {
            return Err(err);
        }

        Ok(slots.into_iter().map(Mutex::into_inner).collect())
    }
}

impl<'a, T: Task> RunWithConcurrencyBuilder<'a, T> {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.inner.concurrency = concurrency;
        self
    }

    pub fn tasks(mut self, tasks: Vec<T>) -> Self {
        self.inner.tasks = tasks;
        self
    }

    pub fn termination_flag(mut self, flag: TerminationFlag) -> Self {
        self.inner.termination_flag = flag;
        self
    }

    pub fn executor(mut self, executor: &'a Executor) -> Self {
        self.inner.executor = Some(executor);
        self
    }

    pub fn run(self) -> Result<Vec<T>> {
        self.inner.run()
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

pub struct ParallelUtil;

impl ParallelUtil {
    /// Run `f` once per range partition of `[0, node_count)`.
    pub fn read_parallel<F>(
        concurrency: usize,
        node_count: u64,
        min_batch_size: Option<u64>,
        executor: &Executor,
        termination_flag: &TerminationFlag,
        f: F,
    ) -> Result<()>
    where
        F: Fn(Partition) -> Result<()> + Sync,
    {
        let f = &f;
        let tasks = PartitionUtils::range_partition(concurrency, node_count, min_batch_size, |p| {
            move || f(p)
        });

        RunWithConcurrency::builder()
            .concurrency(concurrency)
            .tasks(tasks)
            .termination_flag(termination_flag.child())
            .executor(executor)
            .run()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    type BoxedTask = Box<dyn FnMut() -> Result<()> + Send>;

    fn boxed<F: FnMut() -> Result<()> + Send + 'static>(f: F) -> BoxedTask {
        Box::new(f)
    }

    struct SumTask {
        partition: Partition,
        sum: u64,
    }

    impl Task for SumTask {
        fn run(&mut self) -> Result<()> {
            self.sum = self.partition.range().sum();
            Ok(())
        }
    }

    #[test]
    fn test_reduction_after_join() {
        let executor = Executor::new(4).unwrap();
        let tasks = PartitionUtils::range_partition(4, 1000, None, |partition| SumTask {
            partition,
            sum: 0,
        });

        let done = RunWithConcurrency::builder()
            .concurrency(4)
            .tasks(tasks)
            .executor(&executor)
            .run()
            .unwrap();

        let total: u64 = done.iter().map(|t| t.sum).sum();
        assert_eq!(total, (0..1000u64).sum::<u64>());
    }

    #[test]
    fn test_first_error_propagates() {
        let executor = Executor::new(2).unwrap();
        let tasks = vec![
            boxed(|| Ok(())),
            boxed(|| Err(KnnError::InvalidArgument("boom".into()))),
            boxed(|| Ok(())),
        ];

        let err = RunWithConcurrency::builder()
            .concurrency(2)
            .tasks(tasks)
            .executor(&executor)
            .run()
            .err()
            .unwrap();
        assert!(matches!(err, KnnError::InvalidArgument(_)));
    }

    #[test]
    fn test_panic_becomes_task_failure() {
        let tasks = vec![boxed(|| panic!("worker exploded"))];

        let err = RunWithConcurrency::builder().tasks(tasks).run().err().unwrap();
        match err {
            KnnError::TaskFailed(msg) => assert!(msg.contains("worker exploded")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_terminated_flag_stops_before_start() {
        let flag = TerminationFlag::new();
        flag.terminate();
        let ran = AtomicU64::new(0);
        let task = || -> Result<()> {
            ran.fetch_add(1, Ordering::Relaxed);
            Ok(())
        };

        let err = RunWithConcurrency::builder()
            .tasks(vec![task])
            .termination_flag(flag)
            .run()
            .err()
            .unwrap();
        assert!(err.is_terminated());
        assert_eq!(ran.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_failure_stops_running_sibling() {
        let executor = Executor::new(2).unwrap();
        let caller = TerminationFlag::new();
        let run_flag = caller.child();
        let steps = AtomicU64::new(0);

        let flag = &run_flag;
        let steps_ref = &steps;
        let tasks: Vec<Box<dyn FnMut() -> Result<()> + Send + '_>> = vec![
            Box::new(move || {
                for _ in 0..5_000 {
                    flag.assert_running()?;
                    steps_ref.fetch_add(1, Ordering::Relaxed);
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Ok(())
            }),
            Box::new(|| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                Err(KnnError::InvalidArgument("boom".into()))
            }),
        ];

        let err = RunWithConcurrency::builder()
            .concurrency(2)
            .tasks(tasks)
            .termination_flag(run_flag.clone())
            .executor(&executor)
            .run()
            .err()
            .unwrap();
        assert!(matches!(err, KnnError::InvalidArgument(_)));
        assert!(steps.load(Ordering::Relaxed) < 5_000);
        assert!(!run_flag.running());
        assert!(caller.running());
    }

    #[test]
    fn test_read_parallel_leaves_caller_flag_running() {
        let executor = Executor::new(2).unwrap();
        let flag = TerminationFlag::new();
        let result = ParallelUtil::read_parallel(2, 100, None, &executor, &flag, |_| {
            Err(KnnError::InvalidArgument("bad partition".into()))
        });
        assert!(result.is_err());
        assert!(flag.running());
    }

    #[test]
    fn test_read_parallel_covers_all_nodes() {
        let executor = Executor::new(3).unwrap();
        let visited = AtomicU64::new(0);
        ParallelUtil::read_parallel(3, 500, None, &executor, &TerminationFlag::new(), |p| {
            visited.fetch_add(p.len(), Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(visited.load(Ordering::Relaxed), 500);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(Executor::new(0).is_err());
    }
}
