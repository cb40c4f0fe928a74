//! Progress reporting for long-running phases
//!
//! The engine reports through a [`ProgressTracker`]; everything works with
//! the no-op implementation.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

pub trait ProgressTracker: Send + Sync {
    fn begin_subtask(&self, name: &str);

    fn end_subtask(&self, name: &str);

    /// Report `progress` more units of work done in the current subtask.
    fn log_progress(&self, progress: u64);

    fn log_message(&self, _message: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressTracker;

impl ProgressTracker for NoopProgressTracker {
    fn begin_subtask(&self, _name: &str) {}

    fn end_subtask(&self, _name: &str) {}

    fn log_progress(&self, _progress: u64) {}
}

/// Reports phase boundaries and progress through `tracing`.
pub struct LoggingProgressTracker {
    task_name: String,
    stack: Mutex<Vec<(String, Instant)>>,
    progress: AtomicU64,
}

impl LoggingProgressTracker {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            stack: Mutex::new(Vec::new()),
            progress: AtomicU64::new(0),
        }
    }

    /// Units reported via `log_progress` since the last `begin_subtask`.
    pub fn current_progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    fn path(&self, stack: &[(String, Instant)]) -> String {
        let mut path = self.task_name.clone();
        for (name, _) in stack {
            path.push_str(" :: ");
            path.push_str(name);
        }
        path
    }
}

impl ProgressTracker for LoggingProgressTracker {
    fn begin_subtask(&self, name: &str) {
        let mut stack = self.stack.lock();
        stack.push((name.to_string(), Instant::now()));
        self.progress.store(0, Ordering::Relaxed);
        info!("[{}] Start", self.path(&stack));
    }

    fn end_subtask(&self, name: &str) {
        let mut stack = self.stack.lock();
        let path = self.path(&stack);
        match stack.pop() {
            Some((top, started)) if top == name => {
                info!("[{}] Finished in {:?}", path, started.elapsed());
            }
            Some((top, started)) => {
                debug!(
                    "[{}] end_subtask({}) does not match open subtask {}, closing it after {:?}",
                    path,
                    name,
                    top,
                    started.elapsed()
                );
            }
            None => debug!("[{}] end_subtask({}) without open subtask", self.task_name, name),
        }
    }

    fn log_progress(&self, progress: u64) {
        let total = self.progress.fetch_add(progress, Ordering::Relaxed) + progress;
        debug!("[{}] progress {}", self.task_name, total);
    }

    fn log_message(&self, message: &str) {
        info!("[{}] {}", self.task_name, message);
    }
}
