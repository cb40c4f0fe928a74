//! Cooperative cancellation

use crate::{KnnError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How many nodes a long loop may process between two flag checks.
pub const RUN_CHECK_NODE_COUNT: u64 = 10_000;

/// Shared stop signal, polled by long-running loops and by the scheduler
/// before each task.
///
/// A flag made with [`TerminationFlag::child`] also stops when its parent
/// does, while terminating the child leaves the parent running.
#[derive(Debug, Clone, Default)]
pub struct TerminationFlag {
    terminated: Arc<AtomicBool>,
    parent: Option<Box<TerminationFlag>>,
}

impl TerminationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag scoped to one run under this one.
    pub fn child(&self) -> Self {
        Self {
            terminated: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    #[inline]
    pub fn running(&self) -> bool {
        !self.terminated.load(Ordering::Acquire)
            && self.parent.as_ref().map_or(true, |parent| parent.running())
    }

    #[inline]
    pub fn assert_running(&self) -> Result<()> {
        if self.running() {
            Ok(())
        } else {
            Err(KnnError::Terminated)
        }
    }

    /// Check the flag every [`RUN_CHECK_NODE_COUNT`] processed nodes.
    #[inline]
    pub fn check_every(&self, processed: u64) -> Result<()> {
        if processed % RUN_CHECK_NODE_COUNT == 0 {
            self.assert_running()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_trips_for_all_clones() {
        let flag = TerminationFlag::new();
        let other = flag.clone();
        assert!(other.assert_running().is_ok());

        flag.terminate();
        assert!(!other.running());
        assert!(other.assert_running().unwrap_err().is_terminated());
    }

    #[test]
    fn test_check_every_only_polls_on_cadence() {
        let flag = TerminationFlag::new();
        flag.terminate();
        assert!(flag.check_every(1).is_ok());
        assert!(flag.check_every(RUN_CHECK_NODE_COUNT).is_err());
    }

    #[test]
    fn test_child_follows_parent_but_not_back() {
        let parent = TerminationFlag::new();
        let child = parent.child();
        child.terminate();
        assert!(!child.running());
        assert!(parent.running());

        let child = parent.child();
        let shared = child.clone();
        parent.terminate();
        assert!(!child.running());
        assert!(shared.assert_running().unwrap_err().is_terminated());
    }
}
