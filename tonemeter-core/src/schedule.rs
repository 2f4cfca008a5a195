//! Single-slot cancellable schedule for the analysis tick.
//!
//! The host drives time by calling [`RepeatingTask::take_due`]; taking the
//! due entry clears the slot, so the next run can only be scheduled after
//! the current one has finished.

use std::time::Instant;

/// Identifies one scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(u64);

#[derive(Debug, Default)]
pub struct RepeatingTask {
    next_id: u64,
    pending: Option<(TaskHandle, Instant)>,
}

impl RepeatingTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules the next run at `at`, replacing any earlier entry.
    pub fn schedule(&mut self, at: Instant) -> TaskHandle {
        self.next_id += 1;
        let handle = TaskHandle(self.next_id);
        self.pending = Some((handle, at));
        handle
    }

    /// Cancels the run identified by `handle`. Returns whether it was pending.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        match self.pending {
            Some((pending, _)) if pending == handle => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Removes and returns the pending run if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<TaskHandle> {
        match self.pending {
            Some((handle, at)) if at <= now => {
                self.pending = None;
                Some(handle)
            }
            _ => None,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }
}
