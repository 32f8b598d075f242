//! Two-lane FIFO queue: the priority lane always drains first.

use std::collections::VecDeque;

use super::task::Task;
use super::SchedulerError;

/// Waiting tasks, split into the priority and normal lanes.
///
/// `Priority::Low` shares the normal lane.
pub(crate) struct DispatchQueues<P, R> {
    priority: VecDeque<Task<P, R>>,
    normal: VecDeque<Task<P, R>>,
    max_depth: Option<usize>,
}

impl<P, R> DispatchQueues<P, R> {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            priority: VecDeque::new(),
            normal: VecDeque::new(),
            max_depth,
        }
    }

    /// Append to the lane matching the task's priority.
    ///
    /// On a full queue the task is handed back with the error so the caller
    /// can settle it.
    pub fn push(&mut self, task: Task<P, R>) -> Result<(), (Task<P, R>, SchedulerError)> {
        if let Some(max) = self.max_depth {
            if self.len() >= max {
                return Err((task, SchedulerError::QueueFull(self.len())));
            }
        }
        if task.priority.is_high() {
            self.priority.push_back(task);
        } else {
            self.normal.push_back(task);
        }
        Ok(())
    }

    /// Next task to dispatch: priority head, then normal head.
    pub fn pop(&mut self) -> Option<Task<P, R>> {
        self.priority.pop_front().or_else(|| self.normal.pop_front())
    }

    /// Remove every waiting task, priority lane first.
    pub fn drain(&mut self) -> impl Iterator<Item = Task<P, R>> + '_ {
        self.priority.drain(..).chain(self.normal.drain(..))
    }

    pub fn len(&self) -> usize {
        self.priority.len() + self.normal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.normal.is_empty()
    }

    /// `(priority, normal)` lane depths.
    pub fn depths(&self) -> (usize, usize) {
        (self.priority.len(), self.normal.len())
    }
}
