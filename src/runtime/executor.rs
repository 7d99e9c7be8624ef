//! Task executor that processes queued tasks.

use super::queue::TaskQueue;

use std::sync::Arc;

/// Drains ready tasks from the shared queue, one bounded batch at a time.
pub(crate) struct Executor {
    pub(crate) queue: Arc<TaskQueue>,
}

impl Executor {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self { queue }
    }

    /// Polls every task that was ready on entry.
    ///
    /// The batch is bounded by the queue length observed up front, so a task
    /// that re-queues itself on every poll (`yield_now` in a loop) cannot
    /// starve the caller's termination and stop-token checks.
    pub fn run(&self) {
        let batch = self.queue.len();

        for _ in 0..batch {
            let Some(task) = self.queue.pop() else {
                break;
            };
            task.poll();
        }
    }
}
