//! FIFO queue of ready tasks plus the live-task count.
//!
//! The queue holds tasks that have been woken and are waiting for the
//! executor; the live count tracks every spawned task that has not yet
//! completed or failed. The reactor loop's default termination condition is
//! this count reaching zero.

use crate::task::Runnable;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct TaskQueue {
    queue: Mutex<VecDeque<Arc<dyn Runnable>>>,
    live: AtomicUsize,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            live: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, task: Arc<dyn Runnable>) {
        self.queue.lock().unwrap().push_back(task);
    }

    pub(crate) fn pop(&self) -> Option<Arc<dyn Runnable>> {
        self.queue.lock().unwrap().pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Called by `Task::new`; pairs with [`task_finished`](Self::task_finished).
    pub(crate) fn task_started(&self) {
        self.live.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn task_finished(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of spawned tasks that have not completed or failed yet.
    pub(crate) fn live_tasks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}
