//! Task wrapper that drives suspendable computations.
//!
//! A task encapsulates one future together with the bookkeeping needed to
//! suspend it at I/O boundaries and resume it when the awaited
//! [`Deferred`](crate::reactor::Deferred) resolves. Spawning is *priming*:
//! the new task is polled once, synchronously, so that it reaches its first
//! suspend-point (registering interest with the reactor) or completes before
//! the caller regains control.
//!
//! # Task lifecycle
//!
//! `Created` at spawn, `Running` while its future is being polled,
//! `Suspended` after yielding `Pending`, then `Completed` when the future
//! returns — or `Failed` if it panics. A failed task surfaces through its
//! [`JoinHandle`] as [`JoinError`]; sibling tasks and the loop keep running.
//!
//! # Spawning
//!
//! ```ignore
//! use miniloop::Task;
//!
//! async fn example() {
//!     let handle = Task::spawn(async { 42 });
//!     let value = handle.await.unwrap();
//! }
//! ```

use crate::runtime::{CURRENT_QUEUE, TaskQueue, make_waker};

use std::fmt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// Where a task currently stands in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Suspended,
    Completed,
    Failed,
}

/// A spawned task wrapping one future.
///
/// Holds the future, the slot its output lands in, a reference to the task
/// queue for re-scheduling, and the cached waker that gives the task a
/// stable callback identity across polls.
pub struct Task<T> {
    future: Mutex<Option<Pin<Box<dyn Future<Output = T>>>>>,
    result: Mutex<Option<Result<T, JoinError>>>,
    pub(crate) queue: Arc<TaskQueue>,
    state: Mutex<TaskState>,
    completed: AtomicBool,
    waiters: Mutex<Vec<Waker>>,
    waker_cell: Mutex<Option<Waker>>,
}

// The runtime is single-threaded; these impls exist because the task lives
// behind Arc and its waker must satisfy the Waker contract. Every field is
// behind a Mutex or atomic, so shared access stays sound even though the
// future itself is not Send.
unsafe impl<T> Send for Task<T> {}
unsafe impl<T> Sync for Task<T> {}

impl<T: 'static> Task<T> {
    pub(crate) fn new<F>(fut: F, queue: Arc<TaskQueue>) -> Arc<Self>
    where
        F: Future<Output = T> + 'static,
    {
        queue.task_started();

        Arc::new(Task {
            future: Mutex::new(Some(Box::pin(fut))),
            result: Mutex::new(None),
            queue,
            state: Mutex::new(TaskState::Created),
            completed: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
            waker_cell: Mutex::new(None),
        })
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock().unwrap() = state;
    }

    /// The task's waker, created once and reused so every registration made
    /// on behalf of this task carries the same callback identity
    /// (`Waker::will_wake`).
    fn waker(self: &Arc<Self>) -> Waker {
        let mut cell = self.waker_cell.lock().unwrap();

        if cell.is_none() {
            *cell = Some(make_waker(self.clone()));
        }

        cell.as_ref().unwrap().clone()
    }

    /// Drives the task forward by one poll.
    ///
    /// `Pending` stores the future back and leaves the task Suspended; the
    /// next resolution of whatever it awaits re-queues it. `Ready` completes
    /// the task and wakes its join waiters. A panic inside the future is
    /// caught here: the task transitions to Failed, the panic is reported
    /// through the join handle, and nothing else is affected.
    pub fn poll(self: &Arc<Self>) {
        let waker = self.waker();
        let mut context = Context::from_waker(&waker);

        let mut future_slot = self.future.lock().unwrap();

        let Some(mut future) = future_slot.take() else {
            return;
        };

        self.set_state(TaskState::Running);

        match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut context))) {
            Ok(Poll::Pending) => {
                *future_slot = Some(future);
                self.set_state(TaskState::Suspended);
            }
            Ok(Poll::Ready(value)) => {
                *self.result.lock().unwrap() = Some(Ok(value));
                self.set_state(TaskState::Completed);
                self.retire();
            }
            Err(payload) => {
                let error = JoinError::from_panic(payload.as_ref());
                log::warn!("task failed: {error}");

                *self.result.lock().unwrap() = Some(Err(error));
                self.set_state(TaskState::Failed);
                self.retire();
            }
        }
    }

    fn retire(&self) {
        self.completed.store(true, Ordering::Release);
        self.queue.task_finished();

        // The cached waker holds the task; drop it so a retired task can be
        // freed.
        *self.waker_cell.lock().unwrap() = None;

        let mut waiters = self.waiters.lock().unwrap();
        for waker in waiters.drain(..) {
            waker.wake();
        }
    }

    /// Spawns a task on the current runtime context and primes it.
    ///
    /// The future is polled once before this returns, so its first
    /// registration lands (or it completes) synchronously. Must be called
    /// from within a runtime context.
    ///
    /// # Panics
    /// Panics if called outside of a runtime context.
    pub fn spawn<F>(future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
    {
        CURRENT_QUEUE.with(|current| {
            let queue = current
                .borrow()
                .as_ref()
                .expect("Task::spawn() called outside of a runtime context")
                .clone();

            let task = Task::new(future, queue);
            Task::poll(&task);

            JoinHandle { task }
        })
    }
}

/// Trait for objects the executor can poll and the waker can re-queue.
pub(crate) trait Runnable: Send + Sync {
    fn poll(self: Arc<Self>);

    /// Re-enqueues the task so the executor resumes it.
    fn schedule(self: Arc<Self>);
}

impl<T: 'static> Runnable for Task<T> {
    fn poll(self: Arc<Self>) {
        Task::poll(&self);
    }

    fn schedule(self: Arc<Self>) {
        let queue = self.queue.clone();
        queue.push(self);
    }
}

/// The error a [`JoinHandle`] yields when its task panicked.
#[derive(Debug)]
pub struct JoinError {
    message: String,
}

impl JoinError {
    fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked".to_string()
        };

        Self { message }
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.message)
    }
}

impl std::error::Error for JoinError {}

/// Future that resolves once the associated task completes or fails.
///
/// Returned by [`Task::spawn`] and [`Runtime::spawn`](crate::Runtime::spawn).
/// Yields `Ok(value)` for a completed task and `Err(JoinError)` for one that
/// panicked. Dropping the handle detaches the task; it keeps running.
pub struct JoinHandle<T> {
    task: Arc<Task<T>>,
}

impl<T: 'static> JoinHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.task.completed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TaskState {
        self.task.state()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.task.completed.load(Ordering::Acquire) {
            let result = self
                .task
                .result
                .lock()
                .unwrap()
                .take()
                .expect("task completed but result missing");

            return Poll::Ready(result);
        }

        let mut waiters = self.task.waiters.lock().unwrap();
        if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
            waiters.push(cx.waker().clone());
        }

        Poll::Pending
    }
}

/// Collects multiple [`JoinHandle`]s and awaits them all.
///
/// ```ignore
/// let mut set = JoinSet::new();
/// for target in targets {
///     set.push(Task::spawn(fetch(target, pending.clone())));
/// }
/// set.await_all().await;
/// ```
pub struct JoinSet<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> JoinSet<T> {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: JoinHandle<T>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Awaits every handle in insertion order, draining the set. Panicked
    /// tasks are ignored here; callers that care about individual outcomes
    /// await the handles themselves.
    pub async fn await_all(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl<T> Default for JoinSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
