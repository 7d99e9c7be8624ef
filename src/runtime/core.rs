//! The reactor loop: owns the multiplexer and the set of live tasks.
//!
//! [`Runtime::run`] drives everything: poll the reactor, dispatch the ready
//! batch, drain woken tasks, then re-check termination (live-task count at
//! zero, or the external [`StopToken`] set). Termination is only re-evaluated
//! between full batches, never mid-batch.
//!
//! [`Runtime::block_on`] is the entry point for callers that want a value out
//! of one main future; it processes spawned tasks and I/O while the main
//! future is pending.

use crate::error::Result;
use crate::poller::Backend;
use crate::reactor::{Reactor, ReactorHandle};
use crate::runtime::{Executor, TaskQueue, enter_context};
use crate::task::{JoinHandle, Task};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

/// How long one blocking reactor turn may wait before the loop re-checks
/// its stop conditions.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Explicit, clonable stop condition for the reactor loop.
///
/// Whoever holds a clone may request a graceful stop; the loop re-checks it
/// between dispatch batches.
#[derive(Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Single-threaded runtime: task queue, executor, and reactor.
pub struct Runtime {
    queue: Arc<TaskQueue>,
    executor: Executor,
    reactor: ReactorHandle,
    stop: StopToken,
}

impl Runtime {
    /// Creates a runtime on the platform's default polling backend.
    ///
    /// # Panics
    /// Panics if the OS refuses to create the polling facility; a process
    /// that cannot poll has nothing to fall back to.
    pub fn new() -> Self {
        Self::with_backend(Backend::default_for_platform())
            .expect("failed to initialize the readiness polling backend")
    }

    pub(crate) fn with_backend(backend: Backend) -> std::io::Result<Self> {
        let queue = Arc::new(TaskQueue::new());
        let executor = Executor::new(queue.clone());
        let reactor = Reactor::new(backend)?.into_handle();

        Ok(Self {
            queue,
            executor,
            reactor,
            stop: StopToken::new(),
        })
    }

    /// Spawns a task and primes it (one synchronous poll to its first
    /// suspend-point or completion).
    pub fn spawn<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        enter_context(self.queue.clone(), self.reactor.clone(), || {
            Task::spawn(fut)
        })
    }

    /// A clone of the loop's stop token.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Handle to the runtime's reactor.
    pub fn reactor(&self) -> ReactorHandle {
        self.reactor.clone()
    }

    /// Spawned tasks that have not completed or failed yet.
    pub fn live_tasks(&self) -> usize {
        self.queue.live_tasks()
    }

    /// Runs until every spawned task has retired or the stop token is set.
    ///
    /// An unrecoverable backend failure aborts the loop with
    /// [`Error::BackendPollFailure`](crate::Error::BackendPollFailure);
    /// failures inside individual tasks never do.
    pub fn run(&mut self) -> Result<()> {
        let queue = self.queue.clone();
        let reactor = self.reactor.clone();
        let stop = self.stop.clone();

        log::debug!("reactor loop starting with {} live task(s)", queue.live_tasks());

        let result = enter_context(queue.clone(), reactor.clone(), || {
            loop {
                // Drain tasks woken by the previous batch before
                // re-evaluating termination.
                self.executor.run();

                if stop.is_set() {
                    log::debug!("reactor loop stopping: stop token set");
                    return Ok(());
                }

                if queue.live_tasks() == 0 {
                    log::debug!("reactor loop stopping: no live tasks");
                    return Ok(());
                }

                // Probe without blocking while woken tasks are still queued;
                // otherwise block until readiness or the next stop check.
                let timeout = if queue.is_empty() {
                    Some(POLL_INTERVAL)
                } else {
                    Some(Duration::ZERO)
                };

                reactor.lock().unwrap().turn(timeout)?;
            }
        });

        result
    }

    /// Blocks until the given future completes, processing spawned tasks and
    /// I/O readiness along the way. Returns the future's output.
    ///
    /// # Panics
    /// Panics on an unrecoverable backend polling failure; there is no value
    /// to return once the loop cannot observe readiness any more.
    pub fn block_on<F: Future>(&mut self, fut: F) -> F::Output {
        let queue = self.queue.clone();
        let reactor = self.reactor.clone();

        enter_context(queue.clone(), reactor.clone(), || {
            let mut fut = Box::pin(fut);

            // Main-future waker that sets a local notification flag on wake.
            // This avoids blocking on I/O when the main future has already
            // been woken (join waiters, yield_now).
            let mut notified = false;
            fn clone(ptr: *const ()) -> std::task::RawWaker {
                std::task::RawWaker::new(ptr, &VTABLE)
            }
            fn wake(ptr: *const ()) {
                unsafe {
                    *(ptr as *mut bool) = true;
                }
            }
            fn wake_by_ref(ptr: *const ()) {
                unsafe {
                    *(ptr as *mut bool) = true;
                }
            }
            fn drop(_: *const ()) {}
            static VTABLE: std::task::RawWakerVTable =
                std::task::RawWakerVTable::new(clone, wake, wake_by_ref, drop);
            let raw = std::task::RawWaker::new(&mut notified as *mut bool as *const (), &VTABLE);
            let waker = unsafe { std::task::Waker::from_raw(raw) };
            let mut cx = Context::from_waker(&waker);

            loop {
                if let Poll::Ready(val) = fut.as_mut().poll(&mut cx) {
                    self.executor.run();
                    return val;
                }

                self.executor.run();

                // Opportunistic probe so readiness reaches tasks promptly
                // even while the queue stays busy.
                turn_or_die(&reactor, Some(Duration::ZERO));

                if notified {
                    notified = false;
                    continue;
                }

                if !queue.is_empty() {
                    continue;
                }

                turn_or_die(&reactor, Some(POLL_INTERVAL));
            }
        })
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

// `block_on` has no error channel; a backend polling failure is fatal to
// the loop.
fn turn_or_die(reactor: &ReactorHandle, timeout: Option<Duration>) {
    if let Err(err) = reactor.lock().unwrap().turn(timeout) {
        panic!("unrecoverable polling backend failure: {err}");
    }
}
