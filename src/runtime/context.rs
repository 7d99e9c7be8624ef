//! Thread-local runtime context.
//!
//! Holds the current task queue and reactor handle so async primitives can
//! reach the runtime without threading explicit handles through every call:
//! `Task::spawn` needs the queue, `Connection::open` needs the reactor.
//!
//! The context is installed by [`enter_context`] for the duration of a
//! `Runtime::run` / `Runtime::block_on` call (and for the synchronous
//! priming poll inside `Runtime::spawn`); the previous context is restored
//! on exit so runtimes can nest in tests.

use crate::reactor::ReactorHandle;
use crate::runtime::queue::TaskQueue;

use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    /// Task queue of the runtime currently executing on this thread.
    pub(crate) static CURRENT_QUEUE: RefCell<Option<Arc<TaskQueue>>> = const { RefCell::new(None) };

    /// Reactor handle of the runtime currently executing on this thread.
    pub(crate) static CURRENT_REACTOR: RefCell<Option<ReactorHandle>> = const { RefCell::new(None) };
}

/// Enters a runtime context for the current thread, runs `function`, and
/// restores whatever context was active before.
pub(crate) fn enter_context<F, R>(queue: Arc<TaskQueue>, reactor: ReactorHandle, function: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT_QUEUE.with(|current_queue| {
        CURRENT_REACTOR.with(|current_reactor| {
            let previous_queue = current_queue.borrow_mut().replace(queue);
            let previous_reactor = current_reactor.borrow_mut().replace(reactor);

            let result = function();

            *current_queue.borrow_mut() = previous_queue;
            *current_reactor.borrow_mut() = previous_reactor;

            result
        })
    })
}

/// Returns the current reactor handle.
///
/// # Panics
/// Panics outside of a runtime context.
pub(crate) fn current_reactor() -> ReactorHandle {
    CURRENT_REACTOR.with(|current| {
        current.borrow().clone().expect(
            "no reactor in current context; I/O operations must run within Runtime::block_on or Runtime::run",
        )
    })
}
