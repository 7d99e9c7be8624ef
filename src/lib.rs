//! Single-threaded readiness reactor with a cooperative task scheduler.
//!
//! This crate lets many non-blocking socket conversations make progress on
//! one thread: a portable multiplexer over the OS readiness-polling
//! facilities (select, poll, epoll) dispatches events to suspend-points, and
//! a task driver resumes each sequential-looking workflow exactly where it
//! left off.
//!
//! # Architecture
//!
//! - **Poller backends**: three interchangeable polling families normalized
//!   into one canonical readiness set
//! - **Reactor**: the registration table and dispatch batching over a backend
//! - **Deferred**: single-assignment slot tying a readiness callback to the
//!   one computation awaiting it
//! - **Task / Runtime**: priming spawn, waker-driven resumption, and the
//!   poll → dispatch → check-termination loop
//! - **Connection**: one non-blocking TCP socket with explicit suspend-points
//! - **fetch**: the demo workflow (connect, request, read until close)

mod builder;
mod error;
pub mod fetch;
pub mod net;
mod poller;
pub mod reactor;
mod runtime;
mod task;

pub use builder::RuntimeBuilder;
pub use error::{Error, Result};
pub use fetch::{FetchResult, FetchTarget, PendingSet, Phase, fetch};
pub use net::{ConnState, Connection};
pub use poller::{Backend, Interest, Ready};
pub use reactor::{Deferred, Reactor, ReactorHandle};
pub use runtime::yield_now::yield_now;
pub use runtime::{Runtime, StopToken};
pub use task::{JoinError, JoinHandle, JoinSet, Task, TaskState};
