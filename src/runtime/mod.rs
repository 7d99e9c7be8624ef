//! Runtime subsystem modules.

pub(crate) mod context;
mod core;
pub(crate) mod executor;
pub(crate) mod queue;
pub(crate) mod waker;
pub mod yield_now;

pub(crate) use context::{CURRENT_QUEUE, current_reactor, enter_context};
pub use core::{Runtime, StopToken};
pub(crate) use executor::Executor;
pub(crate) use queue::TaskQueue;
pub(crate) use waker::make_waker;
