//! Readiness multiplexing and the deferred-result primitive.
//!
//! - [`core`]: the multiplexer (registration table + backend dispatch)
//! - [`deferred`]: the single-assignment slot that suspend-points await

pub mod core;
pub mod deferred;

pub use core::{Reactor, ReactorHandle};
pub use deferred::Deferred;
