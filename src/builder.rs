//! Fluent builder for Runtime construction.

use crate::error::{Error, Result};
use crate::poller::Backend;
use crate::runtime::Runtime;

/// Builder for constructing [`Runtime`] instances.
///
/// The only knob today is the polling backend; selection happens once, here,
/// and the reactor holds the chosen backend for its whole life.
///
/// # Example
/// ```ignore
/// let rt = RuntimeBuilder::new().backend(Backend::Poll).build()?;
/// ```
pub struct RuntimeBuilder {
    backend: Backend,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            backend: Backend::default_for_platform(),
        }
    }

    /// Selects a specific polling backend family.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Builds the runtime, creating the OS polling facility.
    pub fn build(self) -> Result<Runtime> {
        Runtime::with_backend(self.backend).map_err(Error::Io)
    }
}
