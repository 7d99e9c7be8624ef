//! The readiness multiplexer.
//!
//! One [`Reactor`] owns one polling backend and the registration table that
//! maps a descriptor to its interest mask and the [`Deferred`] slot acting as
//! its callback. The table enforces the single-entry invariant: a descriptor
//! is never registered twice, and re-registering with the same slot only
//! changes its interest mask.
//!
//! Dispatch consumes registrations: each fired entry is removed from the
//! table and the backend before its slot resolves. Resolution only wakes
//! tasks (they run after the batch, in the executor), so no callback can
//! mutate the table mid-batch, and a descriptor removed earlier in a batch is
//! silently skipped if the backend reported it twice.

use crate::error::{Error, Result};
use crate::poller::{Backend, Interest, Poller, Ready, make_poller};
use crate::reactor::deferred::Deferred;

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared handle to a reactor, cloned into connections and suspend-points.
pub type ReactorHandle = Arc<Mutex<Reactor>>;

struct Registration {
    interest: Interest,
    slot: Deferred<Ready>,
}

pub struct Reactor {
    poller: Box<dyn Poller>,
    registry: HashMap<RawFd, Registration>,
}

impl Reactor {
    pub fn new(backend: Backend) -> io::Result<Self> {
        Ok(Self {
            poller: make_poller(backend)?,
            registry: HashMap::new(),
        })
    }

    pub fn into_handle(self) -> ReactorHandle {
        Arc::new(Mutex::new(self))
    }

    /// Registers a descriptor with the given interest and callback slot.
    ///
    /// Fails with [`Error::DuplicateRegistration`] when the descriptor is
    /// already held by a different slot. Re-registering the same slot is
    /// treated as a modify.
    pub fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        slot: &Deferred<Ready>,
    ) -> Result<()> {
        if let Some(existing) = self.registry.get_mut(&fd) {
            if !existing.slot.same_slot(slot) {
                return Err(Error::DuplicateRegistration(fd));
            }

            log::trace!("re-registering fd {fd} with {interest:?}");
            self.poller.modify(fd, interest)?;
            existing.interest = interest;

            return Ok(());
        }

        log::trace!("registering fd {fd} with {interest:?}");
        self.poller.add(fd, interest)?;
        self.registry.insert(
            fd,
            Registration {
                interest,
                slot: slot.clone(),
            },
        );

        Ok(())
    }

    /// Changes the interest mask of a live registration.
    pub fn modify(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let Some(registration) = self.registry.get_mut(&fd) else {
            return Err(Error::NotRegistered(fd));
        };

        self.poller.modify(fd, interest)?;
        registration.interest = interest;

        Ok(())
    }

    /// Removes a live registration.
    pub fn unregister(&mut self, fd: RawFd) -> Result<()> {
        if self.registry.remove(&fd).is_none() {
            return Err(Error::NotRegistered(fd));
        }

        let _ = self.poller.remove(fd);

        Ok(())
    }

    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.registry.contains_key(&fd)
    }

    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    pub fn interest_of(&self, fd: RawFd) -> Option<Interest> {
        self.registry.get(&fd).map(|r| r.interest)
    }

    /// Blocks until at least one registered descriptor is ready or the
    /// timeout elapses; returns the batch in ascending-descriptor order.
    ///
    /// `None` blocks indefinitely, `Some(Duration::ZERO)` probes.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<(RawFd, Ready)>> {
        let mut batch = Vec::new();

        self.poller
            .poll(&mut batch, timeout)
            .map_err(Error::BackendPollFailure)?;

        batch.sort_by_key(|&(fd, _)| fd);

        Ok(batch)
    }

    /// Resolves the slot of every fired registration, consuming the entries.
    ///
    /// Returns how many registrations actually fired; pairs whose descriptor
    /// was already removed within this batch are skipped.
    pub fn dispatch(&mut self, batch: &[(RawFd, Ready)]) -> usize {
        let mut fired = 0;

        for &(fd, ready) in batch {
            let Some(registration) = self.registry.remove(&fd) else {
                continue;
            };

            let _ = self.poller.remove(fd);
            registration.slot.resolve(ready);
            fired += 1;
        }

        if fired > 0 {
            log::trace!("dispatched {fired} readiness event(s)");
        }

        fired
    }

    /// One poll-and-dispatch cycle.
    pub fn turn(&mut self, timeout: Option<Duration>) -> Result<usize> {
        let batch = self.poll(timeout)?;

        Ok(self.dispatch(&batch))
    }
}
