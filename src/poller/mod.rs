//! Readiness-polling backends.
//!
//! Three backend families hide behind the [`Poller`] trait: the three-list
//! `select(2)` query, the flat descriptor/mask `poll(2)` query, and the
//! kernel-queue `epoll(7)` query. Each one normalizes what the OS reports
//! into the canonical [`Ready`] set so the reactor above never has to know
//! which facility is in use.
//!
//! A backend is picked once, at startup (see [`Backend`]); the reactor holds
//! it as a trait object for the rest of its life.

mod epoll;
mod poll;
mod select;

pub(crate) use epoll::EpollPoller;
pub(crate) use poll::PollPoller;
pub(crate) use select::SelectPoller;

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// The readiness conditions a registration asks for.
///
/// Closure is reported, never requested, so it has no place here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const READABLE: Self = Self {
        read: true,
        write: false,
    };

    pub const WRITABLE: Self = Self {
        read: false,
        write: true,
    };

    pub const BOTH: Self = Self {
        read: true,
        write: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// The canonical readiness observation delivered to a registration.
///
/// `closed` accompanies `readable` when a backend can see the hangup itself
/// (`EPOLLHUP`, `POLLHUP`). The select backend cannot; its consumers learn
/// about closure through an empty read, which the connection layer treats
/// the same way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ready {
    pub readable: bool,
    pub writable: bool,
    pub closed: bool,
}

impl Ready {
    fn merge(&mut self, other: Ready) {
        self.readable |= other.readable;
        self.writable |= other.writable;
        self.closed |= other.closed;
    }
}

/// One readiness-polling facility.
///
/// `poll` appends `(descriptor, observation)` pairs to `out` and returns once
/// at least one descriptor is ready or the timeout elapses. `None` blocks
/// indefinitely, `Some(Duration::ZERO)` is a non-blocking probe. An
/// interrupted wait (`EINTR`) produces an empty batch, not an error.
pub(crate) trait Poller: Send {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()>;

    fn remove(&mut self, fd: RawFd) -> io::Result<()>;

    fn poll(&mut self, out: &mut Vec<(RawFd, Ready)>, timeout: Option<Duration>)
    -> io::Result<()>;
}

/// Identifies a concrete backend family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Select,
    Poll,
    Epoll,
}

impl Backend {
    /// The preferred backend for the current platform.
    pub fn default_for_platform() -> Self {
        Backend::Epoll
    }
}

pub(crate) fn make_poller(backend: Backend) -> io::Result<Box<dyn Poller>> {
    Ok(match backend {
        Backend::Select => Box::new(SelectPoller::new()),
        Backend::Poll => Box::new(PollPoller::new()),
        Backend::Epoll => Box::new(EpollPoller::new()?),
    })
}

/// Clamps an optional timeout to the millisecond argument `poll(2)` and
/// `epoll_wait(2)` expect; `-1` blocks indefinitely.
fn timeout_ms(timeout: Option<Duration>) -> i32 {
    match timeout {
        None => -1,
        Some(duration) => duration.as_millis().min(i32::MAX as u128) as i32,
    }
}
