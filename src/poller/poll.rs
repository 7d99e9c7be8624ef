//! The flat descriptor/mask `poll(2)` backend.
//!
//! Like select, this backend keeps its interest table in user space and
//! rebuilds the `pollfd` array on every call. Level-triggered: readiness is
//! re-reported on each poll until the interest is consumed. Hangup arrives
//! as `POLLHUP` bundled with readability, which is normalized into
//! `Ready { readable, closed }`.

use super::{Interest, Poller, Ready, timeout_ms};

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, POLLPRI, poll, pollfd};
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

pub(crate) struct PollPoller {
    entries: HashMap<RawFd, Interest>,
}

impl PollPoller {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl Poller for PollPoller {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.entries.insert(fd, interest);

        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.entries.insert(fd, interest);

        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        self.entries.remove(&fd);

        Ok(())
    }

    fn poll(
        &mut self,
        out: &mut Vec<(RawFd, Ready)>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let mut fds: Vec<pollfd> = self
            .entries
            .iter()
            .map(|(&fd, interest)| {
                let mut events = 0;
                if interest.read {
                    events |= POLLIN;
                }
                if interest.write {
                    events |= POLLOUT;
                }

                pollfd {
                    fd,
                    events,
                    revents: 0,
                }
            })
            .collect();

        let result = unsafe { poll(fds.as_mut_ptr(), fds.len() as _, timeout_ms(timeout)) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for entry in &fds {
            if entry.revents == 0 {
                continue;
            }

            let mut ready = Ready::default();

            if entry.revents & (POLLIN | POLLPRI) != 0 {
                ready.readable = true;
            }
            if entry.revents & POLLOUT != 0 {
                ready.writable = true;
            }
            if entry.revents & POLLHUP != 0 {
                ready.readable = true;
                ready.closed = true;
            }
            if entry.revents & (POLLERR | POLLNVAL) != 0 {
                // Let the owner's next syscall observe the OS error, in
                // whichever direction it attempts.
                ready.readable = true;
                ready.writable = true;
                ready.closed = true;
            }

            out.push((entry.fd, ready));
        }

        Ok(())
    }
}
