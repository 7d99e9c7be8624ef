//! The three-list `select(2)` backend.
//!
//! The interest table lives entirely in user space; every poll rebuilds the
//! read, write, and exception descriptor sets from it. Level-triggered: a
//! ready descriptor keeps reappearing until its interest is changed or the
//! entry is removed, which the reactor handles by consuming registrations at
//! dispatch time.

use super::{Interest, Poller, Ready};

use libc::{FD_ISSET, FD_SET, FD_SETSIZE, FD_ZERO, fd_set, select, timeval};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::Duration;

pub(crate) struct SelectPoller {
    entries: HashMap<RawFd, Interest>,
}

impl SelectPoller {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl Poller for SelectPoller {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if fd < 0 || fd as usize >= FD_SETSIZE as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "descriptor out of select() range",
            ));
        }

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
        let mut read_set: fd_set = unsafe { mem::zeroed() };
        let mut write_set: fd_set = unsafe { mem::zeroed() };
        let mut except_set: fd_set = unsafe { mem::zeroed() };

        unsafe {
            FD_ZERO(&mut read_set);
            FD_ZERO(&mut write_set);
            FD_ZERO(&mut except_set);
        }

        let mut max_fd: RawFd = -1;

        for (&fd, interest) in &self.entries {
            if interest.read {
                unsafe { FD_SET(fd, &mut read_set) };
            }
            if interest.write {
                unsafe { FD_SET(fd, &mut write_set) };
            }
            // Exceptional conditions are watched for every entry so a dying
            // peer surfaces even when only one direction is of interest.
            unsafe { FD_SET(fd, &mut except_set) };

            max_fd = max_fd.max(fd);
        }

        let mut tv;
        let tv_ptr = match timeout {
            None => std::ptr::null_mut(),
            Some(duration) => {
                tv = timeval {
                    tv_sec: duration.as_secs().min(i64::MAX as u64) as _,
                    tv_usec: duration.subsec_micros() as _,
                };
                &mut tv as *mut timeval
            }
        };

        let result = unsafe {
            select(
                max_fd + 1,
                &mut read_set,
                &mut write_set,
                &mut except_set,
                tv_ptr,
            )
        };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        if result == 0 {
            return Ok(());
        }

        let mut ready: HashMap<RawFd, Ready> = HashMap::new();

        for &fd in self.entries.keys() {
            if unsafe { FD_ISSET(fd, &read_set) } {
                ready.entry(fd).or_default().merge(Ready {
                    readable: true,
                    ..Ready::default()
                });
            }
            if unsafe { FD_ISSET(fd, &write_set) } {
                ready.entry(fd).or_default().merge(Ready {
                    writable: true,
                    ..Ready::default()
                });
            }
            if unsafe { FD_ISSET(fd, &except_set) } {
                ready.entry(fd).or_default().merge(Ready {
                    readable: true,
                    closed: true,
                    ..Ready::default()
                });
            }
        }

        out.extend(ready);

        Ok(())
    }
}
