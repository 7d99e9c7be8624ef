//! The kernel-queue `epoll(7)` backend.
//!
//! Unlike the other two families, the interest table lives in the kernel:
//! add/modify/remove translate directly into `epoll_ctl` calls and poll is a
//! single `epoll_wait`. `EPOLLRDHUP` is always requested so a peer shutting
//! down its write side is observed as a readability-plus-closed pair rather
//! than a bare wakeup.

use super::{Interest, Poller, Ready, timeout_ms};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLRDHUP, close, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

const EVENT_CAPACITY: usize = 64;

const EMPTY_EVENT: epoll_event = epoll_event { events: 0, u64: 0 };

pub(crate) struct EpollPoller {
    epoll_fd: RawFd,
    events: [epoll_event; EVENT_CAPACITY],
}

impl EpollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll_fd = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll_fd,
            events: [EMPTY_EVENT; EVENT_CAPACITY],
        })
    }

    fn control(&self, op: i32, fd: RawFd, interest: Option<Interest>) -> io::Result<()> {
        let mut event = EMPTY_EVENT;
        event.u64 = fd as u64;

        if let Some(interest) = interest {
            if interest.read {
                event.events |= EPOLLIN as u32;
            }
            if interest.write {
                event.events |= EPOLLOUT as u32;
            }
            event.events |= EPOLLRDHUP as u32;
        }

        let result = unsafe { epoll_ctl(self.epoll_fd, op, fd, &mut event) };

        if result < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }
}

impl Poller for EpollPoller {
    fn add(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.control(EPOLL_CTL_ADD, fd, Some(interest))
    }

    fn modify(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.control(EPOLL_CTL_MOD, fd, Some(interest))
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        self.control(EPOLL_CTL_DEL, fd, None)
    }

    fn poll(
        &mut self,
        out: &mut Vec<(RawFd, Ready)>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let count = unsafe {
            epoll_wait(
                self.epoll_fd,
                self.events.as_mut_ptr(),
                EVENT_CAPACITY as i32,
                timeout_ms(timeout),
            )
        };

        if count < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        for event in self.events.iter().take(count as usize) {
            let fd = event.u64 as RawFd;
            let mut ready = Ready::default();

            if event.events & EPOLLIN as u32 != 0 {
                ready.readable = true;
            }
            if event.events & EPOLLOUT as u32 != 0 {
                ready.writable = true;
            }
            if event.events & (EPOLLHUP | EPOLLRDHUP) as u32 != 0 {
                ready.readable = true;
                ready.closed = true;
            }
            if event.events & EPOLLERR as u32 != 0 {
                ready.readable = true;
                ready.writable = true;
                ready.closed = true;
            }

            out.push((fd, ready));
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            close(self.epoll_fd);
        }
    }
}
