//! One non-blocking socket conversation.
//!
//! A [`Connection`] owns its descriptor and the state machine
//! Idle → Connecting → Open → HalfClosed → Closed. Every operation that the
//! OS answers with `EAGAIN`/`EWOULDBLOCK` turns into a suspend-point: the
//! connection registers a fresh [`Deferred`] slot for the relevant interest
//! and awaits its resolution, so sequential-looking code (connect, send,
//! receive loop, close) interleaves with every other task on the loop.
//!
//! Peer-close policy: a read that returns zero bytes and a read that fails
//! with `ECONNRESET` are the same event. Whatever has accumulated in the
//! inbound buffer stays delivered; the reset is folded into the empty read
//! rather than surfacing as an error.

use crate::error::{Error, Result};
use crate::net::{set_nonblocking, socket_addr_to_storage};
use crate::poller::{Interest, Ready};
use crate::reactor::{Deferred, ReactorHandle};
use crate::runtime::current_reactor;

use libc::{
    AF_INET, AF_INET6, EINPROGRESS, MSG_NOSIGNAL, SO_ERROR, SOCK_STREAM, SOL_SOCKET, connect,
    getsockopt, recv, send, sockaddr, socket, socklen_t,
};
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;

const READ_CHUNK: usize = 4096;

/// Connection lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Connecting,
    Open,
    HalfClosed,
    Closed,
}

/// A non-blocking TCP connection owned by exactly one workflow.
///
/// The reactor only ever holds a registration keyed by the descriptor, never
/// the connection itself; [`close`](Connection::close) tears the registration
/// down before the descriptor is released.
pub struct Connection {
    fd: RawFd,
    reactor: ReactorHandle,
    state: ConnState,
    inbound: Vec<u8>,
    peer_closed: bool,
}

impl Connection {
    /// Opens a connection to `addr`.
    ///
    /// A connect that would block suspends on writability; once the socket
    /// reports writable, `SO_ERROR` decides between Open and failure. Must
    /// run within a runtime context.
    pub async fn open(addr: SocketAddr) -> Result<Connection> {
        let reactor = current_reactor();

        let domain = match addr {
            SocketAddr::V4(_) => AF_INET,
            SocketAddr::V6(_) => AF_INET6,
        };

        let fd = unsafe { socket(domain, SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        // The connection owns the descriptor from here on; early returns
        // close it through Drop.
        let mut conn = Connection {
            fd,
            reactor,
            state: ConnState::Idle,
            inbound: Vec::new(),
            peer_closed: false,
        };

        set_nonblocking(fd)?;

        let (storage, len) = socket_addr_to_storage(&addr);
        let result = unsafe { connect(fd, &storage as *const _ as *const sockaddr, len) };

        if result == 0 {
            conn.state = ConnState::Open;
            return Ok(conn);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(EINPROGRESS) {
            return Err(err.into());
        }

        conn.state = ConnState::Connecting;
        log::trace!("fd {fd}: connect in progress to {addr}");

        conn.wait_ready(Interest::WRITABLE).await?;

        let mut so_error: libc::c_int = 0;
        let mut optlen = mem::size_of::<libc::c_int>() as socklen_t;
        let result = unsafe {
            getsockopt(
                fd,
                SOL_SOCKET,
                SO_ERROR,
                &mut so_error as *mut _ as *mut libc::c_void,
                &mut optlen,
            )
        };
        if result < 0 {
            return Err(io::Error::last_os_error().into());
        }
        if so_error != 0 {
            return Err(io::Error::from_raw_os_error(so_error).into());
        }

        conn.state = ConnState::Open;
        Ok(conn)
    }

    /// Sends all of `bytes`, suspending on writability whenever the socket
    /// would block. Partial sends are tracked: only the unsent remainder is
    /// retried, so nothing is dropped or duplicated.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut remaining = bytes;

        while !remaining.is_empty() {
            let result = unsafe {
                send(
                    self.fd,
                    remaining.as_ptr() as *const _,
                    remaining.len(),
                    MSG_NOSIGNAL,
                )
            };

            if result >= 0 {
                remaining = &remaining[result as usize..];
                continue;
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {
                    self.wait_ready(Interest::WRITABLE).await?;
                }
                io::ErrorKind::Interrupted => {}
                _ => return Err(err.into()),
            }
        }

        Ok(())
    }

    /// Receives one chunk, suspending on readability whenever the socket
    /// would block.
    ///
    /// Returns `Some(chunk)` with the freshly received bytes (also appended
    /// to the inbound accumulation buffer), or `None` once the peer has
    /// closed. A connection reset is answered exactly like a clean close:
    /// `None`, with everything accumulated so far still available. Calls
    /// after the peer closed keep returning `None`.
    pub async fn read_once(&mut self) -> Result<Option<&[u8]>> {
        if self.peer_closed {
            return Ok(None);
        }

        let mut buf = [0u8; READ_CHUNK];

        loop {
            let result = unsafe { recv(self.fd, buf.as_mut_ptr() as *mut _, buf.len(), 0) };

            if result > 0 {
                let start = self.inbound.len();
                self.inbound.extend_from_slice(&buf[..result as usize]);
                return Ok(Some(&self.inbound[start..]));
            }

            if result == 0 {
                self.observe_peer_close();
                return Ok(None);
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => {
                    self.wait_ready(Interest::READABLE).await?;
                }
                io::ErrorKind::Interrupted => {}
                io::ErrorKind::ConnectionReset => {
                    log::trace!("fd {}: reset folded into peer close", self.fd);
                    self.observe_peer_close();
                    return Ok(None);
                }
                _ => return Err(err.into()),
            }
        }
    }

    /// Unregisters from the reactor, then releases the descriptor.
    ///
    /// A peer-close dispatch may already have consumed the registration, so
    /// an absent entry is a no-op here, never an error. Closing twice is
    /// also a no-op.
    pub fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }

        match self.reactor.lock().unwrap().unregister(self.fd) {
            Ok(()) | Err(Error::NotRegistered(_)) => {}
            Err(err) => log::warn!("fd {}: unregister on close failed: {err}", self.fd),
        }

        unsafe {
            libc::close(self.fd);
        }

        self.state = ConnState::Closed;
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Everything received so far.
    pub fn inbound(&self) -> &[u8] {
        &self.inbound
    }

    /// Takes ownership of everything received so far.
    pub fn take_inbound(&mut self) -> Vec<u8> {
        mem::take(&mut self.inbound)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd
    }

    fn observe_peer_close(&mut self) {
        self.peer_closed = true;
        if matches!(self.state, ConnState::Connecting | ConnState::Open) {
            self.state = ConnState::HalfClosed;
        }
    }

    /// One suspend-point: registers a fresh slot for `interest` and waits
    /// for the reactor to resolve it.
    async fn wait_ready(&self, interest: Interest) -> Result<Ready> {
        let slot = Deferred::new();
        self.reactor.lock().unwrap().register(self.fd, interest, &slot)?;

        Ok(slot.wait().await)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
