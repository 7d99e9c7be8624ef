//! Crate-wide error taxonomy.
//!
//! Transient non-blocking signals (`EAGAIN`/`EWOULDBLOCK`) never appear here:
//! they are converted into suspend-points inside the connection and reactor
//! layers. A peer closing its end is likewise not an error, it is reported as
//! an empty read. What remains falls into three groups: multiplexer misuse
//! (a bug in descriptor lifecycle management), an unrecoverable failure of
//! the polling backend itself, and ordinary socket-level I/O errors.

use std::fmt;
use std::io;
use std::os::unix::io::RawFd;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// A descriptor was registered while already held by a different slot.
    DuplicateRegistration(RawFd),

    /// A modify or unregister targeted a descriptor with no live entry.
    NotRegistered(RawFd),

    /// The OS polling facility failed in a way the loop cannot recover from.
    BackendPollFailure(io::Error),

    /// A socket-level I/O error outside the transient set.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DuplicateRegistration(fd) => {
                write!(f, "descriptor {fd} is already registered")
            }
            Error::NotRegistered(fd) => {
                write!(f, "descriptor {fd} is not registered")
            }
            Error::BackendPollFailure(err) => {
                write!(f, "polling backend failure: {err}")
            }
            Error::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BackendPollFailure(err) | Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
