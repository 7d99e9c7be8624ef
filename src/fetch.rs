//! Example consumer: a client session over one [`Connection`].
//!
//! A fetcher connects, writes a fixed-template request, reads until the peer
//! closes, then delivers the bytes after the first `\r\n\r\n` as the body
//! (everything before it is an opaque header and is discarded). Phases move
//! Connecting → Sending → Receiving → Done; Errored is reachable from any
//! phase and carries whatever had accumulated, for diagnostics.
//!
//! Workflows coordinate through a shared [`PendingSet`]: each one joins at
//! start and leaves on Done or Errored; the workflow that empties the set
//! fires the loop's stop token.

use crate::error::{Error, Result};
use crate::net::Connection;
use crate::runtime::StopToken;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const HEADER_DELIMITER: &[u8] = b"\r\n\r\n";

/// Fetch workflow phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Sending,
    Receiving,
    Done,
    Errored,
}

/// What to fetch and from where.
#[derive(Clone, Debug)]
pub struct FetchTarget {
    pub address: SocketAddr,
    pub host: String,
    pub path: String,
}

impl FetchTarget {
    pub fn new(address: SocketAddr, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            address,
            host: host.into(),
            path: path.into(),
        }
    }

    /// The fixed request template of the wire format.
    pub fn request_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.path, self.host
        )
        .into_bytes()
    }
}

/// The delivered outcome of one workflow.
#[derive(Debug)]
pub struct FetchResult {
    pub target: FetchTarget,
    pub phase: Phase,
    pub body: Vec<u8>,
    pub error: Option<Error>,
}

/// Shared set of workflows that have not finished yet.
///
/// Whichever workflow removes the last ticket sets the stop token, which is
/// the reactor loop's external termination condition in the demo setup.
#[derive(Clone)]
pub struct PendingSet {
    tickets: Arc<Mutex<HashSet<usize>>>,
    next_ticket: Arc<AtomicUsize>,
    stop: StopToken,
}

impl PendingSet {
    pub fn new(stop: StopToken) -> Self {
        Self {
            tickets: Arc::new(Mutex::new(HashSet::new())),
            next_ticket: Arc::new(AtomicUsize::new(1)),
            stop,
        }
    }

    pub fn len(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.lock().unwrap().is_empty()
    }

    fn join(&self) -> usize {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        self.tickets.lock().unwrap().insert(ticket);
        ticket
    }

    fn leave(&self, ticket: usize) {
        let mut tickets = self.tickets.lock().unwrap();
        tickets.remove(&ticket);

        if tickets.is_empty() {
            self.stop.set();
        }
    }
}

/// Drives one fetch workflow to completion.
///
/// Never returns `Err`: failures are folded into the result's Errored phase
/// so one broken fetch cannot abort its siblings or the loop.
pub async fn fetch(target: FetchTarget, pending: PendingSet) -> FetchResult {
    let ticket = pending.join();
    let mut fetcher = Fetcher::new(target);

    let result = fetcher.run().await;
    pending.leave(ticket);

    result
}

struct Fetcher {
    target: FetchTarget,
    phase: Phase,
    response: Vec<u8>,
}

impl Fetcher {
    fn new(target: FetchTarget) -> Self {
        Self {
            target,
            phase: Phase::Connecting,
            response: Vec::new(),
        }
    }

    async fn run(&mut self) -> FetchResult {
        match self.session().await {
            Ok(()) => {
                self.phase = Phase::Done;
                log::debug!(
                    "fetch {}{}: done, {} byte(s) of body",
                    self.target.host,
                    self.target.path,
                    self.body().len()
                );

                FetchResult {
                    target: self.target.clone(),
                    phase: Phase::Done,
                    body: self.body(),
                    error: None,
                }
            }
            Err(err) => {
                self.phase = Phase::Errored;
                log::debug!(
                    "fetch {}{}: errored with {} byte(s) accumulated: {err}",
                    self.target.host,
                    self.target.path,
                    self.response.len()
                );

                FetchResult {
                    target: self.target.clone(),
                    phase: Phase::Errored,
                    // The partial buffer travels with the error for
                    // diagnostics.
                    body: self.response.clone(),
                    error: Some(err),
                }
            }
        }
    }

    async fn session(&mut self) -> Result<()> {
        let mut conn = Connection::open(self.target.address).await?;

        self.phase = Phase::Sending;
        conn.write_all(&self.target.request_bytes()).await?;

        self.phase = Phase::Receiving;
        while let Some(chunk) = conn.read_once().await? {
            self.response.extend_from_slice(chunk);
        }

        conn.close();
        Ok(())
    }

    /// The response payload: everything after the first header delimiter.
    ///
    /// If the peer went away before the delimiter arrived, the accumulated
    /// bytes are preserved verbatim rather than discarded.
    fn body(&self) -> Vec<u8> {
        match find_delimiter(&self.response) {
            Some(index) => self.response[index + HEADER_DELIMITER.len()..].to_vec(),
            None => self.response.clone(),
        }
    }
}

fn find_delimiter(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(HEADER_DELIMITER.len())
        .position(|window| window == HEADER_DELIMITER)
}
