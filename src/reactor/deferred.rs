//! Single-assignment deferred result.
//!
//! A [`Deferred`] is the callback side of a registration: the reactor
//! resolves it with the readiness snapshot, and whatever awaits it resumes.
//! It resolves at most once; the value is consumed by exactly one taker.
//!
//! Clones share the same slot, which is also how the registration table
//! identifies a callback: two handles are the same callback exactly when
//! they point at the same slot.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

enum State<T> {
    Pending,
    // Option so the value can be taken exactly once after resolution.
    Resolved(Option<T>),
}

struct Inner<T> {
    state: State<T>,
    continuations: Vec<Waker>,
}

/// A slot that is assigned exactly once and consumed exactly once.
pub struct Deferred<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deferred<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                continuations: Vec::new(),
            })),
        }
    }

    /// Whether `other` is a handle to this very slot.
    pub(crate) fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Assigns the value and wakes every registered continuation, in
    /// registration order.
    ///
    /// Resolving an already-resolved slot is a no-op; single assignment is
    /// checked in debug builds.
    pub fn resolve(&self, value: T) {
        let continuations = {
            let mut inner = self.inner.lock().unwrap();

            if let State::Resolved(_) = inner.state {
                debug_assert!(false, "deferred slot resolved twice");
                return;
            }

            inner.state = State::Resolved(Some(value));
            std::mem::take(&mut inner.continuations)
        };

        // Wake outside the lock: a woken task may immediately touch the slot.
        for waker in continuations {
            waker.wake();
        }
    }

    /// Registers a continuation to be woken at resolution.
    ///
    /// If the slot is already resolved the waker fires immediately: a late
    /// registration still gets its delivery.
    pub fn on_resolve(&self, waker: &Waker) {
        let mut inner = self.inner.lock().unwrap();

        if let State::Resolved(_) = inner.state {
            drop(inner);
            waker.wake_by_ref();
            return;
        }

        if !inner.continuations.iter().any(|w| w.will_wake(waker)) {
            inner.continuations.push(waker.clone());
        }
    }

    /// Takes the value if the slot has resolved and nobody took it yet.
    pub fn try_take(&self) -> Option<T> {
        match &mut self.inner.lock().unwrap().state {
            State::Resolved(value) => value.take(),
            State::Pending => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.inner.lock().unwrap().state, State::Resolved(_))
    }

    /// A future that suspends until the slot resolves, then yields the value.
    pub fn wait(&self) -> Wait<T> {
        Wait {
            deferred: self.clone(),
        }
    }
}

/// Future returned by [`Deferred::wait`].
pub struct Wait<T> {
    deferred: Deferred<T>,
}

impl<T> Future for Wait<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        if let Some(value) = self.deferred.try_take() {
            return Poll::Ready(value);
        }

        self.deferred.on_resolve(cx.waker());

        // The slot may have resolved between the take and the registration;
        // on_resolve fires the waker immediately in that case, so the value
        // is picked up on the next poll.
        Poll::Pending
    }
}
