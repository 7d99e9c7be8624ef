//! Registration-table invariants, exercised against all three backends.

use miniloop::{Backend, Deferred, Error, Interest, Reactor};

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

const BACKENDS: [Backend; 3] = [Backend::Select, Backend::Poll, Backend::Epoll];

fn pipe_pair() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    (fds[0], fds[1])
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

#[test]
fn duplicate_registration_rejected() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();
        let (read_end, write_end) = pipe_pair();

        let slot_a = Deferred::new();
        let slot_b = Deferred::new();

        reactor
            .register(read_end, Interest::READABLE, &slot_a)
            .unwrap();

        match reactor.register(read_end, Interest::WRITABLE, &slot_b) {
            Err(Error::DuplicateRegistration(fd)) => assert_eq!(fd, read_end),
            other => panic!("expected DuplicateRegistration, got {other:?}"),
        }

        assert_eq!(reactor.registered_count(), 1, "backend {backend:?}");

        close_fd(read_end);
        close_fd(write_end);
    }
}

#[test]
fn same_slot_reregistration_changes_mask() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();
        let (read_end, write_end) = pipe_pair();

        let slot = Deferred::new();

        reactor
            .register(write_end, Interest::WRITABLE, &slot)
            .unwrap();
        reactor.register(write_end, Interest::BOTH, &slot).unwrap();

        assert_eq!(reactor.registered_count(), 1);
        assert_eq!(reactor.interest_of(write_end), Some(Interest::BOTH));

        close_fd(read_end);
        close_fd(write_end);
    }
}

#[test]
fn modify_and_unregister_require_live_entry() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();
        let (read_end, write_end) = pipe_pair();

        match reactor.modify(read_end, Interest::READABLE) {
            Err(Error::NotRegistered(fd)) => assert_eq!(fd, read_end),
            other => panic!("expected NotRegistered, got {other:?}"),
        }

        match reactor.unregister(read_end) {
            Err(Error::NotRegistered(fd)) => assert_eq!(fd, read_end),
            other => panic!("expected NotRegistered, got {other:?}"),
        }

        close_fd(read_end);
        close_fd(write_end);
    }
}

#[test]
fn probe_resolves_writable_registration() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();
        let (read_end, write_end) = pipe_pair();

        let slot = Deferred::new();
        reactor
            .register(write_end, Interest::WRITABLE, &slot)
            .unwrap();

        // A fresh pipe's write end is immediately writable.
        let batch = reactor.poll(Some(Duration::ZERO)).unwrap();
        assert!(batch.iter().any(|&(fd, _)| fd == write_end));

        let fired = reactor.dispatch(&batch);
        assert_eq!(fired, 1);

        let ready = slot.try_take().expect("slot should have resolved");
        assert!(ready.writable);

        // Dispatch consumed the registration.
        assert!(!reactor.is_registered(write_end));

        close_fd(read_end);
        close_fd(write_end);
    }
}

#[test]
fn dispatch_skips_entries_removed_within_batch() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();
        let (read_a, write_a) = pipe_pair();
        let (read_b, write_b) = pipe_pair();

        let byte = [7u8; 1];
        unsafe {
            libc::write(write_a, byte.as_ptr() as *const _, 1);
            libc::write(write_b, byte.as_ptr() as *const _, 1);
        }

        let slot_a = Deferred::new();
        let slot_b = Deferred::new();
        reactor.register(read_a, Interest::READABLE, &slot_a).unwrap();
        reactor.register(read_b, Interest::READABLE, &slot_b).unwrap();

        let batch = reactor.poll(Some(Duration::ZERO)).unwrap();
        assert_eq!(batch.len(), 2);

        // Batches are delivered in ascending descriptor order.
        assert!(batch[0].0 < batch[1].0);

        assert_eq!(reactor.dispatch(&batch), 2);
        assert!(slot_a.is_resolved());
        assert!(slot_b.is_resolved());

        // Replaying the same batch must not re-deliver anything: the
        // registrations were consumed.
        assert_eq!(reactor.dispatch(&batch), 0);
        assert_eq!(reactor.registered_count(), 0);

        for fd in [read_a, write_a, read_b, write_b] {
            close_fd(fd);
        }
    }
}

#[test]
fn hangup_reported_as_readable_or_closed() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();
        let (read_end, write_end) = pipe_pair();

        let slot = Deferred::new();
        reactor
            .register(read_end, Interest::READABLE, &slot)
            .unwrap();

        close_fd(write_end);

        let batch = reactor.poll(Some(Duration::from_millis(500))).unwrap();
        assert!(
            batch.iter().any(|&(fd, _)| fd == read_end),
            "backend {backend:?} did not report the hangup"
        );

        reactor.dispatch(&batch);
        let ready = slot.try_take().expect("slot should have resolved");
        assert!(
            ready.readable || ready.closed,
            "backend {backend:?} reported {ready:?}"
        );

        close_fd(read_end);
    }
}

// Pseudo-random register/modify/unregister sequences against a shadow model:
// after every operation the table holds at most one live entry per
// descriptor, and exactly the entries the model predicts.
#[test]
fn randomized_operations_keep_single_entry_invariant() {
    for backend in BACKENDS {
        let mut reactor = Reactor::new(backend).unwrap();

        let pipes: Vec<(RawFd, RawFd)> = (0..4).map(|_| pipe_pair()).collect();
        let fds: Vec<RawFd> = pipes.iter().map(|&(read_end, _)| read_end).collect();

        let slots: Vec<Deferred<miniloop::Ready>> = (0..fds.len()).map(|_| Deferred::new()).collect();

        // Shadow model: fd -> index of the slot registered for it.
        let mut model: HashMap<RawFd, usize> = HashMap::new();

        let mut seed: u64 = 0x2545F4914F6CDD1D;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..500 {
            let fd_index = (next() % fds.len() as u64) as usize;
            let fd = fds[fd_index];
            let slot_index = (next() % slots.len() as u64) as usize;
            let interest = if next() % 2 == 0 {
                Interest::READABLE
            } else {
                Interest::BOTH
            };

            match next() % 3 {
                0 => {
                    let result = reactor.register(fd, interest, &slots[slot_index]);
                    match model.get(&fd) {
                        Some(&registered) if registered != slot_index => {
                            assert!(matches!(result, Err(Error::DuplicateRegistration(_))));
                        }
                        _ => {
                            result.unwrap();
                            model.insert(fd, slot_index);
                        }
                    }
                }
                1 => {
                    let result = reactor.modify(fd, interest);
                    if model.contains_key(&fd) {
                        result.unwrap();
                    } else {
                        assert!(matches!(result, Err(Error::NotRegistered(_))));
                    }
                }
                _ => {
                    let result = reactor.unregister(fd);
                    if model.remove(&fd).is_some() {
                        result.unwrap();
                    } else {
                        assert!(matches!(result, Err(Error::NotRegistered(_))));
                    }
                }
            }

            assert_eq!(
                reactor.registered_count(),
                model.len(),
                "backend {backend:?} diverged from the model"
            );
            for &fd in &fds {
                assert_eq!(reactor.is_registered(fd), model.contains_key(&fd));
            }
        }

        for (read_end, write_end) in pipes {
            close_fd(read_end);
            close_fd(write_end);
        }
    }
}
