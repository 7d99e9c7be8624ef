//! Task driver behavior: priming, joining, panic isolation, and loop
//! termination.

use miniloop::{JoinSet, Runtime, StopToken, Task, TaskState, yield_now};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn block_on_returns_the_value() {
    let mut rt = Runtime::new();
    let value = rt.block_on(async { 41 + 1 });
    assert_eq!(value, 42);
}

#[test]
fn join_handle_yields_the_task_output() {
    let mut rt = Runtime::new();

    let value = rt.block_on(async {
        let handle = Task::spawn(async {
            yield_now().await;
            7u32
        });

        handle.await.unwrap()
    });

    assert_eq!(value, 7);
}

#[test]
fn spawn_primes_the_task_synchronously() {
    let mut rt = Runtime::new();
    let started = Arc::new(AtomicUsize::new(0));

    let flag = started.clone();
    let handle = rt.spawn(async move {
        flag.store(1, Ordering::SeqCst);
        yield_now().await;
        flag.store(2, Ordering::SeqCst);
    });

    // The future ran up to its first suspend-point before spawn returned.
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), TaskState::Suspended);
    assert!(!handle.is_finished());

    rt.run().unwrap();

    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(handle.state(), TaskState::Completed);
    assert!(handle.is_finished());
}

#[test]
fn spawn_of_immediate_future_completes_during_priming() {
    let rt = Runtime::new();

    let handle = rt.spawn(async { 3u8 });
    assert_eq!(handle.state(), TaskState::Completed);
    assert_eq!(rt.live_tasks(), 0);
}

#[test]
fn panicked_task_does_not_take_down_its_siblings() {
    let mut rt = Runtime::new();

    let (failed, survived) = rt.block_on(async {
        let bad = Task::spawn(async {
            yield_now().await;
            panic!("boom");
        });
        let good = Task::spawn(async {
            yield_now().await;
            7u32
        });

        (bad.await, good.await)
    });

    let err = failed.expect_err("the panicking task should fail its join");
    assert!(err.to_string().contains("boom"));
    assert_eq!(survived.unwrap(), 7);
}

#[test]
fn panicked_task_state_is_failed() {
    let mut rt = Runtime::new();

    let handle = rt.spawn(async {
        yield_now().await;
        panic!("late failure");
    });

    rt.run().unwrap();

    assert_eq!(handle.state(), TaskState::Failed);
    assert!(handle.is_finished());
}

#[test]
fn run_terminates_once_every_task_retires() {
    let mut rt = Runtime::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let counter = counter.clone();
        rt.spawn(async move {
            yield_now().await;
            yield_now().await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }

    rt.run().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(rt.live_tasks(), 0);
}

#[test]
fn stop_token_interrupts_a_busy_loop() {
    let mut rt = Runtime::new();
    let stop: StopToken = rt.stop_token();

    // Never completes on its own; only the stop token can end the loop.
    rt.spawn(async {
        loop {
            yield_now().await;
        }
    });

    let stopper = stop.clone();
    rt.spawn(async move {
        for _ in 0..3 {
            yield_now().await;
        }
        stopper.set();
    });

    rt.run().unwrap();

    assert!(stop.is_set());
    assert_eq!(rt.live_tasks(), 1);
}

#[test]
fn join_set_awaits_everything_it_holds() {
    let mut rt = Runtime::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let total = counter.clone();
    rt.block_on(async move {
        let mut set = JoinSet::new();

        for i in 0..5usize {
            let counter = total.clone();
            set.push(Task::spawn(async move {
                yield_now().await;
                counter.fetch_add(i, Ordering::SeqCst);
            }));
        }

        assert_eq!(set.len(), 5);
        set.await_all().await;
        assert!(set.is_empty());
    });

    assert_eq!(counter.load(Ordering::SeqCst), 0 + 1 + 2 + 3 + 4);
}
