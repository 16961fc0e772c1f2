// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Condition variable tests: wake-one ordering, mutex coupling, event mode

mod common;

use std::cell::{Cell, RefCell};

use common::{arg, from_arg, start};
use greenrt::{create, join, shutdown_runtime, yield_now, Condvar, Mutex};

struct Waiter<'a> {
    id: usize,
    lock: &'a Mutex,
    cond: &'a Condvar,
    log: &'a RefCell<Vec<usize>>,
}

fn wait_then_log(waiter: usize) -> usize {
    let waiter: &Waiter = unsafe { from_arg(waiter) };
    waiter.lock.lock();
    waiter.cond.wait(waiter.lock);
    assert!(waiter.lock.is_locked());
    waiter.log.borrow_mut().push(waiter.id);
    waiter.lock.unlock();
    waiter.id
}

#[test]
fn test_signal_wakes_one_in_fifo_order() {
    start(false);

    let lock = Mutex::new();
    let cond = Condvar::new();
    let log = RefCell::new(Vec::new());
    let waiters: Vec<_> = (0..3)
        .map(|id| Waiter {
            id,
            lock: &lock,
            cond: &cond,
            log: &log,
        })
        .collect();
    let tids: Vec<_> = waiters.iter().map(|w| create(wait_then_log, arg(w))).collect();

    yield_now();
    assert_eq!(cond.waiters(), 3);
    assert!(!lock.is_locked());

    for expected in 0..3 {
        cond.signal();
        assert_eq!(cond.waiters(), 2 - expected);

        // The woken waiter runs to completion before main comes back.
        yield_now();
        assert_eq!(log.borrow().last(), Some(&expected));
        assert_eq!(log.borrow().len(), expected + 1);
    }

    // Nobody left to wake.
    cond.signal();
    assert_eq!(cond.waiters(), 0);

    for (id, tid) in tids.into_iter().enumerate() {
        assert_eq!(join(tid), id);
    }
    shutdown_runtime().unwrap();
}

#[test]
fn test_wakeup_reacquires_held_mutex() {
    start(false);

    let lock = Mutex::new();
    let cond = Condvar::new();
    let log = RefCell::new(Vec::new());
    let waiter = Waiter {
        id: 9,
        lock: &lock,
        cond: &cond,
        log: &log,
    };
    let tid = create(wait_then_log, arg(&waiter));

    yield_now();
    assert_eq!(cond.waiters(), 1);

    // Signal while holding the mutex: the waiter wakes, then blocks on it.
    lock.lock();
    cond.signal();
    yield_now();
    assert_eq!(cond.waiters(), 0);
    assert_eq!(lock.waiters(), 1);
    assert!(log.borrow().is_empty());

    lock.unlock();
    assert_eq!(join(tid), 9);
    assert_eq!(*log.borrow(), [9]);
    assert!(!lock.is_locked());

    shutdown_runtime().unwrap();
}

struct Event {
    cond: Condvar,
    fired: Cell<bool>,
}

fn wait_for_event(event: usize) -> usize {
    let event: &Event = unsafe { from_arg(event) };
    event.cond.wait_event();
    event.fired.get() as usize
}

#[test]
fn test_event_wait_without_mutex() {
    start(false);

    let event = Event {
        cond: Condvar::new(),
        fired: Cell::new(false),
    };
    let tid = create(wait_for_event, arg(&event));

    yield_now();
    assert_eq!(event.cond.waiters(), 1);

    event.fired.set(true);
    event.cond.signal();
    assert_eq!(join(tid), 1);

    shutdown_runtime().unwrap();
}

struct Mailbox {
    lock: Mutex,
    cond: Condvar,
    slot: Cell<Option<usize>>,
}

fn consume(mailbox: usize) -> usize {
    let mailbox: &Mailbox = unsafe { from_arg(mailbox) };
    let mut total = 0;
    for _ in 0..5 {
        mailbox.lock.lock();
        loop {
            if let Some(value) = mailbox.slot.take() {
                total += value;
                break;
            }
            mailbox.cond.wait(&mailbox.lock);
        }
        mailbox.cond.signal();
        mailbox.lock.unlock();
    }
    total
}

fn produce(mailbox: usize) -> usize {
    let mailbox: &Mailbox = unsafe { from_arg(mailbox) };
    for value in 1..=5 {
        mailbox.lock.lock();
        while mailbox.slot.get().is_some() {
            mailbox.cond.wait(&mailbox.lock);
        }
        mailbox.slot.set(Some(value));
        mailbox.cond.signal();
        mailbox.lock.unlock();
    }
    0
}

#[test]
fn test_producer_consumer_under_preemption() {
    start(true);

    let mailbox = Mailbox {
        lock: Mutex::new(),
        cond: Condvar::new(),
        slot: Cell::new(None),
    };
    let consumer = create(consume, arg(&mailbox));
    let producer = create(produce, arg(&mailbox));

    assert_eq!(join(consumer), 15);
    join(producer);

    shutdown_runtime().unwrap();
}
