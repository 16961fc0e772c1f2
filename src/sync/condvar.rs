// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Condition Variable
//!
//! This module provides event notification between green threads.
//!
//! # Design
//!
//! - [`Condvar::wait`] enqueues the caller, releases the mutex with the
//!   same handoff as [`Mutex::unlock`], dispatches, and on wakeup
//!   re-acquires the mutex through the contended `lock` path.
//! - [`Condvar::wait_event`] is the pure event mode: no mutex is released
//!   or re-acquired.
//! - [`Condvar::signal`] wakes exactly one waiter in FIFO order, or does
//!   nothing. There is no broadcast.
//! - Signals are not remembered: a signal with no waiter is lost.
//!
//! # Usage
//!
//! ```rust,ignore
//! m.lock();
//! while !ready.get() {
//!     cond.wait(&m);
//! }
//! m.unlock();
//!
//! // elsewhere
//! ready.set(true);
//! cond.signal();
//! ```

use crate::debug::log_trace;
use crate::preempt::CriticalSection;
use crate::sched;
use crate::thread::BlockReason;

use super::{Mutex, WaitQueue};

/// Condition variable for green threads of one runtime
#[derive(Debug, Default)]
pub struct Condvar {
    waiters: WaitQueue,
}

impl Condvar {
    /// Create a condition variable with no waiters
    pub const fn new() -> Self {
        Self {
            waiters: WaitQueue::new(),
        }
    }

    /// Release `mutex`, block until signalled, then re-acquire `mutex`
    ///
    /// The caller must hold `mutex`.
    pub fn wait(&self, mutex: &Mutex) {
        let cs = CriticalSection::enter();

        let me = self.waiters.park_current(&cs, BlockReason::Condvar);
        mutex.unlock_in(&cs);
        log_trace!("Thread {} waiting on condvar", me);

        sched::switch_away(&cs);

        mutex.lock_in(&cs);
    }

    /// Block until signalled, without any mutex
    pub fn wait_event(&self) {
        let cs = CriticalSection::enter();
        self.waiters.block_current(&cs, BlockReason::Condvar);
    }

    /// Wake the longest waiter; a no-op when nobody waits
    pub fn signal(&self) {
        let cs = CriticalSection::enter();
        if self.waiters.is_empty() {
            return;
        }

        if let Some(tid) = self.waiters.wake_one(&cs) {
            log_trace!("Condvar signalled thread {}", tid);
        }
    }

    /// Number of threads blocked in `wait` or `wait_event`
    pub fn waiters(&self) -> usize {
        self.waiters.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_without_waiters_is_noop() {
        let cond = Condvar::new();
        cond.signal();
        cond.signal();
        assert_eq!(cond.waiters(), 0);
    }
}
