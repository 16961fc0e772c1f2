// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Green Mutex
//!
//! This module provides a blocking mutual exclusion lock for green threads.
//!
//! # Design
//!
//! - **Blocking**: a contended `lock` suspends the caller in the mutex's
//!   wait queue instead of spinning.
//! - **Direct handoff**: `unlock` with waiters passes ownership straight to
//!   the longest waiter; `held` never drops to false in between, so no
//!   third thread can barge in.
//! - **FIFO**: waiters acquire in arrival order.
//! - **No owner tracking**: any thread may unlock. Unlocking a free mutex
//!   is fatal.
//!
//! # Usage
//!
//! ```rust,ignore
//! let m = Mutex::new();
//!
//! m.lock();
//! // critical section
//! m.unlock();
//!
//! // Or scoped
//! {
//!     let _guard = m.guard();
//!     // critical section
//! }
//! ```

use core::cell::Cell;

use crate::debug::{log_fatal, log_trace, log_warn};
use crate::err::SchedError;
use crate::preempt::CriticalSection;
use crate::thread::BlockReason;

use super::WaitQueue;

/// ============================================================================
/// Mutex
/// ============================================================================

/// Blocking lock for green threads of one runtime
///
/// Neither `Send` nor `Sync`: a mutex belongs to the carrier whose threads
/// use it, and is shared between green threads by reference.
#[derive(Debug, Default)]
pub struct Mutex {
    /// Whether some thread owns the lock
    held: Cell<bool>,

    /// Threads blocked in `lock`
    waiters: WaitQueue,
}

impl Mutex {
    /// Create an unlocked mutex
    pub const fn new() -> Self {
        Self {
            held: Cell::new(false),
            waiters: WaitQueue::new(),
        }
    }

    /// Acquire the lock, blocking while another thread holds it
    pub fn lock(&self) {
        let cs = CriticalSection::enter();
        self.lock_in(&cs);
    }

    /// Release the lock, handing it to the longest waiter if there is one
    ///
    /// Releasing a mutex that is not held is fatal.
    pub fn unlock(&self) {
        let cs = CriticalSection::enter();
        self.unlock_in(&cs);
    }

    /// Acquire the lock only if it is free
    pub fn try_lock(&self) -> bool {
        let _cs = CriticalSection::enter();
        if self.held.get() {
            return false;
        }
        self.held.set(true);
        true
    }

    /// Acquire the lock and release it when the guard drops
    pub fn guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard { mutex: self }
    }

    /// Check if the lock is held
    pub fn is_locked(&self) -> bool {
        self.held.get()
    }

    /// Number of threads blocked on the lock
    pub fn waiters(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn lock_in(&self, cs: &CriticalSection) {
        if !self.held.get() {
            self.held.set(true);
            return;
        }

        self.waiters.block_current(cs, BlockReason::Lock);

        // Ownership was handed over by `unlock_in`.
        debug_assert!(self.held.get());
    }

    pub(crate) fn unlock_in(&self, cs: &CriticalSection) {
        if !self.held.get() {
            log_fatal(&SchedError::UnmatchedUnlock);
        }

        if self.waiters.is_empty() {
            self.held.set(false);
            return;
        }

        if let Some(next) = self.waiters.wake_one(cs) {
            log_trace!("Mutex handed off to thread {}", next);
        }
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        if !self.waiters.is_empty() {
            log_warn!(
                "Mutex dropped with {} blocked thread(s); they will never wake",
                self.waiters.len()
            );
        }
    }
}

/// ============================================================================
/// Mutex Guard
/// ============================================================================

/// Scoped ownership of a [`Mutex`]
#[must_use = "the mutex is released when the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl MutexGuard<'_> {
    /// The mutex this guard holds
    pub fn mutex(&self) -> &Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

// ============================================================================
// Tests
// ============================================================================
