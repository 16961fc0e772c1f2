// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Wait Queue
//!
//! This module provides the FIFO thread queues shared by the scheduler's
//! ready queue and by every synchronization primitive.
//!
//! # Design
//!
//! - **Intrusive**: queues are linked through each descriptor's `link`
//!   field, so enqueueing never allocates (it runs in the preemption
//!   handler).
//! - **FIFO**: threads leave in the order they arrived.
//! - **Exclusive**: a thread sits in at most one queue at a time, enforced
//!   with the descriptor's `queued` flag.
//! - **Masked**: every [`WaitQueue`] operation demands a
//!   [`CriticalSection`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let cs = CriticalSection::enter();
//!
//! // Block the current thread until someone calls wake_one
//! wq.block_current(&cs, BlockReason::Lock);
//!
//! // Wake the longest waiter
//! wq.wake_one(&cs);
//! ```

use core::cell::Cell;
use core::marker::PhantomData;

use crate::preempt::CriticalSection;
use crate::sched::{self, with_runtime};
use crate::thread::{BlockReason, ThreadId, ThreadTable};

/// ============================================================================
/// Thread Queue
/// ============================================================================

/// FIFO of thread handles linked through the thread table
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ThreadQueue {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
    len: usize,
}

impl ThreadQueue {
    /// Create an empty queue
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of queued threads
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Check if the queue is empty
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append a thread at the tail
    pub(crate) fn push_back(&mut self, threads: &mut ThreadTable, tid: ThreadId) {
        let thread = threads.expect_mut(tid);
        assert!(!thread.queued, "thread {} is already queued", tid);
        thread.queued = true;
        thread.link = None;

        match self.tail {
            Some(tail) => threads.expect_mut(tail).link = Some(tid),
            None => self.head = Some(tid),
        }
        self.tail = Some(tid);
        self.len += 1;
    }

    /// Remove the thread at the head
    pub(crate) fn pop_front(&mut self, threads: &mut ThreadTable) -> Option<ThreadId> {
        let tid = self.head?;
        let thread = threads.expect_mut(tid);

        self.head = thread.link.take();
        thread.queued = false;
        if self.head.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(tid)
    }
}

/// ============================================================================
/// Wait Queue
/// ============================================================================

/// Queue of threads blocked on one synchronization object
///
/// Not `Send`: the queued handles belong to one carrier's runtime.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    queue: Cell<ThreadQueue>,
    _not_send: PhantomData<*const ()>,
}

impl WaitQueue {
    /// Create an empty wait queue
    pub(crate) const fn new() -> Self {
        Self {
            queue: Cell::new(ThreadQueue::new()),
            _not_send: PhantomData,
        }
    }

    /// Number of blocked threads
    pub(crate) fn len(&self) -> usize {
        self.queue.get().len()
    }

    /// Check if no thread is blocked here
    pub(crate) fn is_empty(&self) -> bool {
        self.queue.get().is_empty()
    }

    /// Mark the running thread blocked and append it, without switching
    ///
    /// The caller must dispatch with [`sched::switch_away`] before leaving
    /// the critical section.
    pub(crate) fn park_current(&self, cs: &CriticalSection, reason: BlockReason) -> ThreadId {
        with_runtime(cs, |rt| {
            let me = rt.block_running(reason);
            let mut queue = self.queue.get();
            queue.push_back(&mut rt.threads, me);
            self.queue.set(queue);
            me
        })
    }

    /// Block the running thread here until a later [`wake_one`](Self::wake_one)
    pub(crate) fn block_current(&self, cs: &CriticalSection, reason: BlockReason) {
        self.park_current(cs, reason);
        sched::switch_away(cs);
    }

    /// Move the longest waiter to the ready queue
    ///
    /// Returns the woken thread, or `None` if nobody was waiting.
    pub(crate) fn wake_one(&self, cs: &CriticalSection) -> Option<ThreadId> {
        with_runtime(cs, |rt| {
            let mut queue = self.queue.get();
            let tid = queue.pop_front(&mut rt.threads);
            self.queue.set(queue);

            if let Some(tid) = tid {
                rt.make_ready(tid);
            }
            tid
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::GreenThread;

    fn table_with(count: usize) -> (ThreadTable, Vec<ThreadId>) {
        let mut table = ThreadTable::new();
        let tids = (0..count)
            .map(|_| table.insert(GreenThread::carrier()))
            .collect();
        (table, tids)
    }

    #[test]
    fn test_queue_is_fifo() {
        let (mut table, tids) = table_with(3);
        let mut queue = ThreadQueue::new();

        for &tid in &tids {
            queue.push_back(&mut table, tid);
        }
        assert_eq!(queue.len(), 3);

        for &tid in &tids {
            assert_eq!(queue.pop_front(&mut table), Some(tid));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.pop_front(&mut table), None);
    }

    #[test]
    fn test_queue_reusable_after_drain() {
        let (mut table, tids) = table_with(2);
        let mut queue = ThreadQueue::new();

        queue.push_back(&mut table, tids[0]);
        assert_eq!(queue.pop_front(&mut table), Some(tids[0]));

        queue.push_back(&mut table, tids[1]);
        queue.push_back(&mut table, tids[0]);
        assert_eq!(queue.pop_front(&mut table), Some(tids[1]));
        assert_eq!(queue.pop_front(&mut table), Some(tids[0]));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    #[should_panic(expected = "already queued")]
    fn test_thread_in_two_queues_panics() {
        let (mut table, tids) = table_with(1);
        let mut first = ThreadQueue::new();
        let mut second = ThreadQueue::new();

        first.push_back(&mut table, tids[0]);
        second.push_back(&mut table, tids[0]);
    }

    #[test]
    fn test_wait_queue_starts_empty() {
        let wq = WaitQueue::new();
        assert!(wq.is_empty());
        assert_eq!(wq.len(), 0);
    }
}
