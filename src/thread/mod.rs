// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Management
//!
//! This module provides green thread descriptors, the thread table that owns
//! them, and the thread lifecycle API (create, join).
//!
//! # Design
//!
//! - Descriptors live in an arena of slots owned by the runtime
//! - A [`ThreadId`] is a slot index plus a generation, so a handle to a
//!   reclaimed thread is detected instead of aliasing the slot's next tenant
//! - Each descriptor carries the intrusive `link` used by whichever queue
//!   currently holds it, and a `queued` flag that enforces membership in at
//!   most one queue
//! - Each thread except main owns a guarded stack and an execution context,
//!   both released when its joiner reclaims it
//!
//! # Thread States
//!
//! ```text
//! Ready -> Running -> Blocked -> Ready -> Running -> Terminated -> (reclaimed)
//!            |  ^
//!            v  |
//!           Ready  (yield / preemption)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use greenrt::{init_runtime, join, shutdown_runtime, thread, RuntimeConfig};
//!
//! fn square(arg: usize) -> usize {
//!     arg * arg
//! }
//!
//! init_runtime(RuntimeConfig::new()).unwrap();
//!
//! let worker = thread::Builder::new().name("square").spawn(square, 12);
//! assert_eq!(join(worker), 144);
//!
//! shutdown_runtime().unwrap();
//! ```

use core::fmt;

use crate::arch::{Context, Stack};
use crate::config::clamp_stack_size;
use crate::debug::{log_debug, log_fatal};
use crate::err::{Result, SchedError};
use crate::preempt::CriticalSection;
use crate::sched::{self, with_runtime};

/// Entry function of a green thread
///
/// Takes and returns one pointer-sized value. Pointers can be passed through
/// it with `as usize` casts.
pub type ThreadEntry = fn(usize) -> usize;

/// ============================================================================
/// Thread ID
/// ============================================================================

/// Handle to a green thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId {
    /// Slot in the thread table
    index: u32,

    /// Reuse counter of the slot
    generation: u32,
}

impl ThreadId {
    /// The carrier's original flow of control
    pub const MAIN: ThreadId = ThreadId {
        index: 0,
        generation: 0,
    };

    /// Slot index
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Slot generation
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

/// ============================================================================
/// Thread State
/// ============================================================================

/// Reason for a thread being blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting for a contended mutex
    Lock,

    /// Waiting on a condition variable
    Condvar,

    /// Waiting for another thread to terminate
    Join,
}

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// In the ready queue
    Ready,

    /// Currently executing on the carrier
    Running,

    /// In a wait queue, or registered as a joiner
    Blocked(BlockReason),

    /// Entry function returned; waiting to be reclaimed
    Terminated,
}

/// ============================================================================
/// Thread Descriptor
/// ============================================================================

/// Green thread descriptor
pub(crate) struct GreenThread {
    /// Thread name (for diagnostics)
    pub(crate) name: Option<&'static str>,

    /// Saved execution state
    pub(crate) context: Context,

    /// Stack owned by this thread (`None` for main)
    stack: Option<Stack>,

    /// Entry function and its argument
    pub(crate) entry: ThreadEntry,
    pub(crate) arg: usize,

    /// Next thread in the queue holding this one
    pub(crate) link: Option<ThreadId>,

    /// Whether some queue currently holds this thread
    pub(crate) queued: bool,

    /// Thread waiting in `join` for this one
    pub(crate) joiner: Option<ThreadId>,

    /// Value returned by the entry function
    pub(crate) result: Option<usize>,

    /// Lifecycle state
    pub(crate) state: ThreadState,
}

impl GreenThread {
    /// Descriptor for the carrier's original flow of control
    pub(crate) fn carrier() -> Self {
        Self {
            name: Some("main"),
            context: Context::capture(),
            stack: None,
            entry: carrier_entry,
            arg: 0,
            link: None,
            queued: false,
            joiner: None,
            result: None,
            state: ThreadState::Running,
        }
    }

    /// Descriptor for a new thread that starts at the scheduler trampoline
    ///
    /// Must be called inside a critical section: the context inherits the
    /// current signal mask, and the trampoline expects to start masked.
    pub(crate) fn new(
        name: Option<&'static str>,
        entry: ThreadEntry,
        arg: usize,
        stack_size: usize,
    ) -> Result<Self> {
        let stack = Stack::new(stack_size)?;
        let context = Context::new(sched::trampoline, &stack);

        Ok(Self {
            name,
            context,
            stack: Some(stack),
            entry,
            arg,
            link: None,
            queued: false,
            joiner: None,
            result: None,
            state: ThreadState::Ready,
        })
    }

    /// Check if the entry function has returned
    pub(crate) fn is_terminated(&self) -> bool {
        self.state == ThreadState::Terminated
    }

    /// Check if an address lies on this thread's stack
    pub(crate) fn runs_on(&self, addr: usize) -> bool {
        self.stack.as_ref().is_some_and(|stack| stack.contains(addr))
    }

    /// Display name
    pub(crate) fn label(&self) -> &'static str {
        self.name.unwrap_or("<unnamed>")
    }
}

/// Placeholder entry of the main thread, which never starts at the trampoline
fn carrier_entry(_arg: usize) -> usize {
    0
}

/// ============================================================================
/// Thread Table
/// ============================================================================

/// Arena slot
struct Slot {
    generation: u32,
    thread: Option<GreenThread>,
}

/// Arena of green thread descriptors
pub(crate) struct ThreadTable {
    slots: Vec<Slot>,

    /// Indices of empty slots
    free: Vec<u32>,

    /// Number of occupied slots
    live: usize,
}

impl ThreadTable {
    /// Create an empty table
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store a descriptor and return its handle
    pub(crate) fn insert(&mut self, thread: GreenThread) -> ThreadId {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.thread = Some(thread);
            return ThreadId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            thread: Some(thread),
        });
        ThreadId {
            index,
            generation: 0,
        }
    }

    /// Look up a live descriptor
    pub(crate) fn get(&self, tid: ThreadId) -> Option<&GreenThread> {
        self.slots
            .get(tid.index())
            .filter(|slot| slot.generation == tid.generation)
            .and_then(|slot| slot.thread.as_ref())
    }

    /// Look up a live descriptor mutably
    pub(crate) fn get_mut(&mut self, tid: ThreadId) -> Option<&mut GreenThread> {
        self.slots
            .get_mut(tid.index())
            .filter(|slot| slot.generation == tid.generation)
            .and_then(|slot| slot.thread.as_mut())
    }

    /// Look up a descriptor that the scheduler knows to be live
    ///
    /// A miss means a queue or the running pointer references a reclaimed
    /// thread; the scheduler state is corrupt and the process stops.
    pub(crate) fn expect_mut(&mut self, tid: ThreadId) -> &mut GreenThread {
        match self.get_mut(tid) {
            Some(thread) => thread,
            None => log_fatal(&SchedError::StaleThread(tid)),
        }
    }

    /// Remove a descriptor, invalidating its handle
    pub(crate) fn remove(&mut self, tid: ThreadId) -> Option<GreenThread> {
        let slot = self
            .slots
            .get_mut(tid.index())
            .filter(|slot| slot.generation == tid.generation)?;
        let thread = slot.thread.take()?;

        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(tid.index);
        self.live -= 1;
        Some(thread)
    }

    /// Number of live descriptors (main included)
    pub(crate) fn len(&self) -> usize {
        self.live
    }
}

/// ============================================================================
/// Thread Builder
/// ============================================================================

/// Builder for creating threads with custom configuration
#[derive(Debug, Clone, Default)]
pub struct Builder {
    /// Thread name (optional)
    name: Option<&'static str>,

    /// Stack size override (runtime default if unset)
    stack_size: Option<usize>,
}

impl Builder {
    /// Create a new Builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name for the new thread
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Set the stack size for the new thread
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Create the thread and append it to the ready queue
    ///
    /// Returns immediately; the thread first runs when a later dispatch
    /// picks it. Stack allocation failure is fatal.
    pub fn spawn(self, entry: ThreadEntry, arg: usize) -> ThreadId {
        let cs = CriticalSection::enter();
        with_runtime(&cs, |rt| {
            let stack_size = self
                .stack_size
                .map(clamp_stack_size)
                .unwrap_or_else(|| rt.config().default_stack_size());

            let thread = match GreenThread::new(self.name, entry, arg, stack_size) {
                Ok(thread) => thread,
                Err(err) => log_fatal(&err),
            };

            let tid = rt.admit(thread);
            log_debug!(
                "Thread created: tid={} name={} stack={}",
                tid,
                self.name.unwrap_or("<unnamed>"),
                stack_size
            );
            tid
        })
    }
}

/// ============================================================================
/// Lifecycle API
/// ============================================================================

/// Create a green thread running `entry(arg)`
pub fn create(entry: ThreadEntry, arg: usize) -> ThreadId {
    Builder::new().spawn(entry, arg)
}

/// Wait for a thread to terminate, reclaim it, and return its result
///
/// Blocks the caller until `tid` has terminated. Each thread supports one
/// joiner; joining twice, joining oneself, or joining a reclaimed thread is
/// fatal.
pub fn join(tid: ThreadId) -> usize {
    let cs = CriticalSection::enter();

    if with_runtime(&cs, |rt| rt.register_joiner(tid)) {
        sched::switch_away(&cs);
    }

    with_runtime(&cs, |rt| rt.reclaim(tid))
}

/// Handle of the calling green thread
pub fn current() -> ThreadId {
    let cs = CriticalSection::enter();
    with_runtime(&cs, |rt| rt.running())
}

/// Lifecycle state of a thread, or `None` once it has been reclaimed
pub fn state(tid: ThreadId) -> Option<ThreadState> {
    let cs = CriticalSection::enter();
    with_runtime(&cs, |rt| rt.threads.get(tid).map(|thread| thread.state))
}

/// Check if a thread has terminated (reclaimed threads count as terminated)
pub fn is_terminated(tid: ThreadId) -> bool {
    let cs = CriticalSection::enter();
    with_runtime(&cs, |rt| rt.threads.get(tid).map_or(true, GreenThread::is_terminated))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_occupies_first_slot() {
        let mut table = ThreadTable::new();
        let main = table.insert(GreenThread::carrier());

        assert_eq!(main, ThreadId::MAIN);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(main).map(GreenThread::label), Some("main"));
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let mut table = ThreadTable::new();
        table.insert(GreenThread::carrier());
        let first = table.insert(GreenThread::carrier());

        assert!(table.remove(first).is_some());
        assert!(table.get(first).is_none());
        assert!(table.remove(first).is_none());

        let second = table.insert(GreenThread::carrier());
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(table.get(first).is_none());
        assert!(table.get(second).is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_new_thread_owns_stack() {
        let _cs = CriticalSection::enter();
        let thread = GreenThread::new(Some("worker"), carrier_entry, 7, 32 * 1024).unwrap();

        assert_eq!(thread.state, ThreadState::Ready);
        assert_eq!(thread.arg, 7);
        assert!(!thread.is_terminated());

        let local = 0u8;
        assert!(!thread.runs_on(&local as *const u8 as usize));
    }

    #[test]
    fn test_thread_id_display() {
        assert_eq!(ThreadId::MAIN.to_string(), "0.0");
    }

    #[test]
    fn test_builder_settings() {
        let builder = Builder::new().name("io").stack_size(1 << 20);
        assert_eq!(builder.name, Some("io"));
        assert_eq!(builder.stack_size, Some(1 << 20));
    }
}
