// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Green Thread Scheduler
//!
//! This module implements the runtime object and the dispatcher shared by
//! every yielding and blocking path.
//!
//! # Design
//!
//! - **One runtime per carrier**: all scheduler state (thread table, ready
//!   queue, running thread, timer) lives in one [`Runtime`] reached through
//!   a thread-local pointer. Only the carrier thread and its own preemption
//!   handler ever touch it.
//! - **FIFO**: the ready queue is strict first-in first-out.
//! - **Preemptive**: a timer tick requeues the running thread and
//!   dispatches, exactly like a voluntary yield.
//! - **Masked access**: [`with_runtime`] demands a [`CriticalSection`], so
//!   the handler can never observe a queue mid-update.
//!
//! # Dispatch Protocol
//!
//! 1. The caller decides where it goes: the ready queue (yield,
//!    preemption), a wait queue (contended lock, condition wait), or
//!    nowhere (join).
//! 2. The next thread is popped from the ready queue. An empty queue means
//!    every thread is blocked: fatal starvation.
//! 3. The running pointer moves to the popped thread.
//! 4. The carrier switches contexts. The caller resumes here only when a
//!    later dispatch picks it again.
//!
//! # Usage
//!
//! ```rust,no_run
//! use greenrt::{create, init_runtime, join, shutdown_runtime, yield_now, RuntimeConfig};
//!
//! fn worker(rounds: usize) -> usize {
//!     for _ in 0..rounds {
//!         yield_now();
//!     }
//!     rounds
//! }
//!
//! init_runtime(RuntimeConfig::cooperative()).unwrap();
//! let tid = create(worker, 3);
//! assert_eq!(join(tid), 3);
//! let stats = shutdown_runtime().unwrap();
//! assert_eq!(stats.live(), 0);
//! ```

use core::cell::Cell;
use core::panic::AssertUnwindSafe;
use core::ptr;
use std::panic;

use crate::arch::context;
use crate::config::RuntimeConfig;
use crate::debug::{log_debug, log_fatal, log_info, log_trace};
use crate::err::{Result, SchedError};
use crate::preempt::CriticalSection;
use crate::sync::ThreadQueue;
use crate::thread::{BlockReason, GreenThread, ThreadId, ThreadState, ThreadTable};
use crate::timer::PreemptTimer;

/// ============================================================================
/// Scheduler Statistics
/// ============================================================================

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Threads created (main excluded)
    pub created: u64,

    /// Threads reclaimed by a joiner
    pub reclaimed: u64,

    /// Context switches performed
    pub context_switches: u64,

    /// Voluntary yields
    pub yields: u64,

    /// Timer preemptions
    pub preemptions: u64,
}

impl SchedulerStats {
    /// Threads created but not yet reclaimed
    pub fn live(&self) -> u64 {
        self.created - self.reclaimed
    }
}

/// ============================================================================
/// Runtime
/// ============================================================================

/// Scheduler state of one carrier thread
pub(crate) struct Runtime {
    /// All live descriptors, main included
    pub(crate) threads: ThreadTable,

    /// Runnable threads in dispatch order
    ready: ThreadQueue,

    /// Thread currently executing
    running: ThreadId,

    /// Settings the runtime was created with
    config: RuntimeConfig,

    /// Preemption timer (disarmed on drop)
    timer: Option<PreemptTimer>,

    /// Statistics
    stats: SchedulerStats,
}

thread_local! {
    /// Runtime attached to this carrier thread
    static RUNTIME: Cell<*mut Runtime> = const { Cell::new(ptr::null_mut()) };
}

impl Runtime {
    /// Thread currently executing
    pub(crate) fn running(&self) -> ThreadId {
        self.running
    }

    /// Settings the runtime was created with
    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Append a thread to the back of the ready queue
    pub(crate) fn make_ready(&mut self, tid: ThreadId) {
        self.threads.expect_mut(tid).state = ThreadState::Ready;
        self.ready.push_back(&mut self.threads, tid);
    }

    /// Mark the running thread blocked (it is about to enter a wait queue)
    pub(crate) fn block_running(&mut self, reason: BlockReason) -> ThreadId {
        let me = self.running;
        self.threads.expect_mut(me).state = ThreadState::Blocked(reason);
        me
    }

    /// Register a freshly created thread and make it ready
    pub(crate) fn admit(&mut self, thread: GreenThread) -> ThreadId {
        let tid = self.threads.insert(thread);
        self.stats.created += 1;
        self.make_ready(tid);
        tid
    }

    /// Register the running thread as the joiner of `target`
    ///
    /// Returns whether the caller must block until `target` terminates.
    pub(crate) fn register_joiner(&mut self, target: ThreadId) -> bool {
        let me = self.running;
        if target == me {
            log_fatal(&SchedError::JoinSelf(me));
        }

        let thread = match self.threads.get_mut(target) {
            Some(thread) => thread,
            None => log_fatal(&SchedError::StaleThread(target)),
        };

        // Checked before termination: a woken joiner may not have reclaimed
        // its target yet.
        if thread.joiner.is_some_and(|joiner| joiner != me) {
            log_fatal(&SchedError::DoubleJoin(target));
        }

        if thread.is_terminated() {
            return false;
        }

        thread.joiner = Some(me);
        self.block_running(BlockReason::Join);
        log_trace!("Thread {} joining {}", me, target);
        true
    }

    /// Release a terminated thread and return its result
    pub(crate) fn reclaim(&mut self, target: ThreadId) -> usize {
        let thread = match self.threads.remove(target) {
            Some(thread) => thread,
            None => log_fatal(&SchedError::StaleThread(target)),
        };

        debug_assert!(thread.is_terminated(), "reclaiming a live thread");
        let marker = 0u8;
        debug_assert!(
            !thread.runs_on(&marker as *const u8 as usize),
            "reclaiming the stack in use"
        );

        self.stats.reclaimed += 1;
        log_debug!("Thread reclaimed: tid={} name={}", target, thread.label());

        // Dropping the descriptor unmaps its stack and frees its context.
        thread.result.unwrap_or(0)
    }

    /// Dispatch steps 2-3; returns the contexts to switch between
    ///
    /// `None` when the popped thread is the caller itself (it was the only
    /// runnable thread after re-queueing itself). Runs in the preemption
    /// handler too, so it must not log or allocate.
    fn pick_next(&mut self) -> Option<(*mut libc::ucontext_t, *mut libc::ucontext_t)> {
        let current = self.running;
        let next = self.pop_ready();

        self.threads.expect_mut(next).state = ThreadState::Running;
        if next == current {
            return None;
        }

        self.running = next;
        self.stats.context_switches += 1;

        let from = self.threads.expect_mut(current).context.as_mut_ptr();
        let to = self.threads.expect_mut(next).context.as_mut_ptr();
        Some((from, to))
    }

    /// Pop the next runnable thread; starvation is fatal
    fn pop_ready(&mut self) -> ThreadId {
        match self.ready.pop_front(&mut self.threads) {
            Some(tid) => tid,
            None => log_fatal(&SchedError::SchedulerStarved),
        }
    }
}

/// Run `f` on this carrier's runtime
///
/// Fatal if no runtime is attached. `f` must not call back into
/// `with_runtime`.
pub(crate) fn with_runtime<R>(_cs: &CriticalSection, f: impl FnOnce(&mut Runtime) -> R) -> R {
    let rt = RUNTIME.with(Cell::get);
    if rt.is_null() {
        log_fatal(&SchedError::NotInitialized);
    }

    // SAFETY: the pointer came from Box::into_raw in `init_runtime` and is
    // only reachable from this carrier. `_cs` masks the preemption handler,
    // the only other code that dereferences it, and calls never nest, so
    // this is the sole live reference.
    f(unsafe { &mut *rt })
}

/// ============================================================================
/// Runtime Lifecycle
/// ============================================================================

/// Attach a runtime to the calling thread
///
/// The caller becomes the main green thread. Arms the preemption timer when
/// the configuration asks for one.
pub fn init_runtime(config: RuntimeConfig) -> Result<()> {
    let cs = CriticalSection::enter();

    if is_initialized() {
        return Err(SchedError::AlreadyInitialized);
    }

    let mut threads = ThreadTable::new();
    let main = threads.insert(GreenThread::carrier());
    debug_assert_eq!(main, ThreadId::MAIN);

    let runtime = Box::new(Runtime {
        threads,
        ready: ThreadQueue::new(),
        running: main,
        config: config.clone(),
        timer: None,
        stats: SchedulerStats::default(),
    });
    RUNTIME.with(|slot| slot.set(Box::into_raw(runtime)));

    // Armed last: ticks stay pending until `cs` drops, by which time the
    // runtime is complete.
    if let Some(period) = config.period() {
        match PreemptTimer::arm(period) {
            Ok(timer) => with_runtime(&cs, |rt| rt.timer = Some(timer)),
            Err(err) => {
                drop(detach());
                return Err(err);
            }
        }
    }

    log_info!(
        "Runtime initialized: stack={} preempt={:?}",
        config.default_stack_size(),
        config.period()
    );
    Ok(())
}

/// Detach and free this carrier's runtime
///
/// Only the main green thread may shut down, and only once every created
/// thread has been joined. Returns the final statistics.
pub fn shutdown_runtime() -> Result<SchedulerStats> {
    let cs = CriticalSection::enter();

    if !is_initialized() {
        return Err(SchedError::NotInitialized);
    }

    with_runtime(&cs, |rt| {
        if rt.running != ThreadId::MAIN {
            return Err(SchedError::NotMainThread);
        }
        match rt.threads.len() - 1 {
            0 => Ok(()),
            alive => Err(SchedError::ThreadsAlive(alive)),
        }
    })?;

    let Some(runtime) = detach() else {
        return Err(SchedError::NotInitialized);
    };
    let stats = runtime.stats;

    if let Some(timer) = &runtime.timer {
        log_debug!("Disarming preemption timer: period={:?}", timer.period());
    }
    drop(runtime);

    log_info!(
        "Runtime shut down: created={} switches={} preemptions={}",
        stats.created,
        stats.context_switches,
        stats.preemptions
    );
    Ok(stats)
}

/// Check if a runtime is attached to the calling thread
pub fn is_initialized() -> bool {
    !RUNTIME.with(Cell::get).is_null()
}

/// Handle of the main green thread (the flow that called `init_runtime`)
pub fn main_thread() -> ThreadId {
    ThreadId::MAIN
}

/// Statistics of this carrier's runtime
pub fn stats() -> SchedulerStats {
    let cs = CriticalSection::enter();
    with_runtime(&cs, |rt| rt.stats)
}

/// Take the runtime pointer back out of the thread-local slot
fn detach() -> Option<Box<Runtime>> {
    let rt = RUNTIME.with(|slot| slot.replace(ptr::null_mut()));

    // SAFETY: non-null pointers in the slot always come from Box::into_raw,
    // and the slot was just cleared, so ownership is unique.
    (!rt.is_null()).then(|| unsafe { Box::from_raw(rt) })
}

/// ============================================================================
/// Dispatcher
/// ============================================================================

/// Dispatch steps 2-4, for a caller that already placed itself
pub(crate) fn switch_away(cs: &CriticalSection) {
    if let Some((from, to)) = with_runtime(cs, Runtime::pick_next) {
        // SAFETY: both contexts belong to live descriptors, and the
        // runtime borrow ended above.
        unsafe { context::switch(from, to) };
    }
}

/// Move the running thread to the back of the ready queue and dispatch
pub fn yield_now() {
    let cs = CriticalSection::enter();
    with_runtime(&cs, |rt| {
        let me = rt.running;
        rt.stats.yields += 1;
        rt.make_ready(me);
        log_trace!("Thread yielded: tid={}", me);
    });
    switch_away(&cs);
}

/// Timer tick: requeue the interrupted thread and dispatch
///
/// Called from the signal handler. Ticks on threads without a runtime are
/// ignored.
pub(crate) fn preempt(cs: &CriticalSection) {
    let attached = RUNTIME
        .try_with(|slot| !slot.get().is_null())
        .unwrap_or(false);
    if !attached {
        return;
    }

    let switch = with_runtime(cs, |rt| {
        let me = rt.running;
        rt.stats.preemptions += 1;
        rt.make_ready(me);
        rt.pick_next()
    });

    if let Some((from, to)) = switch {
        // SAFETY: as in `switch_away`.
        unsafe { context::switch(from, to) };
    }
}

/// Terminate the running thread and dispatch without returning
///
/// The thread's descriptor stays in the table as a zombie holding its
/// result until a joiner reclaims it.
fn exit_current(cs: &CriticalSection, result: usize) -> ! {
    let to = with_runtime(cs, |rt| {
        let me = rt.running;
        let thread = rt.threads.expect_mut(me);
        thread.result = Some(result);
        thread.state = ThreadState::Terminated;
        let joiner = thread.joiner;

        log_debug!(
            "Thread exited: tid={} name={} result={:#x}",
            me,
            thread.label(),
            result
        );

        if let Some(joiner) = joiner {
            rt.make_ready(joiner);
        }

        let next = rt.pop_ready();
        rt.threads.expect_mut(next).state = ThreadState::Running;
        rt.running = next;
        rt.stats.context_switches += 1;
        rt.threads.expect_mut(next).context.as_mut_ptr()
    });

    // SAFETY: the next context is live; this stack is abandoned and freed
    // later by the joiner.
    unsafe { context::resume(to) }
}

/// Entry point of every new green thread
///
/// Starts with preemption masked (the context was created inside a
/// critical section), runs the entry function with preemption enabled,
/// then terminates.
pub(crate) extern "C" fn trampoline() {
    // SAFETY: contexts created by GreenThread::new start masked.
    let start = unsafe { CriticalSection::adopt() };
    let (me, entry, arg) = with_runtime(&start, |rt| {
        let me = rt.running;
        let thread = rt.threads.expect_mut(me);
        log_trace!("Thread started: tid={} name={}", me, thread.label());
        (me, thread.entry, thread.arg)
    });
    drop(start);

    // Unwinding cannot cross into the context that started this thread.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(arg)));

    let cs = CriticalSection::enter();
    match outcome {
        Ok(result) => exit_current(&cs, result),
        Err(_) => log_fatal(&SchedError::EntryPanicked(me)),
    }
}

// ============================================================================
// Tests
// ============================================================================
