// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Runtime Error Codes
//!
//! This module provides the error type used throughout the runtime.
//!
//! Errors fall into two groups:
//!
//! - **Run-time conditions** (timer setup failing, bad configuration,
//!   shutting down with live threads) are returned as `Err` from
//!   [`init_runtime`](crate::init_runtime),
//!   [`shutdown_runtime`](crate::shutdown_runtime) and
//!   [`RuntimeConfig::from_env`](crate::RuntimeConfig::from_env).
//! - **Protocol violations** (starvation, double join, unmatched unlock, ...)
//!   are never returned. They go through the fatal path and abort.

use crate::thread::ThreadId;

/// Result type used by the runtime
pub type Result<T> = core::result::Result<T, SchedError>;

/// Runtime error kinds
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// Dispatch found the ready queue empty: every thread is blocked
    #[error("scheduler starved: every green thread is blocked and the ready queue is empty")]
    SchedulerStarved,

    /// A second joiner tried to wait on the same thread
    #[error("thread {0} already has a joiner")]
    DoubleJoin(ThreadId),

    /// Unlock (or condition wait) on a mutex that is not held
    #[error("unlock of a mutex that is not held")]
    UnmatchedUnlock,

    /// The handle refers to a thread that was already reclaimed
    #[error("thread {0} has already been reclaimed")]
    StaleThread(ThreadId),

    /// A thread tried to join itself
    #[error("thread {0} cannot join itself")]
    JoinSelf(ThreadId),

    /// No runtime is attached to the calling carrier thread
    #[error("no green-thread runtime is initialized on this carrier thread")]
    NotInitialized,

    /// `init_runtime` was called twice on one carrier thread
    #[error("a green-thread runtime is already initialized on this carrier thread")]
    AlreadyInitialized,

    /// Shutdown requested while created threads are still unjoined
    #[error("{0} green thread(s) have not been joined")]
    ThreadsAlive(usize),

    /// Shutdown requested from a green thread other than main
    #[error("the runtime can only be shut down from the main green thread")]
    NotMainThread,

    /// Stack mapping failed while creating a thread
    #[error("failed to allocate a {size}-byte green thread stack")]
    StackAllocation {
        /// Requested usable stack size in bytes
        size: usize,
    },

    /// Installing or arming the preemption timer failed
    #[error("preemption timer setup failed: {0}")]
    Timer(#[source] std::io::Error),

    /// A configuration value could not be parsed
    #[error("invalid value {value:?} for {key}")]
    InvalidConfig {
        /// Environment variable name
        key: &'static str,
        /// Offending value
        value: String,
    },

    /// A thread's entry function panicked
    #[error("entry function of thread {0} panicked")]
    EntryPanicked(ThreadId),
}

// ============================================================================
// Tests
// ============================================================================
