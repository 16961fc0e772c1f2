// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! greenrt - Preemptive Green Threads
//!
//! A user-space threading runtime that multiplexes many green threads onto
//! one carrier OS thread, with FIFO scheduling, timer-driven preemption, and
//! blocking mutex and condition variable primitives.
//!
//! # Design
//!
//! - **One carrier**: only one green thread executes at a time. Each OS
//!   thread that calls [`init_runtime`] gets its own independent runtime.
//! - **FIFO ready queue**: creation, yield, preemption and every wakeup
//!   append to the back; dispatch pops the front.
//! - **Preemption**: a per-carrier CPU-time timer forces a dispatch cycle
//!   every period. Scheduler state is only touched with the timer's signal
//!   masked.
//! - **Fail fast**: protocol violations (starvation, double join, unlock of
//!   a free mutex) abort the process with a diagnostic.
//!
//! # Usage
//!
//! ```rust,no_run
//! use greenrt::{create, init_runtime, join, shutdown_runtime, Mutex, RuntimeConfig};
//!
//! struct Shared {
//!     lock: Mutex,
//!     total: core::cell::Cell<usize>,
//! }
//!
//! fn add(arg: usize) -> usize {
//!     let shared = unsafe { &*(arg as *const Shared) };
//!     for _ in 0..1000 {
//!         let _guard = shared.lock.guard();
//!         shared.total.set(shared.total.get() + 1);
//!     }
//!     0
//! }
//!
//! init_runtime(RuntimeConfig::from_env().unwrap()).unwrap();
//!
//! let shared = Shared { lock: Mutex::new(), total: core::cell::Cell::new(0) };
//! let arg = &shared as *const Shared as usize;
//! let a = create(add, arg);
//! let b = create(add, arg);
//! join(a);
//! join(b);
//! assert_eq!(shared.total.get(), 2000);
//!
//! shutdown_runtime().unwrap();
//! ```
//!
//! # Host requirements
//!
//! Linux with glibc: contexts use `ucontext`, the timer uses
//! `timer_create` with `SIGEV_THREAD_ID`. The preemption signal is
//! `SIGVTALRM`; programs using this runtime must leave it alone.
//!
//! Preemption can interrupt a green thread inside the allocator, and the
//! runtime allocates in `create` and `join`. Programs with preemptive
//! runtimes should install [`heap::PreemptSafe`] as the global allocator.
//! Other non-reentrant host code (stdio) can be wrapped in
//! [`without_preemption`].

#[cfg(not(target_os = "linux"))]
compile_error!("greenrt requires Linux (ucontext and SIGEV_THREAD_ID timers)");

// Host facilities
mod arch;

// Diagnostics
mod debug;
pub mod err;

// Runtime
pub mod config;
pub mod heap;
mod preempt;
pub mod sched;
pub mod sync;
pub mod thread;
mod timer;

pub use config::RuntimeConfig;
pub use err::{Result, SchedError};
pub use heap::PreemptSafe;
pub use preempt::without_preemption;
pub use sched::{init_runtime, is_initialized, main_thread, shutdown_runtime, stats, yield_now, SchedulerStats};
pub use sync::{Condvar, Mutex, MutexGuard};
pub use thread::{create, current, is_terminated, join, ThreadEntry, ThreadId};
