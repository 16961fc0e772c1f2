// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Primitives
//!
//! Blocking primitives for green threads sharing one carrier:
//! - Mutex: FIFO lock with direct handoff
//! - Condvar: wake-one condition variable
//! - WaitQueue: intrusive FIFO of blocked threads, used by both

pub mod condvar;
pub mod mutex;
pub(crate) mod wait_queue;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
pub(crate) use wait_queue::{ThreadQueue, WaitQueue};
