// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Preemption Timer
//!
//! This module drives involuntary preemption. Each preemptive runtime arms
//! a periodic timer that delivers [`PREEMPT_SIGNAL`] to its carrier thread;
//! the handler runs one dispatch cycle, exactly as if the interrupted green
//! thread had called [`yield_now`](crate::yield_now).
//!
//! # Design
//!
//! - **Per-carrier**: the timer measures the carrier's CPU time
//!   (`CLOCK_THREAD_CPUTIME_ID`) and targets the carrier by TID
//!   (`SIGEV_THREAD_ID`), so several runtimes can share a process.
//! - **One handler**: `sigaction` is process-wide and installed once.
//!   Deliveries on threads without a runtime are ignored.
//! - **Masking**: the kernel blocks the signal while the handler runs, and
//!   every queue access outside the handler happens inside a
//!   [`CriticalSection`], so the handler never observes a half-updated
//!   queue.

use core::ffi::c_int;
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicU64, Ordering};
use std::io;
use std::time::Duration;

use spin::Once;

use crate::err::{Result, SchedError};
use crate::preempt::CriticalSection;

/// Signal used for preemption ticks
pub(crate) const PREEMPT_SIGNAL: c_int = libc::SIGVTALRM;

/// Outcome of the one-time handler installation (errno on failure)
static HANDLER: Once<core::result::Result<(), i32>> = Once::new();

/// Ticks delivered to any carrier since process start
static TICKS: AtomicU64 = AtomicU64::new(0);

/// ============================================================================
/// Signal Handler
/// ============================================================================

/// Install the process-wide preemption handler (idempotent)
pub(crate) fn install_handler() -> Result<()> {
    let installed = HANDLER.call_once(|| {
        // SAFETY: the action is fully initialized before use, and `on_tick`
        // has the signature sigaction expects without SA_SIGINFO.
        unsafe {
            let mut action: libc::sigaction = mem::zeroed();
            action.sa_sigaction = on_tick as extern "C" fn(c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);

            if libc::sigaction(PREEMPT_SIGNAL, &action, ptr::null_mut()) == 0 {
                Ok(())
            } else {
                Err(last_errno())
            }
        }
    });

    match installed {
        Ok(()) => Ok(()),
        Err(errno) => Err(SchedError::Timer(io::Error::from_raw_os_error(*errno))),
    }
}

/// Preemption tick
///
/// Must stay free of allocation and logging: it can interrupt any code the
/// running green thread executes outside a critical section.
extern "C" fn on_tick(_signal: c_int) {
    TICKS.fetch_add(1, Ordering::Relaxed);

    // The switch below runs other green threads before this one resumes;
    // the interrupted code must find its own errno afterwards.
    // SAFETY: __errno_location returns this thread's errno slot.
    let errno = unsafe { *libc::__errno_location() };

    // SAFETY: the kernel masks PREEMPT_SIGNAL while this handler runs.
    let cs = unsafe { CriticalSection::in_handler() };
    crate::sched::preempt(&cs);

    // SAFETY: as above.
    unsafe { *libc::__errno_location() = errno };
}

/// Number of preemption ticks delivered process-wide
#[cfg(test)]
pub(crate) fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL)
}

/// ============================================================================
/// Preemption Timer
/// ============================================================================

/// Periodic per-carrier timer; disarmed and deleted on drop
#[derive(Debug)]
pub(crate) struct PreemptTimer {
    /// Kernel timer handle
    id: libc::timer_t,

    /// Tick period
    period: Duration,
}

impl PreemptTimer {
    /// Arm a periodic timer targeting the calling thread
    pub(crate) fn arm(period: Duration) -> Result<Self> {
        install_handler()?;

        // SAFETY: sigevent is plain data; the fields read by timer_create
        // for SIGEV_THREAD_ID are set below.
        let mut event: libc::sigevent = unsafe { mem::zeroed() };
        event.sigev_notify = libc::SIGEV_THREAD_ID;
        event.sigev_signo = PREEMPT_SIGNAL;
        event.sigev_notify_thread_id = carrier_tid();

        let mut id: libc::timer_t = ptr::null_mut();

        // SAFETY: `event` and `id` are valid for the duration of the call.
        if unsafe { libc::timer_create(libc::CLOCK_THREAD_CPUTIME_ID, &mut event, &mut id) } != 0 {
            return Err(SchedError::Timer(io::Error::last_os_error()));
        }

        // From here on, Drop deletes the kernel timer on any error path.
        let timer = Self { id, period };

        let interval = libc::timespec {
            tv_sec: period.as_secs() as libc::time_t,
            tv_nsec: period.subsec_nanos() as libc::c_long,
        };
        let spec = libc::itimerspec {
            it_interval: interval,
            it_value: interval,
        };

        // SAFETY: `timer.id` is a live timer created above.
        if unsafe { libc::timer_settime(timer.id, 0, &spec, ptr::null_mut()) } != 0 {
            return Err(SchedError::Timer(io::Error::last_os_error()));
        }

        Ok(timer)
    }

    /// Get the tick period
    pub(crate) fn period(&self) -> Duration {
        self.period
    }
}

impl Drop for PreemptTimer {
    fn drop(&mut self) {
        // SAFETY: `id` was created by timer_create and is deleted only here.
        unsafe { libc::timer_delete(self.id) };
    }
}

/// Kernel thread ID of the calling thread
fn carrier_tid() -> libc::pid_t {
    // SAFETY: gettid has no preconditions and cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_install_is_idempotent() {
        install_handler().unwrap();
        install_handler().unwrap();
    }

    #[test]
    fn test_ticks_delivered_without_runtime() {
        let timer = PreemptTimer::arm(Duration::from_micros(100)).unwrap();
        assert_eq!(timer.period(), Duration::from_micros(100));

        // Burn carrier CPU time until a tick lands; deliveries on a thread
        // with no runtime attached are counted and otherwise ignored.
        let start = ticks();
        let deadline = Instant::now() + Duration::from_secs(5);
        while ticks() == start && Instant::now() < deadline {
            std::hint::black_box((0..1_000u64).sum::<u64>());
        }

        drop(timer);
        assert!(ticks() > start, "no preemption tick within 5s");
    }
}
