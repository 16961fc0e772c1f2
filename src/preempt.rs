// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Preemption Control
//!
//! The preemption timer interrupts whatever green thread is running and
//! switches to the next ready one. Code that touches the ready queue or any
//! wait queue must therefore run with the timer's signal masked on the
//! carrier thread. [`CriticalSection`] is the scoped guard that does this.
//!
//! # Design
//!
//! - Entering blocks the preemption signal and remembers whether it was
//!   already blocked; dropping restores the previous state. The restore runs
//!   on every exit path, including early returns and unwinding.
//! - Holding a `&CriticalSection` is the proof the scheduler internals ask
//!   for, so queue access without masking does not compile.
//! - The signal mask is part of every saved execution context: a thread
//!   that switches away inside a critical section resumes inside it.
//!
//! # Usage
//!
//! ```rust,ignore
//! let cs = CriticalSection::enter();
//! with_runtime(&cs, |rt| rt.make_ready(tid));
//! // signal unmasked again when `cs` drops
//! ```

use core::marker::PhantomData;
use core::mem::MaybeUninit;

use crate::timer::PREEMPT_SIGNAL;

/// ============================================================================
/// Signal Mask Helpers
/// ============================================================================

/// Signal set containing only the preemption signal
fn preempt_set() -> libc::sigset_t {
    let mut set = MaybeUninit::<libc::sigset_t>::uninit();

    // SAFETY: sigemptyset initializes the whole set before sigaddset reads it.
    unsafe {
        libc::sigemptyset(set.as_mut_ptr());
        libc::sigaddset(set.as_mut_ptr(), PREEMPT_SIGNAL);
        set.assume_init()
    }
}

/// Apply `how` to the preemption signal, returning whether it was blocked
fn change_mask(how: libc::c_int) -> bool {
    let set = preempt_set();
    let mut old = MaybeUninit::<libc::sigset_t>::uninit();

    // SAFETY: both sets are valid for the duration of the call; pthread_sigmask
    // only fails for an invalid `how`.
    unsafe {
        let rc = libc::pthread_sigmask(how, &set, old.as_mut_ptr());
        debug_assert_eq!(rc, 0, "pthread_sigmask failed");
        libc::sigismember(old.as_ptr(), PREEMPT_SIGNAL) == 1
    }
}

/// Check if the preemption signal is currently masked on this thread
pub(crate) fn is_masked() -> bool {
    let mut current = MaybeUninit::<libc::sigset_t>::uninit();

    // SAFETY: a null new set only queries the mask.
    unsafe {
        libc::pthread_sigmask(libc::SIG_BLOCK, core::ptr::null(), current.as_mut_ptr());
        libc::sigismember(current.as_ptr(), PREEMPT_SIGNAL) == 1
    }
}

/// ============================================================================
/// Critical Section
/// ============================================================================

/// Scoped guard masking the preemption signal
///
/// Not `Send`: the mask belongs to the carrier thread that entered it.
#[must_use = "the critical section ends when the guard is dropped"]
pub(crate) struct CriticalSection {
    /// Unmask on drop
    restore: bool,

    _not_send: PhantomData<*const ()>,
}

impl CriticalSection {
    /// Mask the preemption signal until the guard is dropped
    pub(crate) fn enter() -> Self {
        let was_masked = change_mask(libc::SIG_BLOCK);
        Self {
            restore: !was_masked,
            _not_send: PhantomData,
        }
    }

    /// Token for code running inside the preemption handler
    ///
    /// # Safety
    ///
    /// Only valid while the kernel has the preemption signal masked for
    /// handler delivery. Dropping the token leaves the mask untouched;
    /// returning from the handler restores it.
    pub(crate) unsafe fn in_handler() -> Self {
        Self {
            restore: false,
            _not_send: PhantomData,
        }
    }

    /// Take ownership of a mask that is already in effect
    ///
    /// Used by freshly started threads, which begin with the signal masked
    /// because their context was captured inside a critical section.
    ///
    /// # Safety
    ///
    /// The preemption signal must currently be masked and no other guard
    /// may be responsible for unmasking it.
    pub(crate) unsafe fn adopt() -> Self {
        debug_assert!(is_masked());
        Self {
            restore: true,
            _not_send: PhantomData,
        }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if self.restore {
            change_mask(libc::SIG_UNBLOCK);
        }
    }
}

/// Run `f` with preemption masked
///
/// Green threads on a preemptive runtime can be suspended at any
/// instruction. Work that must not interleave with other green threads on
/// the same carrier (calls into non-reentrant host code such as the
/// allocator or stdio) can be wrapped in this function. Blocking operations
/// called from `f` still suspend the caller; it resumes with preemption
/// masked.
pub fn without_preemption<R>(f: impl FnOnce() -> R) -> R {
    let _cs = CriticalSection::enter();
    f()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_masks_and_restores() {
        assert!(!is_masked());
        {
            let _cs = CriticalSection::enter();
            assert!(is_masked());
        }
        assert!(!is_masked());
    }

    #[test]
    fn test_nested_guard_keeps_outer_mask() {
        let outer = CriticalSection::enter();
        {
            let _inner = CriticalSection::enter();
        }
        assert!(is_masked());
        drop(outer);
        assert!(!is_masked());
    }

    #[test]
    fn test_restored_on_early_return() {
        fn bail(early: bool) -> Option<()> {
            let _cs = CriticalSection::enter();
            if early {
                return None;
            }
            Some(())
        }

        assert_eq!(bail(true), None);
        assert!(!is_masked());
        assert_eq!(bail(false), Some(()));
        assert!(!is_masked());
    }

    #[test]
    fn test_restored_on_unwind() {
        let result = std::panic::catch_unwind(|| {
            let _cs = CriticalSection::enter();
            panic!("inside critical section");
        });
        assert!(result.is_err());
        assert!(!is_masked());
    }

    #[test]
    fn test_without_preemption_returns_value() {
        let value = without_preemption(|| {
            assert!(is_masked());
            42
        });
        assert_eq!(value, 42);
        assert!(!is_masked());
    }
}
