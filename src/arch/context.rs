// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Execution Contexts
//!
//! An execution context is the saved register state, stack pointer and
//! signal mask of a suspended computation. Contexts are backed by glibc's
//! `ucontext_t`.
//!
//! # Design
//!
//! - The `ucontext_t` lives in its own heap allocation. glibc stores a
//!   pointer to the floating point save area *inside* the structure, so a
//!   context must never move after it has been captured.
//! - [`switch`] saves into `from` and restores `to`; it returns only when a
//!   later switch resumes `from`.
//! - [`resume`] restores `to` without saving anything; used by threads that
//!   have terminated and must never run again.

use core::ffi::c_void;
use core::{mem, ptr};

use super::Stack;

/// Function a fresh context starts executing
pub(crate) type ContextEntry = extern "C" fn();

/// Saved execution state of one green thread
pub(crate) struct Context {
    uc: Box<libc::ucontext_t>,
}

impl Context {
    /// Capture the caller's current execution state
    ///
    /// Used for the carrier's original flow of control (the main green
    /// thread), whose stack is not owned by the runtime.
    pub(crate) fn capture() -> Self {
        // SAFETY: ucontext_t is plain data; all-zero is a valid bit pattern.
        let mut uc: Box<libc::ucontext_t> = Box::new(unsafe { mem::zeroed() });

        // SAFETY: `uc` points to writable, pinned storage. getcontext only
        // fails for invalid pointers.
        let rc = unsafe { libc::getcontext(&mut *uc) };
        debug_assert_eq!(rc, 0, "getcontext failed");

        Self { uc }
    }

    /// Create a context that begins executing `entry` on `stack`
    ///
    /// The context inherits the caller's current signal mask, so a context
    /// created inside a critical section starts with preemption masked.
    pub(crate) fn new(entry: ContextEntry, stack: &Stack) -> Self {
        let mut ctx = Self::capture();

        ctx.uc.uc_stack.ss_sp = stack.bottom().cast::<c_void>();
        ctx.uc.uc_stack.ss_size = stack.size();
        ctx.uc.uc_stack.ss_flags = 0;

        // Entry functions never return, so there is no successor context.
        ctx.uc.uc_link = ptr::null_mut();

        // SAFETY: the context was initialized by getcontext and its stack
        // fields describe a live mapping that outlives the context.
        unsafe { libc::makecontext(&mut *ctx.uc, entry, 0) };

        ctx
    }

    /// Raw pointer for [`switch`] / [`resume`]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::ucontext_t {
        &mut *self.uc
    }
}

/// Save the current state into `from` and resume `to`
///
/// # Safety
///
/// Both pointers must come from live [`Context`]s. `to` must hold a state
/// that is valid to resume (freshly created or previously saved), and its
/// stack must still be mapped. No reference into either context may be
/// alive across the call.
pub(crate) unsafe fn switch(from: *mut libc::ucontext_t, to: *const libc::ucontext_t) {
    let rc = libc::swapcontext(from, to);
    debug_assert_eq!(rc, 0, "swapcontext failed");
}

/// Resume `to` without saving the current state
///
/// # Safety
///
/// Same requirements as [`switch`] for `to`. The calling flow of control is
/// abandoned: nothing on the current stack is dropped.
pub(crate) unsafe fn resume(to: *const libc::ucontext_t) -> ! {
    libc::setcontext(to);

    // setcontext only returns on an invalid context.
    std::process::abort()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    thread_local! {
        static HITS: Cell<usize> = const { Cell::new(0) };
        static LINK: Cell<(*mut libc::ucontext_t, *mut libc::ucontext_t)> =
            const { Cell::new((ptr::null_mut(), ptr::null_mut())) };
    }

    extern "C" fn bounce() {
        loop {
            HITS.with(|h| h.set(h.get() + 1));
            let (me, back) = LINK.with(Cell::get);
            unsafe { switch(me, back) };
        }
    }

    #[test]
    fn test_switch_resumes_where_suspended() {
        let stack = Stack::new(crate::config::MIN_STACK_SIZE).unwrap();
        let mut main = Context::capture();
        let mut green = Context::new(bounce, &stack);

        LINK.with(|l| l.set((green.as_mut_ptr(), main.as_mut_ptr())));

        unsafe { switch(main.as_mut_ptr(), green.as_mut_ptr()) };
        assert_eq!(HITS.with(Cell::get), 1);

        // Second switch continues the loop rather than restarting `bounce`.
        unsafe { switch(main.as_mut_ptr(), green.as_mut_ptr()) };
        assert_eq!(HITS.with(Cell::get), 2);
    }

    #[test]
    fn test_context_does_not_move_with_owner() {
        let mut ctx = Context::capture();
        let before = ctx.as_mut_ptr();
        let mut moved = ctx;
        assert_eq!(before, moved.as_mut_ptr());
    }
}
