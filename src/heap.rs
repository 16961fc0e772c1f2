// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Preemption-Safe Heap
//!
//! The host allocator takes a non-recursive lock. A green thread preempted
//! while holding it leaves the lock taken, and the next allocation on the
//! same carrier (by another green thread, or by the runtime itself in
//! `create` and `join`) blocks the carrier forever.
//!
//! [`PreemptSafe`] wraps a [`GlobalAlloc`] and masks preemption around every
//! call, so no tick can land inside the allocator. Programs that run
//! preemptive runtimes should install it as their global allocator.
//!
//! # Usage
//!
//! ```rust
//! use std::alloc::System;
//! use greenrt::heap::PreemptSafe;
//!
//! #[global_allocator]
//! static GLOBAL: PreemptSafe<System> = PreemptSafe::new(System);
//!
//! fn main() {
//!     let _shared = vec![0u8; 64];
//! }
//! ```

use std::alloc::{GlobalAlloc, Layout, System};

use crate::preempt::CriticalSection;

/// Allocator wrapper that masks preemption for the duration of each call
#[derive(Debug, Default, Clone, Copy)]
pub struct PreemptSafe<A = System> {
    inner: A,
}

impl<A> PreemptSafe<A> {
    /// Wrap `inner`
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

// SAFETY: every method forwards unchanged to `inner`; the critical section
// only changes the signal mask and never allocates.
unsafe impl<A: GlobalAlloc> GlobalAlloc for PreemptSafe<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _cs = CriticalSection::enter();
        self.inner.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let _cs = CriticalSection::enter();
        self.inner.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _cs = CriticalSection::enter();
        self.inner.dealloc(ptr, layout)
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let _cs = CriticalSection::enter();
        self.inner.realloc(ptr, layout, new_size)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preempt::is_masked;

    /// Records whether the signal was masked when it was called
    struct Probe;

    thread_local! {
        static SAW_MASK: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
    }

    unsafe impl GlobalAlloc for Probe {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            SAW_MASK.with(|saw| saw.set(is_masked()));
            System.alloc(layout)
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            SAW_MASK.with(|saw| saw.set(is_masked()));
            System.dealloc(ptr, layout)
        }
    }

    #[test]
    fn test_calls_run_masked() {
        let heap = PreemptSafe::new(Probe);
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            assert!(!ptr.is_null());
            assert!(SAW_MASK.with(core::cell::Cell::get));
            assert!(!is_masked());

            SAW_MASK.with(|saw| saw.set(false));
            heap.dealloc(ptr, layout);
            assert!(SAW_MASK.with(core::cell::Cell::get));
        }
        assert!(!is_masked());
    }

    #[test]
    fn test_outer_mask_survives() {
        let heap = PreemptSafe::new(System);
        let layout = Layout::from_size_align(128, 16).unwrap();

        let _cs = CriticalSection::enter();
        unsafe {
            let ptr = heap.alloc_zeroed(layout);
            assert!(!ptr.is_null());
            let ptr = heap.realloc(ptr, layout, 4096);
            assert!(!ptr.is_null());
            heap.dealloc(ptr, Layout::from_size_align(4096, 16).unwrap());
        }
        assert!(is_masked());
    }
}
