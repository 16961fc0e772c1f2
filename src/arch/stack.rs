// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Green Thread Stacks
//!
//! This module manages stack allocation and guard pages for green threads.
//!
//! # Design
//!
//! - Each green thread has a dedicated, anonymous private mapping
//! - A guard page below the stack turns overflow into a fault
//! - The usable size is rounded up to whole pages
//! - The mapping is released when the stack is dropped, which only happens
//!   when a terminated thread is reclaimed by its joiner
//!
//! # Stack Layout
//!
//! ```text
//! +------------------+ <- top (initial SP, page aligned)
//! |                  |
//! |   Stack Data     |
//! |     (grows       |
//! |     downward)    |
//! |                  |
//! +------------------+ <- bottom
//! |   Guard Page     | <- PROT_NONE, faults on access
//! +------------------+ <- base
//! ```

use core::ffi::c_void;
use core::ptr::{self, NonNull};

use crate::err::{Result, SchedError};

/// Number of guard pages
pub const GUARD_PAGES: usize = 1;

/// Fallback page size if the host does not report one
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Host page size
pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

/// A mapped green thread stack with a guard page
#[derive(Debug)]
pub(crate) struct Stack {
    /// Start of the mapping (guard page)
    base: NonNull<u8>,

    /// Total mapping length, guard included
    mapped: usize,

    /// Usable stack size in bytes
    size: usize,
}

impl Stack {
    /// Map a new stack with at least `size` usable bytes
    pub(crate) fn new(size: usize) -> Result<Self> {
        let page = page_size();
        let size = size.div_ceil(page) * page;
        let guard = GUARD_PAGES * page;
        let mapped = size + guard;

        // SAFETY: anonymous private mapping; no existing memory is touched.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(SchedError::StackAllocation { size });
        }

        // SAFETY: the first `guard` bytes belong to the mapping just created.
        if unsafe { libc::mprotect(raw, guard, libc::PROT_NONE) } != 0 {
            // SAFETY: unmapping exactly what was mapped above.
            unsafe { libc::munmap(raw, mapped) };
            return Err(SchedError::StackAllocation { size });
        }

        let base = NonNull::new(raw.cast::<u8>()).ok_or(SchedError::StackAllocation { size })?;

        Ok(Self { base, mapped, size })
    }

    /// Lowest usable address (just above the guard page)
    pub(crate) fn bottom(&self) -> *mut u8 {
        // SAFETY: the guard region is strictly inside the mapping.
        unsafe { self.base.as_ptr().add(self.mapped - self.size) }
    }

    /// One past the highest usable address (initial stack pointer)
    pub(crate) fn top(&self) -> *mut u8 {
        // SAFETY: one-past-the-end of the mapping.
        unsafe { self.base.as_ptr().add(self.mapped) }
    }

    /// Usable stack size in bytes
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Check if an address is within the usable stack
    pub(crate) fn contains(&self, addr: usize) -> bool {
        addr >= self.bottom() as usize && addr < self.top() as usize
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        // SAFETY: unmapping the region created in `new`; no context runs on
        // a stack once its owner has been reclaimed.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast::<c_void>(), self.mapped) };
        debug_assert_eq!(rc, 0, "munmap of green stack failed");
    }
}

// ============================================================================
// Tests
// ============================================================================
