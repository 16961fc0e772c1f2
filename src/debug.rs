// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Runtime Logging and Diagnostics
//!
//! This module provides the logging macros used throughout the runtime and
//! the fatal-error path.
//!
//! # Features
//!
//! - **Log levels**: Trace, Debug, Info, Warning, Error (forwarded to the
//!   [`log`] facade when the `logging` feature is enabled)
//! - **Zero cost when disabled**: without `logging` the macros only
//!   type-check their arguments
//! - **Fatal path**: unrecoverable scheduler errors are logged, written to
//!   stderr and abort the process
//!
//! # Usage
//!
//! ```rust,ignore
//! log_info!("Runtime initialized on carrier {}", tid);
//! log_trace!("Dispatch: {} -> {}", from, to);
//!
//! // Never returns
//! log_fatal(&SchedError::SchedulerStarved);
//! ```
//!
//! Every log site in the runtime runs with the preemption signal masked.
//! The signal handler itself never logs.

use std::io::Write;

use crate::err::SchedError;

/// Log a trace message
macro_rules! log_trace {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        ::log::trace!($($arg)*);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Log a debug message
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        ::log::debug!($($arg)*);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Log an info message
macro_rules! log_info {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        ::log::info!($($arg)*);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Log a warning message
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        ::log::warn!($($arg)*);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)*);
    }};
}

/// Log an error message
macro_rules! log_error {
    ($($arg:tt)*) => {{
        #[cfg(feature = "logging")]
        ::log::error!($($arg)*);
        #[cfg(not(feature = "logging"))]
        let _ = format_args!($($arg)*);
    }};
}

pub(crate) use {log_debug, log_info, log_trace, log_warn};

/// Log a fatal scheduler error and abort
///
/// Protocol violations leave the run queues in a state no caller can
/// repair, so the process stops immediately rather than unwinding through
/// foreign stacks.
#[cold]
#[inline(never)]
pub(crate) fn log_fatal(err: &SchedError) -> ! {
    log_error!("fatal: {}", err);

    // Written directly so the message survives without an installed logger.
    let _ = writeln!(std::io::stderr(), "greenrt: fatal: {err}");

    std::process::abort()
}
