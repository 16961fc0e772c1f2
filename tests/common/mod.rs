// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Shared helpers for the integration tests
//!
//! Every `#[test]` runs on its own harness thread, which becomes the carrier
//! of its own runtime.

#![allow(dead_code)]

use std::alloc::System;
use std::process::{Command, Output};
use std::time::Duration;

use greenrt::{init_runtime, PreemptSafe, RuntimeConfig};

#[global_allocator]
static GLOBAL: PreemptSafe<System> = PreemptSafe::new(System);

/// Set in a re-executed test binary that must hit a fatal error
pub const CHILD_ENV: &str = "GREENRT_FATAL_CHILD";

/// Route runtime logs through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Attach a runtime to the calling test thread
pub fn start(preemptive: bool) {
    let period = preemptive.then(|| Duration::from_micros(100));
    start_with_period(period);
}

/// Attach a runtime ticking every `period` (`None` = cooperative)
pub fn start_with_period(period: Option<Duration>) {
    init_logging();
    init_runtime(RuntimeConfig::new().preempt_period(period)).unwrap();
}

/// Pass a reference through a thread argument
pub fn arg<T>(value: &T) -> usize {
    value as *const T as usize
}

/// Recover a reference passed with [`arg`]
///
/// # Safety
///
/// `arg` must come from [`arg`] on a value that outlives every use.
pub unsafe fn from_arg<'a, T>(arg: usize) -> &'a T {
    &*(arg as *const T)
}

/// Check if this process is a re-executed fatal-path child
pub fn is_child() -> bool {
    std::env::var_os(CHILD_ENV).is_some()
}

/// Re-run this test binary filtered to the single test `name`
pub fn run_child(name: &str) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args([name, "--exact", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, name)
        .output()
        .unwrap()
}

/// Assert the child died through the fatal path with `message`
pub fn assert_fatal(output: &Output, message: &str) {
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success(), "child exited cleanly: {stderr}");
    assert!(
        stderr.contains("greenrt: fatal:") && stderr.contains(message),
        "unexpected child stderr: {stderr}"
    );
}
