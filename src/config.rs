// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Runtime Configuration
//!
//! Settings applied when a runtime is attached to a carrier thread.
//!
//! # Environment
//!
//! [`RuntimeConfig::from_env`] overlays the defaults with:
//!
//! - `GREENRT_STACK_SIZE`: default green thread stack size in bytes
//! - `GREENRT_PREEMPT_US`: preemption period in microseconds (`0` disables
//!   preemption)
//!
//! # Usage
//!
//! ```rust
//! use std::time::Duration;
//! use greenrt::RuntimeConfig;
//!
//! let config = RuntimeConfig::new()
//!     .stack_size(128 * 1024)
//!     .preempt_period(Some(Duration::from_micros(250)));
//! ```

use std::time::Duration;

use crate::err::{Result, SchedError};

/// ============================================================================
/// Configuration Limits
/// ============================================================================

/// Default green thread stack size (64KB)
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Minimum green thread stack size
///
/// The preemption handler runs on whichever green stack was interrupted,
/// so every stack needs room for a signal frame on top of its own use.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Maximum green thread stack size
pub const MAX_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Default preemption period
pub const DEFAULT_PREEMPT_PERIOD: Duration = Duration::from_micros(100);

/// Minimum preemption period
pub const MIN_PREEMPT_PERIOD: Duration = Duration::from_micros(10);

/// Maximum preemption period
pub const MAX_PREEMPT_PERIOD: Duration = Duration::from_millis(100);

/// Environment variable overriding the stack size
pub const ENV_STACK_SIZE: &str = "GREENRT_STACK_SIZE";

/// Environment variable overriding the preemption period
pub const ENV_PREEMPT_US: &str = "GREENRT_PREEMPT_US";

/// ============================================================================
/// Runtime Configuration
/// ============================================================================

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for threads that do not override it
    stack_size: usize,

    /// Preemption period (`None` = cooperative scheduling only)
    preempt_period: Option<Duration>,
}

impl RuntimeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            preempt_period: Some(DEFAULT_PREEMPT_PERIOD),
        }
    }

    /// Create a cooperative configuration (no preemption timer)
    pub fn cooperative() -> Self {
        Self::new().preempt_period(None)
    }

    /// Create a configuration from the defaults and the environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Set the default stack size, clamped to the supported range
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = clamp_stack_size(size);
        self
    }

    /// Set the preemption period, clamped to the supported range
    pub fn preempt_period(mut self, period: Option<Duration>) -> Self {
        self.preempt_period = period.map(|p| p.clamp(MIN_PREEMPT_PERIOD, MAX_PREEMPT_PERIOD));
        self
    }

    /// Get the default stack size
    pub fn default_stack_size(&self) -> usize {
        self.stack_size
    }

    /// Get the preemption period
    pub fn period(&self) -> Option<Duration> {
        self.preempt_period
    }

    /// Check if the preemption timer is enabled
    pub fn is_preemptive(&self) -> bool {
        self.preempt_period.is_some()
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self> {
        let mut config = Self::new();

        if let Some(value) = lookup(ENV_STACK_SIZE) {
            let size = parse_number(ENV_STACK_SIZE, &value)?;
            config = config.stack_size(size as usize);
        }

        if let Some(value) = lookup(ENV_PREEMPT_US) {
            let micros = parse_number(ENV_PREEMPT_US, &value)?;
            let period = (micros != 0).then(|| Duration::from_micros(micros));
            config = config.preempt_period(period);
        }

        Ok(config)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Clamp a requested stack size to the supported range
pub(crate) fn clamp_stack_size(size: usize) -> usize {
    size.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE)
}

fn parse_number(key: &'static str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| SchedError::InvalidConfig {
        key,
        value: value.to_owned(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'static str, &'a str)]) -> impl Fn(&'static str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_owned())
        }
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_stack_size(), DEFAULT_STACK_SIZE);
        assert_eq!(config.period(), Some(DEFAULT_PREEMPT_PERIOD));
        assert!(config.is_preemptive());
        assert!(!RuntimeConfig::cooperative().is_preemptive());
    }

    #[test]
    fn test_stack_size_clamping() {
        assert_eq!(RuntimeConfig::new().stack_size(0).default_stack_size(), MIN_STACK_SIZE);
        assert_eq!(
            RuntimeConfig::new().stack_size(usize::MAX).default_stack_size(),
            MAX_STACK_SIZE
        );
    }

    #[test]
    fn test_period_clamping() {
        let fast = RuntimeConfig::new().preempt_period(Some(Duration::from_nanos(1)));
        assert_eq!(fast.period(), Some(MIN_PREEMPT_PERIOD));

        let slow = RuntimeConfig::new().preempt_period(Some(Duration::from_secs(5)));
        assert_eq!(slow.period(), Some(MAX_PREEMPT_PERIOD));
    }

    #[test]
    fn test_env_overrides() {
        let pairs = [(ENV_STACK_SIZE, "131072"), (ENV_PREEMPT_US, " 250 ")];
        let config = RuntimeConfig::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.default_stack_size(), 128 * 1024);
        assert_eq!(config.period(), Some(Duration::from_micros(250)));
    }

    #[test]
    fn test_env_zero_period_disables_preemption() {
        let pairs = [(ENV_PREEMPT_US, "0")];
        let config = RuntimeConfig::from_lookup(lookup(&pairs)).unwrap();
        assert!(!config.is_preemptive());
    }

    #[test]
    fn test_env_rejects_garbage() {
        let pairs = [(ENV_STACK_SIZE, "big")];
        let err = RuntimeConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, SchedError::InvalidConfig { key: ENV_STACK_SIZE, .. }));
    }
}
