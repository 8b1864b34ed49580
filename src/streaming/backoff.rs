//! Reconnect delay schedule
//!
//! Two strategies are supported:
//!
//! | Strategy   | Delay after failure N (1-based)          | Cap                |
//! |------------|------------------------------------------|--------------------|
//! | `doubling` | `initial * 2^(N-1)`                      | `max_ms` if set    |
//! | `additive` | `initial + step * (N-1)`                 | `max_ms` or 20 s   |
//!
//! Delays never decrease within an outage and start over after
//! [`Backoff::reset`].

use crate::config::{BackoffConfig, DEFAULT_ADDITIVE_CAP_MS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Double the delay after each failure
    #[default]
    Doubling,
    /// Add a fixed step after each failure, up to a cap
    Additive,
}

/// Iterative backoff state for one outage
#[derive(Debug, Clone)]
pub struct Backoff {
    strategy: BackoffStrategy,
    initial: Duration,
    step: Duration,
    max: Option<Duration>,
    /// Delay to hand out on the next failure
    current: Duration,
    /// Failures since the last reset
    failures: u32,
}

impl Backoff {
    /// Build a schedule from configuration
    pub fn from_config(config: &BackoffConfig) -> Self {
        let max = match (config.strategy, config.max_ms) {
            (_, Some(ms)) => Some(Duration::from_millis(ms)),
            (BackoffStrategy::Additive, None) => {
                Some(Duration::from_millis(DEFAULT_ADDITIVE_CAP_MS))
            }
            (BackoffStrategy::Doubling, None) => None,
        };
        Self::new(
            config.strategy,
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.step_ms),
            max,
        )
    }

    /// Create a schedule directly
    pub fn new(
        strategy: BackoffStrategy,
        initial: Duration,
        step: Duration,
        max: Option<Duration>,
    ) -> Self {
        let initial = match max {
            Some(max) => initial.min(max),
            None => initial,
        };
        Self {
            strategy,
            initial,
            step,
            max,
            current: initial,
            failures: 0,
        }
    }

    /// Record a failed attempt and return how long to wait before the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.failures = self.failures.saturating_add(1);

        let grown = match self.strategy {
            BackoffStrategy::Doubling => self.current.saturating_mul(2),
            BackoffStrategy::Additive => self.current.saturating_add(self.step),
        };
        self.current = match self.max {
            Some(max) => grown.min(max),
            None => grown,
        };

        delay
    }

    /// Delay the next failure would produce, without recording one
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Failures recorded since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }
}
