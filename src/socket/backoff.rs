//! Linear retry backoff.
//!
//! The delay starts at `floor`, grows by `step` per consecutive failure and
//! saturates at `cap`. Any successful open resets it to `floor`.
//!
//! With the default policy the retry delays are
//! 5.0s, 7.5s, 10.0s, 12.5s, 15.0s, 17.5s, 20.0s, 20.0s, ...

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Initial and post-success delay.
pub const DEFAULT_FLOOR: Duration = Duration::from_millis(5000);

/// Increase per consecutive failure.
pub const DEFAULT_STEP: Duration = Duration::from_millis(2500);

/// Maximum delay.
pub const DEFAULT_CAP: Duration = Duration::from_millis(20000);

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Bounds and step of the retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Initial and post-success delay.
    pub floor: Duration,
    /// Increase per consecutive failure.
    pub step: Duration,
    /// Maximum delay.
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FLOOR, DEFAULT_STEP, DEFAULT_CAP)
    }
}

impl BackoffPolicy {
    /// Creates a policy.
    #[inline]
    #[must_use]
    pub const fn new(floor: Duration, step: Duration, cap: Duration) -> Self {
        Self { floor, step, cap }
    }

    /// Checks that the policy describes a non-empty, growing range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `floor` or `step` is zero, or `floor > cap`.
    pub fn validate(&self) -> Result<()> {
        if self.floor.is_zero() {
            return Err(Error::config("Backoff floor must be greater than zero"));
        }

        if self.step.is_zero() {
            return Err(Error::config("Backoff step must be greater than zero"));
        }

        if self.floor > self.cap {
            return Err(Error::config(format!(
                "Backoff floor ({}ms) exceeds cap ({}ms)",
                self.floor.as_millis(),
                self.cap.as_millis()
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Backoff
// ============================================================================

/// Current retry delay, always within `[floor, cap]`.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
}

impl Backoff {
    /// Starts at the policy floor.
    #[inline]
    pub(crate) const fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            current: policy.floor,
        }
    }

    /// Returns the current delay.
    #[inline]
    pub(crate) const fn current(&self) -> Duration {
        self.current
    }

    /// Records a failure, returning the new delay.
    pub(crate) fn advance(&mut self) -> Duration {
        self.current = self.current.saturating_add(self.policy.step).min(self.policy.cap);
        self.current
    }

    /// Records a successful open.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.current = self.policy.floor;
    }
}

// ============================================================================
// Tests
// ============================================================================
