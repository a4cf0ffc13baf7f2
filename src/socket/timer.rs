//! Owned single-shot timers.
//!
//! A [`TimerSlot`] holds at most one pending deadline. Arming replaces the
//! previous deadline, cancelling drops it. Because the slot is polled from
//! the dispatcher loop itself, a cancelled deadline can never be delivered.

// ============================================================================
// Imports
// ============================================================================

use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use tracing::trace;

// ============================================================================
// TimerSlot
// ============================================================================

/// A single-shot timer owned by the dispatcher.
#[derive(Debug)]
pub(crate) struct TimerSlot {
    /// Name used in logs.
    label: &'static str,
    /// Pending deadline, if armed.
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TimerSlot {
    /// Creates an unarmed slot.
    #[inline]
    pub(crate) const fn new(label: &'static str) -> Self {
        Self { label, sleep: None }
    }

    /// Arms the slot to fire after `delay`, replacing any pending deadline.
    pub(crate) fn arm(&mut self, delay: Duration) {
        if self.sleep.is_some() {
            trace!(timer = self.label, "Replacing armed timer");
        }

        trace!(timer = self.label, delay_ms = delay.as_millis() as u64, "Timer armed");
        self.sleep = Some(Box::pin(sleep(delay)));
    }

    /// Disarms the slot. Returns `true` if a deadline was pending.
    pub(crate) fn cancel(&mut self) -> bool {
        let armed = self.sleep.take().is_some();
        if armed {
            trace!(timer = self.label, "Timer cancelled");
        }
        armed
    }

    /// Returns `true` if a deadline is pending.
    #[inline]
    pub(crate) const fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    /// Returns the pending deadline.
    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Option<tokio::time::Instant> {
        self.sleep.as_ref().map(|s| s.deadline())
    }

    /// Completes when the armed deadline passes, disarming the slot.
    ///
    /// Never completes while unarmed. Dropping the future before it
    /// completes leaves the slot untouched.
    pub(crate) async fn fired(&mut self) {
        let Some(deadline) = self.sleep.as_mut() else {
            return pending().await;
        };

        deadline.as_mut().await;
        self.sleep = None;
        trace!(timer = self.label, "Timer fired");
    }
}

// ============================================================================
// Tests
// ============================================================================
