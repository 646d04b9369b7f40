//! Watchdog supervision of guarded steps.
//!
//! A guarded step is an asynchronous request with a deadline. The supervisor
//! owns the scenario's single [`PendingTimer`] slot:
//!
//! - `arm` fills the slot (filling an occupied slot is a sequencing defect)
//! - `cancel` / `release` empty it when the step completes in time
//! - `expire` empties it when the loop reports the timer fired
//!
//! # Races
//!
//! Cancelling a timer that already fired or was already cancelled is a
//! no-op. `expire` only reports a timeout for the handle currently in the
//! slot, so a timer event that was in flight when its step completed is
//! dropped instead of timing the scenario out.

use std::time::{Duration, Instant};

use crate::{
    capability::{TimerHandle, TimerHost},
    error::HarnessError,
    step::Step,
};

/// An armed deadline bound to one in-flight step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    /// Handle from the event loop
    pub handle: TimerHandle,
    /// Step that must complete before the deadline
    pub step: Step,
    /// Absolute deadline
    pub deadline: Instant,
    /// Relative timeout the timer was armed with
    pub timeout: Duration,
}

/// Single-flight watchdog for one scenario.
#[derive(Debug, Default)]
pub struct TimerSupervisor {
    slot: Option<PendingTimer>,
    armed: usize,
    cancelled: usize,
    expired: usize,
}

impl TimerSupervisor {
    /// Create a supervisor with an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a deadline for `step`.
    ///
    /// # Errors
    ///
    /// Returns `SequencingDefect` if a timer is already armed.
    pub fn arm<H: TimerHost>(
        &mut self,
        host: &mut H,
        step: Step,
        timeout: Duration,
    ) -> Result<TimerHandle, HarnessError> {
        if let Some(pending) = &self.slot {
            return Err(HarnessError::defect(
                step,
                format!(
                    "cannot arm watchdog for {}: watchdog for {} is still armed",
                    step, pending.step
                ),
            ));
        }

        let deadline = host.now() + timeout;
        let handle = host.add_timer(timeout);
        tracing::debug!(%step, handle = handle.0, ?timeout, "armed watchdog");

        self.slot = Some(PendingTimer { handle, step, deadline, timeout });
        self.armed += 1;
        Ok(handle)
    }

    /// Cancel `handle` if it is the armed timer.
    ///
    /// Returns `true` if a timer was actually cancelled. Cancelling a
    /// fired, already-cancelled or foreign handle does nothing.
    pub fn cancel<H: TimerHost>(&mut self, host: &mut H, handle: TimerHandle) -> bool {
        match self.slot {
            Some(pending) if pending.handle == handle => {
                self.slot = None;
                self.cancelled += 1;
                let removed = host.remove_timer(handle);
                tracing::debug!(step = %pending.step, handle = handle.0, removed, "cancelled watchdog");
                true
            },
            _ => {
                tracing::debug!(handle = handle.0, "cancel of inactive watchdog ignored");
                false
            },
        }
    }

    /// Cancel whatever is armed ("end guarded step").
    pub fn release<H: TimerHost>(&mut self, host: &mut H) -> Option<PendingTimer> {
        let pending = self.slot?;
        self.cancel(host, pending.handle);
        Some(pending)
    }

    /// The loop delivered `handle`. Returns the timed-out step if `handle`
    /// was the armed watchdog.
    pub fn expire(&mut self, handle: TimerHandle) -> Option<PendingTimer> {
        match self.slot {
            Some(pending) if pending.handle == handle => {
                self.slot = None;
                self.expired += 1;
                tracing::warn!(step = %pending.step, timeout = ?pending.timeout, "watchdog expired");
                Some(pending)
            },
            _ => None,
        }
    }

    /// The armed timer, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingTimer> {
        self.slot.as_ref()
    }

    /// Whether a timer is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.slot.is_some()
    }

    /// Timers armed so far.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.armed
    }

    /// Timers cancelled before firing.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.cancelled
    }

    /// Timers that fired while armed.
    #[must_use]
    pub fn expired_count(&self) -> usize {
        self.expired
    }
}
