//! Error taxonomy for scenario runs.
//!
//! Four kinds, all terminal to the scenario (nothing is retried):
//!
//! - `AssertionFailure`: observed artifacts violate the scenario's invariants
//! - `Timeout`: a guarded step missed its deadline
//! - `Protocol`: the connection reported a channel/connection fault
//! - `SequencingDefect`: an event arrived for a step that is not pending.
//!   This is a harness bug and is surfaced as `Err`, never folded into an
//!   outcome.

use std::time::Duration;

use thiserror::Error;

use crate::{outcome::Outcome, protocol::ProtocolFault, step::Step};

/// Errors that end a scenario.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HarnessError {
    /// Observed artifacts violate the scenario's expected invariants
    #[error("assertion failed: {0}")]
    AssertionFailure(String),

    /// A guarded step did not complete within its deadline
    #[error("step {step} timed out after {after:?}")]
    Timeout {
        /// Step that was pending
        step: Step,
        /// Deadline that elapsed
        after: Duration,
    },

    /// The connection reported a fault
    #[error("protocol error: {0}")]
    Protocol(ProtocolFault),

    /// An event arrived that the current state cannot accept
    #[error("sequencing defect in state {state}: {detail}")]
    SequencingDefect {
        /// State the sequencer was in
        state: Step,
        /// What went wrong
        detail: String,
    },
}

impl HarnessError {
    /// Build a sequencing defect.
    pub fn defect(state: Step, detail: impl Into<String>) -> Self {
        Self::SequencingDefect { state, detail: detail.into() }
    }

    /// Returns true for harness bugs, which must fail fast.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::SequencingDefect { .. })
    }

    /// Terminal outcome this error maps to, or `None` for defects.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::AssertionFailure(reason) => {
                Some(Outcome::FailedAssertion { reason: reason.clone() })
            },
            Self::Timeout { step, after } => Some(Outcome::TimedOut { step: *step, after: *after }),
            Self::Protocol(fault) => Some(Outcome::ProtocolError { fault: fault.clone() }),
            Self::SequencingDefect { .. } => None,
        }
    }
}

impl From<ProtocolFault> for HarnessError {
    fn from(fault: ProtocolFault) -> Self {
        Self::Protocol(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReplyCode;

    #[test]
    fn only_defects_have_no_outcome() {
        let defect = HarnessError::defect(Step::Published, "unexpected Acked");
        assert!(defect.is_defect());
        assert_eq!(defect.outcome(), None);

        let timeout = HarnessError::Timeout { step: Step::GotFirst, after: Duration::from_secs(2) };
        assert!(!timeout.is_defect());
        assert_eq!(
            timeout.outcome(),
            Some(Outcome::TimedOut { step: Step::GotFirst, after: Duration::from_secs(2) })
        );
    }

    #[test]
    fn protocol_error_keeps_fault_code() {
        let err: HarnessError = ProtocolFault::channel(ReplyCode::NOT_FOUND, "no exchange").into();
        match err.outcome() {
            Some(Outcome::ProtocolError { fault }) => assert_eq!(fault.code, ReplyCode::NOT_FOUND),
            other => panic!("expected protocol error outcome, got {:?}", other),
        }
        assert!(err.to_string().contains("404"));
    }
}
