//! Terminal scenario outcomes and their process exit codes.

use std::{fmt, time::Duration};

use serde::{Serialize, Serializer};

use crate::{protocol::ProtocolFault, step::Step};

/// Exit code for a passed scenario.
pub const EXIT_PASSED: i32 = 0;
/// Exit code for a failed assertion.
pub const EXIT_FAILED_ASSERTION: i32 = 1;
/// Exit code for a timed-out step. 2 is left to argument parsing errors.
pub const EXIT_TIMED_OUT: i32 = 3;
/// Exit code for a protocol error.
pub const EXIT_PROTOCOL_ERROR: i32 = 4;
/// Exit code for a harness defect or a run that never reached a verdict.
pub const EXIT_HARNESS_FAILURE: i32 = 5;

/// How a scenario ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// Still running
    Pending,
    /// All steps completed and all assertions held
    Passed,
    /// Observed artifacts violated the scenario's invariants
    FailedAssertion {
        /// Human-readable reason
        reason: String,
    },
    /// A guarded step missed its deadline
    TimedOut {
        /// Step that was pending
        step: Step,
        /// Deadline that elapsed
        #[serde(rename = "after_ms", serialize_with = "as_millis")]
        after: Duration,
    },
    /// The connection reported a fault
    ProtocolError {
        /// The fault, including its reply code
        fault: ProtocolFault,
    },
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl Outcome {
    /// Anything but `Pending`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the scenario passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Process exit code for CLI and test-runner callers.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => EXIT_PASSED,
            Self::FailedAssertion { .. } => EXIT_FAILED_ASSERTION,
            Self::TimedOut { .. } => EXIT_TIMED_OUT,
            Self::ProtocolError { .. } => EXIT_PROTOCOL_ERROR,
            Self::Pending => EXIT_HARNESS_FAILURE,
        }
    }

    /// Short kebab-case label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::FailedAssertion { .. } => "failed-assertion",
            Self::TimedOut { .. } => "timed-out",
            Self::ProtocolError { .. } => "protocol-error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending | Self::Passed => f.write_str(self.label()),
            Self::FailedAssertion { reason } => write!(f, "failed-assertion: {}", reason),
            Self::TimedOut { step, after } => {
                write!(f, "timed-out: step {} did not complete within {:?}", step, after)
            },
            Self::ProtocolError { fault } => {
                write!(f, "protocol-error: {} (code {})", fault, fault.code.value())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ReplyCode;

    #[test]
    fn exit_codes_are_distinct() {
        let outcomes = [
            Outcome::Passed,
            Outcome::FailedAssertion { reason: "x".to_string() },
            Outcome::TimedOut { step: Step::Connected, after: Duration::from_secs(2) },
            Outcome::ProtocolError {
                fault: ProtocolFault::channel(ReplyCode::NOT_FOUND, "no exchange"),
            },
            Outcome::Pending,
        ];
        let mut codes: Vec<i32> = outcomes.iter().map(Outcome::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), outcomes.len());
        assert_eq!(Outcome::Passed.exit_code(), 0);
        assert!(!codes.contains(&2));
    }

    #[test]
    fn protocol_error_display_shows_code() {
        let outcome = Outcome::ProtocolError {
            fault: ProtocolFault::channel(ReplyCode::NOT_FOUND, "no exchange 'x'"),
        };
        assert!(outcome.to_string().contains("code 404"));
        assert!(outcome.is_terminal());
        assert!(!Outcome::Pending.is_terminal());
    }
}
