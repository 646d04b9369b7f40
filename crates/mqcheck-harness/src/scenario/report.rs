//! Result of one scenario run.

use std::{fmt, time::Duration};

use bytes::Bytes;
use mqcheck_core::{recorder::Artifact, step::Step, Outcome};
use serde::{Serialize, Serializer};

/// Everything a caller needs to judge and debug a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    /// Scenario name
    pub scenario: String,
    /// Queue the scenario used
    pub queue: String,
    /// Terminal outcome
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Steps reached, `start` first
    pub steps: Vec<Step>,
    /// Outcome records in observation order
    pub records: Vec<Artifact>,
    /// Bodies confirmed as published
    #[serde(serialize_with = "bodies_as_text")]
    pub published: Vec<Bytes>,
    /// Watchdogs armed
    pub watchdogs_armed: usize,
    /// Watchdogs that fired
    pub expirations: usize,
    /// Times the event loop was told to stop
    pub stop_calls: usize,
    /// Loop time from start to stop
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn bodies_as_text<S: Serializer>(bodies: &[Bytes], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(bodies.iter().map(|body| String::from_utf8_lossy(body)))
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

impl Report {
    /// Process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// Whether the scenario passed.
    pub fn passed(&self) -> bool {
        self.outcome.is_passed()
    }

    /// Retrieved bodies as text, in retrieval order.
    pub fn bodies(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(Artifact::body)
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.scenario, self.queue, self.outcome)?;
        if let Some(last) = self.steps.last() {
            write!(f, " (last step {}, {:?})", last, self.elapsed)?;
        }
        Ok(())
    }
}
