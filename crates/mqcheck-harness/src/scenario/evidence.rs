//! What oracles get to see.
//!
//! Oracles run after the connection has closed and see a read-only view of
//! the run: the outcome records in observation order, the bodies that were
//! published, and the steps the sequencer passed through.

use bytes::Bytes;
use mqcheck_core::{recorder::Artifact, step::Step, Sequencer};

/// Read-only snapshot of a finished run.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    records: &'a [Artifact],
    published: &'a [Bytes],
    visited: &'a [Step],
    plan: &'a [Step],
}

impl<'a> Evidence<'a> {
    /// Snapshot the sequencer's state.
    pub fn from_sequencer(sequencer: &'a Sequencer) -> Self {
        Self {
            records: sequencer.recorder().snapshot(),
            published: sequencer.published(),
            visited: sequencer.visited(),
            plan: sequencer.plan(),
        }
    }

    /// Outcome records, oldest first.
    pub fn records(&self) -> &'a [Artifact] {
        self.records
    }

    /// Retrieved bodies, in retrieval order.
    pub fn bodies(&self) -> Vec<&'a Bytes> {
        self.records.iter().filter_map(Artifact::body).collect()
    }

    /// Bodies confirmed as published.
    pub fn published(&self) -> &'a [Bytes] {
        self.published
    }

    /// Steps reached, `start` first.
    pub fn visited(&self) -> &'a [Step] {
        self.visited
    }

    /// Whether `step` was reached.
    pub fn reached(&self, step: Step) -> bool {
        self.visited.contains(&step)
    }

    /// Whether every planned step was reached.
    pub fn plan_completed(&self) -> bool {
        self.visited == self.plan
    }

    /// Value of the flag `name`, if it was recorded.
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.records.iter().find_map(|artifact| match artifact {
            Artifact::Flag { name: flag, value } if *flag == name => Some(*value),
            _ => None,
        })
    }
}
