//! Named scenarios runnable from the CLI and tests.

use std::time::Duration;

use bytes::Bytes;
use mqcheck_core::{
    protocol::{ConnectionParams, ProtocolFault},
    sequencer::STEP_TIMER_FLAG,
    step::{Step, PUBLISH_ONLY, TIMER_ONLY},
    Outcome,
};

use crate::{
    blocking::BlockingConnection,
    scenario::{oracle, Report, RunnableScenario, Scenario},
};

/// Exchange the invalid-publish scenarios publish to.
pub const MISSING_EXCHANGE: &str = "undeclared-exchange";

/// Caller overrides applied to catalog scenarios.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Seed for generated bodies and adapter environments
    pub seed: u64,
    /// Body to publish instead of a generated one
    pub body: Option<String>,
}

impl Overrides {
    fn apply(&self, scenario: Scenario) -> Scenario {
        let scenario = scenario.with_seed(self.seed);
        match &self.body {
            Some(body) => scenario.with_body(body.clone()),
            None => scenario,
        }
    }
}

/// How a catalog scenario runs.
#[derive(Clone, Copy)]
pub enum Runner {
    /// Event-loop scenario, runnable on any loop adapter
    Async(fn(&Overrides) -> RunnableScenario),
    /// Synchronous scenario over [`BlockingConnection`]
    Blocking(fn(&Overrides) -> Report),
}

/// One named scenario.
#[derive(Clone, Copy)]
pub struct Entry {
    /// Name used on the command line
    pub name: &'static str,
    /// One-line description
    pub summary: &'static str,
    /// How to run it
    pub runner: Runner,
}

/// Every named scenario.
pub const CATALOG: &[Entry] = &[
    Entry {
        name: "send-get-reject-get",
        summary: "publish, get, reject with requeue, get again, ack; both bodies must match",
        runner: Runner::Async(send_get_reject_get),
    },
    Entry {
        name: "publish-unroutable",
        summary: "mandatory publish to an undeclared exchange; expect a 404 protocol error",
        runner: Runner::Async(publish_unroutable),
    },
    Entry {
        name: "timers",
        summary: "0.1s step timer under a 1.5s watchdog; the watchdog must not fire",
        runner: Runner::Async(timers),
    },
    Entry {
        name: "blocking-publish-invalid",
        summary: "blocking publish to an undeclared exchange; the 404 is raised synchronously",
        runner: Runner::Blocking(blocking_publish_invalid),
    },
];

/// Look up a scenario by name.
pub fn find(name: &str) -> Option<&'static Entry> {
    CATALOG.iter().find(|entry| entry.name == name)
}

/// Publish → get → reject(requeue) → get → ack → close.
pub fn send_get_reject_get(overrides: &Overrides) -> RunnableScenario {
    overrides
        .apply(Scenario::new("send-get-reject-get"))
        .oracle(oracle::all_of(vec![
            oracle::plan_completed(),
            oracle::min_records(2),
            oracle::redelivery_matches_published(),
        ]))
}

/// Mandatory publish to an exchange that was never declared.
pub fn publish_unroutable(overrides: &Overrides) -> RunnableScenario {
    overrides
        .apply(Scenario::new("publish-unroutable"))
        .with_plan(PUBLISH_ONLY)
        .with_exchange(MISSING_EXCHANGE)
        .with_mandatory(true)
        .oracle(oracle::not_reached(
            Step::Published,
            format!("publish to {} was accepted", MISSING_EXCHANGE),
        ))
}

/// Connect, let a short step timer fire under a longer watchdog, close.
pub fn timers(overrides: &Overrides) -> RunnableScenario {
    overrides
        .apply(Scenario::new("timers"))
        .with_plan(TIMER_ONLY)
        .oracle(oracle::all_of(vec![oracle::plan_completed(), oracle::flag_set(STEP_TIMER_FLAG)]))
}

/// Blocking publish to an exchange that was never declared.
pub fn blocking_publish_invalid(overrides: &Overrides) -> Report {
    let name = "blocking-publish-invalid";
    let queue = format!("test-{}-{}", name, std::process::id());
    let body = overrides.body.clone().unwrap_or_else(|| format!("test-message-{}", name));

    let mut steps = vec![Step::Start];
    let result = (|| -> Result<(), ProtocolFault> {
        let mut conn = BlockingConnection::connect(&ConnectionParams::default())?;
        steps.push(Step::Connected);

        let mut channel = conn.channel()?;
        steps.push(Step::ChannelOpen);

        channel.publish_text(MISSING_EXCHANGE, &queue, body.clone())?;
        steps.push(Step::Published);
        Ok(())
    })();

    let outcome = match result {
        Err(fault) => {
            tracing::info!(scenario = name, %fault, "blocking publish raised");
            Outcome::ProtocolError { fault }
        },
        Ok(()) => Outcome::FailedAssertion {
            reason: format!("publish to {} was accepted", MISSING_EXCHANGE),
        },
    };

    let published = if steps.contains(&Step::Published) {
        vec![Bytes::from(body)]
    } else {
        Vec::new()
    };

    Report {
        scenario: name.to_string(),
        queue,
        outcome,
        steps,
        records: Vec::new(),
        published,
        watchdogs_armed: 0,
        expirations: 0,
        stop_calls: 0,
        elapsed: Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_findable() {
        for entry in CATALOG {
            assert_eq!(find(entry.name).map(|found| found.name), Some(entry.name));
        }
        assert!(find("no-such-scenario").is_none());
    }

    #[test]
    fn blocking_publish_invalid_reports_not_found() {
        let report = blocking_publish_invalid(&Overrides::default());
        match &report.outcome {
            Outcome::ProtocolError { fault } => assert!(fault.code.is_not_found()),
            other => panic!("expected protocol error, got {:?}", other),
        }
        assert_eq!(report.steps, vec![Step::Start, Step::Connected, Step::ChannelOpen]);
        assert_eq!(report.exit_code(), 4);
    }
}
