//! Scenarios on the tokio reactor adapter, inside turmoil.

use std::time::Duration;

use mqcheck_core::{step::Step, Outcome};
use mqcheck_harness::{
    run_under_turmoil,
    scenario::catalog::{self, Overrides},
    Broker, Operation, SimConfig,
};

fn hello() -> Overrides {
    Overrides { seed: 7, body: Some("hello-1".to_string()) }
}

#[test]
fn send_get_reject_get_passes_on_tokio() {
    let report = run_under_turmoil(catalog::send_get_reject_get(&hello()), Broker::new(), SimConfig::default())
        .expect("scenario should run");

    assert_eq!(report.outcome, Outcome::Passed, "{}", report);
    assert_eq!(report.bodies(), vec!["hello-1", "hello-1"]);
    assert_eq!(report.expirations, 0);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn publish_unroutable_reports_not_found_on_tokio() {
    let report = run_under_turmoil(
        catalog::publish_unroutable(&Overrides::default()),
        Broker::new(),
        SimConfig::default(),
    )
    .expect("scenario should run");

    match &report.outcome {
        Outcome::ProtocolError { fault } => assert!(fault.code.is_not_found()),
        other => panic!("expected protocol error, got {:?}", other),
    }
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn timers_pass_on_tokio() {
    let report = run_under_turmoil(catalog::timers(&Overrides::default()), Broker::new(), SimConfig::default())
        .expect("scenario should run");

    assert_eq!(report.outcome, Outcome::Passed, "{}", report);
    assert_eq!(report.expirations, 0);
}

#[test]
fn dropped_get_times_out_on_tokio() {
    let config = SimConfig::default().with_dropped(Operation::Get);
    let report = run_under_turmoil(catalog::send_get_reject_get(&hello()), Broker::new(), config)
        .expect("scenario should run");

    assert_eq!(
        report.outcome,
        Outcome::TimedOut { step: Step::GotFirst, after: Duration::from_secs(2) }
    );
    assert_eq!(report.expirations, 1);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn reply_due_with_the_deadline_wins_on_tokio() {
    let config = SimConfig::default().with_latency(Operation::Get, Duration::from_secs(2));
    let report = run_under_turmoil(catalog::send_get_reject_get(&hello()), Broker::new(), config)
        .expect("scenario should run");

    assert_eq!(report.outcome, Outcome::Passed, "{}", report);
    assert_eq!(report.expirations, 0);
}

#[test]
fn tokio_and_sim_adapters_agree() {
    let sim = catalog::send_get_reject_get(&hello()).run().expect("no harness defect");
    let tokio = run_under_turmoil(catalog::send_get_reject_get(&hello()), Broker::new(), SimConfig::default())
        .expect("scenario should run");

    assert_eq!(sim.outcome, tokio.outcome);
    assert_eq!(sim.steps, tokio.steps);
    assert_eq!(sim.records, tokio.records);
    assert_eq!(sim.watchdogs_armed, tokio.watchdogs_armed);
}
