//! Broker-side faults surfacing as scenario outcomes.

use std::time::{Duration, Instant};

use mqcheck_core::{
    capability::{AsyncConnection, EventLoop, LoopControl, LoopEvent, TimerHandle, TimerHost},
    protocol::{ConnectionParams, DeliveryTag, FaultScope, ProtocolFault, Publish, QueueDeclare, ReplyCode},
    step::{Step, PUBLISH_ONLY},
    Outcome,
};
use mqcheck_harness::{
    scenario::{
        catalog::{self, Overrides},
        oracle, Report, Scenario,
    },
    Broker, SimConfig, SimConnection,
};

fn protocol_fault(report: &Report) -> &ProtocolFault {
    match &report.outcome {
        Outcome::ProtocolError { fault } => fault,
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[test]
fn unknown_delivery_tag_is_a_protocol_error() {
    let report = Scenario::new("send-get-reject-get")
        .with_body("hello-1")
        .with_delivery_tag(DeliveryTag(99))
        .oracle(oracle::min_records(2))
        .run()
        .expect("no harness defect");

    let fault = protocol_fault(&report);
    assert_eq!(fault.code, ReplyCode::PRECONDITION_FAILED);
    assert_eq!(fault.scope, FaultScope::Channel);
    assert!(fault.text.contains("99"));
    assert_eq!(report.steps.last(), Some(&Step::GotFirst));
    assert_eq!(report.exit_code(), 4);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn empty_queue_is_a_failed_assertion() {
    // Bound nowhere, not mandatory: the broker confirms and drops the message.
    let broker = Broker::new().with_exchange("sink");
    let mut conn = SimConnection::with_broker(broker, SimConfig::default());

    let report = Scenario::new("send-get-reject-get")
        .with_exchange("sink")
        .oracle(oracle::min_records(2))
        .run_with(&mut conn)
        .expect("no harness defect");

    match &report.outcome {
        Outcome::FailedAssertion { reason } => assert!(reason.contains("empty"), "{}", reason),
        other => panic!("expected failed assertion, got {:?}", other),
    }
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn returned_mandatory_message_is_a_protocol_error() {
    let broker = Broker::new().with_exchange("sink");
    let mut conn = SimConnection::with_broker(broker, SimConfig::default());

    let report = Scenario::new("publish-unroutable")
        .with_plan(PUBLISH_ONLY)
        .with_exchange("sink")
        .with_mandatory(true)
        .oracle(oracle::reached(Step::Published))
        .run_with(&mut conn)
        .expect("no harness defect");

    let fault = protocol_fault(&report);
    assert_eq!(fault.code, ReplyCode::NO_ROUTE);
    assert_eq!(fault.scope, FaultScope::Message);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn mandatory_publish_to_bound_queue_passes() {
    let report = Scenario::new("publish-routed")
        .with_plan(PUBLISH_ONLY)
        .with_mandatory(true)
        .oracle(oracle::all_of(vec![oracle::plan_completed(), oracle::reached(Step::Published)]))
        .run()
        .expect("no harness defect");

    assert_eq!(report.outcome, Outcome::Passed, "{}", report);
    assert_eq!(report.published.len(), 1);
}

#[test]
fn immediate_publish_closes_the_connection() {
    let report = Scenario::new("publish-immediate")
        .with_plan(PUBLISH_ONLY)
        .with_immediate(true)
        .oracle(oracle::reached(Step::Published))
        .run()
        .expect("no harness defect");

    let fault = protocol_fault(&report);
    assert_eq!(fault.code, ReplyCode::NOT_IMPLEMENTED);
    assert_eq!(fault.scope, FaultScope::Connection);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn refused_virtual_host_is_a_protocol_error() {
    let params = ConnectionParams { virtual_host: "/restricted".to_string(), ..ConnectionParams::default() };
    let report = Scenario::new("x")
        .with_params(params)
        .oracle(oracle::plan_completed())
        .run()
        .expect("no harness defect");

    assert_eq!(protocol_fault(&report).code, ReplyCode::ACCESS_REFUSED);
    assert_eq!(report.steps, vec![Step::Start]);
    assert_eq!(report.stop_calls, 1);
}

#[test]
fn accepted_publish_to_missing_exchange_fails_the_scenario() {
    let scenario = catalog::publish_unroutable(&Overrides::default());
    let queue = scenario.queue_name();

    let mut broker = Broker::new().with_exchange(catalog::MISSING_EXCHANGE);
    broker.bind(queue.clone(), catalog::MISSING_EXCHANGE, queue);
    let mut conn = SimConnection::with_broker(broker, SimConfig::default());

    let report = scenario.run_with(&mut conn).expect("no harness defect");

    match &report.outcome {
        Outcome::FailedAssertion { reason } => {
            assert!(reason.contains(catalog::MISSING_EXCHANGE), "{}", reason);
        },
        other => panic!("expected failed assertion, got {:?}", other),
    }
    assert_eq!(report.exit_code(), 1);
    assert!(report.steps.contains(&Step::Published));
    assert_eq!(report.stop_calls, 1);
}

/// Delivers a second `Connected` right after the channel opens.
struct DuplicateConnected {
    inner: SimConnection,
    injected: bool,
}

impl TimerHost for DuplicateConnected {
    fn add_timer(&mut self, delay: Duration) -> TimerHandle {
        self.inner.add_timer(delay)
    }

    fn remove_timer(&mut self, handle: TimerHandle) -> bool {
        self.inner.remove_timer(handle)
    }

    fn now(&self) -> Instant {
        self.inner.now()
    }
}

impl AsyncConnection for DuplicateConnected {
    fn connect(&mut self, params: &ConnectionParams) -> Result<(), ProtocolFault> {
        self.inner.connect(params)
    }

    fn open_channel(&mut self) -> Result<(), ProtocolFault> {
        self.inner.open_channel()
    }

    fn declare_queue(&mut self, declare: &QueueDeclare) -> Result<(), ProtocolFault> {
        self.inner.declare_queue(declare)
    }

    fn publish(&mut self, publish: &Publish) -> Result<(), ProtocolFault> {
        self.inner.publish(publish)
    }

    fn get(&mut self, queue: &str) -> Result<(), ProtocolFault> {
        self.inner.get(queue)
    }

    fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ProtocolFault> {
        self.inner.reject(tag, requeue)
    }

    fn acknowledge(&mut self, tag: DeliveryTag) -> Result<(), ProtocolFault> {
        self.inner.acknowledge(tag)
    }

    fn add_close_handler(&mut self) {
        self.inner.add_close_handler();
    }

    fn close(&mut self) -> Result<(), ProtocolFault> {
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

impl LoopControl for DuplicateConnected {
    fn start(&mut self) {
        self.inner.start();
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn stop_calls(&self) -> usize {
        self.inner.stop_calls()
    }
}

impl EventLoop for DuplicateConnected {
    fn next_event(&mut self) -> Option<LoopEvent> {
        if self.injected {
            self.injected = false;
            return Some(LoopEvent::Connected);
        }
        let event = self.inner.next_event()?;
        if matches!(event, LoopEvent::ChannelOpened { .. }) {
            self.injected = true;
        }
        Some(event)
    }
}

#[test]
fn out_of_order_event_aborts_the_run_and_stops_once() {
    let mut conn = DuplicateConnected { inner: SimConnection::new(SimConfig::default()), injected: false };

    let err = Scenario::new("send-get-reject-get")
        .with_body("hello-1")
        .oracle(oracle::min_records(2))
        .run_with(&mut conn)
        .unwrap_err();

    assert!(err.is_defect(), "{}", err);
    assert_eq!(conn.stop_calls(), 1);
    assert!(!conn.is_running());
    assert_eq!(conn.inner.live_timers(), 0);
}
