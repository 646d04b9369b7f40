//! Protocol step sequencer.
//!
//! Drives one scenario through its plan, one completion event at a time.
//!
//! # Architecture: Action-Based State Machine
//!
//! - Methods accept events and return `Result<Vec<StepAction>, HarnessError>`
//! - The driver executes the actions (requests, watchdog arm/release,
//!   scheduled work, close)
//! - No I/O, no clock, no stored connection
//!
//! # Plans
//!
//! A plan is the ordered list of steps a scenario expects, from
//! [`Step::Start`] to [`Step::Closed`]. An event moves the sequencer only if
//! the [dispatch table](crate::step::TRANSITIONS) maps `(state, event)` to the
//! plan's next step; anything else is a `SequencingDefect`.
//!
//! On entering a step the sequencer issues whatever request completes the
//! *next* planned step, wrapped in a watchdog:
//!
//! | Next step      | Actions                                   |
//! |----------------|-------------------------------------------|
//! | connected      | guard, connect                            |
//! | channel-open   | guard, open channel                       |
//! | queue-declared | guard, declare queue                      |
//! | published      | guard, publish                            |
//! | got-first      | guard, get                                |
//! | reacted        | guard, reject (requeue)                   |
//! | got-second     | schedule get-again after the requeue delay |
//! | acknowledged   | guard, ack                                |
//! | elapsed        | guard (watchdog), schedule step timer     |
//! | closed         | close (unguarded)                         |

use std::time::Duration;

use bytes::Bytes;

use crate::{
    error::HarnessError,
    protocol::{BasicProperties, Delivery, DeliveryMode, DeliveryTag, Publish, QueueDeclare},
    recorder::{Artifact, OutcomeRecorder},
    step::{self, EventKind, Step},
};

/// Flag recorded when the step timer beats its watchdog.
pub const STEP_TIMER_FLAG: &str = "step-timer-fired";

/// Deadlines and delays used by a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Deadline for each guarded request
    pub step: Duration,
    /// Pause between reject and the second get, for the broker to requeue
    pub requeue_delay: Duration,
    /// Delay of the timer scenario's step timer
    pub step_timer: Duration,
    /// Watchdog guarding the step timer
    pub watchdog: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(2),
            requeue_delay: Duration::from_millis(250),
            step_timer: Duration::from_millis(100),
            watchdog: Duration::from_millis(1500),
        }
    }
}

/// What the scenario sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Queue to declare, publish to (as routing key) and get from
    pub queue: String,
    /// Body to publish
    pub body: Bytes,
    /// Exchange to publish to
    pub exchange: String,
    /// Publish with the mandatory flag
    pub mandatory: bool,
    /// Publish with the immediate flag
    pub immediate: bool,
    /// Delivery mode of the published message
    pub delivery_mode: DeliveryMode,
    /// Declare the queue durable
    pub durable: bool,
    /// Declare the queue exclusive
    pub exclusive: bool,
    /// Declare the queue auto-delete
    pub auto_delete: bool,
    /// Deadlines and delays
    pub timeouts: Timeouts,
    /// Settle this tag instead of the one the broker handed out
    pub forced_tag: Option<DeliveryTag>,
}

impl Script {
    /// Script publishing `body` to `queue` through the default exchange.
    pub fn new(queue: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            queue: queue.into(),
            body: body.into(),
            exchange: String::new(),
            mandatory: false,
            immediate: false,
            delivery_mode: DeliveryMode::Transient,
            durable: false,
            exclusive: false,
            auto_delete: true,
            timeouts: Timeouts::default(),
            forced_tag: None,
        }
    }

    /// `queue.declare` request for this script.
    #[must_use]
    pub fn declare(&self) -> QueueDeclare {
        QueueDeclare {
            queue: self.queue.clone(),
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
        }
    }

    /// `basic.publish` request for this script.
    #[must_use]
    pub fn publish(&self) -> Publish {
        Publish {
            exchange: self.exchange.clone(),
            routing_key: self.queue.clone(),
            body: self.body.clone(),
            properties: BasicProperties { delivery_mode: self.delivery_mode, ..BasicProperties::default() },
            mandatory: self.mandatory,
            immediate: self.immediate,
        }
    }
}

/// Work the sequencer asks to have done after a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delayed {
    /// Issue the second `basic.get`
    GetAgain,
    /// Complete the timer scenario's step
    StepTimer,
}

/// Actions returned by the sequencer for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Connect
    Connect,
    /// Open the channel
    OpenChannel,
    /// Declare a queue
    DeclareQueue(QueueDeclare),
    /// Publish a message
    Publish(Publish),
    /// `basic.get` from a queue
    Get {
        /// Queue to get from
        queue: String,
    },
    /// Reject a delivery
    Reject {
        /// Delivery to reject
        tag: DeliveryTag,
        /// Ask the broker to requeue it
        requeue: bool,
    },
    /// Acknowledge a delivery
    Acknowledge {
        /// Delivery to acknowledge
        tag: DeliveryTag,
    },
    /// Begin a guarded step: arm the watchdog
    Guard {
        /// Step that must complete
        step: Step,
        /// Deadline
        timeout: Duration,
    },
    /// End the guarded step: cancel the armed watchdog
    Release,
    /// Schedule delayed work
    Schedule {
        /// Delay before it runs
        delay: Duration,
        /// What to run
        action: Delayed,
    },
    /// Close the connection
    Close,
}

/// Completion events the sequencer consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// Connection established
    Connected,
    /// Channel opened
    ChannelOpened,
    /// Queue declared
    QueueDeclared {
        /// Name confirmed by the broker
        queue: String,
    },
    /// Publish confirmed
    PublishConfirmed,
    /// Message retrieved
    Delivery(Delivery),
    /// Reject went out
    Rejected {
        /// Rejected delivery
        tag: DeliveryTag,
    },
    /// Ack went out
    Acked {
        /// Acknowledged delivery
        tag: DeliveryTag,
    },
    /// Scheduled work came due
    Delayed(Delayed),
    /// Connection closed
    Closed,
}

impl StepEvent {
    /// Table key for this event, or `None` for work that does not move the
    /// state machine.
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::Connected => Some(EventKind::Connected),
            Self::ChannelOpened => Some(EventKind::ChannelOpened),
            Self::QueueDeclared { .. } => Some(EventKind::QueueDeclared),
            Self::PublishConfirmed => Some(EventKind::PublishConfirmed),
            Self::Delivery(_) => Some(EventKind::Delivery),
            Self::Rejected { .. } => Some(EventKind::Rejected),
            Self::Acked { .. } => Some(EventKind::Acked),
            Self::Delayed(Delayed::StepTimer) => Some(EventKind::StepTimer),
            Self::Delayed(Delayed::GetAgain) => None,
            Self::Closed => Some(EventKind::Closed),
        }
    }
}

/// Linear state machine for one scenario.
#[derive(Debug)]
pub struct Sequencer {
    plan: Vec<Step>,
    cursor: usize,
    script: Script,
    recorder: OutcomeRecorder,
    published: Vec<Bytes>,
    last_tag: Option<DeliveryTag>,
    awaiting: Option<Delayed>,
    started: bool,
    halted: bool,
}

impl Sequencer {
    /// Create a sequencer for `plan`.
    ///
    /// # Errors
    ///
    /// Returns `SequencingDefect` if the plan does not run from `Start` to
    /// `Closed` along the dispatch table.
    pub fn new(plan: Vec<Step>, script: Script) -> Result<Self, HarnessError> {
        validate_plan(&plan)?;

        Ok(Self {
            plan,
            cursor: 0,
            script,
            recorder: OutcomeRecorder::new(),
            published: Vec::new(),
            last_tag: None,
            awaiting: None,
            started: false,
            halted: false,
        })
    }

    /// Current step.
    #[must_use]
    pub fn state(&self) -> Step {
        self.plan[self.cursor]
    }

    /// The step whose completion is awaited, `None` once closed.
    #[must_use]
    pub fn pending(&self) -> Option<Step> {
        self.plan.get(self.cursor + 1).copied()
    }

    /// Steps reached so far, `Start` first.
    #[must_use]
    pub fn visited(&self) -> &[Step] {
        &self.plan[..=self.cursor]
    }

    /// The full plan.
    #[must_use]
    pub fn plan(&self) -> &[Step] {
        &self.plan
    }

    /// Script this sequencer runs.
    #[must_use]
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Evidence recorded so far.
    #[must_use]
    pub fn recorder(&self) -> &OutcomeRecorder {
        &self.recorder
    }

    /// Bodies the broker confirmed as published.
    #[must_use]
    pub fn published(&self) -> &[Bytes] {
        &self.published
    }

    /// Whether the plan ran to `Closed`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    /// Stop reacting. Events handled afterwards are ignored.
    pub fn halt(&mut self) {
        if !self.halted {
            tracing::debug!(state = %self.state(), "sequencer halted");
        }
        self.halted = true;
        self.awaiting = None;
    }

    /// Issue the first request.
    ///
    /// # Errors
    ///
    /// Returns `SequencingDefect` if called twice.
    pub fn start(&mut self) -> Result<Vec<StepAction>, HarnessError> {
        if self.started {
            return Err(HarnessError::defect(self.state(), "sequencer started twice"));
        }
        self.started = true;

        let mut actions = Vec::new();
        self.initiate(&mut actions)?;
        Ok(actions)
    }

    /// Process a completion event and return actions.
    ///
    /// # Errors
    ///
    /// Returns `SequencingDefect` if the event does not complete the pending
    /// step.
    pub fn handle(&mut self, event: StepEvent) -> Result<Vec<StepAction>, HarnessError> {
        let state = self.state();

        if self.halted {
            tracing::debug!(%state, ?event, "ignoring event after halt");
            return Ok(Vec::new());
        }
        if !self.started {
            return Err(HarnessError::defect(state, format!("{:?} before start", event)));
        }

        if let StepEvent::Delayed(delayed) = &event {
            if self.awaiting != Some(*delayed) {
                return Err(HarnessError::defect(
                    state,
                    format!("delayed {:?} fired but {:?} was scheduled", delayed, self.awaiting),
                ));
            }
            self.awaiting = None;
        } else if let Some(delayed) = self.awaiting {
            return Err(HarnessError::defect(
                state,
                format!("{:?} arrived while delayed {:?} was still scheduled", event, delayed),
            ));
        }

        let Some(kind) = event.kind() else {
            return self.get_again();
        };

        let Some(next) = step::next_step(state, kind) else {
            return Err(HarnessError::defect(state, format!("no transition on {}", kind)));
        };

        if self.pending() != Some(next) {
            return Err(HarnessError::defect(
                state,
                format!(
                    "{} leads to {} but the plan expects {}",
                    kind,
                    next,
                    self.pending().map_or("nothing", Step::name)
                ),
            ));
        }

        self.check_settled_tag(state, &event)?;

        let mut actions = Vec::new();
        if !next.is_terminal() {
            actions.push(StepAction::Release);
        }

        self.cursor += 1;
        tracing::debug!(from = %state, to = %next, "step transition");

        self.enter(next, event);
        self.initiate(&mut actions)?;

        Ok(actions)
    }

    fn get_again(&mut self) -> Result<Vec<StepAction>, HarnessError> {
        let Some(step) = self.pending() else {
            return Err(HarnessError::defect(self.state(), "get-again with nothing pending"));
        };

        Ok(vec![
            StepAction::Guard { step, timeout: self.script.timeouts.step },
            StepAction::Get { queue: self.script.queue.clone() },
        ])
    }

    fn check_settled_tag(&self, state: Step, event: &StepEvent) -> Result<(), HarnessError> {
        let settled = match event {
            StepEvent::Rejected { tag } | StepEvent::Acked { tag } => *tag,
            _ => return Ok(()),
        };

        let expected = self.delivery_tag()?;
        if settled != expected {
            return Err(HarnessError::defect(
                state,
                format!("settled delivery {} but {} was outstanding", settled, expected),
            ));
        }
        Ok(())
    }

    fn enter(&mut self, step: Step, event: StepEvent) {
        match (step, event) {
            (Step::Published, _) => self.published.push(self.script.body.clone()),
            (Step::GotFirst | Step::GotSecond, StepEvent::Delivery(delivery)) => {
                tracing::debug!(
                    %step,
                    tag = %delivery.tag,
                    redelivered = delivery.redelivered,
                    "retrieved message"
                );
                self.last_tag = Some(delivery.tag);
                self.recorder.append(Artifact::Body(delivery.body));
            },
            (Step::Elapsed, _) => {
                self.recorder.append(Artifact::Flag { name: STEP_TIMER_FLAG, value: true });
            },
            (Step::QueueDeclared, StepEvent::QueueDeclared { queue }) if queue != self.script.queue => {
                tracing::warn!(declared = %queue, expected = %self.script.queue, "broker renamed queue");
            },
            _ => {},
        }
    }

    fn initiate(&mut self, actions: &mut Vec<StepAction>) -> Result<(), HarnessError> {
        let Some(pending) = self.pending() else {
            return Ok(());
        };

        let timeouts = self.script.timeouts;
        let guard = StepAction::Guard { step: pending, timeout: timeouts.step };

        match pending {
            Step::Start => {
                return Err(HarnessError::defect(self.state(), "start cannot be pending"));
            },
            Step::Connected => actions.extend([guard, StepAction::Connect]),
            Step::ChannelOpen => actions.extend([guard, StepAction::OpenChannel]),
            Step::QueueDeclared => {
                actions.extend([guard, StepAction::DeclareQueue(self.script.declare())]);
            },
            Step::Published => actions.extend([guard, StepAction::Publish(self.script.publish())]),
            Step::GotFirst => {
                actions.extend([guard, StepAction::Get { queue: self.script.queue.clone() }]);
            },
            Step::Reacted => {
                let tag = self.delivery_tag()?;
                actions.extend([guard, StepAction::Reject { tag, requeue: true }]);
            },
            Step::GotSecond => {
                self.awaiting = Some(Delayed::GetAgain);
                actions.push(StepAction::Schedule {
                    delay: timeouts.requeue_delay,
                    action: Delayed::GetAgain,
                });
            },
            Step::Acknowledged => {
                let tag = self.delivery_tag()?;
                actions.extend([guard, StepAction::Acknowledge { tag }]);
            },
            Step::Elapsed => {
                self.awaiting = Some(Delayed::StepTimer);
                actions.extend([
                    StepAction::Guard { step: pending, timeout: timeouts.watchdog },
                    StepAction::Schedule { delay: timeouts.step_timer, action: Delayed::StepTimer },
                ]);
            },
            Step::Closed => actions.push(StepAction::Close),
        }

        Ok(())
    }

    fn delivery_tag(&self) -> Result<DeliveryTag, HarnessError> {
        self.script
            .forced_tag
            .or(self.last_tag)
            .ok_or_else(|| HarnessError::defect(self.state(), "no delivery to settle"))
    }
}

fn validate_plan(plan: &[Step]) -> Result<(), HarnessError> {
    match (plan.first(), plan.last()) {
        (Some(Step::Start), Some(Step::Closed)) if plan.len() >= 2 => {},
        _ => {
            return Err(HarnessError::defect(
                Step::Start,
                format!("plan must run from start to closed, got {:?}", plan),
            ));
        },
    }

    for pair in plan.windows(2) {
        if !step::is_reachable(pair[0], pair[1]) {
            return Err(HarnessError::defect(
                pair[0],
                format!("plan step {} cannot follow {}", pair[1], pair[0]),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{SEND_GET_REJECT_GET, TIMER_ONLY};

    fn delivery(tag: u64, body: &'static [u8], redelivered: bool) -> Delivery {
        Delivery {
            tag: DeliveryTag(tag),
            redelivered,
            exchange: String::new(),
            routing_key: "q".to_string(),
            message_count: 0,
            properties: BasicProperties::default(),
            body: Bytes::from_static(body),
        }
    }

    fn full() -> Sequencer {
        Sequencer::new(SEND_GET_REJECT_GET.to_vec(), Script::new("q", "hello-1")).unwrap()
    }

    #[test]
    fn start_guards_connect() {
        let mut seq = full();
        let actions = seq.start().unwrap();
        assert_eq!(actions, vec![
            StepAction::Guard { step: Step::Connected, timeout: Duration::from_secs(2) },
            StepAction::Connect,
        ]);
        assert_eq!(seq.pending(), Some(Step::Connected));
    }

    #[test]
    fn full_walk_records_both_bodies() {
        let mut seq = full();
        seq.start().unwrap();

        let actions = seq.handle(StepEvent::Connected).unwrap();
        assert_eq!(actions[0], StepAction::Release);
        assert!(actions.contains(&StepAction::OpenChannel));

        seq.handle(StepEvent::ChannelOpened).unwrap();
        let actions = seq.handle(StepEvent::QueueDeclared { queue: "q".to_string() }).unwrap();
        assert!(matches!(actions.last(), Some(StepAction::Publish(p)) if p.body == "hello-1"));

        let actions = seq.handle(StepEvent::PublishConfirmed).unwrap();
        assert_eq!(actions.last(), Some(&StepAction::Get { queue: "q".to_string() }));
        assert_eq!(seq.published(), &[Bytes::from_static(b"hello-1")]);

        let actions = seq.handle(StepEvent::Delivery(delivery(1, b"hello-1", false))).unwrap();
        assert_eq!(actions.last(), Some(&StepAction::Reject { tag: DeliveryTag(1), requeue: true }));

        let actions = seq.handle(StepEvent::Rejected { tag: DeliveryTag(1) }).unwrap();
        assert_eq!(actions, vec![StepAction::Release, StepAction::Schedule {
            delay: Duration::from_millis(250),
            action: Delayed::GetAgain,
        }]);
        assert_eq!(seq.state(), Step::Reacted);

        let actions = seq.handle(StepEvent::Delayed(Delayed::GetAgain)).unwrap();
        assert_eq!(actions, vec![
            StepAction::Guard { step: Step::GotSecond, timeout: Duration::from_secs(2) },
            StepAction::Get { queue: "q".to_string() },
        ]);
        assert_eq!(seq.state(), Step::Reacted);

        let actions = seq.handle(StepEvent::Delivery(delivery(2, b"hello-1", true))).unwrap();
        assert_eq!(actions.last(), Some(&StepAction::Acknowledge { tag: DeliveryTag(2) }));

        let actions = seq.handle(StepEvent::Acked { tag: DeliveryTag(2) }).unwrap();
        assert_eq!(actions, vec![StepAction::Release, StepAction::Close]);

        let actions = seq.handle(StepEvent::Closed).unwrap();
        assert!(actions.is_empty());
        assert!(seq.is_complete());
        assert_eq!(seq.visited(), SEND_GET_REJECT_GET);

        let bodies: Vec<_> = seq.recorder().bodies().cloned().collect();
        assert_eq!(bodies, vec![Bytes::from_static(b"hello-1"), Bytes::from_static(b"hello-1")]);
    }

    #[test]
    fn out_of_order_event_is_a_defect() {
        let mut seq = full();
        seq.start().unwrap();

        let err = seq.handle(StepEvent::ChannelOpened).unwrap_err();
        assert!(err.is_defect());
        assert_eq!(seq.state(), Step::Start);
    }

    #[test]
    fn event_leading_off_plan_is_a_defect() {
        let mut seq = full();
        seq.start().unwrap();
        seq.handle(StepEvent::Connected).unwrap();

        // Table allows Connected -> Elapsed, this plan does not.
        let err = seq.handle(StepEvent::Delayed(Delayed::StepTimer)).unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn unscheduled_get_again_is_a_defect() {
        let mut seq = full();
        seq.start().unwrap();
        seq.handle(StepEvent::Connected).unwrap();

        let err = seq.handle(StepEvent::Delayed(Delayed::GetAgain)).unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn settling_the_wrong_tag_is_a_defect() {
        let mut seq = full();
        seq.start().unwrap();
        seq.handle(StepEvent::Connected).unwrap();
        seq.handle(StepEvent::ChannelOpened).unwrap();
        seq.handle(StepEvent::QueueDeclared { queue: "q".to_string() }).unwrap();
        seq.handle(StepEvent::PublishConfirmed).unwrap();
        seq.handle(StepEvent::Delivery(delivery(7, b"hello-1", false))).unwrap();

        let err = seq.handle(StepEvent::Rejected { tag: DeliveryTag(8) }).unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn halted_sequencer_ignores_late_replies() {
        let mut seq = full();
        seq.start().unwrap();
        seq.halt();

        assert!(seq.handle(StepEvent::Connected).unwrap().is_empty());
        assert!(seq.handle(StepEvent::ChannelOpened).unwrap().is_empty());
        assert_eq!(seq.state(), Step::Start);
    }

    #[test]
    fn forced_tag_overrides_delivery() {
        let mut script = Script::new("q", "body");
        script.forced_tag = Some(DeliveryTag(99));
        let mut seq = Sequencer::new(SEND_GET_REJECT_GET.to_vec(), script).unwrap();
        seq.start().unwrap();
        seq.handle(StepEvent::Connected).unwrap();
        seq.handle(StepEvent::ChannelOpened).unwrap();
        seq.handle(StepEvent::QueueDeclared { queue: "q".to_string() }).unwrap();
        seq.handle(StepEvent::PublishConfirmed).unwrap();

        let actions = seq.handle(StepEvent::Delivery(delivery(1, b"body", false))).unwrap();
        assert_eq!(actions.last(), Some(&StepAction::Reject { tag: DeliveryTag(99), requeue: true }));
    }

    #[test]
    fn persistent_script_publishes_with_delivery_mode_2() {
        let mut script = Script::new("q", "body");
        script.delivery_mode = DeliveryMode::Persistent;
        let mut seq = Sequencer::new(SEND_GET_REJECT_GET.to_vec(), script).unwrap();
        seq.start().unwrap();
        seq.handle(StepEvent::Connected).unwrap();
        seq.handle(StepEvent::ChannelOpened).unwrap();

        let actions = seq.handle(StepEvent::QueueDeclared { queue: "q".to_string() }).unwrap();
        match actions.last() {
            Some(StepAction::Publish(publish)) => {
                assert_eq!(publish.properties.delivery_mode, DeliveryMode::Persistent);
                assert_eq!(publish.properties.content_type.as_deref(), Some("text/plain"));
            },
            other => panic!("expected publish, got {:?}", other),
        }
    }

    #[test]
    fn timer_plan_guards_step_timer_with_watchdog() {
        let mut seq = Sequencer::new(TIMER_ONLY.to_vec(), Script::new("q", "")).unwrap();
        seq.start().unwrap();

        let actions = seq.handle(StepEvent::Connected).unwrap();
        assert_eq!(actions, vec![
            StepAction::Release,
            StepAction::Guard { step: Step::Elapsed, timeout: Duration::from_millis(1500) },
            StepAction::Schedule { delay: Duration::from_millis(100), action: Delayed::StepTimer },
        ]);

        let actions = seq.handle(StepEvent::Delayed(Delayed::StepTimer)).unwrap();
        assert_eq!(actions, vec![StepAction::Release, StepAction::Close]);
        assert_eq!(seq.recorder().snapshot(), &[Artifact::Flag {
            name: STEP_TIMER_FLAG,
            value: true
        }]);
    }

    #[test]
    fn plans_must_start_and_end_properly() {
        assert!(Sequencer::new(vec![], Script::new("q", "")).unwrap_err().is_defect());
        assert!(
            Sequencer::new(vec![Step::Start, Step::Connected], Script::new("q", ""))
                .unwrap_err()
                .is_defect()
        );
        assert!(
            Sequencer::new(vec![Step::Start, Step::GotFirst, Step::Closed], Script::new("q", ""))
                .unwrap_err()
                .is_defect()
        );
    }
}
