//! Scenario steps and the transition table.
//!
//! # State Machine
//!
//! ```text
//! ┌───────┐ Connected ┌───────────┐ ChannelOpened ┌──────────────┐
//! │ Start │──────────>│ Connected │──────────────>│ ChannelOpen  │
//! └───────┘           └───────────┘               └──────────────┘
//!                          │ StepTimer                   │ QueueDeclared
//!                          ↓                             ↓
//!                     ┌─────────┐                 ┌───────────────┐
//!                     │ Elapsed │                 │ QueueDeclared │
//!                     └─────────┘                 └───────────────┘
//!                                                        │ PublishConfirmed
//!                                                        ↓
//! ┌──────────┐ Rejected ┌──────────┐ Delivery    ┌───────────┐
//! │ Reacted  │<─────────│ GotFirst │<────────────│ Published │
//! └──────────┘          └──────────┘             └───────────┘
//!      │ Delivery
//!      ↓
//! ┌───────────┐ Acked  ┌──────────────┐ Closed  ┌────────┐
//! │ GotSecond │───────>│ Acknowledged │────────>│ Closed │
//! └───────────┘        └──────────────┘         └────────┘
//! ```
//!
//! Every non-terminal step can also move to `Closed` on `Closed`, which a
//! plan uses when it ends early. Whether a transition is *allowed* in a given
//! run is decided by the plan (see [`crate::sequencer`]); this table only
//! says which transitions exist.

use std::fmt;

use serde::Serialize;

/// A named protocol step, named after the operation just completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    /// Nothing done yet
    Start,
    /// Connection established
    Connected,
    /// Channel open
    ChannelOpen,
    /// Scenario queue declared
    QueueDeclared,
    /// Message published and confirmed
    Published,
    /// First retrieval returned a message
    GotFirst,
    /// First message rejected with requeue
    Reacted,
    /// Second retrieval returned the redelivered message
    GotSecond,
    /// Second message acknowledged
    Acknowledged,
    /// Step timer fired before its watchdog
    Elapsed,
    /// Connection closed (terminal)
    Closed,
}

impl Step {
    /// Kebab-case name used in logs and reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Connected => "connected",
            Self::ChannelOpen => "channel-open",
            Self::QueueDeclared => "queue-declared",
            Self::Published => "published",
            Self::GotFirst => "got-first",
            Self::Reacted => "reacted",
            Self::GotSecond => "got-second",
            Self::Acknowledged => "acknowledged",
            Self::Elapsed => "elapsed",
            Self::Closed => "closed",
        }
    }

    /// Whether this is the terminal step.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of completion event, stripped of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Connection handshake finished
    Connected,
    /// Channel opened
    ChannelOpened,
    /// Queue declared
    QueueDeclared,
    /// Publish confirmed by the broker
    PublishConfirmed,
    /// `basic.get` returned a message
    Delivery,
    /// Reject went out
    Rejected,
    /// Ack went out
    Acked,
    /// The scenario's step timer fired
    StepTimer,
    /// Connection fully closed
    Closed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `(current, event) -> next` dispatch table.
pub const TRANSITIONS: &[(Step, EventKind, Step)] = &[
    (Step::Start, EventKind::Connected, Step::Connected),
    (Step::Connected, EventKind::ChannelOpened, Step::ChannelOpen),
    (Step::Connected, EventKind::StepTimer, Step::Elapsed),
    (Step::ChannelOpen, EventKind::QueueDeclared, Step::QueueDeclared),
    (Step::QueueDeclared, EventKind::PublishConfirmed, Step::Published),
    (Step::Published, EventKind::Delivery, Step::GotFirst),
    (Step::GotFirst, EventKind::Rejected, Step::Reacted),
    (Step::Reacted, EventKind::Delivery, Step::GotSecond),
    (Step::GotSecond, EventKind::Acked, Step::Acknowledged),
    (Step::Connected, EventKind::Closed, Step::Closed),
    (Step::ChannelOpen, EventKind::Closed, Step::Closed),
    (Step::QueueDeclared, EventKind::Closed, Step::Closed),
    (Step::Published, EventKind::Closed, Step::Closed),
    (Step::GotFirst, EventKind::Closed, Step::Closed),
    (Step::Reacted, EventKind::Closed, Step::Closed),
    (Step::GotSecond, EventKind::Closed, Step::Closed),
    (Step::Acknowledged, EventKind::Closed, Step::Closed),
    (Step::Elapsed, EventKind::Closed, Step::Closed),
];

/// Look up the step `event` leads to from `current`.
#[must_use]
pub fn next_step(current: Step, event: EventKind) -> Option<Step> {
    TRANSITIONS
        .iter()
        .find(|(from, kind, _)| *from == current && *kind == event)
        .map(|(_, _, to)| *to)
}

/// Whether any event leads from `from` to `to`.
#[must_use]
pub fn is_reachable(from: Step, to: Step) -> bool {
    TRANSITIONS.iter().any(|(a, _, b)| *a == from && *b == to)
}

/// Full publish → get → reject → get → ack plan.
pub const SEND_GET_REJECT_GET: &[Step] = &[
    Step::Start,
    Step::Connected,
    Step::ChannelOpen,
    Step::QueueDeclared,
    Step::Published,
    Step::GotFirst,
    Step::Reacted,
    Step::GotSecond,
    Step::Acknowledged,
    Step::Closed,
];

/// Publish and close.
pub const PUBLISH_ONLY: &[Step] = &[
    Step::Start,
    Step::Connected,
    Step::ChannelOpen,
    Step::QueueDeclared,
    Step::Published,
    Step::Closed,
];

/// Connect, let the step timer fire, close.
pub const TIMER_ONLY: &[Step] = &[Step::Start, Step::Connected, Step::Elapsed, Step::Closed];
