//! mqcheck scenario core logic
//!
//! This crate contains the pure state machine logic for running message-queue
//! client scenarios under watchdog supervision. It is completely decoupled
//! from I/O: the event loop, the broker and the clock all live behind the
//! traits in [`capability`] and [`env`].
//!
//! # Architecture: "The Hollow Shell"
//!
//! ```text
//!      ┌──────────────────────────────┐
//!      │ mqcheck-core                 │
//!      │ - Step sequencer             │
//!      │ - Timer supervisor           │
//!      │ - Outcome recorder           │
//!      └──────────────────────────────┘
//!                     ↓
//!      ┌──────────────────────────────┐
//!      │ mqcheck-harness              │
//!      │ - Simulated broker           │
//!      │ - Sim / tokio / blocking     │
//!      │   connections                │
//!      │ - Scenario driver, oracles   │
//!      └──────────────────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - No I/O in Core: the sequencer returns [`sequencer::StepAction`]s and the
//!   driver executes them
//! - Single-flight supervision: at most one watchdog is armed per scenario
//! - Delivery order decides races: a reply delivered before its watchdog
//!   wins, a watchdog delivered first times the step out
//!
//! # Modules
//!
//! - [`step`]: Step names, event kinds and the transition table
//! - [`sequencer`]: Plan-driven step sequencer
//! - [`timer`]: Watchdog supervisor
//! - [`recorder`]: Append-only record of observed artifacts
//! - [`outcome`]: Terminal outcomes and exit codes
//! - [`capability`]: Connection and event-loop traits
//! - [`protocol`]: Broker-facing request/reply types
//! - [`env`]: Environment abstraction (time, RNG)
//! - [`error`]: Error taxonomy

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod capability;
pub mod env;
pub mod error;
pub mod outcome;
pub mod protocol;
pub mod recorder;
pub mod sequencer;
pub mod step;
pub mod timer;

pub use error::HarnessError;
pub use outcome::Outcome;
pub use sequencer::{Sequencer, StepAction, StepEvent};
pub use step::Step;
pub use timer::TimerSupervisor;
