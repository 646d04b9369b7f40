//! Simulated broker, event-loop adapters and scenario driver for mqcheck.
//!
//! The core crate decides what to do next; this crate supplies everything it
//! needs to actually run:
//!
//! ```text
//!   Scenario ──oracle──► RunnableScenario ──► Driver ──► Report
//!                                               │
//!                      ┌────────────────────────┼──────────────────────┐
//!                      ▼                        ▼                      ▼
//!               SimConnection           TokioConnection       BlockingConnection
//!            (virtual-time heap)     (turmoil + tokio task)     (no event loop)
//!                      └────────────────────────┴──────────────────────┘
//!                                               ▼
//!                                        in-memory Broker
//! ```
//!
//! Runs are deterministic for a given seed and latency configuration.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod blocking;
pub mod broker;
pub mod diagnostics;
pub mod scenario;
pub mod sim_connection;
pub mod sim_env;
pub mod tokio_connection;

pub use blocking::{BlockingChannel, BlockingConnection};
pub use broker::Broker;
pub use sim_connection::{Operation, SimConfig, SimConnection};
pub use sim_env::SimEnv;
pub use tokio_connection::{run_under_turmoil, RunError, TokioConnection};
