//! Scenario framework.
//!
//! A scenario is a plan of protocol steps, a script of what to send, and a
//! mandatory oracle that judges the evidence once the connection has closed.
//! The [`Driver`] runs it over any connection that implements the core
//! capability traits and produces a [`Report`].

mod builder;
pub mod catalog;
mod driver;
mod evidence;
pub mod oracle;
mod report;

pub use builder::{RunnableScenario, Scenario};
pub use driver::Driver;
pub use evidence::Evidence;
pub use oracle::OracleFn;
pub use report::Report;
