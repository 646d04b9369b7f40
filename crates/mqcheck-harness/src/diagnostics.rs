//! Diagnostic sink setup.
//!
//! Core and harness code emit through `tracing` macros only. This module
//! installs the process-wide subscriber once: a `fmt` layer on stderr,
//! filtered by level, colorized when asked for.

use std::io::IsTerminal;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable overriding the level filter (`EnvFilter` syntax).
pub const LOG_ENV: &str = "MQCHECK_LOG";

/// Minimum level to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    /// Everything, including step transitions and timer bookkeeping
    Debug,
    /// Scenario start and verdict
    #[default]
    Info,
    /// Timeouts and protocol faults
    Warning,
    /// Harness defects only
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// When to colorize output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Colorize when stderr is a terminal
    #[default]
    Auto,
    /// Always colorize
    Always,
    /// Never colorize
    Never,
}

impl ColorChoice {
    fn enabled(self) -> bool {
        match self {
            Self::Auto => std::io::stderr().is_terminal(),
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Build the level filter: `MQCHECK_LOG` if set and valid, else `level`.
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed; the existing one
/// is kept.
pub fn init(level: LogLevel, color: ColorChoice) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color.enabled())
                .with_target(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter(level))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_warn_directive() {
        assert_eq!(LogLevel::Warning.directive(), "warn");
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn second_init_keeps_first_subscriber() {
        init(LogLevel::Debug, ColorChoice::Never);
        assert!(!init(LogLevel::Error, ColorChoice::Never));
    }
}
