//! `mqcheck` command line.
//!
//! ```text
//! mqcheck list
//! mqcheck run send-get-reject-get --adapter tokio --seed 7 --json
//! ```
//!
//! The process exit code is the scenario's outcome code.

use std::{process, time::Duration};

use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use mqcheck_core::outcome::EXIT_HARNESS_FAILURE;
use mqcheck_harness::{
    diagnostics::{self, ColorChoice, LogLevel},
    run_under_turmoil,
    scenario::{
        catalog::{self, Overrides, Runner},
        Report, RunnableScenario,
    },
    Broker, Operation, RunError, SimConfig, SimConnection,
};

#[derive(Parser, Debug)]
#[command(name = "mqcheck")]
#[command(about = "Timeout-supervised message-queue client scenarios", long_about = None)]
struct Cli {
    /// Minimum diagnostic level (overridden by MQCHECK_LOG)
    #[arg(long = "log-level", value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Colorize diagnostics
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto, global = true)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available scenarios
    List,
    /// Run one scenario
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Scenario name, see `mqcheck list`
    scenario: String,

    /// Event loop to run on
    #[arg(long = "adapter", value_enum, default_value_t = Adapter::Sim)]
    adapter: Adapter,

    /// Seed for generated bodies and the simulated environment
    #[arg(long = "seed", default_value_t = 0)]
    seed: u64,

    /// Publish this body instead of a generated one
    #[arg(long = "body")]
    body: Option<String>,

    /// Latency of every broker operation
    #[arg(long = "latency-ms", value_name = "MILLIS")]
    latency_ms: Option<u64>,

    /// Never deliver replies to this operation (repeatable)
    #[arg(long = "stall", value_enum, value_name = "OP")]
    stall: Vec<Operation>,

    /// Print the report as JSON
    #[arg(long = "json")]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Adapter {
    /// Deterministic virtual-time loop
    Sim,
    /// Tokio reactor inside a turmoil simulation
    Tokio,
}

fn main() {
    let cli = Cli::parse();
    diagnostics::init(cli.log_level, cli.color);

    match cli.command {
        Command::List => {
            for entry in catalog::CATALOG {
                println!("{:<26} {}", entry.name, entry.summary);
            }
        },
        Command::Run(args) => {
            let code = match run(&args) {
                Ok(report) => {
                    print_report(&report, args.json);
                    report.exit_code()
                },
                Err(e) => {
                    tracing::error!(scenario = %args.scenario, error = %e, "scenario aborted");
                    eprintln!("{}: {}", args.scenario, e);
                    EXIT_HARNESS_FAILURE
                },
            };
            process::exit(code);
        },
    }
}

fn run(args: &RunArgs) -> Result<Report, RunError> {
    let Some(entry) = catalog::find(&args.scenario) else {
        Cli::command()
            .error(
                ErrorKind::InvalidValue,
                format!("unknown scenario '{}', see `mqcheck list`", args.scenario),
            )
            .exit()
    };

    let overrides = Overrides { seed: args.seed, body: args.body.clone() };
    let config = sim_config(args);

    match entry.runner {
        Runner::Blocking(run) => {
            if args.adapter != Adapter::Sim || !args.stall.is_empty() {
                tracing::warn!(scenario = entry.name, "blocking scenario ignores adapter and stall options");
            }
            Ok(run(&overrides))
        },
        Runner::Async(build) => run_on(args.adapter, build(&overrides), config),
    }
}

fn run_on(adapter: Adapter, scenario: RunnableScenario, config: SimConfig) -> Result<Report, RunError> {
    tracing::info!(scenario = scenario.name(), seed = scenario.seed(), ?adapter, "running");
    match adapter {
        Adapter::Sim => {
            let mut conn = SimConnection::new(config);
            Ok(scenario.run_with(&mut conn)?)
        },
        Adapter::Tokio => run_under_turmoil(scenario, Broker::new(), config),
    }
}

fn sim_config(args: &RunArgs) -> SimConfig {
    let mut config = SimConfig::default();
    if let Some(millis) = args.latency_ms {
        config = config.with_default_latency(Duration::from_millis(millis));
    }
    args.stall.iter().fold(config, |config, op| config.with_dropped(*op))
}

fn print_report(report: &Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("failed to serialize report: {}", e),
        }
        return;
    }

    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    println!("{} {}", verdict, report);
    for body in report.bodies() {
        println!("  retrieved: {}", body);
    }
}
