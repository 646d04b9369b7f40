//! Scenario builder API.
//!
//! Provides a declarative API for constructing scenarios that enforce the
//! Oracle Pattern: a scenario cannot run until it has an oracle.

use bytes::Bytes;
use mqcheck_core::{
    capability::{AsyncConnection, AsyncEventLoop, EventLoop, LoopControl},
    env::Environment,
    protocol::{ConnectionParams, DeliveryMode, DeliveryTag},
    sequencer::{Script, Timeouts},
    step::{Step, SEND_GET_REJECT_GET},
    HarnessError, Sequencer,
};

use crate::{
    scenario::{Driver, OracleFn, Report},
    sim_connection::{SimConfig, SimConnection},
    sim_env::SimEnv,
};

/// Scenario builder.
///
/// Defaults to the full publish → get → reject → get → ack plan against the
/// default exchange, with a body derived from the seed.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: String,
    plan: Vec<Step>,
    queue: Option<String>,
    body: Option<Bytes>,
    exchange: String,
    mandatory: bool,
    immediate: bool,
    delivery_mode: DeliveryMode,
    timeouts: Timeouts,
    seed: u64,
    forced_tag: Option<DeliveryTag>,
    params: ConnectionParams,
}

impl Scenario {
    /// Create a scenario named `name` with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plan: SEND_GET_REJECT_GET.to_vec(),
            queue: None,
            body: None,
            exchange: String::new(),
            mandatory: false,
            immediate: false,
            delivery_mode: DeliveryMode::Transient,
            timeouts: Timeouts::default(),
            seed: 0,
            forced_tag: None,
            params: ConnectionParams::default(),
        }
    }

    /// Expect these steps, `start` through `closed`.
    pub fn with_plan(mut self, plan: &[Step]) -> Self {
        self.plan = plan.to_vec();
        self
    }

    /// Use this queue instead of `test-<name>-<pid>`.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Publish this body instead of a generated one.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Publish to this exchange.
    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    /// Publish with the mandatory flag.
    pub fn with_mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }

    /// Publish with the immediate flag.
    pub fn with_immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Publish with this delivery mode.
    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    /// Override deadlines and delays.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Seed for the generated body and the tokio adapter's environment.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Settle `tag` instead of the tag the broker handed out.
    pub fn with_delivery_tag(mut self, tag: DeliveryTag) -> Self {
        self.forced_tag = Some(tag);
        self
    }

    /// Connect with these parameters.
    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Scenario name.
    pub fn name(&self) -> &str {
        &self.scenario.name
    }

    /// Seed this scenario runs with.
    pub fn seed(&self) -> u64 {
        self.scenario.seed
    }

    /// Queue the scenario declares, namespaced by scenario and process.
    pub fn queue_name(&self) -> String {
        self.scenario
            .queue
            .clone()
            .unwrap_or_else(|| format!("test-{}-{}", self.scenario.name, std::process::id()))
    }

    /// Execute against a fresh [`SimConnection`] with default latency.
    ///
    /// # Errors
    ///
    /// Returns `SequencingDefect` for harness bugs. Timeouts, protocol
    /// errors and failed assertions are reported in the [`Report`].
    pub fn run(self) -> Result<Report, HarnessError> {
        let mut conn = SimConnection::new(SimConfig::default());
        self.run_with(&mut conn)
    }

    /// Execute against a caller-provided synchronous loop.
    ///
    /// # Errors
    ///
    /// Same as [`RunnableScenario::run`].
    pub fn run_with<C>(self, conn: &mut C) -> Result<Report, HarnessError>
    where
        C: AsyncConnection + LoopControl + EventLoop,
    {
        let (name, params, sequencer, oracle) = self.prepare()?;
        Driver::new(conn, name, params, sequencer, oracle).run()
    }

    /// Execute against a caller-provided async loop.
    ///
    /// # Errors
    ///
    /// Same as [`RunnableScenario::run`].
    pub async fn run_async<C>(self, conn: &mut C) -> Result<Report, HarnessError>
    where
        C: AsyncConnection + LoopControl + AsyncEventLoop,
    {
        let (name, params, sequencer, oracle) = self.prepare()?;
        Driver::new(conn, name, params, sequencer, oracle).run_async().await
    }

    fn prepare(self) -> Result<(String, ConnectionParams, Sequencer, OracleFn), HarnessError> {
        let queue = self.queue_name();
        let Self { scenario, oracle } = self;

        let body = match scenario.body {
            Some(body) => body,
            None => {
                let env = SimEnv::with_seed(scenario.seed);
                Bytes::from(format!("test-message-{}: {:016x}", scenario.name, env.random_u64()))
            },
        };

        let script = Script {
            queue,
            body,
            exchange: scenario.exchange,
            mandatory: scenario.mandatory,
            immediate: scenario.immediate,
            delivery_mode: scenario.delivery_mode,
            timeouts: scenario.timeouts,
            forced_tag: scenario.forced_tag,
            ..Script::new(String::new(), Bytes::new())
        };

        let sequencer = Sequencer::new(scenario.plan, script)?;
        Ok((scenario.name, scenario.params, sequencer, oracle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::oracle;

    #[test]
    fn scenario_requires_oracle() {
        // This should compile - oracle provided
        let _scenario = Scenario::new("x").oracle(Box::new(|_evidence| Ok(())));
    }

    #[test]
    fn queue_is_namespaced_by_scenario_and_process() {
        let scenario = Scenario::new("send-get-reject-get").oracle(oracle::min_records(0));
        assert_eq!(
            scenario.queue_name(),
            format!("test-send-get-reject-get-{}", std::process::id())
        );

        let named = Scenario::new("x").with_queue("q").oracle(oracle::min_records(0));
        assert_eq!(named.queue_name(), "q");
    }

    #[test]
    fn generated_body_depends_on_seed() {
        let published = |seed| {
            Scenario::new("x")
                .with_seed(seed)
                .oracle(oracle::min_records(0))
                .run()
                .expect("scenario should run")
                .published
        };

        assert_eq!(published(7), published(7));
        assert_ne!(published(7), published(8));
        assert!(published(7)[0].starts_with(b"test-message-x: "));
    }

    #[test]
    fn invalid_plan_is_a_defect() {
        let err = Scenario::new("x")
            .with_plan(&[Step::Start, Step::GotFirst, Step::Closed])
            .oracle(oracle::min_records(0))
            .run()
            .unwrap_err();
        assert!(err.is_defect());
    }
}
