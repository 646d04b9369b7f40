//! Scenario driver.
//!
//! Owns one connection for the length of one scenario. Every loop event is
//! routed through [`Driver::dispatch`]:
//!
//! ```text
//! LoopEvent::Timer(h) ── supervisor owns h ──> timed-out, close
//!                     ── h was scheduled ───> sequencer (delayed work)
//!                     ── otherwise ─────────> stale, ignored
//! completion events ─────────────────────────> sequencer ──> StepActions
//! GetEmpty ──────────────────────────────────> failed-assertion, close
//! Returned / ChannelClosed ──────────────────> protocol-error, close
//! Closed ────────────────────────────────────> verdict, stop (exactly once)
//! ```
//!
//! Once an outcome is terminal every event except `Closed` is a late reply
//! and is ignored. If the loop drains with nothing terminal, the pending step
//! is reported as timed out.

use std::{collections::HashMap, time::Duration, time::Instant};

use mqcheck_core::{
    capability::{AsyncConnection, AsyncEventLoop, EventLoop, LoopControl, LoopEvent, TimerHandle},
    protocol::{ConnectionParams, ProtocolFault, ReplyCode},
    sequencer::{Delayed, StepAction, StepEvent},
    HarnessError, Outcome, Sequencer, Step, TimerSupervisor,
};

use crate::scenario::{Evidence, OracleFn, Report};

/// Runs one scenario over a borrowed connection.
pub struct Driver<'c, C> {
    conn: &'c mut C,
    scenario: String,
    params: ConnectionParams,
    sequencer: Sequencer,
    supervisor: TimerSupervisor,
    delayed: HashMap<TimerHandle, Delayed>,
    oracle: Option<OracleFn>,
    outcome: Outcome,
    stop_issued: bool,
    started_at: Option<Instant>,
}

impl<'c, C> Driver<'c, C>
where
    C: AsyncConnection + LoopControl,
{
    /// Create a driver. Nothing is sent until the run starts.
    pub fn new(
        conn: &'c mut C,
        scenario: impl Into<String>,
        params: ConnectionParams,
        sequencer: Sequencer,
        oracle: OracleFn,
    ) -> Self {
        Self {
            conn,
            scenario: scenario.into(),
            params,
            sequencer,
            supervisor: TimerSupervisor::new(),
            delayed: HashMap::new(),
            oracle: Some(oracle),
            outcome: Outcome::Pending,
            stop_issued: false,
            started_at: None,
        }
    }

    /// Pump a synchronous event loop until it stops.
    ///
    /// # Errors
    ///
    /// Returns `SequencingDefect` if the harness itself misbehaved. Every
    /// other failure is reported as the report's outcome.
    pub fn run(mut self) -> Result<Report, HarnessError>
    where
        C: EventLoop,
    {
        let result = self.pump();
        self.finish(result)
    }

    /// Pump an async event loop until it stops.
    ///
    /// # Errors
    ///
    /// Same as [`Driver::run`].
    pub async fn run_async(mut self) -> Result<Report, HarnessError>
    where
        C: AsyncEventLoop,
    {
        let result = self.pump_async().await;
        self.finish(result)
    }

    fn pump(&mut self) -> Result<(), HarnessError>
    where
        C: EventLoop,
    {
        self.begin()?;
        while self.conn.is_running() {
            let Some(event) = EventLoop::next_event(&mut *self.conn) else {
                break;
            };
            self.dispatch(event)?;
        }
        Ok(())
    }

    async fn pump_async(&mut self) -> Result<(), HarnessError>
    where
        C: AsyncEventLoop,
    {
        self.begin()?;
        while self.conn.is_running() {
            let Some(event) = AsyncEventLoop::next_event(&mut *self.conn).await else {
                break;
            };
            self.dispatch(event)?;
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), HarnessError> {
        tracing::info!(scenario = %self.scenario, plan = ?self.sequencer.plan(), "scenario starting");

        self.conn.add_close_handler();
        self.conn.start();
        self.started_at = Some(self.conn.now());

        let actions = self.sequencer.start()?;
        self.execute(actions)
    }

    /// Route one loop event.
    fn dispatch(&mut self, event: LoopEvent) -> Result<(), HarnessError> {
        if self.outcome.is_terminal() && !matches!(event, LoopEvent::Closed { .. }) {
            tracing::debug!(?event, outcome = self.outcome.label(), "ignoring late event");
            return Ok(());
        }

        match event {
            LoopEvent::Timer(handle) => self.on_timer(handle),
            LoopEvent::Connected => self.feed(StepEvent::Connected),
            LoopEvent::ChannelOpened { channel } => {
                tracing::debug!(channel, "channel opened");
                self.feed(StepEvent::ChannelOpened)
            },
            LoopEvent::QueueDeclared { queue, message_count, .. } => {
                tracing::debug!(%queue, message_count, "queue declared");
                self.feed(StepEvent::QueueDeclared { queue })
            },
            LoopEvent::PublishConfirmed => self.feed(StepEvent::PublishConfirmed),
            LoopEvent::Delivered(delivery) => self.feed(StepEvent::Delivery(delivery)),
            LoopEvent::GetEmpty { queue } => {
                let step = self.pending_step();
                self.fail(HarnessError::AssertionFailure(format!(
                    "queue {} was empty at step {}",
                    queue, step
                )))
            },
            LoopEvent::Rejected { tag } => self.feed(StepEvent::Rejected { tag }),
            LoopEvent::Acked { tag } => self.feed(StepEvent::Acked { tag }),
            LoopEvent::Returned(fault) | LoopEvent::ChannelClosed(fault) => {
                self.fail(HarnessError::Protocol(fault))
            },
            LoopEvent::Closed { fault } => self.on_closed(fault),
        }
    }

    fn on_timer(&mut self, handle: TimerHandle) -> Result<(), HarnessError> {
        if let Some(expired) = self.supervisor.expire(handle) {
            return self.fail(HarnessError::Timeout { step: expired.step, after: expired.timeout });
        }

        if let Some(delayed) = self.delayed.remove(&handle) {
            tracing::debug!(?delayed, handle = handle.0, "delayed work due");
            return self.feed(StepEvent::Delayed(delayed));
        }

        tracing::debug!(handle = handle.0, "ignoring stale timer");
        Ok(())
    }

    fn on_closed(&mut self, fault: Option<ProtocolFault>) -> Result<(), HarnessError> {
        self.disarm();

        if self.outcome.is_terminal() {
            self.stop();
            return Ok(());
        }

        if let Some(fault) = fault {
            tracing::warn!(scenario = %self.scenario, %fault, "connection closed by broker");
            self.sequencer.halt();
            self.settle(Outcome::ProtocolError { fault });
        } else if self.sequencer.pending() == Some(Step::Closed) {
            let actions = self.sequencer.handle(StepEvent::Closed)?;
            self.execute(actions)?;
            let verdict = self.verdict();
            self.settle(verdict);
        } else {
            let step = self.pending_step();
            self.sequencer.halt();
            self.settle(Outcome::ProtocolError {
                fault: ProtocolFault::connection(
                    ReplyCode::CONNECTION_FORCED,
                    format!("connection closed while {} was pending", step),
                ),
            });
        }

        self.stop();
        Ok(())
    }

    fn verdict(&mut self) -> Outcome {
        let Some(oracle) = self.oracle.take() else {
            return Outcome::Passed;
        };

        match oracle(&Evidence::from_sequencer(&self.sequencer)) {
            Ok(()) => Outcome::Passed,
            Err(reason) => Outcome::FailedAssertion { reason },
        }
    }

    fn feed(&mut self, event: StepEvent) -> Result<(), HarnessError> {
        let actions = self.sequencer.handle(event)?;
        self.execute(actions)
    }

    fn execute(&mut self, actions: Vec<StepAction>) -> Result<(), HarnessError> {
        for action in actions {
            if self.outcome.is_terminal() {
                tracing::debug!(?action, "skipping action after terminal outcome");
                break;
            }

            match action {
                StepAction::Guard { step, timeout } => {
                    self.supervisor.arm(&mut *self.conn, step, timeout)?;
                },
                StepAction::Release => {
                    self.supervisor.release(&mut *self.conn);
                },
                StepAction::Schedule { delay, action } => {
                    let handle = self.conn.add_timer(delay);
                    self.delayed.insert(handle, action);
                },
                StepAction::Connect => {
                    let sent = self.conn.connect(&self.params);
                    self.request(sent)?;
                },
                StepAction::OpenChannel => {
                    let sent = self.conn.open_channel();
                    self.request(sent)?;
                },
                StepAction::DeclareQueue(declare) => {
                    let sent = self.conn.declare_queue(&declare);
                    self.request(sent)?;
                },
                StepAction::Publish(publish) => {
                    let sent = self.conn.publish(&publish);
                    self.request(sent)?;
                },
                StepAction::Get { queue } => {
                    let sent = self.conn.get(&queue);
                    self.request(sent)?;
                },
                StepAction::Reject { tag, requeue } => {
                    let sent = self.conn.reject(tag, requeue);
                    self.request(sent)?;
                },
                StepAction::Acknowledge { tag } => {
                    let sent = self.conn.acknowledge(tag);
                    self.request(sent)?;
                },
                StepAction::Close => self.shutdown(),
            }
        }
        Ok(())
    }

    /// Faults raised synchronously end the scenario like delivered ones.
    fn request(&mut self, sent: Result<(), ProtocolFault>) -> Result<(), HarnessError> {
        match sent {
            Ok(()) => Ok(()),
            Err(fault) => self.fail(HarnessError::Protocol(fault)),
        }
    }

    /// Record a terminal failure and start shutting down.
    fn fail(&mut self, err: HarnessError) -> Result<(), HarnessError> {
        let Some(outcome) = err.outcome() else {
            return Err(err);
        };

        tracing::warn!(scenario = %self.scenario, error = %err, "scenario failed");
        self.settle(outcome);
        self.disarm();
        self.sequencer.halt();
        self.shutdown();
        Ok(())
    }

    fn settle(&mut self, outcome: Outcome) {
        if self.outcome.is_terminal() {
            return;
        }
        self.outcome = outcome;
    }

    /// Release the watchdog and drop scheduled work.
    fn disarm(&mut self) {
        self.supervisor.release(&mut *self.conn);
        for handle in self.delayed.drain().map(|(handle, _)| handle).collect::<Vec<_>>() {
            self.conn.remove_timer(handle);
        }
    }

    /// Close the connection, or stop right away if there is nothing to close.
    fn shutdown(&mut self) {
        if !self.conn.is_open() {
            self.stop();
            return;
        }

        if let Err(fault) = self.conn.close() {
            tracing::warn!(%fault, "close failed");
            self.stop();
        }
    }

    fn stop(&mut self) {
        if self.stop_issued {
            return;
        }
        self.stop_issued = true;
        self.conn.stop();
    }

    fn pending_step(&self) -> Step {
        self.sequencer.pending().unwrap_or_else(|| self.sequencer.state())
    }

    fn finish(mut self, result: Result<(), HarnessError>) -> Result<Report, HarnessError> {
        if let Err(err) = result {
            tracing::error!(scenario = %self.scenario, error = %err, "harness defect");
            self.disarm();
            self.sequencer.halt();
            if self.conn.is_open() {
                let _ = self.conn.close();
            }
            self.stop();
            return Err(err);
        }

        if !self.outcome.is_terminal() {
            let step = self.pending_step();
            let after = self.supervisor.pending().map_or(Duration::ZERO, |pending| pending.timeout);
            tracing::warn!(scenario = %self.scenario, %step, "event loop drained before a verdict");
            self.settle(Outcome::TimedOut { step, after });
            self.disarm();
            self.sequencer.halt();
        }

        self.stop();

        let elapsed = self
            .started_at
            .map_or(Duration::ZERO, |started| self.conn.now().saturating_duration_since(started));

        tracing::info!(scenario = %self.scenario, outcome = %self.outcome, ?elapsed, "scenario finished");

        Ok(Report {
            scenario: self.scenario,
            queue: self.sequencer.script().queue.clone(),
            outcome: self.outcome,
            steps: self.sequencer.visited().to_vec(),
            records: self.sequencer.recorder().snapshot().to_vec(),
            published: self.sequencer.published().to_vec(),
            watchdogs_armed: self.supervisor.armed_count(),
            expirations: self.supervisor.expired_count(),
            stop_calls: self.conn.stop_calls(),
            elapsed,
        })
    }
}
