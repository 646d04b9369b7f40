//! Tokio reactor connection.
//!
//! The broker runs in a spawned task and talks to the connection over
//! unbounded channels. Each request sleeps its configured latency through the
//! [`Environment`] before the broker answers, so under turmoil the whole run
//! happens in simulated time.
//!
//! ```text
//! TokioConnection                         broker task
//!   request ──── mpsc::UnboundedSender ──>  env.sleep(latency)
//!                                           broker.<operation>()
//!   next_event <─ mpsc::UnboundedReceiver ─ Frame::Event(..)*, Frame::Done
//! ```
//!
//! `next_event` waits on the reply channel and the earliest timer with a
//! `biased` select, reply first. When a timer wins it yields once and drains
//! a reply that became ready in the same tick before reporting the timer.
//!
//! Every request is answered by a trailing `Frame::Done`; once every request
//! is done and no timer is live, the loop is drained and `next_event` returns
//! `None`.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use mqcheck_core::{
    capability::{AsyncConnection, AsyncEventLoop, LoopControl, LoopEvent, TimerHandle, TimerHost},
    env::Environment,
    protocol::{ConnectionParams, DeliveryTag, ProtocolFault, Publish, QueueDeclare, ReplyCode},
    HarnessError,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    broker::Broker,
    scenario::{Report, RunnableScenario},
    sim_connection::{Operation, SimConfig},
    sim_env::SimEnv,
};

/// Errors from running a scenario in a turmoil simulation.
#[derive(Error, Debug)]
pub enum RunError {
    /// The scenario itself failed with a harness defect
    #[error(transparent)]
    Harness(#[from] HarnessError),

    /// The simulation could not run the scenario to completion
    #[error("simulation failed: {0}")]
    Simulation(String),
}

#[derive(Debug)]
enum Request {
    Connect(ConnectionParams),
    OpenChannel,
    DeclareQueue(QueueDeclare),
    Publish(Publish),
    Get(String),
    Reject(DeliveryTag, bool),
    Ack(DeliveryTag),
    Close,
}

impl Request {
    fn operation(&self) -> Operation {
        match self {
            Self::Connect(_) => Operation::Connect,
            Self::OpenChannel => Operation::OpenChannel,
            Self::DeclareQueue(_) => Operation::DeclareQueue,
            Self::Publish(_) => Operation::Publish,
            Self::Get(_) => Operation::Get,
            Self::Reject(..) => Operation::Reject,
            Self::Ack(_) => Operation::Ack,
            Self::Close => Operation::Close,
        }
    }
}

#[derive(Debug)]
enum Frame {
    Event(LoopEvent),
    Done,
}

enum Woke {
    Frame(Option<Frame>),
    Timer(TimerHandle),
}

/// Connection whose broker runs as a tokio task.
#[derive(Debug)]
pub struct TokioConnection {
    requests: mpsc::UnboundedSender<Request>,
    replies: mpsc::UnboundedReceiver<Frame>,
    timers: BTreeMap<TimerHandle, tokio::time::Instant>,
    next_timer: u64,
    in_flight: usize,
    connected: bool,
    closing: bool,
    close_handler: bool,
    running: bool,
    stop_calls: usize,
}

impl TokioConnection {
    /// Spawn the broker task and return the connection to it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<E: Environment>(env: E, broker: Broker, config: SimConfig) -> Self {
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, replies) = mpsc::unbounded_channel();

        tokio::spawn(serve(env, broker, config, request_rx, reply_tx));

        Self {
            requests,
            replies,
            timers: BTreeMap::new(),
            next_timer: 0,
            in_flight: 0,
            connected: false,
            closing: false,
            close_handler: false,
            running: false,
            stop_calls: 0,
        }
    }

    fn send(&mut self, request: Request) -> Result<(), ProtocolFault> {
        if !matches!(request, Request::Connect(_)) && !self.connected {
            return Err(ProtocolFault::connection(
                ReplyCode::CHANNEL_ERROR,
                format!("{:?} on a connection that is not open", request.operation()),
            ));
        }

        self.requests.send(request).map_err(|_| {
            ProtocolFault::connection(ReplyCode::CONNECTION_FORCED, "broker task has stopped")
        })?;
        self.in_flight += 1;
        Ok(())
    }

    fn next_due(&self) -> Option<(TimerHandle, tokio::time::Instant)> {
        self.timers
            .iter()
            .min_by_key(|(handle, deadline)| (**deadline, **handle))
            .map(|(handle, deadline)| (*handle, *deadline))
    }
}

async fn serve<E: Environment>(
    env: E,
    mut broker: Broker,
    config: SimConfig,
    mut requests: mpsc::UnboundedReceiver<Request>,
    replies: mpsc::UnboundedSender<Frame>,
) {
    while let Some(request) = requests.recv().await {
        let operation = request.operation();
        env.sleep(config.latency_of(operation)).await;

        let events = match request {
            Request::Connect(params) => broker.connect(&params),
            Request::OpenChannel => broker.open_channel(),
            Request::DeclareQueue(declare) => broker.declare_queue(&declare),
            Request::Publish(publish) => broker.publish(&publish),
            Request::Get(queue) => broker.get(&queue),
            Request::Reject(tag, requeue) => broker.reject(tag, requeue),
            Request::Ack(tag) => broker.acknowledge(tag),
            Request::Close => broker.close(),
        };

        let events = if config.dropped.contains(&operation) {
            tracing::debug!(?operation, dropped = events.len(), "dropping replies");
            Vec::new()
        } else {
            events
        };

        for frame in events.into_iter().map(Frame::Event).chain([Frame::Done]) {
            if replies.send(frame).is_err() {
                return;
            }
        }
    }
}

impl TimerHost for TokioConnection {
    fn add_timer(&mut self, delay: Duration) -> TimerHandle {
        self.next_timer += 1;
        let handle = TimerHandle(self.next_timer);
        self.timers.insert(handle, tokio::time::Instant::now() + delay);
        handle
    }

    fn remove_timer(&mut self, handle: TimerHandle) -> bool {
        self.timers.remove(&handle).is_some()
    }

    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

impl AsyncConnection for TokioConnection {
    fn connect(&mut self, params: &ConnectionParams) -> Result<(), ProtocolFault> {
        self.send(Request::Connect(params.clone()))
    }

    fn open_channel(&mut self) -> Result<(), ProtocolFault> {
        self.send(Request::OpenChannel)
    }

    fn declare_queue(&mut self, declare: &QueueDeclare) -> Result<(), ProtocolFault> {
        self.send(Request::DeclareQueue(declare.clone()))
    }

    fn publish(&mut self, publish: &Publish) -> Result<(), ProtocolFault> {
        self.send(Request::Publish(publish.clone()))
    }

    fn get(&mut self, queue: &str) -> Result<(), ProtocolFault> {
        self.send(Request::Get(queue.to_string()))
    }

    fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ProtocolFault> {
        self.send(Request::Reject(tag, requeue))
    }

    fn acknowledge(&mut self, tag: DeliveryTag) -> Result<(), ProtocolFault> {
        self.send(Request::Ack(tag))
    }

    fn add_close_handler(&mut self) {
        self.close_handler = true;
    }

    fn close(&mut self) -> Result<(), ProtocolFault> {
        if self.closing {
            return Ok(());
        }
        self.send(Request::Close)?;
        self.closing = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected && !self.closing
    }
}

impl LoopControl for TokioConnection {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.stop_calls += 1;
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn stop_calls(&self) -> usize {
        self.stop_calls
    }
}

impl AsyncEventLoop for TokioConnection {
    async fn next_event(&mut self) -> Option<LoopEvent> {
        while self.running {
            let due = self.next_due();
            if self.in_flight == 0 && due.is_none() {
                return None;
            }

            let woke = match due {
                Some((handle, deadline)) => {
                    let waiting = self.in_flight > 0;
                    tokio::select! {
                        biased;
                        frame = self.replies.recv(), if waiting => Woke::Frame(frame),
                        () = tokio::time::sleep_until(deadline) => Woke::Timer(handle),
                    }
                },
                None => Woke::Frame(self.replies.recv().await),
            };

            let frame = match woke {
                Woke::Frame(frame) => frame,
                Woke::Timer(handle) => {
                    tokio::task::yield_now().await;
                    match self.replies.try_recv() {
                        Ok(frame) => Some(frame),
                        Err(_) => {
                            self.timers.remove(&handle);
                            return Some(LoopEvent::Timer(handle));
                        },
                    }
                },
            };

            match frame {
                None => {
                    tracing::warn!(in_flight = self.in_flight, "broker task stopped");
                    self.in_flight = 0;
                },
                Some(Frame::Done) => self.in_flight = self.in_flight.saturating_sub(1),
                Some(Frame::Event(event)) => {
                    match &event {
                        LoopEvent::Connected => self.connected = true,
                        LoopEvent::Closed { .. } => {
                            self.connected = false;
                            self.closing = false;
                            if !self.close_handler {
                                continue;
                            }
                        },
                        _ => {},
                    }
                    return Some(event);
                },
            }
        }
        None
    }
}

/// Run `scenario` over a [`TokioConnection`] inside a turmoil simulation.
///
/// The broker sleeps through a [`SimEnv`] seeded with the scenario's seed,
/// so latency is virtual and the run takes no wall-clock time.
///
/// # Errors
///
/// Returns [`RunError::Harness`] for harness defects and
/// [`RunError::Simulation`] if turmoil could not run the client.
pub fn run_under_turmoil(
    scenario: RunnableScenario,
    broker: Broker,
    config: SimConfig,
) -> Result<Report, RunError> {
    let mut sim = turmoil::Builder::new().simulation_duration(Duration::from_secs(600)).build();
    let slot: Arc<Mutex<Option<Result<Report, HarnessError>>>> = Arc::new(Mutex::new(None));

    let client_slot = Arc::clone(&slot);
    sim.client("mqcheck", async move {
        let env = SimEnv::with_seed(scenario.seed());
        let mut conn = TokioConnection::spawn(env, broker, config);
        let result = scenario.run_async(&mut conn).await;
        if let Ok(mut slot) = client_slot.lock() {
            *slot = Some(result);
        }
        Ok(())
    });

    sim.run().map_err(|e| RunError::Simulation(e.to_string()))?;

    let result = slot
        .lock()
        .map_err(|_| RunError::Simulation("result slot poisoned".to_string()))?
        .take()
        .ok_or_else(|| RunError::Simulation("client finished without a report".to_string()))?;

    Ok(result?)
}
