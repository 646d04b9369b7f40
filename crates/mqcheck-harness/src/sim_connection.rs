//! Deterministic discrete-event connection.
//!
//! `SimConnection` implements [`AsyncConnection`] and [`EventLoop`] over an
//! in-process [`Broker`]. Nothing sleeps: replies and timers are scheduled on
//! a virtual clock and handed out in time order.
//!
//! # Ordering
//!
//! ```text
//! (time, class, sequence)
//!   time      virtual instant the event becomes due
//!   class     replies (0) before timers (1) at the same instant
//!   sequence  insertion order
//! ```
//!
//! A reply and a watchdog that become due in the same tick therefore always
//! resolve in the reply's favour. Removed timers stay in the heap and are
//! skipped when popped.
//!
//! # Fault injection
//!
//! [`SimConfig`] sets per-operation latency and can drop an operation's
//! replies entirely, which is how timeouts are provoked.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    time::{Duration, Instant},
};

use mqcheck_core::{
    capability::{AsyncConnection, EventLoop, LoopControl, LoopEvent, TimerHandle, TimerHost},
    protocol::{ConnectionParams, DeliveryTag, ProtocolFault, Publish, QueueDeclare, ReplyCode},
};

use crate::broker::Broker;

/// A request the client can make, for latency and drop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Operation {
    /// `connection.open`
    Connect,
    /// `channel.open`
    OpenChannel,
    /// `queue.declare`
    DeclareQueue,
    /// `basic.publish`
    Publish,
    /// `basic.get`
    Get,
    /// `basic.reject`
    Reject,
    /// `basic.ack`
    Ack,
    /// `connection.close`
    Close,
}

/// Latency and fault configuration for [`SimConnection`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Latency for operations without an override
    pub default_latency: Duration,
    /// Per-operation latency overrides
    pub latency: HashMap<Operation, Duration>,
    /// Operations whose replies are never delivered
    pub dropped: HashSet<Operation>,
    /// Events due after this much virtual time are not delivered
    pub max_virtual_time: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            default_latency: Duration::from_millis(5),
            latency: HashMap::new(),
            dropped: HashSet::new(),
            max_virtual_time: Duration::from_secs(60),
        }
    }
}

impl SimConfig {
    /// Override the latency of one operation.
    pub fn with_latency(mut self, operation: Operation, latency: Duration) -> Self {
        self.latency.insert(operation, latency);
        self
    }

    /// Set the latency of every operation without an override.
    pub fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Never deliver replies to `operation`.
    pub fn with_dropped(mut self, operation: Operation) -> Self {
        self.dropped.insert(operation);
        self
    }

    pub(crate) fn latency_of(&self, operation: Operation) -> Duration {
        self.latency.get(&operation).copied().unwrap_or(self.default_latency)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scheduled {
    Reply(LoopEvent),
    Timer(TimerHandle),
}

impl Scheduled {
    fn class(&self) -> u8 {
        match self {
            Self::Reply(_) => 0,
            Self::Timer(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledEvent {
    at: Duration,
    sequence: u64,
    event: Scheduled,
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap; reverse every key so the earliest pops first
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.event.class().cmp(&self.event.class()))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Discrete-event connection over an in-memory broker.
#[derive(Debug)]
pub struct SimConnection {
    config: SimConfig,
    broker: Broker,
    epoch: Instant,
    clock: Duration,
    heap: BinaryHeap<ScheduledEvent>,
    live_timers: HashSet<TimerHandle>,
    next_sequence: u64,
    next_timer: u64,
    connected: bool,
    closing: bool,
    close_handler: bool,
    running: bool,
    stop_calls: usize,
}

impl SimConnection {
    /// Connection to a fresh broker.
    pub fn new(config: SimConfig) -> Self {
        Self::with_broker(Broker::new(), config)
    }

    /// Connection to a prepared broker.
    pub fn with_broker(broker: Broker, config: SimConfig) -> Self {
        Self {
            config,
            broker,
            epoch: Instant::now(),
            clock: Duration::ZERO,
            heap: BinaryHeap::new(),
            live_timers: HashSet::new(),
            next_sequence: 0,
            next_timer: 0,
            connected: false,
            closing: false,
            close_handler: false,
            running: false,
            stop_calls: 0,
        }
    }

    /// Virtual time since the connection was created.
    pub fn elapsed(&self) -> Duration {
        self.clock
    }

    /// The broker behind this connection.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Timers scheduled and not yet fired or removed.
    pub fn live_timers(&self) -> usize {
        self.live_timers.len()
    }

    fn schedule(&mut self, at: Duration, event: Scheduled) {
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent { at, sequence: self.next_sequence, event });
    }

    fn submit(
        &mut self,
        operation: Operation,
        call: impl FnOnce(&mut Broker) -> Vec<LoopEvent>,
    ) -> Result<(), ProtocolFault> {
        if operation != Operation::Connect && !self.connected {
            return Err(ProtocolFault::connection(
                ReplyCode::CHANNEL_ERROR,
                format!("{:?} on a connection that is not open", operation),
            ));
        }

        let replies = call(&mut self.broker);

        if self.config.dropped.contains(&operation) {
            tracing::debug!(?operation, dropped = replies.len(), "dropping replies");
            return Ok(());
        }

        let at = self.clock + self.config.latency_of(operation);
        for reply in replies {
            self.schedule(at, Scheduled::Reply(reply));
        }
        Ok(())
    }
}

impl TimerHost for SimConnection {
    fn add_timer(&mut self, delay: Duration) -> TimerHandle {
        self.next_timer += 1;
        let handle = TimerHandle(self.next_timer);
        self.live_timers.insert(handle);
        self.schedule(self.clock + delay, Scheduled::Timer(handle));
        handle
    }

    fn remove_timer(&mut self, handle: TimerHandle) -> bool {
        self.live_timers.remove(&handle)
    }

    fn now(&self) -> Instant {
        self.epoch + self.clock
    }
}

impl AsyncConnection for SimConnection {
    fn connect(&mut self, params: &ConnectionParams) -> Result<(), ProtocolFault> {
        self.submit(Operation::Connect, |broker| broker.connect(params))
    }

    fn open_channel(&mut self) -> Result<(), ProtocolFault> {
        self.submit(Operation::OpenChannel, Broker::open_channel)
    }

    fn declare_queue(&mut self, declare: &QueueDeclare) -> Result<(), ProtocolFault> {
        self.submit(Operation::DeclareQueue, |broker| broker.declare_queue(declare))
    }

    fn publish(&mut self, publish: &Publish) -> Result<(), ProtocolFault> {
        self.submit(Operation::Publish, |broker| broker.publish(publish))
    }

    fn get(&mut self, queue: &str) -> Result<(), ProtocolFault> {
        self.submit(Operation::Get, |broker| broker.get(queue))
    }

    fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ProtocolFault> {
        self.submit(Operation::Reject, |broker| broker.reject(tag, requeue))
    }

    fn acknowledge(&mut self, tag: DeliveryTag) -> Result<(), ProtocolFault> {
        self.submit(Operation::Ack, |broker| broker.acknowledge(tag))
    }

    fn add_close_handler(&mut self) {
        self.close_handler = true;
    }

    fn close(&mut self) -> Result<(), ProtocolFault> {
        if self.closing {
            return Ok(());
        }
        self.submit(Operation::Close, Broker::close)?;
        self.closing = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected && !self.closing
    }
}

impl LoopControl for SimConnection {
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

impl EventLoop for SimConnection {
    fn next_event(&mut self) -> Option<LoopEvent> {
        while self.running {
            let scheduled = self.heap.pop()?;

            if scheduled.at > self.config.max_virtual_time {
                tracing::warn!(
                    at = ?scheduled.at,
                    budget = ?self.config.max_virtual_time,
                    "virtual time budget exhausted"
                );
                self.heap.clear();
                return None;
            }
            self.clock = self.clock.max(scheduled.at);

            match scheduled.event {
                Scheduled::Timer(handle) => {
                    if self.live_timers.remove(&handle) {
                        return Some(LoopEvent::Timer(handle));
                    }
                },
                Scheduled::Reply(reply) => {
                    match &reply {
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
                    return Some(reply);
                },
            }
        }
        None
    }
}
