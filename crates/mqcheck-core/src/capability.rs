//! The asynchronous connection capability the harness consumes.
//!
//! The harness never speaks the wire protocol. It issues requests through
//! [`AsyncConnection`] and learns about completions from [`LoopEvent`]s that
//! the connection's event loop hands back, one at a time, in delivery order.
//!
//! # Lifecycle
//!
//! ```text
//! Driver                              Connection / event loop
//! add_close_handler()  ─────────────>
//! start()              ─────────────>
//! connect()            ─────────────>  ... LoopEvent::Connected
//! open_channel()       ─────────────>  ... LoopEvent::ChannelOpened
//! add_timer(2s)        ─────────────>  ... LoopEvent::Timer(handle) unless removed
//! close()              ─────────────>  ... LoopEvent::Closed
//! stop()               ─────────────>  next_event() returns None
//! ```
//!
//! # Implementations
//!
//! - **`SimConnection`** (harness): deterministic discrete-event loop with a
//!   virtual clock
//! - **`TokioConnection`** (harness): tokio reactor, broker in a spawned task
//!
//! # Ordering
//!
//! Delivery order is the only source of truth for races. Implementations
//! must hand out a reply before a timer that becomes due at the same instant,
//! and must never deliver a timer after `remove_timer` returned for it.

use std::{future::Future, time::Duration, time::Instant};

use crate::protocol::{
    ConnectionParams, Delivery, DeliveryTag, ProtocolFault, Publish, QueueDeclare,
};

/// Handle identifying a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Single-shot timers on the event loop.
pub trait TimerHost {
    /// Schedule a [`LoopEvent::Timer`] `delay` from now.
    fn add_timer(&mut self, delay: Duration) -> TimerHandle;

    /// Unschedule a timer.
    ///
    /// Returns `false` if the handle already fired, was already removed, or
    /// never existed. Never panics.
    fn remove_timer(&mut self, handle: TimerHandle) -> bool;

    /// The loop's notion of the current time.
    fn now(&self) -> Instant;
}

/// Requests a scenario can make. Completions arrive as [`LoopEvent`]s.
///
/// Methods return `Err` only for faults detected synchronously (for
/// example, using a channel that was never opened). Everything the broker
/// decides is delivered as an event.
pub trait AsyncConnection: TimerHost {
    /// Start connecting. Completes with [`LoopEvent::Connected`].
    fn connect(&mut self, params: &ConnectionParams) -> Result<(), ProtocolFault>;

    /// Open the channel. Completes with [`LoopEvent::ChannelOpened`].
    fn open_channel(&mut self) -> Result<(), ProtocolFault>;

    /// Declare a queue. Completes with [`LoopEvent::QueueDeclared`].
    fn declare_queue(&mut self, declare: &QueueDeclare) -> Result<(), ProtocolFault>;

    /// Publish a message. Completes with [`LoopEvent::PublishConfirmed`], or
    /// [`LoopEvent::Returned`] / [`LoopEvent::ChannelClosed`].
    fn publish(&mut self, publish: &Publish) -> Result<(), ProtocolFault>;

    /// `basic.get`. Completes with [`LoopEvent::Delivered`] or
    /// [`LoopEvent::GetEmpty`].
    fn get(&mut self, queue: &str) -> Result<(), ProtocolFault>;

    /// Negatively acknowledge a delivery. Completes with
    /// [`LoopEvent::Rejected`]; an unknown tag closes the channel.
    fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ProtocolFault>;

    /// Acknowledge a delivery. Completes with [`LoopEvent::Acked`]; an
    /// unknown tag closes the channel.
    fn acknowledge(&mut self, tag: DeliveryTag) -> Result<(), ProtocolFault>;

    /// Ask for a [`LoopEvent::Closed`] once the connection has fully closed.
    fn add_close_handler(&mut self);

    /// Start an orderly close.
    fn close(&mut self) -> Result<(), ProtocolFault>;

    /// Whether the connection is open (connected and not closing).
    fn is_open(&self) -> bool;
}

/// Completion or timer event delivered by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Connection established
    Connected,
    /// Channel opened
    ChannelOpened {
        /// Channel number
        channel: u16,
    },
    /// Queue declared
    QueueDeclared {
        /// Queue name as confirmed by the broker
        queue: String,
        /// Messages already in the queue
        message_count: u32,
        /// Consumers on the queue
        consumer_count: u32,
    },
    /// Broker confirmed a publish
    PublishConfirmed,
    /// `basic.get` returned a message
    Delivered(Delivery),
    /// `basic.get` found the queue empty
    GetEmpty {
        /// Queue that was empty
        queue: String,
    },
    /// Reject went out
    Rejected {
        /// Rejected delivery
        tag: DeliveryTag,
    },
    /// Ack went out
    Acked {
        /// Acknowledged delivery
        tag: DeliveryTag,
    },
    /// Mandatory message could not be routed
    Returned(ProtocolFault),
    /// Broker closed the channel
    ChannelClosed(ProtocolFault),
    /// Connection fully closed; `Some` if the broker initiated it
    Closed {
        /// Fault the broker closed with
        fault: Option<ProtocolFault>,
    },
    /// A timer fired
    Timer(TimerHandle),
}

/// Start/stop control shared by sync and async loops.
pub trait LoopControl {
    /// Mark the loop running. Events are only delivered while running.
    fn start(&mut self);

    /// Stop the loop. Stopping a stopped loop is a no-op.
    fn stop(&mut self);

    /// Whether the loop is running.
    fn is_running(&self) -> bool;

    /// How many times `stop` has been called, no-ops included.
    fn stop_calls(&self) -> usize;
}

/// Event loop pumped synchronously.
pub trait EventLoop: LoopControl {
    /// Next event in delivery order, or `None` once stopped or drained.
    fn next_event(&mut self) -> Option<LoopEvent>;
}

/// Event loop pumped from async code.
pub trait AsyncEventLoop: LoopControl {
    /// Next event in delivery order, or `None` once stopped or drained.
    fn next_event(&mut self) -> impl Future<Output = Option<LoopEvent>>;
}
