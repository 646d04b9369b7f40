//! Synchronous client variant.
//!
//! Same broker, no event loop: every call blocks until the broker answers
//! and faults come back as `Err` from the call that caused them instead of
//! arriving as loop events. There are no timers, so nothing here is
//! supervised.

use bytes::Bytes;
use mqcheck_core::{
    capability::LoopEvent,
    protocol::{
        ConnectionParams, Delivery, DeliveryTag, ProtocolFault, Publish, QueueDeclare, ReplyCode,
    },
};

use crate::broker::Broker;

/// Blocking connection to an in-memory broker.
#[derive(Debug)]
pub struct BlockingConnection {
    broker: Broker,
    open: bool,
}

impl BlockingConnection {
    /// Connect to a fresh broker.
    ///
    /// # Errors
    ///
    /// Returns the fault the broker refused the connection with.
    pub fn connect(params: &ConnectionParams) -> Result<Self, ProtocolFault> {
        Self::connect_to(Broker::new(), params)
    }

    /// Connect to a prepared broker.
    ///
    /// # Errors
    ///
    /// Returns the fault the broker refused the connection with.
    pub fn connect_to(mut broker: Broker, params: &ConnectionParams) -> Result<Self, ProtocolFault> {
        expect_one(broker.connect(params))?;
        Ok(Self { broker, open: true })
    }

    /// Open the channel.
    ///
    /// # Errors
    ///
    /// Fails if the connection is closed.
    pub fn channel(&mut self) -> Result<BlockingChannel<'_>, ProtocolFault> {
        self.ensure_open()?;
        expect_one(self.broker.open_channel())?;
        Ok(BlockingChannel { conn: self })
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Fails if the connection is already closed.
    pub fn close(mut self) -> Result<(), ProtocolFault> {
        self.ensure_open()?;
        self.open = false;
        expect_one(self.broker.close()).map(|_| ())
    }

    fn ensure_open(&self) -> Result<(), ProtocolFault> {
        if self.open {
            Ok(())
        } else {
            Err(ProtocolFault::connection(ReplyCode::CHANNEL_ERROR, "connection is closed"))
        }
    }

    fn call(&mut self, events: Vec<LoopEvent>) -> Result<LoopEvent, ProtocolFault> {
        let result = expect_one(events);
        if !self.broker.is_connected() {
            self.open = false;
        }
        result
    }
}

/// Channel on a [`BlockingConnection`].
#[derive(Debug)]
pub struct BlockingChannel<'c> {
    conn: &'c mut BlockingConnection,
}

impl BlockingChannel<'_> {
    /// Declare a queue. Returns the name the broker confirmed.
    ///
    /// # Errors
    ///
    /// Returns the fault that closed the channel.
    pub fn declare_queue(&mut self, declare: &QueueDeclare) -> Result<String, ProtocolFault> {
        self.conn.ensure_open()?;
        let events = self.conn.broker.declare_queue(declare);
        match self.conn.call(events)? {
            LoopEvent::QueueDeclared { queue, .. } => Ok(queue),
            other => Err(unexpected(&other)),
        }
    }

    /// Publish and wait for the broker's confirm.
    ///
    /// # Errors
    ///
    /// Returns the fault for an unroutable mandatory message, a missing
    /// exchange, or a closed channel.
    pub fn publish(&mut self, publish: &Publish) -> Result<(), ProtocolFault> {
        self.conn.ensure_open()?;
        let events = self.conn.broker.publish(publish);
        match self.conn.call(events)? {
            LoopEvent::PublishConfirmed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Publish `body` with default properties, no flags.
    ///
    /// # Errors
    ///
    /// Same as [`BlockingChannel::publish`].
    pub fn publish_text(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Bytes>,
    ) -> Result<(), ProtocolFault> {
        self.publish(&Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.into(),
            properties: Default::default(),
            mandatory: false,
            immediate: false,
        })
    }

    /// `basic.get`; `None` if the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns the fault that closed the channel.
    pub fn get(&mut self, queue: &str) -> Result<Option<Delivery>, ProtocolFault> {
        self.conn.ensure_open()?;
        let events = self.conn.broker.get(queue);
        match self.conn.call(events)? {
            LoopEvent::Delivered(delivery) => Ok(Some(delivery)),
            LoopEvent::GetEmpty { .. } => Ok(None),
            other => Err(unexpected(&other)),
        }
    }

    /// Reject a delivery.
    ///
    /// # Errors
    ///
    /// An unknown tag closes the channel with `406 PRECONDITION_FAILED`.
    pub fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Result<(), ProtocolFault> {
        self.conn.ensure_open()?;
        let events = self.conn.broker.reject(tag, requeue);
        self.conn.call(events).map(|_| ())
    }

    /// Acknowledge a delivery.
    ///
    /// # Errors
    ///
    /// An unknown tag closes the channel with `406 PRECONDITION_FAILED`.
    pub fn acknowledge(&mut self, tag: DeliveryTag) -> Result<(), ProtocolFault> {
        self.conn.ensure_open()?;
        let events = self.conn.broker.acknowledge(tag);
        self.conn.call(events).map(|_| ())
    }
}

/// First event, or the fault it carries.
fn expect_one(events: Vec<LoopEvent>) -> Result<LoopEvent, ProtocolFault> {
    let Some(first) = events.into_iter().next() else {
        return Err(ProtocolFault::connection(ReplyCode::CONNECTION_FORCED, "broker did not reply"));
    };

    match first {
        LoopEvent::ChannelClosed(fault) | LoopEvent::Returned(fault) => Err(fault),
        LoopEvent::Closed { fault: Some(fault) } => Err(fault),
        other => Ok(other),
    }
}

fn unexpected(event: &LoopEvent) -> ProtocolFault {
    ProtocolFault::connection(ReplyCode::CONNECTION_FORCED, format!("unexpected reply {:?}", event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_to_undeclared_exchange_raises_not_found() {
        let mut conn = BlockingConnection::connect(&ConnectionParams::default()).unwrap();
        let mut channel = conn.channel().unwrap();

        let fault = channel.publish_text("undeclared-exchange", "q", "x").unwrap_err();
        assert!(fault.code.is_not_found());
        assert!(conn.is_open());
    }

    #[test]
    fn round_trip_through_blocking_calls() {
        let mut conn = BlockingConnection::connect(&ConnectionParams::default()).unwrap();
        let mut channel = conn.channel().unwrap();
        let declare =
            QueueDeclare { queue: "q".to_string(), durable: false, exclusive: false, auto_delete: true };

        assert_eq!(channel.declare_queue(&declare).unwrap(), "q");
        channel.publish_text("", "q", "hello-1").unwrap();

        let first = channel.get("q").unwrap().expect("message");
        channel.reject(first.tag, true).unwrap();
        let second = channel.get("q").unwrap().expect("requeued message");
        assert_eq!(first.body, second.body);
        assert!(second.redelivered);

        channel.acknowledge(second.tag).unwrap();
        assert_eq!(channel.get("q").unwrap(), None);
        conn.close().unwrap();
    }

    #[test]
    fn unknown_tag_is_raised_synchronously() {
        let mut conn = BlockingConnection::connect(&ConnectionParams::default()).unwrap();
        let mut channel = conn.channel().unwrap();

        let fault = channel.acknowledge(DeliveryTag(5)).unwrap_err();
        assert_eq!(fault.code, ReplyCode::PRECONDITION_FAILED);
    }

    #[test]
    fn immediate_closes_the_connection() {
        let mut conn = BlockingConnection::connect(&ConnectionParams::default()).unwrap();
        let mut channel = conn.channel().unwrap();
        let publish = Publish {
            exchange: String::new(),
            routing_key: "q".to_string(),
            body: Bytes::from_static(b"x"),
            properties: Default::default(),
            mandatory: false,
            immediate: true,
        };

        assert_eq!(channel.publish(&publish).unwrap_err().code, ReplyCode::NOT_IMPLEMENTED);
        assert!(!conn.is_open());
        assert!(conn.close().is_err());
    }
}
