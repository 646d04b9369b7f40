//! In-memory broker model.
//!
//! Implements the slice of AMQP 0-9-1 behaviour the scenarios observe, with
//! one connection and one channel:
//!
//! - the default exchange (`""`) routes to the queue named by the routing key
//! - named direct exchanges route through explicit bindings
//! - `basic.get` hands out delivery tags starting at 1 and keeps the message
//!   unacknowledged until it is acked or rejected
//! - reject with requeue puts the message back at the head of its queue,
//!   marked redelivered
//!
//! Every operation returns the [`LoopEvent`]s the client would observe, in
//! order. Faults close the channel (or the connection) exactly like a real
//! broker would, after which channel operations fail with `504
//! CHANNEL_ERROR` until the channel is reopened.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use bytes::Bytes;
use mqcheck_core::{
    capability::LoopEvent,
    protocol::{
        BasicProperties, ConnectionParams, Delivery, DeliveryTag, ProtocolFault, Publish,
        QueueDeclare, ReplyCode,
    },
};

/// Virtual host the broker serves.
pub const VIRTUAL_HOST: &str = "/";

/// Channel number handed out by `open_channel`.
pub const CHANNEL: u16 = 1;

#[derive(Debug, Clone)]
struct Message {
    exchange: String,
    routing_key: String,
    properties: BasicProperties,
    body: Bytes,
    redelivered: bool,
}

#[derive(Debug)]
struct Queue {
    declare: QueueDeclare,
    messages: VecDeque<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Closed,
    Open,
}

/// Broker state for one connection.
#[derive(Debug)]
pub struct Broker {
    exchanges: HashMap<String, HashSet<(String, String)>>,
    queues: HashMap<String, Queue>,
    unacked: BTreeMap<DeliveryTag, (String, Message)>,
    connected: bool,
    channel: ChannelState,
    next_tag: u64,
    generated_queues: u64,
}

impl Broker {
    /// Broker with only the default exchange and `amq.direct`.
    pub fn new() -> Self {
        let mut exchanges = HashMap::new();
        exchanges.insert(String::new(), HashSet::new());
        exchanges.insert("amq.direct".to_string(), HashSet::new());

        Self {
            exchanges,
            queues: HashMap::new(),
            unacked: BTreeMap::new(),
            connected: false,
            channel: ChannelState::Closed,
            next_tag: 0,
            generated_queues: 0,
        }
    }

    /// Declare a direct exchange.
    pub fn with_exchange(mut self, name: impl Into<String>) -> Self {
        self.exchanges.entry(name.into()).or_default();
        self
    }

    /// Bind `queue` to `exchange` under `routing_key`.
    ///
    /// The exchange is created if missing. Bindings to the default exchange
    /// are implicit and ignored.
    pub fn bind(
        &mut self,
        queue: impl Into<String>,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) {
        let exchange = exchange.into();
        if exchange.is_empty() {
            return;
        }
        self.exchanges.entry(exchange).or_default().insert((routing_key.into(), queue.into()));
    }

    /// Whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the channel is open.
    pub fn is_channel_open(&self) -> bool {
        self.channel == ChannelState::Open
    }

    /// Ready messages in `queue`, `None` if it does not exist.
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.queues.get(queue).map(|q| q.messages.len())
    }

    /// Deliveries handed out and not yet settled.
    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    /// `connection.open`.
    pub fn connect(&mut self, params: &ConnectionParams) -> Vec<LoopEvent> {
        if params.virtual_host != VIRTUAL_HOST {
            let fault = ProtocolFault::connection(
                ReplyCode::ACCESS_REFUSED,
                format!(
                    "ACCESS_REFUSED - access to vhost '{}' refused for user 'guest'",
                    params.virtual_host
                ),
            );
            return vec![LoopEvent::Closed { fault: Some(fault) }];
        }

        self.connected = true;
        tracing::debug!(host = %params.host, port = params.port, "broker accepted connection");
        vec![LoopEvent::Connected]
    }

    /// `channel.open`.
    pub fn open_channel(&mut self) -> Vec<LoopEvent> {
        if !self.connected {
            return self.connection_fault(ReplyCode::CHANNEL_ERROR, "connection not open");
        }
        self.channel = ChannelState::Open;
        vec![LoopEvent::ChannelOpened { channel: CHANNEL }]
    }

    /// `queue.declare`.
    pub fn declare_queue(&mut self, declare: &QueueDeclare) -> Vec<LoopEvent> {
        if let Some(closed) = self.require_channel() {
            return closed;
        }

        let name = if declare.queue.is_empty() {
            self.generated_queues += 1;
            format!("amq.gen-{:04}", self.generated_queues)
        } else {
            declare.queue.clone()
        };

        if let Some(existing) = self.queues.get(&name) {
            let mismatch = [
                ("durable", existing.declare.durable != declare.durable),
                ("exclusive", existing.declare.exclusive != declare.exclusive),
                ("auto_delete", existing.declare.auto_delete != declare.auto_delete),
            ]
            .into_iter()
            .find(|(_, differs)| *differs);

            if let Some((arg, _)) = mismatch {
                return self.channel_fault(
                    ReplyCode::PRECONDITION_FAILED,
                    format!(
                        "PRECONDITION_FAILED - inequivalent arg '{}' for queue '{}' in vhost '{}'",
                        arg, name, VIRTUAL_HOST
                    ),
                );
            }

            return vec![LoopEvent::QueueDeclared {
                queue: name,
                message_count: existing.messages.len() as u32,
                consumer_count: 0,
            }];
        }

        let mut stored = declare.clone();
        stored.queue = name.clone();
        self.queues.insert(name.clone(), Queue { declare: stored, messages: VecDeque::new() });
        tracing::debug!(queue = %name, "broker declared queue");

        vec![LoopEvent::QueueDeclared { queue: name, message_count: 0, consumer_count: 0 }]
    }

    /// `basic.publish`, confirmed.
    pub fn publish(&mut self, publish: &Publish) -> Vec<LoopEvent> {
        if let Some(closed) = self.require_channel() {
            return closed;
        }

        if publish.immediate {
            return self.connection_fault(
                ReplyCode::NOT_IMPLEMENTED,
                "NOT_IMPLEMENTED - immediate=true",
            );
        }

        let Some(bindings) = self.exchanges.get(&publish.exchange) else {
            return self.channel_fault(
                ReplyCode::NOT_FOUND,
                format!("NOT_FOUND - no exchange '{}' in vhost '{}'", publish.exchange, VIRTUAL_HOST),
            );
        };

        let targets: Vec<String> = if publish.exchange.is_empty() {
            self.queues
                .contains_key(&publish.routing_key)
                .then(|| publish.routing_key.clone())
                .into_iter()
                .collect()
        } else {
            bindings
                .iter()
                .filter(|(key, queue)| *key == publish.routing_key && self.queues.contains_key(queue))
                .map(|(_, queue)| queue.clone())
                .collect()
        };

        if targets.is_empty() {
            tracing::debug!(
                exchange = %publish.exchange,
                routing_key = %publish.routing_key,
                mandatory = publish.mandatory,
                "broker could not route message"
            );
            if publish.mandatory {
                return vec![
                    LoopEvent::Returned(ProtocolFault::returned(ReplyCode::NO_ROUTE, "NO_ROUTE")),
                    LoopEvent::PublishConfirmed,
                ];
            }
            return vec![LoopEvent::PublishConfirmed];
        }

        for target in targets {
            if let Some(queue) = self.queues.get_mut(&target) {
                queue.messages.push_back(Message {
                    exchange: publish.exchange.clone(),
                    routing_key: publish.routing_key.clone(),
                    properties: publish.properties.clone(),
                    body: publish.body.clone(),
                    redelivered: false,
                });
            }
        }

        vec![LoopEvent::PublishConfirmed]
    }

    /// `basic.get` without auto-ack.
    pub fn get(&mut self, queue: &str) -> Vec<LoopEvent> {
        if let Some(closed) = self.require_channel() {
            return closed;
        }

        let Some(stored) = self.queues.get_mut(queue) else {
            return self.channel_fault(
                ReplyCode::NOT_FOUND,
                format!("NOT_FOUND - no queue '{}' in vhost '{}'", queue, VIRTUAL_HOST),
            );
        };

        let Some(message) = stored.messages.pop_front() else {
            return vec![LoopEvent::GetEmpty { queue: queue.to_string() }];
        };
        let message_count = stored.messages.len() as u32;

        self.next_tag += 1;
        let tag = DeliveryTag(self.next_tag);

        let delivery = Delivery {
            tag,
            redelivered: message.redelivered,
            exchange: message.exchange.clone(),
            routing_key: message.routing_key.clone(),
            message_count,
            properties: message.properties.clone(),
            body: message.body.clone(),
        };
        self.unacked.insert(tag, (queue.to_string(), message));

        vec![LoopEvent::Delivered(delivery)]
    }

    /// `basic.reject`.
    pub fn reject(&mut self, tag: DeliveryTag, requeue: bool) -> Vec<LoopEvent> {
        if let Some(closed) = self.require_channel() {
            return closed;
        }

        let Some((queue, message)) = self.unacked.remove(&tag) else {
            return self.unknown_tag(tag);
        };

        if requeue {
            self.requeue(queue, message);
        }

        vec![LoopEvent::Rejected { tag }]
    }

    /// `basic.ack`.
    pub fn acknowledge(&mut self, tag: DeliveryTag) -> Vec<LoopEvent> {
        if let Some(closed) = self.require_channel() {
            return closed;
        }

        if self.unacked.remove(&tag).is_none() {
            return self.unknown_tag(tag);
        }

        vec![LoopEvent::Acked { tag }]
    }

    /// Orderly `connection.close`.
    pub fn close(&mut self) -> Vec<LoopEvent> {
        self.drop_channel();
        self.connected = false;
        self.queues.retain(|_, queue| !queue.declare.exclusive);
        vec![LoopEvent::Closed { fault: None }]
    }

    fn require_channel(&mut self) -> Option<Vec<LoopEvent>> {
        if !self.connected {
            return Some(self.connection_fault(ReplyCode::CHANNEL_ERROR, "connection not open"));
        }
        if self.channel != ChannelState::Open {
            return Some(vec![LoopEvent::ChannelClosed(ProtocolFault::channel(
                ReplyCode::CHANNEL_ERROR,
                "CHANNEL_ERROR - expected 'channel.open'",
            ))]);
        }
        None
    }

    fn unknown_tag(&mut self, tag: DeliveryTag) -> Vec<LoopEvent> {
        self.channel_fault(
            ReplyCode::PRECONDITION_FAILED,
            format!("PRECONDITION_FAILED - unknown delivery tag {}", tag),
        )
    }

    fn channel_fault(&mut self, code: ReplyCode, text: impl Into<String>) -> Vec<LoopEvent> {
        let fault = ProtocolFault::channel(code, text);
        tracing::debug!(%fault, "broker closing channel");
        self.drop_channel();
        vec![LoopEvent::ChannelClosed(fault)]
    }

    fn connection_fault(&mut self, code: ReplyCode, text: impl Into<String>) -> Vec<LoopEvent> {
        let fault = ProtocolFault::connection(code, text);
        tracing::debug!(%fault, "broker closing connection");
        self.drop_channel();
        self.connected = false;
        vec![LoopEvent::Closed { fault: Some(fault) }]
    }

    /// Close the channel and requeue everything it had outstanding.
    fn drop_channel(&mut self) {
        self.channel = ChannelState::Closed;
        let outstanding = std::mem::take(&mut self.unacked);
        // Newest first so push_front restores the original order.
        for (_, (queue, message)) in outstanding.into_iter().rev() {
            self.requeue(queue, message);
        }
    }

    fn requeue(&mut self, queue: String, mut message: Message) {
        if let Some(stored) = self.queues.get_mut(&queue) {
            message.redelivered = true;
            stored.messages.push_front(message);
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use mqcheck_core::protocol::FaultScope;

    use super::*;

    fn open() -> Broker {
        let mut broker = Broker::new();
        broker.connect(&ConnectionParams::default());
        broker.open_channel();
        broker
    }

    fn declare(queue: &str) -> QueueDeclare {
        QueueDeclare { queue: queue.to_string(), durable: false, exclusive: false, auto_delete: true }
    }

    fn publish(exchange: &str, routing_key: &str, body: &'static str) -> Publish {
        Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: Bytes::from_static(body.as_bytes()),
            properties: BasicProperties::default(),
            mandatory: false,
            immediate: false,
        }
    }

    fn delivered(events: Vec<LoopEvent>) -> Delivery {
        match events.as_slice() {
            [LoopEvent::Delivered(delivery)] => delivery.clone(),
            other => panic!("expected a delivery, got {:?}", other),
        }
    }

    fn channel_fault(events: &[LoopEvent]) -> &ProtocolFault {
        match events {
            [LoopEvent::ChannelClosed(fault)] => fault,
            other => panic!("expected channel close, got {:?}", other),
        }
    }

    #[test]
    fn reject_with_requeue_redelivers_same_body() {
        let mut broker = open();
        broker.declare_queue(&declare("q"));
        assert_eq!(broker.publish(&publish("", "q", "hello-1")), vec![LoopEvent::PublishConfirmed]);

        let first = delivered(broker.get("q"));
        assert_eq!(first.tag, DeliveryTag(1));
        assert!(!first.redelivered);

        assert_eq!(broker.reject(first.tag, true), vec![LoopEvent::Rejected { tag: first.tag }]);
        assert_eq!(broker.queue_depth("q"), Some(1));

        let second = delivered(broker.get("q"));
        assert_eq!(second.tag, DeliveryTag(2));
        assert!(second.redelivered);
        assert_eq!(second.body, first.body);

        assert_eq!(broker.acknowledge(second.tag), vec![LoopEvent::Acked { tag: second.tag }]);
        assert_eq!(broker.queue_depth("q"), Some(0));
        assert_eq!(broker.unacked_count(), 0);
    }

    #[test]
    fn publish_to_missing_exchange_closes_channel_with_404() {
        let mut broker = open();
        let events = broker.publish(&publish("undeclared-exchange", "q", "x"));

        let fault = channel_fault(&events);
        assert_eq!(fault.code, ReplyCode::NOT_FOUND);
        assert!(fault.text.contains("undeclared-exchange"));
        assert!(!broker.is_channel_open());

        let after = broker.get("q");
        assert_eq!(channel_fault(&after).code, ReplyCode::CHANNEL_ERROR);
    }

    #[test]
    fn unroutable_mandatory_is_returned() {
        let mut broker = open();
        let mut message = publish("", "nowhere", "x");
        message.mandatory = true;

        let events = broker.publish(&message);
        assert!(matches!(
            events.as_slice(),
            [LoopEvent::Returned(fault), LoopEvent::PublishConfirmed] if fault.code == ReplyCode::NO_ROUTE
        ));
        assert!(broker.is_channel_open());
    }

    #[test]
    fn unroutable_without_mandatory_is_dropped() {
        let mut broker = open();
        assert_eq!(broker.publish(&publish("", "nowhere", "x")), vec![LoopEvent::PublishConfirmed]);
    }

    #[test]
    fn immediate_closes_connection_with_540() {
        let mut broker = open();
        broker.declare_queue(&declare("q"));
        let mut message = publish("", "q", "x");
        message.immediate = true;

        match broker.publish(&message).as_slice() {
            [LoopEvent::Closed { fault: Some(fault) }] => {
                assert_eq!(fault.code, ReplyCode::NOT_IMPLEMENTED);
                assert_eq!(fault.scope, FaultScope::Connection);
            },
            other => panic!("expected connection close, got {:?}", other),
        }
        assert!(!broker.is_connected());
    }

    #[test]
    fn unknown_delivery_tag_is_precondition_failed() {
        let mut broker = open();
        broker.declare_queue(&declare("q"));

        let events = broker.acknowledge(DeliveryTag(42));
        let fault = channel_fault(&events);
        assert_eq!(fault.code, ReplyCode::PRECONDITION_FAILED);
        assert_eq!(fault.text, "PRECONDITION_FAILED - unknown delivery tag 42");
    }

    #[test]
    fn channel_close_requeues_outstanding_deliveries() {
        let mut broker = open();
        broker.declare_queue(&declare("q"));
        broker.publish(&publish("", "q", "a"));
        broker.publish(&publish("", "q", "b"));

        delivered(broker.get("q"));
        delivered(broker.get("q"));
        broker.reject(DeliveryTag(99), false);

        assert_eq!(broker.unacked_count(), 0);
        assert_eq!(broker.queue_depth("q"), Some(2));

        broker.open_channel();
        let first = delivered(broker.get("q"));
        assert_eq!(first.body, "a");
        assert!(first.redelivered);
    }

    #[test]
    fn redeclare_with_different_flags_fails() {
        let mut broker = open();
        broker.declare_queue(&declare("q"));

        let mut durable = declare("q");
        durable.durable = true;
        let events = broker.declare_queue(&durable);
        assert_eq!(channel_fault(&events).code, ReplyCode::PRECONDITION_FAILED);
    }

    #[test]
    fn get_from_empty_and_missing_queue() {
        let mut broker = open();
        broker.declare_queue(&declare("q"));
        assert_eq!(broker.get("q"), vec![LoopEvent::GetEmpty { queue: "q".to_string() }]);

        let events = broker.get("missing");
        assert_eq!(channel_fault(&events).code, ReplyCode::NOT_FOUND);
    }

    #[test]
    fn named_exchange_routes_through_bindings() {
        let mut broker = open().with_exchange("orders");
        broker.declare_queue(&declare("q"));
        broker.bind("q", "orders", "new");

        broker.publish(&publish("orders", "new", "x"));
        broker.publish(&publish("orders", "old", "y"));
        assert_eq!(broker.queue_depth("q"), Some(1));
    }

    #[test]
    fn wrong_vhost_is_refused() {
        let mut broker = Broker::new();
        let params = ConnectionParams { virtual_host: "/other".to_string(), ..Default::default() };
        match broker.connect(&params).as_slice() {
            [LoopEvent::Closed { fault: Some(fault) }] => {
                assert_eq!(fault.code, ReplyCode::ACCESS_REFUSED)
            },
            other => panic!("expected refusal, got {:?}", other),
        }
    }
}
