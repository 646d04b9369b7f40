//! Data types exchanged with the asynchronous connection capability.
//!
//! These mirror the AMQP 0-9-1 methods a scenario touches (`queue.declare`,
//! `basic.publish`, `basic.get`, `basic.reject`, `basic.ack`) without any
//! framing. Encoding them on the wire is the connection's business.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;

/// Broker reply code carried by channel/connection close and `basic.return`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReplyCode(pub u16);

impl ReplyCode {
    /// Connection closed by the broker operator or shutdown.
    pub const CONNECTION_FORCED: Self = Self(320);
    /// Mandatory message could not be routed to any queue.
    pub const NO_ROUTE: Self = Self(312);
    /// Access to the resource was refused.
    pub const ACCESS_REFUSED: Self = Self(403);
    /// Exchange or queue does not exist.
    pub const NOT_FOUND: Self = Self(404);
    /// Request conflicts with broker state (unknown delivery tag,
    /// redeclare with different flags).
    pub const PRECONDITION_FAILED: Self = Self(406);
    /// Operation on a channel that is not open.
    pub const CHANNEL_ERROR: Self = Self(504);
    /// Feature not implemented by the broker (`immediate` publishing).
    pub const NOT_IMPLEMENTED: Self = Self(540);

    /// Numeric value of the code.
    #[must_use]
    pub fn value(self) -> u16 {
        self.0
    }

    /// Whether the code belongs to the "not found" class.
    #[must_use]
    pub fn is_not_found(self) -> bool {
        self == Self::NOT_FOUND
    }

    /// Symbolic name of the code, if known.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self.0 {
            312 => "NO_ROUTE",
            320 => "CONNECTION_FORCED",
            403 => "ACCESS_REFUSED",
            404 => "NOT_FOUND",
            405 => "RESOURCE_LOCKED",
            406 => "PRECONDITION_FAILED",
            504 => "CHANNEL_ERROR",
            540 => "NOT_IMPLEMENTED",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.name())
    }
}

/// Whether a fault closed a single channel or the whole connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultScope {
    /// `basic.return` of a mandatory message; nothing was closed
    Message,
    /// `channel.close` from the broker
    Channel,
    /// `connection.close` from the broker
    Connection,
}

/// A channel- or connection-level fault reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProtocolFault {
    /// What the fault tore down
    pub scope: FaultScope,
    /// Reply code
    pub code: ReplyCode,
    /// Reply text as sent by the broker
    pub text: String,
}

impl ProtocolFault {
    /// Fault closing the channel.
    pub fn channel(code: ReplyCode, text: impl Into<String>) -> Self {
        Self { scope: FaultScope::Channel, code, text: text.into() }
    }

    /// Fault closing the connection.
    pub fn connection(code: ReplyCode, text: impl Into<String>) -> Self {
        Self { scope: FaultScope::Connection, code, text: text.into() }
    }

    /// A mandatory message handed back by the broker.
    pub fn returned(code: ReplyCode, text: impl Into<String>) -> Self {
        Self { scope: FaultScope::Message, code, text: text.into() }
    }
}

impl fmt::Display for ProtocolFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match self.scope {
            FaultScope::Message => "message returned",
            FaultScope::Channel => "channel closed",
            FaultScope::Connection => "connection closed",
        };
        write!(f, "{}: {} ({})", scope, self.code, self.text)
    }
}

/// Identifier correlating a retrieved message with its later ack/reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Virtual host
    pub virtual_host: String,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: 5672, virtual_host: "/".to_string() }
    }
}

/// `queue.declare` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDeclare {
    /// Queue name
    pub queue: String,
    /// Survive broker restart
    pub durable: bool,
    /// Owned by the declaring connection
    pub exclusive: bool,
    /// Deleted once the last consumer goes away
    pub auto_delete: bool,
}

/// Persistence requested for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Delivery mode 1
    #[default]
    Transient,
    /// Delivery mode 2
    Persistent,
}

/// Message properties the scenarios set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicProperties {
    /// MIME content type
    pub content_type: Option<String>,
    /// Delivery mode
    pub delivery_mode: DeliveryMode,
}

impl Default for BasicProperties {
    fn default() -> Self {
        Self { content_type: Some("text/plain".to_string()), delivery_mode: DeliveryMode::Transient }
    }
}

/// `basic.publish` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Target exchange (`""` is the default exchange)
    pub exchange: String,
    /// Routing key
    pub routing_key: String,
    /// Message body
    pub body: Bytes,
    /// Message properties
    pub properties: BasicProperties,
    /// Return the message if it cannot be routed
    pub mandatory: bool,
    /// Return the message if it cannot be delivered immediately
    pub immediate: bool,
}

/// A message handed out by `basic.get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag to ack or reject this delivery
    pub tag: DeliveryTag,
    /// Whether the message was delivered before
    pub redelivered: bool,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key it was published with
    pub routing_key: String,
    /// Messages remaining in the queue
    pub message_count: u32,
    /// Properties it was published with
    pub properties: BasicProperties,
    /// Body
    pub body: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_code_display_includes_name() {
        assert_eq!(ReplyCode::NOT_FOUND.to_string(), "404 NOT_FOUND");
        assert_eq!(ReplyCode(999).to_string(), "999 UNKNOWN");
    }

    #[test]
    fn only_404_is_not_found() {
        assert!(ReplyCode::NOT_FOUND.is_not_found());
        assert!(!ReplyCode::PRECONDITION_FAILED.is_not_found());
        assert!(!ReplyCode::NO_ROUTE.is_not_found());
    }

    #[test]
    fn fault_display_names_scope() {
        let fault = ProtocolFault::channel(ReplyCode::NOT_FOUND, "no exchange 'x'");
        assert_eq!(fault.to_string(), "channel closed: 404 NOT_FOUND (no exchange 'x')");
    }
}
