//! Boundary between the client core and the message bus.
//!
//! The core only needs two things from a bus: publishing a message with a
//! correlation id and a reply address, and a single reply channel delivering
//! inbound messages one at a time. Connection management stays behind the
//! adapter.
#[cfg(feature = "amqp")]
mod amqp;
mod memory;
mod retry;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;
pub use memory::{MemoryTransport, Responder, ScheduledReply, echo_responder, silent_responder};
pub use retry::{RetryPolicy, connect_with_retry};

/// Capacity of the channel carrying inbound replies to the demultiplexer.
pub const REPLY_CHANNEL_CAPACITY: usize = 1024;

/// Where a request is published: an exchange plus a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub exchange: String,
    pub routing_key: String,
}

impl Destination {
    #[must_use]
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.exchange, self.routing_key)
    }
}

#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub destination: Destination,
    pub correlation_id: String,
    pub reply_to: String,
    pub payload: Vec<u8>,
}

/// A message delivered on the reply channel. The correlation id comes from
/// message metadata and may be missing on malformed deliveries.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub correlation_id: Option<String>,
    pub payload: Vec<u8>,
}

/// The reply channel handed out by [`Transport::subscribe`].
///
/// The stream ending means the bus stopped delivering replies.
#[derive(Debug)]
pub struct ReplySubscription {
    pub address: String,
    pub messages: mpsc::Receiver<InboundMessage>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Publishes one message. Success means the bus accepted it, nothing more.
    ///
    /// # Errors
    ///
    /// Returns an error when the message cannot be handed to the bus.
    async fn publish(&self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Opens the reply channel exclusively consumed by this client.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel cannot be opened or was already
    /// taken.
    async fn subscribe(&self) -> Result<ReplySubscription, TransportError>;

    /// Closes the connection. Later publishes fail.
    ///
    /// # Errors
    ///
    /// Returns an error when the bus reports a failure while closing.
    async fn close(&self) -> Result<(), TransportError>;
}
