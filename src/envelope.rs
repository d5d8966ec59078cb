//! Envelope and header value objects transported on the bus.

use std::any::Any;
use std::sync::Arc;

/// Shared, dynamically typed message payload.
///
/// The bus is in-process: messages are shared between contexts behind an
/// `Arc`, never serialized. Subscribers downcast to the concrete type they
/// expect.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Immutable routing metadata carried by every envelope.
#[derive(Clone, Debug)]
pub struct MessageHeader {
    topic: String,
    reply_to: Option<String>,
    sender: Option<String>,
}

impl MessageHeader {
    /// Create a header for `topic` with no reply-to and no sender.
    pub fn new(topic: impl Into<String>) -> Self {
        MessageHeader {
            topic: topic.into(),
            reply_to: None,
            sender: None,
        }
    }

    /// Set the reply-to topic.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Set the sender name.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// The topic this message was published on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Topic a reply should be published on, if the publisher expects one.
    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Name of the publishing context, if known.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }
}

/// Immutable `(header, payload)` pair transported on the bus.
///
/// Cloning an envelope clones the `Arc`, not the payload data.
#[derive(Clone)]
pub struct TransferEnvelope {
    header: MessageHeader,
    payload: Payload,
}

impl TransferEnvelope {
    /// Build an envelope for `topic` carrying `message`.
    pub fn new<T: Any + Send + Sync>(topic: impl Into<String>, message: T) -> Self {
        TransferEnvelope {
            header: MessageHeader::new(topic),
            payload: Arc::new(message),
        }
    }

    /// Assemble an envelope from an existing header and payload.
    pub fn from_parts(header: MessageHeader, payload: Payload) -> Self {
        TransferEnvelope { header, payload }
    }

    /// Set the reply-to topic on the header.
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.header = self.header.with_reply_to(reply_to);
        self
    }

    /// Set the sender name on the header.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.header = self.header.with_sender(sender);
        self
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Downcast the payload to a concrete type.
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}
