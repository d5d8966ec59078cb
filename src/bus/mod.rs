//! Message bus - topic-matched publish/subscribe between process contexts.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  MessageBus (one per runtime)               │
//! │  - owns the bus thread + the top-level SubscriberRegistry   │
//! │  - publish() queues fan-out onto the bus thread             │
//! └─────────────────────────────────────────────────────────────┘
//!              │ matcher: "any of my subscriptions match"
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ProcessBus (one per context)                │
//! │  - holds the context's own SubscriberRegistry               │
//! │  - adapter re-posts each callback onto the process thread   │
//! │  - QueueFullEvent listeners, request/reply, batching        │
//! └─────────────────────────────────────────────────────────────┘
//!              │ CommandQueue.enqueue
//!              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              ProcessThread (user callbacks run here)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Publishes are serialised on the single bus thread, so each subscriber
//! observes every publisher's messages in that publisher's order. The
//! re-post onto the subscriber's own command queue is what confines user
//! callbacks to their owning process thread.

mod batch;
mod message_bus;
mod process_bus;
mod registry;
mod request;

pub use batch::{
    BatchHandler, BatchSubscriber, BatchedMessage, KeyResolver, KeyedBatchHandler,
    KeyedBatchSubscriber,
};
pub use message_bus::MessageBus;
pub use process_bus::{ProcessBus, QueueFullEvent, QueueFullListener};
pub use registry::{OnMessage, SubscriberRegistry, Unsubscriber};
pub use request::RequestReply;
