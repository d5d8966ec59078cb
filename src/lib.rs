//! # procbus
//!
//! An in-process concurrent messaging and scheduling runtime.
//!
//! **procbus** provides isolated *process contexts* - each a single
//! logical worker thread with its own serial command queue - that talk to
//! each other by publishing typed messages on topics through a shared bus,
//! and that can schedule commands (one-shot or recurring) for deferred
//! execution on their own queue.
//!
//! | Area            | Description                                             | Key types                                  |
//! |-----------------|---------------------------------------------------------|--------------------------------------------|
//! | **Contexts**    | Serial workers owning a blocking command queue.         | [`ProcessContext`], [`ProcessThread`], [`CommandQueue`] |
//! | **Scheduling**  | One shared timer dispatching into context queues.       | [`TimerThread`], [`TimerControl`]          |
//! | **Messaging**   | Topic-matched pub/sub with per-publisher ordering.      | [`bus::MessageBus`], [`bus::ProcessBus`]   |
//! | **Request/reply** | One-shot correlation over ephemeral topics.           | [`bus::RequestReply`]                      |
//! | **Batching**    | Time-window collection and keyed coalescing.            | [`bus::BatchSubscriber`], [`bus::KeyedBatchSubscriber`] |
//! | **Errors**      | Bounded-queue overflow, surfaced or notified.           | [`QueueFullError`], [`bus::QueueFullEvent`] |
//!
//! The central guarantee: *a subscriber's callback runs only on the
//! subscriber's process thread, serially, in publish order per publisher.*
//!
//! ```no_run
//! use procbus::ProcessContextFactory;
//!
//! let factory = ProcessContextFactory::new();
//! let ctx = factory.create("worker");
//! ctx.start();
//!
//! let _sub = ctx.subscribe("jobs", |header, _payload| {
//!     println!("job on topic {}", header.topic());
//! });
//! ctx.publish("jobs", ()).unwrap();
//!
//! ctx.stop();
//! ctx.join();
//! factory.shutdown();
//! ```

pub mod bus;
mod context;
mod envelope;
mod error;
mod process_thread;
mod queue;
mod timer;
mod topic;

pub use context::{Config, ProcessContext, ProcessContextFactory};
pub use envelope::{MessageHeader, Payload, TransferEnvelope};
pub use error::QueueFullError;
pub use process_thread::ProcessThread;
pub use queue::{Command, CommandQueue};
pub use timer::{ScheduledCommand, TimerControl, TimerThread};
pub use topic::{ExactTopicMatcher, TopicMatcher};
