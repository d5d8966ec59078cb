//! Process-wide fan-out of envelopes on a dedicated bus thread.

use std::sync::Arc;

use crate::bus::registry::{OnMessage, SubscriberRegistry, Unsubscriber};
use crate::envelope::TransferEnvelope;
use crate::error::QueueFullError;
use crate::process_thread::ProcessThread;
use crate::timer::TimerThread;
use crate::topic::TopicMatcher;

/// The shared message bus: one internal process thread plus a subscriber
/// registry.
///
/// `publish` enqueues a dispatch command onto the bus thread; the
/// single-threaded dispatch there is what gives every subscriber a
/// consistent per-publisher order. Do not parallelise it.
pub struct MessageBus {
    thread: ProcessThread,
    registry: Arc<SubscriberRegistry>,
}

impl MessageBus {
    /// Create the bus over an unbounded internal queue.
    pub fn new(timer: Arc<TimerThread>) -> Self {
        MessageBus {
            thread: ProcessThread::new("bus", timer),
            registry: SubscriberRegistry::new(),
        }
    }

    /// Launch the bus thread.
    pub fn start(&self) {
        self.thread.start();
    }

    /// Halt the bus thread; pending publishes drain.
    pub fn stop(&self) {
        self.thread.stop();
    }

    /// Wait for the bus thread to exit.
    pub fn join(&self) {
        self.thread.join();
    }

    /// Register a subscriber. Thread-safe through the registry's mutex.
    pub fn subscribe(&self, matcher: Arc<dyn TopicMatcher>, on_message: OnMessage) -> Unsubscriber {
        self.registry.subscribe(matcher, on_message)
    }

    /// Queue `envelope` for dispatch on the bus thread.
    pub fn publish(&self, envelope: TransferEnvelope) -> Result<(), QueueFullError> {
        let registry = Arc::clone(&self.registry);
        self.thread.enqueue(Box::new(move || {
            registry.publish(&envelope);
        }))
    }
}
