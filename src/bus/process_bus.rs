//! Per-context facade over the shared message bus.
//!
//! A `ProcessBus` is bound to one [`ProcessThread`] and composed with one
//! [`MessageBus`]. It holds the context's own subscriptions and registers
//! itself on the shared bus as a single subscriber whose matcher asks
//! "does any of my subscriptions match?". Fan-out therefore happens in two
//! stages: the bus thread selects the process buses with a matching
//! subscription, then each process bus re-posts the callback onto its own
//! process thread. That hand-off is what confines user callbacks to their
//! owning thread.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::bus::batch::{BatchSubscriber, BatchedMessage, KeyedBatchSubscriber};
use crate::bus::message_bus::MessageBus;
use crate::bus::registry::{SubscriberRegistry, Unsubscriber};
use crate::bus::request::{ReplyState, RequestReply};
use crate::envelope::{MessageHeader, Payload, TransferEnvelope};
use crate::error::QueueFullError;
use crate::process_thread::ProcessThread;
use crate::timer::TimerControl;
use crate::topic::{ExactTopicMatcher, TopicMatcher};

/// Notification raised on the receive path when a subscriber's queue
/// rejects the adapter command. Carries everything the subscriber missed.
#[derive(Clone)]
pub struct QueueFullEvent {
    pub error: QueueFullError,
    pub header: MessageHeader,
    pub payload: Payload,
}

/// Listener invoked (on the bus thread) for every [`QueueFullEvent`].
pub type QueueFullListener = Arc<dyn Fn(&QueueFullEvent) + Send + Sync>;

/// Add/remove listener set with snapshot fan-out.
struct ListenerSet {
    state: Mutex<(Vec<(u64, QueueFullListener)>, u64)>,
}

impl ListenerSet {
    fn new() -> Self {
        ListenerSet {
            state: Mutex::new((Vec::new(), 0)),
        }
    }

    fn add(&self, listener: QueueFullListener) -> u64 {
        let mut state = self.state.lock().unwrap();
        let id = state.1;
        state.1 += 1;
        state.0.push((id, listener));
        id
    }

    fn remove(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.0.retain(|(listener_id, _)| *listener_id != id);
    }

    fn emit(&self, event: &QueueFullEvent) {
        let snapshot: Vec<QueueFullListener> = {
            let state = self.state.lock().unwrap();
            state.0.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            (*listener)(event);
        }
    }
}

/// Per-context publish/subscribe facade.
pub struct ProcessBus {
    thread: Arc<ProcessThread>,
    bus: Arc<MessageBus>,
    registry: Arc<SubscriberRegistry>,
    bus_subscription: Mutex<Option<Unsubscriber>>,
    queue_full: Arc<ListenerSet>,
}

impl ProcessBus {
    pub fn new(thread: Arc<ProcessThread>, bus: Arc<MessageBus>) -> Self {
        ProcessBus {
            thread,
            bus,
            registry: SubscriberRegistry::new(),
            bus_subscription: Mutex::new(None),
            queue_full: Arc::new(ListenerSet::new()),
        }
    }

    /// Register this context on the shared bus. Idempotent.
    pub fn start(&self) {
        let mut slot = self.bus_subscription.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let match_registry = Arc::clone(&self.registry);
        let matcher = move |topic: &str| match_registry.matches_any(topic);
        let receive_registry = Arc::clone(&self.registry);
        *slot = Some(self.bus.subscribe(
            Arc::new(matcher),
            Arc::new(move |envelope: &TransferEnvelope| {
                receive_registry.publish(envelope);
            }),
        ));
    }

    /// Unregister from the shared bus. Idempotent.
    pub fn stop(&self) {
        if let Some(subscription) = self.bus_subscription.lock().unwrap().take() {
            subscription.unsubscribe();
        }
    }

    /// Subscribe `handler` to `topic`. The handler runs on this context's
    /// process thread, serially, in publish order per publisher.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: impl Fn(&MessageHeader, &Payload) + Send + Sync + 'static,
    ) -> Unsubscriber {
        self.subscribe_matcher(Arc::new(ExactTopicMatcher::new(topic)), handler)
    }

    /// Subscribe with an arbitrary topic matcher.
    pub fn subscribe_matcher(
        &self,
        matcher: Arc<dyn TopicMatcher>,
        handler: impl Fn(&MessageHeader, &Payload) + Send + Sync + 'static,
    ) -> Unsubscriber {
        let handler: Arc<dyn Fn(&MessageHeader, &Payload) + Send + Sync> = Arc::new(handler);
        let thread = Arc::clone(&self.thread);
        let listeners = Arc::clone(&self.queue_full);
        // Runs on the bus thread: box the callback as a command and hand it
        // to the process thread. A full queue becomes a QueueFullEvent
        // instead of a failed publish.
        self.registry.subscribe(
            matcher,
            Arc::new(move |envelope: &TransferEnvelope| {
                let header = envelope.header().clone();
                let payload = Arc::clone(envelope.payload());
                let handler = Arc::clone(&handler);
                let command = Box::new(move || (*handler)(&header, &payload));
                if let Err(error) = thread.enqueue(command) {
                    listeners.emit(&QueueFullEvent {
                        error,
                        header: envelope.header().clone(),
                        payload: Arc::clone(envelope.payload()),
                    });
                }
            }),
        )
    }

    /// Subscribe a handler that receives all messages of a window as one
    /// list, in arrival order, no earlier than `min_batch_interval_ms`
    /// after the first message of the batch.
    pub fn subscribe_to_batch(
        &self,
        topic: &str,
        min_batch_interval_ms: u64,
        handler: impl Fn(Vec<BatchedMessage>) + Send + Sync + 'static,
    ) -> Unsubscriber {
        let batcher = BatchSubscriber::new(
            Arc::clone(&self.thread),
            min_batch_interval_ms,
            Box::new(handler),
        );
        self.subscribe(topic, move |header, payload| {
            batcher.receive_message(header, payload)
        })
    }

    /// Subscribe a handler that receives one coalesced `key -> message`
    /// mapping per window; the last message per key wins.
    pub fn subscribe_to_keyed_batch<K: Eq + Hash + Send + Sync + 'static>(
        &self,
        topic: &str,
        min_batch_interval_ms: u64,
        key_resolver: impl Fn(&MessageHeader, &Payload) -> K + Send + Sync + 'static,
        handler: impl Fn(HashMap<K, BatchedMessage>) + Send + Sync + 'static,
    ) -> Unsubscriber {
        let batcher = KeyedBatchSubscriber::new(
            Arc::clone(&self.thread),
            min_batch_interval_ms,
            Box::new(key_resolver),
            Box::new(handler),
        );
        self.subscribe(topic, move |header, payload| {
            batcher.receive_message(header, payload)
        })
    }

    /// Deliver an envelope to this context's subscriptions. Returns true
    /// if any matched. Normally called from the bus thread via the
    /// bus-level subscription `start` installs.
    pub fn receive(&self, envelope: &TransferEnvelope) -> bool {
        self.registry.publish(envelope)
    }

    /// Publish `message` on `topic` through the shared bus.
    pub fn publish<T: Any + Send + Sync>(
        &self,
        topic: &str,
        message: T,
    ) -> Result<(), QueueFullError> {
        self.publish_envelope(TransferEnvelope::new(topic, message))
    }

    /// Publish with a reply-to topic in the header.
    pub fn publish_with_reply<T: Any + Send + Sync>(
        &self,
        topic: &str,
        message: T,
        reply_to: &str,
    ) -> Result<(), QueueFullError> {
        self.publish_envelope(TransferEnvelope::new(topic, message).with_reply_to(reply_to))
    }

    /// Publish a pre-assembled envelope, stamping this context as sender.
    pub fn publish_envelope(&self, envelope: TransferEnvelope) -> Result<(), QueueFullError> {
        self.bus
            .publish(envelope.with_sender(self.thread.name()))
    }

    /// Publish `message` on `topic` and return a handle that completes
    /// with the first envelope published to a freshly generated reply
    /// topic.
    ///
    /// The reply subscription bypasses the process thread: the slot is
    /// filled and signalled directly on the bus thread, so any thread may
    /// block on the handle - including this context's own.
    pub fn send_request<T: Any + Send + Sync, M: Any + Send + Sync>(
        &self,
        topic: &str,
        message: M,
    ) -> Result<RequestReply<T>, QueueFullError> {
        let reply_topic = self.create_unique_topic();
        let state = ReplyState::new();

        let completion = Arc::clone(&state);
        let unsubscriber = self.registry.subscribe(
            Arc::new(ExactTopicMatcher::new(reply_topic.as_str())),
            Arc::new(move |envelope: &TransferEnvelope| {
                completion.complete(envelope.header().clone(), Arc::clone(envelope.payload()));
            }),
        );
        state.attach_unsubscriber(unsubscriber);

        let handle = RequestReply::new(Arc::clone(&state));
        self.publish_with_reply(topic, message, &reply_topic)?;
        Ok(handle)
    }

    /// A fresh opaque topic, distinct from every other such value.
    pub fn create_unique_topic(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a queue-full listener; returns its removal id.
    pub fn on_queue_full(&self, listener: impl Fn(&QueueFullEvent) + Send + Sync + 'static) -> u64 {
        self.queue_full.add(Arc::new(listener))
    }

    /// Remove a previously registered queue-full listener.
    pub fn remove_queue_full_listener(&self, id: u64) {
        self.queue_full.remove(id);
    }

    /// Enqueue a command directly onto the owning process thread.
    pub fn enqueue(&self, command: crate::queue::Command) -> Result<(), QueueFullError> {
        self.thread.enqueue(command)
    }

    /// Schedule a command on the owning process thread.
    pub fn schedule(
        &self,
        command: impl Fn() + Send + Sync + 'static,
        delay_ms: u64,
    ) -> TimerControl {
        self.thread.schedule(command, delay_ms)
    }

    /// Schedule a recurring command on the owning process thread.
    pub fn schedule_on_interval(
        &self,
        command: impl Fn() + Send + Sync + 'static,
        first_delay_ms: u64,
        interval_ms: u64,
    ) -> TimerControl {
        self.thread
            .schedule_on_interval(command, first_delay_ms, interval_ms)
    }
}
