//! Process contexts and the factory that wires them to a shared runtime.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::bus::{
    BatchedMessage, MessageBus, ProcessBus, QueueFullEvent, RequestReply, Unsubscriber,
};
use crate::envelope::{MessageHeader, Payload};
use crate::error::QueueFullError;
use crate::process_thread::ProcessThread;
use crate::queue::{Command, CommandQueue};
use crate::timer::{TimerControl, TimerThread};

/// Runtime settings applied to contexts the factory creates.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Command queue capacity for new contexts; `None` = unbounded.
    pub queue_capacity: Option<usize>,
}

/// One isolated process context: a dedicated worker thread, its serial
/// command queue, and a bus facade.
///
/// Everything handed to this context - subscriptions, scheduled commands,
/// direct enqueues - runs on its single worker, serially.
///
/// ## Example
///
/// ```no_run
/// use std::time::Duration;
/// use procbus::ProcessContextFactory;
///
/// let factory = ProcessContextFactory::new();
/// let consumer = factory.create("consumer");
/// let producer = factory.create("producer");
/// consumer.start();
/// producer.start();
///
/// let _sub = consumer.subscribe("greetings", |_header, payload| {
///     if let Some(text) = payload.downcast_ref::<String>() {
///         println!("got: {text}");
///     }
/// });
/// producer.publish("greetings", String::from("hello")).unwrap();
///
/// std::thread::sleep(Duration::from_millis(50));
/// consumer.stop();
/// consumer.join();
/// producer.stop();
/// producer.join();
/// factory.shutdown();
/// ```
pub struct ProcessContext {
    thread: Arc<ProcessThread>,
    bus: ProcessBus,
}

impl ProcessContext {
    /// The context's name (also the worker thread name).
    pub fn name(&self) -> &str {
        self.thread.name()
    }

    /// Launch the worker and register on the shared bus. Idempotent.
    pub fn start(&self) {
        self.thread.start();
        self.bus.start();
    }

    /// Unregister from the bus and halt the queue. Idempotent.
    pub fn stop(&self) {
        self.bus.stop();
        self.thread.stop();
    }

    /// Wait for the worker to exit.
    pub fn join(&self) {
        self.thread.join();
    }

    /// Run a command on this context's thread.
    pub fn enqueue(&self, command: Command) -> Result<(), QueueFullError> {
        self.thread.enqueue(command)
    }

    /// Run a command on this context's thread after `delay_ms`.
    pub fn schedule(
        &self,
        command: impl Fn() + Send + Sync + 'static,
        delay_ms: u64,
    ) -> TimerControl {
        self.thread.schedule(command, delay_ms)
    }

    /// Run a command on this context's thread after `first_delay_ms`,
    /// then every `interval_ms` until cancelled.
    pub fn schedule_on_interval(
        &self,
        command: impl Fn() + Send + Sync + 'static,
        first_delay_ms: u64,
        interval_ms: u64,
    ) -> TimerControl {
        self.thread
            .schedule_on_interval(command, first_delay_ms, interval_ms)
    }

    /// Subscribe `handler` to `topic`; it runs on this context's thread.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: impl Fn(&MessageHeader, &Payload) + Send + Sync + 'static,
    ) -> Unsubscriber {
        self.bus.subscribe(topic, handler)
    }

    /// Subscribe a windowed batch handler. See
    /// [`ProcessBus::subscribe_to_batch`].
    pub fn subscribe_to_batch(
        &self,
        topic: &str,
        min_batch_interval_ms: u64,
        handler: impl Fn(Vec<BatchedMessage>) + Send + Sync + 'static,
    ) -> Unsubscriber {
        self.bus
            .subscribe_to_batch(topic, min_batch_interval_ms, handler)
    }

    /// Subscribe a keyed, coalescing batch handler. See
    /// [`ProcessBus::subscribe_to_keyed_batch`].
    pub fn subscribe_to_keyed_batch<K: Eq + Hash + Send + Sync + 'static>(
        &self,
        topic: &str,
        min_batch_interval_ms: u64,
        key_resolver: impl Fn(&MessageHeader, &Payload) -> K + Send + Sync + 'static,
        handler: impl Fn(HashMap<K, BatchedMessage>) + Send + Sync + 'static,
    ) -> Unsubscriber {
        self.bus
            .subscribe_to_keyed_batch(topic, min_batch_interval_ms, key_resolver, handler)
    }

    /// Publish `message` on `topic`.
    pub fn publish<T: Any + Send + Sync>(
        &self,
        topic: &str,
        message: T,
    ) -> Result<(), QueueFullError> {
        self.bus.publish(topic, message)
    }

    /// Publish with a reply-to topic in the header.
    pub fn publish_with_reply<T: Any + Send + Sync>(
        &self,
        topic: &str,
        message: T,
        reply_to: &str,
    ) -> Result<(), QueueFullError> {
        self.bus.publish_with_reply(topic, message, reply_to)
    }

    /// Publish and return a one-shot handle for the first reply.
    pub fn send_request<T: Any + Send + Sync, M: Any + Send + Sync>(
        &self,
        topic: &str,
        message: M,
    ) -> Result<RequestReply<T>, QueueFullError> {
        self.bus.send_request(topic, message)
    }

    /// A fresh opaque topic value.
    pub fn create_unique_topic(&self) -> String {
        self.bus.create_unique_topic()
    }

    /// Listen for receive-path queue overflows on this context.
    pub fn on_queue_full(&self, listener: impl Fn(&QueueFullEvent) + Send + Sync + 'static) -> u64 {
        self.bus.on_queue_full(listener)
    }

    /// Remove a queue-full listener by id.
    pub fn remove_queue_full_listener(&self, id: u64) {
        self.bus.remove_queue_full_listener(id);
    }

    /// The bus facade, for callers composing their own wrappers.
    pub fn process_bus(&self) -> &ProcessBus {
        &self.bus
    }
}

/// Builds process contexts over one shared [`MessageBus`] and one shared
/// [`TimerThread`].
pub struct ProcessContextFactory {
    timer: Arc<TimerThread>,
    bus: Arc<MessageBus>,
    config: Config,
}

impl Default for ProcessContextFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessContextFactory {
    /// Create a runtime with default settings (unbounded queues).
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a runtime with explicit settings.
    pub fn with_config(config: Config) -> Self {
        let timer = TimerThread::new();
        let bus = Arc::new(MessageBus::new(Arc::clone(&timer)));
        bus.start();
        ProcessContextFactory { timer, bus, config }
    }

    /// Create a context with the factory's configured queue capacity.
    /// The context is not started.
    pub fn create(&self, name: &str) -> ProcessContext {
        self.create_with_capacity(name, self.config.queue_capacity)
    }

    /// Create a context with an explicit queue capacity (`None` =
    /// unbounded).
    pub fn create_with_capacity(&self, name: &str, capacity: Option<usize>) -> ProcessContext {
        let queue = Arc::new(match capacity {
            Some(depth) => CommandQueue::bounded(depth),
            None => CommandQueue::new(),
        });
        let thread = Arc::new(ProcessThread::with_queue(
            name,
            queue,
            Arc::clone(&self.timer),
        ));
        let bus = ProcessBus::new(Arc::clone(&thread), Arc::clone(&self.bus));
        ProcessContext { thread, bus }
    }

    /// The shared bus.
    pub fn message_bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// The shared scheduler.
    pub fn timer(&self) -> &Arc<TimerThread> {
        &self.timer
    }

    /// Stop the shared bus and timer. Contexts are stopped by their
    /// owners; call this last.
    pub fn shutdown(&self) {
        self.bus.stop();
        self.bus.join();
        self.timer.stop();
        self.timer.join();
    }
}
