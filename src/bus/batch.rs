//! Time-window batching wrappers over subscribe + schedule.
//!
//! Both wrappers collect messages on the owning process thread and flush
//! them from a command scheduled on that same thread, so collection and
//! delivery are serial with every other callback of the context. At most
//! one flush is scheduled at a time; messages arriving while a flush
//! command sits in the queue wait for the next window.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::envelope::{MessageHeader, Payload};
use crate::process_thread::ProcessThread;

/// One collected message: the header it arrived with plus its payload.
pub type BatchedMessage = (MessageHeader, Payload);

/// Handler receiving a whole batch in arrival order.
pub type BatchHandler = Box<dyn Fn(Vec<BatchedMessage>) + Send + Sync>;

struct BatchState {
    pending: Vec<BatchedMessage>,
    flush_scheduled: bool,
}

/// Collects messages for `window_ms` after the first arrival, then hands
/// the whole list to the wrapped handler in one callback.
pub struct BatchSubscriber {
    state: Mutex<BatchState>,
    handler: BatchHandler,
    window_ms: u64,
    thread: Arc<ProcessThread>,
}

impl BatchSubscriber {
    pub fn new(thread: Arc<ProcessThread>, window_ms: u64, handler: BatchHandler) -> Arc<Self> {
        Arc::new(BatchSubscriber {
            state: Mutex::new(BatchState {
                pending: Vec::new(),
                flush_scheduled: false,
            }),
            handler,
            window_ms,
            thread,
        })
    }

    /// Append one message; the first message of a window schedules the
    /// flush.
    pub fn receive_message(self: &Arc<Self>, header: &MessageHeader, payload: &Payload) {
        let mut state = self.state.lock().unwrap();
        state.pending.push((header.clone(), Arc::clone(payload)));
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            drop(state);
            let batcher = Arc::clone(self);
            self.thread
                .schedule(move || batcher.flush(), self.window_ms);
        }
    }

    fn flush(&self) {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.flush_scheduled = false;
            std::mem::take(&mut state.pending)
        };
        if !batch.is_empty() {
            (self.handler)(batch);
        }
    }
}

/// Handler receiving the coalesced key → message mapping.
pub type KeyedBatchHandler<K> = Box<dyn Fn(HashMap<K, BatchedMessage>) + Send + Sync>;

/// Resolves the coalescing key of a message.
pub type KeyResolver<K> = Box<dyn Fn(&MessageHeader, &Payload) -> K + Send + Sync>;

struct KeyedBatchState<K> {
    pending: HashMap<K, BatchedMessage>,
    flush_scheduled: bool,
}

/// Like [`BatchSubscriber`], but coalesces messages by key within the
/// window: the last message per key wins.
pub struct KeyedBatchSubscriber<K> {
    state: Mutex<KeyedBatchState<K>>,
    key_resolver: KeyResolver<K>,
    handler: KeyedBatchHandler<K>,
    window_ms: u64,
    thread: Arc<ProcessThread>,
}

impl<K: Eq + Hash + Send + Sync + 'static> KeyedBatchSubscriber<K> {
    pub fn new(
        thread: Arc<ProcessThread>,
        window_ms: u64,
        key_resolver: KeyResolver<K>,
        handler: KeyedBatchHandler<K>,
    ) -> Arc<Self> {
        Arc::new(KeyedBatchSubscriber {
            state: Mutex::new(KeyedBatchState {
                pending: HashMap::new(),
                flush_scheduled: false,
            }),
            key_resolver,
            handler,
            window_ms,
            thread,
        })
    }

    pub fn receive_message(self: &Arc<Self>, header: &MessageHeader, payload: &Payload) {
        let key = (self.key_resolver)(header, payload);
        let mut state = self.state.lock().unwrap();
        state
            .pending
            .insert(key, (header.clone(), Arc::clone(payload)));
        if !state.flush_scheduled {
            state.flush_scheduled = true;
            drop(state);
            let batcher = Arc::clone(self);
            self.thread
                .schedule(move || batcher.flush(), self.window_ms);
        }
    }

    fn flush(&self) {
        let batch = {
            let mut state = self.state.lock().unwrap();
            state.flush_scheduled = false;
            std::mem::take(&mut state.pending)
        };
        if !batch.is_empty() {
            (self.handler)(batch);
        }
    }
}
