//! Request/reply correlation over ephemeral topics.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::bus::registry::Unsubscriber;
use crate::envelope::{MessageHeader, Payload};

struct ReplySlot {
    reply: Option<(MessageHeader, Payload)>,
    done: bool,
    unsubscriber: Option<Unsubscriber>,
}

/// Shared completion state between the reply subscription (filled on the
/// bus thread) and blocking waiters (any thread).
pub(crate) struct ReplyState {
    slot: Mutex<ReplySlot>,
    signal: Condvar,
}

impl ReplyState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(ReplyState {
            slot: Mutex::new(ReplySlot {
                reply: None,
                done: false,
                unsubscriber: None,
            }),
            signal: Condvar::new(),
        })
    }

    /// Attach the subscription handle torn down on completion.
    pub(crate) fn attach_unsubscriber(&self, unsubscriber: Unsubscriber) {
        let mut slot = self.slot.lock().unwrap();
        if slot.done {
            // Completed or cancelled before the handle arrived.
            drop(slot);
            unsubscriber.unsubscribe();
        } else {
            slot.unsubscriber = Some(unsubscriber);
        }
    }

    /// Record the first matching reply and wake waiters. Later calls are
    /// no-ops.
    pub(crate) fn complete(&self, header: MessageHeader, payload: Payload) {
        let unsubscriber = {
            let mut slot = self.slot.lock().unwrap();
            if slot.done {
                return;
            }
            slot.done = true;
            slot.reply = Some((header, payload));
            self.signal.notify_all();
            slot.unsubscriber.take()
        };
        if let Some(unsubscriber) = unsubscriber {
            unsubscriber.unsubscribe();
        }
    }

    /// Terminal without a reply: tear the subscription down and release
    /// waiters.
    fn dispose(&self) {
        let unsubscriber = {
            let mut slot = self.slot.lock().unwrap();
            slot.done = true;
            self.signal.notify_all();
            slot.unsubscriber.take()
        };
        if let Some(unsubscriber) = unsubscriber {
            unsubscriber.unsubscribe();
        }
    }
}

/// Handle for one in-flight request.
///
/// Completes exactly once, with the first envelope published to the
/// generated reply topic. Terminal after that first reply or an explicit
/// [`cancel`](RequestReply::cancel); dropping the handle also tears the
/// reply subscription down, so later publications on the reply topic go
/// nowhere.
pub struct RequestReply<T> {
    state: Arc<ReplyState>,
    _reply_type: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> RequestReply<T> {
    pub(crate) fn new(state: Arc<ReplyState>) -> Self {
        RequestReply {
            state,
            _reply_type: PhantomData,
        }
    }

    /// Block until the reply arrives or `timeout` elapses, returning the
    /// payload downcast to `T`. `None` on timeout, cancellation, or a
    /// payload of an unexpected type.
    pub fn wait(&self, timeout: Duration) -> Option<Arc<T>> {
        self.wait_envelope(timeout)
            .and_then(|(_, payload)| payload.downcast::<T>().ok())
    }

    /// Block until the reply arrives or `timeout` elapses, returning the
    /// raw header and payload.
    pub fn wait_envelope(&self, timeout: Duration) -> Option<(MessageHeader, Payload)> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.state.slot.lock().unwrap();
        loop {
            if let Some((header, payload)) = &slot.reply {
                return Some((header.clone(), Arc::clone(payload)));
            }
            if slot.done {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self.state.signal.wait_timeout(slot, deadline - now).unwrap();
            slot = guard;
        }
    }

    /// The reply, if it has already arrived. Non-blocking.
    pub fn try_reply(&self) -> Option<(MessageHeader, Payload)> {
        let slot = self.state.slot.lock().unwrap();
        slot.reply
            .as_ref()
            .map(|(header, payload)| (header.clone(), Arc::clone(payload)))
    }

    /// Whether the handle is terminal (replied or cancelled).
    pub fn is_done(&self) -> bool {
        self.state.slot.lock().unwrap().done
    }

    /// Stop waiting for a reply and tear the subscription down.
    /// Idempotent; a reply that already arrived stays readable.
    pub fn cancel(&self) {
        self.state.dispose();
    }
}

impl<T> Drop for RequestReply<T> {
    fn drop(&mut self) {
        self.state.dispose();
    }
}
