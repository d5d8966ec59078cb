//! Thread-safe collection of topic subscribers.

use std::sync::{Arc, Mutex, Weak};

use crate::envelope::TransferEnvelope;
use crate::topic::TopicMatcher;

/// Callback invoked for every envelope whose topic the subscription's
/// matcher accepts. Runs on the publishing thread (the bus thread in the
/// normal fan-out path).
pub type OnMessage = Arc<dyn Fn(&TransferEnvelope) + Send + Sync>;

struct Subscription {
    id: u64,
    matcher: Arc<dyn TopicMatcher>,
    on_message: OnMessage,
}

struct RegistryState {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

/// Set of subscriptions guarded by a single mutex.
///
/// `publish` snapshots the matching callbacks under the lock and invokes
/// them outside it, so a subscriber may unsubscribe itself during dispatch
/// (request/reply subscriptions do exactly that) without deadlocking.
pub struct SubscriberRegistry {
    state: Mutex<RegistryState>,
}

impl SubscriberRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(SubscriberRegistry {
            state: Mutex::new(RegistryState {
                subscriptions: Vec::new(),
                next_id: 0,
            }),
        })
    }

    /// Register a subscription; returns the handle that removes it.
    pub fn subscribe(
        self: &Arc<Self>,
        matcher: Arc<dyn TopicMatcher>,
        on_message: OnMessage,
    ) -> Unsubscriber {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.subscriptions.push(Subscription {
            id,
            matcher,
            on_message,
        });
        Unsubscriber {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// Remove a subscription by id. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock().unwrap();
        state.subscriptions.retain(|s| s.id != id);
    }

    /// Deliver `envelope` to every subscription whose matcher accepts its
    /// topic. Returns true if at least one subscriber matched.
    ///
    /// A subscription added before this call sees the envelope; one removed
    /// before it does not. Per-subscriber ordering holds because the normal
    /// fan-out path runs on the single bus thread.
    pub fn publish(&self, envelope: &TransferEnvelope) -> bool {
        let matched: Vec<OnMessage> = {
            let state = self.state.lock().unwrap();
            state
                .subscriptions
                .iter()
                .filter(|s| s.matcher.is_match(envelope.header().topic()))
                .map(|s| Arc::clone(&s.on_message))
                .collect()
        };
        let any_matched = !matched.is_empty();
        for on_message in matched {
            (*on_message)(envelope);
        }
        any_matched
    }

    /// Whether any current subscription matches `topic`.
    pub fn matches_any(&self, topic: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.subscriptions.iter().any(|s| s.matcher.is_match(topic))
    }

    /// Number of registered subscriptions.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle removing one subscription from its registry.
///
/// Holds only a weak back-reference, so a forgotten handle does not keep
/// the registry alive. Dropping the handle does *not* unsubscribe;
/// tear-down is explicit.
pub struct Unsubscriber {
    registry: Weak<SubscriberRegistry>,
    id: u64,
}

impl Unsubscriber {
    /// Remove the subscription. Idempotent; a no-op once the registry is
    /// gone.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}
