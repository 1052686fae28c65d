//! Tree events and the bus that delivers them.
//!
//! `TreeEvent` reports how a background remote call ended. Listeners run on
//! whichever task finished the call, never while the tree lock is held.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Outcome of a background remote call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TreeEvent {
    /// The remote accepted a mutation.
    Confirmed {
        #[serde(rename = "nodeId")]
        node_id: String,
        /// Remote operation name (e.g. "updateDocument", "deleteFolder").
        operation: String,
        /// Milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// The remote rejected a mutation and the node was restored.
    RolledBack {
        #[serde(rename = "nodeId")]
        node_id: String,
        reason: String,
        timestamp: f64,
    },
}

impl TreeEvent {
    pub fn confirmed(node_id: impl Into<String>, operation: impl Into<String>) -> Self {
        TreeEvent::Confirmed {
            node_id: node_id.into(),
            operation: operation.into(),
            timestamp: now_millis(),
        }
    }

    pub fn rolled_back(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        TreeEvent::RolledBack {
            node_id: node_id.into(),
            reason: reason.into(),
            timestamp: now_millis(),
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            TreeEvent::Confirmed { node_id, .. } | TreeEvent::RolledBack { node_id, .. } => node_id,
        }
    }
}

/// What rollback listeners receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackNotice {
    pub node_id: String,
    pub reason: String,
}

fn now_millis() -> f64 {
    web_time::SystemTime::now()
        .duration_since(web_time::UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}

type Listener = Arc<dyn Fn(&TreeEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    by_id: BTreeMap<u64, Listener>,
}

/// Keeps a listener registered. Dropping it removes the listener.
#[must_use = "the listener is removed when the subscription is dropped"]
pub struct Subscription {
    bus: Weak<EventBus>,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

/// Delivers tree events to listeners in registration order.
///
/// Listeners run after the registry lock is released, so a listener may
/// subscribe or drop its own subscription while being called.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Listeners>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        self: &Arc<Self>,
        listener: impl Fn(&TreeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.registry();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.by_id.insert(id, Arc::new(listener));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Listen for rollbacks only.
    pub fn on_rollback(
        self: &Arc<Self>,
        callback: impl Fn(RollbackNotice) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(move |event| {
            if let TreeEvent::RolledBack { node_id, reason, .. } = event {
                callback(RollbackNotice {
                    node_id: node_id.clone(),
                    reason: reason.clone(),
                });
            }
        })
    }

    pub fn emit(&self, event: TreeEvent) {
        self.emit_all([event]);
    }

    /// Deliver a batch against one view of the listener set: a listener
    /// added while the batch is delivered sees none of it.
    pub fn emit_all(&self, events: impl IntoIterator<Item = TreeEvent>) {
        let listeners: Vec<Listener> = self.registry().by_id.values().cloned().collect();
        if listeners.is_empty() {
            return;
        }
        for event in events {
            for listener in &listeners {
                listener(&event);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().by_id.len()
    }

    fn remove(&self, id: u64) {
        self.registry().by_id.remove(&id);
    }

    fn registry(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}
