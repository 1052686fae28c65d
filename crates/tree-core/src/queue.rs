//! Per-key sequential task queue.
//!
//! Jobs sharing a key run one at a time in submission order; jobs on
//! disjoint keys run concurrently. A job may register under several keys and
//! then waits for the previous job on each of them.

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// Completion signal of the last job registered under a key.
type Tail = Shared<BoxFuture<'static, ()>>;

#[derive(Default)]
struct QueueState {
    /// Key → (ticket of the job that owns the tail, its completion).
    tails: HashMap<String, (u64, Tail)>,
    next_ticket: u64,
    handles: Vec<JoinHandle<()>>,
}

/// Must be used from within a Tokio runtime.
#[derive(Clone, Default)]
pub struct KeyedQueue {
    state: Arc<Mutex<QueueState>>,
}

impl KeyedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `job` after every earlier job on any of `keys` has finished.
    pub fn enqueue<K, F>(&self, keys: impl IntoIterator<Item = K>, job: F)
    where
        K: Into<String>,
        F: Future<Output = ()> + Send + 'static,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let (done_tx, done_rx) = oneshot::channel::<()>();
        // Resolves on send or when the sender is dropped (job aborted).
        let done: Tail = async move {
            let _ = done_rx.await;
        }
        .boxed()
        .shared();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        let predecessors: Vec<Tail> = keys
            .iter()
            .filter_map(|k| state.tails.get(k).map(|(_, tail)| tail.clone()))
            .collect();
        for key in &keys {
            state.tails.insert(key.clone(), (ticket, done.clone()));
        }
        trace!(ticket, keys = ?keys, waiting_on = predecessors.len(), "enqueued job");

        let shared_state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            join_all(predecessors).await;
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                error!(ticket, "queued job panicked");
            }
            let _ = done_tx.send(());

            let mut state = shared_state.lock().unwrap_or_else(|e| e.into_inner());
            for key in &keys {
                if state.tails.get(key).is_some_and(|(owner, _)| *owner == ticket) {
                    state.tails.remove(key);
                }
            }
        });

        state.handles.retain(|h| !h.is_finished());
        state.handles.push(handle);
    }

    /// Wait until every job enqueued so far, and any enqueued meanwhile,
    /// has finished.
    pub async fn settle(&self) {
        loop {
            let handles = {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut state.handles)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    /// Number of keys with a job queued or running.
    pub fn busy_keys(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).tails.len()
    }
}
