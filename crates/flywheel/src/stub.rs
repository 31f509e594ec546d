//! Inert stand-in for a combiner's pipeline, for testing its consumers.
//!
//! With the stub enabled, actions are recorded instead of mutated and state
//! is whatever the test sets. This separates "did the consumer send the
//! right action" from "does the pipeline compute the right state", which is
//! tested on the real pipeline.
//!
//! Enabling the stub does not reroute anything that already holds the real
//! action sender or state stream. Only later accesses see the stub.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::combiner::Combiner;
use crate::config::PipelineConfig;
use crate::state::{StateHub, StateStream};

const ACTION_FEED_CAPACITY: usize = 256;

/// Ordered record of every action a stub received.
pub(crate) struct ActionLog<A> {
    id: Uuid,
    entries: Mutex<VecDeque<A>>,
    limit: Option<usize>,
    feed: broadcast::Sender<A>,
}

impl<A: Clone + Send + 'static> ActionLog<A> {
    fn new(id: Uuid, limit: Option<usize>) -> Self {
        let (feed, _) = broadcast::channel(ACTION_FEED_CAPACITY);
        Self {
            id,
            entries: Mutex::new(VecDeque::new()),
            limit,
            feed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<A>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, action: A) {
        let mut entries = self.lock();
        entries.push_back(action.clone());
        if let Some(limit) = self.limit {
            while entries.len() > limit {
                entries.pop_front();
            }
        }
        // Hold the lock while feeding so live observers see log order.
        let _ = self.feed.send(action);
        tracing::trace!(combiner = %self.id, logged = entries.len(), "stub recorded action");
    }
}

/// Adapt the action feed into a stream that skips over lag.
fn feed_stream<A>(receiver: broadcast::Receiver<A>, id: Uuid) -> BoxStream<'static, A>
where
    A: Clone + Send + 'static,
{
    stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(action) => return Some((action, receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(combiner = %id, skipped, "action feed lagged, skipping actions");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// The stub for one combiner instance.
///
/// Obtained through [`CombinerExt::stub`](crate::CombinerExt::stub). It is
/// stored in the combiner's own storage and dropped with it.
pub struct Stub<C: Combiner> {
    id: Uuid,
    state: RwLock<C::State>,
    hub: StateHub<C::State>,
    actions: Arc<ActionLog<C::Action>>,
    assigned: AtomicBool,
}

impl<C: Combiner> Stub<C> {
    pub(crate) fn new(id: Uuid, seed: C::State, config: &PipelineConfig) -> Self {
        Self {
            id,
            state: RwLock::new(seed.clone()),
            hub: StateHub::seeded(id, config.backlog_warning, seed),
            actions: Arc::new(ActionLog::new(id, config.action_log_limit)),
            assigned: AtomicBool::new(false),
        }
    }

    /// Move the seed forward to `snapshot` unless a test already assigned a
    /// state.
    pub(crate) fn reseed(&self, snapshot: C::State) {
        if self.assigned.load(Ordering::Acquire) {
            return;
        }
        self.hub.publish(snapshot, |state| {
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
        });
    }

    pub(crate) fn action_log(&self) -> Arc<ActionLog<C::Action>> {
        self.actions.clone()
    }

    /// The state consumers currently see.
    pub fn state(&self) -> C::State {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the state as if the pipeline had produced it.
    ///
    /// Neither `mutate` nor `reduce` is involved.
    pub fn set_state(&self, state: C::State) {
        self.assigned.store(true, Ordering::Release);
        self.hub.publish(state, |state| {
            *self.state.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
        });
        tracing::trace!(combiner = %self.id, "stub state set");
    }

    /// Subscribe to the stub's state: the current value, then every
    /// `set_state`.
    pub fn state_stream(&self) -> StateStream<C::State> {
        self.hub.subscribe()
    }

    /// Every action received so far, oldest first.
    pub fn actions(&self) -> Vec<C::Action> {
        self.actions.lock().iter().cloned().collect()
    }

    pub fn last_action(&self) -> Option<C::Action> {
        self.actions.lock().back().cloned()
    }

    /// Empty the log. Actions recorded before this call are gone for good;
    /// the log is append-only only between clears.
    pub fn clear_actions(&self) {
        self.actions.lock().clear();
    }

    /// Live feed of actions received from now on.
    pub fn subscribe_actions(&self) -> BoxStream<'static, C::Action> {
        feed_stream(self.actions.feed.subscribe(), self.id)
    }
}

impl<C: Combiner> std::fmt::Debug for Stub<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stub")
            .field("id", &self.id)
            .field("logged_actions", &self.actions.lock().len())
            .finish()
    }
}
