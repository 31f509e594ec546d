//! Shared state fan-out.
//!
//! One driver publishes into a [`StateHub`]; any number of subscribers read
//! through [`StateStream`]s. Each subscriber first sees the hub's replay
//! value, then every state published after it attached. Every subscriber has
//! its own unbounded queue, so a slow subscriber never loses a state. It only
//! holds more of them; past the configured backlog a warning is logged.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use uuid::Uuid;

/// Which value a new subscriber receives before live states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Replay {
    /// The first state ever published.
    Head,
    /// The most recently published state.
    Latest,
}

struct Subscriber<S> {
    queue: mpsc::UnboundedSender<S>,
    backlog: Arc<AtomicUsize>,
}

struct HubInner<S> {
    replay_value: Option<S>,
    subscribers: Vec<Subscriber<S>>,
    closed: bool,
}

/// Single-producer, multi-subscriber state fan-out.
pub(crate) struct StateHub<S> {
    id: Uuid,
    replay: Replay,
    backlog_warning: usize,
    inner: Mutex<HubInner<S>>,
}

impl<S: Clone + Send + 'static> StateHub<S> {
    pub(crate) fn new(id: Uuid, backlog_warning: usize, replay: Replay) -> Self {
        Self {
            id,
            replay,
            backlog_warning,
            inner: Mutex::new(HubInner {
                replay_value: None,
                subscribers: Vec::new(),
                closed: false,
            }),
        }
    }

    /// A hub that already holds `initial` as its replay value.
    pub(crate) fn seeded(id: Uuid, backlog_warning: usize, initial: S) -> Self {
        let hub = Self::new(id, backlog_warning, Replay::Latest);
        hub.lock().replay_value = Some(initial);
        hub
    }

    fn lock(&self) -> MutexGuard<'_, HubInner<S>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish `state` to every subscriber.
    ///
    /// `write_back` runs under the hub lock before delivery, so a subscriber
    /// that has received a state can already read it back synchronously.
    pub(crate) fn publish(&self, state: S, write_back: impl FnOnce(&S)) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        write_back(&state);

        match self.replay {
            Replay::Head if inner.replay_value.is_some() => {}
            _ => inner.replay_value = Some(state.clone()),
        }

        let id = self.id;
        let threshold = self.backlog_warning;
        // Dropped subscribers fall out here.
        inner.subscribers.retain(|subscriber| {
            if subscriber.queue.unbounded_send(state.clone()).is_err() {
                return false;
            }
            let backlog = subscriber.backlog.fetch_add(1, Ordering::Relaxed) + 1;
            if backlog == threshold {
                tracing::warn!(combiner = %id, backlog, "subscriber is falling behind");
            }
            true
        });
    }

    /// Attach a new subscriber.
    pub(crate) fn subscribe(&self) -> StateStream<S> {
        let mut inner = self.lock();
        let replay = inner.replay_value.clone();

        let live = if inner.closed {
            stream::empty().boxed()
        } else {
            let (queue, receiver) = mpsc::unbounded();
            let backlog = Arc::new(AtomicUsize::new(0));
            inner.subscribers.push(Subscriber {
                queue,
                backlog: backlog.clone(),
            });
            receiver
                .inspect(move |_| {
                    backlog.fetch_sub(1, Ordering::Relaxed);
                })
                .boxed()
        };
        drop(inner);

        match replay {
            Some(value) => StateStream::new(stream::once(future::ready(value)).chain(live)),
            None => StateStream::new(live),
        }
    }

    #[cfg(test)]
    pub(crate) fn replay_value(&self) -> Option<S> {
        self.lock().replay_value.clone()
    }

    /// End every subscriber's stream once it has drained. Nothing published
    /// afterwards is delivered.
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }
}

/// A subscriber's view of a combiner's states.
///
/// The first item is always the initial state. The stream ends only if the
/// pipeline terminates or its combiner is dropped.
pub struct StateStream<S> {
    inner: BoxStream<'static, S>,
}

impl<S> StateStream<S> {
    pub(crate) fn new(inner: impl Stream<Item = S> + Send + 'static) -> Self {
        Self {
            inner: inner.boxed(),
        }
    }

    pub fn into_inner(self) -> BoxStream<'static, S> {
        self.inner
    }
}

impl<S> Stream for StateStream<S> {
    type Item = S;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<S>> {
        self.inner.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A state field that notifies on every assignment, even of an equal value.
///
/// Useful for one-shot signals such as an alert message: consumers read it
/// through [`StateStreamExt::pulse`] and see each assignment exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pulse<T> {
    value: T,
    update_count: u64,
}

impl<T> Pulse<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            update_count: 0,
        }
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.update_count = self.update_count.wrapping_add(1);
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }
}

impl<T> std::ops::Deref for Pulse<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Combinators for state streams.
pub trait StateStreamExt: Stream + Sized + Send + 'static {
    /// Drop states equal to the one just before them.
    fn distinct_until_changed(self) -> BoxStream<'static, Self::Item>
    where
        Self::Item: PartialEq + Clone + Send + 'static,
    {
        self.scan(None::<Self::Item>, |last, state| {
            let emit = if last.as_ref() == Some(&state) {
                None
            } else {
                *last = Some(state.clone());
                Some(state)
            };
            future::ready(Some(emit))
        })
        .filter_map(future::ready)
        .boxed()
    }

    /// Read one field out of each state.
    fn project<T, F>(self, field: F) -> BoxStream<'static, T>
    where
        F: FnMut(Self::Item) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.map(field).boxed()
    }

    /// Yield a [`Pulse`] field's value once per assignment.
    ///
    /// The value present in the first state is always yielded.
    fn pulse<T, F>(self, field: F) -> BoxStream<'static, T>
    where
        F: Fn(&Self::Item) -> &Pulse<T> + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.scan(None::<u64>, move |seen, state| {
            let pulse = field(&state);
            let emit = if *seen == Some(pulse.update_count()) {
                None
            } else {
                *seen = Some(pulse.update_count());
                Some(pulse.value().clone())
            };
            future::ready(Some(emit))
        })
        .filter_map(future::ready)
        .boxed()
    }
}

impl<St> StateStreamExt for St where St: Stream + Sized + Send + 'static {}
