//! Testing utilities for Flywheel.
//!
//! Helpers for asserting on state streams without hand-rolled timeouts, and
//! for checking what a consumer sent into a stubbed combiner.
//!
//! ```ignore
//! use flywheel_testing::{next_state, StateRecorder};
//!
//! let mut states = counter.state();
//! assert_eq!(next_state(&mut states).await, CounterState { count: 0 });
//!
//! let recorder = StateRecorder::start(counter.state());
//! counter.send(CounterAction::Increment);
//! let seen = recorder.wait_for_len(2).await;
//! ```
//!
//! Stream helpers are generic over [`Stream`], so they also work from
//! `flywheel-core`'s own tests.

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flywheel_core::{Combiner, Stub};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;

/// How long helpers wait before failing the test.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(5);

/// Await the next state, panicking if none arrives in [`DEFAULT_WAIT`].
pub async fn next_state<St>(stream: &mut St) -> St::Item
where
    St: Stream + Unpin,
{
    match tokio::time::timeout(DEFAULT_WAIT, stream.next()).await {
        Ok(Some(state)) => state,
        Ok(None) => panic!("state stream ended while waiting for the next state"),
        Err(_) => panic!("no state within {:?}", DEFAULT_WAIT),
    }
}

/// Await the next `count` states.
pub async fn take_states<St>(stream: &mut St, count: usize) -> Vec<St::Item>
where
    St: Stream + Unpin,
{
    let mut states = Vec::with_capacity(count);
    for _ in 0..count {
        states.push(next_state(stream).await);
    }
    states
}

/// Skip states until one matches `predicate`, and return it.
pub async fn wait_for_state<St, F>(stream: &mut St, mut predicate: F) -> St::Item
where
    St: Stream + Unpin,
    F: FnMut(&St::Item) -> bool,
{
    let search = async {
        while let Some(state) = stream.next().await {
            if predicate(&state) {
                return Some(state);
            }
        }
        None
    };

    match tokio::time::timeout(DEFAULT_WAIT, search).await {
        Ok(Some(state)) => state,
        Ok(None) => panic!("state stream ended before a matching state"),
        Err(_) => panic!("no matching state within {:?}", DEFAULT_WAIT),
    }
}

/// Assert the stream ends within [`DEFAULT_WAIT`], returning what it
/// yielded on the way.
pub async fn expect_end<St>(stream: St) -> Vec<St::Item>
where
    St: Stream,
{
    tokio::time::timeout(DEFAULT_WAIT, stream.collect::<Vec<_>>())
        .await
        .unwrap_or_else(|_| panic!("state stream did not end within {:?}", DEFAULT_WAIT))
}

/// Records every item of a stream in the background.
pub struct StateRecorder<S> {
    states: Arc<Mutex<Vec<S>>>,
    task: JoinHandle<()>,
}

impl<S: Clone + Send + 'static> StateRecorder<S> {
    /// Start recording. Must be called inside a tokio runtime.
    pub fn start<St>(stream: St) -> Self
    where
        St: Stream<Item = S> + Send + 'static,
    {
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = states.clone();
        let task = tokio::spawn(async move {
            futures::pin_mut!(stream);
            while let Some(state) = stream.next().await {
                sink.lock().unwrap().push(state);
            }
        });

        Self { states, task }
    }

    /// Everything recorded so far.
    pub fn states(&self) -> Vec<S> {
        self.states.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the recorded stream has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until at least `len` states are recorded.
    pub async fn wait_for_len(&self, len: usize) -> Vec<S> {
        let poll = async {
            loop {
                let states = self.states();
                if states.len() >= len {
                    return states;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };

        tokio::time::timeout(DEFAULT_WAIT, poll).await.unwrap_or_else(|_| {
            panic!(
                "expected {} states within {:?}, recorded {}",
                len,
                DEFAULT_WAIT,
                self.len()
            )
        })
    }
}

impl<S> Drop for StateRecorder<S> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Assert a stub received exactly `expected`, in order.
pub fn assert_actions<C>(stub: &Stub<C>, expected: &[C::Action])
where
    C: Combiner,
    C::Action: PartialEq + Debug,
{
    let actual = stub.actions();
    assert_eq!(
        actual.as_slice(),
        expected,
        "stub received {:?}, expected {:?}",
        actual,
        expected
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use flywheel_core::{CombinerExt, Pipeline};

    #[derive(Debug, Clone, PartialEq)]
    enum Toggle {
        Flip,
    }

    struct Switch {
        pipeline: Pipeline<Switch>,
    }

    impl Combiner for Switch {
        type Action = Toggle;
        type Mutation = Toggle;
        type State = bool;

        fn pipeline(&self) -> &Pipeline<Self> {
            &self.pipeline
        }

        fn reduce(&self, state: bool, _mutation: Toggle) -> bool {
            !state
        }
    }

    fn switch() -> Arc<Switch> {
        Arc::new(Switch {
            pipeline: Pipeline::new(false),
        })
    }

    #[tokio::test]
    async fn test_recorder_collects_states() {
        let switch = switch();
        let recorder = StateRecorder::start(switch.state());

        switch.send(Toggle::Flip);
        switch.send(Toggle::Flip);

        assert_eq!(recorder.wait_for_len(3).await, vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_wait_for_state_skips_non_matching() {
        let switch = switch();
        let mut states = switch.state();

        switch.send(Toggle::Flip);

        assert!(wait_for_state(&mut states, |on| *on).await);
    }

    #[tokio::test]
    async fn test_assert_actions_on_stub() {
        let switch = switch();
        let stub = switch.enable_stub();

        switch.send(Toggle::Flip);

        assert_actions(&stub, &[Toggle::Flip]);
        assert!(!switch.current_state());
    }

    #[tokio::test]
    async fn test_expect_end_after_drop() {
        let switch = switch();
        let states = switch.state();
        drop(switch);

        let seen = expect_end(states).await;
        assert!(seen.len() <= 1);
    }
}
