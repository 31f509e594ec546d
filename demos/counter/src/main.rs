//! # Counter Example
//!
//! Shows a combiner with a synchronous action, an asynchronous side effect
//! that can fail, and a one-shot alert delivered through a `Pulse`.
//! Failures from the backend become mutations; the pipeline never sees them.

use anyhow::{bail, Result};
use async_trait::async_trait;
use flywheel_core::{
    distinct_mutation, mutations, BoxStream, Combiner, CombinerExt, Mutations, Pipeline,
    PipelineConfig, Pulse, StateStreamExt,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Actions (What happened)
// ============================================================================

#[derive(Debug, Clone)]
enum CounterAction {
    /// User tapped "+"
    Increment,

    /// User tapped "-"
    Decrement,

    /// User pulled to refresh
    Refresh,
}

// ============================================================================
// Mutations (What changed)
// ============================================================================

#[derive(Debug)]
enum CounterMutation {
    Adjusted(i64),
    SetLoading(bool),
    Loaded(i64),
    LoadFailed(String),
}

distinct_mutation!(CounterMutation, CounterAction);

// ============================================================================
// State (What is true)
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct CounterState {
    value: i64,
    is_loading: bool,
    alert: Pulse<Option<String>>,
}

// ============================================================================
// Backend (Side effects)
// ============================================================================

#[async_trait]
trait CounterBackend: Send + Sync {
    async fn fetch(&self) -> Result<i64>;
}

/// Pretends to be a remote service that fails every other call.
struct FlakyBackend {
    calls: AtomicU32,
}

#[async_trait]
impl CounterBackend for FlakyBackend {
    async fn fetch(&self) -> Result<i64> {
        tokio::time::sleep(Duration::from_millis(100)).await;

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call % 2 == 1 {
            bail!("service unavailable");
        }
        Ok(100 + i64::from(call))
    }
}

// ============================================================================
// Combiner
// ============================================================================

struct Counter {
    pipeline: Pipeline<Counter>,
    backend: Arc<dyn CounterBackend>,
}

impl Combiner for Counter {
    type Action = CounterAction;
    type Mutation = CounterMutation;
    type State = CounterState;

    fn pipeline(&self) -> &Pipeline<Self> {
        &self.pipeline
    }

    fn mutate(&self, action: CounterAction) -> Mutations<CounterMutation> {
        match action {
            CounterAction::Increment => mutations::just(CounterMutation::Adjusted(1)),
            CounterAction::Decrement => mutations::just(CounterMutation::Adjusted(-1)),
            CounterAction::Refresh => {
                if self.pipeline.current_state().is_loading {
                    return mutations::none();
                }

                let backend = self.backend.clone();
                mutations::concat(vec![
                    mutations::just(CounterMutation::SetLoading(true)),
                    mutations::try_future(
                        async move { backend.fetch().await.map(CounterMutation::Loaded) },
                        |e| CounterMutation::LoadFailed(e.to_string()),
                    ),
                    mutations::just(CounterMutation::SetLoading(false)),
                ])
            }
        }
    }

    fn reduce(&self, mut state: CounterState, mutation: CounterMutation) -> CounterState {
        match mutation {
            CounterMutation::Adjusted(delta) => state.value += delta,
            CounterMutation::SetLoading(loading) => state.is_loading = loading,
            CounterMutation::Loaded(value) => state.value = value,
            CounterMutation::LoadFailed(reason) => {
                state.alert.set(Some(format!("refresh failed: {}", reason)));
            }
        }
        state
    }

    fn transform_state(
        &self,
        state: BoxStream<'static, CounterState>,
    ) -> BoxStream<'static, CounterState> {
        state.distinct_until_changed()
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter_demo=info,flywheel_core=debug".into()),
        )
        .init();

    let counter = Arc::new(Counter {
        pipeline: Pipeline::with_config(
            CounterState::default(),
            PipelineConfig::default().with_label("counter"),
        )?,
        backend: Arc::new(FlakyBackend {
            calls: AtomicU32::new(0),
        }),
    });

    // Render loop: log every value change.
    let mut values = counter
        .state()
        .project(|state| state.value)
        .distinct_until_changed();
    let render = tokio::spawn(async move {
        while let Some(value) = values.next().await {
            tracing::info!(value, "rendered");
        }
    });

    // Alerts fire once per assignment.
    let mut alerts = counter.state().pulse(|state| &state.alert);
    let alert = tokio::spawn(async move {
        while let Some(message) = alerts.next().await {
            if let Some(message) = message {
                tracing::warn!(%message, "alert");
            }
        }
    });

    counter.send(CounterAction::Increment);
    counter.send(CounterAction::Increment);
    counter.send(CounterAction::Decrement);

    for _ in 0..3 {
        counter.send(CounterAction::Refresh);
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    tracing::info!(state = ?counter.current_state(), "final state");

    drop(counter);
    render.await?;
    alert.await?;

    Ok(())
}
