//! Stub overlay: recorded actions, directly set state, routing after enable.

use crate::{mutations, Combiner, CombinerExt, Mutations, Pipeline, PipelineConfig};
use flywheel_testing::{next_state, take_states};
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
enum SearchAction {
    Query(String),
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
enum SearchMutation {
    SetQuery(String),
}

crate::distinct_mutation!(SearchMutation, SearchAction);

#[derive(Debug, Clone, Default, PartialEq)]
struct SearchState {
    query: String,
    results: Vec<String>,
}

struct Search {
    pipeline: Pipeline<Search>,
    mutate_calls: AtomicUsize,
    reduce_calls: AtomicUsize,
}

impl Search {
    fn new() -> Arc<Self> {
        Self::with_config(PipelineConfig::default())
    }

    fn with_config(config: PipelineConfig) -> Arc<Self> {
        Arc::new(Self {
            pipeline: Pipeline::with_config(SearchState::default(), config).unwrap(),
            mutate_calls: AtomicUsize::new(0),
            reduce_calls: AtomicUsize::new(0),
        })
    }
}

impl Combiner for Search {
    type Action = SearchAction;
    type Mutation = SearchMutation;
    type State = SearchState;

    fn pipeline(&self) -> &Pipeline<Self> {
        &self.pipeline
    }

    fn mutate(&self, action: SearchAction) -> Mutations<SearchMutation> {
        self.mutate_calls.fetch_add(1, Ordering::SeqCst);
        match action {
            SearchAction::Query(query) => mutations::just(SearchMutation::SetQuery(query)),
            SearchAction::Clear => mutations::just(SearchMutation::SetQuery(String::new())),
        }
    }

    fn reduce(&self, mut state: SearchState, mutation: SearchMutation) -> SearchState {
        self.reduce_calls.fetch_add(1, Ordering::SeqCst);
        let SearchMutation::SetQuery(query) = mutation;
        state.query = query;
        state
    }
}

fn query(q: &str) -> SearchAction {
    SearchAction::Query(q.to_string())
}

fn showing(q: &str, results: &[&str]) -> SearchState {
    SearchState {
        query: q.to_string(),
        results: results.iter().map(|r| r.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_stubbed_actions_are_logged_not_reduced() {
    let search = Search::new();
    let stub = search.enable_stub();

    search.send(query("rust"));
    search.action().send(SearchAction::Clear);

    assert_eq!(stub.actions(), vec![query("rust"), SearchAction::Clear]);
    assert_eq!(stub.last_action(), Some(SearchAction::Clear));
    assert_eq!(search.current_state(), SearchState::default());
    assert_eq!(search.mutate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(search.reduce_calls.load(Ordering::SeqCst), 0);
    assert!(!search.is_built());
}

#[tokio::test]
async fn test_set_state_is_observed_by_consumers() {
    let search = Search::new();
    let stub = search.enable_stub();
    let mut states = search.state();

    stub.set_state(showing("rust", &["tokio", "futures"]));

    assert_eq!(
        take_states(&mut states, 2).await,
        vec![SearchState::default(), showing("rust", &["tokio", "futures"])]
    );
    assert_eq!(search.current_state(), showing("rust", &["tokio", "futures"]));
    assert_eq!(search.reduce_calls.load(Ordering::SeqCst), 0);

    let mut late = search.state();
    assert_eq!(next_state(&mut late).await, showing("rust", &["tokio", "futures"]));
}

#[tokio::test]
async fn test_enable_after_build_keeps_existing_subscriptions() {
    let search = Search::new();
    let real_sender = search.action();
    let mut real_states = search.state();
    assert_eq!(next_state(&mut real_states).await, SearchState::default());

    search.send(query("before"));
    assert_eq!(next_state(&mut real_states).await.query, "before");

    let stub = search.enable_stub();
    assert_eq!(stub.state().query, "before");

    // Later accesses go through the stub.
    search.send(query("stubbed"));
    assert_eq!(stub.actions(), vec![query("stubbed")]);
    let mut stubbed_states = search.state();
    assert_eq!(next_state(&mut stubbed_states).await.query, "before");

    // Handles taken earlier still drive the real pipeline.
    real_sender.send(query("after"));
    assert_eq!(next_state(&mut real_states).await.query, "after");
    assert_eq!(stub.actions(), vec![query("stubbed")]);
    assert_eq!(search.current_state().query, "before");
}

#[tokio::test]
async fn test_action_log_limit_drops_oldest() {
    let search = Search::with_config(PipelineConfig::default().with_action_log_limit(2));
    let stub = search.enable_stub();

    for q in ["a", "b", "c"] {
        search.send(query(q));
    }

    assert_eq!(stub.actions(), vec![query("b"), query("c")]);

    stub.clear_actions();
    assert!(stub.actions().is_empty());
    assert_eq!(stub.last_action(), None);
}

#[tokio::test]
async fn test_subscribe_actions_feeds_live() {
    let search = Search::new();
    let stub = search.enable_stub();
    search.send(query("missed"));

    let mut feed = stub.subscribe_actions();
    search.send(query("seen"));
    search.send(SearchAction::Clear);

    assert_eq!(feed.next().await, Some(query("seen")));
    assert_eq!(feed.next().await, Some(SearchAction::Clear));
}

#[tokio::test]
async fn test_stub_is_per_instance() {
    let first = Search::new();
    let second = Search::new();
    first.enable_stub();

    first.send(query("one"));

    assert!(first.is_stub_enabled());
    assert!(!second.is_stub_enabled());
    assert!(second.stub().actions().is_empty());
    assert_ne!(first.id(), second.id());
    assert!(Arc::ptr_eq(&first.stub(), &first.stub()));
}

#[tokio::test]
async fn test_stub_released_with_combiner() {
    let search = Search::new();
    let stub = search.enable_stub();
    assert_eq!(Arc::strong_count(&stub), 2);

    drop(search);

    assert_eq!(Arc::strong_count(&stub), 1);
}

#[tokio::test]
async fn test_stub_inspected_early_starts_from_state_at_enable() {
    let search = Search::new();
    let _early = search.stub();

    let mut states = search.state();
    search.send(query("folded"));
    assert_eq!(next_state(&mut states).await, SearchState::default());
    assert_eq!(next_state(&mut states).await.query, "folded");

    let stub = search.enable_stub();

    assert_eq!(search.current_state().query, "folded");
    assert_eq!(stub.state().query, "folded");
    assert_eq!(next_state(&mut search.state()).await.query, "folded");
}

#[tokio::test]
async fn test_state_set_before_enable_is_kept() {
    let search = Search::new();
    search.stub().set_state(showing("preset", &["one"]));

    search.enable_stub();

    assert_eq!(search.current_state(), showing("preset", &["one"]));
}
