use futures::stream::BoxStream;

use crate::mutations::{self, Mutations};
use crate::pipeline::Pipeline;

/// How an action becomes a mutation when `mutate` is not overridden.
///
/// When a combiner uses its action type as its mutation type, the blanket
/// impl makes every action its own mutation. Combiners with a distinct
/// mutation type opt out with an empty impl (or [`distinct_mutation!`]),
/// which derives no mutations.
///
/// [`distinct_mutation!`]: crate::distinct_mutation
pub trait FromAction<A>: Sized {
    fn from_action(action: A) -> Option<Self> {
        let _ = action;
        None
    }
}

impl<A> FromAction<A> for A {
    fn from_action(action: A) -> Option<A> {
        Some(action)
    }
}

/// A stateful component driven by actions.
///
/// Actions come in, [`mutate`](Combiner::mutate) turns each one into a
/// sequence of mutations (doing any IO on the way), and
/// [`reduce`](Combiner::reduce) folds mutations into state, one at a time.
/// The pipeline lives in a [`Pipeline`] record the combiner owns and is
/// built lazily on first access through [`CombinerExt`](crate::CombinerExt).
///
/// The `transform_*` hooks run once, when the pipeline is built, and run
/// under the build lock: they may read `current_state` but must not touch
/// this instance's action sink or state stream.
///
/// # Example
///
/// ```ignore
/// struct Counter {
///     pipeline: Pipeline<Counter>,
/// }
///
/// impl Combiner for Counter {
///     type Action = CounterAction;
///     type Mutation = CounterMutation;
///     type State = CounterState;
///
///     fn pipeline(&self) -> &Pipeline<Self> {
///         &self.pipeline
///     }
///
///     fn mutate(&self, action: CounterAction) -> Mutations<CounterMutation> {
///         match action {
///             CounterAction::Increment => mutations::just(CounterMutation::Incremented),
///         }
///     }
///
///     fn reduce(&self, mut state: CounterState, mutation: CounterMutation) -> CounterState {
///         match mutation {
///             CounterMutation::Incremented => state.count += 1,
///         }
///         state
///     }
/// }
///
/// distinct_mutation!(CounterMutation, CounterAction);
/// ```
pub trait Combiner: Send + Sync + Sized + 'static {
    /// External input.
    type Action: Clone + Send + Sync + 'static;
    /// Atomic state transition derived from an action.
    type Mutation: FromAction<Self::Action> + Send + 'static;
    /// Everything a consumer needs to render or react.
    type State: Clone + Send + Sync + 'static;

    /// The pipeline record embedded in this combiner.
    ///
    /// Must return the same record on every call.
    fn pipeline(&self) -> &Pipeline<Self>;

    /// Rewrite the raw action stream, e.g. to merge in external actions or
    /// to throttle.
    fn transform_action(
        &self,
        action: BoxStream<'static, Self::Action>,
    ) -> BoxStream<'static, Self::Action> {
        action
    }

    /// Produce the mutations for one action.
    ///
    /// The returned stream must not hold a strong reference to `self`;
    /// clone whatever the side effect needs. Recoverable failures should be
    /// mapped to mutations (see [`mutations::try_future`]).
    fn mutate(&self, action: Self::Action) -> Mutations<Self::Mutation> {
        match Self::Mutation::from_action(action) {
            Some(mutation) => mutations::just(mutation),
            None => mutations::none(),
        }
    }

    /// Rewrite the merged mutation stream, e.g. to merge in mutations from
    /// a shared service.
    fn transform_mutation(
        &self,
        mutation: BoxStream<'static, Self::Mutation>,
    ) -> BoxStream<'static, Self::Mutation> {
        mutation
    }

    /// Fold one mutation into the state. Must be pure and must not block.
    fn reduce(&self, state: Self::State, mutation: Self::Mutation) -> Self::State {
        let _ = mutation;
        state
    }

    /// Rewrite the state stream, e.g. with
    /// [`distinct_until_changed`](crate::StateStreamExt::distinct_until_changed).
    ///
    /// The stream's first item is the initial state.
    fn transform_state(
        &self,
        state: BoxStream<'static, Self::State>,
    ) -> BoxStream<'static, Self::State> {
        state
    }
}
