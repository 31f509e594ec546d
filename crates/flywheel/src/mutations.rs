//! Constructors for the mutation sequences returned by
//! [`Combiner::mutate`](crate::Combiner::mutate).
//!
//! A mutation sequence is an ordered, possibly empty, possibly asynchronous
//! stream. Sequences from different actions run concurrently; mutations inside
//! one sequence are folded in the order they are yielded.

use std::future::Future;

use futures::future;
use futures::stream::{self, BoxStream, StreamExt};

/// The mutation sequence produced for one action.
pub type Mutations<M> = BoxStream<'static, M>;

/// No mutations. The default for combiners whose mutations are not derived
/// from their actions.
pub fn none<M: Send + 'static>() -> Mutations<M> {
    stream::empty().boxed()
}

/// Exactly one mutation, available immediately.
pub fn just<M: Send + 'static>(mutation: M) -> Mutations<M> {
    stream::once(future::ready(mutation)).boxed()
}

/// A fixed list of mutations, yielded in order.
pub fn iter<I>(mutations: I) -> Mutations<I::Item>
where
    I: IntoIterator,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    stream::iter(mutations).boxed()
}

/// One mutation produced by a side effect.
pub fn future<F>(effect: F) -> Mutations<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    stream::once(effect).boxed()
}

/// One mutation produced by a fallible side effect.
///
/// Failures never reach the pipeline: `on_error` turns them into a mutation,
/// usually an error-carrying variant. A failure that escaped would terminate
/// the shared state stream for good.
///
/// ```ignore
/// fn mutate(&self, action: SearchAction) -> Mutations<SearchMutation> {
///     let api = self.api.clone();
///     match action {
///         SearchAction::Query(q) => mutations::try_future(
///             async move { Ok(SearchMutation::Results(api.search(&q).await?)) },
///             |e| SearchMutation::Failed(e.to_string()),
///         ),
///     }
/// }
/// ```
pub fn try_future<M, F, E>(effect: F, on_error: E) -> Mutations<M>
where
    M: Send + 'static,
    F: Future<Output = anyhow::Result<M>> + Send + 'static,
    E: FnOnce(anyhow::Error) -> M + Send + 'static,
{
    stream::once(async move {
        match effect.await {
            Ok(mutation) => mutation,
            Err(e) => {
                tracing::debug!(error = %e, "side effect failed, folding as mutation");
                on_error(e)
            }
        }
    })
    .boxed()
}

/// Run sequences one after another.
///
/// The usual shape for a loading flow: `[SetLoading(true), fetch, SetLoading(false)]`.
pub fn concat<M: Send + 'static>(sequences: Vec<Mutations<M>>) -> Mutations<M> {
    stream::iter(sequences).flatten().boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Mutation {
        Loading(bool),
        Loaded(u32),
        Failed(String),
    }

    #[tokio::test]
    async fn test_none_is_empty() {
        let out: Vec<Mutation> = none::<Mutation>().collect().await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_try_future_maps_failure_to_mutation() {
        let ok = try_future(async { Ok(Mutation::Loaded(3)) }, |e| {
            Mutation::Failed(e.to_string())
        });
        let failed = try_future(async { Err(anyhow!("timeout")) }, |e| {
            Mutation::Failed(e.to_string())
        });

        assert_eq!(ok.collect::<Vec<_>>().await, vec![Mutation::Loaded(3)]);
        assert_eq!(
            failed.collect::<Vec<_>>().await,
            vec![Mutation::Failed("timeout".to_string())]
        );
    }

    #[tokio::test]
    async fn test_concat_preserves_order_across_async_steps() {
        let loading = concat(vec![
            just(Mutation::Loading(true)),
            future(async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Mutation::Loaded(1)
            }),
            just(Mutation::Loading(false)),
        ]);

        assert_eq!(
            loading.collect::<Vec<_>>().await,
            vec![
                Mutation::Loading(true),
                Mutation::Loaded(1),
                Mutation::Loading(false)
            ]
        );
    }
}
