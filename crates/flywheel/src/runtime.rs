//! Pipeline assembly and the driver task.
//!
//! ```text
//! ActionSender ──► mpsc ──► transform_action
//!                                │
//!                                ▼ mutate (per action, concurrent)
//!                          flat_map_unordered
//!                                │
//!                                ▼
//!                        transform_mutation
//!                                │
//!                                ▼ reduce (serial)
//!                     initial ─► scan ──► transform_state
//!                                              │
//!                                              ▼ driver task
//!                         write back current state, fan out to subscribers
//! ```
//!
//! The driver holds only a `Weak` reference to the combiner. Dropping the
//! combiner drops its storage, which drops the [`Built`] handle, which
//! aborts the driver along with any mutation still in flight.

use std::sync::{Arc, PoisonError, Weak};

use futures::channel::mpsc;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::combiner::Combiner;
use crate::error::{FlywheelError, Result};
use crate::mutations;
use crate::state::{Replay, StateHub};

/// Aborts the driver task when dropped.
struct Driver(JoinHandle<()>);

impl Drop for Driver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The constructed pipeline of one combiner instance.
pub(crate) struct Built<C: Combiner> {
    pub(crate) sender: mpsc::UnboundedSender<C::Action>,
    pub(crate) hub: Arc<StateHub<C::State>>,
    _driver: Driver,
}

/// Build the pipeline for `combiner` and start driving it.
///
/// Calls each `transform_*` hook exactly once.
pub(crate) fn build<C: Combiner>(combiner: &Arc<C>) -> Result<Built<C>> {
    let handle = Handle::try_current().map_err(|_| FlywheelError::NoRuntime)?;
    let pipeline = combiner.pipeline();
    let id = pipeline.id();

    let (sender, receiver) = mpsc::unbounded();
    let hub = Arc::new(StateHub::new(
        id,
        pipeline.config().backlog_warning,
        Replay::Head,
    ));

    let states = assemble(combiner, receiver.boxed());
    let task = handle.spawn(drive(Arc::downgrade(combiner), hub.clone(), states, id));

    tracing::debug!(
        combiner = %id,
        label = pipeline.config().label.as_deref().unwrap_or(""),
        "pipeline built"
    );

    Ok(Built {
        sender,
        hub,
        _driver: Driver(task),
    })
}

/// Wire action stream to state stream.
fn assemble<C: Combiner>(
    combiner: &Arc<C>,
    actions: BoxStream<'static, C::Action>,
) -> BoxStream<'static, C::State> {
    let id = combiner.pipeline().id();
    let initial = combiner.pipeline().initial_state();

    let actions = combiner.transform_action(actions);

    // Production overlaps across actions; each sequence keeps its own order.
    let producer = Arc::downgrade(combiner);
    let produced = actions
        .flat_map_unordered(None::<usize>, move |action| match producer.upgrade() {
            Some(combiner) => {
                tracing::trace!(combiner = %id, "mutating action");
                combiner.mutate(action)
            }
            None => mutations::none(),
        })
        .boxed();

    let produced = combiner.transform_mutation(produced);

    // The fold is the only place state advances, one mutation at a time.
    let reducer = Arc::downgrade(combiner);
    let folded = produced.scan(initial.clone(), move |state, mutation| {
        let next = reducer.upgrade().map(|combiner| {
            let next = combiner.reduce(state.clone(), mutation);
            *state = next.clone();
            next
        });
        future::ready(next)
    });

    let states = stream::once(future::ready(initial)).chain(folded).boxed();
    combiner.transform_state(states)
}

async fn drive<C: Combiner>(
    combiner: Weak<C>,
    hub: Arc<StateHub<C::State>>,
    mut states: BoxStream<'static, C::State>,
    id: Uuid,
) {
    tracing::debug!(combiner = %id, "pipeline driver started");

    while let Some(state) = states.next().await {
        let Some(owner) = combiner.upgrade() else {
            break;
        };

        let snapshot = owner.pipeline().snapshot();
        hub.publish(state, |state| {
            *snapshot.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
        });
        tracing::trace!(combiner = %id, "state emitted");
    }

    hub.close();

    if combiner.strong_count() == 0 {
        tracing::debug!(combiner = %id, "combiner dropped, pipeline driver stopped");
    } else {
        tracing::error!(
            combiner = %id,
            "state stream terminated, no further state will be delivered"
        );
    }
}
