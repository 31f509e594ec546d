//! Action ingress.
//!
//! An [`ActionSender`] is a cheap, cloneable handle any number of callers,
//! on any thread, can send through. Sends are fire-and-forget and are
//! delivered to the pipeline in the order the channel accepted them.

use std::fmt;
use std::sync::Arc;

use futures::channel::mpsc;
use uuid::Uuid;

use crate::error::{FlywheelError, Result};
use crate::stub::ActionLog;

enum Route<A> {
    /// Into the real pipeline.
    Live(mpsc::UnboundedSender<A>),
    /// Into the stub's action log.
    Stub(Arc<ActionLog<A>>),
    /// Nowhere; the pipeline could not be built.
    Closed,
}

impl<A> Clone for Route<A> {
    fn clone(&self) -> Self {
        match self {
            Route::Live(sender) => Route::Live(sender.clone()),
            Route::Stub(log) => Route::Stub(log.clone()),
            Route::Closed => Route::Closed,
        }
    }
}

/// The action sink of one combiner instance.
///
/// A sender obtained before [`enable_stub`](crate::CombinerExt::enable_stub)
/// keeps feeding the real pipeline.
pub struct ActionSender<A> {
    id: Uuid,
    route: Route<A>,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            route: self.route.clone(),
        }
    }
}

impl<A: Clone + Send + 'static> ActionSender<A> {
    pub(crate) fn live(id: Uuid, sender: mpsc::UnboundedSender<A>) -> Self {
        Self {
            id,
            route: Route::Live(sender),
        }
    }

    pub(crate) fn stub(id: Uuid, log: Arc<ActionLog<A>>) -> Self {
        Self {
            id,
            route: Route::Stub(log),
        }
    }

    pub(crate) fn closed(id: Uuid) -> Self {
        Self {
            id,
            route: Route::Closed,
        }
    }

    /// Send an action. Never blocks and never reports failure; an action
    /// sent after the pipeline stopped is logged and dropped.
    pub fn send(&self, action: A) {
        if let Err(e) = self.try_send(action) {
            tracing::warn!(combiner = %self.id, error = %e, "action dropped");
        }
    }

    /// Send an action, reporting whether the pipeline can still take it.
    pub fn try_send(&self, action: A) -> Result<()> {
        match &self.route {
            Route::Live(sender) => {
                tracing::trace!(combiner = %self.id, "action sent");
                sender
                    .unbounded_send(action)
                    .map_err(|_| FlywheelError::Terminated(self.id))
            }
            Route::Stub(log) => {
                log.record(action);
                Ok(())
            }
            Route::Closed => Err(FlywheelError::Terminated(self.id)),
        }
    }

    /// Whether sends still reach a pipeline or stub.
    pub fn is_open(&self) -> bool {
        match &self.route {
            Route::Live(sender) => !sender.is_closed(),
            Route::Stub(_) => true,
            Route::Closed => false,
        }
    }

    pub fn is_stubbed(&self) -> bool {
        matches!(self.route, Route::Stub(_))
    }
}

impl<A> fmt::Debug for ActionSender<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let route = match self.route {
            Route::Live(_) => "live",
            Route::Stub(_) => "stub",
            Route::Closed => "closed",
        };
        f.debug_struct("ActionSender")
            .field("combiner", &self.id)
            .field("route", &route)
            .finish()
    }
}
