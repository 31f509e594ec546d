//! The per-instance pipeline record and lazy construction.
//!
//! Every combiner embeds one [`Pipeline`]. The record owns the instance's
//! identity, its initial state and an [`InstanceStorage`] holding everything
//! else: the current state snapshot, the built pipeline once it exists, the
//! stub flag and the stub. Dropping the combiner drops the record and with it
//! the whole pipeline.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future;
use futures::stream;
use uuid::Uuid;

use crate::bus::ActionSender;
use crate::combiner::Combiner;
use crate::config::PipelineConfig;
use crate::error::{FlywheelError, Result};
use crate::runtime::{self, Built};
use crate::state::StateStream;
use crate::storage::{InstanceStorage, StorageKey};
use crate::stub::Stub;

const BUILD_LOCK: StorageKey<Mutex<()>> = StorageKey::new("flywheel.build_lock");
const STUB_ENABLED: StorageKey<AtomicBool> = StorageKey::new("flywheel.stub_enabled");

fn current_state_key<S>() -> StorageKey<RwLock<S>> {
    StorageKey::new("flywheel.current_state")
}

fn built_key<C: Combiner>() -> StorageKey<Built<C>> {
    StorageKey::new("flywheel.pipeline")
}

fn stub_key<C: Combiner>() -> StorageKey<Stub<C>> {
    StorageKey::new("flywheel.stub")
}

/// Pipeline state embedded in a combiner.
///
/// The pipeline must never outlive the combiner that owns it and is never
/// responsible for destroying it: everything running on its behalf holds a
/// `Weak` reference.
pub struct Pipeline<C: Combiner> {
    id: Uuid,
    initial_state: C::State,
    config: PipelineConfig,
    storage: InstanceStorage,
    _combiner: PhantomData<fn() -> C>,
}

impl<C: Combiner> Pipeline<C> {
    /// A record with the default configuration.
    pub fn new(initial_state: C::State) -> Self {
        Self::from_parts(initial_state, PipelineConfig::default())
    }

    pub fn with_config(initial_state: C::State, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_parts(initial_state, config))
    }

    fn from_parts(initial_state: C::State, config: PipelineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            initial_state,
            config,
            storage: InstanceStorage::new(),
            _combiner: PhantomData,
        }
    }

    /// Globally unique identity of this instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Storage private to this instance. Keys under `flywheel.` are reserved.
    pub fn storage(&self) -> &InstanceStorage {
        &self.storage
    }

    pub fn initial_state(&self) -> C::State {
        self.initial_state.clone()
    }

    /// The latest folded or stub-set state, read without subscribing.
    ///
    /// Before anything has been folded this is the initial state.
    pub fn current_state(&self) -> C::State {
        if self.is_stub_enabled() {
            return self.stub().state();
        }
        self.snapshot_state()
    }

    pub(crate) fn snapshot(&self) -> Arc<RwLock<C::State>> {
        self.storage.get_or_insert_with(&current_state_key::<C::State>(), || {
            RwLock::new(self.initial_state.clone())
        })
    }

    fn snapshot_state(&self) -> C::State {
        self.snapshot()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the real pipeline has been built.
    pub fn is_built(&self) -> bool {
        self.storage.contains(&built_key::<C>())
    }

    fn built(&self) -> Option<Arc<Built<C>>> {
        self.storage.get(&built_key::<C>())
    }

    /// Return the built pipeline, building it on first use.
    ///
    /// Concurrent first accesses build exactly once; every caller gets the
    /// same handle.
    fn ensure_built(&self, combiner: &Arc<C>) -> Result<Arc<Built<C>>> {
        debug_assert!(
            std::ptr::eq(combiner.pipeline(), self),
            "pipeline accessed through a combiner that does not own it"
        );

        if let Some(built) = self.built() {
            return Ok(built);
        }

        let lock = self.storage.get_or_insert_with(&BUILD_LOCK, Mutex::default);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(built) = self.built() {
            return Ok(built);
        }

        let built = runtime::build(combiner)?;
        self.install(built)
    }

    /// Cache a built pipeline. There is only ever one per instance.
    fn install(&self, built: Built<C>) -> Result<Arc<Built<C>>> {
        let key = built_key::<C>();
        if self.storage.contains(&key) {
            return Err(FlywheelError::PipelineAlreadyBuilt(self.id));
        }
        Ok(self.storage.set(&key, built))
    }

    pub fn is_stub_enabled(&self) -> bool {
        self.storage
            .get(&STUB_ENABLED)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Route all later state and action accesses through the stub.
    ///
    /// The stub starts from the current state at the time it is enabled,
    /// unless a state was already set on it. Subscriptions and senders taken
    /// from the real pipeline before this call keep using it.
    pub fn enable_stub(&self) -> Arc<Stub<C>> {
        let stub = self.stub();
        let was_enabled = self
            .storage
            .get_or_insert_with(&STUB_ENABLED, AtomicBool::default)
            .swap(true, Ordering::AcqRel);

        if !was_enabled {
            stub.reseed(self.snapshot_state());
            tracing::debug!(combiner = %self.id, built = self.is_built(), "stub enabled");
        }
        stub
    }

    /// This instance's stub, created on first use.
    pub fn stub(&self) -> Arc<Stub<C>> {
        let key = stub_key::<C>();
        if let Some(stub) = self.storage.get(&key) {
            return stub;
        }

        let seed = self.snapshot_state();
        self.storage
            .get_or_insert_with(&key, || Stub::new(self.id, seed, &self.config))
    }
}

impl<C: Combiner> fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("built", &self.is_built())
            .field("stub_enabled", &self.is_stub_enabled())
            .finish()
    }
}

/// Access to a combiner's pipeline.
///
/// Implemented for `Arc<C>`: building the pipeline needs a handle the
/// driver can downgrade to a `Weak` reference.
pub trait CombinerExt<C: Combiner> {
    /// The action sink. Builds the pipeline unless the stub is enabled.
    fn action(&self) -> ActionSender<C::Action>;

    fn try_action(&self) -> Result<ActionSender<C::Action>>;

    /// Fire-and-forget send.
    fn send(&self, action: C::Action);

    fn try_send(&self, action: C::Action) -> Result<()>;

    /// Subscribe to state. Builds the pipeline unless the stub is enabled.
    ///
    /// The first item is always the initial state.
    fn state(&self) -> StateStream<C::State>;

    fn try_state(&self) -> Result<StateStream<C::State>>;

    fn current_state(&self) -> C::State;

    fn initial_state(&self) -> C::State;

    fn id(&self) -> Uuid;

    fn is_built(&self) -> bool;

    fn is_stub_enabled(&self) -> bool;

    fn enable_stub(&self) -> Arc<Stub<C>>;

    fn stub(&self) -> Arc<Stub<C>>;
}

impl<C: Combiner> CombinerExt<C> for Arc<C> {
    fn action(&self) -> ActionSender<C::Action> {
        self.try_action().unwrap_or_else(|e| {
            tracing::error!(combiner = %self.id(), error = %e, "action sink unavailable");
            ActionSender::closed(self.id())
        })
    }

    fn try_action(&self) -> Result<ActionSender<C::Action>> {
        let pipeline = self.pipeline();
        if pipeline.is_stub_enabled() {
            return Ok(ActionSender::stub(pipeline.id(), pipeline.stub().action_log()));
        }

        let built = pipeline.ensure_built(self)?;
        Ok(ActionSender::live(pipeline.id(), built.sender.clone()))
    }

    fn send(&self, action: C::Action) {
        self.action().send(action);
    }

    fn try_send(&self, action: C::Action) -> Result<()> {
        self.try_action()?.try_send(action)
    }

    fn state(&self) -> StateStream<C::State> {
        self.try_state().unwrap_or_else(|e| {
            tracing::error!(combiner = %self.id(), error = %e, "state stream unavailable");
            StateStream::new(stream::once(future::ready(self.current_state())))
        })
    }

    fn try_state(&self) -> Result<StateStream<C::State>> {
        let pipeline = self.pipeline();
        if pipeline.is_stub_enabled() {
            return Ok(pipeline.stub().state_stream());
        }

        let built = pipeline.ensure_built(self)?;
        Ok(built.hub.subscribe())
    }

    fn current_state(&self) -> C::State {
        self.pipeline().current_state()
    }

    fn initial_state(&self) -> C::State {
        self.pipeline().initial_state()
    }

    fn id(&self) -> Uuid {
        self.pipeline().id()
    }

    fn is_built(&self) -> bool {
        self.pipeline().is_built()
    }

    fn is_stub_enabled(&self) -> bool {
        self.pipeline().is_stub_enabled()
    }

    fn enable_stub(&self) -> Arc<Stub<C>> {
        self.pipeline().enable_stub()
    }

    fn stub(&self) -> Arc<Stub<C>> {
        self.pipeline().stub()
    }
}
