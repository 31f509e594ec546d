//! # Flywheel
//!
//! A reactive state engine where actions come in, mutations fold, and state
//! streams out.
//!
//! ## Core Concepts
//!
//! Flywheel separates **what happened** from **what changed** from **what is
//! true**:
//! - Action = What happened (external input, e.g. a tap)
//! - Mutation = What changed (an atomic transition, derived from an action)
//! - State = What is true (everything a consumer needs to render)
//!
//! The key principle: **Mutate concurrently, fold serially**.
//! Side effects live in `mutate`; `reduce` is pure and sees one mutation at a
//! time.
//!
//! ## Architecture
//!
//! ```text
//! Consumer (UI / caller)
//!     │                                          ▲
//!     ▼ send()                                   │ state()
//! ActionSender                                   │
//!     │                                          │
//!     ▼                                   StateStream (shared)
//! transform_action                               │
//!     │                                          │
//!     ├─► mutate(a1) ─► [m1, m2] ──┐             │
//!     │                            │             │
//!     └─► mutate(a2) ─► [m3] ──────┤             │
//!                                  ▼             │
//!                        transform_mutation      │
//!                                  │             │
//!                                  ▼             │
//!             initial ─► reduce(state, m) ─► transform_state
//!                                                │
//!                                                └─► current_state()
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Lazy, once** - The pipeline is built on first access to `action()` or
//!    `state()`, exactly once per instance, even under concurrent first access
//! 2. **Initial first** - Every subscriber's first state is the initial state
//! 3. **Serial fold** - No two mutations of one instance are folded at once
//! 4. **Shared run** - Subscribers share one pipeline run; adding subscribers
//!    never re-runs `mutate`
//! 5. **Owned by the combiner** - The pipeline holds only `Weak` references
//!    back; dropping the combiner stops everything in flight
//!
//! ## Guarantees
//!
//! - **Per-action order**: Mutations from one `mutate` call fold in the order
//!   they were yielded
//! - **Cross-action order**: Sequences from different actions interleave in
//!   arrival order, not send order
//! - **No restart**: If the state stream terminates, the instance delivers no
//!   more state. Map side-effect failures to mutations instead
//! - **Lossless fan-out**: Every subscriber sees every state published after
//!   it attached, however far behind it falls
//!
//! ## Example
//!
//! ```ignore
//! use flywheel_core::{mutations, Combiner, CombinerExt, Mutations, Pipeline};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! // 1. Define actions (what happened)
//! #[derive(Debug, Clone)]
//! enum CounterAction {
//!     Increment,
//! }
//!
//! // 2. Define mutations (what changed)
//! enum CounterMutation {
//!     Incremented,
//! }
//! flywheel_core::distinct_mutation!(CounterMutation, CounterAction);
//!
//! // 3. Define state (what is true)
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! // 4. Define the combiner (pipeline record inside)
//! struct Counter {
//!     pipeline: Pipeline<Counter>,
//! }
//!
//! impl Combiner for Counter {
//!     type Action = CounterAction;
//!     type Mutation = CounterMutation;
//!     type State = CounterState;
//!
//!     fn pipeline(&self) -> &Pipeline<Self> {
//!         &self.pipeline
//!     }
//!
//!     fn mutate(&self, action: CounterAction) -> Mutations<CounterMutation> {
//!         match action {
//!             CounterAction::Increment => mutations::just(CounterMutation::Incremented),
//!         }
//!     }
//!
//!     fn reduce(&self, mut state: CounterState, mutation: CounterMutation) -> CounterState {
//!         match mutation {
//!             CounterMutation::Incremented => state.count += 1,
//!         }
//!         state
//!     }
//! }
//!
//! // 5. Subscribe and send
//! let counter = Arc::new(Counter { pipeline: Pipeline::new(CounterState::default()) });
//! let mut states = counter.state();
//!
//! counter.send(CounterAction::Increment);
//!
//! assert_eq!(states.next().await, Some(CounterState { count: 0 }));
//! assert_eq!(states.next().await, Some(CounterState { count: 1 }));
//! assert_eq!(counter.current_state().count, 1);
//! ```
//!
//! ## Testing Consumers
//!
//! `enable_stub()` swaps the pipeline for a [`Stub`] that records actions and
//! lets the test set state directly. See the `flywheel-testing` crate for
//! recording helpers.
//!
//! ## What This Is Not
//!
//! Flywheel is **not**:
//! - A UI binding layer
//! - A persistence layer
//! - A distributed state store
//!
//! Flywheel **is**:
//! > A single, race-free pipeline from input to observable state for one
//! > stateful component.

// Core modules
mod bus;
mod combiner;
mod config;
mod error;
mod mutation_macro;
mod pipeline;
mod runtime;
mod state;
mod storage;
mod stub;

// Mutation sequence constructors
pub mod mutations;


// Stub overlay tests (test-only)
#[cfg(test)]
mod stub_tests;

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export combiner types
pub use combiner::{Combiner, FromAction};

// Re-export pipeline types
pub use pipeline::{CombinerExt, Pipeline};

// Re-export action ingress
pub use bus::ActionSender;

// Re-export state egress
pub use state::{Pulse, StateStream, StateStreamExt};

// Re-export stub types
pub use stub::Stub;

// Re-export storage types
pub use storage::{InstanceStorage, StorageKey};

// Re-export configuration
pub use config::{PipelineConfig, DEFAULT_BACKLOG_WARNING};

// Re-export error types
pub use error::{FlywheelError, Result};

pub use mutations::Mutations;

// Re-export commonly used external types
pub use futures::stream::BoxStream;
