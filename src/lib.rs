//! Crate root: public surface and module map for the parallel stochastic
//! simulation core.
//!
//! A simulation is reduced to five ingredients, each owned by its own
//! module: a sparse stoichiometry/dependency/selector/shift matrix family
//! ([`matrix`]), a model reduced to propensity and post-timestep callbacks
//! ([`model`]), a scheduled-event stream ([`event`]), per-node state split
//! across worker threads by a static node partition ([`index`], [`worker`]), and
//! a trajectory sink that receives one column per recorded day
//! ([`sink`]). [`solver`] wires these together into the day loop.
//!
//! Construction is always validate-then-run: [`solver::SolverInputsBuilder`]
//! checks every shape and every scheduled event before [`solver::run_solver`]
//! ever spawns a worker thread, so a malformed input fails at `build()`
//! rather than partway through a run with half the workers already having
//! mutated state.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// The static node-to-worker partition.
pub mod index;
/// Compressed-column sparse matrix views (stoichiometry, dependency graph,
/// selectors, shift matrix).
pub mod matrix;
/// A model reduced to propensity and post-timestep callbacks.
pub mod model;
/// Crate-wide error taxonomy.
pub mod error;
/// Scheduled events (`EXIT`/`ENTER`/`INTERNAL_TRANSFER`/`EXTERNAL_TRANSFER`).
pub mod event;
/// Per-worker deterministic random number streams.
pub mod rng;
/// Day-ordered scheduled-event queues.
pub mod queue;
/// Splits a time-sorted event stream into per-worker E1 queues and one E2
/// queue.
pub mod splitter;
/// Shared sampling primitives for applying scheduled events to compartment
/// vectors.
pub mod transfer;
/// The E1 processor: node-local scheduled events, applied fully in
/// parallel.
pub mod e1;
/// The E2 processor: cross-node scheduled events, applied under a
/// single-writer discipline.
pub mod e2;
/// Per-worker state and the operations that run entirely within one
/// worker's node slice.
pub mod worker;
/// The Gillespie direct-method core: per-node continuous-time stepping.
pub mod ssa;
/// Trajectory sinks: dense and sparse recorders of per-day snapshots.
pub mod sink;
/// The day-loop orchestrator tying every module into a parallel run.
pub mod solver;

pub use error::SolverError;
pub use event::{EventKind, RawEvent, ScheduledEvent};
pub use index::NodeRange;
pub use matrix::{CscColumn, CscView, MatrixError, OwnedCsc};
pub use model::{ModelCallbacks, PostStepFn, PropensityFn};
pub use sink::{DenseSink, SinkError, SparseSink, TrajectorySink};
pub use solver::{run_solver, SolverInputs, SolverInputsBuilder};
