//! Crate-wide error taxonomy.
//!
//! One `thiserror`-derived enum at the root, folding each submodule's own
//! error type in via `#[error(transparent)]` — the same shape the streaming
//! core this crate grew from uses for its own `ProveSchedError`/
//! `VerifySchedError`. Every error kind named by the solver's error-handling
//! design is represented here; policy (all errors fatal, first-detected-wins
//! across workers) lives in `solver`, not in this module.

#![forbid(unsafe_code)]

use crate::event::EventError;
use crate::matrix::MatrixError;
use crate::sink::SinkError;

/// A fatal error from a single solver run.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SolverError {
    /// A propensity returned NaN, infinite, or negative.
    #[error("invalid rate at node {node}, transition {transition}: {rate}")]
    InvalidRate { node: usize, transition: usize, rate: f64 },

    /// A transition or scheduled event drove a compartment below zero.
    #[error("negative state at node {node}, compartment {compartment}: {value}")]
    NegativeState { node: usize, compartment: usize, value: i64 },

    /// An `EXIT`/`INTERNAL_TRANSFER`/`EXTERNAL_TRANSFER` event requested more
    /// individuals than the selected subpopulation contained.
    #[error("event requested {requested} individuals but only {available} were available (node {node})")]
    InsufficientSubpopulation { node: usize, requested: i64, available: i64 },

    /// Scheduled-event field failed range validation (see [`EventError`]).
    #[error(transparent)]
    Event(#[from] EventError),

    /// A sparse matrix view failed its compressed-column invariants (see
    /// [`MatrixError`]).
    #[error(transparent)]
    Matrix(#[from] MatrixError),

    /// An event carried an unrecognized `kind` discriminant.
    #[error("undefined event kind {0}")]
    UndefinedEvent(u8),

    /// The model's post-timestep hook returned a negative code, passed
    /// through unchanged.
    #[error("model error (post-step hook returned {0})")]
    ModelError(i32),

    /// Setup-time allocation or shape validation failed before any worker
    /// was spawned.
    #[error("invalid solver inputs: {0}")]
    InvalidInputs(String),

    /// The trajectory sink rejected a write (see [`SinkError`]).
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl SolverError {
    /// Bridge to the C-style integer error codes named in the solver's
    /// external-interface design, for hosts that need one.
    ///
    /// `0` is reserved for success and is never returned by this method;
    /// callers check `Result::is_ok()` for that case instead.
    pub fn code(&self) -> i32 {
        match self {
            SolverError::InvalidRate { .. } => -1,
            SolverError::NegativeState { .. } => -2,
            SolverError::InsufficientSubpopulation { .. } => -3,
            SolverError::Event(EventError::NodeOutOfRange { .. }) => -4,
            SolverError::Event(EventError::SelectOutOfRange { .. }) => -5,
            SolverError::Event(EventError::ShiftOutOfRange { .. }) => -6,
            SolverError::Event(EventError::ProportionOutOfRange { .. }) => -7,
            SolverError::Matrix(_) => -8,
            SolverError::UndefinedEvent(_) => -9,
            SolverError::ModelError(rc) => *rc,
            SolverError::InvalidInputs(_) => -10,
            SolverError::Sink(_) => -11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_error_code_passes_through_unchanged() {
        let e = SolverError::ModelError(-42);
        assert_eq!(e.code(), -42);
    }

    #[test]
    fn non_model_errors_use_negative_codes() {
        let e = SolverError::InvalidRate { node: 0, transition: 0, rate: f64::NAN };
        assert!(e.code() < 0);
    }
}
