//! Model callbacks: propensities and the post-timestep hook.
//!
//! A model is reduced, at the core's boundary, to exactly two things: an
//! ordered list of per-transition propensity functions and a single
//! post-timestep callback. Both are plain `Fn` trait objects rather than an
//! associated-type trait, so a model can close over its own constants
//! without the core depending on any concrete epidemiological model crate —
//! the only contract is the signature.

#![forbid(unsafe_code)]

use std::sync::Arc;

/// Propensity function: `(u, v, ldata, gdata, t) -> rate`.
///
/// MUST be pure given its inputs and MUST return a finite, non-negative
/// value whenever the node's state satisfies the crate's invariants
/// (non-negative compartments). A violation is surfaced as
/// [`crate::error::SolverError::InvalidRate`], not a panic.
pub type PropensityFn = Arc<dyn Fn(&[i32], &[f64], &[f64], &[f64], f64) -> f64 + Send + Sync>;

/// Post-timestep hook: `(v_new, u, v, ldata, gdata, node_global_index, t) -> rc`.
///
/// Writes the node's next continuous-state vector into `v_new`. The return
/// value is a model-defined signal:
///
/// - `rc < 0`: a fatal model error; propagated unchanged as
///   [`crate::error::SolverError::ModelError`].
/// - `rc > 0`: ask the solver to recompute every propensity for this node
///   (arbitrary compartments may have changed as a side effect of the hook).
/// - `rc == 0`: no recomputation requested beyond what `update_node` already
///   demands.
pub type PostStepFn =
    Arc<dyn Fn(&mut [f64], &[i32], &[f64], &[f64], &[f64], usize, f64) -> i32 + Send + Sync>;

/// The full set of callbacks a model supplies to [`crate::solver::run_solver`].
#[derive(Clone)]
pub struct ModelCallbacks {
    /// One propensity function per transition, in transition-index order.
    /// Its length fixes `Nt`.
    pub propensities: Vec<PropensityFn>,
    /// The single post-timestep hook, run once per node per day.
    pub post_step: PostStepFn,
}

impl ModelCallbacks {
    /// Number of transitions `Nt`, i.e. the number of propensity functions.
    #[inline]
    pub fn nt(&self) -> usize {
        self.propensities.len()
    }

    /// Evaluate propensity `t` for the given node state.
    ///
    /// Panics if `t >= self.nt()`; the SSA loop only ever calls this with
    /// transition indices already bounds-checked against `Nt` at setup.
    #[inline]
    pub fn propensity(&self, t: usize, u: &[i32], v: &[f64], ldata: &[f64], gdata: &[f64], time: f64) -> f64 {
        (self.propensities[t])(u, v, ldata, gdata, time)
    }

    /// Run the post-timestep hook for one node.
    #[inline]
    pub fn post_step(
        &self,
        v_new: &mut [f64],
        u: &[i32],
        v: &[f64],
        ldata: &[f64],
        gdata: &[f64],
        node_global_index: usize,
        time: f64,
    ) -> i32 {
        (self.post_step)(v_new, u, v, ldata, gdata, node_global_index, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propensity_closes_over_model_constants() {
        let rate = 2.5f64;
        let prop: PropensityFn = Arc::new(move |u, _v, _ld, _gd, _t| rate * u[0] as f64);
        let cb = ModelCallbacks { propensities: vec![prop], post_step: Arc::new(|_, _, _, _, _, _, _| 0) };
        assert_eq!(cb.nt(), 1);
        assert_eq!(cb.propensity(0, &[4], &[], &[], &[], 0.0), 10.0);
    }

    #[test]
    fn post_step_writes_v_new_and_signals_recompute() {
        let cb = ModelCallbacks {
            propensities: vec![],
            post_step: Arc::new(|v_new, u, _v, _ld, _gd, _node, _t| {
                v_new[0] = u[0] as f64 * 0.1;
                1
            }),
        };
        let mut v_new = [0.0f64];
        let rc = cb.post_step(&mut v_new, &[7], &[], &[], &[], 0, 0.0);
        assert_eq!(rc, 1);
        assert!((v_new[0] - 0.7).abs() < 1e-12);
    }
}
