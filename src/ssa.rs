//! The Gillespie direct-method core: per-node continuous-time stepping
//! between two day boundaries.
//!
//! Everything here operates on a single node's slices and is free of any
//! notion of workers, barriers, or node ownership — that's `worker`'s job.
//! This module only knows how to initialize a node's propensities and how to
//! advance its internal clock as far as `tt` allows, firing transitions
//! along the way.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;
use tracing::warn;

use crate::error::SolverError;
use crate::matrix::CscView;
use crate::model::ModelCallbacks;
use crate::rng::uniform_pos;

/// Tolerance for the incremental `sum_rate` drift check: `epsilon * Nt *
/// max_rate`, per the rounding-drift policy.
fn drift_tolerance(rates: &[f64]) -> f64 {
    let max_rate = rates.iter().cloned().fold(0.0_f64, f64::max);
    f64::EPSILON * rates.len() as f64 * max_rate
}

/// Evaluate every transition's propensity fresh for one node, returning the
/// `Nt`-length rate vector the inner loop maintains incrementally from then
/// on.
pub fn init_rates(
    u_node: &[i32],
    v_node: &[f64],
    ldata: &[f64],
    gdata: &[f64],
    model: &ModelCallbacks,
    node: usize,
    time: f64,
) -> Result<Vec<f64>, SolverError> {
    let mut rates = Vec::with_capacity(model.nt());
    for t in 0..model.nt() {
        let rate = model.propensity(t, u_node, v_node, ldata, gdata, time);
        check_rate(rate, node, t)?;
        rates.push(rate);
    }
    Ok(rates)
}

fn check_rate(rate: f64, node: usize, transition: usize) -> Result<(), SolverError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(SolverError::InvalidRate { node, transition, rate });
    }
    Ok(())
}

/// Select a transition index by a weighted draw over `rates`, whose entries
/// sum to `sum_rate`.
///
/// Walks the cumulative sum forward and returns the smallest index whose
/// cumulative weight reaches the draw. Floating-point rounding can land
/// that index on a transition whose own rate is exactly zero (the
/// cumulative sum crossed the target one step early); when that happens,
/// this walks backward to the nearest transition with positive rate, per
/// the solver's documented floating-point safety step. Returns `None` when
/// no transition in `rates[..=tr]` has positive rate — the "nil event"
/// case, which the caller must treat as firing nothing at all rather than
/// falling back to the zero-rate transition it landed on.
fn select_transition(rates: &[f64], sum_rate: f64, draw: f64) -> Option<usize> {
    let target = draw * sum_rate;
    let mut cumulative = 0.0;
    let mut tr = rates.len() - 1;
    for (t, &rate) in rates.iter().enumerate() {
        cumulative += rate;
        if cumulative >= target {
            tr = t;
            break;
        }
    }
    if rates[tr] == 0.0 {
        return rates[..=tr].iter().rposition(|&r| r > 0.0);
    }
    Some(tr)
}

/// Apply transition `t`'s stoichiometry column to a node's compartment
/// vector, rejecting any resulting negative compartment.
fn apply_stoichiometry(u_node: &mut [i32], node: usize, n_matrix: &CscView<i32>, t: usize) -> Result<(), SolverError> {
    let column = n_matrix.column(t);
    for (row, &delta) in column.iter_with_values() {
        u_node[row] += delta;
        if u_node[row] < 0 {
            return Err(SolverError::NegativeState { node, compartment: row, value: u_node[row] as i64 });
        }
    }
    Ok(())
}

/// Advance one node's continuous-time clock from `t_time` as far as `tt`
/// allows, firing transitions as the Gillespie direct method selects them.
///
/// Returns `(new_t_time, fired)`, where `fired` is whether any transition
/// actually fired (the caller only needs to mark the node dirty, refresh its
/// post-step hook, etc. when this is `true`). `new_t_time` is always exactly
/// `tt` on return — every exit path clamps the node's clock to the day
/// boundary rather than leaving it at the last firing time, so a node that
/// falls silent partway through the day does not get re-simulated from a
/// stale clock under tomorrow's rates.
///
/// `rates` and `sum_rate` are both mutated in place: after each firing,
/// every transition listed in the fired transition's column of `g_matrix`
/// has its propensity recomputed from the now-updated state, and
/// `sum_rate` is adjusted by the resulting delta rather than re-summed from
/// scratch, per the solver's rounding-drift policy. In debug builds (or
/// with the `rate-drift-check` feature), `sum_rate` is additionally
/// recomputed from scratch once at the end of the call and compared
/// against the incrementally maintained value, logging a diagnostic if
/// they've drifted apart by more than floating-point tolerance — this never
/// replaces the incremental path, which is what release builds run.
#[allow(clippy::too_many_arguments)]
pub fn step_node(
    u_node: &mut [i32],
    v_node: &[f64],
    ldata: &[f64],
    gdata: &[f64],
    rates: &mut [f64],
    sum_rate: &mut f64,
    node: usize,
    mut t_time: f64,
    tt: f64,
    model: &ModelCallbacks,
    n_matrix: &CscView<i32>,
    g_matrix: &CscView<()>,
    rng: &mut StdRng,
) -> Result<(f64, bool), SolverError> {
    let mut fired = false;
    loop {
        if *sum_rate <= 0.0 {
            t_time = tt;
            break;
        }
        let tau = -uniform_pos(rng).ln() / *sum_rate;
        if t_time + tau >= tt {
            t_time = tt;
            break;
        }
        t_time += tau;

        let t = match select_transition(rates, *sum_rate, uniform_pos(rng)) {
            Some(t) => t,
            // Nil event: floating-point rounding left every transition up to
            // the drawn cumulative weight at rate zero. Fire nothing and let
            // the next iteration's `sum_rate <= 0.0` check end the day.
            None => {
                *sum_rate = 0.0;
                continue;
            }
        };
        apply_stoichiometry(u_node, node, n_matrix, t)?;
        fired = true;

        for &dep in g_matrix.column(t).rows() {
            let old = rates[dep];
            let new = model.propensity(dep, u_node, v_node, ldata, gdata, t_time);
            check_rate(new, node, dep)?;
            rates[dep] = new;
            *sum_rate += new - old;
        }
        if *sum_rate < 0.0 {
            *sum_rate = 0.0;
        }
    }

    if cfg!(any(debug_assertions, feature = "rate-drift-check")) {
        let fresh: f64 = rates.iter().sum();
        let tolerance = drift_tolerance(rates);
        if (fresh - *sum_rate).abs() > tolerance {
            warn!(node, incremental = *sum_rate, fresh, tolerance, "RATE_DRIFT: incremental sum_rate diverged from a fresh reduction");
            *sum_rate = fresh.max(0.0);
        }
    }

    Ok((t_time, fired))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::worker_rng;
    use std::sync::Arc;

    fn pure_decay_model(rate_const: f64) -> ModelCallbacks {
        ModelCallbacks {
            propensities: vec![Arc::new(move |u, _v, _ld, _gd, _t| rate_const * u[0] as f64)],
            post_step: Arc::new(|_, _, _, _, _, _, _| 0),
        }
    }

    fn identity_n(nc: usize) -> (Vec<usize>, Vec<usize>, Vec<i32>) {
        (vec![0, 1], vec![0], vec![-1i32])
    }

    fn empty_g() -> (Vec<usize>, Vec<usize>) {
        (vec![0, 1], vec![0])
    }

    #[test]
    fn decaying_population_never_goes_negative_and_eventually_idles() {
        let model = pure_decay_model(0.5);
        let (n_jc, n_ir, n_pr) = identity_n(1);
        let n_matrix = CscView::new(1, 1, &n_jc, &n_ir, Some(&n_pr[..])).unwrap();
        let (g_jc, g_ir) = empty_g();
        let g_matrix = CscView::<()>::new(1, 1, &g_jc, &g_ir, None).unwrap();

        let mut u = [20i32];
        let mut rng = worker_rng(7);
        let mut rates = init_rates(&u, &[], &[], &[], &model, 0, 0.0).unwrap();
        let mut sum_rate: f64 = rates.iter().sum();
        let mut t_time = 0.0;
        for day in 0..50 {
            let tt = (day + 1) as f64;
            let (new_t, _fired) = step_node(
                &mut u, &[], &[], &[], &mut rates, &mut sum_rate, 0, t_time, tt, &model, &n_matrix, &g_matrix,
                &mut rng,
            )
            .unwrap();
            t_time = new_t;
            assert!(u[0] >= 0);
        }
        assert!(u[0] <= 20);
    }

    #[test]
    fn zero_total_rate_makes_no_progress_within_the_day() {
        let model = pure_decay_model(0.5);
        let (n_jc, n_ir, n_pr) = identity_n(1);
        let n_matrix = CscView::new(1, 1, &n_jc, &n_ir, Some(&n_pr[..])).unwrap();
        let (g_jc, g_ir) = empty_g();
        let g_matrix = CscView::<()>::new(1, 1, &g_jc, &g_ir, None).unwrap();

        let mut u = [0i32]; // no individuals, so rate is always 0
        let mut rng = worker_rng(3);
        let mut rates = init_rates(&u, &[], &[], &[], &model, 0, 0.0).unwrap();
        let mut sum_rate: f64 = rates.iter().sum();
        let (_t_time, fired) = step_node(
            &mut u, &[], &[], &[], &mut rates, &mut sum_rate, 0, 0.0, 1.0, &model, &n_matrix, &g_matrix, &mut rng,
        )
        .unwrap();
        assert!(!fired);
    }

    #[test]
    fn invalid_rate_is_rejected_instead_of_propagated() {
        let model = ModelCallbacks {
            propensities: vec![Arc::new(|_u, _v, _ld, _gd, _t| f64::NAN)],
            post_step: Arc::new(|_, _, _, _, _, _, _| 0),
        };
        let u = [1i32];
        let err = init_rates(&u, &[], &[], &[], &model, 2, 0.0).unwrap_err();
        assert!(matches!(err, SolverError::InvalidRate { node: 2, transition: 0, .. }));
    }
}
