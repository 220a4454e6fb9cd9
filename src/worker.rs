//! Per-worker state: the node slice one worker thread owns for the
//! duration of a single parallel phase, plus the operations that run
//! entirely within that slice (continuous-time stepping, E1 application,
//! post-step refresh).
//!
//! `WorkerState` never owns its buffers — it borrows disjoint slices out of
//! the orchestrator's node-major arrays, the same way the rest of this
//! crate prefers a borrowed `CscView` over an owning matrix type. This is
//! what lets `solver::run_solver` hand out `Nthread` non-overlapping
//! `WorkerState`s with a single `split_at_mut`/`chunks_mut` pass per phase,
//! with no cloning and no interior mutability, and still reach across
//! worker boundaries for the E2 phase by re-slicing the same backing
//! arrays differently.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;

use crate::error::SolverError;
use crate::event::ScheduledEvent;
use crate::index::NodeRange;
use crate::matrix::CscView;
use crate::model::ModelCallbacks;
use crate::{e1, ssa};

/// A worker's borrowed view over its own node range, for one parallel
/// phase. Node-major: node `local`'s discrete state occupies
/// `u[local*nc..(local+1)*nc]`, and likewise for the other per-node slices.
pub struct WorkerState<'a> {
    /// The contiguous node range this worker owns for the phase.
    pub range: NodeRange,
    nc: usize,
    nd: usize,
    nld: usize,
    nt: usize,
    /// This worker's slice of the discrete state `u`, node-major.
    pub u: &'a mut [i32],
    /// This worker's slice of the continuous state `v`, node-major.
    pub v: &'a mut [f64],
    /// This worker's slice of the next-step continuous state `v_new`.
    pub v_new: &'a mut [f64],
    /// This worker's slice of the read-only per-node local data.
    pub ldata: &'a [f64],
    /// This worker's `Nt`-wide rate cache, one row per owned node.
    pub rates: &'a mut [f64],
    /// This worker's per-node incremental rate sums.
    pub sum_rate: &'a mut [f64],
    /// This worker's per-node CTMC clock.
    pub t_time: &'a mut [f64],
    /// This worker's per-node dirty flags, set whenever a transition or
    /// scheduled event has modified that node's compartments.
    pub update_node: &'a mut [bool],
    /// This worker's independent RNG stream.
    pub rng: &'a mut StdRng,
}

impl<'a> WorkerState<'a> {
    /// Wrap a worker's already-sliced buffers. Every slice must already be
    /// restricted to exactly `range.len()` nodes' worth of its respective
    /// per-node stride; the caller (`solver`) is responsible for that
    /// splitting.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        range: NodeRange,
        nc: usize,
        nd: usize,
        nld: usize,
        nt: usize,
        u: &'a mut [i32],
        v: &'a mut [f64],
        v_new: &'a mut [f64],
        ldata: &'a [f64],
        rates: &'a mut [f64],
        sum_rate: &'a mut [f64],
        t_time: &'a mut [f64],
        update_node: &'a mut [bool],
        rng: &'a mut StdRng,
    ) -> Self {
        debug_assert_eq!(u.len(), range.len() * nc);
        debug_assert_eq!(v.len(), range.len() * nd);
        debug_assert_eq!(rates.len(), range.len() * nt);
        debug_assert_eq!(sum_rate.len(), range.len());
        Self { range, nc, nd, nld, nt, u, v, v_new, ldata, rates, sum_rate, t_time, update_node, rng }
    }

    #[inline]
    fn u_node(&self, local: usize) -> &[i32] {
        &self.u[local * self.nc..(local + 1) * self.nc]
    }

    #[inline]
    fn v_node(&self, local: usize) -> &[f64] {
        &self.v[local * self.nd..(local + 1) * self.nd]
    }

    #[inline]
    fn ldata_node(&self, local: usize) -> &[f64] {
        &self.ldata[local * self.nld..(local + 1) * self.nld]
    }

    /// Initialize every node's propensity cache (and incremental rate sum)
    /// at `time`. Must run once before the first day's CTMC stepping.
    pub fn init_rates(&mut self, time: f64, gdata: &[f64], model: &ModelCallbacks) -> Result<(), SolverError> {
        for local in 0..self.range.len() {
            let node = self.range.start + local;
            let r = ssa::init_rates(self.u_node(local), self.v_node(local), self.ldata_node(local), gdata, model, node, time)?;
            self.sum_rate[local] = r.iter().sum();
            self.rates[local * self.nt..(local + 1) * self.nt].copy_from_slice(&r);
        }
        Ok(())
    }

    /// Advance every owned node's CTMC clock up to `tt`, marking nodes that
    /// actually fired a transition as dirty.
    pub fn step_ctmc(
        &mut self,
        tt: f64,
        gdata: &[f64],
        model: &ModelCallbacks,
        n_matrix: &CscView<i32>,
        g_matrix: &CscView<()>,
    ) -> Result<(), SolverError> {
        let nc = self.nc;
        let nd = self.nd;
        let nld = self.nld;
        let nt = self.nt;
        for local in 0..self.range.len() {
            let node = self.range.start + local;
            let u_node = &mut self.u[local * nc..(local + 1) * nc];
            let v_node = &self.v[local * nd..(local + 1) * nd];
            let ldata_node = &self.ldata[local * nld..(local + 1) * nld];
            let rates_node = &mut self.rates[local * nt..(local + 1) * nt];
            let sum_rate = &mut self.sum_rate[local];
            let t_time = self.t_time[local];
            let (new_t, fired) = ssa::step_node(
                u_node, v_node, ldata_node, gdata, rates_node, sum_rate, node, t_time, tt, model, n_matrix, g_matrix,
                self.rng,
            )?;
            self.t_time[local] = new_t;
            if fired {
                self.update_node[local] = true;
            }
        }
        Ok(())
    }

    /// Apply this worker's due E1 events against its own node slice.
    pub fn apply_e1(
        &mut self,
        events: Vec<ScheduledEvent>,
        select_matrix: &CscView<()>,
        shift_matrix: &CscView<i32>,
    ) -> Result<(), SolverError> {
        e1::apply_e1_events(self.range, self.u, self.nc, events, select_matrix, shift_matrix, self.rng, self.update_node)
    }

    /// Run the post-timestep hook for every owned node, writing `v_new`,
    /// then refresh every propensity for a node whenever the hook asked for
    /// it (`rc > 0`) or the node was already dirty (a fired transition or an
    /// E1/E2 event), per the solver's per-day post-step design.
    pub fn post_step_and_refresh(
        &mut self,
        time: f64,
        gdata: &[f64],
        model: &ModelCallbacks,
    ) -> Result<(), SolverError> {
        let nd = self.nd;
        let nt = self.nt;
        for local in 0..self.range.len() {
            let node = self.range.start + local;
            let v_new_node = &mut self.v_new[local * nd..(local + 1) * nd];
            let rc = model.post_step(v_new_node, self.u_node(local), self.v_node(local), self.ldata_node(local), gdata, node, time);
            if rc < 0 {
                return Err(SolverError::ModelError(rc));
            }
            let recompute_all = rc > 0 || self.update_node[local];
            self.v[local * nd..(local + 1) * nd].copy_from_slice(v_new_node);
            if recompute_all {
                let r = ssa::init_rates(self.u_node(local), self.v_node(local), self.ldata_node(local), gdata, model, node, time)?;
                self.sum_rate[local] = r.iter().sum();
                self.rates[local * nt..(local + 1) * nt].copy_from_slice(&r);
            }
            self.update_node[local] = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::partition_nodes;
    use crate::rng::worker_rng;
    use std::sync::Arc;

    fn decay_model() -> ModelCallbacks {
        ModelCallbacks {
            propensities: vec![Arc::new(|u, _v, _ld, _gd, _t| 0.3 * u[0] as f64)],
            post_step: Arc::new(|_, _, _, _, _, _, _| 0),
        }
    }

    #[test]
    fn step_ctmc_keeps_state_non_negative_across_several_days() {
        let range = partition_nodes(1, 1)[0];
        let model = decay_model();
        let n_jc = [0usize, 1];
        let n_ir = [0usize];
        let n_pr = [-1i32];
        let n_matrix = CscView::new(1, 1, &n_jc, &n_ir, Some(&n_pr[..])).unwrap();
        let g_jc = [0usize, 1];
        let g_ir = [0usize];
        let g_matrix = CscView::<()>::new(1, 1, &g_jc, &g_ir, None).unwrap();

        let mut u = [15i32];
        let mut v: [f64; 0] = [];
        let mut v_new: [f64; 0] = [];
        let ldata: [f64; 0] = [];
        let mut rates = [0.0f64];
        let mut sum_rate = [0.0f64];
        let mut t_time = [0.0f64];
        let mut update_node = [false];
        let mut rng = worker_rng(9);
        let mut worker = WorkerState::new(
            range, 1, 0, 0, 1, &mut u, &mut v, &mut v_new, &ldata, &mut rates, &mut sum_rate, &mut t_time,
            &mut update_node, &mut rng,
        );
        worker.init_rates(0.0, &[], &model).unwrap();
        for day in 0..10 {
            worker.step_ctmc((day + 1) as f64, &[], &model, &n_matrix, &g_matrix).unwrap();
            assert!(worker.u[0] >= 0);
        }
    }
}
