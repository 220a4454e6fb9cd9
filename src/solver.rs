//! The day-loop orchestrator: wires scheduled events, sparse matrices, and a
//! model's callbacks into a parallel run, and owns the only unsafe-free
//! concurrency primitive this crate needs — a fresh `std::thread::scope`
//! (with a `std::sync::Barrier`-equivalent implicit join) per phase.
//!
//! [`SolverInputsBuilder`] validates every shape and every scheduled event
//! eagerly, before [`run_solver`] ever spawns a thread — a malformed input
//! fails at `build()`, not partway through a run with half the workers
//! already dirtying state.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;
use tracing::{debug, instrument};

use crate::e2;
use crate::error::SolverError;
use crate::event::{decode_event, RawEvent, ScheduledEvent};
use crate::index::{partition_nodes, NodeRange};
use crate::matrix::OwnedCsc;
use crate::model::ModelCallbacks;
use crate::rng::{derive_worker_seeds, worker_rng};
use crate::sink::TrajectorySink;
use crate::splitter::split_events;
use crate::worker::WorkerState;

/// Fully validated inputs to a single solver run.
///
/// Build one via [`SolverInputsBuilder`]; the only way to get a
/// `SolverInputs` is through a successful `build()`, so by the time
/// [`run_solver`] sees one, every shape and every scheduled event is already
/// known-good.
pub struct SolverInputs {
    n_nodes: usize,
    nc: usize,
    nd: usize,
    nld: usize,
    u0: Vec<i32>,
    v0: Vec<f64>,
    ldata0: Vec<f64>,
    gdata: Vec<f64>,
    model: ModelCallbacks,
    n_matrix: OwnedCsc<i32>,
    g_matrix: OwnedCsc<()>,
    select_matrix: OwnedCsc<()>,
    shift_matrix: OwnedCsc<i32>,
    events: Vec<ScheduledEvent>,
    tspan: Vec<f64>,
    seed: u64,
    n_threads: usize,
}

/// Builder for [`SolverInputs`]; every setter takes `self` by value so calls
/// chain, mirroring the rest of this crate's validate-once, fail-fast
/// construction style.
#[derive(Default)]
pub struct SolverInputsBuilder {
    n_nodes: Option<usize>,
    nc: Option<usize>,
    nd: usize,
    nld: usize,
    u0: Option<Vec<i32>>,
    v0: Vec<f64>,
    ldata0: Vec<f64>,
    gdata: Vec<f64>,
    model: Option<ModelCallbacks>,
    n_matrix: Option<OwnedCsc<i32>>,
    g_matrix: Option<OwnedCsc<()>>,
    select_matrix: Option<OwnedCsc<()>>,
    shift_matrix: Option<OwnedCsc<i32>>,
    raw_events: Vec<RawEvent>,
    tspan: Vec<f64>,
    seed: u64,
    n_threads: usize,
}

impl SolverInputsBuilder {
    /// Start a new, empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of nodes `Nn` and the initial discrete state `u0`
    /// (node-major, `Nn*Nc` long).
    pub fn nodes(mut self, n_nodes: usize, u0: Vec<i32>) -> Self {
        self.n_nodes = Some(n_nodes);
        self.u0 = Some(u0);
        self
    }

    /// Set the number of discrete compartments `Nc` per node.
    pub fn nc(mut self, nc: usize) -> Self {
        self.nc = Some(nc);
        self
    }

    /// Set the continuous state `v0` (node-major, `Nn*Nd` long) and its
    /// per-node width `Nd`.
    pub fn continuous_state(mut self, nd: usize, v0: Vec<f64>) -> Self {
        self.nd = nd;
        self.v0 = v0;
        self
    }

    /// Set the per-node local data `ldata0` (node-major, `Nn*Nld` long) and
    /// its per-node width `Nld`.
    pub fn local_data(mut self, nld: usize, ldata0: Vec<f64>) -> Self {
        self.nld = nld;
        self.ldata0 = ldata0;
        self
    }

    /// Set the global data vector shared read-only by every node.
    pub fn global_data(mut self, gdata: Vec<f64>) -> Self {
        self.gdata = gdata;
        self
    }

    /// Set the model's propensities and post-timestep hook.
    pub fn model(mut self, model: ModelCallbacks) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the stoichiometry matrix `N` (`Nc` rows by `Nt` columns).
    pub fn stoichiometry(mut self, n_matrix: OwnedCsc<i32>) -> Self {
        self.n_matrix = Some(n_matrix);
        self
    }

    /// Set the propensity dependency graph `G` (`Nt` rows by `Nt` columns).
    pub fn dependency_graph(mut self, g_matrix: OwnedCsc<()>) -> Self {
        self.g_matrix = Some(g_matrix);
        self
    }

    /// Set the scheduled-event selector matrix `E` (`Nc` rows by
    /// `Nselect` columns).
    pub fn selectors(mut self, select_matrix: OwnedCsc<()>) -> Self {
        self.select_matrix = Some(select_matrix);
        self
    }

    /// Set the compartment-relabeling matrix `S_shift` (`Nc` rows by
    /// `Nshift` columns).
    pub fn shifts(mut self, shift_matrix: OwnedCsc<i32>) -> Self {
        self.shift_matrix = Some(shift_matrix);
        self
    }

    /// Supply the raw scheduled-event records, in arrival order. Decoded and
    /// range-checked against the other shapes at `build()`.
    pub fn events(mut self, raw_events: Vec<RawEvent>) -> Self {
        self.raw_events = raw_events;
        self
    }

    /// Set the strictly increasing recording times.
    pub fn tspan(mut self, tspan: Vec<f64>) -> Self {
        self.tspan = tspan;
        self
    }

    /// Set the master RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of worker threads; `0` resolves to
    /// [`std::thread::available_parallelism`] at [`run_solver`] time.
    pub fn threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Validate every shape and every scheduled event, producing a
    /// [`SolverInputs`] ready for [`run_solver`].
    pub fn build(self) -> Result<SolverInputs, SolverError> {
        let n_nodes = self.n_nodes.ok_or_else(|| SolverError::InvalidInputs("nodes() was never called".into()))?;
        let nc = self.nc.ok_or_else(|| SolverError::InvalidInputs("nc() was never called".into()))?;
        let u0 = self.u0.expect("nodes() always sets u0 alongside n_nodes");
        let model = self.model.ok_or_else(|| SolverError::InvalidInputs("model() was never called".into()))?;
        let n_matrix = self.n_matrix.ok_or_else(|| SolverError::InvalidInputs("stoichiometry() was never called".into()))?;
        let g_matrix = self.g_matrix.ok_or_else(|| SolverError::InvalidInputs("dependency_graph() was never called".into()))?;
        let select_matrix = self.select_matrix.ok_or_else(|| SolverError::InvalidInputs("selectors() was never called".into()))?;
        let shift_matrix = self.shift_matrix.ok_or_else(|| SolverError::InvalidInputs("shifts() was never called".into()))?;

        if n_nodes == 0 {
            return Err(SolverError::InvalidInputs("n_nodes must be positive".into()));
        }
        if nc == 0 {
            return Err(SolverError::InvalidInputs("nc must be positive".into()));
        }
        if u0.len() != n_nodes * nc {
            return Err(SolverError::InvalidInputs(format!("u0 length {} does not match Nn*Nc={}", u0.len(), n_nodes * nc)));
        }
        if self.v0.len() != n_nodes * self.nd {
            return Err(SolverError::InvalidInputs(format!(
                "v0 length {} does not match Nn*Nd={}",
                self.v0.len(),
                n_nodes * self.nd
            )));
        }
        if self.ldata0.len() != n_nodes * self.nld {
            return Err(SolverError::InvalidInputs(format!(
                "ldata0 length {} does not match Nn*Nld={}",
                self.ldata0.len(),
                n_nodes * self.nld
            )));
        }
        // Nt = 0 (no transitions at all) is a valid, if degenerate, model:
        // every node's CTMC never advances and every column of U equals u0.
        let nt = model.nt();
        if n_matrix.view().nrows() != nc || n_matrix.view().ncols() != nt {
            return Err(SolverError::InvalidInputs(format!(
                "stoichiometry matrix shape ({}, {}) does not match (Nc={}, Nt={})",
                n_matrix.view().nrows(),
                n_matrix.view().ncols(),
                nc,
                nt
            )));
        }
        if g_matrix.view().nrows() != nt || g_matrix.view().ncols() != nt {
            return Err(SolverError::InvalidInputs(format!(
                "dependency graph shape ({}, {}) does not match (Nt={nt}, Nt={nt})",
                g_matrix.view().nrows(),
                g_matrix.view().ncols(),
            )));
        }
        if select_matrix.view().nrows() != nc {
            return Err(SolverError::InvalidInputs(format!(
                "selector matrix has {} rows, expected Nc={nc}",
                select_matrix.view().nrows()
            )));
        }
        if shift_matrix.view().nrows() != nc {
            return Err(SolverError::InvalidInputs(format!(
                "shift matrix has {} rows, expected Nc={nc}",
                shift_matrix.view().nrows()
            )));
        }
        if self.tspan.is_empty() {
            return Err(SolverError::InvalidInputs("tspan must not be empty".into()));
        }
        if self.tspan.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SolverError::InvalidInputs("tspan must be strictly increasing".into()));
        }

        let n_select = select_matrix.view().ncols();
        let n_shift = shift_matrix.view().ncols();
        let mut events: Vec<ScheduledEvent> = self
            .raw_events
            .into_iter()
            .enumerate()
            .map(|(input_order, raw)| decode_event(raw, input_order, n_nodes, n_select, n_shift))
            .collect::<Result<_, _>>()?;
        events.sort_by_key(|e| (e.time, e.input_order));

        Ok(SolverInputs {
            n_nodes,
            nc,
            nd: self.nd,
            nld: self.nld,
            u0,
            v0: self.v0,
            ldata0: self.ldata0,
            gdata: self.gdata,
            model,
            n_matrix,
            g_matrix,
            select_matrix,
            shift_matrix,
            events,
            tspan: self.tspan,
            seed: self.seed,
            n_threads: self.n_threads,
        })
    }
}

fn resolve_thread_count(requested: usize) -> usize {
    if requested == 0 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        requested
    }
}

/// Re-slice the run's node-major buffers into one disjoint [`WorkerState`]
/// per entry in `ranges`. Called fresh at the start of every parallel
/// phase — a `WorkerState` never outlives the phase it was built for, which
/// is what lets the buffers be re-sliced differently for the E2 phase in
/// between.
#[allow(clippy::too_many_arguments)]
fn build_workers<'a>(
    ranges: &[NodeRange],
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
    rngs: &'a mut [StdRng],
) -> Vec<WorkerState<'a>> {
    let mut u_rest = u;
    let mut v_rest = v;
    let mut vn_rest = v_new;
    let mut ld_rest = ldata;
    let mut rt_rest = rates;
    let mut sr_rest = sum_rate;
    let mut tm_rest = t_time;
    let mut un_rest = update_node;
    let mut rng_iter = rngs.iter_mut();

    let mut workers = Vec::with_capacity(ranges.len());
    for &range in ranges {
        let n = range.len();
        let (u_c, u_r) = u_rest.split_at_mut(n * nc);
        u_rest = u_r;
        let (v_c, v_r) = v_rest.split_at_mut(n * nd);
        v_rest = v_r;
        let (vn_c, vn_r) = vn_rest.split_at_mut(n * nd);
        vn_rest = vn_r;
        let (ld_c, ld_r) = ld_rest.split_at(n * nld);
        ld_rest = ld_r;
        let (rt_c, rt_r) = rt_rest.split_at_mut(n * nt);
        rt_rest = rt_r;
        let (sr_c, sr_r) = sr_rest.split_at_mut(n);
        sr_rest = sr_r;
        let (tm_c, tm_r) = tm_rest.split_at_mut(n);
        tm_rest = tm_r;
        let (un_c, un_r) = un_rest.split_at_mut(n);
        un_rest = un_r;
        let rng = rng_iter.next().expect("one rng per worker range");
        workers.push(WorkerState::new(range, nc, nd, nld, nt, u_c, v_c, vn_c, ld_c, rt_c, sr_c, tm_c, un_c, rng));
    }
    workers
}

/// Run the solver to completion, writing one column to `sink` per entry in
/// `tspan`.
///
/// The day clock advances one integer day at a time, independent of
/// `tspan`'s own granularity: continuous-time stepping and E1 events run in
/// parallel across workers, an implicit barrier joins them, E2 events apply
/// under single-writer discipline on worker 0's RNG stream, a second
/// implicit barrier follows, and finally the post-timestep hook and rate
/// refresh run in parallel once more. After each day, every `tspan` entry
/// the day clock has now passed gets its column written — `tspan[0]` itself
/// is written immediately, before the first day ever runs.
#[instrument(skip(inputs, sink), fields(n_nodes = inputs.n_nodes, tlen = inputs.tspan.len()))]
pub fn run_solver(inputs: &SolverInputs, sink: &mut dyn TrajectorySink) -> Result<(), SolverError> {
    let n_threads = resolve_thread_count(inputs.n_threads);
    let ranges = partition_nodes(inputs.n_nodes, n_threads);
    debug!(n_threads, "partitioned nodes across workers");

    let mut rngs: Vec<StdRng> = derive_worker_seeds(inputs.seed, n_threads).into_iter().map(worker_rng).collect();
    let (mut e1_queues, mut e2_queue) = split_events(inputs.events.clone(), &ranges);

    let nc = inputs.nc;
    let nd = inputs.nd;
    let nld = inputs.nld;
    let nt = inputs.model.nt();

    let tspan = &inputs.tspan;
    let tlen = tspan.len();
    let t0 = tspan[0];

    let mut u = inputs.u0.clone();
    let mut v = inputs.v0.clone();
    let mut v_new = vec![0.0f64; inputs.n_nodes * nd];
    let ldata = inputs.ldata0.clone();
    let mut rates = vec![0.0f64; inputs.n_nodes * nt];
    let mut sum_rate = vec![0.0f64; inputs.n_nodes];
    let mut t_time = vec![t0; inputs.n_nodes];
    let mut update_node = vec![false; inputs.n_nodes];

    let n_matrix = inputs.n_matrix.view();
    let g_matrix = inputs.g_matrix.view();
    let select_matrix = inputs.select_matrix.view();
    let shift_matrix = inputs.shift_matrix.view();
    let model = &inputs.model;
    let gdata: &[f64] = &inputs.gdata;

    {
        let mut workers = build_workers(
            &ranges, nc, nd, nld, nt, &mut u, &mut v, &mut v_new, &ldata, &mut rates, &mut sum_rate, &mut t_time,
            &mut update_node, &mut rngs,
        );
        std::thread::scope(|scope| -> Result<(), SolverError> {
            let mut handles = Vec::with_capacity(workers.len());
            for worker in workers.iter_mut() {
                handles.push(scope.spawn(move || worker.init_rates(t0, gdata, model)));
            }
            for handle in handles {
                handle.join().expect("worker thread panicked")?;
            }
            Ok(())
        })?;
    }

    sink.open(tlen)?;

    // `tt`/`next_day` track the simulation's own integer-day clock, entirely
    // independent of `tspan`'s granularity: every day in `[t0, tspan[tlen-1]]`
    // is stepped, and a tspan entry that falls strictly between two
    // consecutive integer days simply gets written the first time `tt`
    // passes it, per the solver's snapshot-grid design.
    let mut tt = t0;
    let mut next_day = t0.floor() + 1.0;
    let mut u_it = 0usize;

    // `tspan[0]` is always the start time; its column is the initial state,
    // written before any day is ever stepped (the only write that uses
    // `<=` rather than strict `>`, which is what makes a single-entry
    // `tspan = [t0]` run return `U[:, 0] == u0` with no stepping at all).
    while u_it < tlen && tspan[u_it] <= tt {
        sink.write_column(u_it, &u, &v)?;
        u_it += 1;
    }

    while u_it < tlen {
        let current_day = next_day as i64;
        debug!(current_day, next_day, "starting day");

        let due_e1: Vec<Vec<ScheduledEvent>> = e1_queues.iter_mut().map(|q| q.drain_due(current_day)).collect();

        {
            let mut workers = build_workers(
                &ranges, nc, nd, nld, nt, &mut u, &mut v, &mut v_new, &ldata, &mut rates, &mut sum_rate, &mut t_time,
                &mut update_node, &mut rngs,
            );
            std::thread::scope(|scope| -> Result<(), SolverError> {
                let mut handles = Vec::with_capacity(workers.len());
                for (worker, due) in workers.iter_mut().zip(due_e1.into_iter()) {
                    handles.push(scope.spawn(move || -> Result<(), SolverError> {
                        worker.step_ctmc(next_day, gdata, model, &n_matrix, &g_matrix)?;
                        worker.apply_e1(due, &select_matrix, &shift_matrix)?;
                        Ok(())
                    }));
                }
                for handle in handles {
                    handle.join().expect("worker thread panicked")?;
                }
                Ok(())
            })?;
        }

        let due_e2 = e2_queue.drain_due(current_day);
        if !due_e2.is_empty() {
            e2::apply_e2_events(&mut u, nc, due_e2, &select_matrix, &shift_matrix, &mut rngs[0], &mut update_node)?;
        }

        {
            let mut workers = build_workers(
                &ranges, nc, nd, nld, nt, &mut u, &mut v, &mut v_new, &ldata, &mut rates, &mut sum_rate, &mut t_time,
                &mut update_node, &mut rngs,
            );
            std::thread::scope(|scope| -> Result<(), SolverError> {
                let mut handles = Vec::with_capacity(workers.len());
                for worker in workers.iter_mut() {
                    handles.push(scope.spawn(move || worker.post_step_and_refresh(next_day, gdata, model)));
                }
                for handle in handles {
                    handle.join().expect("worker thread panicked")?;
                }
                Ok(())
            })?;
        }

        tt = next_day;
        next_day += 1.0;

        while u_it < tlen && tt > tspan[u_it] {
            sink.write_column(u_it, &u, &v)?;
            u_it += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::OwnedCsc;
    use crate::sink::DenseSink;
    use std::sync::Arc;

    fn sis_model(beta: f64, gamma: f64) -> ModelCallbacks {
        // Transition 0: S -> I at rate beta*S*I/(S+I); transition 1: I -> S at rate gamma*I.
        ModelCallbacks {
            propensities: vec![
                Arc::new(move |u, _v, _ld, _gd, _t| {
                    let s = u[0] as f64;
                    let i = u[1] as f64;
                    let n = s + i;
                    if n <= 0.0 {
                        0.0
                    } else {
                        beta * s * i / n
                    }
                }),
                Arc::new(move |u, _v, _ld, _gd, _t| gamma * u[1] as f64),
            ],
            post_step: Arc::new(|_, _, _, _, _, _, _| 0),
        }
    }

    fn single_node_sis_inputs(tspan: Vec<f64>) -> SolverInputs {
        // N: 2 compartments (S, I), 2 transitions. S->I: S-1, I+1. I->S: I-1, S+1.
        let n_jc = vec![0usize, 2, 4];
        let n_ir = vec![0usize, 1, 0, 1];
        let n_pr = vec![-1i32, 1, 1, -1];
        let n_matrix = OwnedCsc::new(2, 2, n_jc, n_ir, Some(n_pr)).unwrap();

        // G: transition 0 depends on both; transition 1 depends on both (dense 2x2).
        let g_jc = vec![0usize, 2, 4];
        let g_ir = vec![0usize, 1, 0, 1];
        let g_matrix = OwnedCsc::<()>::new(2, 2, g_jc, g_ir, None).unwrap();

        // No scheduled events for this scenario; still need well-formed selector/shift matrices.
        let select_matrix = OwnedCsc::<()>::new(2, 1, vec![0, 2], vec![0, 1], None).unwrap();
        let shift_matrix = OwnedCsc::<i32>::new(2, 1, vec![0, 0], vec![], Some(vec![])).unwrap();

        SolverInputsBuilder::new()
            .nodes(1, vec![90, 10])
            .nc(2)
            .model(sis_model(0.4, 0.1))
            .stoichiometry(n_matrix)
            .dependency_graph(g_matrix)
            .selectors(select_matrix)
            .shifts(shift_matrix)
            .tspan(tspan)
            .seed(42)
            .threads(1)
            .build()
            .unwrap()
    }

    #[test]
    fn single_node_sis_run_conserves_population_and_stays_non_negative() {
        let inputs = single_node_sis_inputs((1..=20).map(|d| d as f64).collect());
        let mut sink = DenseSink::new(1, 2, 0);
        run_solver(&inputs, &mut sink).unwrap();
        for col in sink.u().chunks_exact(2) {
            assert_eq!(col[0] + col[1], 100);
            assert!(col[0] >= 0 && col[1] >= 0);
        }
    }

    #[test]
    fn rejects_mismatched_u0_length_at_build_time() {
        let n_jc = vec![0usize, 1];
        let n_ir = vec![0usize];
        let n_matrix = OwnedCsc::new(1, 1, n_jc, n_ir, Some(vec![-1i32])).unwrap();
        let g_matrix = OwnedCsc::<()>::new(1, 1, vec![0, 1], vec![0], None).unwrap();
        let select_matrix = OwnedCsc::<()>::new(1, 1, vec![0, 1], vec![0], None).unwrap();
        let shift_matrix = OwnedCsc::<i32>::new(1, 0, vec![0], vec![], None).unwrap();

        let err = SolverInputsBuilder::new()
            .nodes(2, vec![10]) // wrong length: should be 2 nodes * 1 compartment = 2
            .nc(1)
            .model(ModelCallbacks { propensities: vec![Arc::new(|_u, _v, _ld, _gd, _t| 0.0)], post_step: Arc::new(|_, _, _, _, _, _, _| 0) })
            .stoichiometry(n_matrix)
            .dependency_graph(g_matrix)
            .selectors(select_matrix)
            .shifts(shift_matrix)
            .tspan(vec![1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidInputs(_)));
    }
}
