//! Single-node SIS (susceptible-infected-susceptible) demo: no scheduled
//! events, just the continuous-time S <-> I chain, run to completion and
//! printed as a discrete trajectory.

use std::sync::Arc;

use anyhow::Result;
use siminf_core::matrix::OwnedCsc;
use siminf_core::model::ModelCallbacks;
use siminf_core::sink::DenseSink;
use siminf_core::solver::{run_solver, SolverInputsBuilder};

fn sis_model(beta: f64, gamma: f64) -> ModelCallbacks {
    ModelCallbacks {
        propensities: vec![
            Arc::new(move |u: &[i32], _v: &[f64], _ld: &[f64], _gd: &[f64], _t: f64| {
                let s = u[0] as f64;
                let i = u[1] as f64;
                let n = s + i;
                if n <= 0.0 {
                    0.0
                } else {
                    beta * s * i / n
                }
            }),
            Arc::new(move |u: &[i32], _v: &[f64], _ld: &[f64], _gd: &[f64], _t: f64| gamma * u[1] as f64),
        ],
        post_step: Arc::new(|_, _, _, _, _, _, _| 0),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    // Compartments: [S, I]. Transition 0: S -> I. Transition 1: I -> S.
    let n_matrix = OwnedCsc::new(2, 2, vec![0, 2, 4], vec![0, 1, 0, 1], Some(vec![-1i32, 1, 1, -1]))?;
    let g_matrix = OwnedCsc::<()>::new(2, 2, vec![0, 2, 4], vec![0, 1, 0, 1], None)?;
    let select_matrix = OwnedCsc::<()>::new(2, 1, vec![0, 2], vec![0, 1], None)?;
    let shift_matrix = OwnedCsc::<i32>::new(2, 1, vec![0, 0], vec![], Some(vec![]))?;

    let inputs = SolverInputsBuilder::new()
        .nodes(1, vec![990, 10])
        .nc(2)
        .model(sis_model(0.4, 0.1))
        .stoichiometry(n_matrix)
        .dependency_graph(g_matrix)
        .selectors(select_matrix)
        .shifts(shift_matrix)
        .tspan((1..=100).map(|d| d as f64).collect())
        .seed(20260728)
        .threads(1)
        .build()?;

    let mut sink = DenseSink::new(1, 2, 0);
    run_solver(&inputs, &mut sink)?;

    for (day, col) in sink.u().chunks_exact(2).enumerate() {
        println!("day {:>3}: S={:<5} I={:<5}", day + 1, col[0], col[1]);
    }
    Ok(())
}
