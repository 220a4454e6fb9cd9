//! Two-node SIS demo: each node runs its own S <-> I chain, and a single
//! scheduled `EXTERNAL_TRANSFER` event moves susceptibles from node 0 into
//! node 1 partway through the run.

use std::sync::Arc;

use anyhow::Result;
use siminf_core::event::RawEvent;
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

    let n_matrix = OwnedCsc::new(2, 2, vec![0, 2, 4], vec![0, 1, 0, 1], Some(vec![-1i32, 1, 1, -1]))?;
    let g_matrix = OwnedCsc::<()>::new(2, 2, vec![0, 2, 4], vec![0, 1, 0, 1], None)?;
    // One selector column: compartment 0 (S) only, used by the external transfer.
    let select_matrix = OwnedCsc::<()>::new(2, 1, vec![0, 1], vec![0], None)?;
    // One shift column, offset 0: the transferred individuals land in the same
    // compartment index at the destination node.
    let shift_matrix = OwnedCsc::<i32>::new(2, 1, vec![0, 1], vec![0], Some(vec![0]))?;

    let move_200_susceptibles_from_node0_to_node1 = RawEvent {
        kind: 3, // EXTERNAL_TRANSFER
        time: 10,
        node: 0,
        dest: 1,
        n: 200,
        proportion: 0.0,
        select: 0,
        shift: 0,
    };

    let inputs = SolverInputsBuilder::new()
        .nodes(2, vec![900, 100, 300, 0])
        .nc(2)
        .model(sis_model(0.4, 0.1))
        .stoichiometry(n_matrix)
        .dependency_graph(g_matrix)
        .selectors(select_matrix)
        .shifts(shift_matrix)
        .events(vec![move_200_susceptibles_from_node0_to_node1])
        .tspan((1..=60).map(|d| d as f64).collect())
        .seed(20260728)
        .threads(2)
        .build()?;

    let mut sink = DenseSink::new(2, 2, 0);
    run_solver(&inputs, &mut sink)?;

    for (day, col) in sink.u().chunks_exact(4).enumerate() {
        println!(
            "day {:>3}: node0 S={:<5} I={:<5}  node1 S={:<5} I={:<5}",
            day + 1,
            col[0],
            col[1],
            col[2],
            col[3]
        );
    }
    Ok(())
}
