//! E1 processor: applies scheduled events confined to a single node.
//!
//! E1 events only ever touch nodes owned by the worker processing them, so
//! every worker runs this fully in parallel with its peers — there is no
//! shared mutable state here beyond the worker's own node slice.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;

use crate::error::SolverError;
use crate::event::{requested_count, EventKind, ScheduledEvent};
use crate::index::NodeRange;
use crate::matrix::CscView;
use crate::transfer;

/// Apply every due E1 event against a worker's own node slice.
///
/// `u` covers exactly the nodes in `range`, laid out node-major
/// (`u[local_node * nc .. local_node * nc + nc]`). `events` must already be
/// confined to `range` by the splitter; `update_node` is this worker's
/// local update-flag slice, set for every node an event touches so the
/// post-step phase knows to refresh its rates.
pub fn apply_e1_events(
    range: NodeRange,
    u: &mut [i32],
    nc: usize,
    events: Vec<ScheduledEvent>,
    select_matrix: &CscView<()>,
    shift_matrix: &CscView<i32>,
    rng: &mut StdRng,
    update_node: &mut [bool],
) -> Result<(), SolverError> {
    for event in events {
        debug_assert!(event.kind != EventKind::ExternalTransfer, "E2 events must not reach the E1 processor");
        debug_assert!(range.contains(event.node), "event node must belong to this worker's range");

        let local = event.node - range.start;
        let u_node = &mut u[local * nc..local * nc + nc];
        let select = select_matrix.column(event.select);

        match event.kind {
            EventKind::Exit => {
                let total = transfer::subpopulation_total(u_node, &select);
                let count = requested_count(&event, total);
                transfer::exit(u_node, event.node, &select, count, rng)?;
            }
            EventKind::Enter => {
                transfer::enter(u_node, event.node, &select, event.n)?;
            }
            EventKind::InternalTransfer => {
                let total = transfer::subpopulation_total(u_node, &select);
                let count = requested_count(&event, total);
                let shift = shift_matrix.column(event.shift.expect("internal transfer carries a shift column"));
                transfer::internal_transfer(u_node, event.node, &select, &shift, count, nc, rng)?;
            }
            EventKind::ExternalTransfer => unreachable!("routed to E2 by the splitter"),
        }

        update_node[local] = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::partition_nodes;
    use crate::rng::worker_rng;

    fn enter_event(node: usize, select: usize, n: i64) -> ScheduledEvent {
        ScheduledEvent { kind: EventKind::Enter, time: 0, node, dest: None, n, proportion: 0.0, select, shift: None, input_order: 0 }
    }

    #[test]
    fn enter_event_updates_owning_node_and_marks_it_dirty() {
        let range = partition_nodes(1, 1)[0];
        let jc = [0usize, 1];
        let ir = [0usize];
        let select = CscView::<()>::new(2, 1, &jc, &ir, None).unwrap();
        let shift = CscView::<i32>::new(2, 0, &[0usize], &[], None).unwrap();
        let mut u = [0i32, 0];
        let mut update_node = [false];
        let mut rng = worker_rng(1);
        apply_e1_events(range, &mut u, 2, vec![enter_event(0, 0, 4)], &select, &shift, &mut rng, &mut update_node)
            .unwrap();
        assert_eq!(u, [4, 0]);
        assert!(update_node[0]);
    }
}
