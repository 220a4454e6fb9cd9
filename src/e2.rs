//! E2 processor: applies scheduled `EXTERNAL_TRANSFER` events, which may
//! move individuals between nodes owned by different workers.
//!
//! Unlike E1, this phase has no static owner to parallelize over — a single
//! event can write to two different workers' node ranges — so it runs as a
//! single-writer stage between the two barriers described in the solver's
//! concurrency design, using worker 0's RNG stream.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;

use crate::error::SolverError;
use crate::event::{requested_count, EventKind, ScheduledEvent};
use crate::matrix::CscView;
use crate::transfer;

/// Apply every due E2 event against the full, un-partitioned compartment
/// array.
///
/// `u` covers every node (`u[node * nc .. node * nc + nc]`), since E2 events
/// may read and write across worker boundaries. `update_node` is likewise
/// the full, un-partitioned update-flag array.
pub fn apply_e2_events(
    u: &mut [i32],
    nc: usize,
    events: Vec<ScheduledEvent>,
    select_matrix: &CscView<()>,
    shift_matrix: &CscView<i32>,
    rng: &mut StdRng,
    update_node: &mut [bool],
) -> Result<(), SolverError> {
    for event in events {
        debug_assert_eq!(event.kind, EventKind::ExternalTransfer, "only EXTERNAL_TRANSFER reaches the E2 processor");
        let dest = event.dest.expect("external transfer carries a destination node");
        let shift = event.shift.expect("external transfer carries a shift column");

        let select = select_matrix.column(event.select);
        let shift_col = shift_matrix.column(shift);

        // `u` cannot be split into two non-overlapping mutable borrows when
        // `event.node == dest` (a self-transfer); reuse the single-node
        // internal-transfer path in that case, which performs the same
        // decrement/increment pair against one compartment slice.
        if event.node == dest {
            let u_node = &mut u[event.node * nc..event.node * nc + nc];
            let total = transfer::subpopulation_total(u_node, &select);
            let count = requested_count(&event, total);
            transfer::internal_transfer(u_node, event.node, &select, &shift_col, count, nc, rng)?;
        } else {
            let (lo, hi) = if event.node < dest { (event.node, dest) } else { (dest, event.node) };
            let (left, right) = u.split_at_mut(hi * nc);
            let (u_src, u_dest) = if event.node < dest {
                (&mut left[lo * nc..lo * nc + nc], &mut right[0..nc])
            } else {
                (&mut right[0..nc], &mut left[lo * nc..lo * nc + nc])
            };
            let total = transfer::subpopulation_total(u_src, &select);
            let count = requested_count(&event, total);
            transfer::external_transfer(u_src, u_dest, event.node, &select, &shift_col, count, nc, rng)?;
        }

        update_node[event.node] = true;
        update_node[dest] = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::worker_rng;

    fn transfer_event(src: usize, dest: usize, n: i64) -> ScheduledEvent {
        ScheduledEvent {
            kind: EventKind::ExternalTransfer,
            time: 1,
            node: src,
            dest: Some(dest),
            n,
            proportion: 0.0,
            select: 0,
            shift: Some(0),
            input_order: 0,
        }
    }

    fn no_op_shift() -> CscView<'static, i32> {
        static JC: [usize; 2] = [0, 0];
        static IR: [usize; 0] = [];
        CscView::new(1, 1, &JC, &IR, Some(&[])).unwrap()
    }

    #[test]
    fn external_transfer_moves_mass_between_two_nodes() {
        let jc = [0usize, 1];
        let ir = [0usize];
        let select = CscView::<()>::new(1, 1, &jc, &ir, None).unwrap();
        let shift = no_op_shift();
        let mut u = vec![5i32, 0]; // node 0 has 5, node 1 has 0
        let mut update_node = [false, false];
        let mut rng = worker_rng(1);
        apply_e2_events(&mut u, 1, vec![transfer_event(0, 1, 5)], &select, &shift, &mut rng, &mut update_node)
            .unwrap();
        assert_eq!(u, vec![0, 5]);
        assert!(update_node[0] && update_node[1]);
    }

    #[test]
    fn external_transfer_handles_reversed_node_order() {
        let jc = [0usize, 1];
        let ir = [0usize];
        let select = CscView::<()>::new(1, 1, &jc, &ir, None).unwrap();
        let shift = no_op_shift();
        let mut u = vec![0i32, 7]; // node 1 (dest=0) has 7, transfers to node 0
        let mut update_node = [false, false];
        let mut rng = worker_rng(1);
        apply_e2_events(&mut u, 1, vec![transfer_event(1, 0, 7)], &select, &shift, &mut rng, &mut update_node)
            .unwrap();
        assert_eq!(u, vec![7, 0]);
    }

    #[test]
    fn external_transfer_rejects_insufficient_subpopulation() {
        let jc = [0usize, 1];
        let ir = [0usize];
        let select = CscView::<()>::new(1, 1, &jc, &ir, None).unwrap();
        let shift = no_op_shift();
        let mut u = vec![2i32, 0];
        let mut update_node = [false, false];
        let mut rng = worker_rng(1);
        let err = apply_e2_events(&mut u, 1, vec![transfer_event(0, 1, 9)], &select, &shift, &mut rng, &mut update_node)
            .unwrap_err();
        assert!(matches!(err, SolverError::InsufficientSubpopulation { .. }));
    }
}
