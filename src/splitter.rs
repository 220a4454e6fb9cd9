//! Event splitter: partitions a flat, time-sorted event stream into
//! per-worker E1 queues and a single E2 queue.
//!
//! This is a single linear pass — a stable partition by `(kind, node
//! range)` — over the already time-sorted input. An event belongs to
//! worker `i`'s E1 queue iff its `node` falls in worker `i`'s range and its
//! kind is not `ExternalTransfer`; `ExternalTransfer` events always go to
//! the single E2 queue regardless of which worker's range their source node
//! falls in. Because the pass preserves input order within each output
//! bucket, events that share `(time, node)` keep their arrival order, which
//! is exactly the ordering guarantee the solver promises.

#![forbid(unsafe_code)]

use crate::event::{EventKind, ScheduledEvent};
use crate::index::NodeRange;
use crate::queue::EventQueue;

/// Locate the worker that owns `node` under a static, contiguous partition.
///
/// Node ranges are produced by [`crate::index::partition_nodes`] and are
/// therefore sorted and contiguous, so a linear scan is sufficient — worker
/// counts are small (bounded by available hardware threads), never large
/// enough to justify a binary search.
fn owning_worker(node: usize, node_ranges: &[NodeRange]) -> usize {
    node_ranges
        .iter()
        .position(|r| r.contains(node))
        .expect("node must fall within exactly one worker's range")
}

/// Split a time-sorted event stream into `node_ranges.len()` per-worker E1
/// queues plus one E2 queue (owned by worker 0).
pub fn split_events(
    events: Vec<ScheduledEvent>,
    node_ranges: &[NodeRange],
) -> (Vec<EventQueue>, EventQueue) {
    let mut e1_buckets: Vec<Vec<ScheduledEvent>> = vec![Vec::new(); node_ranges.len()];
    let mut e2_bucket: Vec<ScheduledEvent> = Vec::new();

    for event in events {
        if event.kind == EventKind::ExternalTransfer {
            e2_bucket.push(event);
        } else {
            let worker = owning_worker(event.node, node_ranges);
            e1_buckets[worker].push(event);
        }
    }

    let e1_queues = e1_buckets.into_iter().map(EventQueue::new).collect();
    let e2_queue = EventQueue::new(e2_bucket);
    (e1_queues, e2_queue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::partition_nodes;

    fn ev(kind: EventKind, time: i64, node: usize, order: usize) -> ScheduledEvent {
        ScheduledEvent { kind, time, node, dest: None, n: 1, proportion: 0.0, select: 0, shift: None, input_order: order }
    }

    #[test]
    fn local_events_route_by_owning_worker() {
        let ranges = partition_nodes(4, 2); // worker 0: [0,2), worker 1: [2,4)
        let events = vec![
            ev(EventKind::Enter, 1, 0, 0),
            ev(EventKind::Exit, 1, 3, 1),
            ev(EventKind::Enter, 2, 1, 2),
        ];
        let (e1, e2) = split_events(events, &ranges);
        assert!(e2.is_empty());
        assert_eq!(e1[0].len(), 2); // nodes 0 and 1
        assert_eq!(e1[1].len(), 1); // node 3
    }

    #[test]
    fn external_transfers_always_go_to_e2_regardless_of_source_node() {
        let ranges = partition_nodes(4, 2);
        let events = vec![
            ev(EventKind::ExternalTransfer, 1, 0, 0),
            ev(EventKind::ExternalTransfer, 1, 3, 1),
        ];
        let (e1, e2) = split_events(events, &ranges);
        assert!(e1.iter().all(|q| q.is_empty()));
        assert_eq!(e2.len(), 2);
    }

    #[test]
    fn relative_input_order_is_preserved_within_each_bucket() {
        let ranges = partition_nodes(2, 1);
        let events = vec![
            ev(EventKind::Enter, 1, 0, 0),
            ev(EventKind::Exit, 1, 0, 1),
            ev(EventKind::Enter, 1, 0, 2),
        ];
        let (e1, _) = split_events(events, &ranges);
        let due: Vec<_> = e1.into_iter().next().unwrap().drain_due(1).iter().map(|e| e.input_order).collect();
        assert_eq!(due, vec![0, 1, 2]);
    }
}
