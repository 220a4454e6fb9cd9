//! The static node-to-worker partition.
//!
//! Node, transition, and worker indices are passed around the rest of the
//! crate as plain `usize` (matching `matrix`'s `CscView`, which is indexed
//! the same way), so the only thing this module centralizes is the one
//! piece of real structure: which contiguous run of node indices each
//! worker owns.

#![forbid(unsafe_code)]

/// Static, contiguous node partition assigned to each worker.
///
/// Worker `i` owns nodes `[i * floor(Nn/N), (i+1) * floor(Nn/N))`, except the
/// last worker, which absorbs the remainder `Nn % N`. Mirrors the block
/// partitioning used throughout the streaming core this crate is built from,
/// generalized from time-blocks to node-ranges.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodeRange {
    /// First node owned by this worker (inclusive).
    pub start: usize,
    /// One past the last node owned by this worker (exclusive).
    pub end: usize,
}

impl NodeRange {
    /// Number of nodes in this range.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether this range owns no nodes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether this range owns `node`.
    #[inline]
    pub fn contains(&self, node: usize) -> bool {
        node >= self.start && node < self.end
    }
}

/// Compute the static per-worker node partition for `n_nodes` nodes split
/// across `n_workers` workers.
///
/// `n_workers == 0` is rejected by the caller before this is reached; the
/// orchestrator resolves "use all available" to a concrete thread count
/// first (see `solver::resolve_thread_count`).
pub fn partition_nodes(n_nodes: usize, n_workers: usize) -> Vec<NodeRange> {
    assert!(n_workers > 0, "n_workers must be positive");
    let base = n_nodes / n_workers;
    let mut ranges = Vec::with_capacity(n_workers);
    let mut start = 0usize;
    for i in 0..n_workers {
        let mut len = base;
        if i == n_workers - 1 {
            len += n_nodes % n_workers;
        }
        let end = start + len;
        ranges.push(NodeRange { start, end });
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_node_exactly_once() {
        for n_nodes in [0usize, 1, 2, 3, 7, 10, 100] {
            for n_workers in 1..=8usize {
                let ranges = partition_nodes(n_nodes, n_workers);
                assert_eq!(ranges.len(), n_workers);
                let mut covered = 0usize;
                for (i, r) in ranges.iter().enumerate() {
                    if i > 0 {
                        assert_eq!(r.start, ranges[i - 1].end);
                    }
                    covered += r.len();
                }
                assert_eq!(covered, n_nodes);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges.last().unwrap().end, n_nodes);
            }
        }
    }

    #[test]
    fn last_worker_absorbs_remainder() {
        let ranges = partition_nodes(10, 3);
        assert_eq!(ranges[0].len(), 3);
        assert_eq!(ranges[1].len(), 3);
        assert_eq!(ranges[2].len(), 4);
    }
}
