//! Scheduled events: the `(kind, time, node, dest, n, proportion, select,
//! shift)` tuples that move individuals between compartments and between
//! nodes at integer day boundaries, outside the continuous-time Markov
//! chain.

#![forbid(unsafe_code)]

use crate::error::SolverError;

/// The four event kinds recognized at the core boundary, encoded as
/// `0..=3` per the external-interface design.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Remove individuals from a node's selected subpopulation.
    Exit,
    /// Add individuals to a node's selected compartment.
    Enter,
    /// Relabel individuals within a node (e.g. aging a cohort).
    InternalTransfer,
    /// Move individuals from one node to another, possibly owned by a
    /// different worker.
    ExternalTransfer,
}

impl EventKind {
    /// Decode the `0..=3` wire encoding named in the external-interface
    /// design. Returns `None` for any other value.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EventKind::Exit),
            1 => Some(EventKind::Enter),
            2 => Some(EventKind::InternalTransfer),
            3 => Some(EventKind::ExternalTransfer),
            _ => None,
        }
    }
}

/// One scheduled event, already decoded and range-checked.
///
/// `n` and `proportion` follow the rule from the data model: if `n > 0` it
/// is an absolute requested count; otherwise `proportion` requests a
/// fraction of the selected subpopulation. `dest` and `shift` are only
/// meaningful for transfer kinds and are `None` otherwise.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScheduledEvent {
    /// Which operation this event performs.
    pub kind: EventKind,
    /// Integer day on which this event is applied.
    pub time: i64,
    /// Source node, zero-based.
    pub node: usize,
    /// Destination node for `ExternalTransfer`, zero-based.
    pub dest: Option<usize>,
    /// Absolute requested count, or `0` to request a `proportion` instead.
    pub n: i64,
    /// Fraction of the selected subpopulation requested when `n == 0`.
    pub proportion: f64,
    /// Column of the selector matrix `E` identifying the eligible
    /// subpopulation.
    pub select: usize,
    /// Column of the shift matrix `S_shift` used to relabel individuals,
    /// for `InternalTransfer`/`ExternalTransfer`.
    pub shift: Option<usize>,
    /// Position of this event in the original input stream, used to break
    /// ties between events sharing `(time, node, kind)` in favor of input
    /// order (see the solver's open questions).
    pub input_order: usize,
}

/// Errors raised while decoding or range-validating a raw event record.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// `node` (or `dest`, for transfers) fell outside `[0, Nn)`.
    #[error("event {input_order}: node {node} out of range (Nn={nn})")]
    NodeOutOfRange { input_order: usize, node: usize, nn: usize },
    /// `select` fell outside the selector matrix `E`'s column range.
    #[error("event {input_order}: select {select} out of range (Nselect={nselect})")]
    SelectOutOfRange { input_order: usize, select: usize, nselect: usize },
    /// `shift` fell outside the shift matrix `S_shift`'s column range.
    #[error("event {input_order}: shift {shift} out of range (Nshift={nshift})")]
    ShiftOutOfRange { input_order: usize, shift: usize, nshift: usize },
    /// `proportion` fell outside `[0, 1]` when `n == 0`.
    #[error("event {input_order}: proportion {proportion} out of range [0, 1]")]
    ProportionOutOfRange { input_order: usize, proportion: f64 },
}

/// Raw, parallel-array event record as it arrives at the external boundary,
/// before decoding into a [`ScheduledEvent`].
#[derive(Copy, Clone, Debug)]
pub struct RawEvent {
    /// Wire-encoded event kind, `0..=3` (see [`EventKind::from_code`]).
    pub kind: u8,
    /// Integer day this event is scheduled for.
    pub time: i64,
    /// Source node, zero-based.
    pub node: usize,
    /// Destination node for `ExternalTransfer`; ignored otherwise.
    pub dest: usize,
    /// Absolute requested count, or `0` to request a `proportion` instead.
    pub n: i64,
    /// Fraction of the selected subpopulation requested when `n == 0`.
    pub proportion: f64,
    /// Column of the selector matrix `E`.
    pub select: usize,
    /// Column of the shift matrix `S_shift`; ignored for kinds that don't
    /// relabel compartments.
    pub shift: usize,
}

/// Decode and range-check one raw event, in the context of a model's shape
/// (`Nn` nodes, `Nselect` selector columns, `Nshift` shift columns).
///
/// `input_order` is the event's position in the original time-sorted stream
/// and is carried into the decoded event for tie-breaking. An unrecognized
/// `kind` discriminant is rejected as `SolverError::UndefinedEvent` rather
/// than silently treated as any particular kind.
pub fn decode_event(
    raw: RawEvent,
    input_order: usize,
    n_nodes: usize,
    n_select: usize,
    n_shift: usize,
) -> Result<ScheduledEvent, SolverError> {
    let kind = EventKind::from_code(raw.kind).ok_or(SolverError::UndefinedEvent(raw.kind))?;

    if raw.node >= n_nodes {
        return Err(EventError::NodeOutOfRange { input_order, node: raw.node, nn: n_nodes }.into());
    }
    let dest = match kind {
        EventKind::ExternalTransfer => {
            if raw.dest >= n_nodes {
                return Err(EventError::NodeOutOfRange { input_order, node: raw.dest, nn: n_nodes }.into());
            }
            Some(raw.dest)
        }
        _ => None,
    };
    if raw.select >= n_select {
        return Err(EventError::SelectOutOfRange { input_order, select: raw.select, nselect: n_select }.into());
    }
    let shift = match kind {
        EventKind::InternalTransfer | EventKind::ExternalTransfer => {
            if raw.shift >= n_shift {
                return Err(EventError::ShiftOutOfRange { input_order, shift: raw.shift, nshift: n_shift }.into());
            }
            Some(raw.shift)
        }
        _ => None,
    };
    if raw.n == 0 && !(0.0..=1.0).contains(&raw.proportion) {
        return Err(EventError::ProportionOutOfRange { input_order, proportion: raw.proportion }.into());
    }

    Ok(ScheduledEvent {
        kind,
        time: raw.time,
        node: raw.node,
        dest,
        n: raw.n,
        proportion: raw.proportion,
        select: raw.select,
        shift,
        input_order,
    })
}

/// Resolve the requested count for an event given the total size of the
/// selected subpopulation, per the `n > 0` / `proportion` rule. Uses
/// truncation, not round-half-to-even, matching the host's documented
/// rounding rule.
pub fn requested_count(event: &ScheduledEvent, total: i64) -> i64 {
    if event.n > 0 {
        event.n
    } else {
        ((event.proportion * total as f64) as i64).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: u8) -> RawEvent {
        RawEvent { kind, time: 1, node: 0, dest: 1, n: 5, proportion: 0.0, select: 0, shift: 0 }
    }

    #[test]
    fn decodes_valid_external_transfer() {
        let ev = decode_event(raw(3), 0, 2, 1, 1).unwrap();
        assert_eq!(ev.kind, EventKind::ExternalTransfer);
        assert_eq!(ev.dest, Some(1));
        assert_eq!(ev.shift, Some(0));
    }

    #[test]
    fn rejects_node_out_of_range() {
        let mut r = raw(0);
        r.node = 5;
        let err = decode_event(r, 3, 2, 1, 1).unwrap_err();
        assert_eq!(err, SolverError::Event(EventError::NodeOutOfRange { input_order: 3, node: 5, nn: 2 }));
    }

    #[test]
    fn rejects_dest_out_of_range_for_transfer() {
        let mut r = raw(3);
        r.dest = 9;
        let err = decode_event(r, 0, 2, 1, 1).unwrap_err();
        assert_eq!(err, SolverError::Event(EventError::NodeOutOfRange { input_order: 0, node: 9, nn: 2 }));
    }

    #[test]
    fn enter_and_exit_ignore_shift() {
        let mut r = raw(1);
        r.shift = 99; // out of range, but Enter doesn't use shift
        let ev = decode_event(r, 0, 2, 1, 1).unwrap();
        assert_eq!(ev.shift, None);
    }

    #[test]
    fn rejects_out_of_range_proportion_when_n_is_zero() {
        let mut r = raw(0);
        r.n = 0;
        r.proportion = 1.5;
        let err = decode_event(r, 0, 2, 1, 1).unwrap_err();
        assert_eq!(err, SolverError::Event(EventError::ProportionOutOfRange { input_order: 0, proportion: 1.5 }));
    }

    #[test]
    fn rejects_undefined_event_kind() {
        let r = raw(7);
        let err = decode_event(r, 0, 2, 1, 1).unwrap_err();
        assert_eq!(err, SolverError::UndefinedEvent(7));
    }

    #[test]
    fn requested_count_prefers_absolute_n() {
        let ev = decode_event(raw(0), 0, 2, 1, 1).unwrap();
        assert_eq!(requested_count(&ev, 100), 5);
    }

    #[test]
    fn requested_count_truncates_proportion() {
        let mut r = raw(0);
        r.n = 0;
        r.proportion = 0.34;
        let ev = decode_event(r, 0, 2, 1, 1).unwrap();
        assert_eq!(requested_count(&ev, 10), 3);
    }
}
