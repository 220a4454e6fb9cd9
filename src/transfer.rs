//! Shared primitives for applying EXIT / ENTER / INTERNAL_TRANSFER /
//! EXTERNAL_TRANSFER against compartment vectors.
//!
//! Both the E1 processor (`exit`/`enter`/`internal_transfer`, confined to a
//! single node) and the E2 processor (`external_transfer`, crossing node and
//! worker boundaries) build on the same sampling and bookkeeping primitives
//! defined here, so the sampling discipline for "draw k without replacement
//! from a selected subpopulation" only has one implementation.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;

use crate::error::SolverError;
use crate::matrix::CscColumn;
use crate::rng::sample_without_replacement;

/// Read the selected subpopulation's per-compartment counts and total, for a
/// node's compartment vector `u` and a selector column.
fn read_subpopulation(u: &[i32], select: &CscColumn<()>) -> (Vec<i64>, i64) {
    let counts: Vec<i64> = select.rows().iter().map(|&c| u[c] as i64).collect();
    let total = counts.iter().sum();
    (counts, total)
}

/// Total size of the subpopulation selected by `select` in node `u`.
///
/// Exposed so callers can resolve an event's `n`/`proportion` pair into a
/// concrete count (`event::requested_count`) before calling one of the
/// `exit`/`internal_transfer`/`external_transfer` functions below, which all
/// take an already-resolved count.
pub fn subpopulation_total(u: &[i32], select: &CscColumn<()>) -> i64 {
    select.rows().iter().map(|&c| u[c] as i64).sum()
}

fn check_available(requested: i64, available: i64, node: usize) -> Result<(), SolverError> {
    if requested > available {
        return Err(SolverError::InsufficientSubpopulation { node, requested, available });
    }
    Ok(())
}

/// Remove `count` individuals, sampled without replacement from the
/// selected subpopulation, from `u` (§4.4 EXIT).
pub fn exit(
    u: &mut [i32],
    node: usize,
    select: &CscColumn<()>,
    count: i64,
    rng: &mut StdRng,
) -> Result<(), SolverError> {
    let (counts, total) = read_subpopulation(u, select);
    check_available(count, total, node)?;
    let drawn = sample_without_replacement(rng, &counts, count);
    for (&row, &d) in select.rows().iter().zip(drawn.iter()) {
        u[row] -= d as i32;
        if u[row] < 0 {
            return Err(SolverError::NegativeState { node, compartment: row, value: u[row] as i64 });
        }
    }
    Ok(())
}

/// Add `n` individuals to the single compartment named by `select`
/// (§4.4 ENTER). Rejects selectors that name more than one compartment.
pub fn enter(u: &mut [i32], node: usize, select: &CscColumn<()>, n: i64) -> Result<(), SolverError> {
    if select.len() != 1 {
        return Err(SolverError::InvalidInputs(format!(
            "ENTER requires a single-target selector (node {node}, got {} targets)",
            select.len()
        )));
    }
    let row = select.rows()[0];
    u[row] += n as i32;
    Ok(())
}

/// Relabel `count` individuals sampled from the selected subpopulation by
/// the per-compartment offsets in `shift` (§4.4 INTERNAL_TRANSFER).
///
/// For each compartment `c` chosen, `d` individuals move from `u[c]` to
/// `u[c + shift(c)]`; an offset that would land outside `[0, Nc)` is
/// rejected as `EVENT_SHIFT_OUT_OF_RANGE` at the matrix boundary (here
/// surfaced as `SolverError::InvalidInputs`, since it depends on the
/// runtime compartment count rather than the static event validation in
/// `event::decode_event`).
pub fn internal_transfer(
    u: &mut [i32],
    node: usize,
    select: &CscColumn<()>,
    shift: &CscColumn<i32>,
    count: i64,
    nc: usize,
    rng: &mut StdRng,
) -> Result<(), SolverError> {
    let (counts, total) = read_subpopulation(u, select);
    check_available(count, total, node)?;
    let drawn = sample_without_replacement(rng, &counts, count);
    for (&row, &d) in select.rows().iter().zip(drawn.iter()) {
        if d == 0 {
            continue;
        }
        let offset = *shift.value_for_row(row).unwrap_or(&0);
        let target = row as i64 + offset as i64;
        if target < 0 || target as usize >= nc {
            return Err(SolverError::InvalidInputs(format!(
                "internal transfer shift takes compartment {row} out of range [0, {nc}) at node {node}"
            )));
        }
        u[row] -= d as i32;
        u[target as usize] += d as i32;
        if u[row] < 0 {
            return Err(SolverError::NegativeState { node, compartment: row, value: u[row] as i64 });
        }
    }
    Ok(())
}

/// Move `count` individuals sampled from `u_src`'s selected subpopulation
/// into `u_dest`, applying `shift`'s offsets on arrival (§4.4
/// EXTERNAL_TRANSFER). Unlike `internal_transfer`, source and destination
/// are different nodes (possibly owned by different workers), which is why
/// this takes two separate compartment slices rather than one.
pub fn external_transfer(
    u_src: &mut [i32],
    u_dest: &mut [i32],
    src_node: usize,
    select: &CscColumn<()>,
    shift: &CscColumn<i32>,
    count: i64,
    nc: usize,
    rng: &mut StdRng,
) -> Result<(), SolverError> {
    let (counts, total) = read_subpopulation(u_src, select);
    check_available(count, total, src_node)?;
    let drawn = sample_without_replacement(rng, &counts, count);
    for (&row, &d) in select.rows().iter().zip(drawn.iter()) {
        if d == 0 {
            continue;
        }
        let offset = *shift.value_for_row(row).unwrap_or(&0);
        let target = row as i64 + offset as i64;
        if target < 0 || target as usize >= nc {
            return Err(SolverError::InvalidInputs(format!(
                "external transfer shift takes compartment {row} out of range [0, {nc}) at source node {src_node}"
            )));
        }
        u_src[row] -= d as i32;
        u_dest[target as usize] += d as i32;
        if u_src[row] < 0 {
            return Err(SolverError::NegativeState { node: src_node, compartment: row, value: u_src[row] as i64 });
        }
    }
    Ok(())
}
