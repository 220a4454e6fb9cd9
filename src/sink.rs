//! Trajectory sinks: where each day's snapshot of `(U, V)` goes.
//!
//! Two concrete writers share one trait: [`DenseSink`] keeps every
//! compartment and continuous state for every node at every recorded time
//! point (the `U`/`V` matrices laid out with an `Ntot*Nc`/`Ntot*Nd` row
//! stride per column), and [`SparseSink`] records only a caller-chosen
//! subset of rows, compressed-column style, for runs where the full dense
//! trajectory would be too large to keep. Both are driven the same way:
//! `open(tlen)` once up front, then one `write_column(k, ...)` per recorded
//! day.

#![forbid(unsafe_code)]

/// Errors raised by a trajectory sink.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// `write_column` was called before `open`.
    #[error("sink was written to before open() was called")]
    NotOpen,
    /// `open` was called twice on the same sink.
    #[error("sink was already opened (tlen={0})")]
    AlreadyOpen(usize),
    /// `write_column`'s `k` fell outside `[0, tlen)`.
    #[error("column {k} out of range (tlen={tlen})")]
    ColumnOutOfRange { k: usize, tlen: usize },
    /// A slice passed to `write_column` had the wrong length for this
    /// sink's declared shape.
    #[error("{what} length {got} does not match expected {expected}")]
    ShapeMismatch { what: &'static str, got: usize, expected: usize },
}

/// A destination for per-day trajectory snapshots.
pub trait TrajectorySink {
    /// Reserve storage for `tlen` recorded columns. Must be called exactly
    /// once, before any `write_column` call.
    fn open(&mut self, tlen: usize) -> Result<(), SinkError>;

    /// Record column `k`'s full state: `u` and `v`, both laid out node-major
    /// over every node in the run (not just one worker's slice).
    fn write_column(&mut self, k: usize, u: &[i32], v: &[f64]) -> Result<(), SinkError>;
}

/// Records every compartment and continuous state, for every node, at every
/// recorded time point.
pub struct DenseSink {
    ntot: usize,
    nc: usize,
    nd: usize,
    tlen: Option<usize>,
    u_out: Vec<i32>,
    v_out: Vec<f64>,
}

impl DenseSink {
    /// Build an unopened dense sink for `ntot` nodes with `nc` discrete and
    /// `nd` continuous state variables per node.
    pub fn new(ntot: usize, nc: usize, nd: usize) -> Self {
        Self { ntot, nc, nd, tlen: None, u_out: Vec::new(), v_out: Vec::new() }
    }

    /// The recorded discrete trajectory, one `Ntot*Nc`-length column per
    /// recorded day, concatenated column-major.
    pub fn u(&self) -> &[i32] {
        &self.u_out
    }

    /// The recorded continuous trajectory, laid out like [`DenseSink::u`].
    pub fn v(&self) -> &[f64] {
        &self.v_out
    }
}

impl TrajectorySink for DenseSink {
    fn open(&mut self, tlen: usize) -> Result<(), SinkError> {
        if let Some(existing) = self.tlen {
            return Err(SinkError::AlreadyOpen(existing));
        }
        self.tlen = Some(tlen);
        self.u_out = vec![0i32; self.ntot * self.nc * tlen];
        self.v_out = vec![0.0f64; self.ntot * self.nd * tlen];
        Ok(())
    }

    fn write_column(&mut self, k: usize, u: &[i32], v: &[f64]) -> Result<(), SinkError> {
        let tlen = self.tlen.ok_or(SinkError::NotOpen)?;
        if k >= tlen {
            return Err(SinkError::ColumnOutOfRange { k, tlen });
        }
        let u_len = self.ntot * self.nc;
        let v_len = self.ntot * self.nd;
        if u.len() != u_len {
            return Err(SinkError::ShapeMismatch { what: "u", got: u.len(), expected: u_len });
        }
        if v.len() != v_len {
            return Err(SinkError::ShapeMismatch { what: "v", got: v.len(), expected: v_len });
        }
        self.u_out[k * u_len..(k + 1) * u_len].copy_from_slice(u);
        self.v_out[k * v_len..(k + 1) * v_len].copy_from_slice(v);
        Ok(())
    }
}

/// Records only a fixed, caller-chosen subset of flattened `(node, row)`
/// positions, compressed-column style: the selected row set is shared
/// across every recorded column, and only the values for those rows are
/// kept per column.
pub struct SparseSink {
    selected_u_rows: Vec<usize>,
    selected_v_rows: Vec<usize>,
    tlen: Option<usize>,
    pr_u: Vec<i32>,
    pr_v: Vec<f64>,
}

impl SparseSink {
    /// Build an unopened sparse sink recording exactly `selected_u_rows`
    /// (into the flattened `Ntot*Nc` discrete state) and `selected_v_rows`
    /// (into the flattened `Ntot*Nd` continuous state) at every column.
    pub fn new(selected_u_rows: Vec<usize>, selected_v_rows: Vec<usize>) -> Self {
        Self { selected_u_rows, selected_v_rows, tlen: None, pr_u: Vec::new(), pr_v: Vec::new() }
    }

    /// The selected discrete rows, concatenated column-major: column `k`'s
    /// values occupy `pr_u()[k*n..(k+1)*n]` where `n =
    /// selected_u_rows().len()`.
    pub fn pr_u(&self) -> &[i32] {
        &self.pr_u
    }

    /// The selected continuous rows, laid out like [`SparseSink::pr_u`].
    pub fn pr_v(&self) -> &[f64] {
        &self.pr_v
    }

    /// The flattened row indices this sink records, fixed for its lifetime.
    pub fn selected_u_rows(&self) -> &[usize] {
        &self.selected_u_rows
    }
}

impl TrajectorySink for SparseSink {
    fn open(&mut self, tlen: usize) -> Result<(), SinkError> {
        if let Some(existing) = self.tlen {
            return Err(SinkError::AlreadyOpen(existing));
        }
        self.tlen = Some(tlen);
        self.pr_u = vec![0i32; self.selected_u_rows.len() * tlen];
        self.pr_v = vec![0.0f64; self.selected_v_rows.len() * tlen];
        Ok(())
    }

    fn write_column(&mut self, k: usize, u: &[i32], v: &[f64]) -> Result<(), SinkError> {
        let tlen = self.tlen.ok_or(SinkError::NotOpen)?;
        if k >= tlen {
            return Err(SinkError::ColumnOutOfRange { k, tlen });
        }
        let nu = self.selected_u_rows.len();
        let nv = self.selected_v_rows.len();
        for (i, &row) in self.selected_u_rows.iter().enumerate() {
            self.pr_u[k * nu + i] = u[row];
        }
        for (i, &row) in self.selected_v_rows.iter().enumerate() {
            self.pr_v[k * nv + i] = v[row];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_sink_round_trips_a_column() {
        let mut sink = DenseSink::new(2, 2, 1);
        sink.open(3).unwrap();
        sink.write_column(1, &[1, 2, 3, 4], &[0.5, 1.5]).unwrap();
        assert_eq!(&sink.u()[4..8], &[1, 2, 3, 4]);
        assert_eq!(&sink.v()[2..4], &[0.5, 1.5]);
    }

    #[test]
    fn dense_sink_rejects_write_before_open() {
        let mut sink = DenseSink::new(1, 1, 1);
        let err = sink.write_column(0, &[1], &[0.0]).unwrap_err();
        assert_eq!(err, SinkError::NotOpen);
    }

    #[test]
    fn dense_sink_rejects_shape_mismatch() {
        let mut sink = DenseSink::new(1, 2, 0);
        sink.open(1).unwrap();
        let err = sink.write_column(0, &[1], &[]).unwrap_err();
        assert!(matches!(err, SinkError::ShapeMismatch { what: "u", .. }));
    }

    #[test]
    fn sparse_sink_only_records_selected_rows() {
        let mut sink = SparseSink::new(vec![0, 3], vec![]);
        sink.open(2).unwrap();
        sink.write_column(0, &[9, 1, 1, 9], &[]).unwrap();
        assert_eq!(sink.pr_u(), &[9, 9, 0, 0]);
    }
}
