//! Compressed sparse row/column matrices (CSR/CSC), with a workspace that
//! amortises secondary-axis access.

use std::sync::Arc;

use num::{NumCast, ToPrimitive};

use crate::config::global_config;
use crate::error::{MatrixError, Result};
use crate::oracle::{Oracle, OracleStream};
use crate::sparse_range::SparseRange;

use super::workspace::{SecondaryAxisWorkspace, WorkspaceStep};
use super::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};

/// The storage order of a [`CompressedSparseMatrix`]: which axis is the
/// "primary" one, indexed by `indptr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOrder {
    /// Compressed sparse row: rows are the primary axis.
    Csr,
    /// Compressed sparse column: columns are the primary axis.
    Csc,
}

/// A compressed sparse row (CSR) or column (CSC) matrix.
///
/// `values[indptr[p]..indptr[p+1]]` and `indices[indptr[p]..indptr[p+1]]`
/// hold the non-zero values and ascending secondary-axis positions of
/// primary slice `p`.
#[derive(Debug, Clone)]
pub struct CompressedSparseMatrix<V, I> {
    values: Vec<V>,
    indices: Vec<I>,
    indptr: Vec<usize>,
    nrow: usize,
    ncol: usize,
    order: StorageOrder,
}

impl<V: Value, I: Index> CompressedSparseMatrix<V, I> {
    /// Create a new compressed sparse matrix, validating `indptr` and
    /// `indices` unless `validate` is `Some(false)`.
    ///
    /// When `validate` is `None`, the
    /// [`Config::validate_on_construction`](crate::config::Config::validate_on_construction)
    /// default governs whether validation runs.
    ///
    /// # Errors
    /// Returns [`MatrixError::ShapeMismatch`] if `indptr`'s length does not
    /// match the primary axis length plus one, or if `values`/`indices`
    /// lengths disagree with `indptr`'s last entry.
    /// Returns [`MatrixError::InvalidIndptr`] if `indptr` is not
    /// monotonically non-decreasing.
    /// Returns [`MatrixError::InvalidSparseIndices`] if a primary slice's
    /// indices are not strictly ascending or fall outside `[0,
    /// secondary_len)`.
    pub fn new(
        values: Vec<V>,
        indices: Vec<I>,
        indptr: Vec<usize>,
        nrow: usize,
        ncol: usize,
        order: StorageOrder,
        validate: Option<bool>,
    ) -> Result<Self> {
        if values.len() != indices.len() {
            return Err(MatrixError::ShapeMismatch(format!(
                "values has length {} but indices has length {}",
                values.len(),
                indices.len()
            )));
        }

        let primary_len = match order {
            StorageOrder::Csr => nrow,
            StorageOrder::Csc => ncol,
        };
        if indptr.len() != primary_len + 1 {
            return Err(MatrixError::ShapeMismatch(format!(
                "indptr has length {} but primary axis length is {primary_len}",
                indptr.len()
            )));
        }

        let matrix = Self {
            values,
            indices,
            indptr,
            nrow,
            ncol,
            order,
        };

        if validate.unwrap_or_else(|| global_config().validate_on_construction()) {
            matrix.validate()?;
        }

        Ok(matrix)
    }

    fn validate(&self) -> Result<()> {
        let secondary_len = self.secondary_len();
        if self.indptr.last().copied() != Some(self.values.len()) {
            return Err(MatrixError::InvalidIndptr(format!(
                "indptr's last entry {:?} does not match values length {}",
                self.indptr.last(),
                self.values.len()
            )));
        }
        for window in self.indptr.windows(2) {
            if window[1] < window[0] {
                return Err(MatrixError::InvalidIndptr(format!(
                    "indptr is not monotonically non-decreasing: {} followed by {}",
                    window[0], window[1]
                )));
            }
        }
        for p in 0..self.primary_len() {
            let slice = &self.indices[self.indptr[p]..self.indptr[p + 1]];
            let mut prev: Option<I> = None;
            for &idx in slice {
                if idx.to_usize().is_none_or(|v| v >= secondary_len) {
                    return Err(MatrixError::InvalidSparseIndices {
                        slice: p,
                        detail: format!("index {idx:?} out of bounds for axis length {secondary_len}"),
                    });
                }
                if let Some(prev) = prev {
                    if idx <= prev {
                        return Err(MatrixError::InvalidSparseIndices {
                            slice: p,
                            detail: "indices are not strictly ascending".to_string(),
                        });
                    }
                }
                prev = Some(idx);
            }
        }
        Ok(())
    }

    fn primary_len(&self) -> usize {
        self.indptr.len() - 1
    }

    fn secondary_len(&self) -> usize {
        match self.order {
            StorageOrder::Csr => self.ncol,
            StorageOrder::Csc => self.nrow,
        }
    }

    fn slice_range(&self, p: usize) -> (usize, usize) {
        (self.indptr[p], self.indptr[p + 1])
    }

    fn slice_values_indices(&self, p: usize) -> (&[V], &[I]) {
        let (a, b) = self.slice_range(p);
        (&self.values[a..b], &self.indices[a..b])
    }

    fn row_axis_is_primary(&self) -> bool {
        self.order == StorageOrder::Csr
    }
}

fn lower_bound<I: Index>(indices: &[I], target: I) -> usize {
    indices.partition_point(|&idx| idx < target)
}

/// Locate the sub-range of `slice_indices` whose values fall within
/// `selection`, returning `(local_start, local_end)` offsets into the
/// slice.
fn selection_bounds<I: Index>(slice_indices: &[I], selection: &Selection<I>) -> (usize, usize) {
    match selection {
        Selection::Full { .. } => (0, slice_indices.len()),
        Selection::Block { start, length } => {
            let start = I::from(*start).expect("selection start fits index type");
            let end = I::from(start.to_usize().unwrap() + length).expect("selection end fits index type");
            (lower_bound(slice_indices, start), lower_bound(slice_indices, end))
        }
        Selection::Indices(_) => (0, slice_indices.len()),
    }
}

struct PrimaryDenseExtractor<'a, V, I> {
    matrix: &'a CompressedSparseMatrix<V, I>,
    selection: Selection<I>,
    oracle: Option<OracleStream<I>>,
}

impl<V: Value, I: Index> DenseExtractor<V, I> for PrimaryDenseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        check_oracle(&mut self.oracle, i, self.matrix.primary_len())?;
        let (values, indices) = self.matrix.slice_values_indices(i);
        for slot in buffer.iter_mut() {
            *slot = V::zero();
        }
        match &self.selection {
            Selection::Full { .. } => {
                for (&value, &idx) in values.iter().zip(indices.iter()) {
                    buffer[idx.to_usize().expect("index fits usize")] = value;
                }
            }
            Selection::Block { start, .. } => {
                let (a, b) = selection_bounds(indices, &self.selection);
                for (&value, &idx) in values[a..b].iter().zip(indices[a..b].iter()) {
                    buffer[idx.to_usize().expect("index fits usize") - start] = value;
                }
            }
            Selection::Indices(sel) => {
                let mut scan = 0usize;
                for (pos, &target) in sel.iter().enumerate() {
                    while scan < indices.len() && indices[scan] < target {
                        scan += 1;
                    }
                    if scan < indices.len() && indices[scan] == target {
                        buffer[pos] = values[scan];
                    }
                }
            }
        }
        Ok(buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.oracle = Some(OracleStream::new(oracle));
    }
}

struct PrimarySparseExtractor<'a, V, I> {
    matrix: &'a CompressedSparseMatrix<V, I>,
    selection: Selection<I>,
    oracle: Option<OracleStream<I>>,
}

impl<V: Value, I: Index> SparseExtractor<V, I> for PrimarySparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        check_oracle(&mut self.oracle, i, self.matrix.primary_len())?;
        let (values, indices) = self.matrix.slice_values_indices(i);
        match &self.selection {
            Selection::Full { .. } => Ok(SparseRange::new(values, indices)),
            Selection::Block { start, .. } => {
                let (a, b) = selection_bounds(indices, &self.selection);
                let count = b - a;
                for (k, &idx) in indices[a..b].iter().enumerate() {
                    ibuf[k] = I::from(idx.to_usize().expect("index fits usize") - start)
                        .expect("shifted index fits index type");
                }
                vbuf[..count].copy_from_slice(&values[a..b]);
                Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
            }
            Selection::Indices(sel) => {
                let mut count = 0;
                let mut scan = 0usize;
                for (pos, &target) in sel.iter().enumerate() {
                    while scan < indices.len() && indices[scan] < target {
                        scan += 1;
                    }
                    if scan < indices.len() && indices[scan] == target {
                        vbuf[count] = values[scan];
                        ibuf[count] = I::from(pos).expect("position fits index type");
                        count += 1;
                    }
                }
                Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
            }
        }
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.oracle = Some(OracleStream::new(oracle));
    }
}

/// Advance, retreat or re-bisect each workspace offset for primary slices
/// `[first, last)` to point at the lower bound of secondary index `i`,
/// exploiting consecutive access per the documented invariant: since
/// indices within a slice are strictly ascending, the lower bound can move
/// by at most one position per unit step in `i`.
fn prime_workspace<V: Value, I: Index>(
    matrix: &CompressedSparseMatrix<V, I>,
    workspace: &mut SecondaryAxisWorkspace,
    first: usize,
    last: usize,
    i: usize,
) {
    workspace.prime(first, last);
    let step = workspace.step(i);
    let target = I::from(i).expect("secondary index fits index type");
    match step {
        WorkspaceStep::Same => {}
        WorkspaceStep::Advance => {
            let prev_target = I::from(i - 1).expect("secondary index fits index type");
            for (p, offset) in workspace.offsets_mut().iter_mut().enumerate() {
                let (_, indices) = matrix.slice_values_indices(first + p);
                if *offset < indices.len() && indices[*offset] == prev_target {
                    *offset += 1;
                }
            }
        }
        WorkspaceStep::Retreat => {
            for (p, offset) in workspace.offsets_mut().iter_mut().enumerate() {
                let (_, indices) = matrix.slice_values_indices(first + p);
                if *offset > 0 && indices[*offset - 1] >= target {
                    *offset -= 1;
                }
            }
        }
        WorkspaceStep::Jump => {
            for (p, offset) in workspace.offsets_mut().iter_mut().enumerate() {
                let (_, indices) = matrix.slice_values_indices(first + p);
                *offset = lower_bound(indices, target);
            }
        }
    }
    workspace.set_prev_i(i);
}

struct SecondaryDenseExtractor<'a, V, I> {
    matrix: &'a CompressedSparseMatrix<V, I>,
    selection: Selection<I>,
    workspace: SecondaryAxisWorkspace,
    oracle: Option<OracleStream<I>>,
}

/// The `[first, last)` range of primary-axis slices spanned by `selection`.
fn selection_primary_range<I: Index>(selection: &Selection<I>, axis_len: usize) -> (usize, usize) {
    match selection {
        Selection::Full { .. } => (0, axis_len),
        Selection::Block { start, length } => (*start, *start + *length),
        Selection::Indices(_) => (0, axis_len),
    }
}

impl<V: Value, I: Index> DenseExtractor<V, I> for SecondaryDenseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        let secondary_len = self.matrix.secondary_len();
        if i >= secondary_len {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: secondary_len,
            });
        }
        check_oracle(&mut self.oracle, i, secondary_len)?;
        for slot in buffer.iter_mut() {
            *slot = V::zero();
        }
        match &self.selection {
            Selection::Full { .. } | Selection::Block { .. } => {
                let (first, last) = selection_primary_range(&self.selection, self.matrix.primary_len());
                prime_workspace(self.matrix, &mut self.workspace, first, last, i);
                let target = I::from(i).expect("secondary index fits index type");
                for (p, &offset) in self.workspace.offsets().iter().enumerate() {
                    let (values, indices) = self.matrix.slice_values_indices(first + p);
                    if offset < indices.len() && indices[offset] == target {
                        buffer[p] = values[offset];
                    }
                }
            }
            Selection::Indices(sel) => {
                let target = I::from(i).expect("secondary index fits index type");
                for (pos, &p) in sel.iter().enumerate() {
                    let p = p.to_usize().expect("index fits usize");
                    let (values, indices) = self.matrix.slice_values_indices(p);
                    let offset = lower_bound(indices, target);
                    if offset < indices.len() && indices[offset] == target {
                        buffer[pos] = values[offset];
                    }
                }
            }
        }
        Ok(buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.oracle = Some(OracleStream::new(oracle));
    }
}

struct SecondarySparseExtractor<'a, V, I> {
    matrix: &'a CompressedSparseMatrix<V, I>,
    selection: Selection<I>,
    workspace: SecondaryAxisWorkspace,
    oracle: Option<OracleStream<I>>,
}

impl<V: Value, I: Index> SparseExtractor<V, I> for SecondarySparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        let secondary_len = self.matrix.secondary_len();
        if i >= secondary_len {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: secondary_len,
            });
        }
        check_oracle(&mut self.oracle, i, secondary_len)?;
        let mut count = 0;
        match &self.selection {
            Selection::Full { .. } | Selection::Block { .. } => {
                let (first, last) = selection_primary_range(&self.selection, self.matrix.primary_len());
                prime_workspace(self.matrix, &mut self.workspace, first, last, i);
                let target = I::from(i).expect("secondary index fits index type");
                for (p, &offset) in self.workspace.offsets().iter().enumerate() {
                    let (values, indices) = self.matrix.slice_values_indices(first + p);
                    if offset < indices.len() && indices[offset] == target {
                        vbuf[count] = values[offset];
                        ibuf[count] = I::from(p).expect("position fits index type");
                        count += 1;
                    }
                }
            }
            Selection::Indices(sel) => {
                let target = I::from(i).expect("secondary index fits index type");
                for (pos, &p) in sel.iter().enumerate() {
                    let pu = p.to_usize().expect("index fits usize");
                    let (values, indices) = self.matrix.slice_values_indices(pu);
                    let offset = lower_bound(indices, target);
                    if offset < indices.len() && indices[offset] == target {
                        vbuf[count] = values[offset];
                        ibuf[count] = I::from(pos).expect("position fits index type");
                        count += 1;
                    }
                }
            }
        }
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.oracle = Some(OracleStream::new(oracle));
    }
}

fn check_oracle<I: Index>(
    oracle: &mut Option<OracleStream<I>>,
    i: usize,
    axis_len: usize,
) -> Result<()> {
    if i >= axis_len {
        return Err(MatrixError::OutOfRange {
            index: i,
            axis_length: axis_len,
        });
    }
    if let Some(stream) = oracle.as_mut() {
        let predicted = stream
            .next()
            .map(|v| v.to_usize().expect("oracle index fits in usize"));
        if predicted != Some(i) {
            return Err(MatrixError::IncompatibleComposition(
                "fetch called out of order for a bound oracle".to_string(),
            ));
        }
    }
    Ok(())
}

impl<V: Value, I: Index> Matrix<V, I> for CompressedSparseMatrix<V, I> {
    fn nrow(&self) -> usize {
        self.nrow
    }

    fn ncol(&self) -> usize {
        self.ncol
    }

    fn sparse(&self) -> bool {
        true
    }

    fn prefer_rows(&self) -> bool {
        self.order == StorageOrder::Csr
    }

    fn uses_oracle(&self, _row: bool) -> bool {
        false
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.row_axis_is_primary() {
            Box::new(PrimaryDenseExtractor {
                matrix: self,
                selection,
                oracle: None,
            })
        } else {
            Box::new(SecondaryDenseExtractor {
                matrix: self,
                selection,
                workspace: SecondaryAxisWorkspace::new(),
                oracle: None,
            })
        }
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.row_axis_is_primary() {
            Box::new(SecondaryDenseExtractor {
                matrix: self,
                selection,
                workspace: SecondaryAxisWorkspace::new(),
                oracle: None,
            })
        } else {
            Box::new(PrimaryDenseExtractor {
                matrix: self,
                selection,
                oracle: None,
            })
        }
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.row_axis_is_primary() {
            Box::new(PrimarySparseExtractor {
                matrix: self,
                selection,
                oracle: None,
            })
        } else {
            Box::new(SecondarySparseExtractor {
                matrix: self,
                selection,
                workspace: SecondaryAxisWorkspace::new(),
                oracle: None,
            })
        }
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.row_axis_is_primary() {
            Box::new(SecondarySparseExtractor {
                matrix: self,
                selection,
                workspace: SecondaryAxisWorkspace::new(),
                oracle: None,
            })
        } else {
            Box::new(PrimarySparseExtractor {
                matrix: self,
                selection,
                oracle: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // CSR 3x3:
    // 1 0 2
    // 0 0 3
    // 4 5 0
    fn sample() -> CompressedSparseMatrix<f64, u32> {
        CompressedSparseMatrix::new(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![0, 2, 2, 0, 1],
            vec![0, 2, 3, 5],
            3,
            3,
            StorageOrder::Csr,
            Some(true),
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_ascending_indices() {
        let err = CompressedSparseMatrix::<f64, u32>::new(
            vec![1.0, 2.0],
            vec![2, 0],
            vec![0, 2],
            1,
            3,
            StorageOrder::Csr,
            Some(true),
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::InvalidSparseIndices { .. }));
    }

    #[test]
    fn rejects_out_of_bounds_index() {
        let err = CompressedSparseMatrix::<f64, u32>::new(
            vec![1.0],
            vec![5],
            vec![0, 1],
            1,
            3,
            StorageOrder::Csr,
            Some(true),
        )
        .unwrap_err();
        assert!(matches!(err, MatrixError::InvalidSparseIndices { .. }));
    }

    #[test]
    fn primary_axis_sparse_full_is_zero_copy() {
        let m = sample();
        let mut extractor = m.sparse_row(Selection::Full { length: 3 });
        let mut vbuf = [0.0; 3];
        let mut ibuf = [0u32; 3];
        let range = extractor.fetch(2, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[4.0, 5.0]);
        assert_eq!(range.indices(), &[0, 1]);
        assert!(!core::ptr::eq(range.values().as_ptr(), vbuf.as_ptr()));
    }

    #[test]
    fn primary_axis_dense_full() {
        let m = sample();
        let mut extractor = m.dense_row(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[1.0, 0.0, 2.0]);
    }

    #[test]
    fn secondary_axis_dense_matches_column() {
        let m = sample();
        let mut extractor = m.dense_column(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[1.0, 0.0, 4.0]);
        let out = extractor.fetch(1, &mut buffer).unwrap();
        assert_eq!(out, &[0.0, 0.0, 5.0]);
        let out = extractor.fetch(2, &mut buffer).unwrap();
        assert_eq!(out, &[2.0, 3.0, 0.0]);
    }

    #[test]
    fn secondary_axis_sparse_matches_column() {
        let m = sample();
        let mut extractor = m.sparse_column(Selection::Full { length: 3 });
        let mut vbuf = [0.0; 3];
        let mut ibuf = [0u32; 3];
        let range = extractor.fetch(2, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[2.0, 3.0]);
        assert_eq!(range.indices(), &[0, 1]);
    }

    #[test]
    fn secondary_axis_handles_out_of_order_access() {
        let m = sample();
        let mut extractor = m.dense_column(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        // jump around: 2, 0, 1, 0 -- exercises jump / advance / retreat paths
        assert_eq!(extractor.fetch(2, &mut buffer).unwrap(), &[2.0, 3.0, 0.0]);
        assert_eq!(extractor.fetch(0, &mut buffer).unwrap(), &[1.0, 0.0, 4.0]);
        assert_eq!(extractor.fetch(1, &mut buffer).unwrap(), &[0.0, 0.0, 5.0]);
        assert_eq!(extractor.fetch(0, &mut buffer).unwrap(), &[1.0, 0.0, 4.0]);
    }

    #[test]
    fn block_selection_shifts_indices() {
        let m = sample();
        let mut extractor = m.sparse_row(Selection::Block {
            start: 1,
            length: 2,
        });
        let mut vbuf = [0.0; 2];
        let mut ibuf = [0u32; 2];
        let range = extractor.fetch(2, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[5.0]);
        assert_eq!(range.indices(), &[0]);
    }
}
