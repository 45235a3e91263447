//! Row-major or column-major dense matrices.

use std::sync::Arc;

use num::{NumCast, ToPrimitive};

use crate::error::{MatrixError, Result};
use crate::oracle::{Oracle, OracleStream};
use crate::sparse_range::SparseRange;

use super::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};

/// The storage order of a [`DenseMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOrder {
    /// Rows are stored contiguously: `data[r * ncol + c]`.
    RowMajor,
    /// Columns are stored contiguously: `data[c * nrow + r]`.
    ColumnMajor,
}

/// A dense matrix backed by a single contiguous buffer in row-major or
/// column-major order.
///
/// `prefer_rows` equals the storage order: primary-axis extraction (along
/// storage order) returns a pointer directly into storage; secondary-axis
/// extraction copies with stride. Sparse extractors walk the dense vector
/// and emit non-zero entries; no explicit-zero suppression is performed.
#[derive(Debug, Clone)]
pub struct DenseMatrix<V> {
    data: Vec<V>,
    nrow: usize,
    ncol: usize,
    order: StorageOrder,
}

impl<V: Value> DenseMatrix<V> {
    /// Create a new dense matrix from `data` in the given storage `order`.
    ///
    /// # Errors
    /// Returns [`MatrixError::ShapeMismatch`] if `data.len() != nrow * ncol`.
    pub fn new(data: Vec<V>, nrow: usize, ncol: usize, order: StorageOrder) -> Result<Self> {
        if data.len() != nrow * ncol {
            return Err(MatrixError::ShapeMismatch(format!(
                "dense matrix data has length {} but nrow * ncol = {}",
                data.len(),
                nrow * ncol
            )));
        }
        Ok(Self {
            data,
            nrow,
            ncol,
            order,
        })
    }

    /// The primary-axis (storage-order) length: `ncol` if row-major, `nrow`
    /// if column-major.
    fn primary_len(&self) -> usize {
        match self.order {
            StorageOrder::RowMajor => self.ncol,
            StorageOrder::ColumnMajor => self.nrow,
        }
    }

    /// Borrow the full primary-axis slice at position `p`: the contiguous
    /// run of `primary_len()` values for storage-order index `p`.
    fn primary_slice(&self, p: usize) -> &[V] {
        let len = self.primary_len();
        &self.data[p * len..(p + 1) * len]
    }

    fn storage_matches(&self, row_axis: bool) -> bool {
        matches!(
            (self.order, row_axis),
            (StorageOrder::RowMajor, true) | (StorageOrder::ColumnMajor, false)
        )
    }

    /// Copy this matrix into a row-major [`ndarray::Array2`].
    #[cfg(feature = "ndarray")]
    #[must_use]
    pub fn to_ndarray(&self) -> ndarray::Array2<V> {
        let mut out = ndarray::Array2::<V>::zeros((self.nrow, self.ncol));
        for r in 0..self.nrow {
            for c in 0..self.ncol {
                let value = match self.order {
                    StorageOrder::RowMajor => self.data[r * self.ncol + c],
                    StorageOrder::ColumnMajor => self.data[c * self.nrow + r],
                };
                out[[r, c]] = value;
            }
        }
        out
    }
}

/// Selects a secondary-axis sub-range out of a fetched primary slice,
/// either returning a zero-copy sub-slice (for `Full`/`Block`) or gathering
/// into the caller's buffer (for `Indices`).
fn select_from_slice<'b, V: Value, I: Index>(
    slice: &'b [V],
    selection: &Selection<I>,
    buffer: &'b mut [V],
) -> &'b [V] {
    match selection {
        Selection::Full { .. } => slice,
        Selection::Block { start, length } => &slice[*start..*start + *length],
        Selection::Indices(indices) => {
            for (out, idx) in buffer.iter_mut().zip(indices.iter()) {
                *out = slice[idx.to_usize().expect("index fits in usize")];
            }
            buffer
        }
    }
}

struct DenseAxisExtractor<'a, V, I> {
    matrix: &'a DenseMatrix<V>,
    selection: Selection<I>,
    row_axis: bool,
    oracle: Option<OracleStream<I>>,
}

impl<V: Value, I: Index> DenseExtractor<V, I> for DenseAxisExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        let axis_len = if self.row_axis {
            self.matrix.nrow
        } else {
            self.matrix.ncol
        };
        if i >= axis_len {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: axis_len,
            });
        }
        if let Some(stream) = self.oracle.as_mut() {
            let predicted = stream
                .next()
                .map(|v| v.to_usize().expect("oracle index fits in usize"));
            if predicted != Some(i) {
                return Err(MatrixError::IncompatibleComposition(
                    "fetch called out of order for a bound oracle".to_string(),
                ));
            }
        }

        if self.matrix.storage_matches(self.row_axis) {
            let slice = self.matrix.primary_slice(i);
            Ok(select_from_slice(slice, &self.selection, buffer))
        } else {
            match &self.selection {
                Selection::Full { .. } => {
                    for (p, out) in buffer.iter_mut().enumerate() {
                        *out = self.matrix.primary_slice(p)[i];
                    }
                    Ok(buffer)
                }
                Selection::Block { start, length } => {
                    for (k, out) in buffer.iter_mut().enumerate().take(*length) {
                        *out = self.matrix.primary_slice(start + k)[i];
                    }
                    Ok(buffer)
                }
                Selection::Indices(indices) => {
                    for (out, p) in buffer.iter_mut().zip(indices.iter()) {
                        let p = p.to_usize().expect("index fits in usize");
                        *out = self.matrix.primary_slice(p)[i];
                    }
                    Ok(buffer)
                }
            }
        }
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.oracle = Some(OracleStream::new(oracle));
    }
}

struct DenseToSparseExtractor<'a, V, I> {
    inner: DenseAxisExtractor<'a, V, I>,
}

impl<V: Value, I: Index> SparseExtractor<V, I> for DenseToSparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        let dense = self.inner.fetch(i, vbuf)?;
        // dense may alias vbuf, so collect the non-zero values before
        // overwriting vbuf/ibuf in place.
        let nonzero: Vec<(usize, V)> = dense
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_zero())
            .map(|(pos, value)| (pos, *value))
            .collect();
        let count = nonzero.len();
        for (k, (pos, value)) in nonzero.into_iter().enumerate() {
            vbuf[k] = value;
            ibuf[k] = I::from(pos).expect("position fits index type");
        }
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

impl<V: Value, I: Index> Matrix<V, I> for DenseMatrix<V> {
    fn nrow(&self) -> usize {
        self.nrow
    }

    fn ncol(&self) -> usize {
        self.ncol
    }

    fn sparse(&self) -> bool {
        false
    }

    fn prefer_rows(&self) -> bool {
        self.order == StorageOrder::RowMajor
    }

    fn uses_oracle(&self, _row: bool) -> bool {
        false
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        Box::new(DenseAxisExtractor {
            matrix: self,
            selection,
            row_axis: true,
            oracle: None,
        })
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        Box::new(DenseAxisExtractor {
            matrix: self,
            selection,
            row_axis: false,
            oracle: None,
        })
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        Box::new(DenseToSparseExtractor {
            inner: DenseAxisExtractor {
                matrix: self,
                selection,
                row_axis: true,
                oracle: None,
            },
        })
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        Box::new(DenseToSparseExtractor {
            inner: DenseAxisExtractor {
                matrix: self,
                selection,
                row_axis: false,
                oracle: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DenseMatrix<f64> {
        // 2 x 3, row-major:
        // 1 2 3
        // 4 5 6
        DenseMatrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, StorageOrder::RowMajor).unwrap()
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = DenseMatrix::new(vec![1.0, 2.0], 2, 2, StorageOrder::RowMajor).unwrap_err();
        assert!(matches!(err, MatrixError::ShapeMismatch(_)));
    }

    #[test]
    fn primary_axis_fetch_is_zero_copy() {
        let m = sample();
        let mut extractor = m.dense_row::<u32>(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        let out = extractor.fetch(1, &mut buffer).unwrap();
        assert_eq!(out, &[4.0, 5.0, 6.0]);
        assert!(!core::ptr::eq(out.as_ptr(), buffer.as_ptr()));
    }

    #[test]
    fn secondary_axis_fetch_copies_with_stride() {
        let m = sample();
        let mut extractor = m.dense_column::<u32>(Selection::Full { length: 2 });
        let mut buffer = [0.0; 2];
        let out = extractor.fetch(2, &mut buffer).unwrap();
        assert_eq!(out, &[3.0, 6.0]);
    }

    #[test]
    fn block_selection_on_primary_axis() {
        let m = sample();
        let mut extractor = m.dense_row::<u32>(Selection::Block {
            start: 1,
            length: 2,
        });
        let mut buffer = [0.0; 2];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[2.0, 3.0]);
    }

    #[test]
    fn out_of_range_row_errors() {
        let m = sample();
        let mut extractor = m.dense_row::<u32>(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        let err = extractor.fetch(5, &mut buffer).unwrap_err();
        assert!(matches!(err, MatrixError::OutOfRange { .. }));
    }

    #[test]
    fn sparse_extraction_skips_zeros() {
        let m = DenseMatrix::new(
            vec![0.0, 2.0, 0.0, 4.0, 0.0, 6.0],
            2,
            3,
            StorageOrder::RowMajor,
        )
        .unwrap();
        let mut extractor = m.sparse_row::<u32>(Selection::Full { length: 3 });
        let mut vbuf = [0.0; 3];
        let mut ibuf = [0u32; 3];
        let range = extractor.fetch(0, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[2.0]);
        assert_eq!(range.indices(), &[1]);
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn to_ndarray_matches_row_major_extraction() {
        let m = sample();
        let array = m.to_ndarray();
        assert_eq!(array.shape(), &[2, 3]);
        let mut extractor = m.dense_row::<u32>(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        for r in 0..2 {
            let row = extractor.fetch(r, &mut buffer).unwrap();
            assert_eq!(array.row(r).to_vec(), row.to_vec());
        }
    }
}
