//! Axis concatenation of an ordered list of matrices of matching shape on
//! the non-bound axis.

use std::marker::PhantomData;
use std::sync::Arc;

use num::NumCast;

use crate::error::{MatrixError, Result};
use crate::matrix::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};
use crate::oracle::Oracle;
use crate::sparse_range::SparseRange;

/// Binds an ordered list of matrices of matching shape on the non-bound
/// axis into one logical matrix, concatenated along `axis_rows`.
///
/// `fetch(i, ...)` locates the child whose cumulative extent along the
/// bound axis contains `i`, and forwards with a local index. For sparse
/// output when binding along the secondary axis, reported indices are
/// shifted by that child's cumulative offset. `prefer_rows` is decided by a
/// fractional majority vote across children, weighted by each child's
/// contribution along the bound axis.
pub struct DelayedBind<V, I, M> {
    children: Vec<Arc<M>>,
    cumulative: Vec<usize>,
    axis_rows: bool,
    _marker: PhantomData<fn() -> (V, I)>,
}

impl<V: Value, I: Index, M: Matrix<V, I>> DelayedBind<V, I, M> {
    /// Bind `children` along `axis_rows` (true: stack rows; false: stack
    /// columns).
    ///
    /// # Errors
    /// Returns [`MatrixError::IncompatibleComposition`] if `children` is
    /// empty or their non-bound-axis extents disagree.
    pub fn new(children: Vec<Arc<M>>, axis_rows: bool) -> Result<Self> {
        if children.is_empty() {
            return Err(MatrixError::IncompatibleComposition(
                "bind requires at least one child matrix".to_string(),
            ));
        }
        let other_extent = |m: &M| if axis_rows { m.ncol() } else { m.nrow() };
        let expected = other_extent(&children[0]);
        for child in &children {
            if other_extent(child) != expected {
                return Err(MatrixError::IncompatibleComposition(format!(
                    "bind children disagree on non-bound axis extent: expected {expected}, found {}",
                    other_extent(child)
                )));
            }
        }
        let mut cumulative = Vec::with_capacity(children.len() + 1);
        cumulative.push(0);
        for child in &children {
            let extent = if axis_rows { child.nrow() } else { child.ncol() };
            cumulative.push(cumulative.last().unwrap() + extent);
        }
        Ok(Self {
            children,
            cumulative,
            axis_rows,
            _marker: PhantomData,
        })
    }

    fn bound_len(&self) -> usize {
        *self.cumulative.last().unwrap()
    }

    /// The index of the child containing bound-axis position `i`, and `i`'s
    /// local position within that child.
    fn locate(&self, i: usize) -> (usize, usize) {
        let child = self
            .cumulative
            .partition_point(|&cum| cum <= i)
            .saturating_sub(1);
        (child, i - self.cumulative[child])
    }

    fn other_extent(&self) -> usize {
        if self.axis_rows {
            self.children[0].ncol()
        } else {
            self.children[0].nrow()
        }
    }
}

struct BoundAxisDenseExtractor<'a, V, I, M> {
    children: &'a [Arc<M>],
    cumulative: &'a [usize],
    selection: Selection<I>,
    row_axis: bool,
    cached: Option<(usize, Box<dyn DenseExtractor<V, I> + 'a>)>,
}

/// Selected children are built lazily per-access (rather than eagerly, as
/// in [`crate::delayed::subset`]'s gather): a bind extractor typically
/// walks one child at a time in order, so caching the most recently used
/// child extractor avoids rebuilding on every call without paying for
/// `children.len()` extractors up front.
impl<'a, V: Value, I: Index, M: Matrix<V, I>> BoundAxisDenseExtractor<'a, V, I, M> {
    fn extractor_for(&mut self, child_idx: usize) -> &mut Box<dyn DenseExtractor<V, I> + 'a> {
        if self.cached.as_ref().map(|(idx, _)| *idx) != Some(child_idx) {
            let child = &self.children[child_idx];
            let extractor = if self.row_axis {
                child.dense_row(self.selection.clone())
            } else {
                child.dense_column(self.selection.clone())
            };
            self.cached = Some((child_idx, extractor));
        }
        &mut self.cached.as_mut().unwrap().1
    }
}

impl<V: Value, I: Index, M: Matrix<V, I>> DenseExtractor<V, I> for BoundAxisDenseExtractor<'_, V, I, M> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        let child_idx = self
            .cumulative
            .partition_point(|&cum| cum <= i)
            .saturating_sub(1);
        let local = i - self.cumulative[child_idx];
        self.extractor_for(child_idx).fetch(local, buffer)
    }

    fn set_oracle(&mut self, _oracle: Arc<dyn Oracle<I>>) {
        // bound-axis extraction crosses child boundaries; oracles over the
        // bound axis are not forwarded to a single child.
    }
}

struct BoundAxisSparseExtractor<'a, V, I, M> {
    children: &'a [Arc<M>],
    cumulative: &'a [usize],
    selection: Selection<I>,
    row_axis: bool,
    cached: Option<(usize, Box<dyn SparseExtractor<V, I> + 'a>)>,
}

impl<'a, V: Value, I: Index, M: Matrix<V, I>> BoundAxisSparseExtractor<'a, V, I, M> {
    fn extractor_for(&mut self, child_idx: usize) -> &mut Box<dyn SparseExtractor<V, I> + 'a> {
        if self.cached.as_ref().map(|(idx, _)| *idx) != Some(child_idx) {
            let child = &self.children[child_idx];
            let extractor = if self.row_axis {
                child.sparse_row(self.selection.clone())
            } else {
                child.sparse_column(self.selection.clone())
            };
            self.cached = Some((child_idx, extractor));
        }
        &mut self.cached.as_mut().unwrap().1
    }
}

impl<V: Value, I: Index, M: Matrix<V, I>> SparseExtractor<V, I> for BoundAxisSparseExtractor<'_, V, I, M> {
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        let child_idx = self
            .cumulative
            .partition_point(|&cum| cum <= i)
            .saturating_sub(1);
        let local = i - self.cumulative[child_idx];
        self.extractor_for(child_idx).fetch(local, vbuf, ibuf)
    }

    fn set_oracle(&mut self, _oracle: Arc<dyn Oracle<I>>) {}
}

/// Extraction along the non-bound axis: for each `i` (a position on the
/// non-bound axis, shared by every child), gather one sub-fetch per child
/// and concatenate, shifting sparse indices by the child's cumulative
/// bound-axis offset.
struct OtherAxisDenseExtractor<'a, V, I> {
    extractors: Vec<(usize, usize, Box<dyn DenseExtractor<V, I> + 'a>)>,
}

impl<V: Value, I: Index> DenseExtractor<V, I> for OtherAxisDenseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.extractors
            .iter()
            .map(|(_, len, _)| *len)
            .sum()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        for (offset, len, extractor) in &mut self.extractors {
            let target = &mut buffer[*offset..*offset + *len];
            let target_ptr = target.as_ptr();
            let fetched = extractor.fetch(i, target)?;
            if !core::ptr::eq(fetched.as_ptr(), target_ptr) {
                target.copy_from_slice(fetched);
            }
        }
        Ok(buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        for (_, _, extractor) in &mut self.extractors {
            extractor.set_oracle(oracle.clone());
        }
    }
}

struct OtherAxisSparseExtractor<'a, V, I> {
    extractors: Vec<(usize, usize, Box<dyn SparseExtractor<V, I> + 'a>)>,
    run_vbuf: Vec<V>,
    run_ibuf: Vec<I>,
}

impl<V: Value, I: Index> SparseExtractor<V, I> for OtherAxisSparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.extractors.iter().map(|(_, len, _)| *len).sum()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        let mut count = 0;
        for (offset, len, extractor) in &mut self.extractors {
            let range = extractor.fetch(i, &mut self.run_vbuf[..*len], &mut self.run_ibuf[..*len])?;
            let (values, indices) = range.into_parts();
            let shift = I::from(*offset).expect("bind offset fits index type");
            for (&value, &idx) in values.iter().zip(indices.iter()) {
                vbuf[count] = value;
                ibuf[count] = idx + shift;
                count += 1;
            }
        }
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, _oracle: Arc<dyn Oracle<I>>) {}
}

impl<V: Value, I: Index, M: Matrix<V, I> + 'static> Matrix<V, I> for DelayedBind<V, I, M> {
    fn nrow(&self) -> usize {
        if self.axis_rows {
            self.bound_len()
        } else {
            self.other_extent()
        }
    }

    fn ncol(&self) -> usize {
        if self.axis_rows {
            self.other_extent()
        } else {
            self.bound_len()
        }
    }

    fn sparse(&self) -> bool {
        self.children.iter().all(|c| c.sparse())
    }

    fn prefer_rows(&self) -> bool {
        let bound_extent = self.bound_len() as f64;
        let row_vote: f64 = self
            .children
            .iter()
            .zip(self.cumulative.windows(2))
            .map(|(child, window)| {
                let weight = (window[1] - window[0]) as f64;
                if child.prefer_rows() {
                    weight
                } else {
                    0.0
                }
            })
            .sum();
        row_vote / bound_extent >= 0.5
    }

    fn uses_oracle(&self, row: bool) -> bool {
        self.children.iter().any(|c| c.uses_oracle(row))
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.axis_rows {
            Box::new(BoundAxisDenseExtractor {
                children: &self.children,
                cumulative: &self.cumulative,
                selection,
                row_axis: true,
                cached: None,
            })
        } else {
            let extractors = self
                .children
                .iter()
                .zip(self.cumulative.windows(2))
                .map(|(child, window)| {
                    (window[0], window[1] - window[0], child.dense_row(selection.clone()))
                })
                .collect::<Vec<_>>();
            Box::new(OtherAxisDenseExtractor { extractors })
        }
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.axis_rows {
            let extractors = self
                .children
                .iter()
                .zip(self.cumulative.windows(2))
                .map(|(child, window)| {
                    (window[0], window[1] - window[0], child.dense_column(selection.clone()))
                })
                .collect::<Vec<_>>();
            Box::new(OtherAxisDenseExtractor { extractors })
        } else {
            Box::new(BoundAxisDenseExtractor {
                children: &self.children,
                cumulative: &self.cumulative,
                selection,
                row_axis: false,
                cached: None,
            })
        }
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.axis_rows {
            Box::new(BoundAxisSparseExtractor {
                children: &self.children,
                cumulative: &self.cumulative,
                selection,
                row_axis: true,
                cached: None,
            })
        } else {
            let extractors = self
                .children
                .iter()
                .zip(self.cumulative.windows(2))
                .map(|(child, window)| {
                    (window[0], window[1] - window[0], child.sparse_row(selection.clone()))
                })
                .collect::<Vec<_>>();
            let max_run = extractors.iter().map(|(_, len, _)| *len).max().unwrap_or(0);
            Box::new(OtherAxisSparseExtractor {
                extractors,
                run_vbuf: vec![V::zero(); max_run],
                run_ibuf: vec![I::zero(); max_run],
            })
        }
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.axis_rows {
            let extractors = self
                .children
                .iter()
                .zip(self.cumulative.windows(2))
                .map(|(child, window)| {
                    (window[0], window[1] - window[0], child.sparse_column(selection.clone()))
                })
                .collect::<Vec<_>>();
            let max_run = extractors.iter().map(|(_, len, _)| *len).max().unwrap_or(0);
            Box::new(OtherAxisSparseExtractor {
                extractors,
                run_vbuf: vec![V::zero(); max_run],
                run_ibuf: vec![I::zero(); max_run],
            })
        } else {
            Box::new(BoundAxisSparseExtractor {
                children: &self.children,
                cumulative: &self.cumulative,
                selection,
                row_axis: false,
                cached: None,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::{DenseMatrix, StorageOrder};

    fn child(values: Vec<f64>, nrow: usize, ncol: usize) -> Arc<DenseMatrix<f64>> {
        Arc::new(DenseMatrix::new(values, nrow, ncol, StorageOrder::RowMajor).unwrap())
    }

    #[test]
    fn bind_rejects_mismatched_shapes() {
        let a = child(vec![1.0, 2.0], 1, 2);
        let b = child(vec![1.0, 2.0, 3.0], 1, 3);
        let err = DelayedBind::new(vec![a, b], true).unwrap_err();
        assert!(matches!(err, MatrixError::IncompatibleComposition(_)));
    }

    #[test]
    fn bind_rows_reports_combined_shape() {
        let a = child(vec![1.0, 2.0], 1, 2);
        let b = child(vec![3.0, 4.0], 1, 2);
        let bound = DelayedBind::new(vec![a, b], true).unwrap();
        assert_eq!(bound.nrow(), 2);
        assert_eq!(bound.ncol(), 2);
    }

    #[test]
    fn bind_rows_bound_axis_forwards_to_owning_child() {
        let a = child(vec![1.0, 2.0], 1, 2);
        let b = child(vec![3.0, 4.0], 1, 2);
        let bound = DelayedBind::new(vec![a, b], true).unwrap();
        let mut extractor = bound.dense_row(Selection::Full { length: 2 });
        let mut buffer = [0.0; 2];
        assert_eq!(extractor.fetch(0, &mut buffer).unwrap(), &[1.0, 2.0]);
        assert_eq!(extractor.fetch(1, &mut buffer).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn bind_rows_other_axis_gathers_every_child() {
        let a = child(vec![1.0, 2.0], 1, 2);
        let b = child(vec![3.0, 4.0], 1, 2);
        let bound = DelayedBind::new(vec![a, b], true).unwrap();
        let mut extractor = bound.dense_column(Selection::Full { length: 2 });
        let mut buffer = [0.0; 2];
        assert_eq!(extractor.fetch(0, &mut buffer).unwrap(), &[1.0, 3.0]);
        assert_eq!(extractor.fetch(1, &mut buffer).unwrap(), &[2.0, 4.0]);
    }

    #[test]
    fn bind_columns_shifts_sparse_indices_by_cumulative_offset() {
        use crate::matrix::sparse::{CompressedSparseMatrix, StorageOrder as SparseOrder};
        let a = Arc::new(
            CompressedSparseMatrix::<f64, u32>::new(
                vec![10.0],
                vec![0],
                vec![0, 1],
                1,
                2,
                SparseOrder::Csr,
                Some(true),
            )
            .unwrap(),
        );
        let b = Arc::new(
            CompressedSparseMatrix::<f64, u32>::new(
                vec![20.0],
                vec![1],
                vec![0, 1],
                1,
                3,
                SparseOrder::Csr,
                Some(true),
            )
            .unwrap(),
        );
        let bound = DelayedBind::new(vec![a, b], false).unwrap();
        assert_eq!(bound.ncol(), 5);
        let mut extractor = bound.sparse_row(Selection::Full { length: 5 });
        let mut vbuf = [0.0; 5];
        let mut ibuf = [0u32; 5];
        let range = extractor.fetch(0, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[10.0, 20.0]);
        assert_eq!(range.indices(), &[0, 3]);
    }

    #[test]
    fn bind_singleton_is_identity() {
        let a = child(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let bound = DelayedBind::new(vec![a.clone()], true).unwrap();
        assert_eq!(bound.nrow(), a.nrow());
        assert_eq!(bound.ncol(), a.ncol());
        let mut extractor = bound.dense_row(Selection::Full { length: 2 });
        let mut buffer = [0.0; 2];
        assert_eq!(extractor.fetch(1, &mut buffer).unwrap(), &[3.0, 4.0]);
    }
}
