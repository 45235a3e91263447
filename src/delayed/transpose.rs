//! Axis swap: row extraction of the transpose is column extraction of the
//! child, and vice versa.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::matrix::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};

/// Wraps a child matrix with its axes swapped. `row` of the transpose calls
/// `column` of the child and vice versa; `prefer_rows` is negated. Sparse
/// index ordering needs no adjustment: the child's indices on the
/// now-swapped axis are already ascending.
pub struct DelayedTranspose<V, I, M> {
    child: Arc<M>,
    _marker: PhantomData<fn() -> (V, I)>,
}

impl<V: Value, I: Index, M: Matrix<V, I>> DelayedTranspose<V, I, M> {
    /// Wrap `child` with its rows and columns swapped.
    #[must_use]
    pub fn new(child: Arc<M>) -> Self {
        Self {
            child,
            _marker: PhantomData,
        }
    }
}

impl<V: Value, I: Index, M: Matrix<V, I>> Matrix<V, I> for DelayedTranspose<V, I, M> {
    fn nrow(&self) -> usize {
        self.child.ncol()
    }

    fn ncol(&self) -> usize {
        self.child.nrow()
    }

    fn sparse(&self) -> bool {
        self.child.sparse()
    }

    fn prefer_rows(&self) -> bool {
        !self.child.prefer_rows()
    }

    fn uses_oracle(&self, row: bool) -> bool {
        self.child.uses_oracle(!row)
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        self.child.dense_column(selection)
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        self.child.dense_row(selection)
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        self.child.sparse_column(selection)
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        self.child.sparse_row(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::{DenseMatrix, StorageOrder};
    use crate::matrix::sparse::{CompressedSparseMatrix, StorageOrder as SparseOrder};

    #[test]
    fn transpose_swaps_shape_and_preferred_axis() {
        let child = Arc::new(
            DenseMatrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, StorageOrder::RowMajor)
                .unwrap(),
        );
        let transposed = DelayedTranspose::new(child);
        assert_eq!(transposed.nrow(), 3);
        assert_eq!(transposed.ncol(), 2);
        assert!(!transposed.prefer_rows());
    }

    #[test]
    fn transpose_row_matches_child_column() {
        // child (row-major): [1 2 3; 4 5 6]
        let child = Arc::new(
            DenseMatrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, StorageOrder::RowMajor)
                .unwrap(),
        );
        let transposed = DelayedTranspose::new(child);
        let mut extractor = transposed.dense_row::<u32>(Selection::Full { length: 2 });
        let mut buffer = [0.0; 2];
        // transpose row 2 == child column 2 == [3, 6]
        let out = extractor.fetch(2, &mut buffer).unwrap();
        assert_eq!(out, &[3.0, 6.0]);
    }

    #[test]
    fn double_transpose_is_identity() {
        let child = Arc::new(
            DenseMatrix::new(vec![1.0, 2.0, 3.0, 4.0], 2, 2, StorageOrder::RowMajor).unwrap(),
        );
        let once = Arc::new(DelayedTranspose::new(child.clone()));
        let twice = DelayedTranspose::new(once);
        assert_eq!(twice.nrow(), child.nrow());
        assert_eq!(twice.ncol(), child.ncol());
        let mut extractor = twice.dense_row::<u32>(Selection::Full { length: 2 });
        let mut buffer = [0.0; 2];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[1.0, 2.0]);
    }

    #[test]
    fn transpose_preserves_sparse_index_ordering() {
        let child = Arc::new(
            CompressedSparseMatrix::<f64, u32>::new(
                vec![10.0, 20.0, 30.0],
                vec![0, 1, 3],
                vec![0, 2, 3],
                2,
                4,
                SparseOrder::Csr,
                Some(true),
            )
            .unwrap(),
        );
        let transposed = DelayedTranspose::new(child);
        assert_eq!(transposed.nrow(), 4);
        assert_eq!(transposed.ncol(), 2);
        // transpose column 0 == child row 0 == {10.0 @ 0, 20.0 @ 1}
        let mut extractor = transposed.sparse_column(Selection::Full { length: 2 });
        let mut vbuf = [0.0; 2];
        let mut ibuf = [0u32; 2];
        let range = extractor.fetch(0, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[10.0, 20.0]);
        assert_eq!(range.indices(), &[0, 1]);
    }
}
