//! The single generic traversal primitive (§4.N) used to drive row/column
//! reductions. Concrete statistics (sums, medians, variances) are built on
//! top of [`apply`] but are themselves out of scope for this crate.

use crate::error::{MatrixError, Result};
use crate::matrix::{Index, Matrix, Selection, Value};
use crate::sparse_range::SparseRange;

/// The axis a traversal reduces over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Margin {
    /// Reduce to one result per row.
    Row,
    /// Reduce to one result per column.
    Col,
}

/// A reduction over one [`Margin`] of a [`Matrix`], driven by [`apply`].
///
/// A reducer advertises which of four traversal strategies it supports via
/// the `SUPPORTS_*` associated constants; [`apply`] picks the cheapest one
/// the matrix and the reducer agree on. Unsupported methods are never
/// called — their default bodies exist only to let an implementation skip
/// methods it doesn't support without boilerplate.
pub trait Reducer<V, I> {
    /// The finished statistic (or vector of per-`Margin`-position statistics).
    type Output;

    /// Whether [`dense_direct`](Self::dense_direct) is implemented.
    const SUPPORTS_DENSE_DIRECT: bool = false;
    /// Whether [`sparse_direct`](Self::sparse_direct) is implemented.
    const SUPPORTS_SPARSE_DIRECT: bool = false;
    /// Whether [`dense_running`](Self::dense_running) is implemented.
    const SUPPORTS_DENSE_RUNNING: bool = false;
    /// Whether [`sparse_running`](Self::sparse_running) is implemented.
    const SUPPORTS_SPARSE_RUNNING: bool = false;

    /// Consume the full dense vector at `Margin` position `i`.
    ///
    /// # Panics
    /// May panic if `SUPPORTS_DENSE_DIRECT` is `false`; [`apply`] never
    /// calls this method in that case.
    fn dense_direct(&mut self, i: usize, values: &[V]) {
        let _ = (i, values);
        unreachable!("dense_direct called but SUPPORTS_DENSE_DIRECT is false")
    }

    /// Consume the non-zero entries at `Margin` position `i`.
    ///
    /// # Panics
    /// May panic if `SUPPORTS_SPARSE_DIRECT` is `false`; [`apply`] never
    /// calls this method in that case.
    fn sparse_direct(&mut self, i: usize, range: SparseRange<'_, V, I>) {
        let _ = (i, range);
        unreachable!("sparse_direct called but SUPPORTS_SPARSE_DIRECT is false")
    }

    /// Fold one slice of the other axis, spanning every `Margin` position,
    /// into the reducer's running state.
    ///
    /// # Panics
    /// May panic if `SUPPORTS_DENSE_RUNNING` is `false`; [`apply`] never
    /// calls this method in that case.
    fn dense_running(&mut self, values: &[V]) {
        let _ = values;
        unreachable!("dense_running called but SUPPORTS_DENSE_RUNNING is false")
    }

    /// Fold one sparse slice of the other axis, spanning every `Margin`
    /// position, into the reducer's running state.
    ///
    /// # Panics
    /// May panic if `SUPPORTS_SPARSE_RUNNING` is `false`; [`apply`] never
    /// calls this method in that case.
    fn sparse_running(&mut self, range: SparseRange<'_, V, I>) {
        let _ = range;
        unreachable!("sparse_running called but SUPPORTS_SPARSE_RUNNING is false")
    }

    /// Finalise accumulated state into the reducer's result.
    fn finalize(self) -> Self::Output;
}

/// Drive `reducer` over `matrix` along `margin`, choosing the traversal
/// strategy per spec §4.N:
///
/// 1. If the matrix's preferred axis matches `margin` and a direct strategy
///    is available, iterate across `margin` calling it per vector.
/// 2. Else if a running strategy is available, iterate the other axis
///    instead, folding each slice into the reducer's own running state.
/// 3. Else fall back to the direct strategy across the mismatched axis
///    (slower: each `fetch` now crosses the matrix's preferred storage
///    order).
///
/// # Errors
/// Returns [`MatrixError::IncompatibleComposition`] if `reducer` advertises
/// no capability at all. Otherwise propagates any error from the
/// underlying extraction.
pub fn apply<V, I, M, R>(matrix: &M, margin: Margin, mut reducer: R) -> Result<R::Output>
where
    V: Value,
    I: Index,
    M: Matrix<V, I> + ?Sized,
    R: Reducer<V, I>,
{
    let margin_is_rows = margin == Margin::Row;
    let has_direct = R::SUPPORTS_DENSE_DIRECT || R::SUPPORTS_SPARSE_DIRECT;
    let has_running = R::SUPPORTS_DENSE_RUNNING || R::SUPPORTS_SPARSE_RUNNING;

    if !has_direct && !has_running {
        return Err(MatrixError::IncompatibleComposition(
            "reducer advertises no dense/sparse direct or running capability".to_string(),
        ));
    }

    if margin_is_rows == matrix.prefer_rows() && has_direct {
        direct_pass(matrix, margin_is_rows, &mut reducer)?;
    } else if has_running {
        running_pass(matrix, margin_is_rows, &mut reducer)?;
    } else {
        direct_pass(matrix, margin_is_rows, &mut reducer)?;
    }

    Ok(reducer.finalize())
}

fn direct_pass<V, I, M, R>(matrix: &M, margin_is_rows: bool, reducer: &mut R) -> Result<()>
where
    V: Value,
    I: Index,
    M: Matrix<V, I> + ?Sized,
    R: Reducer<V, I>,
{
    let len = if margin_is_rows {
        matrix.nrow()
    } else {
        matrix.ncol()
    };
    let secondary_len = if margin_is_rows {
        matrix.ncol()
    } else {
        matrix.nrow()
    };
    let use_sparse = pick_sparse::<V, I, R>(R::SUPPORTS_SPARSE_DIRECT, R::SUPPORTS_DENSE_DIRECT, matrix.sparse());

    if use_sparse {
        let mut extractor = if margin_is_rows {
            matrix.sparse_row(Selection::Full { length: secondary_len })
        } else {
            matrix.sparse_column(Selection::Full { length: secondary_len })
        };
        let mut vbuf = vec![V::zero(); secondary_len];
        let mut ibuf = vec![I::zero(); secondary_len];
        for i in 0..len {
            let range = extractor.fetch(i, &mut vbuf, &mut ibuf)?;
            reducer.sparse_direct(i, range);
        }
    } else {
        let mut extractor = if margin_is_rows {
            matrix.dense_row(Selection::Full { length: secondary_len })
        } else {
            matrix.dense_column(Selection::Full { length: secondary_len })
        };
        let mut buffer = vec![V::zero(); secondary_len];
        for i in 0..len {
            let values = extractor.fetch(i, &mut buffer)?;
            reducer.dense_direct(i, values);
        }
    }
    Ok(())
}

fn running_pass<V, I, M, R>(matrix: &M, margin_is_rows: bool, reducer: &mut R) -> Result<()>
where
    V: Value,
    I: Index,
    M: Matrix<V, I> + ?Sized,
    R: Reducer<V, I>,
{
    // The margin is reduced by folding, not iterated: we walk the other axis
    // instead, each fetch spanning every margin position at once.
    let other_len = if margin_is_rows {
        matrix.ncol()
    } else {
        matrix.nrow()
    };
    let margin_len = if margin_is_rows {
        matrix.nrow()
    } else {
        matrix.ncol()
    };
    let use_sparse = pick_sparse::<V, I, R>(
        R::SUPPORTS_SPARSE_RUNNING,
        R::SUPPORTS_DENSE_RUNNING,
        matrix.sparse(),
    );

    if use_sparse {
        let mut extractor = if margin_is_rows {
            matrix.sparse_column(Selection::Full { length: margin_len })
        } else {
            matrix.sparse_row(Selection::Full { length: margin_len })
        };
        let mut vbuf = vec![V::zero(); margin_len];
        let mut ibuf = vec![I::zero(); margin_len];
        for j in 0..other_len {
            let range = extractor.fetch(j, &mut vbuf, &mut ibuf)?;
            reducer.sparse_running(range);
        }
    } else {
        let mut extractor = if margin_is_rows {
            matrix.dense_column(Selection::Full { length: margin_len })
        } else {
            matrix.dense_row(Selection::Full { length: margin_len })
        };
        let mut buffer = vec![V::zero(); margin_len];
        for j in 0..other_len {
            let values = extractor.fetch(j, &mut buffer)?;
            reducer.dense_running(values);
        }
    }
    Ok(())
}

/// Decide whether to prefer the sparse strategy over the dense one, given
/// which of the two the reducer supports and whether the matrix itself is
/// sparse. Only called when at least one of the two is supported.
fn pick_sparse<V, I, R: Reducer<V, I>>(supports_sparse: bool, supports_dense: bool, matrix_is_sparse: bool) -> bool {
    match (supports_sparse, supports_dense) {
        (true, true) => matrix_is_sparse,
        (true, false) => true,
        (false, true) => false,
        (false, false) => unreachable!("caller ensures at least one strategy is supported"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::{DenseMatrix, StorageOrder};
    use crate::matrix::sparse::{CompressedSparseMatrix, StorageOrder as SparseStorageOrder};

    struct SumDirect {
        sums: Vec<f64>,
    }

    impl Reducer<f64, u32> for SumDirect {
        type Output = Vec<f64>;
        const SUPPORTS_DENSE_DIRECT: bool = true;

        fn dense_direct(&mut self, i: usize, values: &[f64]) {
            self.sums[i] = values.iter().sum();
        }

        fn finalize(self) -> Self::Output {
            self.sums
        }
    }

    struct SumRunning {
        sums: Vec<f64>,
    }

    impl Reducer<f64, u32> for SumRunning {
        type Output = Vec<f64>;
        const SUPPORTS_DENSE_RUNNING: bool = true;

        fn dense_running(&mut self, values: &[f64]) {
            for (acc, &v) in self.sums.iter_mut().zip(values) {
                *acc += v;
            }
        }

        fn finalize(self) -> Self::Output {
            self.sums
        }
    }

    struct SumSparseDirect {
        sums: Vec<f64>,
    }

    impl Reducer<f64, u32> for SumSparseDirect {
        type Output = Vec<f64>;
        const SUPPORTS_SPARSE_DIRECT: bool = true;

        fn sparse_direct(&mut self, i: usize, range: SparseRange<'_, f64, u32>) {
            self.sums[i] = range.values().iter().sum();
        }

        fn finalize(self) -> Self::Output {
            self.sums
        }
    }

    fn sample_dense() -> DenseMatrix<f64> {
        DenseMatrix::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, StorageOrder::RowMajor).unwrap()
    }

    #[test]
    fn direct_matches_preferred_axis_row_sums() {
        let matrix = sample_dense();
        let sums = apply(
            &matrix,
            Margin::Row,
            SumDirect { sums: vec![0.0; 2] },
        )
        .unwrap();
        assert_eq!(sums, vec![6.0, 15.0]);
    }

    #[test]
    fn running_pass_used_when_margin_mismatches_preference() {
        // Row-major matrix preferring rows; requesting column sums with only
        // a running reducer forces the running pass over rows.
        let matrix = sample_dense();
        let sums = apply(
            &matrix,
            Margin::Col,
            SumRunning { sums: vec![0.0; 3] },
        )
        .unwrap();
        assert_eq!(sums, vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn direct_fallback_crosses_axis_when_no_running_capability() {
        // Column margin with only a direct reducer on a row-preferring
        // matrix: falls back to case 3, the cross-axis direct pass.
        let matrix = sample_dense();
        let sums = apply(
            &matrix,
            Margin::Col,
            SumDirect { sums: vec![0.0; 3] },
        )
        .unwrap();
        assert_eq!(sums, vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn sparse_direct_path_on_compressed_matrix() {
        // indptr [0, 2, 3], indices [0, 2, 1], values [1.0, 2.0, 3.0]
        let matrix = CompressedSparseMatrix::<f64, u32>::new(
            vec![1.0, 2.0, 3.0],
            vec![0, 2, 1],
            vec![0, 2, 3],
            2,
            3,
            SparseStorageOrder::Csr,
            Some(true),
        )
        .unwrap();
        let sums = apply(
            &matrix,
            Margin::Row,
            SumSparseDirect { sums: vec![0.0; 2] },
        )
        .unwrap();
        assert_eq!(sums, vec![3.0, 3.0]);
    }

    #[test]
    fn no_capability_is_rejected() {
        struct Empty;
        impl Reducer<f64, u32> for Empty {
            type Output = ();
            fn finalize(self) -> Self::Output {}
        }
        let matrix = sample_dense();
        let err = apply(&matrix, Margin::Row, Empty).unwrap_err();
        assert!(matches!(err, MatrixError::IncompatibleComposition(_)));
    }
}
