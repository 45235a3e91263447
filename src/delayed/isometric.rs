//! Element-wise (isometric) operation wrapper.

use std::marker::PhantomData;
use std::sync::Arc;

use num::NumCast;

use crate::error::Result;
use crate::matrix::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};
use crate::oracle::Oracle;
use crate::sparse_range::SparseRange;

/// An element-wise operator applied by [`DelayedIsometricOp`].
///
/// `apply` receives the logical `(row, col)` coordinates of the element
/// (useful for vector-valued operands, which vary along one axis) and its
/// original value, and returns the transformed value.
pub trait IsometricOp<V>: Send + Sync {
    /// Compute the transformed value at logical coordinates `(row, col)`.
    fn apply(&self, row: usize, col: usize, value: V) -> V;

    /// Whether this operator maps `0 -> 0`. If `true` and the child is
    /// sparse, the wrapper remains sparse (only non-zero values are
    /// transformed, indices are untouched); otherwise the wrapper is dense
    /// (sparse extraction synthesises a fully-populated range).
    fn preserves_sparsity(&self) -> bool;
}

/// `v + s`. Not sparsity-preserving.
pub struct AddScalar<V>(pub V);
impl<V: Value> IsometricOp<V> for AddScalar<V> {
    fn apply(&self, _row: usize, _col: usize, value: V) -> V {
        value + self.0
    }
    fn preserves_sparsity(&self) -> bool {
        false
    }
}

/// `v - s` (`flip = false`) or `s - v` (`flip = true`). Not
/// sparsity-preserving.
pub struct SubScalar<V> {
    /// The scalar operand.
    pub scalar: V,
    /// Whether the scalar is the left-hand operand (`s - v`).
    pub flip: bool,
}
impl<V: Value> IsometricOp<V> for SubScalar<V> {
    fn apply(&self, _row: usize, _col: usize, value: V) -> V {
        if self.flip {
            self.scalar - value
        } else {
            value - self.scalar
        }
    }
    fn preserves_sparsity(&self) -> bool {
        false
    }
}

/// `v * s`. Sparsity-preserving (assumes a finite factor).
pub struct MulScalar<V>(pub V);
impl<V: Value> IsometricOp<V> for MulScalar<V> {
    fn apply(&self, _row: usize, _col: usize, value: V) -> V {
        value * self.0
    }
    fn preserves_sparsity(&self) -> bool {
        true
    }
}

/// `v / s` (`flip = false`) or `s / v` (`flip = true`). Sparsity-preserving
/// (assumes a finite divisor).
pub struct DivScalar<V> {
    /// The scalar operand.
    pub scalar: V,
    /// Whether the scalar is the left-hand operand (`s / v`).
    pub flip: bool,
}
impl<V: Value> IsometricOp<V> for DivScalar<V> {
    fn apply(&self, _row: usize, _col: usize, value: V) -> V {
        if self.flip {
            self.scalar / value
        } else {
            value / self.scalar
        }
    }
    fn preserves_sparsity(&self) -> bool {
        true
    }
}

/// Which axis a vector operand of [`AddVector`]/[`SubVector`]/[`MulVector`]/[`DivVector`]
/// varies along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorAxis {
    /// The operand varies along rows: `vec[row]`.
    Row,
    /// The operand varies along columns: `vec[col]`.
    Column,
}

impl VectorAxis {
    fn index(self, row: usize, col: usize) -> usize {
        match self {
            Self::Row => row,
            Self::Column => col,
        }
    }
}

/// `v + vec[axis-coord]`. Not sparsity-preserving.
pub struct AddVector<V> {
    /// The per-axis operand.
    pub vector: Arc<[V]>,
    /// Which axis the operand varies along.
    pub axis: VectorAxis,
}
impl<V: Value> IsometricOp<V> for AddVector<V> {
    fn apply(&self, row: usize, col: usize, value: V) -> V {
        value + self.vector[self.axis.index(row, col)]
    }
    fn preserves_sparsity(&self) -> bool {
        false
    }
}

/// `v - vec[·]` (`flip = false`) or `vec[·] - v` (`flip = true`). Not
/// sparsity-preserving.
pub struct SubVector<V> {
    /// The per-axis operand.
    pub vector: Arc<[V]>,
    /// Which axis the operand varies along.
    pub axis: VectorAxis,
    /// Whether the vector is the left-hand operand.
    pub flip: bool,
}
impl<V: Value> IsometricOp<V> for SubVector<V> {
    fn apply(&self, row: usize, col: usize, value: V) -> V {
        let operand = self.vector[self.axis.index(row, col)];
        if self.flip {
            operand - value
        } else {
            value - operand
        }
    }
    fn preserves_sparsity(&self) -> bool {
        false
    }
}

/// `v * vec[·]`. Sparsity-preserving.
pub struct MulVector<V> {
    /// The per-axis operand.
    pub vector: Arc<[V]>,
    /// Which axis the operand varies along.
    pub axis: VectorAxis,
}
impl<V: Value> IsometricOp<V> for MulVector<V> {
    fn apply(&self, row: usize, col: usize, value: V) -> V {
        value * self.vector[self.axis.index(row, col)]
    }
    fn preserves_sparsity(&self) -> bool {
        true
    }
}

/// `v / vec[·]` (`flip = false`) or `vec[·] / v` (`flip = true`).
/// Sparsity-preserving.
pub struct DivVector<V> {
    /// The per-axis operand.
    pub vector: Arc<[V]>,
    /// Which axis the operand varies along.
    pub axis: VectorAxis,
    /// Whether the vector is the left-hand operand.
    pub flip: bool,
}
impl<V: Value> IsometricOp<V> for DivVector<V> {
    fn apply(&self, row: usize, col: usize, value: V) -> V {
        let operand = self.vector[self.axis.index(row, col)];
        if self.flip {
            operand / value
        } else {
            value / operand
        }
    }
    fn preserves_sparsity(&self) -> bool {
        true
    }
}

/// Standard unary math operators. `Log` is parameterised by an arbitrary
/// base; the rest are fixed.
pub enum UnaryMath<V> {
    /// Absolute value. Sparsity-preserving.
    Abs,
    /// Square root. Sparsity-preserving.
    Sqrt,
    /// Round to nearest integer. Sparsity-preserving.
    Round,
    /// `ln(1 + v)`. Sparsity-preserving.
    Log1p,
    /// `e^v`. Not sparsity-preserving.
    Exp,
    /// `log(v) / log(base)`. Not sparsity-preserving.
    Log {
        /// The logarithm base.
        base: V,
    },
}

impl<V: Value + num::Float> IsometricOp<V> for UnaryMath<V> {
    fn apply(&self, _row: usize, _col: usize, value: V) -> V {
        match self {
            Self::Abs => value.abs(),
            Self::Sqrt => value.sqrt(),
            Self::Round => value.round(),
            Self::Log1p => value.ln_1p(),
            Self::Exp => value.exp(),
            Self::Log { base } => value.ln() / base.ln(),
        }
    }

    fn preserves_sparsity(&self) -> bool {
        matches!(self, Self::Abs | Self::Sqrt | Self::Round | Self::Log1p)
    }
}

/// Wraps a child matrix with an [`IsometricOp`], applied element-wise at
/// extraction time.
pub struct DelayedIsometricOp<V, I, M, Op> {
    child: Arc<M>,
    op: Arc<Op>,
    row_offset: usize,
    col_offset: usize,
    _marker: PhantomData<fn() -> (V, I)>,
}

impl<V: Value, I: Index, M: Matrix<V, I>, Op: IsometricOp<V>> DelayedIsometricOp<V, I, M, Op> {
    /// Wrap `child` with `op`.
    #[must_use]
    pub fn new(child: Arc<M>, op: Op) -> Self {
        Self {
            child,
            op: Arc::new(op),
            row_offset: 0,
            col_offset: 0,
            _marker: PhantomData,
        }
    }

    fn is_sparse(&self) -> bool {
        self.child.sparse() && self.op.preserves_sparsity()
    }
}

struct IsometricDenseExtractor<'a, V, I, Op> {
    inner: Box<dyn DenseExtractor<V, I> + 'a>,
    op: Arc<Op>,
    row_axis: bool,
    row_offset: usize,
    col_offset: usize,
    selection: Selection<I>,
}

impl<V: Value, I: Index, Op: IsometricOp<V>> DenseExtractor<V, I>
    for IsometricDenseExtractor<'_, V, I, Op>
{
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        let fetched = self.inner.fetch(i, buffer)?;
        let mut transformed = vec![V::zero(); fetched.len()];
        for (k, &value) in fetched.iter().enumerate() {
            let secondary = secondary_position(&self.selection, k);
            let (row, col) = if self.row_axis {
                (self.row_offset + i, self.col_offset + secondary)
            } else {
                (self.row_offset + secondary, self.col_offset + i)
            };
            transformed[k] = self.op.apply(row, col, value);
        }
        buffer.copy_from_slice(&transformed);
        Ok(buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

fn secondary_position<I: Index>(selection: &Selection<I>, k: usize) -> usize {
    use num::ToPrimitive;
    match selection {
        Selection::Full { .. } => k,
        Selection::Block { start, .. } => start + k,
        Selection::Indices(indices) => indices[k].to_usize().expect("index fits in usize"),
    }
}

/// A sparsity-preserving sparse extractor: transforms only the non-zero
/// values reported by the child, leaving indices untouched.
struct IsometricSparsePreservingExtractor<'a, V, I, Op> {
    inner: Box<dyn SparseExtractor<V, I> + 'a>,
    op: Arc<Op>,
    row_axis: bool,
    row_offset: usize,
    col_offset: usize,
}

impl<V: Value, I: Index, Op: IsometricOp<V>> SparseExtractor<V, I>
    for IsometricSparsePreservingExtractor<'_, V, I, Op>
{
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        use num::ToPrimitive;
        let range = self.inner.fetch(i, vbuf, ibuf)?;
        let count = range.len();
        let (values, indices) = range.into_parts();
        let mut transformed = vec![V::zero(); count];
        for (k, (&value, &idx)) in values.iter().zip(indices.iter()).enumerate() {
            let secondary = idx.to_usize().expect("index fits in usize");
            let (row, col) = if self.row_axis {
                (self.row_offset + i, self.col_offset + secondary)
            } else {
                (self.row_offset + secondary, self.col_offset + i)
            };
            transformed[k] = self.op.apply(row, col, value);
        }
        vbuf[..count].copy_from_slice(&transformed);
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

/// A non-sparsity-preserving sparse extractor: synthesises a fully
/// populated range (`indices = [0..len)`) from a dense fetch.
struct IsometricSparseDenseExtractor<'a, V, I, Op> {
    inner: IsometricDenseExtractor<'a, V, I, Op>,
}

impl<V: Value, I: Index, Op: IsometricOp<V>> SparseExtractor<V, I>
    for IsometricSparseDenseExtractor<'_, V, I, Op>
{
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        let len = self.inner.fetch(i, vbuf)?.len();
        for (k, slot) in ibuf.iter_mut().enumerate().take(len) {
            *slot = I::from(k).expect("position fits index type");
        }
        Ok(SparseRange::new(&vbuf[..len], &ibuf[..len]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

impl<V: Value, I: Index, M: Matrix<V, I>, Op: IsometricOp<V>> Matrix<V, I>
    for DelayedIsometricOp<V, I, M, Op>
{
    fn nrow(&self) -> usize {
        self.child.nrow()
    }

    fn ncol(&self) -> usize {
        self.child.ncol()
    }

    fn sparse(&self) -> bool {
        self.is_sparse()
    }

    fn prefer_rows(&self) -> bool {
        self.child.prefer_rows()
    }

    fn uses_oracle(&self, row: bool) -> bool {
        self.child.uses_oracle(row)
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        Box::new(IsometricDenseExtractor {
            inner: self.child.dense_row(selection.clone()),
            op: self.op.clone(),
            row_axis: true,
            row_offset: self.row_offset,
            col_offset: self.col_offset,
            selection,
        })
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        Box::new(IsometricDenseExtractor {
            inner: self.child.dense_column(selection.clone()),
            op: self.op.clone(),
            row_axis: false,
            row_offset: self.row_offset,
            col_offset: self.col_offset,
            selection,
        })
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.is_sparse() {
            Box::new(IsometricSparsePreservingExtractor {
                inner: self.child.sparse_row(selection),
                op: self.op.clone(),
                row_axis: true,
                row_offset: self.row_offset,
                col_offset: self.col_offset,
            })
        } else {
            Box::new(IsometricSparseDenseExtractor {
                inner: IsometricDenseExtractor {
                    inner: self.child.dense_row(selection.clone()),
                    op: self.op.clone(),
                    row_axis: true,
                    row_offset: self.row_offset,
                    col_offset: self.col_offset,
                    selection,
                },
            })
        }
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.is_sparse() {
            Box::new(IsometricSparsePreservingExtractor {
                inner: self.child.sparse_column(selection),
                op: self.op.clone(),
                row_axis: false,
                row_offset: self.row_offset,
                col_offset: self.col_offset,
            })
        } else {
            Box::new(IsometricSparseDenseExtractor {
                inner: IsometricDenseExtractor {
                    inner: self.child.dense_column(selection.clone()),
                    op: self.op.clone(),
                    row_axis: false,
                    row_offset: self.row_offset,
                    col_offset: self.col_offset,
                    selection,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::{DenseMatrix, StorageOrder};
    use crate::matrix::sparse::{CompressedSparseMatrix, StorageOrder as SparseOrder};

    #[test]
    fn add_scalar_is_dense_and_transforms() {
        let child = Arc::new(
            DenseMatrix::new(vec![1.0, 2.0, 3.0, 4.0], 1, 4, StorageOrder::RowMajor).unwrap(),
        );
        let wrapper = DelayedIsometricOp::new(child, AddScalar(5.0));
        assert!(!wrapper.sparse());
        let mut extractor = wrapper.dense_row(Selection::Full { length: 4 });
        let mut buffer = [0.0; 4];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn mul_scalar_preserves_sparsity_on_sparse_child() {
        let child = Arc::new(
            CompressedSparseMatrix::<f64, u32>::new(
                vec![10.0, 20.0],
                vec![0, 3],
                vec![0, 2],
                1,
                4,
                SparseOrder::Csr,
                Some(true),
            )
            .unwrap(),
        );
        let wrapper = DelayedIsometricOp::new(child, MulScalar(2.0));
        assert!(wrapper.sparse());
        let mut extractor = wrapper.sparse_row(Selection::Full { length: 4 });
        let mut vbuf = [0.0; 4];
        let mut ibuf = [0u32; 4];
        let range = extractor.fetch(0, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[20.0, 40.0]);
        assert_eq!(range.indices(), &[0, 3]);
    }

    #[test]
    fn non_preserving_op_synthesises_full_range() {
        let child = Arc::new(
            CompressedSparseMatrix::<f64, u32>::new(
                vec![10.0],
                vec![2],
                vec![0, 1],
                1,
                4,
                SparseOrder::Csr,
                Some(true),
            )
            .unwrap(),
        );
        let wrapper = DelayedIsometricOp::new(child, AddScalar(1.0));
        let mut extractor = wrapper.sparse_row(Selection::Full { length: 4 });
        let mut vbuf = [0.0; 4];
        let mut ibuf = [0u32; 4];
        let range = extractor.fetch(0, &mut vbuf, &mut ibuf).unwrap();
        assert_eq!(range.values(), &[1.0, 1.0, 11.0, 1.0]);
        assert_eq!(range.indices(), &[0, 1, 2, 3]);
    }
}
