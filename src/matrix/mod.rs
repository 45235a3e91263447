//! The polymorphic matrix surface: shape, sparsity, preferred axis, and the
//! four extraction variants (dense/sparse x row/column), each available as
//! a full-axis, contiguous-block, or arbitrary-ascending-index-set
//! extractor.
//!
//! ## Concurrency model
//! A [`Matrix`] is immutable after construction (`Send + Sync`) and owns no
//! per-access mutable state; all mutable state — workspaces, slab caches,
//! oracle cursors — lives in the extractors it hands out. The library
//! never spawns threads itself: parallelism is obtained by constructing
//! multiple independent extractors from the same matrix and driving each on
//! its own thread (see [`crate::concurrency::par_for_each_extractor`]).
//! Wrappers in [`crate::delayed`] forward extractor construction down to
//! their child so that a whole tree of wrappers can be extracted
//! concurrently this way.
//!
//! ## The "pointer may or may not equal the supplied buffer" contract
//! [`DenseExtractor::fetch`] returns a slice that is *either* the caller's
//! `buffer`, written in place, *or* a slice borrowed from storage the
//! extractor itself owns. Callers that need to know which happened compare
//! the returned slice against `buffer` by pointer identity
//! (`core::ptr::eq`). The returned slice (and, for
//! [`SparseExtractor::fetch`], the returned [`SparseRange`]) remains valid
//! only until the next call to the same extractor.

pub mod dense;
pub mod sparse;
pub mod workspace;

use std::sync::Arc;

use crate::error::Result;
use crate::oracle::Oracle;
use crate::sparse_range::SparseRange;

/// Marker trait for matrix element values.
///
/// Blanket-implemented for every type satisfying its bounds; implementors
/// never need to implement it directly.
pub trait Value: num::Num + Copy + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Value for T where T: num::Num + Copy + Send + Sync + std::fmt::Debug + 'static {}

/// Marker trait for sparse index and axis-position values.
///
/// Blanket-implemented for every type satisfying its bounds; implementors
/// never need to implement it directly.
pub trait Index: num::PrimInt + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Index for T where T: num::PrimInt + Send + Sync + std::fmt::Debug + 'static {}

/// A description of which positions along the secondary axis an extractor
/// should produce, for a single `fetch` position on the primary axis.
#[derive(Debug, Clone)]
pub enum Selection<I> {
    /// The entire secondary axis, of the given length.
    Full {
        /// The length of the secondary axis.
        length: usize,
    },
    /// A contiguous `[start, start + length)` region of the secondary axis.
    Block {
        /// The first position included in the selection.
        start: usize,
        /// The number of positions included in the selection.
        length: usize,
    },
    /// An arbitrary, strictly ascending set of secondary-axis positions.
    /// Positions may repeat across separate `fetch` calls but must be
    /// ascending within a single index set.
    Indices(Arc<[I]>),
}

impl<I: Index> Selection<I> {
    /// The number of secondary-axis positions this selection produces per
    /// `fetch` call.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Full { length } | Self::Block { length, .. } => *length,
            Self::Indices(indices) => indices.len(),
        }
    }

    /// Returns `true` if this selection produces no positions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A stateful, dense-output extractor bound to one [`Matrix`], one axis, and
/// one [`Selection`].
pub trait DenseExtractor<V, I> {
    /// The number of secondary-axis positions produced by each [`fetch`](Self::fetch) call.
    fn selection_len(&self) -> usize;

    /// Fetch the dense vector at primary-axis position `i`.
    ///
    /// Returns a slice of length [`selection_len`](Self::selection_len),
    /// either `buffer` (written in place) or an internally owned slice; see
    /// the [module-level contract](self#the-pointer-may-or-may-not-equal-the-supplied-buffer-contract).
    /// The returned slice is valid until the next call to `fetch` or
    /// `set_oracle` on this extractor.
    ///
    /// # Errors
    /// Returns an error if `i` is out of range for the matrix's primary axis,
    /// if an oracle is bound and `i` does not match its next prediction, or
    /// if the backing store fails to supply the requested data.
    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]>;

    /// Bind an oracle of future primary-axis accesses to this extractor.
    /// Subsequent `fetch` calls must be made with the indices the oracle
    /// predicts, in order.
    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>);
}

/// A stateful, sparse-output extractor bound to one [`Matrix`], one axis,
/// and one [`Selection`].
pub trait SparseExtractor<V, I> {
    /// The number of secondary-axis positions spanned by each [`fetch`](Self::fetch) call.
    fn selection_len(&self) -> usize;

    /// Fetch the non-zero entries of the vector at primary-axis position
    /// `i`, within the bound selection.
    ///
    /// The returned [`SparseRange`] borrows either `vbuf`/`ibuf` (written in
    /// place) or internally owned storage; see the
    /// [module-level contract](self#the-pointer-may-or-may-not-equal-the-supplied-buffer-contract).
    /// Reported indices are strictly ascending and expressed relative to the
    /// start of the bound selection. The returned range is valid until the
    /// next call to `fetch` or `set_oracle` on this extractor.
    ///
    /// # Errors
    /// Returns an error if `i` is out of range for the matrix's primary
    /// axis, if an oracle is bound and `i` does not match its next
    /// prediction, or if the backing store fails to supply the requested
    /// data.
    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>>;

    /// Bind an oracle of future primary-axis accesses to this extractor.
    /// Subsequent `fetch` calls must be made with the indices the oracle
    /// predicts, in order.
    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>);
}

/// A two-dimensional matrix of values of type `V` indexed by `I`, exposed
/// through a uniform extraction surface regardless of backing storage.
///
/// Implementations must be immutable after construction: all extraction
/// state lives in the extractors returned by the factory methods, never in
/// `self`. See the [module-level concurrency notes](self#concurrency-model).
pub trait Matrix<V, I>: Send + Sync {
    /// The number of rows.
    fn nrow(&self) -> usize;

    /// The number of columns.
    fn ncol(&self) -> usize;

    /// Whether the matrix's data is sparse: secondary-axis fetches should
    /// prefer sparse extraction paths.
    fn sparse(&self) -> bool;

    /// Whether row-wise iteration is cheaper than column-wise iteration for
    /// this matrix.
    fn prefer_rows(&self) -> bool;

    /// Whether binding an [`Oracle`] to an extractor over `row` materially
    /// improves its performance (typically `true` only for chunked,
    /// file-backed matrices).
    fn uses_oracle(&self, row: bool) -> bool;

    /// Construct a dense extractor over rows, producing the columns
    /// described by `selection` for each requested row.
    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a>;

    /// Construct a dense extractor over columns, producing the rows
    /// described by `selection` for each requested column.
    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a>;

    /// Construct a sparse extractor over rows, producing the non-zero
    /// columns described by `selection` for each requested row.
    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a>;

    /// Construct a sparse extractor over columns, producing the non-zero
    /// rows described by `selection` for each requested column.
    fn sparse_column<'a>(&'a self, selection: Selection<I>)
        -> Box<dyn SparseExtractor<V, I> + 'a>;
}
