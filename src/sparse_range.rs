//! A borrowed view over the non-zero values and indices produced by a
//! sparse extraction.

use derive_more::Display;

/// An immutable view `(count, values, indices)` over a contiguous portion of
/// a sparse extractor's output buffers.
///
/// The two slices are independent: each may point into the caller-supplied
/// buffer passed to the extraction call, or into memory owned by the
/// extractor itself. Callers that need to know which happened should compare
/// [`SparseRange::values`] and [`SparseRange::indices`] against the buffers
/// they supplied, by pointer identity (`core::ptr::eq`), rather than assuming
/// either case.
///
/// The view is valid only until the next call on the extractor that
/// produced it.
#[derive(Debug, Display, Clone, Copy)]
#[display(fmt = "SparseRange({} nnz)", "self.values.len()")]
pub struct SparseRange<'a, V, I> {
    values: &'a [V],
    indices: &'a [I],
}

impl<'a, V, I> SparseRange<'a, V, I> {
    /// Create a new sparse range from matching `values` and `indices`
    /// slices.
    ///
    /// # Panics
    /// Panics if `values.len() != indices.len()`.
    #[must_use]
    pub fn new(values: &'a [V], indices: &'a [I]) -> Self {
        assert_eq!(
            values.len(),
            indices.len(),
            "sparse range values and indices must have equal length"
        );
        Self { values, indices }
    }

    /// The number of non-zero entries in this range.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if this range has no non-zero entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The non-zero values, in the same order as [`indices`](Self::indices).
    #[must_use]
    pub fn values(&self) -> &'a [V] {
        self.values
    }

    /// The ascending, within-selection indices of the non-zero values.
    #[must_use]
    pub fn indices(&self) -> &'a [I] {
        self.indices
    }

    /// Split the view into its `(values, indices)` slices.
    #[must_use]
    pub fn into_parts(self) -> (&'a [V], &'a [I]) {
        (self.values, self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_and_read() {
        let values = [1.0_f64, 2.0, 3.0];
        let indices = [0_u32, 3, 7];
        let range = SparseRange::new(&values, &indices);
        assert_eq!(range.len(), 3);
        assert!(!range.is_empty());
        assert_eq!(range.values(), &values);
        assert_eq!(range.indices(), &indices);
    }

    #[test]
    fn empty_range() {
        let values: [f64; 0] = [];
        let indices: [u32; 0] = [];
        let range = SparseRange::new(&values, &indices);
        assert!(range.is_empty());
    }

    #[test]
    #[should_panic(expected = "equal length")]
    fn mismatched_lengths_panics() {
        let values = [1.0_f64, 2.0];
        let indices = [0_u32];
        let _ = SparseRange::new(&values, &indices);
    }

    #[test]
    fn into_parts_roundtrip() {
        let values = [9.0_f64];
        let indices = [2_u32];
        let range = SparseRange::new(&values, &indices);
        let (v, i) = range.into_parts();
        assert_eq!(v, &values);
        assert_eq!(i, &indices);
    }
}
