//! Error types surfaced at matrix construction and extraction time.

use thiserror::Error;

/// An error produced by a [`ChunkReader`](crate::chunked::ChunkReader) while
/// fetching the encoded contents of a chunk.
#[derive(Debug, Error)]
#[error("failed to read chunk {chunk_indices:?}: {source}")]
pub struct ChunkReadError {
    /// The grid indices of the chunk that failed to read.
    pub chunk_indices: Vec<u64>,
    /// The underlying I/O error.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ChunkReadError {
    /// Create a new [`ChunkReadError`].
    pub fn new(
        chunk_indices: Vec<u64>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            chunk_indices,
            source: source.into(),
        }
    }
}

/// Errors surfaced by matrix construction and extraction.
///
/// Construction-time variants (shape mismatch, invalid sparse data) are
/// fatal for that construction. Extraction-time variants (out of range,
/// unordered indices, I/O failure) are contract violations: they are not
/// recovered locally and propagate to the caller of the extraction that
/// triggered them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MatrixError {
    /// A constructor's declared shape is inconsistent with the data backing it
    /// (e.g. `values.len() != nrow * ncol`, or a bind of matrices with
    /// mismatched non-bound dimension).
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// `indptr` is not monotonically non-decreasing, or has the wrong length
    /// for the declared primary dimension.
    #[error("invalid indptr: {0}")]
    InvalidIndptr(String),

    /// Indices within a primary slice are not strictly ascending, or fall
    /// outside `[0, secondary_len)`.
    #[error("invalid sparse indices in primary slice {slice}: {detail}")]
    InvalidSparseIndices {
        /// The primary-axis slice containing the invalid indices.
        slice: usize,
        /// A description of the violation.
        detail: String,
    },

    /// An extraction index `i` fell outside `[0, axis_length)`.
    #[error("extraction index {index} out of range for axis length {axis_length}")]
    OutOfRange {
        /// The offending index.
        index: usize,
        /// The length of the axis being extracted.
        axis_length: usize,
    },

    /// An index set passed to an index-selection extractor was not strictly
    /// ascending, or one of its entries fell past the selection end.
    #[error("index set is not strictly ascending or exceeds the selection bound: {0}")]
    UnorderedIndices(String),

    /// A bind, subset or isometric-op wrapper was constructed over matrices
    /// or vectors of mismatched shape.
    #[error("incompatible wrapper composition: {0}")]
    IncompatibleComposition(String),

    /// Reading a chunk from the backing [`ChunkReader`](crate::chunked::ChunkReader) failed.
    #[error(transparent)]
    Io(#[from] ChunkReadError),
}

/// Convenience alias for `Result<T, MatrixError>`.
pub type Result<T> = std::result::Result<T, MatrixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message() {
        let err = MatrixError::OutOfRange {
            index: 5,
            axis_length: 3,
        };
        assert_eq!(
            err.to_string(),
            "extraction index 5 out of range for axis length 3"
        );
    }

    #[test]
    fn chunk_read_error_wraps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = ChunkReadError::new(vec![1, 2], io_err);
        let matrix_err: MatrixError = err.into();
        assert!(matches!(matrix_err, MatrixError::Io(_)));
    }
}
