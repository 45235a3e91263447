//! A library for representing and iterating over two-dimensional numeric
//! matrices of arbitrary backing storage behind a single polymorphic
//! interface, together with lazily evaluated transformations and a
//! chunk-caching layer for out-of-core, chunked backends.
//!
//! ## Matrix kinds
//!  - [`matrix::dense`]: row-major or column-major dense matrices.
//!  - [`matrix::sparse`]: compressed sparse row/column matrices.
//!  - [`chunked`]: matrices backed by a grid of chunks fetched through a
//!    [`chunked::ChunkReader`], with LRU and oracle-driven chunk caches.
//!
//! ## Delayed operations
//! [`delayed`] wraps any [`matrix::Matrix`] with a subset, an element-wise
//! (isometric) operation, an axis bind, a value/index cast, or a transpose,
//! without copying the underlying data until extraction time.
//!
//! ## Extraction
//! Every matrix is accessed through a [`matrix::DenseExtractor`] or
//! [`matrix::SparseExtractor`] obtained from one of the four factory
//! methods on [`matrix::Matrix`] (dense/sparse x row/column), each of which
//! can be built for a full axis, a contiguous block, or an arbitrary
//! ascending index set. See [`matrix`] for the extraction contract,
//! including the "pointer may or may not equal the supplied buffer"
//! convention.
//!
//! ## Traversal
//! [`apply::apply`] is the single generic traversal primitive used to drive
//! row/column reductions (sums, medians, variances and similar statistics
//! are built on top of it, but are out of scope for this crate).

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]

pub mod apply;
pub mod chunked;
pub mod concurrency;
pub mod config;
pub mod delayed;
pub mod error;
pub mod matrix;
pub mod oracle;
pub mod sparse_range;

pub use error::{ChunkReadError, MatrixError};
pub use matrix::{Index, Matrix, Selection, Value};
pub use sparse_range::SparseRange;
