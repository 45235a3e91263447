//! Matrices backed by a grid of chunks, combining the LRU and oracle chunk
//! caches with the chunk extraction primitives into the full
//! [`Matrix`](crate::matrix::Matrix) contract.
//!
//! The compressed-file I/O backend itself — the open/read of whatever
//! on-disk encoding a chunk uses — is deliberately out of scope (see
//! spec §1). This module consumes it through [`ChunkReader`], a minimal,
//! object-safe trait that hands back a chunk's encoded bytes; [`chunk`]
//! then inflates those bytes (a thin, uncompressed fixed-layout decode --
//! not a general codec) into typed dense or sparse chunk data.

pub mod chunk;
pub mod lru_cache;
pub mod matrix;
pub mod oracle_cache;
pub mod slab;

pub use chunk::ChunkLayout;
pub use matrix::CustomChunkedMatrix;

use std::borrow::Cow;

use crate::error::ChunkReadError;

/// External collaborator: reads the encoded bytes of one chunk of a
/// chunk-grid matrix.
///
/// This is the crate's only consumer-facing I/O seam (spec §1, §6). A
/// concrete backend owns whatever compressed, on-disk representation it
/// likes; it need only hand back the chunk's bytes in the fixed,
/// uncompressed layout [`chunk::ChunkLayout`] describes. Implementations
/// must serialise concurrent reads through their own lock if the
/// underlying storage is not thread-safe (spec §5).
pub trait ChunkReader<V, I>: Send + Sync {
    /// Read the encoded bytes of the chunk at `(chunk_row, chunk_col)` in
    /// the chunk grid.
    ///
    /// # Errors
    /// Returns a [`ChunkReadError`] if the underlying storage fails.
    fn read_chunk(
        &self,
        chunk_row: usize,
        chunk_col: usize,
    ) -> Result<Cow<'static, [u8]>, ChunkReadError>;
}
