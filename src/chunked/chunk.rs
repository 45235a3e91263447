//! Chunk decode ("inflate") and the per-chunk extraction primitives of
//! §4.I: pulling a dense block or an arbitrary secondary-axis selection out
//! of one already-decoded chunk, in either dense or sparse storage.
//!
//! Decoded chunks are written straight into a caller-supplied
//! [`Slab`](super::slab::Slab) rather than a fresh allocation, so that a
//! slab recycled from LRU eviction (§4.J) keeps its buffers across many
//! generations of chunks.

use std::borrow::Cow;

use bytemuck::Pod;

use crate::error::{MatrixError, Result};
use crate::matrix::{Index, Value};

use super::slab::Slab;

/// Shape and storage metadata for one chunk, shared by every chunk in a
/// chunk-grid matrix along a given axis.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLayout {
    pub primary_len: usize,
    pub secondary_len: usize,
    pub sparse: bool,
}

/// Decode a chunk's raw bytes according to `layout` into `slab`, reusing
/// `slab`'s existing allocation.
///
/// Dense chunks are exactly `primary_len * secondary_len` values of `V` in
/// storage order, reinterpreted with no copy-then-convert step (bytemuck).
/// Sparse chunks are serialised as `primary_len + 1` `u64` `indptr` entries,
/// followed by `nnz` `I` indices, followed by `nnz` `V` values — mirroring
/// the in-memory CSR/CSC layout the rest of the crate already uses (see
/// [`crate::matrix::sparse`]).
///
/// # Errors
/// Returns [`MatrixError::ShapeMismatch`] if `bytes` is not sized
/// consistently with `layout`.
pub fn inflate_into<V: Value + Pod, I: Index + Pod>(
    bytes: &Cow<'static, [u8]>,
    layout: ChunkLayout,
    slab: &mut Slab<V, I>,
) -> Result<()> {
    if layout.sparse {
        inflate_sparse(bytes, layout.primary_len, slab)
    } else {
        inflate_dense(bytes, layout, slab)
    }
}

fn inflate_dense<V: Value + Pod, I>(
    bytes: &Cow<'static, [u8]>,
    layout: ChunkLayout,
    slab: &mut Slab<V, I>,
) -> Result<()> {
    let expected = layout.primary_len * layout.secondary_len;
    let values: &[V] = bytemuck::try_cast_slice(bytes).map_err(|e| {
        MatrixError::ShapeMismatch(format!("dense chunk bytes do not align as values: {e}"))
    })?;
    if values.len() != expected {
        return Err(MatrixError::ShapeMismatch(format!(
            "dense chunk has {} values, expected {expected}",
            values.len()
        )));
    }
    let dense = slab.ensure_dense(layout.primary_len, layout.secondary_len);
    dense.data[..expected].copy_from_slice(values);
    Ok(())
}

fn inflate_sparse<V: Value + Pod, I: Index + Pod>(
    bytes: &Cow<'static, [u8]>,
    primary_len: usize,
    slab: &mut Slab<V, I>,
) -> Result<()> {
    let indptr_bytes = (primary_len + 1) * std::mem::size_of::<u64>();
    if bytes.len() < indptr_bytes {
        return Err(MatrixError::ShapeMismatch(
            "sparse chunk too short to hold indptr".to_string(),
        ));
    }
    let (head, rest) = bytes.split_at(indptr_bytes);
    let indptr_raw: &[u64] = bytemuck::try_cast_slice(head)
        .map_err(|e| MatrixError::ShapeMismatch(format!("sparse chunk indptr misaligned: {e}")))?;
    let nnz = *indptr_raw.last().expect("indptr has primary_len + 1 entries") as usize;

    let index_bytes = nnz * std::mem::size_of::<I>();
    if rest.len() < index_bytes {
        return Err(MatrixError::ShapeMismatch(
            "sparse chunk too short to hold indices".to_string(),
        ));
    }
    let (idx_head, value_bytes) = rest.split_at(index_bytes);
    let indices: &[I] = bytemuck::try_cast_slice(idx_head)
        .map_err(|e| MatrixError::ShapeMismatch(format!("sparse chunk indices misaligned: {e}")))?;
    let values: &[V] = bytemuck::try_cast_slice(value_bytes)
        .map_err(|e| MatrixError::ShapeMismatch(format!("sparse chunk values misaligned: {e}")))?;
    if values.len() != nnz {
        return Err(MatrixError::ShapeMismatch(format!(
            "sparse chunk has {} values, indptr implies {nnz}",
            values.len()
        )));
    }

    let sparse = slab.ensure_sparse(primary_len);
    for row in 0..primary_len {
        let range = indptr_raw[row] as usize..indptr_raw[row + 1] as usize;
        sparse.rows[row].0.extend_from_slice(&values[range.clone()]);
        sparse.rows[row].1.extend_from_slice(&indices[range]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::slab::Slab;

    fn dense_bytes(values: &[f64]) -> Cow<'static, [u8]> {
        Cow::Owned(bytemuck::cast_slice(values).to_vec())
    }

    #[test]
    fn inflate_dense_reinterprets_bytes() {
        let layout = ChunkLayout {
            primary_len: 2,
            secondary_len: 2,
            sparse: false,
        };
        let bytes = dense_bytes(&[1.0, 2.0, 3.0, 4.0]);
        let mut slab: Slab<f64, u32> = Slab::Empty;
        inflate_into(&bytes, layout, &mut slab).unwrap();
        let mut out = [0.0; 2];
        slab.dense_block(1, 0, 2, &mut out);
        assert_eq!(out, [3.0, 4.0]);
    }

    #[test]
    fn inflate_dense_rejects_wrong_length() {
        let layout = ChunkLayout {
            primary_len: 2,
            secondary_len: 2,
            sparse: false,
        };
        let bytes = dense_bytes(&[1.0, 2.0, 3.0]);
        let mut slab: Slab<f64, u32> = Slab::Empty;
        let err = inflate_into(&bytes, layout, &mut slab).unwrap_err();
        assert!(matches!(err, MatrixError::ShapeMismatch(_)));
    }

    #[test]
    fn dense_gather_reads_arbitrary_positions() {
        let layout = ChunkLayout {
            primary_len: 1,
            secondary_len: 4,
            sparse: false,
        };
        let bytes = dense_bytes(&[10.0, 20.0, 30.0, 40.0]);
        let mut slab: Slab<f64, u32> = Slab::Empty;
        inflate_into(&bytes, layout, &mut slab).unwrap();
        let mut out = [0.0; 3];
        slab.dense_gather(0, &[3, 0, 2], &mut out);
        assert_eq!(out, [40.0, 10.0, 30.0]);
    }

    #[test]
    fn sparse_block_appends_shifted_indices() {
        let layout = ChunkLayout {
            primary_len: 1,
            secondary_len: 4,
            sparse: true,
        };
        // one row, indptr [0, 2], indices [1, 3], values [5, 7]
        let mut bytes = Vec::new();
        bytes.extend_from_slice(bytemuck::cast_slice(&[0u64, 2u64]));
        bytes.extend_from_slice(bytemuck::cast_slice(&[1u32, 3u32]));
        bytes.extend_from_slice(bytemuck::cast_slice(&[5.0f64, 7.0]));
        let mut slab: Slab<f64, u32> = Slab::Empty;
        inflate_into(&Cow::Owned(bytes), layout, &mut slab).unwrap();
        let mut values = Vec::new();
        let mut indices = Vec::new();
        slab.sparse_block(0, 0, 4, 100, &mut values, &mut indices);
        assert_eq!(values, vec![5.0, 7.0]);
        assert_eq!(indices, vec![101, 103]);
    }
}
