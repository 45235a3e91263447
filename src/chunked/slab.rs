//! Reusable storage for one chunk's worth of extracted data, cached by
//! [`super::lru_cache::LruChunkCache`] and [`super::oracle_cache::OracleChunkCache`].
//!
//! A slab's allocations are sized once and then reused across cache evictions
//! (§4.J/§4.L): resizing a `Vec` that is already large enough to receive the
//! next chunk's data is a no-op, so a long-running cache settles into a
//! steady state with no further heap churn.
//!
//! Once populated, a slab also answers the §4.I extraction primitives
//! directly — a contiguous secondary-axis block, an arbitrary gather, or an
//! appended sparse run — for one primary row of the chunk it holds.

use crate::matrix::{Index, Value};

/// One cached chunk, either as a dense contiguous array in the chunk's
/// storage order, or as per-primary-row sparse runs.
#[derive(Debug, Default, Clone)]
pub enum Slab<V, I> {
    #[default]
    Empty,
    Dense(DenseSlab<V>),
    Sparse(SparseSlab<V, I>),
}

/// A dense chunk held as a flat, storage-ordered buffer.
#[derive(Debug, Default, Clone)]
pub struct DenseSlab<V> {
    pub data: Vec<V>,
    pub primary_len: usize,
    pub secondary_len: usize,
}

/// A sparse chunk held as one `(values, indices)` run per primary row/column.
#[derive(Debug, Default, Clone)]
pub struct SparseSlab<V, I> {
    pub rows: Vec<(Vec<V>, Vec<I>)>,
}

impl<V, I> Slab<V, I> {
    /// True if this slab currently holds sparse data (or is unallocated and
    /// will be asked to hold sparse data).
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Slab::Sparse(_) | Slab::Empty)
    }

    /// Reinterpret as a dense slab, allocating fresh storage when the slab's
    /// existing allocation is the wrong shape (sparse, or empty).
    pub fn ensure_dense(&mut self, primary_len: usize, secondary_len: usize) -> &mut DenseSlab<V>
    where
        V: Default + Clone,
    {
        let needs_new = !matches!(self, Slab::Dense(_));
        if needs_new {
            *self = Slab::Dense(DenseSlab {
                data: Vec::new(),
                primary_len: 0,
                secondary_len: 0,
            });
        }
        let Slab::Dense(dense) = self else {
            unreachable!("just constructed as Dense")
        };
        let needed = primary_len * secondary_len;
        if dense.data.len() < needed {
            dense.data.resize(needed, V::default());
        }
        dense.primary_len = primary_len;
        dense.secondary_len = secondary_len;
        dense
    }

    /// Reinterpret as a sparse slab with `primary_len` rows, allocating
    /// fresh storage when the slab's existing allocation is the wrong shape.
    pub fn ensure_sparse(&mut self, primary_len: usize) -> &mut SparseSlab<V, I> {
        let needs_new = !matches!(self, Slab::Sparse(_));
        if needs_new {
            *self = Slab::Sparse(SparseSlab { rows: Vec::new() });
        }
        let Slab::Sparse(sparse) = self else {
            unreachable!("just constructed as Sparse")
        };
        if sparse.rows.len() < primary_len {
            sparse.rows.resize_with(primary_len, Default::default);
        }
        for row in &mut sparse.rows[..primary_len] {
            row.0.clear();
            row.1.clear();
        }
        sparse
    }
}

impl<V: Value, I: Index> Slab<V, I> {
    /// Copy the contiguous secondary-axis block `[start, start+len)` of
    /// primary row `primary` into `out`.
    ///
    /// # Panics
    /// Panics if the slab is [`Slab::Empty`].
    pub fn dense_block(&self, primary: usize, start: usize, len: usize, out: &mut [V]) {
        match self {
            Slab::Dense(dense) => {
                let base = primary * dense.secondary_len + start;
                out[..len].copy_from_slice(&dense.data[base..base + len]);
            }
            Slab::Sparse(sparse) => {
                out[..len].fill(V::zero());
                let (values, indices) = &sparse.rows[primary];
                for (&idx, &value) in indices.iter().zip(values.iter()) {
                    let pos = idx.to_usize().expect("chunk-local index fits usize");
                    if pos >= start && pos < start + len {
                        out[pos - start] = value;
                    }
                }
            }
            Slab::Empty => panic!("dense_block called on an unpopulated slab"),
        }
    }

    /// Gather arbitrary secondary-axis `positions` of primary row `primary`
    /// into `out`; `positions` need not be sorted.
    ///
    /// # Panics
    /// Panics if the slab is [`Slab::Empty`].
    pub fn dense_gather(&self, primary: usize, positions: &[usize], out: &mut [V]) {
        match self {
            Slab::Dense(dense) => {
                let base = primary * dense.secondary_len;
                for (out_slot, &pos) in out.iter_mut().zip(positions) {
                    *out_slot = dense.data[base + pos];
                }
            }
            Slab::Sparse(sparse) => {
                out[..positions.len()].fill(V::zero());
                let (values, indices) = &sparse.rows[primary];
                for (&idx, &value) in indices.iter().zip(values.iter()) {
                    let pos = idx.to_usize().expect("chunk-local index fits usize");
                    for (slot, &want) in positions.iter().enumerate() {
                        if want == pos {
                            out[slot] = value;
                        }
                    }
                }
            }
            Slab::Empty => panic!("dense_gather called on an unpopulated slab"),
        }
    }

    /// Append the nonzero run of primary row `primary`, restricted to
    /// secondary positions in `[start, start+len)`, onto `values`/`indices`.
    /// Appended indices are shifted by `index_offset`.
    ///
    /// # Panics
    /// Panics if the slab is [`Slab::Empty`].
    pub fn sparse_block(
        &self,
        primary: usize,
        start: usize,
        len: usize,
        index_offset: I,
        values_out: &mut Vec<V>,
        indices_out: &mut Vec<I>,
    ) {
        match self {
            Slab::Dense(dense) => {
                let base = primary * dense.secondary_len + start;
                for (offset, &value) in dense.data[base..base + len].iter().enumerate() {
                    if !value.is_zero() {
                        values_out.push(value);
                        indices_out
                            .push(I::from(offset).expect("offset fits index type") + index_offset);
                    }
                }
            }
            Slab::Sparse(sparse) => {
                let (values, indices) = &sparse.rows[primary];
                for (&idx, &value) in indices.iter().zip(values.iter()) {
                    let pos = idx.to_usize().expect("chunk-local index fits usize");
                    if pos >= start && pos < start + len {
                        values_out.push(value);
                        indices_out.push(
                            I::from(pos - start).expect("offset fits index type") + index_offset,
                        );
                    }
                }
            }
            Slab::Empty => panic!("sparse_block called on an unpopulated slab"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_dense_reuses_allocation_when_large_enough() {
        let mut slab: Slab<f64, u32> = Slab::Empty;
        {
            let dense = slab.ensure_dense(2, 3);
            dense.data.copy_from_slice(&[1.0; 6]);
        }
        let ptr_before = match &slab {
            Slab::Dense(d) => d.data.as_ptr(),
            _ => unreachable!(),
        };
        let dense_again = slab.ensure_dense(2, 3);
        assert_eq!(dense_again.data.as_ptr(), ptr_before);
    }

    #[test]
    fn ensure_sparse_clears_existing_rows() {
        let mut slab: Slab<f64, u32> = Slab::Empty;
        {
            let sparse = slab.ensure_sparse(2);
            sparse.rows[0].0.push(5.0);
            sparse.rows[0].1.push(0);
        }
        let sparse_again = slab.ensure_sparse(2);
        assert!(sparse_again.rows[0].0.is_empty());
    }
}
