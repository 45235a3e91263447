//! §4.M: [`CustomChunkedMatrix`], a [`Matrix`] backed by row-aligned chunks
//! read on demand through a [`ChunkReader`].
//!
//! Rows are grouped into chunks of `chunk_rows` consecutive rows (the last
//! chunk may be shorter); each chunk spans the full column range. This is
//! the row-primary analogue of the teacher's 1-D-chunked array case and
//! keeps the grid addressing to a single chunk index per row, avoiding a
//! full 2-D chunk grid the spec does not otherwise require.
//!
//! Extraction along the preferred (row) axis goes through a shared
//! [`LruChunkCache`], upgraded to an [`OracleChunkCache`] for the lifetime
//! of an extractor that had an oracle bound to it. Extraction along the
//! opposite (column) axis walks every chunk that intersects the requested
//! row selection, reusing the same shared LRU cache. When the configured
//! cache budget resolves to zero chunk sets (`chunk_set_size_in_elements`
//! would exceed the budget for even one chunk), extraction instead decodes
//! each chunk directly into a single extractor-local slab with no sharing
//! across fetches — the "direct one-shot exact extraction" fallback.

use std::marker::PhantomData;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::config::global_config;
use crate::error::{MatrixError, Result};
use crate::matrix::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};
use crate::oracle::{Oracle, OracleStream};
use crate::sparse_range::SparseRange;

use super::chunk::{self, ChunkLayout};
use super::lru_cache::LruChunkCache;
use super::oracle_cache::OracleChunkCache;
use super::slab::Slab;
use super::ChunkReader;

/// A matrix whose rows are grouped into fixed-size chunks, each read lazily
/// through `R` and cached in memory on first touch.
pub struct CustomChunkedMatrix<V, I, R> {
    reader: R,
    nrow: usize,
    ncol: usize,
    chunk_rows: usize,
    sparse: bool,
    cache_capacity: usize,
    cache: Mutex<LruChunkCache<usize, Slab<V, I>>>,
    _marker: PhantomData<fn() -> I>,
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> CustomChunkedMatrix<V, I, R> {
    /// Build a chunked matrix of `nrow` x `ncol`, grouping rows into chunks
    /// of `chunk_rows` each (the last chunk may be shorter), reading
    /// through `reader`. `sparse` selects whether chunks decode as sparse
    /// CSR runs or dense rows. The cache budget is taken from the global
    /// [`crate::config::Config`]; use [`Self::with_cache_capacity`] to
    /// override it.
    ///
    /// # Errors
    /// Returns [`MatrixError::ShapeMismatch`] if `nrow`, `ncol`, or
    /// `chunk_rows` is zero.
    pub fn new(reader: R, nrow: usize, ncol: usize, chunk_rows: usize, sparse: bool) -> Result<Self> {
        let cache_size_bytes = global_config().default_chunk_cache_size_bytes();
        Self::with_cache_capacity(
            reader,
            nrow,
            ncol,
            chunk_rows,
            sparse,
            chunk_sets_for_budget(cache_size_bytes, chunk_rows, ncol),
        )
    }

    /// As [`Self::new`], but with an explicit number of chunk sets to keep
    /// resident rather than deriving it from the global cache-size budget.
    /// A capacity of `0` selects the direct, uncached one-shot extraction
    /// path.
    ///
    /// # Errors
    /// Returns [`MatrixError::ShapeMismatch`] if `nrow`, `ncol`, or
    /// `chunk_rows` is zero.
    pub fn with_cache_capacity(
        reader: R,
        nrow: usize,
        ncol: usize,
        chunk_rows: usize,
        sparse: bool,
        cache_capacity: usize,
    ) -> Result<Self> {
        if nrow == 0 || ncol == 0 || chunk_rows == 0 {
            return Err(MatrixError::ShapeMismatch(
                "chunked matrix dimensions and chunk_rows must be nonzero".to_string(),
            ));
        }
        Ok(Self {
            reader,
            nrow,
            ncol,
            chunk_rows,
            sparse,
            cache_capacity,
            cache: Mutex::new(LruChunkCache::new(cache_capacity.max(1))),
            _marker: PhantomData,
        })
    }

    /// The underlying [`ChunkReader`] this matrix reads through.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    fn locate(&self, row: usize) -> (usize, usize) {
        (row / self.chunk_rows, row % self.chunk_rows)
    }

    fn chunk_len(&self, chunk_id: usize) -> usize {
        let start = chunk_id * self.chunk_rows;
        (self.nrow - start).min(self.chunk_rows)
    }

    fn layout(&self, chunk_id: usize) -> ChunkLayout {
        ChunkLayout {
            primary_len: self.chunk_len(chunk_id),
            secondary_len: self.ncol,
            sparse: self.sparse,
        }
    }

    fn read_and_inflate(&self, chunk_id: usize, slab: &mut Slab<V, I>) -> Result<()> {
        let bytes = self
            .reader
            .read_chunk(chunk_id, 0)
            .map_err(MatrixError::Io)?;
        chunk::inflate_into(&bytes, self.layout(chunk_id), slab)
    }

    /// Fetch chunk `chunk_id` through the shared LRU cache (or decode it
    /// directly when the cache budget is zero) and run `with` against it.
    fn with_chunk<T>(&self, chunk_id: usize, solo: &mut Option<Slab<V, I>>, with: impl FnOnce(&Slab<V, I>) -> T) -> Result<T> {
        if self.cache_capacity == 0 {
            let slab = solo.get_or_insert_with(Slab::default);
            self.read_and_inflate(chunk_id, slab)?;
            return Ok(with(slab));
        }
        let cache = self.cache.lock();
        let result = std::cell::RefCell::new(None);
        cache.get_or_insert_with(
            chunk_id,
            Slab::default,
            |id, slab| {
                if let Err(e) = self.read_and_inflate(*id, slab) {
                    // The slab is left however read_and_inflate left it;
                    // the error surfaces to the caller below.
                    *result.borrow_mut() = Some(Err(e));
                }
            },
            |slab| {
                if result.borrow().is_none() {
                    *result.borrow_mut() = Some(Ok(with(slab)));
                }
            },
        );
        result.into_inner().expect("populate or with always set result")
    }
}

fn chunk_sets_for_budget(budget_bytes: u64, chunk_rows: usize, ncol: usize) -> usize {
    let chunk_set_size_in_elements = chunk_rows * ncol;
    let element_size = std::mem::size_of::<u64>().max(1);
    let bytes_per_chunk = (chunk_set_size_in_elements * element_size).max(1) as u64;
    (budget_bytes / bytes_per_chunk).max(1) as usize
}

struct RowDenseExtractor<'a, V, I, R> {
    matrix: &'a CustomChunkedMatrix<V, I, R>,
    selection: Selection<I>,
    oracle: Option<(OracleStream<I>, OracleChunkCache<usize, Slab<V, I>>)>,
    solo: Option<Slab<V, I>>,
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> DenseExtractor<V, I>
    for RowDenseExtractor<'_, V, I, R>
{
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        if i >= self.matrix.nrow {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: self.matrix.nrow,
            });
        }
        let (chunk_id, row_in_chunk) = self.matrix.locate(i);

        let row_in_chunk = if let Some((stream, cache)) = &mut self.oracle {
            let matrix = self.matrix;
            let io_error: std::cell::RefCell<Option<MatrixError>> = std::cell::RefCell::new(None);
            let fetched = cache.next_chunk(
                stream,
                |idx: I| matrix.locate(idx.to_usize().expect("oracle index fits usize")),
                |_slab| {},
                |needed, slots| {
                    for (slot, id) in needed {
                        let slab = slots[*slot].get_or_insert_with(Slab::default);
                        if let Err(e) = matrix.read_and_inflate(*id, slab) {
                            *io_error.borrow_mut() = Some(e);
                        }
                    }
                },
            );
            if let Some(e) = io_error.into_inner() {
                return Err(e);
            }
            let (slab, predicted_offset) = fetched.ok_or_else(|| {
                MatrixError::IncompatibleComposition(
                    "fetch called after the bound oracle stream was exhausted".to_string(),
                )
            })?;
            if predicted_offset != row_in_chunk {
                return Err(MatrixError::IncompatibleComposition(
                    "fetch called out of order for a bound oracle".to_string(),
                ));
            }
            select_dense(slab, row_in_chunk, &self.selection, buffer);
            return Ok(&buffer[..self.selection.len()]);
        } else {
            row_in_chunk
        };

        self.matrix.with_chunk(chunk_id, &mut self.solo, |slab| {
            select_dense(slab, row_in_chunk, &self.selection, buffer);
        })?;
        Ok(&buffer[..self.selection.len()])
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        let capacity = self.matrix.cache_capacity.max(1);
        let max_predictions = capacity * 4;
        self.oracle = Some((
            OracleStream::new(oracle),
            OracleChunkCache::new(capacity, max_predictions),
        ));
    }
}

fn select_dense<V: Value, I: Index>(slab: &Slab<V, I>, row: usize, selection: &Selection<I>, buffer: &mut [V]) {
    match selection {
        Selection::Full { length } => slab.dense_block(row, 0, *length, buffer),
        Selection::Block { start, length } => slab.dense_block(row, *start, *length, buffer),
        Selection::Indices(indices) => {
            let positions: Vec<usize> = indices
                .iter()
                .map(|idx| idx.to_usize().expect("index fits usize"))
                .collect();
            slab.dense_gather(row, &positions, buffer);
        }
    }
}

fn select_sparse<V: Value, I: Index>(
    slab: &Slab<V, I>,
    row: usize,
    selection: &Selection<I>,
    values_out: &mut Vec<V>,
    indices_out: &mut Vec<I>,
) {
    match selection {
        Selection::Full { length } => slab.sparse_block(row, 0, *length, I::zero(), values_out, indices_out),
        Selection::Block { start, length } => {
            slab.sparse_block(row, *start, *length, I::zero(), values_out, indices_out);
        }
        Selection::Indices(indices) => {
            // Arbitrary index selections walk the chunk's dense/sparse row
            // once per requested index; chunk rows are short enough in
            // practice (bounded by chunk_rows * ncol) that this stays cheap
            // relative to the chunk read itself.
            let mut dense = vec![V::zero(); indices.len()];
            let positions: Vec<usize> = indices
                .iter()
                .map(|idx| idx.to_usize().expect("index fits usize"))
                .collect();
            slab.dense_gather(row, &positions, &mut dense);
            for (slot, &value) in dense.iter().enumerate() {
                if !value.is_zero() {
                    values_out.push(value);
                    indices_out.push(indices[slot]);
                }
            }
        }
    }
}

struct RowSparseExtractor<'a, V, I, R> {
    matrix: &'a CustomChunkedMatrix<V, I, R>,
    selection: Selection<I>,
    oracle: Option<OracleStream<I>>,
    solo: Option<Slab<V, I>>,
    values: Vec<V>,
    indices: Vec<I>,
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> SparseExtractor<V, I>
    for RowSparseExtractor<'_, V, I, R>
{
    fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        if i >= self.matrix.nrow {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: self.matrix.nrow,
            });
        }
        if let Some(stream) = &mut self.oracle {
            let predicted = stream.next().map(|v| v.to_usize().expect("index fits usize"));
            if predicted != Some(i) {
                return Err(MatrixError::IncompatibleComposition(
                    "fetch called out of order for a bound oracle".to_string(),
                ));
            }
        }
        let (chunk_id, row_in_chunk) = self.matrix.locate(i);
        self.values.clear();
        self.indices.clear();
        let (values, indices, selection) = (&mut self.values, &mut self.indices, &self.selection);
        self.matrix.with_chunk(chunk_id, &mut self.solo, |slab| {
            select_sparse(slab, row_in_chunk, selection, values, indices);
        })?;
        let count = self.values.len();
        vbuf[..count].copy_from_slice(&self.values);
        ibuf[..count].copy_from_slice(&self.indices);
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.oracle = Some(OracleStream::new(oracle));
    }
}

/// Walks every chunk overlapping the requested row selection to assemble
/// one column's worth of data.
struct ColumnExtractor<'a, V, I, R> {
    matrix: &'a CustomChunkedMatrix<V, I, R>,
    row_selection: Selection<I>,
    solo: Option<Slab<V, I>>,
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> ColumnExtractor<'_, V, I, R> {
    fn rows(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match &self.row_selection {
            Selection::Full { length } => Box::new(0..*length),
            Selection::Block { start, length } => Box::new(*start..*start + *length),
            Selection::Indices(indices) => {
                Box::new(indices.iter().map(|i| i.to_usize().expect("index fits usize")))
            }
        }
    }
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> DenseExtractor<V, I>
    for ColumnExtractor<'_, V, I, R>
{
    fn selection_len(&self) -> usize {
        self.row_selection.len()
    }

    fn fetch<'b>(&'b mut self, col: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        if col >= self.matrix.ncol {
            return Err(MatrixError::OutOfRange {
                index: col,
                axis_length: self.matrix.ncol,
            });
        }
        let len = self.row_selection.len();
        for (slot, row) in self.rows().enumerate() {
            let (chunk_id, row_in_chunk) = self.matrix.locate(row);
            let mut one = [V::zero()];
            self.matrix.with_chunk(chunk_id, &mut self.solo, |slab| {
                slab.dense_block(row_in_chunk, col, 1, &mut one);
            })?;
            buffer[slot] = one[0];
        }
        Ok(&buffer[..len])
    }

    fn set_oracle(&mut self, _oracle: Arc<dyn Oracle<I>>) {
        // The matrix's chunks are row-aligned; prefetching offers no
        // benefit along the column axis, so an oracle bound here is
        // accepted but not consulted.
    }
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> SparseExtractor<V, I>
    for ColumnExtractor<'_, V, I, R>
{
    fn selection_len(&self) -> usize {
        self.row_selection.len()
    }

    fn fetch<'b>(
        &'b mut self,
        col: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        if col >= self.matrix.ncol {
            return Err(MatrixError::OutOfRange {
                index: col,
                axis_length: self.matrix.ncol,
            });
        }
        let mut count = 0usize;
        for (slot, row) in self.rows().enumerate() {
            let (chunk_id, row_in_chunk) = self.matrix.locate(row);
            let mut one = [V::zero()];
            self.matrix.with_chunk(chunk_id, &mut self.solo, |slab| {
                slab.dense_block(row_in_chunk, col, 1, &mut one);
            })?;
            if !one[0].is_zero() {
                vbuf[count] = one[0];
                ibuf[count] = I::from(slot).expect("row slot fits index type");
                count += 1;
            }
        }
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, _oracle: Arc<dyn Oracle<I>>) {}
}

impl<V: Value + Pod, I: Index + Pod, R: ChunkReader<V, I>> Matrix<V, I>
    for CustomChunkedMatrix<V, I, R>
{
    fn nrow(&self) -> usize {
        self.nrow
    }

    fn ncol(&self) -> usize {
        self.ncol
    }

    fn sparse(&self) -> bool {
        self.sparse
    }

    fn prefer_rows(&self) -> bool {
        true
    }

    fn uses_oracle(&self, row: bool) -> bool {
        row && self.cache_capacity > 0
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        Box::new(RowDenseExtractor {
            matrix: self,
            selection,
            oracle: None,
            solo: None,
        })
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        Box::new(ColumnExtractor {
            matrix: self,
            row_selection: selection,
            solo: None,
        })
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        Box::new(RowSparseExtractor {
            matrix: self,
            selection,
            oracle: None,
            solo: None,
            values: Vec::new(),
            indices: Vec::new(),
        })
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        Box::new(ColumnExtractor {
            matrix: self,
            row_selection: selection,
            solo: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChunkReadError;
    use crate::oracle::ConsecutiveOracle;
    use std::borrow::Cow;

    /// Hands back pre-baked dense rows, `chunk_rows` rows at a time, and
    /// counts how many times each chunk was actually read.
    struct VecChunkReader {
        data: Vec<f64>,
        ncol: usize,
        chunk_rows: usize,
        reads: Mutex<Vec<usize>>,
    }

    impl VecChunkReader {
        fn new(data: Vec<f64>, ncol: usize, chunk_rows: usize) -> Self {
            let nrow = data.len() / ncol;
            Self {
                data,
                ncol,
                chunk_rows,
                reads: Mutex::new(vec![0; nrow.div_ceil(chunk_rows)]),
            }
        }
    }

    impl ChunkReader<f64, u32> for VecChunkReader {
        fn read_chunk(
            &self,
            chunk_row: usize,
            _chunk_col: usize,
        ) -> std::result::Result<Cow<'static, [u8]>, ChunkReadError> {
            self.reads.lock()[chunk_row] += 1;
            let start = chunk_row * self.chunk_rows * self.ncol;
            let nrow = self.data.len() / self.ncol;
            let rows_here = (nrow - chunk_row * self.chunk_rows).min(self.chunk_rows);
            let end = start + rows_here * self.ncol;
            Ok(Cow::Owned(
                bytemuck::cast_slice(&self.data[start..end]).to_vec(),
            ))
        }
    }

    #[test]
    fn dense_row_reads_match_chunk_data() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect(); // 4 rows x 3 cols
        let reader = VecChunkReader::new(data, 3, 2);
        let matrix =
            CustomChunkedMatrix::<f64, u32, _>::with_cache_capacity(reader, 4, 3, 2, false, 4)
                .unwrap();
        let mut extractor = matrix.dense_row(Selection::Full { length: 3 });
        let mut buf = [0.0; 3];
        assert_eq!(extractor.fetch(0, &mut buf).unwrap(), &[0.0, 1.0, 2.0]);
        assert_eq!(extractor.fetch(3, &mut buf).unwrap(), &[9.0, 10.0, 11.0]);
    }

    #[test]
    fn repeated_row_fetch_reuses_cached_chunk() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let reader = VecChunkReader::new(data, 3, 2);
        let matrix =
            CustomChunkedMatrix::<f64, u32, _>::with_cache_capacity(reader, 4, 3, 2, false, 4)
                .unwrap();
        let mut extractor = matrix.dense_row(Selection::Full { length: 3 });
        let mut buf = [0.0; 3];
        extractor.fetch(0, &mut buf).unwrap();
        extractor.fetch(1, &mut buf).unwrap();
        assert_eq!(matrix.reader.reads.lock()[0], 1);
    }

    #[test]
    fn zero_capacity_cache_reads_every_fetch() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let reader = VecChunkReader::new(data, 3, 2);
        let matrix =
            CustomChunkedMatrix::<f64, u32, _>::with_cache_capacity(reader, 4, 3, 2, false, 0)
                .unwrap();
        let mut extractor = matrix.dense_row(Selection::Full { length: 3 });
        let mut buf = [0.0; 3];
        extractor.fetch(0, &mut buf).unwrap();
        extractor.fetch(1, &mut buf).unwrap();
        assert_eq!(matrix.reader.reads.lock()[0], 2);
    }

    #[test]
    fn column_extraction_gathers_across_chunks() {
        // rows: [0,1,2] [3,4,5] [6,7,8] [9,10,11], chunked 2 rows at a time
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let reader = VecChunkReader::new(data, 3, 2);
        let matrix =
            CustomChunkedMatrix::<f64, u32, _>::with_cache_capacity(reader, 4, 3, 2, false, 4)
                .unwrap();
        let mut extractor = matrix.dense_column(Selection::Full { length: 4 });
        let mut buf = [0.0; 4];
        let out = extractor.fetch(1, &mut buf).unwrap();
        assert_eq!(out, &[1.0, 4.0, 7.0, 10.0]);
    }

    #[test]
    fn oracle_bound_fetch_validates_order() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let reader = VecChunkReader::new(data, 3, 2);
        let matrix =
            CustomChunkedMatrix::<f64, u32, _>::with_cache_capacity(reader, 4, 3, 2, false, 2)
                .unwrap();
        let mut extractor = matrix.dense_row(Selection::Full { length: 3 });
        extractor.set_oracle(Arc::new(ConsecutiveOracle::<u32>::new(0, 4)));
        let mut buf = [0.0; 3];
        assert_eq!(extractor.fetch(0, &mut buf).unwrap(), &[0.0, 1.0, 2.0]);
        let err = extractor.fetch(2, &mut buf).unwrap_err();
        assert!(matches!(err, MatrixError::IncompatibleComposition(_)));
    }

    #[test]
    fn oracle_prefetch_batches_chunk_reads() {
        let data: Vec<f64> = (0..12).map(|x| x as f64).collect();
        let reader = VecChunkReader::new(data, 3, 2);
        let matrix =
            CustomChunkedMatrix::<f64, u32, _>::with_cache_capacity(reader, 4, 3, 2, false, 2)
                .unwrap();
        let mut extractor = matrix.dense_row(Selection::Full { length: 3 });
        extractor.set_oracle(Arc::new(ConsecutiveOracle::<u32>::new(0, 4)));
        let mut buf = [0.0; 3];
        for row in 0..4 {
            extractor.fetch(row, &mut buf).unwrap();
        }
        let total_reads: usize = matrix.reader.reads.lock().iter().sum();
        assert_eq!(total_reads, 2);
    }
}
