//! Index remapping wrappers: [`DelayedSubset`] (arbitrary, possibly
//! unordered or repeating index vector) and [`DelayedSubsetBlock`] (the
//! specialised contiguous-range case).

use std::marker::PhantomData;
use std::sync::Arc;

use num::{NumCast, ToPrimitive};

use crate::error::{MatrixError, Result};
use crate::matrix::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};
use crate::oracle::Oracle;
use crate::sparse_range::SparseRange;

/// A maximal run of consecutive original-axis positions contributing a
/// contiguous segment of a gathered extraction's output.
struct Run {
    orig_start: usize,
    len: usize,
    out_offset: usize,
}

/// Expand `selection` (interpreted over subset-position space) through
/// `indices` into the ordered sequence of original-axis positions it
/// denotes, then partition that sequence into maximal runs of consecutive
/// original positions.
fn detect_runs<I: Index>(indices: &[I], selection: &Selection<I>) -> Vec<Run> {
    let original: Vec<usize> = match selection {
        Selection::Full { .. } => indices
            .iter()
            .map(|v| v.to_usize().expect("index fits in usize"))
            .collect(),
        Selection::Block { start, length } => indices[*start..*start + *length]
            .iter()
            .map(|v| v.to_usize().expect("index fits in usize"))
            .collect(),
        Selection::Indices(sel) => sel
            .iter()
            .map(|p| indices[p.to_usize().expect("index fits in usize")])
            .map(|v| v.to_usize().expect("index fits in usize"))
            .collect(),
    };

    let mut runs = Vec::new();
    let mut iter = original.into_iter();
    if let Some(first) = iter.next() {
        let mut run_start = first;
        let mut run_len = 1usize;
        let mut out_offset = 0usize;
        let mut prev = first;
        for value in iter {
            if value == prev + 1 {
                run_len += 1;
            } else {
                runs.push(Run {
                    orig_start: run_start,
                    len: run_len,
                    out_offset,
                });
                out_offset += run_len;
                run_start = value;
                run_len = 1;
            }
            prev = value;
        }
        runs.push(Run {
            orig_start: run_start,
            len: run_len,
            out_offset,
        });
    }
    runs
}

/// Wraps a child matrix with an index vector along one axis (`axis_rows`),
/// which may be unordered or contain duplicates.
///
/// On the subsetted axis, `fetch(i, ...)` forwards to the child at
/// `indices[i]`. On the other axis, the extractor gathers: it detects
/// maximal runs of consecutive original-axis positions within the bound
/// selection and issues one child fetch per run, concatenating the
/// results (shifting reported sparse indices back into subset-relative
/// coordinates).
pub struct DelayedSubset<V, I, M> {
    child: Arc<M>,
    indices: Arc<[I]>,
    axis_rows: bool,
    _marker: PhantomData<fn() -> V>,
}

impl<V: Value, I: Index, M: Matrix<V, I>> DelayedSubset<V, I, M> {
    /// Wrap `child`, subsetting its row axis (if `axis_rows`) or column axis
    /// by `indices`.
    #[must_use]
    pub fn new(child: Arc<M>, indices: impl Into<Arc<[I]>>, axis_rows: bool) -> Self {
        Self {
            child,
            indices: indices.into(),
            axis_rows,
            _marker: PhantomData,
        }
    }

    fn subsetted_len(&self) -> usize {
        self.indices.len()
    }
}

struct SubsettedDenseExtractor<'a, V, I> {
    inner: Box<dyn DenseExtractor<V, I> + 'a>,
    indices: &'a [I],
}

impl<V: Value, I: Index> DenseExtractor<V, I> for SubsettedDenseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        if i >= self.indices.len() {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: self.indices.len(),
            });
        }
        let orig = self.indices[i].to_usize().expect("index fits in usize");
        self.inner.fetch(orig, buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

struct SubsettedSparseExtractor<'a, V, I> {
    inner: Box<dyn SparseExtractor<V, I> + 'a>,
    indices: &'a [I],
}

impl<V: Value, I: Index> SparseExtractor<V, I> for SubsettedSparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        if i >= self.indices.len() {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: self.indices.len(),
            });
        }
        let orig = self.indices[i].to_usize().expect("index fits in usize");
        self.inner.fetch(orig, vbuf, ibuf)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

/// A gathering dense extractor: one child sub-extractor per maximal run,
/// concatenated into the caller's buffer.
struct GatherDenseExtractor<'a, V, I> {
    runs: Vec<(Run, Box<dyn DenseExtractor<V, I> + 'a>)>,
}

impl<V: Value, I: Index> DenseExtractor<V, I> for GatherDenseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.runs.iter().map(|(run, _)| run.len).sum()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        for (run, extractor) in &mut self.runs {
            let target = &mut buffer[run.out_offset..run.out_offset + run.len];
            let target_ptr = target.as_ptr();
            let fetched = extractor.fetch(i, target)?;
            if !core::ptr::eq(fetched.as_ptr(), target_ptr) {
                target.copy_from_slice(fetched);
            }
        }
        Ok(buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        for (_, extractor) in &mut self.runs {
            extractor.set_oracle(oracle.clone());
        }
    }
}

/// A gathering sparse extractor: one child sub-extractor per maximal run,
/// with reported indices shifted into subset-relative coordinates.
struct GatherSparseExtractor<'a, V, I> {
    runs: Vec<(Run, Box<dyn SparseExtractor<V, I> + 'a>)>,
    run_vbuf: Vec<V>,
    run_ibuf: Vec<I>,
}

impl<V: Value, I: Index> SparseExtractor<V, I> for GatherSparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.runs.iter().map(|(run, _)| run.len).sum()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        let mut count = 0;
        for (run, extractor) in &mut self.runs {
            let range = extractor.fetch(i, &mut self.run_vbuf[..run.len], &mut self.run_ibuf[..run.len])?;
            let (values, indices) = range.into_parts();
            let offset = I::from(run.out_offset).expect("run offset fits index type");
            for (&value, &idx) in values.iter().zip(indices.iter()) {
                vbuf[count] = value;
                ibuf[count] = idx + offset;
                count += 1;
            }
        }
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        for (_, extractor) in &mut self.runs {
            extractor.set_oracle(oracle.clone());
        }
    }
}

impl<V: Value, I: Index, M: Matrix<V, I>> Matrix<V, I> for DelayedSubset<V, I, M> {
    fn nrow(&self) -> usize {
        if self.axis_rows {
            self.subsetted_len()
        } else {
            self.child.nrow()
        }
    }

    fn ncol(&self) -> usize {
        if self.axis_rows {
            self.child.ncol()
        } else {
            self.subsetted_len()
        }
    }

    fn sparse(&self) -> bool {
        self.child.sparse()
    }

    fn prefer_rows(&self) -> bool {
        self.child.prefer_rows()
    }

    fn uses_oracle(&self, row: bool) -> bool {
        self.child.uses_oracle(row)
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.axis_rows {
            Box::new(SubsettedDenseExtractor {
                inner: self.child.dense_row(selection),
                indices: &self.indices,
            })
        } else {
            let runs = detect_runs(&self.indices, &selection)
                .into_iter()
                .map(|run| {
                    let extractor = self.child.dense_row(Selection::Block {
                        start: run.orig_start,
                        length: run.len,
                    });
                    (run, extractor)
                })
                .collect();
            Box::new(GatherDenseExtractor { runs })
        }
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.axis_rows {
            let runs = detect_runs(&self.indices, &selection)
                .into_iter()
                .map(|run| {
                    let extractor = self.child.dense_column(Selection::Block {
                        start: run.orig_start,
                        length: run.len,
                    });
                    (run, extractor)
                })
                .collect();
            Box::new(GatherDenseExtractor { runs })
        } else {
            Box::new(SubsettedDenseExtractor {
                inner: self.child.dense_column(selection),
                indices: &self.indices,
            })
        }
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.axis_rows {
            Box::new(SubsettedSparseExtractor {
                inner: self.child.sparse_row(selection),
                indices: &self.indices,
            })
        } else {
            let runs: Vec<(Run, Box<dyn SparseExtractor<V, I> + 'a>)> =
                detect_runs(&self.indices, &selection)
                    .into_iter()
                    .map(|run| {
                        let extractor = self.child.sparse_row(Selection::Block {
                            start: run.orig_start,
                            length: run.len,
                        });
                        (run, extractor)
                    })
                    .collect();
            let max_run = runs.iter().map(|(run, _)| run.len).max().unwrap_or(0);
            Box::new(GatherSparseExtractor {
                runs,
                run_vbuf: vec![V::zero(); max_run],
                run_ibuf: vec![I::zero(); max_run],
            })
        }
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.axis_rows {
            let runs: Vec<(Run, Box<dyn SparseExtractor<V, I> + 'a>)> =
                detect_runs(&self.indices, &selection)
                    .into_iter()
                    .map(|run| {
                        let extractor = self.child.sparse_column(Selection::Block {
                            start: run.orig_start,
                            length: run.len,
                        });
                        (run, extractor)
                    })
                    .collect();
            let max_run = runs.iter().map(|(run, _)| run.len).max().unwrap_or(0);
            Box::new(GatherSparseExtractor {
                runs,
                run_vbuf: vec![V::zero(); max_run],
                run_ibuf: vec![I::zero(); max_run],
            })
        } else {
            Box::new(SubsettedSparseExtractor {
                inner: self.child.sparse_column(selection),
                indices: &self.indices,
            })
        }
    }
}

struct ShiftedDenseExtractor<'a, V, I> {
    inner: Box<dyn DenseExtractor<V, I> + 'a>,
    shift: usize,
    axis_len: usize,
}

impl<V: Value, I: Index> DenseExtractor<V, I> for ShiftedDenseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [V]) -> Result<&'b [V]> {
        if i >= self.axis_len {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: self.axis_len,
            });
        }
        self.inner.fetch(self.shift + i, buffer)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

struct ShiftedSparseExtractor<'a, V, I> {
    inner: Box<dyn SparseExtractor<V, I> + 'a>,
    shift: usize,
    axis_len: usize,
}

impl<V: Value, I: Index> SparseExtractor<V, I> for ShiftedSparseExtractor<'_, V, I> {
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [V],
        ibuf: &'b mut [I],
    ) -> Result<SparseRange<'b, V, I>> {
        if i >= self.axis_len {
            return Err(MatrixError::OutOfRange {
                index: i,
                axis_length: self.axis_len,
            });
        }
        self.inner.fetch(self.shift + i, vbuf, ibuf)
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<I>>) {
        self.inner.set_oracle(oracle);
    }
}

/// The specialised contiguous-range case of [`DelayedSubset`]: a single
/// `[orig_start, orig_start + length)` window of the child, forwarded with
/// an offset shift rather than a general gather.
pub struct DelayedSubsetBlock<V, I, M> {
    child: Arc<M>,
    orig_start: usize,
    length: usize,
    axis_rows: bool,
    _marker: PhantomData<fn() -> (V, I)>,
}

impl<V: Value, I: Index, M: Matrix<V, I>> DelayedSubsetBlock<V, I, M> {
    /// Wrap `child`, restricting its row axis (if `axis_rows`) or column
    /// axis to `[orig_start, orig_start + length)`.
    #[must_use]
    pub fn new(child: Arc<M>, orig_start: usize, length: usize, axis_rows: bool) -> Self {
        Self {
            child,
            orig_start,
            length,
            axis_rows,
            _marker: PhantomData,
        }
    }

    fn shift_selection(&self, selection: Selection<I>) -> Selection<I> {
        match selection {
            Selection::Full { length } => Selection::Block {
                start: self.orig_start,
                length,
            },
            Selection::Block { start, length } => Selection::Block {
                start: self.orig_start + start,
                length,
            },
            Selection::Indices(indices) => {
                let shift = I::from(self.orig_start).expect("block start fits index type");
                Selection::Indices(indices.iter().map(|&idx| idx + shift).collect())
            }
        }
    }
}

impl<V: Value, I: Index, M: Matrix<V, I>> Matrix<V, I> for DelayedSubsetBlock<V, I, M> {
    fn nrow(&self) -> usize {
        if self.axis_rows {
            self.length
        } else {
            self.child.nrow()
        }
    }

    fn ncol(&self) -> usize {
        if self.axis_rows {
            self.child.ncol()
        } else {
            self.length
        }
    }

    fn sparse(&self) -> bool {
        self.child.sparse()
    }

    fn prefer_rows(&self) -> bool {
        self.child.prefer_rows()
    }

    fn uses_oracle(&self, row: bool) -> bool {
        self.child.uses_oracle(row)
    }

    fn dense_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.axis_rows {
            Box::new(ShiftedDenseExtractor {
                inner: self.child.dense_row(selection),
                shift: self.orig_start,
                axis_len: self.length,
            })
        } else {
            self.child.dense_row(self.shift_selection(selection))
        }
    }

    fn dense_column<'a>(&'a self, selection: Selection<I>) -> Box<dyn DenseExtractor<V, I> + 'a> {
        if self.axis_rows {
            self.child.dense_column(self.shift_selection(selection))
        } else {
            Box::new(ShiftedDenseExtractor {
                inner: self.child.dense_column(selection),
                shift: self.orig_start,
                axis_len: self.length,
            })
        }
    }

    fn sparse_row<'a>(&'a self, selection: Selection<I>) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.axis_rows {
            Box::new(ShiftedSparseExtractor {
                inner: self.child.sparse_row(selection),
                shift: self.orig_start,
                axis_len: self.length,
            })
        } else {
            self.child.sparse_row(self.shift_selection(selection))
        }
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<I>,
    ) -> Box<dyn SparseExtractor<V, I> + 'a> {
        if self.axis_rows {
            self.child.sparse_column(self.shift_selection(selection))
        } else {
            Box::new(ShiftedSparseExtractor {
                inner: self.child.sparse_column(selection),
                shift: self.orig_start,
                axis_len: self.length,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::dense::{DenseMatrix, StorageOrder};

    fn sample() -> Arc<DenseMatrix<f64>> {
        Arc::new(
            DenseMatrix::new(
                vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0],
                3,
                4,
                StorageOrder::RowMajor,
            )
            .unwrap(),
        )
    }

    #[test]
    fn subsetted_axis_forwards_with_remapped_index() {
        let child = sample();
        let subset = DelayedSubset::new(child, vec![2u32, 0, 2], true);
        assert_eq!(subset.nrow(), 3);
        assert_eq!(subset.ncol(), 4);
        let mut extractor = subset.dense_row(Selection::Full { length: 4 });
        let mut buffer = [0.0; 4];
        let out = extractor.fetch(1, &mut buffer).unwrap();
        assert_eq!(out, &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn other_axis_gathers_with_duplicates() {
        let child = sample();
        let subset = DelayedSubset::new(child, vec![2u32, 0, 2], true);
        let mut extractor = subset.dense_column(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        let out = extractor.fetch(1, &mut buffer).unwrap();
        assert_eq!(out, &[10.0, 2.0, 10.0]);
    }

    #[test]
    fn gather_detects_consecutive_runs() {
        let child = sample();
        // indices [0,1,2] form one run: a single child fetch, not three.
        let subset = DelayedSubset::new(child, vec![0u32, 1, 2], true);
        let mut extractor = subset.dense_column(Selection::Full { length: 3 });
        let mut buffer = [0.0; 3];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[1.0, 5.0, 9.0]);
    }

    #[test]
    fn subset_block_shifts_without_gathering() {
        let child = sample();
        let block = DelayedSubsetBlock::new(child, 1, 2, true);
        assert_eq!(block.nrow(), 2);
        let mut extractor = block.dense_row(Selection::Full { length: 4 });
        let mut buffer = [0.0; 4];
        let out = extractor.fetch(0, &mut buffer).unwrap();
        assert_eq!(out, &[5.0, 6.0, 7.0, 8.0]);
    }
}
