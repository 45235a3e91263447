//! Value/index type conversion, applied by copying on extraction.

use std::marker::PhantomData;
use std::sync::Arc;

use num::{NumCast, ToPrimitive};

use crate::error::Result;
use crate::matrix::{DenseExtractor, Index, Matrix, Selection, SparseExtractor, Value};
use crate::oracle::Oracle;
use crate::sparse_range::SparseRange;

/// Convert a `Selection` expressed in the exposed index type `IOut` into the
/// equivalent selection over the child's index type `IIn`.
fn cast_selection<IIn: Index, IOut: Index>(selection: &Selection<IOut>) -> Selection<IIn> {
    match selection {
        Selection::Full { length } => Selection::Full { length: *length },
        Selection::Block { start, length } => Selection::Block {
            start: *start,
            length: *length,
        },
        Selection::Indices(indices) => Selection::Indices(
            indices
                .iter()
                .map(|idx| IIn::from(*idx).expect("index value fits the child index type"))
                .collect(),
        ),
    }
}

/// Wraps a child matrix, converting its value type `VIn` and index type
/// `IIn` to the exposed `VOut`/`IOut` on every extraction.
///
/// Conversion never fails silently: out-of-range casts panic via
/// [`NumCast::from`]'s `expect`, matching the crate's treatment of
/// extraction contract violations as fatal (§7 of the design: casts between
/// incompatible numeric ranges are a construction/usage error, not a
/// recoverable one).
pub struct DelayedCast<VIn, IIn, VOut, IOut, M> {
    child: Arc<M>,
    _marker: PhantomData<fn() -> (VIn, IIn, VOut, IOut)>,
}

impl<VIn: Value + ToPrimitive, IIn: Index, VOut: Value + NumCast, IOut: Index, M: Matrix<VIn, IIn>>
    DelayedCast<VIn, IIn, VOut, IOut, M>
{
    /// Wrap `child`, exposing its values and indices as `VOut`/`IOut`.
    #[must_use]
    pub fn new(child: Arc<M>) -> Self {
        Self {
            child,
            _marker: PhantomData,
        }
    }
}

struct CastDenseExtractor<'a, VIn, IIn, VOut, IOut> {
    inner: Box<dyn DenseExtractor<VIn, IIn> + 'a>,
    scratch: Vec<VIn>,
    _marker: PhantomData<fn() -> (VOut, IOut)>,
}

impl<VIn: Value + ToPrimitive, IIn: Index, VOut: Value + NumCast, IOut: Index> DenseExtractor<VOut, IOut>
    for CastDenseExtractor<'_, VIn, IIn, VOut, IOut>
{
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(&'b mut self, i: usize, buffer: &'b mut [VOut]) -> Result<&'b [VOut]> {
        let fetched = self.inner.fetch(i, &mut self.scratch)?;
        for (out, &value) in buffer.iter_mut().zip(fetched.iter()) {
            *out = VOut::from(value).expect("value fits the exposed value type");
        }
        Ok(&buffer[..fetched.len()])
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<IOut>>) {
        self.inner.set_oracle(Arc::new(CastOracle {
            inner: oracle,
            _marker: PhantomData,
        }));
    }
}

struct CastSparseExtractor<'a, VIn, IIn, VOut, IOut> {
    inner: Box<dyn SparseExtractor<VIn, IIn> + 'a>,
    vscratch: Vec<VIn>,
    iscratch: Vec<IIn>,
    _marker: PhantomData<fn() -> (VOut, IOut)>,
}

impl<VIn: Value + ToPrimitive, IIn: Index, VOut: Value + NumCast, IOut: Index> SparseExtractor<VOut, IOut>
    for CastSparseExtractor<'_, VIn, IIn, VOut, IOut>
{
    fn selection_len(&self) -> usize {
        self.inner.selection_len()
    }

    fn fetch<'b>(
        &'b mut self,
        i: usize,
        vbuf: &'b mut [VOut],
        ibuf: &'b mut [IOut],
    ) -> Result<SparseRange<'b, VOut, IOut>> {
        let range = self.inner.fetch(i, &mut self.vscratch, &mut self.iscratch)?;
        let count = range.len();
        let (values, indices) = range.into_parts();
        for (out, &value) in vbuf.iter_mut().zip(values.iter()) {
            *out = VOut::from(value).expect("value fits the exposed value type");
        }
        for (out, &idx) in ibuf.iter_mut().zip(indices.iter()) {
            *out = IOut::from(idx).expect("index fits the exposed index type");
        }
        Ok(SparseRange::new(&vbuf[..count], &ibuf[..count]))
    }

    fn set_oracle(&mut self, oracle: Arc<dyn Oracle<IOut>>) {
        self.inner.set_oracle(Arc::new(CastOracle {
            inner: oracle,
            _marker: PhantomData,
        }));
    }
}

/// Adapts an `Oracle<IOut>` (the exposed index type) into an `Oracle<IIn>`
/// (the child's index type) so `set_oracle` can forward through a cast.
struct CastOracle<IIn, IOut> {
    inner: Arc<dyn Oracle<IOut>>,
    _marker: PhantomData<fn() -> IIn>,
}

impl<IIn: Index, IOut: Index> Oracle<IIn> for CastOracle<IIn, IOut> {
    fn total(&self) -> usize {
        self.inner.total()
    }

    fn get(&self, i: usize) -> IIn {
        IIn::from(self.inner.get(i)).expect("oracle index fits the child index type")
    }
}

impl<VIn: Value + ToPrimitive, IIn: Index, VOut: Value + NumCast, IOut: Index, M: Matrix<VIn, IIn>> Matrix<VOut, IOut>
    for DelayedCast<VIn, IIn, VOut, IOut, M>
{
    fn nrow(&self) -> usize {
        self.child.nrow()
    }

    fn ncol(&self) -> usize {
        self.child.ncol()
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

    fn dense_row<'a>(&'a self, selection: Selection<IOut>) -> Box<dyn DenseExtractor<VOut, IOut> + 'a> {
        let len = selection.len();
        let inner = self.child.dense_row(cast_selection(&selection));
        Box::new(CastDenseExtractor {
            inner,
            scratch: vec![VIn::zero(); len],
            _marker: PhantomData,
        })
    }

    fn dense_column<'a>(
        &'a self,
        selection: Selection<IOut>,
    ) -> Box<dyn DenseExtractor<VOut, IOut> + 'a> {
        let len = selection.len();
        let inner = self.child.dense_column(cast_selection(&selection));
        Box::new(CastDenseExtractor {
            inner,
            scratch: vec![VIn::zero(); len],
            _marker: PhantomData,
        })
    }

    fn sparse_row<'a>(
        &'a self,
        selection: Selection<IOut>,
    ) -> Box<dyn SparseExtractor<VOut, IOut> + 'a> {
        let len = selection.len();
        let inner = self.child.sparse_row(cast_selection(&selection));
        Box::new(CastSparseExtractor {
            inner,
            vscratch: vec![VIn::zero(); len],
            iscratch: vec![IIn::zero(); len],
            _marker: PhantomData,
        })
    }

    fn sparse_column<'a>(
        &'a self,
        selection: Selection<IOut>,
    ) -> Box<dyn SparseExtractor<VOut, IOut> + 'a> {
        let len = selection.len();
        let inner = self.child.sparse_column(cast_selection(&selection));
        Box::new(CastSparseExtractor {
            inner,
            vscratch: vec![VIn::zero(); len],
            iscratch: vec![IIn::zero(); len],
            _marker: PhantomData,
        })
    }
}
