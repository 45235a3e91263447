//! Concurrency utilities.
//!
//! The crate never spawns threads itself (see the concurrency model in the
//! module-level docs of [`matrix`](crate::matrix)): parallelism is achieved
//! by constructing multiple independent extractors from the same matrix and
//! driving them on separate threads. [`par_for_each_extractor`] is a
//! convenience helper for doing exactly that with a bounded worker count.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon_iter_concurrent_limit::iter_concurrent_limit;

use crate::config::global_config;

/// The recommended concurrency for a task, expressed as an inclusive-exclusive
/// range between the most efficient and the maximum useful concurrency.
#[derive(Debug, Clone)]
pub struct RecommendedConcurrency {
    range: std::ops::Range<usize>,
}

impl RecommendedConcurrency {
    /// Create a new recommended concurrency with an explicit range.
    ///
    /// A minimum concurrency of zero is interpreted as a minimum of one.
    #[must_use]
    pub fn new(range: impl std::ops::RangeBounds<usize>) -> Self {
        let start = match range.start_bound() {
            std::ops::Bound::Included(start) => *start,
            std::ops::Bound::Excluded(start) => start.saturating_add(1),
            std::ops::Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            std::ops::Bound::Excluded(end) => *end,
            std::ops::Bound::Included(end) => end.saturating_add(1),
            std::ops::Bound::Unbounded => usize::MAX,
        };
        Self {
            range: start.max(1)..end.max(1),
        }
    }

    /// Create a recommended concurrency with a minimum and unbounded maximum.
    #[must_use]
    pub fn new_minimum(minimum: usize) -> Self {
        Self::new(minimum..)
    }

    /// Create a recommended concurrency with a bounded maximum.
    #[must_use]
    pub fn new_maximum(maximum: usize) -> Self {
        Self::new(..maximum)
    }

    /// The minimum recommended concurrency.
    #[must_use]
    pub fn min(&self) -> usize {
        self.range.start
    }

    /// The maximum recommended concurrency.
    #[must_use]
    pub fn max(&self) -> usize {
        self.range.end
    }
}

/// Caps the number of worker threads used for `num_tasks` independent tasks
/// at the current [`rayon`] global pool size, never exceeding `num_tasks`.
#[must_use]
pub fn recommended_concurrency(num_tasks: usize) -> usize {
    std::cmp::min(num_tasks, rayon::current_num_threads()).max(1)
}

/// Run `f` once per item of `items`, using up to `recommended_concurrency`
/// threads when `items.len()` is at or above
/// [`Config::concurrency_chunk_threshold`](crate::config::Config::concurrency_chunk_threshold),
/// and sequentially otherwise. Collects the first error encountered, if any.
///
/// This is the mechanism behind the concurrency model's "construct
/// independent extractors and run them on separate threads": callers build
/// one extractor per item inside `f` and extract from it there, so each
/// thread owns its own extractor and workspace.
///
/// # Errors
/// Returns the first `Err` produced by `f`, if any.
pub fn par_for_each_extractor<T, E, F>(items: &[T], f: F) -> Result<(), E>
where
    T: Sync,
    E: Send,
    F: Fn(&T) -> Result<(), E> + Sync + Send,
{
    let threshold = global_config().concurrency_chunk_threshold();
    if items.len() < threshold {
        for item in items {
            f(item)?;
        }
        return Ok(());
    }

    let concurrency = recommended_concurrency(items.len());
    iter_concurrent_limit!(concurrency, items, try_for_each, |item| f(item))
}

/// Calculate the outer and inner concurrent limits given a concurrency
/// target and the recommended concurrency of each nesting level. Returns
/// `(outer, inner)`.
#[must_use]
pub fn calc_concurrency_outer_inner(
    concurrency_target: usize,
    recommended_outer: &RecommendedConcurrency,
    recommended_inner: &RecommendedConcurrency,
) -> (usize, usize) {
    let mut concurrency_inner = recommended_inner.min();
    let mut concurrency_outer = recommended_outer.min();

    if concurrency_inner * concurrency_outer < concurrency_target {
        concurrency_inner = std::cmp::min(
            concurrency_target.div_ceil(concurrency_outer),
            recommended_inner.max(),
        );
    }

    if concurrency_inner * concurrency_outer < concurrency_target {
        concurrency_outer = std::cmp::min(
            concurrency_target.div_ceil(concurrency_inner),
            recommended_outer.max(),
        );
    }

    (concurrency_outer, concurrency_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_limits() {
        let target = 32;

        let (self_limit, inner_limit) = calc_concurrency_outer_inner(
            target,
            &RecommendedConcurrency::new_minimum(24),
            &RecommendedConcurrency::new_maximum(1),
        );
        assert_eq!((self_limit, inner_limit), (32, 1));

        let (self_limit, inner_limit) = calc_concurrency_outer_inner(
            target,
            &RecommendedConcurrency::new_minimum(24),
            &RecommendedConcurrency::new(4..8),
        );
        assert_eq!((self_limit, inner_limit), (24, 4));
    }

    #[test]
    fn par_for_each_extractor_collects_first_error() {
        let items = vec![1, 2, 3, 4, 5, 6];
        let result: Result<(), String> = par_for_each_extractor(&items, |i| {
            if *i == 4 {
                Err(format!("bad item {i}"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn par_for_each_extractor_runs_all_on_success() {
        let items: Vec<usize> = (0..10).collect();
        let sum = std::sync::atomic::AtomicUsize::new(0);
        par_for_each_extractor(&items, |i| -> Result<(), ()> {
            sum.fetch_add(*i, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert_eq!(sum.load(std::sync::atomic::Ordering::SeqCst), 45);
    }
}
