//! §4.J: an LRU cache over whole chunks, reusing the evicted entry's
//! allocation for the incoming chunk rather than freeing and reallocating.
//!
//! Grounded on the teacher's [`lru`](https://docs.rs/lru)-backed
//! `ChunkCacheLruChunks` (`src/array/chunk_cache/chunk_cache_lru_chunks.rs`),
//! which wraps `lru::LruCache` behind a `retrieve`/`insert` pair under a
//! mutex. This cache keeps that crate and locking strategy but exposes a
//! single `get_or_insert_with` entry point so the evicted slab's buffers can
//! be fed straight back into the populate step instead of being dropped.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// An LRU cache over chunk identifiers, keyed by `Id`, caching reusable
/// slabs of type `S`.
pub struct LruChunkCache<Id: Hash + Eq, S> {
    inner: Mutex<LruCache<Id, S>>,
}

impl<Id: Hash + Eq + Clone, S> LruChunkCache<Id, S> {
    /// Build a cache holding at most `capacity` chunks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fetch the slab for `id`, creating and populating it on a miss.
    ///
    /// On a hit, `id` is promoted to most-recently-used and `with` runs
    /// against the cached slab. On a miss: if the cache has spare capacity,
    /// `create` builds a fresh slab; otherwise the least-recently-used
    /// entry is evicted and its allocation handed to `populate` for reuse.
    /// Either way `populate(id, slab)` fills the slab's contents before
    /// `with` runs against it.
    pub fn get_or_insert_with<T>(
        &self,
        id: Id,
        create: impl FnOnce() -> S,
        populate: impl FnOnce(&Id, &mut S),
        with: impl FnOnce(&S) -> T,
    ) -> T {
        let mut guard = self.inner.lock();
        if let Some(slab) = guard.get(&id) {
            return with(slab);
        }

        let mut slab = if guard.len() < guard.cap().get() {
            create()
        } else {
            let (_, evicted) = guard
                .pop_lru()
                .expect("cache at capacity must hold at least one entry");
            evicted
        };
        populate(&id, &mut slab);
        guard.put(id.clone(), slab);
        let cached = guard.get(&id).expect("just inserted");
        with(cached)
    }

    /// Number of chunks currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
