//! §4.L: an oracle-driven chunk cache that prefetches a batch of chunks
//! ahead of the current read position in one pass, reusing slab allocations
//! from both the outgoing generation and this generation's own repeats.
//!
//! There are two generations of slots, `cur` (serving reads now) and `nxt`
//! (being filled for the upcoming batch). When a chunk the oracle predicts
//! is already resident in `cur`, its slab moves into `nxt` by a plain swap
//! instead of a fresh read; once `nxt` is fully populated the generations
//! swap and the cycle repeats. This keeps I/O batched to at most one
//! `populate` call per `capacity` predicted chunks, rather than one call per
//! individual fetch (spec §8's `ceil(N/K) * K` I/O bound).
//!
//! Unlike §4.J's whole-chunk LRU cache (grounded directly on the teacher's
//! `ChunkCacheLruChunks`), this cache's generation-swap scheme has no direct
//! teacher analogue — zarrs does not prefetch against a declared access
//! order — so it is built from the oracle primitives in
//! [`crate::oracle`] plus the same reuse-the-old-allocation discipline as
//! the LRU cache. Slabs here are allocated independently per slot rather
//! than sharing one contiguous buffer; a shared-buffer variant would save
//! an allocation per prefetch round at the cost of an in-place compaction
//! pass, noted as a possible refinement in the design notes rather than
//! implemented here.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::oracle::OracleStream;

/// An oracle-bound prefetching chunk cache over `capacity` concurrently
/// resident chunks, identified by `Id` and holding reusable slabs of type
/// `S`.
pub struct OracleChunkCache<Id, S> {
    capacity: usize,
    max_predictions: usize,
    cur: Vec<Option<S>>,
    nxt: Vec<Option<S>>,
    cur_map: HashMap<Id, usize>,
    nxt_map: HashMap<Id, usize>,
    predictions_made: VecDeque<(usize, usize)>,
}

impl<Id: Eq + Hash + Clone, S: Default> OracleChunkCache<Id, S> {
    /// Build a cache holding at most `capacity` chunks at once, refilling
    /// by looking up to `max_predictions` indices ahead on each refill.
    #[must_use]
    pub fn new(capacity: usize, max_predictions: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            max_predictions: max_predictions.max(capacity),
            cur: (0..capacity).map(|_| None).collect(),
            nxt: (0..capacity).map(|_| None).collect(),
            cur_map: HashMap::new(),
            nxt_map: HashMap::new(),
            predictions_made: VecDeque::new(),
        }
    }

    /// Advance to the next chunk access in `stream`, returning the slab
    /// holding its chunk and the within-chunk offset `identify` reported
    /// for it.
    ///
    /// `identify` maps a stream index to `(chunk_id, intra_chunk_offset)`.
    /// `allocate` sizes a slab that is about to be freshly populated (it may
    /// already hold an unrelated chunk's leftover allocation). `populate`
    /// fills every needed `(chunk_id, slot)` pair's slab in one batched
    /// call — the single point where real I/O happens.
    ///
    /// Returns `None` once the stream is exhausted.
    pub fn next_chunk<I: Copy>(
        &mut self,
        stream: &mut OracleStream<I>,
        identify: impl Fn(I) -> (Id, usize),
        mut allocate: impl FnMut(&mut S),
        mut populate: impl FnMut(&[(usize, Id)], &mut [Option<S>]),
    ) -> Option<(&S, usize)> {
        if self.predictions_made.is_empty() {
            self.refill(stream, &identify, &mut allocate, &mut populate);
        }
        let (slot, offset) = self.predictions_made.pop_front()?;
        Some((self.cur[slot].as_ref().expect("slot populated by refill"), offset))
    }

    fn refill<I: Copy>(
        &mut self,
        stream: &mut OracleStream<I>,
        identify: &impl Fn(I) -> (Id, usize),
        allocate: &mut impl FnMut(&mut S),
        populate: &mut impl FnMut(&[(usize, Id)], &mut [Option<S>]),
    ) {
        for slot in &mut self.nxt {
            *slot = None;
        }
        self.nxt_map.clear();

        let mut new_predictions = VecDeque::new();
        let mut needed: Vec<(usize, Id)> = Vec::new();
        let mut next_free_slot = 0usize;
        let mut pulled = 0usize;

        while pulled < self.max_predictions {
            let Some(idx) = stream.next() else { break };
            pulled += 1;
            let (chunk_id, offset) = identify(idx);

            if let Some(&slot) = self.nxt_map.get(&chunk_id) {
                new_predictions.push_back((slot, offset));
                continue;
            }
            if next_free_slot >= self.capacity {
                stream.back();
                break;
            }
            let slot = next_free_slot;
            next_free_slot += 1;
            self.nxt_map.insert(chunk_id.clone(), slot);

            if let Some(&old_slot) = self.cur_map.get(&chunk_id) {
                std::mem::swap(&mut self.cur[old_slot], &mut self.nxt[slot]);
            } else {
                needed.push((slot, chunk_id));
            }
            new_predictions.push_back((slot, offset));
        }

        for (slot, _) in &needed {
            if self.nxt[*slot].is_none() {
                if let Some(reusable) = self.cur.iter_mut().find(|s| s.is_some()) {
                    std::mem::swap(reusable, &mut self.nxt[*slot]);
                }
            }
            let entry = self.nxt[*slot].get_or_insert_with(S::default);
            allocate(entry);
        }

        populate(&needed, &mut self.nxt);

        std::mem::swap(&mut self.cur, &mut self.nxt);
        std::mem::swap(&mut self.cur_map, &mut self.nxt_map);
        self.predictions_made = new_predictions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{ConsecutiveOracle, OracleStream};
    use std::sync::Arc;

    #[derive(Default, Clone, Debug, PartialEq)]
    struct TestSlab(Vec<u32>);

    #[test]
    fn serves_every_index_in_order() {
        let mut cache: OracleChunkCache<u32, TestSlab> = OracleChunkCache::new(2, 4);
        let oracle = ConsecutiveOracle::<u32>::new(0, 6);
        let mut stream = OracleStream::new(Arc::new(oracle));

        let mut seen = Vec::new();
        while let Some((slab, offset)) = cache.next_chunk(
            &mut stream,
            |idx| ((idx / 2) as u32, (idx % 2) as usize),
            |_slab| {},
            |needed, slots| {
                for (slot, id) in needed {
                    slots[*slot] = Some(TestSlab(vec![id * 100, id * 100 + 1]));
                }
            },
        ) {
            seen.push(slab.0[offset]);
        }
        assert_eq!(seen, vec![0, 1, 100, 101, 200, 201]);
    }

    #[test]
    fn reused_chunk_does_not_trigger_populate() {
        let mut cache: OracleChunkCache<u32, TestSlab> = OracleChunkCache::new(2, 4);
        // indices 0,1 both map to chunk 0 -> populate should only ever be
        // asked to fill chunk 0 once across both refill rounds.
        let oracle = ConsecutiveOracle::<u32>::new(0, 4);
        let mut stream = OracleStream::new(Arc::new(oracle));
        let mut populate_calls = 0usize;

        while cache
            .next_chunk(
                &mut stream,
                |idx| (0u32, idx as usize % 2),
                |_| {},
                |needed, slots| {
                    populate_calls += needed.len();
                    for (slot, id) in needed {
                        slots[*slot] = Some(TestSlab(vec![*id, *id]));
                    }
                },
            )
            .is_some()
        {}

        assert_eq!(populate_calls, 1);
    }
}
