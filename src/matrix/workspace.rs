//! Per-extractor scratch state that accelerates consecutive secondary-axis
//! accesses against a compressed sparse matrix.

/// For each primary-axis slice in a bound `[first, last)` range, the offset
/// into that slice's `indices` sub-range of the next candidate entry.
///
/// Exploits that consecutive secondary-axis accesses (`i`, `i+1`, `i-1`)
/// only need their per-slice offset nudged by one rather than re-bisected,
/// making a `first..last` sweep of secondary positions amortised
/// O(primary-axis length) rather than O(`primary-axis length * log
/// nnz-per-slice`).
#[derive(Debug, Clone)]
pub struct SecondaryAxisWorkspace {
    first: usize,
    last: usize,
    /// `offsets[p]` is the index, local to primary slice `first + p`, of the
    /// entry the last search left off at.
    offsets: Vec<usize>,
    prev_i: Option<usize>,
}

impl SecondaryAxisWorkspace {
    /// Create an empty workspace: the first access on any range always
    /// triggers a fresh re-priming.
    #[must_use]
    pub fn new() -> Self {
        Self {
            first: 0,
            last: 0,
            offsets: Vec::new(),
            prev_i: None,
        }
    }

    /// Bind the workspace to the primary-axis range `[first, last)`,
    /// resetting all offsets if the range differs from the one the
    /// workspace was last primed for.
    ///
    /// Cancelling workspace validity on range change is by design:
    /// correctness over the small re-priming cost.
    pub fn prime(&mut self, first: usize, last: usize) {
        if self.first != first || self.last != last || self.offsets.len() != last - first {
            self.first = first;
            self.last = last;
            self.offsets = vec![0; last - first];
            self.prev_i = None;
        }
    }

    /// The cached per-slice offsets for the currently primed range.
    #[must_use]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The cached per-slice offsets for the currently primed range, mutable.
    pub fn offsets_mut(&mut self) -> &mut [usize] {
        &mut self.offsets
    }

    /// The secondary-axis position the workspace's offsets were last primed
    /// for, if any.
    #[must_use]
    pub fn prev_i(&self) -> Option<usize> {
        self.prev_i
    }

    /// Record that the workspace's offsets are now valid for secondary-axis
    /// position `i`.
    pub fn set_prev_i(&mut self, i: usize) {
        self.prev_i = Some(i);
    }

    /// Classify how `i` relates to the last-accessed secondary position:
    /// same position (offsets reusable as-is), a one-step advance or
    /// retreat (offsets nudgeable by one), or a jump (offsets must be
    /// re-bisected from scratch).
    #[must_use]
    pub fn step(&self, i: usize) -> WorkspaceStep {
        match self.prev_i {
            None => WorkspaceStep::Jump,
            Some(prev) if prev == i => WorkspaceStep::Same,
            Some(prev) if i == prev + 1 => WorkspaceStep::Advance,
            Some(prev) if i + 1 == prev => WorkspaceStep::Retreat,
            Some(_) => WorkspaceStep::Jump,
        }
    }
}

impl Default for SecondaryAxisWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// How a requested secondary-axis position relates to the one the workspace
/// was last used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceStep {
    /// Identical to the last position; offsets are reusable unchanged.
    Same,
    /// One greater than the last position; offsets may be advanced by at
    /// most one.
    Advance,
    /// One less than the last position; offsets may be retreated by at most
    /// one.
    Retreat,
    /// Neither of the above; offsets must be re-bisected.
    Jump,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prime_resets_on_range_change() {
        let mut ws = SecondaryAxisWorkspace::new();
        ws.prime(2, 5);
        ws.offsets_mut()[0] = 7;
        ws.set_prev_i(3);
        assert_eq!(ws.step(4), WorkspaceStep::Advance);

        ws.prime(2, 5);
        // same range: offsets preserved
        assert_eq!(ws.offsets()[0], 7);
        assert_eq!(ws.prev_i(), Some(3));

        ws.prime(0, 5);
        // different range: offsets reset
        assert_eq!(ws.offsets(), &[0, 0, 0, 0, 0]);
        assert_eq!(ws.prev_i(), None);
    }

    #[test]
    fn step_classification() {
        let mut ws = SecondaryAxisWorkspace::new();
        ws.prime(0, 3);
        assert_eq!(ws.step(5), WorkspaceStep::Jump);
        ws.set_prev_i(5);
        assert_eq!(ws.step(5), WorkspaceStep::Same);
        assert_eq!(ws.step(6), WorkspaceStep::Advance);
        assert_eq!(ws.step(4), WorkspaceStep::Retreat);
        assert_eq!(ws.step(9), WorkspaceStep::Jump);
    }
}
