use crate::hypothesis::Hypothesis;
use crate::pool::HypothesisPool;
use trellis_core::{log_sum_exp, F, SymbolId};
use trellis_grammar::SearchState;

/// A candidate insertion. Borrows the source sequence so nothing is copied
/// until the beam decides to keep it.
pub struct Candidate<'a> {
    pub base: &'a [SymbolId],
    pub extra: Option<SymbolId>,
    pub hash: u64,
    pub prob_blank: F,
    pub prob_no_blank: F,
    pub state: Option<SearchState>,
}

impl Candidate<'_> {
    fn len(&self) -> usize {
        self.base.len() + usize::from(self.extra.is_some())
    }
}

/// Probability-descending, width-bounded hypothesis collection for one
/// time step.
///
/// Equal probabilities keep first-come order, both on insertion and when a
/// merge re-ranks an entry; eviction requires the candidate to strictly
/// beat the current lowest entry.
pub struct Beam {
    entries: Vec<Box<Hypothesis>>,
    width: usize,
}

impl Beam {
    pub fn new(width: usize) -> Self {
        Self {
            entries: Vec::with_capacity(width),
            width,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hypothesis> {
        self.entries.iter().map(|e| e.as_ref())
    }

    /// Insert-with-merge: an equal sequence already present absorbs the
    /// candidate's mass; otherwise the candidate takes a slot, evicting the
    /// lowest-ranked entry once the beam is full.
    pub fn offer(&mut self, candidate: Candidate<'_>, pool: &mut HypothesisPool) {
        let len = candidate.len();
        for i in 0..self.entries.len() {
            let entry = &mut self.entries[i];
            if entry.len() == len
                && entry.hash() == candidate.hash
                && entry.content_eq(candidate.base, candidate.extra)
            {
                entry.merge(
                    candidate.prob_blank,
                    candidate.prob_no_blank,
                    candidate.state.as_ref(),
                );
                // Mass only grows on merge, so the entry can only move up.
                let mut j = i;
                while j > 0 && self.entries[j - 1].prob() < self.entries[j].prob() {
                    self.entries.swap(j - 1, j);
                    j -= 1;
                }
                return;
            }
        }

        let prob = log_sum_exp(candidate.prob_blank, candidate.prob_no_blank);
        if self.entries.len() >= self.width {
            // Full beam: the candidate must strictly beat the lowest entry.
            if !self.entries.last().is_some_and(|last| prob > last.prob()) {
                return;
            }
            if let Some(evicted) = self.entries.pop() {
                pool.release(evicted);
            }
        }
        let mut slot = pool.acquire();
        slot.load(
            candidate.base,
            candidate.extra,
            candidate.hash,
            candidate.prob_blank,
            candidate.prob_no_blank,
            candidate.state,
        );
        let at = self
            .entries
            .iter()
            .position(|e| e.prob() < prob)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, slot);
    }

    /// Return every slot to the pool, leaving the beam empty for reuse.
    pub fn recycle_into(&mut self, pool: &mut HypothesisPool) {
        for slot in self.entries.drain(..) {
            pool.release(slot);
        }
    }
}
