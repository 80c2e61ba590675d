use trellis_core::{log_sum_exp, F, SymbolId, LOG_ZERO};
use trellis_grammar::SearchState;

/// Hash of the empty symbol sequence.
pub const HASH_SEED: u64 = 0xcbf2_9ce4_8422_2325;
const HASH_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Rolling content hash: the hash of a sequence extended by one symbol is a
/// pure function of the previous hash and the new symbol index.
pub fn extend_hash(hash: u64, symbol: SymbolId) -> u64 {
    (hash ^ (symbol as u64 + 1)).wrapping_mul(HASH_PRIME)
}

/// One candidate output sequence under construction.
///
/// The probability mass is split two ways: paths whose alignment currently
/// ends in blank versus paths ending in the last symbol itself. The split
/// is what lets a repeated symbol be scored correctly with or without an
/// intervening blank.
///
/// Slots are recycled through the pool; the sequence buffer keeps its
/// capacity (one slot per time step) across reuse.
pub struct Hypothesis {
    seq: Vec<SymbolId>,
    hash: u64,
    pub prob_blank: F,
    pub prob_no_blank: F,
    pub state: Option<SearchState>,
}

impl Hypothesis {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            seq: Vec::with_capacity(capacity),
            hash: HASH_SEED,
            prob_blank: LOG_ZERO,
            prob_no_blank: LOG_ZERO,
            state: None,
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn seq(&self) -> &[SymbolId] {
        &self.seq
    }

    pub fn last_symbol(&self) -> Option<SymbolId> {
        self.seq.last().copied()
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Total mass across both alignment branches.
    pub fn prob(&self) -> F {
        log_sum_exp(self.prob_blank, self.prob_no_blank)
    }

    pub(crate) fn reset(&mut self) {
        self.seq.clear();
        self.hash = HASH_SEED;
        self.prob_blank = LOG_ZERO;
        self.prob_no_blank = LOG_ZERO;
        self.state = None;
    }

    /// Fill a recycled slot with `base` plus an optional appended symbol.
    pub(crate) fn load(
        &mut self,
        base: &[SymbolId],
        extra: Option<SymbolId>,
        hash: u64,
        prob_blank: F,
        prob_no_blank: F,
        state: Option<SearchState>,
    ) {
        self.seq.clear();
        self.seq.extend_from_slice(base);
        if let Some(symbol) = extra {
            self.seq.push(symbol);
        }
        self.hash = hash;
        self.prob_blank = prob_blank;
        self.prob_no_blank = prob_no_blank;
        self.state = state;
    }

    /// Fold another path's mass for the same sequence into this slot,
    /// unioning the attached grammar states.
    pub(crate) fn merge(&mut self, prob_blank: F, prob_no_blank: F, state: Option<&SearchState>) {
        self.prob_blank = log_sum_exp(self.prob_blank, prob_blank);
        self.prob_no_blank = log_sum_exp(self.prob_no_blank, prob_no_blank);
        self.state = match (self.state.take(), state) {
            (Some(a), Some(b)) => Some(SearchState::union(&a, b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        };
    }

    /// Exact content comparison against `base` plus an optional appended
    /// symbol; callers pre-check length and hash.
    pub(crate) fn content_eq(&self, base: &[SymbolId], extra: Option<SymbolId>) -> bool {
        match extra {
            Some(symbol) => {
                self.seq.len() == base.len() + 1
                    && self.seq[..base.len()] == *base
                    && self.seq[base.len()] == symbol
            }
            None => self.seq == base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rolling_hash_is_pure() {
        let h1 = extend_hash(extend_hash(HASH_SEED, 3), 7);
        let h2 = extend_hash(extend_hash(HASH_SEED, 3), 7);
        assert_eq!(h1, h2);
        assert_ne!(h1, extend_hash(extend_hash(HASH_SEED, 7), 3));
        assert_ne!(extend_hash(HASH_SEED, 0), HASH_SEED);
    }

    #[test]
    fn test_load_and_prob() {
        let mut h = Hypothesis::with_capacity(8);
        let pb = (0.25f64).ln();
        let pnb = (0.25f64).ln();
        h.load(&[1, 2], Some(3), 42, pb, pnb, None);
        assert_eq!(h.seq(), &[1, 2, 3]);
        assert_eq!(h.last_symbol(), Some(3));
        assert_eq!(h.hash(), 42);
        assert_relative_eq!(h.prob().exp(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_merge_accumulates() {
        let mut h = Hypothesis::with_capacity(4);
        h.load(&[1], None, 7, (0.1f64).ln(), LOG_ZERO, None);
        h.merge((0.2f64).ln(), (0.3f64).ln(), None);
        assert_relative_eq!(h.prob_blank.exp(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(h.prob_no_blank.exp(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_content_eq() {
        let mut h = Hypothesis::with_capacity(4);
        h.load(&[1, 2], Some(3), 0, LOG_ZERO, LOG_ZERO, None);
        assert!(h.content_eq(&[1, 2], Some(3)));
        assert!(h.content_eq(&[1, 2, 3], None));
        assert!(!h.content_eq(&[1, 2], Some(4)));
        assert!(!h.content_eq(&[1, 2], None));
    }

    #[test]
    fn test_reset() {
        let mut h = Hypothesis::with_capacity(4);
        h.load(&[1], Some(2), 9, -1.0, -2.0, None);
        h.reset();
        assert!(h.is_empty());
        assert_eq!(h.hash(), HASH_SEED);
        assert_eq!(h.prob(), LOG_ZERO);
    }
}
