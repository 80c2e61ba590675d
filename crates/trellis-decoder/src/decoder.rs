use crate::beam::{Beam, Candidate};
use crate::error::DecodeError;
use crate::hypothesis::{extend_hash, Hypothesis, HASH_SEED};
use crate::pool::HypothesisPool;
use log::debug;
use rayon::prelude::*;
use std::collections::HashMap;
use trellis_core::{log_sum_exp, Alphabet, Emissions, F, SymbolId, LOG_ZERO};
use trellis_grammar::{Grammar, SearchState};

/// Symbols considered per step when no grammar restricts the search.
const TOP_EXTENSIONS: usize = 3;
/// Log-probability charged to grammar characters the classifier alphabet
/// does not cover: ln(1e-4).
const MISSING_SYMBOL_PENALTY: F = -9.210340371976184;
/// Results may trail the best one by at most this margin: ln(100).
const KEEP_MARGIN: F = 4.605170185988092;

/// Decoder settings.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Hypotheses kept per time step.
    pub beam_width: usize,
    /// Upper bound on returned results.
    pub max_results: usize,
    /// Fold the grammar's character and word-end frequencies into scores.
    pub use_grammar_statistics: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_width: 20,
            max_results: 10,
            use_grammar_statistics: false,
        }
    }
}

impl DecoderConfig {
    pub fn with_beam_width(mut self, beam_width: usize) -> Self {
        self.beam_width = beam_width;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_grammar_statistics(mut self, enabled: bool) -> Self {
        self.use_grammar_statistics = enabled;
        self
    }
}

/// One ranked decode result.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded {
    pub symbols: Vec<char>,
    /// Normalized over the kept result set; the returned list sums to <= 1.
    pub probability: F,
}

impl Decoded {
    pub fn text(&self) -> String {
        self.symbols.iter().collect()
    }
}

/// Sentinel indices for grammar characters outside the classifier
/// alphabet. Scoped to a single decode call; sentinel values start past
/// the real alphabet range so they never collide with matrix columns.
struct MissingSymbols {
    base: usize,
    by_char: HashMap<char, SymbolId>,
    labels: Vec<char>,
}

impl MissingSymbols {
    fn new(base: usize) -> Self {
        Self {
            base,
            by_char: HashMap::new(),
            labels: Vec::new(),
        }
    }

    fn resolve(&mut self, alphabet: &Alphabet, ch: char) -> SymbolId {
        if let Some(symbol) = alphabet.index_of(ch) {
            return symbol;
        }
        if let Some(&symbol) = self.by_char.get(&ch) {
            return symbol;
        }
        let symbol = self.base + self.labels.len();
        self.by_char.insert(ch, symbol);
        self.labels.push(ch);
        symbol
    }

    fn label(&self, symbol: SymbolId) -> Option<char> {
        self.labels.get(symbol.checked_sub(self.base)?).copied()
    }
}

/// Beam search over a CTC emission matrix, optionally constrained and
/// rescored by a grammar automaton.
pub struct BeamSearchDecoder {
    config: DecoderConfig,
}

impl BeamSearchDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Unconstrained decode: any symbol sequence is admissible.
    pub fn decode(
        &self,
        emissions: &Emissions,
        alphabet: &Alphabet,
    ) -> Result<Vec<Decoded>, DecodeError> {
        self.decode_impl(emissions, alphabet, None)
    }

    /// Grammar-constrained decode: only sequences the automaton accepts
    /// survive to the result set.
    pub fn decode_with_grammar(
        &self,
        emissions: &Emissions,
        alphabet: &Alphabet,
        grammar: &Grammar,
    ) -> Result<Vec<Decoded>, DecodeError> {
        self.decode_impl(emissions, alphabet, Some(grammar))
    }

    /// Decode independent matrices in parallel. Each call owns its beams
    /// and pool; only the read-only grammar automaton is shared.
    pub fn decode_batch(
        &self,
        batch: &[Emissions],
        alphabet: &Alphabet,
        grammar: Option<&Grammar>,
    ) -> Vec<Result<Vec<Decoded>, DecodeError>> {
        batch
            .par_iter()
            .map(|emissions| self.decode_impl(emissions, alphabet, grammar))
            .collect()
    }

    fn decode_impl(
        &self,
        emissions: &Emissions,
        alphabet: &Alphabet,
        grammar: Option<&Grammar>,
    ) -> Result<Vec<Decoded>, DecodeError> {
        if emissions.n_symbols() != alphabet.len() {
            return Err(DecodeError::AlphabetMismatch {
                matrix: emissions.n_symbols(),
                alphabet: alphabet.len(),
            });
        }
        if self.config.beam_width == 0 {
            return Err(DecodeError::InvalidBeamWidth);
        }
        if self.config.max_results == 0 {
            return Err(DecodeError::InvalidResultCount);
        }

        let t_max = emissions.n_steps();
        let blank = alphabet.blank();
        let stats = self.config.use_grammar_statistics && grammar.is_some();
        let mut missing = MissingSymbols::new(alphabet.len());
        let mut pool = HypothesisPool::new(t_max, 2 * self.config.beam_width + 2);
        let mut flip = Beam::new(self.config.beam_width);
        let mut flop = Beam::new(self.config.beam_width);

        // t = 0: the empty hypothesis riding the blank, plus one-symbol
        // hypotheses for each admissible first symbol.
        let initial = grammar.map(|g| g.initial_state());
        flop.offer(
            Candidate {
                base: &[],
                extra: None,
                hash: HASH_SEED,
                prob_blank: emissions.log_prob(0, blank),
                prob_no_blank: LOG_ZERO,
                state: initial.clone(),
            },
            &mut pool,
        );
        match grammar {
            None => {
                // The word gap cannot open a sequence.
                let skip: Vec<SymbolId> = std::iter::once(blank)
                    .chain(alphabet.word_gap())
                    .collect();
                for symbol in emissions.top_symbols(0, TOP_EXTENSIONS, &skip) {
                    flop.offer(
                        Candidate {
                            base: &[],
                            extra: Some(symbol),
                            hash: extend_hash(HASH_SEED, symbol),
                            prob_blank: LOG_ZERO,
                            prob_no_blank: emissions.log_prob(0, symbol),
                            state: None,
                        },
                        &mut pool,
                    );
                }
            }
            Some(g) => {
                if let Some(init) = &initial {
                    if let Some(trans) = init.next_states(g) {
                        for (&ch, next) in trans {
                            let symbol = missing.resolve(alphabet, ch);
                            let mut prob_no_blank =
                                symbol_log_prob(emissions, 0, symbol, alphabet.len());
                            if stats {
                                prob_no_blank += next.char_log_prob();
                            }
                            flop.offer(
                                Candidate {
                                    base: &[],
                                    extra: Some(symbol),
                                    hash: extend_hash(HASH_SEED, symbol),
                                    prob_blank: LOG_ZERO,
                                    prob_no_blank,
                                    state: Some(next.clone()),
                                },
                                &mut pool,
                            );
                        }
                    }
                }
            }
        }
        debug!("seeded {} hypotheses at t=0", flop.len());

        for t in 1..t_max {
            std::mem::swap(&mut flip, &mut flop);
            let blank_lp = emissions.log_prob(t, blank);
            let top = match grammar {
                None => emissions.top_symbols(t, TOP_EXTENSIONS, &[blank]),
                Some(_) => Vec::new(),
            };
            for h in flip.iter() {
                // (a) stay: the alignment grows by a blank (from both
                // branches) or by the repeated last symbol (no-blank
                // branch only; a repeat without a separating blank still
                // counts once).
                let prob_blank = h.prob() + blank_lp;
                let mut prob_no_blank = LOG_ZERO;
                if let Some(last) = h.last_symbol() {
                    if h.prob_no_blank != LOG_ZERO {
                        prob_no_blank =
                            h.prob_no_blank + symbol_log_prob(emissions, t, last, alphabet.len());
                    }
                }
                flop.offer(
                    Candidate {
                        base: h.seq(),
                        extra: None,
                        hash: h.hash(),
                        prob_blank,
                        prob_no_blank,
                        state: h.state.clone(),
                    },
                    &mut pool,
                );
                // (b) extend by a non-blank symbol.
                match grammar {
                    None => {
                        for &symbol in &top {
                            if alphabet.word_gap() == Some(symbol)
                                && (h.is_empty() || h.last_symbol() == Some(symbol))
                            {
                                continue;
                            }
                            extend_into(
                                h,
                                symbol,
                                emissions.log_prob(t, symbol),
                                None,
                                &mut flop,
                                &mut pool,
                            );
                        }
                    }
                    Some(g) => {
                        let Some(state) = &h.state else { continue };
                        let Some(trans) = state.next_states(g) else {
                            continue;
                        };
                        for (&ch, next) in trans {
                            let symbol = missing.resolve(alphabet, ch);
                            if alphabet.word_gap() == Some(symbol)
                                && h.last_symbol() == Some(symbol)
                            {
                                continue;
                            }
                            let mut log_prob =
                                symbol_log_prob(emissions, t, symbol, alphabet.len());
                            if stats {
                                log_prob += next.char_log_prob();
                            }
                            extend_into(h, symbol, log_prob, Some(next.clone()), &mut flop, &mut pool);
                        }
                    }
                }
            }
            // (c) the previous step's slots go back to the pool.
            flip.recycle_into(&mut pool);
        }

        let results = self.extract(&flop, alphabet, &missing, stats);
        debug!(
            "decoded {} results from a final beam of {}",
            results.len(),
            flop.len()
        );
        Ok(results)
    }

    /// Keep legal finals, normalize over them, prune far trailers, rank.
    fn extract(
        &self,
        beam: &Beam,
        alphabet: &Alphabet,
        missing: &MissingSymbols,
        stats: bool,
    ) -> Vec<Decoded> {
        let mut kept: Vec<(F, &Hypothesis)> = Vec::new();
        for h in beam.iter() {
            match &h.state {
                None => {
                    let p = h.prob();
                    if p != LOG_ZERO {
                        kept.push((p, h));
                    }
                }
                Some(state) if state.is_word_end() => {
                    let mut p = h.prob();
                    if stats {
                        p += state.word_end_log_prob();
                    }
                    if p != LOG_ZERO {
                        kept.push((p, h));
                    }
                }
                Some(_) => {}
            }
        }
        if kept.is_empty() {
            return Vec::new();
        }
        // Stable sort: equal probabilities keep their beam rank.
        kept.sort_by(|a, b| b.0.total_cmp(&a.0));
        let esum = kept
            .iter()
            .fold(LOG_ZERO, |acc, &(p, _)| log_sum_exp(acc, p));
        let best = kept[0].0;
        kept.retain(|&(p, _)| best - p <= KEEP_MARGIN);
        kept.truncate(self.config.max_results);
        kept.into_iter()
            .map(|(p, h)| Decoded {
                symbols: h
                    .seq()
                    .iter()
                    .map(|&s| {
                        alphabet
                            .symbol(s)
                            .or_else(|| missing.label(s))
                            .unwrap_or('?')
                    })
                    .collect(),
                probability: (p - esum).exp(),
            })
            .collect()
    }
}

impl Default for BeamSearchDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

fn symbol_log_prob(emissions: &Emissions, t: usize, symbol: SymbolId, n_real: usize) -> F {
    if symbol < n_real {
        emissions.log_prob(t, symbol)
    } else {
        MISSING_SYMBOL_PENALTY
    }
}

/// Offer the length+1 extension of `h` by `symbol` into the beam.
fn extend_into(
    h: &Hypothesis,
    symbol: SymbolId,
    log_prob: F,
    state: Option<SearchState>,
    flop: &mut Beam,
    pool: &mut HypothesisPool,
) {
    let prob_no_blank = if h.last_symbol() == Some(symbol) {
        // Without an intervening blank a repeat collapses into the
        // previous symbol, so only the blank branch spawns a new one.
        if h.prob_blank == LOG_ZERO {
            return;
        }
        h.prob_blank + log_prob
    } else {
        h.prob() + log_prob
    };
    flop.offer(
        Candidate {
            base: h.seq(),
            extra: Some(symbol),
            hash: extend_hash(h.hash(), symbol),
            prob_blank: LOG_ZERO,
            prob_no_blank,
            state,
        },
        pool,
    );
}
