use crate::decoder::Decoded;
use crate::error::DecodeError;
use trellis_core::{Alphabet, Emissions};

/// Best-path decode: the most probable symbol at each step, collapsed by
/// the CTC rule (drop blanks, merge adjacent repeats).
///
/// Considers a single alignment; the beam decoder sums over all of them.
pub fn decode_greedy(emissions: &Emissions, alphabet: &Alphabet) -> Result<Decoded, DecodeError> {
    if emissions.n_symbols() != alphabet.len() {
        return Err(DecodeError::AlphabetMismatch {
            matrix: emissions.n_symbols(),
            alphabet: alphabet.len(),
        });
    }
    let blank = alphabet.blank();
    let mut symbols = Vec::new();
    let mut score = 0.0;
    let mut last = blank;
    for t in 0..emissions.n_steps() {
        let mut arg = 0;
        for a in 1..emissions.n_symbols() {
            if emissions.log_prob(t, a) > emissions.log_prob(t, arg) {
                arg = a;
            }
        }
        score += emissions.log_prob(t, arg);
        if arg != last && arg != blank {
            if let Some(c) = alphabet.symbol(arg) {
                symbols.push(c);
            }
        }
        last = arg;
    }
    Ok(Decoded {
        symbols,
        probability: score.exp(),
    })
}
