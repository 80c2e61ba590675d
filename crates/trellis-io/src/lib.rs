use anyhow::{bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use trellis_core::{Alphabet, CoreError, Emissions, F};
use trellis_decoder::{Decoded, DecoderConfig};
use uuid::Uuid;

pub mod cli;
pub use cli::*;

/// One decode task: symbol labels, a linear probability matrix, and an
/// optional word list to constrain the search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodeDocument {
    /// Symbol labels, one character each, index-aligned with matrix columns.
    pub alphabet: String,
    pub blank: usize,
    /// T rows of A linear probabilities.
    pub probs: Vec<Vec<F>>,
    #[serde(default)]
    pub words: Vec<String>,
}

impl DecodeDocument {
    pub fn alphabet(&self) -> Result<Alphabet, CoreError> {
        Alphabet::parse(&self.alphabet, self.blank)
    }

    pub fn emissions(&self) -> Result<Emissions, CoreError> {
        Emissions::from_linear(&self.probs)
    }
}

/// Written next to each input, echoing the effective configuration for
/// reproducibility.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodeReport {
    pub run_id: String,
    pub input: String,
    pub beam_width: usize,
    pub max_results: usize,
    pub use_grammar_statistics: bool,
    pub grammar_words: usize,
    pub results: Vec<ReportEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportEntry {
    pub text: String,
    pub probability: F,
}

impl DecodeReport {
    pub fn new(
        input: &str,
        config: &DecoderConfig,
        grammar_words: usize,
        results: &[Decoded],
    ) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            input: input.to_string(),
            beam_width: config.beam_width,
            max_results: config.max_results,
            use_grammar_statistics: config.use_grammar_statistics,
            grammar_words,
            results: results
                .iter()
                .map(|r| ReportEntry {
                    text: r.text(),
                    probability: r.probability,
                })
                .collect(),
        }
    }
}

/// Synthetic emission document peaked on `text`, one frame per character
/// with a blank frame spliced between repeats, and seeded jitter spreading
/// the remaining mass. The first alphabet character is the blank.
pub fn synthesize_document(
    text: &str,
    alphabet: &str,
    peak: F,
    seed: u64,
) -> Result<DecodeDocument> {
    let labels: Vec<char> = alphabet.chars().collect();
    if labels.is_empty() {
        bail!("alphabet is empty");
    }
    if !(peak > 0.0 && peak <= 1.0) {
        bail!("peak probability {peak} must be in (0, 1]");
    }
    let mut targets = Vec::new();
    let mut prev = None;
    for ch in text.chars() {
        let Some(idx) = labels.iter().position(|&c| c == ch) else {
            bail!("character {ch:?} is not in the alphabet");
        };
        if idx == 0 {
            bail!("target text may not contain the blank label {ch:?}");
        }
        // Adjacent repeats collapse under CTC; a blank frame keeps them apart.
        if prev == Some(idx) {
            targets.push(0);
        }
        targets.push(idx);
        prev = Some(idx);
    }
    if targets.is_empty() {
        targets.push(0);
    }
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let probs = targets
        .iter()
        .map(|&target| synth_row(&mut rng, labels.len(), target, peak))
        .collect();
    Ok(DecodeDocument {
        alphabet: alphabet.to_string(),
        blank: 0,
        probs,
        words: Vec::new(),
    })
}

fn synth_row(rng: &mut ChaCha20Rng, n_symbols: usize, target: usize, peak: F) -> Vec<F> {
    let mut noise: Vec<F> = (0..n_symbols).map(|_| rng.gen::<F>()).collect();
    noise[target] = 0.0;
    let total: F = noise.iter().sum();
    let spread = 1.0 - peak;
    let mut row: Vec<F> = noise
        .iter()
        .map(|&w| if total > 0.0 { spread * w / total } else { 0.0 })
        .collect();
    row[target] = peak;
    row
}
