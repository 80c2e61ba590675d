use crate::{synthesize_document, DecodeDocument, DecodeReport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use trellis_decoder::{BeamSearchDecoder, DecoderConfig};
use trellis_grammar::Grammar;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Grammar-guided CTC beam-search decoding")]
#[command(long_about = "Decodes per-time-step class-probability matrices into ranked \
label sequences, optionally constrained and rescored by a word-list grammar")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode emission documents and write a report next to each input
    Decode {
        /// Input JSON documents
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Hypotheses kept per time step
        #[arg(long, default_value_t = 20)]
        beam_width: usize,

        /// Upper bound on returned results
        #[arg(long, default_value_t = 10)]
        max_results: usize,

        /// Fold grammar character/word-end statistics into scores
        #[arg(long)]
        use_stats: bool,
    },

    /// Write a synthetic emission document peaked on a target string
    Synth {
        /// Target string the matrix should favor
        #[arg(long)]
        text: String,

        /// Symbol labels; the first is the blank
        #[arg(long, default_value = "-abcdefghijklmnopqrstuvwxyz ")]
        alphabet: String,

        /// Probability mass on the target symbol per step
        #[arg(long, default_value_t = 0.9)]
        peak: f64,

        /// Random seed for the jitter mass
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Output JSON document
        #[arg(long)]
        out: PathBuf,
    },
}

pub fn run_decode_command(
    inputs: &[PathBuf],
    beam_width: usize,
    max_results: usize,
    use_stats: bool,
) -> Result<()> {
    let config = DecoderConfig::default()
        .with_beam_width(beam_width)
        .with_max_results(max_results)
        .with_grammar_statistics(use_stats);
    let decoder = BeamSearchDecoder::new(config);
    for input in inputs {
        let raw = fs::read_to_string(input)
            .with_context(|| format!("reading {}", input.display()))?;
        let doc: DecodeDocument = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", input.display()))?;
        let alphabet = doc.alphabet()?;
        let emissions = doc.emissions()?;
        let results = if doc.words.is_empty() {
            decoder.decode(&emissions, &alphabet)?
        } else {
            let grammar = Grammar::from_words(doc.words.iter().map(String::as_str))?;
            decoder.decode_with_grammar(&emissions, &alphabet, &grammar)?
        };
        let report = DecodeReport::new(
            &input.display().to_string(),
            decoder.config(),
            doc.words.len(),
            &results,
        );
        let out = report_path(input);
        fs::write(&out, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", out.display()))?;
        info!("wrote {}", out.display());

        println!("{}:", input.display());
        if results.is_empty() {
            println!("  (no legal result)");
        }
        for r in &results {
            println!("  {:>9.6}  {:?}", r.probability, r.text());
        }
    }
    Ok(())
}

pub fn run_synth_command(
    text: &str,
    alphabet: &str,
    peak: f64,
    seed: u64,
    out: &Path,
) -> Result<()> {
    let doc = synthesize_document(text, alphabet, peak, seed)?;
    fs::write(out, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("writing {}", out.display()))?;
    println!(
        "wrote {} ({} steps x {} symbols)",
        out.display(),
        doc.probs.len(),
        doc.alphabet.chars().count()
    );
    Ok(())
}

fn report_path(input: &Path) -> PathBuf {
    input.with_extension("report.json")
}
