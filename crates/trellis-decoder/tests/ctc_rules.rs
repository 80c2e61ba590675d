use approx::assert_relative_eq;
use std::collections::HashMap;
use trellis_core::{Alphabet, Emissions, F};
use trellis_decoder::{decode_greedy, BeamSearchDecoder, DecodeError, DecoderConfig};

fn one_hot(alphabet_len: usize, symbols: &[usize]) -> Emissions {
    let rows: Vec<Vec<F>> = symbols
        .iter()
        .map(|&s| {
            let mut row = vec![0.0; alphabet_len];
            row[s] = 1.0;
            row
        })
        .collect();
    Emissions::from_linear(&rows).unwrap()
}

#[test]
fn test_repeat_needs_intervening_blank() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    // blank, A, A, blank, B: the two As collapse into one.
    let emissions = one_hot(3, &[0, 1, 1, 0, 2]);
    let decoder = BeamSearchDecoder::default();
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    assert_eq!(results[0].text(), "AB");
    assert_relative_eq!(results[0].probability, 1.0, epsilon = 1e-12);
}

#[test]
fn test_single_symbol_end_to_end() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let emissions = one_hot(3, &[1, 1, 0]);
    let decoder = BeamSearchDecoder::new(DecoderConfig::default().with_beam_width(5));
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    assert_eq!(results[0].symbols, vec!['A']);
    assert_relative_eq!(results[0].probability, 1.0, epsilon = 1e-12);
}

#[test]
fn test_probabilities_sum_to_at_most_one() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let emissions = Emissions::from_linear(&[
        vec![0.5, 0.3, 0.2],
        vec![0.2, 0.6, 0.2],
        vec![0.4, 0.3, 0.3],
        vec![0.3, 0.2, 0.5],
    ])
    .unwrap();
    let decoder = BeamSearchDecoder::default();
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    assert!(!results.is_empty());
    let total: F = results.iter().map(|r| r.probability).sum();
    assert!(total <= 1.0 + 1e-12, "total probability {total} exceeds 1");
    // Descending rank order.
    for pair in results.windows(2) {
        assert!(pair[0].probability >= pair[1].probability);
    }
}

#[test]
fn test_beam_width_one_is_greedy() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let emissions = one_hot(3, &[1, 0, 2, 2, 0, 1]);
    let decoder = BeamSearchDecoder::new(DecoderConfig::default().with_beam_width(1));
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    assert_eq!(results.len(), 1);
    let greedy = decode_greedy(&emissions, &alphabet).unwrap();
    assert_eq!(results[0].text(), greedy.text());
    assert_eq!(results[0].text(), "ABA");
}

/// Exhaustively score every alignment, collapse each by the CTC rule, and
/// return the most probable collapsed sequence.
fn brute_force_top(emissions_linear: &[Vec<F>], alphabet: &Alphabet) -> String {
    let t_max = emissions_linear.len();
    let a_max = emissions_linear[0].len();
    let mut totals: HashMap<String, F> = HashMap::new();
    let mut path = vec![0usize; t_max];
    let mut exhausted = false;
    while !exhausted {
        let mut prob = 1.0;
        for (t, &s) in path.iter().enumerate() {
            prob *= emissions_linear[t][s];
        }
        let mut collapsed = String::new();
        let mut prev = None;
        for &s in &path {
            if prev == Some(s) {
                continue;
            }
            prev = Some(s);
            if s != alphabet.blank() {
                collapsed.push(alphabet.symbol(s).unwrap());
            }
        }
        *totals.entry(collapsed).or_insert(0.0) += prob;
        // Next path in odometer order.
        let mut t = 0;
        loop {
            if t == t_max {
                exhausted = true;
                break;
            }
            path[t] += 1;
            if path[t] < a_max {
                break;
            }
            path[t] = 0;
            t += 1;
        }
    }
    totals
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(text, _)| text)
        .unwrap()
}

#[test]
fn test_wide_beam_matches_brute_force() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let rows = vec![
        vec![0.5, 0.3, 0.2],
        vec![0.2, 0.6, 0.2],
        vec![0.4, 0.3, 0.3],
        vec![0.3, 0.2, 0.5],
    ];
    let emissions = Emissions::from_linear(&rows).unwrap();
    // Wide enough that nothing is pruned for sequences this short.
    let decoder = BeamSearchDecoder::new(DecoderConfig::default().with_beam_width(64));
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    assert_eq!(results[0].text(), brute_force_top(&rows, &alphabet));
}

#[test]
fn test_blank_only_input_yields_empty_sequence() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let emissions = one_hot(3, &[0, 0, 0]);
    let decoder = BeamSearchDecoder::default();
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    assert_eq!(results[0].text(), "");
    assert_relative_eq!(results[0].probability, 1.0, epsilon = 1e-12);
}

#[test]
fn test_word_gap_never_opens_a_sequence() {
    let alphabet = Alphabet::parse("-A ", 0).unwrap();
    // The gap symbol dominates every step.
    let emissions = Emissions::from_linear(&[
        vec![0.1, 0.2, 0.7],
        vec![0.1, 0.2, 0.7],
        vec![0.1, 0.2, 0.7],
    ])
    .unwrap();
    let decoder = BeamSearchDecoder::default();
    let results = decoder.decode(&emissions, &alphabet).unwrap();
    for r in &results {
        assert!(
            !r.text().starts_with(' '),
            "result {:?} starts with the word gap",
            r.text()
        );
    }
}

#[test]
fn test_decode_is_deterministic() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let emissions = Emissions::from_linear(&[
        vec![0.4, 0.3, 0.3],
        vec![0.3, 0.4, 0.3],
        vec![0.3, 0.3, 0.4],
        vec![0.4, 0.4, 0.2],
    ])
    .unwrap();
    let decoder = BeamSearchDecoder::default();
    let first = decoder.decode(&emissions, &alphabet).unwrap();
    let second = decoder.decode(&emissions, &alphabet).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_batch_matches_sequential() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let batch = vec![
        one_hot(3, &[1, 0, 2]),
        one_hot(3, &[2, 2, 0]),
        one_hot(3, &[0, 1, 1]),
    ];
    let decoder = BeamSearchDecoder::default();
    let parallel = decoder.decode_batch(&batch, &alphabet, None);
    for (emissions, result) in batch.iter().zip(parallel) {
        let sequential = decoder.decode(emissions, &alphabet).unwrap();
        assert_eq!(result.unwrap(), sequential);
    }
}

#[test]
fn test_invalid_inputs_fail_fast() {
    let alphabet = Alphabet::parse("-AB", 0).unwrap();
    let emissions = one_hot(2, &[0, 1]);
    let decoder = BeamSearchDecoder::default();
    assert!(matches!(
        decoder.decode(&emissions, &alphabet),
        Err(DecodeError::AlphabetMismatch {
            matrix: 2,
            alphabet: 3
        })
    ));

    let emissions = one_hot(3, &[0, 1]);
    let zero_width = BeamSearchDecoder::new(DecoderConfig::default().with_beam_width(0));
    assert!(matches!(
        zero_width.decode(&emissions, &alphabet),
        Err(DecodeError::InvalidBeamWidth)
    ));
    let zero_results = BeamSearchDecoder::new(DecoderConfig::default().with_max_results(0));
    assert!(matches!(
        zero_results.decode(&emissions, &alphabet),
        Err(DecodeError::InvalidResultCount)
    ));
}
