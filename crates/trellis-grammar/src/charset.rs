use crate::error::GrammarError;
use crate::SEPARATOR;
use serde::{Deserialize, Serialize};
use trellis_core::F;

/// Weighted set of admissible characters.
///
/// Weights are normalized to sum to 1 over the set. The reserved separator
/// never takes part in the normalization: it is reachable only through the
/// mid-repeat splice, never as a first or doubled character, so a separator
/// entry in the input set is dropped here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Charset {
    chars: Vec<char>,
    log_weights: Vec<F>,
}

impl Charset {
    pub(crate) fn new<I>(weights: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = (char, F)>,
    {
        let mut chars = Vec::new();
        let mut linear = Vec::new();
        for (ch, weight) in weights {
            if ch == SEPARATOR {
                continue;
            }
            if !weight.is_finite() || weight <= 0.0 {
                return Err(GrammarError::InvalidWeight { ch, weight });
            }
            chars.push(ch);
            linear.push(weight);
        }
        if chars.is_empty() {
            return Err(GrammarError::EmptyCharset);
        }
        let total: F = linear.iter().sum();
        let log_weights = linear.iter().map(|w| (w / total).ln()).collect();
        Ok(Self { chars, log_weights })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Characters with their normalized log-frequencies.
    pub fn iter(&self) -> impl Iterator<Item = (char, F)> + '_ {
        self.chars
            .iter()
            .zip(self.log_weights.iter())
            .map(|(&c, &w)| (c, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalization() {
        let cs = Charset::new([('a', 3.0), ('b', 1.0)]).unwrap();
        let weights: Vec<(char, F)> = cs.iter().collect();
        assert_eq!(weights.len(), 2);
        assert_relative_eq!(weights[0].1.exp(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(weights[1].1.exp(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_separator_excluded() {
        let cs = Charset::new([('a', 1.0), (' ', 5.0)]).unwrap();
        assert_eq!(cs.len(), 1);
        let (ch, lw) = cs.iter().next().unwrap();
        assert_eq!(ch, 'a');
        assert_relative_eq!(lw, 0.0);
    }

    #[test]
    fn test_empty_fails() {
        assert!(matches!(
            Charset::new(std::iter::empty()),
            Err(GrammarError::EmptyCharset)
        ));
        // A set holding only the separator is empty after exclusion.
        assert!(matches!(
            Charset::new([(' ', 1.0)]),
            Err(GrammarError::EmptyCharset)
        ));
    }

    #[test]
    fn test_bad_weight_fails() {
        assert!(matches!(
            Charset::new([('a', 0.0)]),
            Err(GrammarError::InvalidWeight { ch: 'a', .. })
        ));
        assert!(matches!(
            Charset::new([('a', f64::NAN)]),
            Err(GrammarError::InvalidWeight { ch: 'a', .. })
        ));
    }
}
