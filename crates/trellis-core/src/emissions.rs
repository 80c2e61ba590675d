use crate::error::CoreError;
use crate::{F, SymbolId};
use nalgebra::DMatrix;

/// Per-time-step class log-probabilities, T rows by A symbol columns.
///
/// Input rows are linear probabilities in [0, 1]; they are converted to
/// natural logs once at construction. A zero probability becomes LOG_ZERO
/// and combines cleanly through the rest of the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct Emissions {
    log_probs: DMatrix<F>,
}

impl Emissions {
    /// Build from linear probability rows, one row per time step.
    pub fn from_linear(rows: &[Vec<F>]) -> Result<Self, CoreError> {
        if rows.is_empty() {
            return Err(CoreError::EmptyMatrix);
        }
        let width = rows[0].len();
        if width == 0 {
            return Err(CoreError::NoSymbols);
        }
        for (t, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(CoreError::RaggedMatrix {
                    row: t,
                    got: row.len(),
                    expected: width,
                });
            }
            for (symbol, &value) in row.iter().enumerate() {
                if !value.is_finite() || value < 0.0 {
                    return Err(CoreError::InvalidProbability { t, symbol, value });
                }
            }
        }
        let log_probs = DMatrix::from_fn(rows.len(), width, |t, a| rows[t][a].ln());
        Ok(Self { log_probs })
    }

    pub fn n_steps(&self) -> usize {
        self.log_probs.nrows()
    }

    pub fn n_symbols(&self) -> usize {
        self.log_probs.ncols()
    }

    pub fn log_prob(&self, t: usize, symbol: SymbolId) -> F {
        self.log_probs[(t, symbol)]
    }

    /// The `k` most probable symbols at step `t`, excluding those in
    /// `skip`, descending by probability with index order breaking ties.
    pub fn top_symbols(&self, t: usize, k: usize, skip: &[SymbolId]) -> Vec<SymbolId> {
        let mut order: Vec<SymbolId> = (0..self.n_symbols())
            .filter(|a| !skip.contains(a))
            .collect();
        order.sort_by(|&a, &b| self.log_probs[(t, b)].total_cmp(&self.log_probs[(t, a)]));
        order.truncate(k);
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_conversion() {
        let em = Emissions::from_linear(&[vec![0.5, 0.5], vec![1.0, 0.0]]).unwrap();
        assert_eq!(em.n_steps(), 2);
        assert_eq!(em.n_symbols(), 2);
        assert_relative_eq!(em.log_prob(0, 0), (0.5f64).ln());
        assert_eq!(em.log_prob(1, 0), 0.0);
        assert_eq!(em.log_prob(1, 1), f64::NEG_INFINITY);
    }

    #[test]
    fn test_top_symbols() {
        let em = Emissions::from_linear(&[vec![0.4, 0.1, 0.2, 0.3]]).unwrap();
        assert_eq!(em.top_symbols(0, 2, &[0]), vec![3, 2]);
        assert_eq!(em.top_symbols(0, 10, &[0]), vec![3, 2, 1]);
        assert_eq!(em.top_symbols(0, 2, &[0, 3]), vec![2, 1]);
    }

    #[test]
    fn test_top_symbols_tie_order() {
        let em = Emissions::from_linear(&[vec![0.25, 0.25, 0.25, 0.25]]).unwrap();
        // Equal probabilities keep index order.
        assert_eq!(em.top_symbols(0, 3, &[0]), vec![1, 2, 3]);
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            Emissions::from_linear(&[]),
            Err(CoreError::EmptyMatrix)
        ));
        assert!(matches!(
            Emissions::from_linear(&[Vec::new()]),
            Err(CoreError::NoSymbols)
        ));
        assert!(matches!(
            Emissions::from_linear(&[vec![0.5, 0.5], vec![1.0]]),
            Err(CoreError::RaggedMatrix {
                row: 1,
                got: 1,
                expected: 2
            })
        ));
        assert!(matches!(
            Emissions::from_linear(&[vec![0.5, -0.1]]),
            Err(CoreError::InvalidProbability { t: 0, symbol: 1, .. })
        ));
        assert!(matches!(
            Emissions::from_linear(&[vec![f64::NAN, 0.5]]),
            Err(CoreError::InvalidProbability { t: 0, symbol: 0, .. })
        ));
    }
}
