use crate::F;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("alphabet is empty")]
    EmptyAlphabet,

    #[error("blank index {blank} out of range for alphabet of {len} symbols")]
    BlankOutOfRange { blank: usize, len: usize },

    #[error("duplicate symbol {0:?} in alphabet")]
    DuplicateSymbol(char),

    #[error("emission matrix has no time steps")]
    EmptyMatrix,

    #[error("emission matrix has no symbol columns")]
    NoSymbols,

    #[error("emission row {row} has {got} entries, expected {expected}")]
    RaggedMatrix {
        row: usize,
        got: usize,
        expected: usize,
    },

    #[error("emission probability at ({t}, {symbol}) is {value}; must be finite and >= 0")]
    InvalidProbability { t: usize, symbol: usize, value: F },
}
