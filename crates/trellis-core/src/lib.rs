pub mod alphabet;
pub mod emissions;
pub mod error;
pub mod logprob;

// Core types
pub type F = f64;
pub type SymbolId = usize;

pub use alphabet::{Alphabet, WORD_GAP};
pub use emissions::Emissions;
pub use error::CoreError;
pub use logprob::{log_sum_exp, LOG_ZERO};
