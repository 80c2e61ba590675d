use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("emission matrix has {matrix} symbol columns but the alphabet has {alphabet}")]
    AlphabetMismatch { matrix: usize, alphabet: usize },

    #[error("beam width must be at least 1")]
    InvalidBeamWidth,

    #[error("maximum result count must be at least 1")]
    InvalidResultCount,
}
