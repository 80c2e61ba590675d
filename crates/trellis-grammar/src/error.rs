use thiserror::Error;
use trellis_core::F;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("charset has no admissible characters")]
    EmptyCharset,

    #[error("charset weight for {ch:?} is {weight}; must be finite and > 0")]
    InvalidWeight { ch: char, weight: F },

    #[error("vocabulary has no words")]
    EmptyVocabulary,

    #[error("graph context has no vertices")]
    EmptyGraph,

    #[error("graph edge ({from}, {to}) is out of range for {vertices} vertices")]
    EdgeOutOfRange {
        from: usize,
        to: usize,
        vertices: usize,
    },

    #[error("graph source vertex {vertex} is out of range for {vertices} vertices")]
    SourceOutOfRange { vertex: usize, vertices: usize },

    #[error("graph context has no entry vertex")]
    NoEntryVertex,

    #[error("unknown context id {0}")]
    UnknownContext(usize),

    #[error("context {0} is already a vertex of another graph")]
    ContextReused(usize),

    #[error("invalid repeat bounds [{min}, {max}]; require 1 <= min <= max")]
    InvalidRepeat { min: u32, max: u32 },

    #[error("root context {0} must not have a parent")]
    RootHasParent(usize),

    #[error("grammar codec error: {0}")]
    Codec(#[from] postcard::Error),
}
