pub mod charset;
pub mod context;
pub mod error;
pub mod graph;
pub mod state;
pub mod vocabulary;

/// Character spliced in where a grammar iteration repeats; the same symbol
/// the alphabet reserves for word gaps.
pub const SEPARATOR: char = trellis_core::WORD_GAP;

pub use charset::Charset;
pub use context::{ContextId, ContextKind, ContextNode, Grammar, GrammarBuilder};
pub use error::GrammarError;
pub use graph::ContextGraph;
pub use state::{CompositeState, SearchState, State, Transitions};
pub use vocabulary::{TrieNode, Vocabulary, NO_CHILD};
