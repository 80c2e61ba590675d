use crate::charset::Charset;
use crate::error::GrammarError;
use crate::graph::ContextGraph;
use crate::state::SearchState;
use crate::vocabulary::Vocabulary;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use trellis_core::F;

pub type ContextId = usize;

/// The three grammar shapes behind one closed seam.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ContextKind {
    Charset(Charset),
    Vocabulary(Vocabulary),
    Graph(ContextGraph),
}

/// One immutable grammar node.
///
/// `parent` is a non-owning back-reference into the arena, used only to
/// resume enumeration after this context completes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextNode {
    pub min_repeat: u32,
    pub max_repeat: u32,
    pub is_tail: bool,
    pub parent: Option<ContextId>,
    pub kind: ContextKind,
}

/// A compiled grammar: an arena of contexts plus the root id.
///
/// Built once, read-only afterwards; safe to share across concurrent
/// decode calls. The lazily-unfolded state machine hangs off `initial`
/// and each state's once-filled transition cache.
#[derive(Debug, Serialize, Deserialize)]
pub struct Grammar {
    contexts: Vec<ContextNode>,
    root: ContextId,
    #[serde(skip, default)]
    initial: OnceLock<SearchState>,
}

impl Grammar {
    /// Single-context grammar over a word list.
    pub fn from_words<'a, I>(words: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut builder = GrammarBuilder::new();
        let root = builder.vocabulary(words)?;
        builder.build(root)
    }

    /// Single-context grammar over a weighted character set.
    pub fn from_charset<I>(weights: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = (char, F)>,
    {
        let mut builder = GrammarBuilder::new();
        let root = builder.charset(weights)?;
        builder.build(root)
    }

    pub fn root(&self) -> ContextId {
        self.root
    }

    pub fn context(&self, id: ContextId) -> &ContextNode {
        &self.contexts[id]
    }

    pub fn n_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// The automaton's start position, computed once and shared.
    pub fn initial_state(&self) -> SearchState {
        self.initial
            .get_or_init(|| SearchState::initial(self, self.root))
            .clone()
    }

    /// Compact binary form of the context arena (state caches excluded).
    pub fn to_bytes(&self) -> Result<Vec<u8>, GrammarError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GrammarError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Assembles a context arena bottom-up, then seals it into a `Grammar`.
pub struct GrammarBuilder {
    contexts: Vec<ContextNode>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self {
            contexts: Vec::new(),
        }
    }

    fn push(&mut self, kind: ContextKind) -> ContextId {
        self.contexts.push(ContextNode {
            min_repeat: 1,
            max_repeat: 1,
            is_tail: false,
            parent: None,
            kind,
        });
        self.contexts.len() - 1
    }

    pub fn charset<I>(&mut self, weights: I) -> Result<ContextId, GrammarError>
    where
        I: IntoIterator<Item = (char, F)>,
    {
        Ok(self.push(ContextKind::Charset(Charset::new(weights)?)))
    }

    pub fn uniform_charset<I>(&mut self, chars: I) -> Result<ContextId, GrammarError>
    where
        I: IntoIterator<Item = char>,
    {
        self.charset(chars.into_iter().map(|c| (c, 1.0)))
    }

    pub fn vocabulary<'a, I>(&mut self, words: I) -> Result<ContextId, GrammarError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Ok(self.push(ContextKind::Vocabulary(Vocabulary::new(words)?)))
    }

    pub fn vocabulary_with_counts<'a, I>(&mut self, words: I) -> Result<ContextId, GrammarError>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        Ok(self.push(ContextKind::Vocabulary(Vocabulary::with_counts(words)?)))
    }

    /// Allowed repetitions of a context, `1 <= min <= max`.
    pub fn repeat(&mut self, id: ContextId, min: u32, max: u32) -> Result<(), GrammarError> {
        if id >= self.contexts.len() {
            return Err(GrammarError::UnknownContext(id));
        }
        if min == 0 || min > max {
            return Err(GrammarError::InvalidRepeat { min, max });
        }
        self.contexts[id].min_repeat = min;
        self.contexts[id].max_repeat = max;
        Ok(())
    }

    /// Compose existing contexts into a directed graph; entry vertices are
    /// those with in-degree 0.
    pub fn graph(
        &mut self,
        vertices: Vec<ContextId>,
        edges: &[(usize, usize)],
    ) -> Result<ContextId, GrammarError> {
        self.graph_inner(vertices, edges, None)
    }

    /// Same, with explicit entry vertices (needed for cyclic graphs).
    pub fn graph_with_sources(
        &mut self,
        vertices: Vec<ContextId>,
        edges: &[(usize, usize)],
        sources: Vec<usize>,
    ) -> Result<ContextId, GrammarError> {
        self.graph_inner(vertices, edges, Some(sources))
    }

    fn graph_inner(
        &mut self,
        vertices: Vec<ContextId>,
        edges: &[(usize, usize)],
        sources: Option<Vec<usize>>,
    ) -> Result<ContextId, GrammarError> {
        for &v in &vertices {
            if v >= self.contexts.len() {
                return Err(GrammarError::UnknownContext(v));
            }
            if self.contexts[v].parent.is_some() {
                return Err(GrammarError::ContextReused(v));
            }
        }
        let graph = ContextGraph::new(vertices, edges, sources)?;
        let terminal: Vec<ContextId> = (0..graph.n_vertices())
            .filter(|&v| graph.is_terminal(v))
            .map(|v| graph.context_at(v))
            .collect();
        let members: Vec<ContextId> = graph.vertices().to_vec();
        let id = self.push(ContextKind::Graph(graph));
        for v in members {
            self.contexts[v].parent = Some(id);
        }
        // A vertex with no continuation terminates its enclosing grammar.
        for v in terminal {
            self.contexts[v].is_tail = true;
        }
        Ok(id)
    }

    pub fn build(mut self, root: ContextId) -> Result<Grammar, GrammarError> {
        if root >= self.contexts.len() {
            return Err(GrammarError::UnknownContext(root));
        }
        if self.contexts[root].parent.is_some() {
            return Err(GrammarError::RootHasParent(root));
        }
        self.contexts[root].is_tail = true;
        Ok(Grammar {
            contexts: self.contexts,
            root,
            initial: OnceLock::new(),
        })
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}
