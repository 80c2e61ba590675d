use crate::context::ContextId;
use crate::error::GrammarError;
use serde::{Deserialize, Serialize};

/// Directed composition graph over child contexts.
///
/// Vertices are positions holding a child context; edges sequence one
/// sub-grammar after another. Adjacency lists, never raw pointers, so the
/// structure clones and serializes safely.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextGraph {
    vertices: Vec<ContextId>,
    out_edges: Vec<Vec<usize>>,
    sources: Vec<usize>,
}

impl ContextGraph {
    pub(crate) fn new(
        vertices: Vec<ContextId>,
        edges: &[(usize, usize)],
        explicit_sources: Option<Vec<usize>>,
    ) -> Result<Self, GrammarError> {
        if vertices.is_empty() {
            return Err(GrammarError::EmptyGraph);
        }
        let n = vertices.len();
        let mut out_edges = vec![Vec::new(); n];
        let mut in_degree = vec![0usize; n];
        for &(from, to) in edges {
            if from >= n || to >= n {
                return Err(GrammarError::EdgeOutOfRange {
                    from,
                    to,
                    vertices: n,
                });
            }
            out_edges[from].push(to);
            in_degree[to] += 1;
        }
        let sources = match explicit_sources {
            Some(sources) => {
                for &s in &sources {
                    if s >= n {
                        return Err(GrammarError::SourceOutOfRange {
                            vertex: s,
                            vertices: n,
                        });
                    }
                }
                sources
            }
            None => (0..n).filter(|&v| in_degree[v] == 0).collect(),
        };
        if sources.is_empty() {
            return Err(GrammarError::NoEntryVertex);
        }
        Ok(Self {
            vertices,
            out_edges,
            sources,
        })
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn context_at(&self, vertex: usize) -> ContextId {
        self.vertices[vertex]
    }

    pub fn out_neighbors(&self, vertex: usize) -> &[usize] {
        &self.out_edges[vertex]
    }

    /// Entry vertices of the graph.
    pub fn sources(&self) -> &[usize] {
        &self.sources
    }

    /// A vertex with no outgoing edge terminates the graph.
    pub fn is_terminal(&self, vertex: usize) -> bool {
        self.out_edges[vertex].is_empty()
    }

    pub(crate) fn vertices(&self) -> &[ContextId] {
        &self.vertices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_from_in_degree() {
        let g = ContextGraph::new(vec![10, 11, 12], &[(0, 2), (1, 2)], None).unwrap();
        assert_eq!(g.sources(), &[0, 1]);
        assert!(g.is_terminal(2));
        assert!(!g.is_terminal(0));
        assert_eq!(g.out_neighbors(0), &[2]);
    }

    #[test]
    fn test_explicit_sources() {
        // A cycle has no in-degree-0 vertex; entry points must be named.
        assert!(matches!(
            ContextGraph::new(vec![10, 11], &[(0, 1), (1, 0)], None),
            Err(GrammarError::NoEntryVertex)
        ));
        let g = ContextGraph::new(vec![10, 11], &[(0, 1), (1, 0)], Some(vec![0])).unwrap();
        assert_eq!(g.sources(), &[0]);
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            ContextGraph::new(Vec::new(), &[], None),
            Err(GrammarError::EmptyGraph)
        ));
        assert!(matches!(
            ContextGraph::new(vec![10], &[(0, 3)], None),
            Err(GrammarError::EdgeOutOfRange { to: 3, .. })
        ));
        assert!(matches!(
            ContextGraph::new(vec![10], &[], Some(vec![7])),
            Err(GrammarError::SourceOutOfRange { vertex: 7, .. })
        ));
    }
}
