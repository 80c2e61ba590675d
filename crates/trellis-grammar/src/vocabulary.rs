use crate::error::GrammarError;
use serde::{Deserialize, Serialize};
use trellis_core::{F, LOG_ZERO};

/// Child index meaning "no children".
pub const NO_CHILD: u32 = u32::MAX;

/// One node of the packed word trie.
///
/// Sibling runs are contiguous in the arena and terminated by the
/// last-sibling marker, so the whole trie packs to a flat array with no
/// per-node sibling pointers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrieNode {
    pub ch: char,
    pub word_end: bool,
    pub last_sibling: bool,
    /// Arena index of the first child, or NO_CHILD.
    pub child: u32,
    /// Log of this node's share of the word paths among its siblings.
    pub char_log_freq: F,
    /// Log of the fraction of word paths through this node that end here;
    /// LOG_ZERO when no word ends at this node.
    pub word_end_log_freq: F,
}

/// Packed trie over complete words, with empirical path frequencies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vocabulary {
    nodes: Vec<TrieNode>,
}

impl Vocabulary {
    pub(crate) fn new<'a, I>(words: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::with_counts(words.into_iter().map(|w| (w, 1)))
    }

    pub(crate) fn with_counts<'a, I>(words: I) -> Result<Self, GrammarError>
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        let mut entries: Vec<(Vec<char>, u64)> = words
            .into_iter()
            .filter(|(w, count)| !w.is_empty() && *count > 0)
            .map(|(w, count)| (w.chars().collect(), count))
            .collect();
        if entries.is_empty() {
            return Err(GrammarError::EmptyVocabulary);
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        // Fold duplicate words into one entry.
        let mut merged: Vec<(Vec<char>, u64)> = Vec::with_capacity(entries.len());
        for (word, count) in entries {
            match merged.last_mut() {
                Some((prev, total)) if *prev == word => *total += count,
                _ => merged.push((word, count)),
            }
        }
        let mut nodes = Vec::new();
        pack(&mut nodes, &merged, 0);
        Ok(Self { nodes })
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, idx: u32) -> &TrieNode {
        &self.nodes[idx as usize]
    }

    /// Arena index of the first root sibling.
    pub(crate) fn root(&self) -> u32 {
        0
    }

    /// Walk a contiguous sibling run starting at `first`.
    pub(crate) fn siblings(&self, first: u32) -> impl Iterator<Item = (u32, &TrieNode)> + '_ {
        let mut next = if first == NO_CHILD {
            None
        } else {
            Some(first)
        };
        std::iter::from_fn(move || {
            let idx = next?;
            let node = &self.nodes[idx as usize];
            next = if node.last_sibling { None } else { Some(idx + 1) };
            Some((idx, node))
        })
    }
}

/// Lay out one sibling run for `entries[..][depth]`, then recurse; returns
/// the arena index of the run's first node. Entries must be sorted so equal
/// first characters are adjacent.
fn pack(nodes: &mut Vec<TrieNode>, entries: &[(Vec<char>, u64)], depth: usize) -> u32 {
    // Group by the character at this depth.
    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for i in 1..=entries.len() {
        if i == entries.len() || entries[i].0[depth] != entries[start].0[depth] {
            groups.push((start, i));
            start = i;
        }
    }
    let level_total: u64 = entries.iter().map(|(_, c)| c).sum();
    let first = nodes.len() as u32;
    for (k, &(lo, hi)) in groups.iter().enumerate() {
        let group = &entries[lo..hi];
        let through: u64 = group.iter().map(|(_, c)| c).sum();
        let ending: u64 = group
            .iter()
            .filter(|(w, _)| w.len() == depth + 1)
            .map(|(_, c)| c)
            .sum();
        nodes.push(TrieNode {
            ch: group[0].0[depth],
            word_end: ending > 0,
            last_sibling: k + 1 == groups.len(),
            child: NO_CHILD,
            char_log_freq: (through as F / level_total as F).ln(),
            word_end_log_freq: if ending > 0 {
                (ending as F / through as F).ln()
            } else {
                LOG_ZERO
            },
        });
    }
    for (k, &(lo, hi)) in groups.iter().enumerate() {
        let deeper: Vec<(Vec<char>, u64)> = entries[lo..hi]
            .iter()
            .filter(|(w, _)| w.len() > depth + 1)
            .cloned()
            .collect();
        if !deeper.is_empty() {
            let child = pack(nodes, &deeper, depth + 1);
            nodes[first as usize + k].child = child;
        }
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_packing_invariants() {
        let v = Vocabulary::new(["ab", "ac", "b"]).unwrap();
        // Root run: 'a' then 'b', contiguous, terminated by the marker.
        let roots: Vec<(u32, char, bool)> = v
            .siblings(v.root())
            .map(|(i, n)| (i, n.ch, n.last_sibling))
            .collect();
        assert_eq!(roots.len(), 2);
        assert_eq!((roots[0].1, roots[0].2), ('a', false));
        assert_eq!((roots[1].1, roots[1].2), ('b', true));
        assert_eq!(roots[1].0, roots[0].0 + 1);

        let a = v.node(roots[0].0);
        assert!(!a.word_end);
        assert_ne!(a.child, NO_CHILD);
        let b = v.node(roots[1].0);
        assert!(b.word_end);
        assert_eq!(b.child, NO_CHILD);

        let children: Vec<char> = v.siblings(a.child).map(|(_, n)| n.ch).collect();
        assert_eq!(children, vec!['b', 'c']);
    }

    #[test]
    fn test_frequencies() {
        let v = Vocabulary::with_counts([("ab", 3), ("ac", 1), ("b", 4)]).unwrap();
        let roots: Vec<&TrieNode> = v.siblings(v.root()).map(|(_, n)| n).collect();
        // 'a' carries 4 of 8 word paths, 'b' the other 4.
        assert_relative_eq!(roots[0].char_log_freq.exp(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(roots[1].char_log_freq.exp(), 0.5, epsilon = 1e-12);
        // Every path through root 'b' ends there.
        assert_relative_eq!(roots[1].word_end_log_freq.exp(), 1.0, epsilon = 1e-12);

        let children: Vec<&TrieNode> = v.siblings(roots[0].child).map(|(_, n)| n).collect();
        assert_relative_eq!(children[0].char_log_freq.exp(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(children[1].char_log_freq.exp(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_word_end_freq_on_prefix_word() {
        // "an" ends at the 'n' node that one of three paths stops at.
        let v = Vocabulary::with_counts([("an", 1), ("and", 2)]).unwrap();
        let (_, a) = v.siblings(v.root()).next().unwrap();
        let (_, n) = v.siblings(a.child).next().unwrap();
        assert!(n.word_end);
        assert_relative_eq!(n.word_end_log_freq.exp(), 1.0 / 3.0, epsilon = 1e-12);
        assert_ne!(n.child, NO_CHILD);
    }

    #[test]
    fn test_duplicates_fold() {
        let v = Vocabulary::new(["a", "a", "b"]).unwrap();
        let roots: Vec<&TrieNode> = v.siblings(v.root()).map(|(_, n)| n).collect();
        assert_eq!(roots.len(), 2);
        assert_relative_eq!(roots[0].char_log_freq.exp(), 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_fails() {
        assert!(matches!(
            Vocabulary::new(std::iter::empty::<&str>()),
            Err(GrammarError::EmptyVocabulary)
        ));
        assert!(matches!(
            Vocabulary::new([""]),
            Err(GrammarError::EmptyVocabulary)
        ));
    }
}
