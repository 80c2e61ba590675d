use crate::context::{ContextId, ContextKind, ContextNode, Grammar};
use crate::vocabulary::{TrieNode, NO_CHILD};
use crate::SEPARATOR;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use trellis_core::{log_sum_exp, F, LOG_ZERO};

/// Admissible next characters mapped to their automaton positions.
///
/// Ordered by character so every traversal of the same grammar enumerates
/// transitions identically.
pub type Transitions = BTreeMap<char, SearchState>;

/// Resume point inside an enclosing graph context.
///
/// Frames chain upward through nested graphs; they are lookup data standing
/// in for the parent back-reference walk, never ownership edges.
#[derive(Debug)]
struct Frame {
    graph: ContextId,
    vertex: usize,
    /// Completed iterations of the enclosing graph.
    repeats: u32,
    up: Option<Arc<Frame>>,
}

/// Variant-specific position within a context.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Cursor {
    /// Before the first character of the current iteration: a fresh start
    /// or the position just after the repeat separator.
    Entry,
    /// Charset: the one character of this iteration has been consumed.
    Consumed,
    /// Vocabulary: at this node of the packed trie.
    Node(u32),
}

/// One lazily-expanded automaton position.
///
/// Immutable once created apart from the transition cache, which is filled
/// at most once; concurrent first-time traversal resolves through the
/// guarded single assignment.
pub struct State {
    context: ContextId,
    ch: Option<char>,
    word_end: bool,
    context_word_end: bool,
    char_log_prob: F,
    word_end_log_prob: F,
    /// Iterations of `context` completed before the current one.
    repeat_count: u32,
    cursor: Cursor,
    frame: Option<Arc<Frame>>,
    next: OnceLock<Option<Transitions>>,
}

impl State {
    fn entry(context: ContextId, repeat_count: u32, frame: Option<Arc<Frame>>) -> Self {
        Self {
            context,
            ch: None,
            word_end: false,
            context_word_end: false,
            char_log_prob: 0.0,
            word_end_log_prob: LOG_ZERO,
            repeat_count,
            cursor: Cursor::Entry,
            frame,
            next: OnceLock::new(),
        }
    }

    /// Position just after the repeat separator; probability-neutral.
    fn separator(context: ContextId, repeat_count: u32, frame: Option<Arc<Frame>>) -> Self {
        Self {
            ch: Some(SEPARATOR),
            ..Self::entry(context, repeat_count, frame)
        }
    }

    /// The character consumed to reach this state; None for entry states.
    pub fn ch(&self) -> Option<char> {
        self.ch
    }

    /// Legal stop for the whole grammar.
    pub fn word_end(&self) -> bool {
        self.word_end
    }

    /// The innermost context finished an iteration here.
    pub fn context_word_end(&self) -> bool {
        self.context_word_end
    }

    pub fn char_log_prob(&self) -> F {
        self.char_log_prob
    }

    pub fn word_end_log_prob(&self) -> F {
        self.word_end_log_prob
    }

    pub fn repeat_count(&self) -> u32 {
        self.repeat_count
    }

    /// One-step continuations, or None when this branch is terminal.
    pub fn next_states(&self, grammar: &Grammar) -> Option<&Transitions> {
        self.next.get_or_init(|| self.compute_next(grammar)).as_ref()
    }

    fn completes_iteration(&self, grammar: &Grammar) -> bool {
        match self.cursor {
            Cursor::Consumed => true,
            Cursor::Node(idx) => match &grammar.context(self.context).kind {
                ContextKind::Vocabulary(v) => v.node(idx).word_end,
                _ => false,
            },
            Cursor::Entry => false,
        }
    }

    fn compute_next(&self, grammar: &Grammar) -> Option<Transitions> {
        let mut map = Transitions::new();
        // Continuations inside the current context.
        match self.cursor {
            Cursor::Entry => {
                entry_transitions(grammar, self.context, self.repeat_count, &self.frame, &mut map)
            }
            Cursor::Consumed => {}
            Cursor::Node(idx) => {
                if let ContextKind::Vocabulary(v) = &grammar.context(self.context).kind {
                    let child = v.node(idx).child;
                    if child != NO_CHILD {
                        for (i, node) in v.siblings(child) {
                            merge(
                                &mut map,
                                node.ch,
                                SearchState::single(trie_state(
                                    grammar,
                                    self.context,
                                    i,
                                    node,
                                    self.repeat_count,
                                    self.frame.clone(),
                                )),
                            );
                        }
                    }
                }
            }
        }
        // Splices once the current iteration completes.
        if self.completes_iteration(grammar) {
            let ctx = grammar.context(self.context);
            let done = self.repeat_count + 1;
            if done < ctx.max_repeat {
                merge(
                    &mut map,
                    SEPARATOR,
                    SearchState::single(State::separator(self.context, done, self.frame.clone())),
                );
            }
            if done >= ctx.min_repeat {
                resume_enclosing(grammar, self.frame.as_ref(), ctx.is_tail, &mut map);
            }
        }
        if map.is_empty() {
            None
        } else {
            Some(map)
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("context", &self.context)
            .field("ch", &self.ch)
            .field("word_end", &self.word_end)
            .field("context_word_end", &self.context_word_end)
            .field("repeat_count", &self.repeat_count)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

/// An automaton position carried by a hypothesis: either a single state or
/// the simultaneous union of several branches.
#[derive(Clone, Debug)]
pub enum SearchState {
    Single(Arc<State>),
    Composite(Arc<CompositeState>),
}

/// Union of branches explored at once (multi-source graphs, per-character
/// merges). Its transitions are the per-character union of its members'.
pub struct CompositeState {
    members: Vec<Arc<State>>,
    next: OnceLock<Option<Transitions>>,
}

impl fmt::Debug for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeState")
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl SearchState {
    pub(crate) fn initial(grammar: &Grammar, root: ContextId) -> SearchState {
        match &grammar.context(root).kind {
            ContextKind::Graph(g) => {
                let members: Vec<Arc<State>> = g
                    .sources()
                    .iter()
                    .map(|&v| {
                        let frame = Arc::new(Frame {
                            graph: root,
                            vertex: v,
                            repeats: 0,
                            up: None,
                        });
                        Arc::new(State::entry(g.context_at(v), 0, Some(frame)))
                    })
                    .collect();
                SearchState::from_members(members)
            }
            _ => SearchState::Single(Arc::new(State::entry(root, 0, None))),
        }
    }

    fn single(state: State) -> SearchState {
        SearchState::Single(Arc::new(state))
    }

    fn from_members(mut members: Vec<Arc<State>>) -> SearchState {
        debug_assert!(!members.is_empty());
        if members.len() == 1 {
            SearchState::Single(members.pop().unwrap())
        } else {
            SearchState::Composite(Arc::new(CompositeState {
                members,
                next: OnceLock::new(),
            }))
        }
    }

    fn member_iter(&self) -> std::slice::Iter<'_, Arc<State>> {
        match self {
            SearchState::Single(s) => std::slice::from_ref(s).iter(),
            SearchState::Composite(c) => c.members.iter(),
        }
    }

    /// One-step continuations, or None when every branch is terminal.
    pub fn next_states(&self, grammar: &Grammar) -> Option<&Transitions> {
        match self {
            SearchState::Single(s) => s.next_states(grammar),
            SearchState::Composite(c) => c
                .next
                .get_or_init(|| {
                    let mut map = Transitions::new();
                    for member in &c.members {
                        if let Some(trans) = member.next_states(grammar) {
                            for (&ch, st) in trans {
                                merge(&mut map, ch, st.clone());
                            }
                        }
                    }
                    if map.is_empty() {
                        None
                    } else {
                        Some(map)
                    }
                })
                .as_ref(),
        }
    }

    /// Any branch marks a legal stop.
    pub fn is_word_end(&self) -> bool {
        self.member_iter().any(|m| m.word_end())
    }

    pub fn char_log_prob(&self) -> F {
        self.member_iter()
            .fold(LOG_ZERO, |acc, m| log_sum_exp(acc, m.char_log_prob()))
    }

    pub fn word_end_log_prob(&self) -> F {
        self.member_iter()
            .filter(|m| m.word_end())
            .fold(LOG_ZERO, |acc, m| log_sum_exp(acc, m.word_end_log_prob()))
    }

    /// Associative branch union; identical members collapse, no reachable
    /// transition is lost.
    pub fn union(a: &SearchState, b: &SearchState) -> SearchState {
        let mut members: Vec<Arc<State>> = Vec::new();
        for m in a.member_iter().chain(b.member_iter()) {
            if !members.iter().any(|e| Arc::ptr_eq(e, m)) {
                members.push(m.clone());
            }
        }
        SearchState::from_members(members)
    }

    pub fn n_members(&self) -> usize {
        self.member_iter().len()
    }
}

fn merge(map: &mut Transitions, ch: char, st: SearchState) {
    use std::collections::btree_map::Entry;
    match map.entry(ch) {
        Entry::Occupied(mut e) => {
            let merged = SearchState::union(e.get(), &st);
            *e.get_mut() = merged;
        }
        Entry::Vacant(e) => {
            e.insert(st);
        }
    }
}

/// First-character transitions of a context, merged into `map`. Graphs
/// recurse into their source vertices, pushing a resume frame.
fn entry_transitions(
    grammar: &Grammar,
    context: ContextId,
    repeats: u32,
    frame: &Option<Arc<Frame>>,
    map: &mut Transitions,
) {
    match &grammar.context(context).kind {
        ContextKind::Charset(cs) => {
            for (ch, log_w) in cs.iter() {
                merge(
                    map,
                    ch,
                    SearchState::single(charset_state(
                        grammar,
                        context,
                        ch,
                        log_w,
                        repeats,
                        frame.clone(),
                    )),
                );
            }
        }
        ContextKind::Vocabulary(v) => {
            for (i, node) in v.siblings(v.root()) {
                merge(
                    map,
                    node.ch,
                    SearchState::single(trie_state(grammar, context, i, node, repeats, frame.clone())),
                );
            }
        }
        ContextKind::Graph(g) => {
            for &v in g.sources() {
                let child = g.context_at(v);
                let f = Arc::new(Frame {
                    graph: context,
                    vertex: v,
                    repeats,
                    up: frame.clone(),
                });
                entry_transitions(grammar, child, 0, &Some(f), map);
            }
        }
    }
}

/// Continuations after the context at `frame.vertex` completed: the entry
/// transitions of its out-neighbors, plus the enclosing graph's own repeat
/// and resume splices when a tail vertex completed.
fn resume_enclosing(
    grammar: &Grammar,
    frame: Option<&Arc<Frame>>,
    completed_is_tail: bool,
    map: &mut Transitions,
) {
    let Some(f) = frame else { return };
    let ContextKind::Graph(g) = &grammar.context(f.graph).kind else {
        return;
    };
    for &v in g.out_neighbors(f.vertex) {
        let child = g.context_at(v);
        let nf = Arc::new(Frame {
            graph: f.graph,
            vertex: v,
            repeats: f.repeats,
            up: f.up.clone(),
        });
        entry_transitions(grammar, child, 0, &Some(nf), map);
    }
    if completed_is_tail {
        let gctx = grammar.context(f.graph);
        let done = f.repeats + 1;
        if done < gctx.max_repeat {
            merge(
                map,
                SEPARATOR,
                SearchState::single(State::separator(f.graph, done, f.up.clone())),
            );
        }
        if done >= gctx.min_repeat {
            resume_enclosing(grammar, f.up.as_ref(), gctx.is_tail, map);
        }
    }
}

/// Whether stopping here is legal for the whole grammar: the context is a
/// tail of its enclosing grammar and every enclosing level has met its
/// repeat bound.
fn stop_legal(grammar: &Grammar, ctx: &ContextNode, frame: Option<&Arc<Frame>>) -> bool {
    if !ctx.is_tail {
        return false;
    }
    match frame {
        None => true,
        Some(f) => {
            let enclosing = grammar.context(f.graph);
            f.repeats + 1 >= enclosing.min_repeat && stop_legal(grammar, enclosing, f.up.as_ref())
        }
    }
}

fn charset_state(
    grammar: &Grammar,
    context: ContextId,
    ch: char,
    log_weight: F,
    repeats: u32,
    frame: Option<Arc<Frame>>,
) -> State {
    let ctx = grammar.context(context);
    let context_word_end = repeats + 1 >= ctx.min_repeat;
    let word_end = context_word_end && stop_legal(grammar, ctx, frame.as_ref());
    State {
        context,
        ch: Some(ch),
        word_end,
        context_word_end,
        char_log_prob: log_weight,
        // A charset character always completes its iteration.
        word_end_log_prob: 0.0,
        repeat_count: repeats,
        cursor: Cursor::Consumed,
        frame,
        next: OnceLock::new(),
    }
}

fn trie_state(
    grammar: &Grammar,
    context: ContextId,
    idx: u32,
    node: &TrieNode,
    repeats: u32,
    frame: Option<Arc<Frame>>,
) -> State {
    let ctx = grammar.context(context);
    let context_word_end = node.word_end && repeats + 1 >= ctx.min_repeat;
    let word_end = context_word_end && stop_legal(grammar, ctx, frame.as_ref());
    State {
        context,
        ch: Some(node.ch),
        word_end,
        context_word_end,
        char_log_prob: node.char_log_freq,
        word_end_log_prob: node.word_end_log_freq,
        repeat_count: repeats,
        cursor: Cursor::Node(idx),
        frame,
        next: OnceLock::new(),
    }
}
