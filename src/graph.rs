//! Control-flow graph shapes consumed by the dataflow engine, plus a small
//! concrete graph implementation callers can use to build fixtures.
//!
//! Building a graph that reflects a method's actual branching structure is
//! the caller's job; this crate only consumes graphs, it does not build
//! them. [`SimpleGraph`] is a plain consumed-graph container, built from an
//! explicit edge list rather than any bytecode- or source-aware builder.

use std::collections::BTreeMap;

use crate::ir::{MethodRef, StmtId};

/// The kind of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    /// An ordinary fallthrough or unconditional edge.
    Normal,
    /// The `if` branch taken when the condition is true.
    IfTrue,
    /// The `if` branch taken when the condition is false.
    IfFalse,
    /// A `switch` branch matching the given case value.
    SwitchCase(i32),
    /// The `switch` branch taken when no case matches.
    SwitchDefault,
    /// An interprocedural edge from a call site into the callee's entry.
    Call,
    /// An interprocedural edge from a call site directly to its
    /// fallthrough, skipping the callee (used to kill the call result
    /// binding so it can only flow back in along a [`EdgeKind::Return`]
    /// edge).
    CallToReturn,
    /// An interprocedural edge from a callee's return statement back to its
    /// call site's fallthrough.
    Return,
}

/// A flow graph over some node type, directed, with edges tagged by
/// [`EdgeKind`]. Implemented both by [`SimpleGraph`] (intraprocedural CFGs)
/// and by [`crate::icp::InterproceduralGraph`] (whole-program ICFGs).
pub trait FlowGraph {
    /// The graph's node type (a statement location, or an interprocedural
    /// `(method, statement)` pair).
    type Node: Copy + Eq + Ord + std::fmt::Debug;

    /// All nodes reachable through this graph.
    fn nodes(&self) -> Vec<Self::Node>;

    /// The boundary nodes that receive the analysis's initial fact (the
    /// method entry for intraprocedural graphs, or every reachable method's
    /// entry for an ICFG).
    fn entries(&self) -> Vec<Self::Node>;

    /// Outgoing edges from `n`.
    fn succs(&self, n: Self::Node) -> Vec<(Self::Node, EdgeKind)>;

    /// Incoming edges to `n`.
    fn preds(&self, n: Self::Node) -> Vec<(Self::Node, EdgeKind)>;
}

/// A node identifying a statement in the context of the whole program: the
/// method that contains it plus its local statement id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Loc {
    pub method: MethodRef,
    pub stmt: StmtId,
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.method, self.stmt)
    }
}

/// A generic directed graph keyed by an explicit edge list (`BTreeMap`-backed,
/// one entry per node holding its outgoing edges).
#[derive(Debug, Clone, Default)]
pub struct SimpleGraph<N: Ord + Copy> {
    entry: Option<N>,
    succs: BTreeMap<N, Vec<(N, EdgeKind)>>,
    preds: BTreeMap<N, Vec<(N, EdgeKind)>>,
}

impl<N: Ord + Copy + std::fmt::Debug> SimpleGraph<N> {
    /// Builds a graph from an explicit `(source, target, kind)` edge list.
    /// Nodes with no outgoing edges (e.g. exits) must still appear as a
    /// source of at least one edge, or be added via [`Self::add_node`], to
    /// be visible to [`FlowGraph::nodes`].
    #[must_use]
    pub fn from_edges(entry: N, edges: impl IntoIterator<Item = (N, N, EdgeKind)>) -> Self {
        let mut graph = Self {
            entry: Some(entry),
            succs: BTreeMap::new(),
            preds: BTreeMap::new(),
        };
        graph.add_node(entry);
        for (src, dst, kind) in edges {
            graph.succs.entry(src).or_default().push((dst, kind));
            graph.preds.entry(dst).or_default().push((src, kind));
            graph.add_node(src);
            graph.add_node(dst);
        }
        graph
    }

    /// Registers a node with no edges yet (e.g. an isolated exit), so it
    /// still shows up in [`FlowGraph::nodes`].
    pub fn add_node(&mut self, n: N) {
        self.succs.entry(n).or_default();
        self.preds.entry(n).or_default();
    }
}

impl<N: Ord + Copy + std::fmt::Debug> FlowGraph for SimpleGraph<N> {
    type Node = N;

    fn nodes(&self) -> Vec<N> {
        self.succs.keys().copied().collect()
    }

    fn entries(&self) -> Vec<N> {
        self.entry.into_iter().collect()
    }

    fn succs(&self, n: N) -> Vec<(N, EdgeKind)> {
        self.succs.get(&n).cloned().unwrap_or_default()
    }

    fn preds(&self, n: N) -> Vec<(N, EdgeKind)> {
        self.preds.get(&n).cloned().unwrap_or_default()
    }
}

/// Adapts any [`FlowGraph`] so its [`FlowGraph::entries`] reports the nodes
/// with no outgoing edges (the graph's exits) instead of whatever its
/// underlying `entries()` returns.
///
/// [`crate::dataflow::solve`] anchors its boundary fact at `entries()`
/// regardless of direction; a forward analysis wants that to be the method
/// entry, a backward one (e.g. [`crate::liveness`]) wants it to be the
/// exit(s). Wrapping here lets one [`FlowGraph`] implementation serve both
/// without the graph itself knowing which direction it will be solved in.
pub struct ExitBoundary<'g, G>(pub &'g G);

impl<'g, G: FlowGraph> FlowGraph for ExitBoundary<'g, G> {
    type Node = G::Node;

    fn nodes(&self) -> Vec<Self::Node> {
        self.0.nodes()
    }

    fn entries(&self) -> Vec<Self::Node> {
        self.0
            .nodes()
            .into_iter()
            .filter(|&n| self.0.succs(n).is_empty())
            .collect()
    }

    fn succs(&self, n: Self::Node) -> Vec<(Self::Node, EdgeKind)> {
        self.0.succs(n)
    }

    fn preds(&self, n: Self::Node) -> Vec<(Self::Node, EdgeKind)> {
        self.0.preds(n)
    }
}
