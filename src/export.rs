//! Builds owned `petgraph` graphs from the solver's internal structures, for
//! callers that want to run a library algorithm over the pointer flow graph
//! or call graph, or render one with `petgraph::dot::Dot`.
//!
//! This crate's own graphs ([`PointerFlowGraph`], [`CallGraph`]) only expose
//! the nodes that appear in an edge, so the graphs built here carry the same
//! restriction: a pointer or method with no edges at all will not appear.

use petgraph::graph::DiGraph;

use crate::callgraph::{CallEdgeKind, CallGraph};
use crate::cs::{CsMethodId, PointerId};
use crate::pfg::PointerFlowGraph;

/// Builds a `petgraph` directed graph mirroring `pfg`'s edges, with each node
/// weighted by the [`PointerId`] it represents.
#[must_use]
pub fn pfg_to_petgraph(pfg: &PointerFlowGraph) -> DiGraph<PointerId, ()> {
    let mut graph = DiGraph::new();
    let mut indices = std::collections::HashMap::new();
    let mut node_index = |graph: &mut DiGraph<PointerId, ()>, id: PointerId| {
        *indices.entry(id).or_insert_with(|| graph.add_node(id))
    };
    for (src, dst) in pfg.edges() {
        let a = node_index(&mut graph, src);
        let b = node_index(&mut graph, dst);
        graph.add_edge(a, b, ());
    }
    graph
}

/// Builds a `petgraph` directed graph mirroring `call_graph`'s edges, with
/// each node weighted by the [`CsMethodId`] it represents and each edge
/// weighted by the dispatch kind that introduced it.
#[must_use]
pub fn call_graph_to_petgraph(call_graph: &CallGraph) -> DiGraph<CsMethodId, CallEdgeKind> {
    let mut graph = DiGraph::new();
    let mut indices = std::collections::HashMap::new();
    let mut node_index = |graph: &mut DiGraph<CsMethodId, CallEdgeKind>, id: CsMethodId| {
        *indices.entry(id).or_insert_with(|| graph.add_node(id))
    };
    for edge in call_graph.edges() {
        let a = node_index(&mut graph, edge.caller);
        let b = node_index(&mut graph, edge.callee);
        graph.add_edge(a, b, edge.kind);
    }
    graph
}
