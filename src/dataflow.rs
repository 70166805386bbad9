//! A generic forward/backward worklist solver over any [`FlowGraph`].
//!
//! [`crate::icp`] instantiates this forward, over an interprocedural graph;
//! [`crate::liveness`] instantiates it backward, over a single method's
//! intraprocedural graph. Both share this module's fixed-point loop and the
//! [`ExtraWork`] extension point used for alias-driven reprocessing that
//! isn't visible as an ordinary graph edge.

use std::collections::{BTreeMap, VecDeque};

use crate::graph::{EdgeKind, FlowGraph};

/// A bounded join-semilattice fact propagated through a [`FlowGraph`].
pub trait Lattice: Clone + PartialEq {
    /// The least-informative fact (absorbed by any other fact under meet).
    fn bottom() -> Self;

    /// Merges two facts where control flow joins.
    fn meet(&self, other: &Self) -> Self;
}

/// A direction of dataflow propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from entry to exit; `IN` is derived from predecessors.
    Forward,
    /// Facts flow from exit to entry; `OUT` is derived from successors.
    Backward,
}

/// A handle a [`FlowAnalysis`] implementation uses to request extra
/// reprocessing of a node that isn't reachable via an ordinary graph edge
/// from the node currently being transferred (e.g. a store statement
/// requesting that an aliased load be re-visited).
pub struct ExtraWork<'a, N> {
    queue: &'a mut VecDeque<N>,
}

impl<'a, N> ExtraWork<'a, N> {
    /// Schedules `node` for reprocessing.
    pub fn add_node(&mut self, node: N) {
        self.queue.push_back(node);
    }
}

/// The transfer functions for one dataflow analysis instance.
pub trait FlowAnalysis<G: FlowGraph, L: Lattice> {
    /// The fact installed at a boundary node before any propagation.
    fn entry_fact(&self, entry: G::Node) -> L;

    /// Computes the node's effect on the incoming fact, returning its `OUT`
    /// (forward) or `IN` (backward) fact. May call back into `extra` to
    /// request reprocessing of nodes outside the graph's own edges.
    fn node_transfer(&mut self, node: G::Node, fact: &L, extra: &mut ExtraWork<'_, G::Node>) -> L;

    /// Projects a fact across an edge before it is merged at the edge's
    /// other endpoint. The default is the identity transfer (an ordinary
    /// control-flow edge carries its fact unchanged); interprocedural edges
    /// (call/call-to-return/return) override this.
    fn edge_transfer(&mut self, _from: G::Node, _to: G::Node, _kind: EdgeKind, fact: &L) -> L {
        fact.clone()
    }
}

/// The `IN`/`OUT` facts computed at every node of a [`FlowGraph`].
#[derive(Debug, Clone)]
pub struct DataflowResult<N: Ord, L> {
    in_facts: BTreeMap<N, L>,
    out_facts: BTreeMap<N, L>,
}

impl<N: Ord + Copy, L: Lattice> DataflowResult<N, L> {
    /// The fact flowing into `node`, or `bottom()` if `node` was never
    /// reached.
    #[must_use]
    pub fn get_in_fact(&self, node: N) -> L {
        self.in_facts.get(&node).cloned().unwrap_or_else(L::bottom)
    }

    /// The fact flowing out of `node`, or `bottom()` if `node` was never
    /// reached.
    #[must_use]
    pub fn get_out_fact(&self, node: N) -> L {
        self.out_facts
            .get(&node)
            .cloned()
            .unwrap_or_else(L::bottom)
    }

    /// A result with no facts recorded anywhere (every query answers
    /// `bottom()`), for tests that only exercise logic downstream of a
    /// dataflow result without running a solver.
    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            in_facts: BTreeMap::new(),
            out_facts: BTreeMap::new(),
        }
    }
}

/// Runs a [`FlowAnalysis`] to a fixed point over `graph`.
pub fn solve<G, L, A>(graph: &G, direction: Direction, analysis: &mut A) -> DataflowResult<G::Node, L>
where
    G: FlowGraph,
    L: Lattice,
    A: FlowAnalysis<G, L>,
{
    let mut in_facts: BTreeMap<G::Node, L> = BTreeMap::new();
    let mut out_facts: BTreeMap<G::Node, L> = BTreeMap::new();
    let entries = graph.entries();

    for entry in &entries {
        let fact = analysis.entry_fact(*entry);
        match direction {
            Direction::Forward => {
                in_facts.insert(*entry, fact);
            }
            Direction::Backward => {
                out_facts.insert(*entry, fact);
            }
        }
    }

    let mut worklist: VecDeque<G::Node> = graph.nodes().into_iter().collect();

    while let Some(node) = worklist.pop_front() {
        match direction {
            Direction::Forward => {
                let preds = graph.preds(node);
                let mut merged: Option<L> = None;
                for (pred, kind) in preds {
                    if let Some(pred_out) = out_facts.get(&pred) {
                        let projected = analysis.edge_transfer(pred, node, kind, pred_out);
                        merged = Some(match merged {
                            Some(acc) => acc.meet(&projected),
                            None => projected,
                        });
                    }
                }
                let new_in = match (entries.contains(&node), in_facts.get(&node), merged) {
                    (true, Some(boundary), Some(m)) => boundary.meet(&m),
                    (true, Some(boundary), None) => boundary.clone(),
                    (_, _, Some(m)) => m,
                    (_, _, None) => continue,
                };
                let changed_in = in_facts.get(&node) != Some(&new_in);
                if changed_in {
                    in_facts.insert(node, new_in.clone());
                }
                let mut extra = ExtraWork {
                    queue: &mut worklist,
                };
                let new_out = analysis.node_transfer(node, &new_in, &mut extra);
                if out_facts.get(&node) != Some(&new_out) {
                    out_facts.insert(node, new_out);
                    for (succ, _) in graph.succs(node) {
                        worklist.push_back(succ);
                    }
                }
            }
            Direction::Backward => {
                let succs = graph.succs(node);
                let mut merged: Option<L> = None;
                for (succ, kind) in succs {
                    if let Some(succ_in) = in_facts.get(&succ) {
                        let projected = analysis.edge_transfer(node, succ, kind, succ_in);
                        merged = Some(match merged {
                            Some(acc) => acc.meet(&projected),
                            None => projected,
                        });
                    }
                }
                let new_out = match (entries.contains(&node), out_facts.get(&node), merged) {
                    (true, Some(boundary), Some(m)) => boundary.meet(&m),
                    (true, Some(boundary), None) => boundary.clone(),
                    (_, _, Some(m)) => m,
                    (_, _, None) => continue,
                };
                let changed_out = out_facts.get(&node) != Some(&new_out);
                if changed_out {
                    out_facts.insert(node, new_out.clone());
                }
                let mut extra = ExtraWork {
                    queue: &mut worklist,
                };
                let new_in = analysis.node_transfer(node, &new_out, &mut extra);
                let changed_in = in_facts.get(&node) != Some(&new_in);
                if changed_in {
                    in_facts.insert(node, new_in);
                    for (pred, _) in graph.preds(node) {
                        worklist.push_back(pred);
                    }
                }
            }
        }
    }

    DataflowResult {
        in_facts,
        out_facts,
    }
}
