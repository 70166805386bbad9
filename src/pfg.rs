//! The Pointer Flow Graph: subset-constraint edges between pointer nodes.

use std::collections::{HashMap, HashSet};

use crate::cs::PointerId;

/// A directed graph over pointer nodes, with edges expressing that the
/// source's points-to set must be a subset of the target's at quiescence.
#[derive(Debug, Default)]
pub struct PointerFlowGraph {
    succs: HashMap<PointerId, HashSet<PointerId>>,
}

impl PointerFlowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an edge `source -> target`.
    ///
    /// Returns `false` if the edge was already present: idempotent
    /// insertion is what lets the solver re-seed an edge without
    /// re-propagating a points-to set it has already fully absorbed.
    pub fn add_edge(&mut self, source: PointerId, target: PointerId) -> bool {
        self.succs.entry(source).or_default().insert(target)
    }

    /// Returns a snapshot of `n`'s successors, safe to iterate even while
    /// the caller goes on to mutate the graph (e.g. by adding more edges out
    /// of the nodes being iterated).
    #[must_use]
    pub fn succs(&self, n: PointerId) -> Vec<PointerId> {
        self.succs
            .get(&n)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Iterates over every edge currently in the graph.
    pub fn edges(&self) -> impl Iterator<Item = (PointerId, PointerId)> + '_ {
        self.succs
            .iter()
            .flat_map(|(&src, dsts)| dsts.iter().map(move |&dst| (src, dst)))
    }
}
