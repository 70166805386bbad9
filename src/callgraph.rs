//! The on-the-fly call graph built during pointer analysis.

use std::collections::BTreeSet;

use crate::cs::CsMethodId;
use crate::ir::CallSiteId;

/// The dispatch mechanism a call-graph edge was added for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum CallEdgeKind {
    /// A statically-resolved call with no receiver.
    Static,
    /// Ordinary virtual dispatch.
    Virtual,
    /// Dispatch through an interface method table.
    Interface,
    /// Dispatch bypassing virtual lookup.
    Special,
    /// Dispatch resolved through a call-site bootstrap.
    Dynamic,
}

/// A call-graph edge from a call site to a reachable callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallEdge {
    pub caller: CsMethodId,
    pub callee: CsMethodId,
    pub call_site: CallSiteId,
    pub kind: CallEdgeKind,
}

/// The call graph discovered on-the-fly during pointer analysis: reachable
/// methods and the edges invoking them.
#[derive(Debug, Default)]
pub struct CallGraph {
    reachable: BTreeSet<CsMethodId>,
    edges: BTreeSet<CallEdge>,
}

impl CallGraph {
    /// Creates an empty call graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `method` reachable. Returns `true` if this is the first time.
    pub fn mark_reachable(&mut self, method: CsMethodId) -> bool {
        self.reachable.insert(method)
    }

    /// Whether `method` is reachable (it has an incoming edge, or it is the
    /// program's entry).
    #[must_use]
    pub fn is_reachable(&self, method: CsMethodId) -> bool {
        self.reachable.contains(&method)
    }

    /// Adds a call-graph edge. Returns `true` if the edge is new.
    pub fn add_edge(
        &mut self,
        caller: CsMethodId,
        callee: CsMethodId,
        call_site: CallSiteId,
        kind: CallEdgeKind,
    ) -> bool {
        self.edges.insert(CallEdge {
            caller,
            callee,
            call_site,
            kind,
        })
    }

    /// Every reachable method.
    pub fn reachable_methods(&self) -> impl Iterator<Item = CsMethodId> + '_ {
        self.reachable.iter().copied()
    }

    /// Every call-graph edge.
    pub fn edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.edges.iter()
    }

    /// The callees directly reachable from `method`.
    pub fn callees_of(&self, method: CsMethodId) -> impl Iterator<Item = CsMethodId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.caller == method)
            .map(|e| e.callee)
    }

    /// The callers directly reaching `method`.
    pub fn callers_of(&self, method: CsMethodId) -> impl Iterator<Item = CsMethodId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.callee == method)
            .map(|e| e.caller)
    }

    /// The callees a particular call site in `caller` dispatches to (more
    /// than one under virtual dispatch resolved against several receiver
    /// types).
    pub fn callees_at(
        &self,
        caller: CsMethodId,
        call_site: CallSiteId,
    ) -> impl Iterator<Item = CsMethodId> + '_ {
        self.edges
            .iter()
            .filter(move |e| e.caller == caller && e.call_site == call_site)
            .map(|e| e.callee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `CsMethodId` has no public constructor; exercise the graph through the
    // ids `CsManager` produces. Both ids are minted from one shared manager
    // so they are actually distinct, rather than from two separate managers
    // that would each hand out `CsMethodId(0)`.
    fn two_ids() -> (CsMethodId, CsMethodId) {
        let mut mgr: crate::cs::CsManager<(), crate::testing::DummyObj> = crate::cs::CsManager::new();
        let a = mgr.cs_method((), crate::ir::MethodRef::new(crate::ir::Type::new("T"), "m0", "()V"));
        let b = mgr.cs_method((), crate::ir::MethodRef::new(crate::ir::Type::new("T"), "m1", "()V"));
        (a, b)
    }

    #[test]
    fn edges_are_deduplicated() {
        let mut cg = CallGraph::new();
        let (a, b) = two_ids();
        let site = CallSiteId {
            stmt: crate::ir::StmtId(0),
        };
        assert!(cg.add_edge(a, b, site, CallEdgeKind::Virtual));
        assert!(!cg.add_edge(a, b, site, CallEdgeKind::Virtual));
        assert_eq!(cg.callees_of(a).count(), 1);
    }

    #[test]
    fn reachability_tracks_first_insertion() {
        let mut cg = CallGraph::new();
        let (a, _) = two_ids();
        assert!(cg.mark_reachable(a));
        assert!(!cg.mark_reachable(a));
        assert!(cg.is_reachable(a));
    }
}
