//! Live-variable analysis: a backward instantiation of [`crate::dataflow`],
//! intraprocedural, feeding [`crate::deadcode`]'s useless-assignment check.
//!
//! [`crate::deadcode`] needs a live-variable result to tell a dead store from
//! a live one; this module produces it, built the same way [`crate::icp`]
//! builds constant propagation, by instantiating the generic engine in
//! [`crate::dataflow`], here backward instead of forward.

use std::collections::BTreeSet;

use crate::dataflow::{solve, Direction, ExtraWork, FlowAnalysis, Lattice};
use crate::graph::{ExitBoundary, FlowGraph};
use crate::ir::{MethodBody, StmtId, Var};

/// The set of variables live at a program point (read before their next
/// write, on some path to a use).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveSet(BTreeSet<Var>);

impl LiveSet {
    /// Whether `var` is live.
    #[must_use]
    pub fn contains(&self, var: Var) -> bool {
        self.0.contains(&var)
    }

    /// Iterates over the live variables, in a deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.iter().copied()
    }
}

impl Lattice for LiveSet {
    fn bottom() -> Self {
        Self(BTreeSet::new())
    }

    fn meet(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }
}

/// The standard live-variable transfer: `IN(s) = (OUT(s) \ def(s)) ∪ use(s)`.
struct LivenessAnalysis<'e> {
    body: &'e MethodBody,
}

impl<'e, G: FlowGraph<Node = StmtId>> FlowAnalysis<G, LiveSet> for LivenessAnalysis<'e> {
    fn entry_fact(&self, _entry: StmtId) -> LiveSet {
        LiveSet::bottom()
    }

    fn node_transfer(&mut self, node: StmtId, fact: &LiveSet, _extra: &mut ExtraWork<'_, StmtId>) -> LiveSet {
        let Some(stmt) = self.body.stmt(node) else {
            return fact.clone();
        };
        let mut live = fact.0.clone();
        if let Some(def) = stmt.def() {
            live.remove(&def);
        }
        live.extend(stmt.uses());
        LiveSet(live)
    }
}

/// Runs live-variable analysis over one method's CFG, anchoring the
/// boundary fact (the empty set) at the CFG's exit statements rather than
/// its entry; see [`ExitBoundary`].
pub fn analyze<G: FlowGraph<Node = StmtId>>(cfg: &G, body: &MethodBody) -> crate::dataflow::DataflowResult<StmtId, LiveSet> {
    let boundary = ExitBoundary(cfg);
    let mut analysis = LivenessAnalysis { body };
    solve(&boundary, Direction::Backward, &mut analysis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, SimpleGraph};
    use crate::ir::{BinOp, Expr, Stmt};

    fn linear(stmts: Vec<Stmt>) -> (SimpleGraph<StmtId>, MethodBody) {
        let mut body = MethodBody::default();
        for (i, stmt) in stmts.into_iter().enumerate() {
            body.stmts.push((StmtId(i as u32), stmt));
        }
        let n = body.stmts.len() as u32;
        let edges: Vec<_> = (0..n.saturating_sub(1))
            .map(|i| (StmtId(i), StmtId(i + 1), EdgeKind::Normal))
            .collect();
        let cfg = SimpleGraph::from_edges(StmtId(0), edges);
        (cfg, body)
    }

    #[test]
    fn variable_used_later_is_live_before_its_use() {
        // x = 1; y = x + x; return y;  -- x is live right after stmt 0.
        let (cfg, body) = linear(vec![
            Stmt::Assign {
                lhs: Var(0),
                rhs: Expr::IntConst(1),
            },
            Stmt::Assign {
                lhs: Var(1),
                rhs: Expr::Binary(BinOp::Add, Var(0), Var(0)),
            },
            Stmt::Return { vars: vec![Var(1)] },
        ]);
        let result = analyze(&cfg, &body);
        assert!(result.get_out_fact(StmtId(0)).contains(Var(0)));
        assert!(!result.get_out_fact(StmtId(1)).contains(Var(0)));
    }

    #[test]
    fn dead_store_is_not_live_out() {
        // x = 1; x = 2; return x;  -- the first store to x is dead.
        let (cfg, body) = linear(vec![
            Stmt::Assign {
                lhs: Var(0),
                rhs: Expr::IntConst(1),
            },
            Stmt::Assign {
                lhs: Var(0),
                rhs: Expr::IntConst(2),
            },
            Stmt::Return { vars: vec![Var(0)] },
        ]);
        let result = analyze(&cfg, &body);
        assert!(!result.get_out_fact(StmtId(0)).contains(Var(0)));
        assert!(result.get_out_fact(StmtId(1)).contains(Var(0)));
    }
}
