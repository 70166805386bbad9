//! Dead-code detection: a BFS over each reachable method's CFG that prunes
//! branches whose condition constant propagation has pinned, combined with a
//! liveness-backed check for assignments nobody reads.
//!
//! Two statements are reported dead:
//!
//! - Any statement the BFS never visits, because every path to it crosses a
//!   branch [`crate::icp`] proved takes the other way.
//! - A visited, side-effect-free assignment ([`crate::ir::Stmt::is_side_effect_free_assign`])
//!   whose result is not live immediately after it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::collaborators::{CfgProvider, Program};
use crate::dataflow::DataflowResult;
use crate::graph::{EdgeKind, FlowGraph, Loc};
use crate::icp::CallInfo;
use crate::ir::{MethodRef, Stmt, StmtId};
use crate::lattice::{evaluate, CpFact, Value};
use crate::liveness;

/// The dead statements found in a single method.
pub type DeadStmts = BTreeSet<StmtId>;

/// Finds the statements the reachability BFS never visits or whose result is
/// never used, for every method [`CallInfo`] marks reachable.
pub fn find_dead_code<Cfg, Prog>(
    cfg_provider: &Cfg,
    program: &Prog,
    call_info: &CallInfo,
    icp: &DataflowResult<Loc, CpFact>,
) -> BTreeMap<MethodRef, DeadStmts>
where
    Cfg: CfgProvider,
    Prog: Program,
{
    let mut result = BTreeMap::new();
    for method in call_info.reachable() {
        let Some(cfg) = cfg_provider.cfg(method) else {
            continue;
        };
        let Some(body) = program.body(method) else {
            continue;
        };
        result.insert(method.clone(), dead_in_method(method, cfg, body, icp));
    }
    result
}

fn dead_in_method(
    method: &MethodRef,
    cfg: &crate::graph::SimpleGraph<StmtId>,
    body: &crate::ir::MethodBody,
    icp: &DataflowResult<Loc, CpFact>,
) -> DeadStmts {
    let live = liveness::analyze(cfg, body);

    let mut visited: BTreeSet<StmtId> = BTreeSet::new();
    let mut queue: VecDeque<StmtId> = cfg.entries().into_iter().collect();
    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        let Some(stmt) = body.stmt(node) else {
            continue;
        };
        let loc = Loc {
            method: method.clone(),
            stmt: node,
        };
        let fact = icp.get_in_fact(loc);
        for (succ, _) in taken_successors(cfg, node, stmt, &fact) {
            if !visited.contains(&succ) {
                queue.push_back(succ);
            }
        }
    }

    let mut dead: DeadStmts = body
        .iter()
        .map(|(id, _)| id)
        .filter(|id| !visited.contains(id))
        .collect();

    for (id, stmt) in body.iter() {
        if !visited.contains(&id) || !stmt.is_side_effect_free_assign() {
            continue;
        }
        let Some(def) = stmt.def() else { continue };
        if !live.get_out_fact(id).contains(def) {
            dead.insert(id);
        }
    }

    dead
}

/// The CFG successors actually reachable from `node`, given `stmt`'s kind and
/// the constant-propagation fact flowing into it: an `If`/`Switch` whose
/// condition is pinned to a known constant only keeps the one branch that
/// constant selects; everything else (including an unresolved condition)
/// keeps every outgoing edge.
fn taken_successors(
    cfg: &crate::graph::SimpleGraph<StmtId>,
    node: StmtId,
    stmt: &Stmt,
    fact: &CpFact,
) -> Vec<(StmtId, EdgeKind)> {
    let succs = cfg.succs(node);
    match stmt {
        Stmt::If { cond } => match evaluate(cond, fact) {
            Value::Const(0) => succs.into_iter().filter(|(_, k)| *k == EdgeKind::IfFalse).collect(),
            Value::Const(_) => succs.into_iter().filter(|(_, k)| *k == EdgeKind::IfTrue).collect(),
            Value::Undef | Value::Nac => succs,
        },
        Stmt::Switch { var } => match fact.get(*var) {
            Value::Const(c) => {
                let matching: Vec<_> = succs
                    .iter()
                    .filter(|(_, k)| *k == EdgeKind::SwitchCase(c))
                    .copied()
                    .collect();
                if matching.is_empty() {
                    succs.into_iter().filter(|(_, k)| *k == EdgeKind::SwitchDefault).collect()
                } else {
                    matching
                }
            }
            Value::Undef | Value::Nac => succs,
        },
        _ => succs,
    }
}
