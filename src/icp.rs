//! Interprocedural constant propagation: an [`InterproceduralGraph`] (ICFG)
//! stitched from per-method CFGs and a call graph, plus the [`IcpAnalysis`]
//! transfer rules, including alias-aware reasoning about heap cells, run
//! over it with [`crate::dataflow::solve`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::callgraph::CallGraph;
use crate::collaborators::{CfgProvider, PointerAnalysisResult, Program, VarTypes};
use crate::cs::CsManager;
use crate::dataflow::{solve, Direction, ExtraWork, FlowAnalysis};
use crate::graph::{EdgeKind, FlowGraph, Loc};
use crate::ir::{CallSiteId, Field, MethodRef, Stmt, StmtId, Var};
use crate::lattice::{evaluate, CpFact, Value};
use crate::obj::{Object, Token};

fn call_site_of(stmt: &Stmt) -> Option<CallSiteId> {
    match stmt {
        Stmt::InvokeStatic { call_site, .. } | Stmt::Invoke { call_site, .. } => Some(*call_site),
        _ => None,
    }
}

fn call_args(stmt: &Stmt) -> Option<&[Var]> {
    match stmt {
        Stmt::InvokeStatic { args, .. } | Stmt::Invoke { args, .. } => Some(args),
        _ => None,
    }
}

fn call_lhs(stmt: &Stmt) -> Option<Var> {
    match stmt {
        Stmt::InvokeStatic { lhs, .. } | Stmt::Invoke { lhs, .. } => *lhs,
        _ => None,
    }
}

/// A call graph projected down to plain [`MethodRef`]s, discarding calling
/// context: what [`crate::icp`] needs from [`crate::pta::PointerAnalysis`]'s
/// result, since constant propagation here is context-insensitive even when
/// the pointer analysis that seeded its alias relation was not.
#[derive(Debug, Clone, Default)]
pub struct CallInfo {
    reachable: BTreeSet<MethodRef>,
    edges: BTreeMap<(MethodRef, CallSiteId), BTreeSet<MethodRef>>,
    callers: BTreeMap<MethodRef, BTreeSet<(MethodRef, CallSiteId)>>,
}

impl CallInfo {
    /// Every reachable method, deduplicated over context.
    #[must_use]
    pub fn reachable(&self) -> &BTreeSet<MethodRef> {
        &self.reachable
    }

    /// The callees resolved at `call_site` within `caller`.
    #[must_use]
    pub fn callees_at(&self, caller: &MethodRef, call_site: CallSiteId) -> BTreeSet<MethodRef> {
        self.edges
            .get(&(caller.clone(), call_site))
            .cloned()
            .unwrap_or_default()
    }

    /// The `(caller, call_site)` pairs that call `callee`.
    #[must_use]
    pub fn callers_of(&self, callee: &MethodRef) -> BTreeSet<(MethodRef, CallSiteId)> {
        self.callers.get(callee).cloned().unwrap_or_default()
    }

    /// Builds a [`CallInfo`] with only a reachable set and no call edges, for
    /// tests that need reachability without a real [`CallGraph`].
    #[cfg(test)]
    pub(crate) fn for_test(reachable: impl IntoIterator<Item = MethodRef>) -> Self {
        Self {
            reachable: reachable.into_iter().collect(),
            edges: BTreeMap::new(),
            callers: BTreeMap::new(),
        }
    }
}

/// Projects a [`CallGraph`] (context-sensitive edges over [`CsMethodId`])
/// down to a [`CallInfo`] keyed by plain [`MethodRef`].
pub fn project_call_graph<C: Token, O: Object>(call_graph: &CallGraph, mgr: &CsManager<C, O>) -> CallInfo {
    let mut info = CallInfo::default();
    for id in call_graph.reachable_methods() {
        info.reachable.insert(mgr.resolve_method(id).method.clone());
    }
    for edge in call_graph.edges() {
        let caller = mgr.resolve_method(edge.caller).method.clone();
        let callee = mgr.resolve_method(edge.callee).method.clone();
        info.edges
            .entry((caller.clone(), edge.call_site))
            .or_default()
            .insert(callee.clone());
        info.callers
            .entry(callee)
            .or_default()
            .insert((caller, edge.call_site));
    }
    info
}

/// The whole-program ICFG: per-method CFGs (from [`CfgProvider`]) stitched
/// together at call sites using a [`CallInfo`].
///
/// A call statement's ordinary intraprocedural fallthrough edge is replaced
/// by a [`EdgeKind::CallToReturn`] edge (so the call's result cannot flow in
/// along the normal path); [`EdgeKind::Call`] edges lead into each resolved
/// callee's entry, and [`EdgeKind::Return`] edges lead from each callee's
/// return statements back to the same fallthrough location.
pub struct InterproceduralGraph<'e, Cfg, Prog> {
    cfg_provider: &'e Cfg,
    program: &'e Prog,
    call_info: &'e CallInfo,
}

impl<'e, Cfg, Prog> InterproceduralGraph<'e, Cfg, Prog>
where
    Cfg: CfgProvider,
    Prog: Program,
{
    /// Builds an ICFG over every method [`CallInfo`] marks reachable.
    #[must_use]
    pub fn new(cfg_provider: &'e Cfg, program: &'e Prog, call_info: &'e CallInfo) -> Self {
        Self {
            cfg_provider,
            program,
            call_info,
        }
    }

    fn fallthrough_of(&self, method: &MethodRef, call_stmt: StmtId) -> Option<StmtId> {
        let cfg = self.cfg_provider.cfg(method)?;
        cfg.succs(call_stmt)
            .into_iter()
            .find(|(_, kind)| *kind == EdgeKind::Normal)
            .map(|(s, _)| s)
    }
}

impl<'e, Cfg, Prog> FlowGraph for InterproceduralGraph<'e, Cfg, Prog>
where
    Cfg: CfgProvider,
    Prog: Program,
{
    type Node = Loc;

    fn nodes(&self) -> Vec<Loc> {
        let mut out = Vec::new();
        for method in self.call_info.reachable() {
            if let Some(cfg) = self.cfg_provider.cfg(method) {
                for stmt in cfg.nodes() {
                    out.push(Loc {
                        method: method.clone(),
                        stmt,
                    });
                }
            }
        }
        out
    }

    fn entries(&self) -> Vec<Loc> {
        let mut out = Vec::new();
        for method in self.call_info.reachable() {
            if let Some(cfg) = self.cfg_provider.cfg(method) {
                for stmt in cfg.entries() {
                    out.push(Loc {
                        method: method.clone(),
                        stmt,
                    });
                }
            }
        }
        out
    }

    fn succs(&self, n: Loc) -> Vec<(Loc, EdgeKind)> {
        let mut out = Vec::new();
        let Some(cfg) = self.cfg_provider.cfg(&n.method) else {
            return out;
        };
        let Some(stmt) = self.program.body(&n.method).and_then(|b| b.stmt(n.stmt)) else {
            return out;
        };

        if let Some(call_site) = call_site_of(stmt) {
            for callee in self.call_info.callees_at(&n.method, call_site) {
                if let Some(callee_cfg) = self.cfg_provider.cfg(&callee) {
                    for entry in callee_cfg.entries() {
                        out.push((
                            Loc {
                                method: callee.clone(),
                                stmt: entry,
                            },
                            EdgeKind::Call,
                        ));
                    }
                }
            }
            for (succ, kind) in cfg.succs(n.stmt) {
                if kind == EdgeKind::Normal {
                    out.push((
                        Loc {
                            method: n.method.clone(),
                            stmt: succ,
                        },
                        EdgeKind::CallToReturn,
                    ));
                }
            }
        } else {
            for (succ, kind) in cfg.succs(n.stmt) {
                out.push((
                    Loc {
                        method: n.method.clone(),
                        stmt: succ,
                    },
                    kind,
                ));
            }
        }

        if matches!(stmt, Stmt::Return { .. }) {
            for (caller, call_site) in self.call_info.callers_of(&n.method) {
                if let Some(fallthrough) = self.fallthrough_of(&caller, call_site.stmt) {
                    out.push((
                        Loc {
                            method: caller,
                            stmt: fallthrough,
                        },
                        EdgeKind::Return,
                    ));
                }
            }
        }

        out
    }

    fn preds(&self, n: Loc) -> Vec<(Loc, EdgeKind)> {
        let mut out = Vec::new();
        let Some(cfg) = self.cfg_provider.cfg(&n.method) else {
            return out;
        };
        let Some(body) = self.program.body(&n.method) else {
            return out;
        };

        for (pred_stmt, kind) in cfg.preds(n.stmt) {
            let pred_stmt_ref = body.stmt(pred_stmt);
            let pred_call_site = pred_stmt_ref.and_then(|s| call_site_of(s));
            if kind == EdgeKind::Normal {
                if let Some(call_site) = pred_call_site {
                    out.push((
                        Loc {
                            method: n.method.clone(),
                            stmt: pred_stmt,
                        },
                        EdgeKind::CallToReturn,
                    ));
                    for callee in self.call_info.callees_at(&n.method, call_site) {
                        if let Some(callee_body) = self.program.body(&callee) {
                            for (ret_stmt, ret) in callee_body.iter() {
                                if matches!(ret, Stmt::Return { .. }) {
                                    out.push((
                                        Loc {
                                            method: callee.clone(),
                                            stmt: ret_stmt,
                                        },
                                        EdgeKind::Return,
                                    ));
                                }
                            }
                        }
                    }
                    continue;
                }
            }
            out.push((
                Loc {
                    method: n.method.clone(),
                    stmt: pred_stmt,
                },
                kind,
            ));
        }

        if cfg.entries().contains(&n.stmt) {
            for (caller, call_site) in self.call_info.callers_of(&n.method) {
                out.push((
                    Loc {
                        method: caller,
                        stmt: call_site.stmt,
                    },
                    EdgeKind::Call,
                ));
            }
        }

        out
    }
}

#[derive(Debug, Clone, Default)]
struct HeapIndexes {
    static_stores: HashMap<Field, Vec<Loc>>,
    static_loads: HashMap<Field, Vec<Loc>>,
    instance_stores: HashMap<Field, Vec<Loc>>,
    instance_loads: HashMap<Field, Vec<Loc>>,
    array_stores: Vec<Loc>,
    array_loads: Vec<Loc>,
}

fn build_heap_indexes(program: &impl Program, reachable: &BTreeSet<MethodRef>) -> HeapIndexes {
    let mut idx = HeapIndexes::default();
    for method in reachable {
        let Some(body) = program.body(method) else {
            continue;
        };
        for (stmt_id, stmt) in body.iter() {
            let loc = Loc {
                method: method.clone(),
                stmt: stmt_id,
            };
            match stmt {
                Stmt::StoreStaticField { field, .. } => idx.static_stores.entry(field.clone()).or_default().push(loc),
                Stmt::LoadStaticField { field, .. } => idx.static_loads.entry(field.clone()).or_default().push(loc),
                Stmt::StoreField { field, .. } => idx.instance_stores.entry(field.clone()).or_default().push(loc),
                Stmt::LoadField { field, .. } => idx.instance_loads.entry(field.clone()).or_default().push(loc),
                Stmt::StoreArray { .. } => idx.array_stores.push(loc),
                Stmt::LoadArray { .. } => idx.array_loads.push(loc),
                _ => {}
            }
        }
    }
    idx
}

/// Builds `alias(v) = { w | pts(v) ∩ pts(w) ≠ ∅ }` from a finished pointer
/// analysis result. Reflexive: a variable with a non-empty points-to set is
/// always a member of its own alias set.
fn build_alias_map<O, R>(result: &R) -> HashMap<(MethodRef, Var), BTreeSet<(MethodRef, Var)>>
where
    O: Object,
    R: PointerAnalysisResult<O>,
{
    let vars = result.vars();
    let mut by_obj: HashMap<O, Vec<(MethodRef, Var)>> = HashMap::new();
    let mut pts_of: HashMap<(MethodRef, Var), Vec<O>> = HashMap::new();
    for (method, var) in &vars {
        let pts = result.points_to_set(method, *var);
        for obj in &pts {
            by_obj.entry(obj.clone()).or_default().push((method.clone(), *var));
        }
        pts_of.insert((method.clone(), *var), pts);
    }
    let mut alias = HashMap::new();
    for (key, pts) in &pts_of {
        let mut set = BTreeSet::new();
        for obj in pts {
            if let Some(vars) = by_obj.get(obj) {
                set.extend(vars.iter().cloned());
            }
        }
        alias.insert(key.clone(), set);
    }
    alias
}

fn match_index(i: Value, j: Value) -> bool {
    match (i, j) {
        (Value::Undef, _) | (_, Value::Undef) => false,
        (Value::Nac, _) | (_, Value::Nac) => true,
        (Value::Const(a), Value::Const(b)) => a == b,
    }
}

/// Interprocedural constant propagation's node/edge transfer rules, extending
/// plain per-statement evaluation with heap alias reasoning: field and array
/// stores re-enqueue the loads they may feed, and loads meet in the current
/// value of every store that may alias them.
pub struct IcpAnalysis<'e, Prog, VT> {
    program: &'e Prog,
    var_types: &'e VT,
    alias: HashMap<(MethodRef, Var), BTreeSet<(MethodRef, Var)>>,
    heap: HeapIndexes,
    call_result_var: HashMap<Loc, Var>,
    last_in: HashMap<Loc, CpFact>,
}

impl<'e, Prog, VT> IcpAnalysis<'e, Prog, VT>
where
    Prog: Program,
    VT: VarTypes,
{
    /// Builds the analysis over a finished pointer-analysis result (for
    /// aliasing) and the call/CFG structure (for locating each call's result
    /// variable at its fallthrough location).
    pub fn new<O, R, Cfg>(
        program: &'e Prog,
        var_types: &'e VT,
        cfg_provider: &Cfg,
        call_info: &CallInfo,
        pta_result: &R,
    ) -> Self
    where
        O: Object,
        R: PointerAnalysisResult<O>,
        Cfg: CfgProvider,
    {
        let reachable = call_info.reachable();
        let heap = build_heap_indexes(program, reachable);
        let alias = build_alias_map(pta_result);

        let mut call_result_var = HashMap::new();
        for method in reachable {
            let Some(cfg) = cfg_provider.cfg(method) else {
                continue;
            };
            let Some(body) = program.body(method) else {
                continue;
            };
            for (stmt_id, stmt) in body.iter() {
                let Some(lhs) = call_lhs(stmt) else {
                    continue;
                };
                if let Some((fallthrough, _)) = cfg.succs(stmt_id).into_iter().find(|(_, k)| *k == EdgeKind::Normal) {
                    call_result_var.insert(
                        Loc {
                            method: method.clone(),
                            stmt: fallthrough,
                        },
                        lhs,
                    );
                }
            }
        }

        Self {
            program,
            var_types,
            alias,
            heap,
            call_result_var,
            last_in: HashMap::new(),
        }
    }

    fn aliases(&self, base: (MethodRef, Var), candidate: &(MethodRef, Var)) -> bool {
        self.alias.get(&base).is_some_and(|set| set.contains(candidate))
    }

    fn store_rhs_value(&self, loc: Loc, rhs: Var) -> Value {
        self.last_in.get(&loc).map_or(Value::Undef, |f| f.get(rhs))
    }

    fn meet_instance_loads(&self, base: &(MethodRef, Var), field: &Field) -> Value {
        let mut val = Value::Undef;
        if let Some(stores) = self.heap.instance_stores.get(field) {
            for &loc in stores {
                let Some(Stmt::StoreField { base: store_base, rhs, .. }) =
                    self.program.body(&loc.method).and_then(|b| b.stmt(loc.stmt))
                else {
                    continue;
                };
                if self.aliases(base.clone(), &(loc.method.clone(), *store_base)) {
                    val = val.meet(self.store_rhs_value(loc, *rhs));
                }
            }
        }
        val
    }

    fn meet_static_loads(&self, field: &Field) -> Value {
        let mut val = Value::Undef;
        if let Some(stores) = self.heap.static_stores.get(field) {
            for &loc in stores {
                let Some(Stmt::StoreStaticField { rhs, .. }) = self.program.body(&loc.method).and_then(|b| b.stmt(loc.stmt)) else {
                    continue;
                };
                val = val.meet(self.store_rhs_value(loc, *rhs));
            }
        }
        val
    }

    fn meet_array_loads(&self, base: &(MethodRef, Var), index_val: Value) -> Value {
        let mut val = Value::Undef;
        for &loc in &self.heap.array_stores {
            let Some(Stmt::StoreArray { base: store_base, index, rhs }) =
                self.program.body(&loc.method).and_then(|b| b.stmt(loc.stmt))
            else {
                continue;
            };
            if !self.aliases(base.clone(), &(loc.method.clone(), *store_base)) {
                continue;
            }
            let store_index_val = self.store_rhs_value(loc, *index);
            if match_index(index_val, store_index_val) {
                val = val.meet(self.store_rhs_value(loc, *rhs));
            }
        }
        val
    }
}

impl<'e, Cfg, Prog, VT> FlowAnalysis<InterproceduralGraph<'e, Cfg, Prog>, CpFact> for IcpAnalysis<'e, Prog, VT>
where
    Cfg: CfgProvider,
    Prog: Program,
    VT: VarTypes,
{
    fn entry_fact(&self, _entry: Loc) -> CpFact {
        CpFact::new()
    }

    fn node_transfer(&mut self, node: Loc, fact: &CpFact, extra: &mut ExtraWork<'_, Loc>) -> CpFact {
        let Some(stmt) = self.program.body(&node.method).and_then(|b| b.stmt(node.stmt)).cloned() else {
            return fact.clone();
        };
        let mut out = fact.clone();

        match &stmt {
            Stmt::Assign { lhs, rhs } => {
                if self.var_types.is_integral(&node.method, *lhs) {
                    out.set(*lhs, evaluate(rhs, fact));
                }
            }
            Stmt::Copy { lhs, rhs } => {
                if self.var_types.is_integral(&node.method, *lhs) {
                    out.set(*lhs, fact.get(*rhs));
                }
            }
            Stmt::StoreStaticField { field, .. } => {
                self.last_in.insert(node, fact.clone());
                if let Some(loads) = self.heap.static_loads.get(field) {
                    for &loc in loads {
                        extra.add_node(loc);
                    }
                }
            }
            Stmt::LoadStaticField { lhs, field } => {
                if self.var_types.is_integral(&node.method, *lhs) {
                    out.set(*lhs, self.meet_static_loads(field));
                }
            }
            Stmt::StoreField { base, field, .. } => {
                self.last_in.insert(node, fact.clone());
                let key = (node.method.clone(), *base);
                if let Some(loads) = self.heap.instance_loads.get(field) {
                    for &loc in loads {
                        let Some(Stmt::LoadField { base: load_base, .. }) =
                            self.program.body(&loc.method).and_then(|b| b.stmt(loc.stmt))
                        else {
                            continue;
                        };
                        if self.aliases(key.clone(), &(loc.method.clone(), *load_base)) {
                            extra.add_node(loc);
                        }
                    }
                }
            }
            Stmt::LoadField { lhs, base, field } => {
                if self.var_types.is_integral(&node.method, *lhs) {
                    let key = (node.method.clone(), *base);
                    out.set(*lhs, self.meet_instance_loads(&key, field));
                }
            }
            Stmt::StoreArray { base, .. } => {
                self.last_in.insert(node, fact.clone());
                let key = (node.method.clone(), *base);
                for &loc in &self.heap.array_loads {
                    let Some(Stmt::LoadArray { base: load_base, .. }) =
                        self.program.body(&loc.method).and_then(|b| b.stmt(loc.stmt))
                    else {
                        continue;
                    };
                    if self.aliases(key.clone(), &(loc.method.clone(), *load_base)) {
                        extra.add_node(loc);
                    }
                }
            }
            Stmt::LoadArray { lhs, base, index } => {
                if self.var_types.is_integral(&node.method, *lhs) {
                    let key = (node.method.clone(), *base);
                    let index_val = fact.get(*index);
                    out.set(*lhs, self.meet_array_loads(&key, index_val));
                }
            }
            Stmt::New { .. }
            | Stmt::InvokeStatic { .. }
            | Stmt::Invoke { .. }
            | Stmt::If { .. }
            | Stmt::Switch { .. }
            | Stmt::Return { .. }
            | Stmt::Goto => {}
        }

        out
    }

    fn edge_transfer(&mut self, from: Loc, to: Loc, kind: EdgeKind, fact: &CpFact) -> CpFact {
        match kind {
            EdgeKind::CallToReturn => {
                let mut projected = fact.clone();
                if let Some(lhs) = self
                    .program
                    .body(&from.method)
                    .and_then(|b| b.stmt(from.stmt))
                    .and_then(call_lhs)
                {
                    projected.set(lhs, Value::Undef);
                }
                projected
            }
            EdgeKind::Call => {
                let mut projected = CpFact::new();
                let Some(stmt) = self.program.body(&from.method).and_then(|b| b.stmt(from.stmt)) else {
                    return projected;
                };
                let Some(args) = call_args(stmt) else {
                    return projected;
                };
                let Some(callee_body) = self.program.body(&to.method) else {
                    return projected;
                };
                for (&arg, &param) in args.iter().zip(callee_body.params.iter()) {
                    if self.var_types.is_integral(&to.method, param) {
                        projected.set(param, fact.get(arg));
                    }
                }
                projected
            }
            EdgeKind::Return => {
                let mut projected = CpFact::new();
                if let Some(&lhs) = self.call_result_var.get(&to) {
                    let mut val = Value::Undef;
                    if let Some(body) = self.program.body(&from.method) {
                        for &ret in &body.ret_vars {
                            val = val.meet(fact.get(ret));
                        }
                    }
                    projected.set(lhs, val);
                }
                projected
            }
            EdgeKind::Normal
            | EdgeKind::IfTrue
            | EdgeKind::IfFalse
            | EdgeKind::SwitchCase(_)
            | EdgeKind::SwitchDefault => fact.clone(),
        }
    }
}

/// Runs interprocedural constant propagation to a fixed point and returns the
/// per-location IN/OUT facts.
pub fn run_icp<'e, Cfg, Prog, VT>(
    icfg: &InterproceduralGraph<'e, Cfg, Prog>,
    analysis: &mut IcpAnalysis<'e, Prog, VT>,
) -> crate::dataflow::DataflowResult<Loc, CpFact>
where
    Cfg: CfgProvider,
    Prog: Program,
    VT: VarTypes,
{
    solve(icfg, Direction::Forward, analysis)
}
