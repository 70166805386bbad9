//! The pointer-analysis fixed-point solver: on-the-fly call-graph
//! construction driven by a worklist of points-to deltas over the pointer
//! flow graph.
//!
//! The same code serves both the context-insensitive variant (instantiate
//! `C = ()`) and any context-sensitive variant (`C` supplied by a
//! [`ContextSelector`]), with no branching on sensitivity anywhere in this file.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::callgraph::{CallEdgeKind, CallGraph};
use crate::collaborators::{ClassHierarchy, ContextSelector, HeapModel, PointerAnalysisResult, Program};
use crate::cs::{CsManager, CsMethod, CsMethodId, Pointer, PointerId};
use crate::errors::AnalysisError;
use crate::ir::{AllocSite, CallSiteId, InstanceInvokeKind, MethodBody, MethodRef, Stmt, StmtId, Var};
use crate::obj::{CsObj, Object, Token};
use crate::pfg::PointerFlowGraph;
use crate::pts::PointsToSet;
use crate::worklist::Worklist;

/// Per-method index of the statements that react to a variable's points-to
/// set growing: instance field/array accesses and instance invokes. Built
/// once per method body, the first time it becomes reachable.
#[derive(Debug, Clone, Default)]
struct MethodIndex {
    instance_stores: HashMap<Var, Vec<(crate::ir::Field, Var)>>,
    instance_loads: HashMap<Var, Vec<(Var, crate::ir::Field)>>,
    array_stores: HashMap<Var, Vec<Var>>,
    array_loads: HashMap<Var, Vec<Var>>,
    invokes: HashMap<Var, Vec<StmtId>>,
}

fn build_method_index(body: &MethodBody) -> MethodIndex {
    let mut index = MethodIndex::default();
    for (stmt_id, stmt) in body.iter() {
        match stmt {
            Stmt::StoreField { base, field, rhs } => {
                index
                    .instance_stores
                    .entry(*base)
                    .or_default()
                    .push((field.clone(), *rhs));
            }
            Stmt::LoadField { lhs, base, field } => {
                index
                    .instance_loads
                    .entry(*base)
                    .or_default()
                    .push((*lhs, field.clone()));
            }
            Stmt::StoreArray { base, rhs, .. } => {
                index.array_stores.entry(*base).or_default().push(*rhs);
            }
            Stmt::LoadArray { lhs, base, .. } => {
                index.array_loads.entry(*base).or_default().push(*lhs);
            }
            Stmt::Invoke { receiver, .. } => {
                index.invokes.entry(*receiver).or_default().push(stmt_id);
            }
            _ => {}
        }
    }
    index
}

/// Whole-program pointer analysis over IR supplied through [`Program`],
/// resolved through [`ClassHierarchy`] and [`HeapModel`], with identities
/// minted through a [`ContextSelector`].
///
/// Owns its [`CsManager`], [`PointerFlowGraph`] and [`CallGraph`] for the
/// duration of one [`Self::solve`] call; nothing here is process-global.
pub struct PointerAnalysis<'e, C, O, Prog, Heap, Hier, Sel> {
    program: &'e Prog,
    heap_model: &'e Heap,
    class_hierarchy: &'e Hier,
    ctx_selector: &'e Sel,

    mgr: CsManager<C, O>,
    pfg: PointerFlowGraph,
    call_graph: CallGraph,
    pts: HashMap<PointerId, PointsToSet<CsObj<C, O>>>,
    worklist: Worklist<CsObj<C, O>>,
    method_queue: VecDeque<CsMethodId>,
    method_index: HashMap<MethodRef, MethodIndex>,
    var_home: HashMap<PointerId, MethodRef>,
}

impl<'e, C, O, Prog, Heap, Hier, Sel> PointerAnalysis<'e, C, O, Prog, Heap, Hier, Sel>
where
    C: Token,
    O: Object,
    Prog: Program,
    Heap: HeapModel<O>,
    Hier: ClassHierarchy,
    Sel: ContextSelector<C, O>,
{
    /// Builds a solver over the given collaborators. Call [`Self::solve`] to
    /// run it to a fixed point.
    pub fn new(program: &'e Prog, heap_model: &'e Heap, class_hierarchy: &'e Hier, ctx_selector: &'e Sel) -> Self {
        Self {
            program,
            heap_model,
            class_hierarchy,
            ctx_selector,
            mgr: CsManager::new(),
            pfg: PointerFlowGraph::new(),
            call_graph: CallGraph::new(),
            pts: HashMap::new(),
            worklist: Worklist::new(),
            method_queue: VecDeque::new(),
            method_index: HashMap::new(),
            var_home: HashMap::new(),
        }
    }

    /// Runs the solver to a fixed point: alternates draining newly reachable
    /// methods (which may seed new points-to facts) and draining the
    /// points-to worklist (which may discover new reachable methods via
    /// virtual dispatch), until both are empty.
    pub fn solve(&mut self) -> Result<(), AnalysisError> {
        let entry = self.program.entry_method();
        let ctx0 = self.ctx_selector.empty_context();
        let entry_id = self.mgr.cs_method(ctx0, entry.clone());
        if self.program.body(&entry).is_none() {
            return Err(AnalysisError::MissingEntryPoint(entry));
        }
        self.add_reachable(entry_id);

        loop {
            let mut progressed = false;
            while let Some(method_id) = self.method_queue.pop_front() {
                self.process_method(method_id)?;
                progressed = true;
            }
            if let Some((n, delta)) = self.worklist.poll() {
                self.propagate(n, delta)?;
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
        Ok(())
    }

    /// The call graph discovered by the solver.
    #[must_use]
    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    /// The pointer flow graph the solver grew during solving.
    #[must_use]
    pub fn pointer_flow_graph(&self) -> &PointerFlowGraph {
        &self.pfg
    }

    /// The manager interning every context-sensitive identity the solver
    /// touched, for clients (e.g. the taint tracker) that need to resolve
    /// [`CsMethodId`]s back to `(context, method)` pairs.
    #[must_use]
    pub fn cs_manager(&self) -> &CsManager<C, O> {
        &self.mgr
    }

    /// Every method reachable under any context, deduplicated.
    #[must_use]
    pub fn reachable_methods(&self) -> BTreeSet<MethodRef> {
        self.call_graph
            .reachable_methods()
            .map(|id| self.mgr.resolve_method(id).method.clone())
            .collect()
    }

    fn var_ptr(&mut self, ctx: C, var: Var, method: &MethodRef) -> PointerId {
        let id = self.mgr.var_ptr(ctx, var);
        self.var_home.entry(id).or_insert_with(|| method.clone());
        id
    }

    fn add_reachable(&mut self, id: CsMethodId) {
        if self.call_graph.mark_reachable(id) {
            self.method_queue.push_back(id);
        }
    }

    fn add_pfg_edge(&mut self, source: PointerId, target: PointerId) {
        if self.pfg.add_edge(source, target) {
            if let Some(pts) = self.pts.get(&source) {
                if !pts.is_empty() {
                    self.worklist.push(target, pts.clone());
                }
            }
        }
    }

    fn process_method(&mut self, id: CsMethodId) -> Result<(), AnalysisError> {
        let CsMethod { ctx, method } = self.mgr.resolve_method(id).clone();
        let program = self.program;
        let body = program
            .body(&method)
            .ok_or_else(|| AnalysisError::MissingMethodBody(method.clone()))?;
        self.method_index
            .entry(method.clone())
            .or_insert_with(|| build_method_index(body));
        for (stmt_id, stmt) in body.iter() {
            self.process_initial_stmt(&ctx, &method, stmt_id, stmt)?;
        }
        Ok(())
    }

    /// Handles every statement whose pointer effect does not depend on a
    /// receiver's points-to set. Instance field/array accesses and instance
    /// invokes are deferred: they were recorded into the method's
    /// [`MethodIndex`] and are processed in [`Self::handle_var_growth`] as
    /// the receiver variable accumulates objects.
    fn process_initial_stmt(
        &mut self,
        ctx: &C,
        method: &MethodRef,
        _stmt_id: StmtId,
        stmt: &Stmt,
    ) -> Result<(), AnalysisError> {
        match stmt {
            Stmt::New { lhs, alloc } => {
                let site = AllocSite {
                    method: method.clone(),
                    stmt: *alloc,
                };
                let obj = self.heap_model.get_obj(&site);
                let hc = self.ctx_selector.select_heap_context(ctx, method, &site);
                let cs_obj = CsObj::new(hc, obj);
                let target = self.var_ptr(ctx.clone(), *lhs, method);
                self.worklist.push(target, PointsToSet::singleton(cs_obj));
            }
            Stmt::Copy { lhs, rhs } => {
                let s = self.var_ptr(ctx.clone(), *rhs, method);
                let t = self.var_ptr(ctx.clone(), *lhs, method);
                self.add_pfg_edge(s, t);
            }
            Stmt::StoreStaticField { field, rhs } => {
                let s = self.var_ptr(ctx.clone(), *rhs, method);
                let t = self.mgr.static_field(field.clone());
                self.add_pfg_edge(s, t);
            }
            Stmt::LoadStaticField { lhs, field } => {
                let s = self.mgr.static_field(field.clone());
                let t = self.var_ptr(ctx.clone(), *lhs, method);
                self.add_pfg_edge(s, t);
            }
            Stmt::InvokeStatic {
                lhs,
                method: callee,
                args,
                call_site,
            } => {
                self.process_static_invoke(ctx, method, *lhs, callee, args, *call_site)?;
            }
            Stmt::StoreField { .. }
            | Stmt::LoadField { .. }
            | Stmt::StoreArray { .. }
            | Stmt::LoadArray { .. }
            | Stmt::Invoke { .. } => {
                // Indexed by `build_method_index`; waits on receiver points-to growth.
            }
            Stmt::If { .. } | Stmt::Switch { .. } | Stmt::Assign { .. } | Stmt::Return { .. } | Stmt::Goto => {
                // No pointer-analysis effect; consumed by ICP and dead-code detection.
            }
        }
        Ok(())
    }

    fn process_static_invoke(
        &mut self,
        ctx: &C,
        method: &MethodRef,
        lhs: Option<Var>,
        callee: &MethodRef,
        args: &[Var],
        call_site: CallSiteId,
    ) -> Result<(), AnalysisError> {
        let callee_ctx = self.ctx_selector.select_context_static(ctx, callee);
        let cs_caller = self.mgr.cs_method(ctx.clone(), method.clone());
        let cs_callee = self.mgr.cs_method(callee_ctx.clone(), callee.clone());
        self.add_reachable(cs_callee);
        if self
            .call_graph
            .add_edge(cs_caller, cs_callee, call_site, CallEdgeKind::Static)
        {
            self.connect_call(ctx, method, callee_ctx, callee, args, lhs)?;
        }
        Ok(())
    }

    /// Wires parameter and return-value PFG edges between a call site and a
    /// resolved callee. Shared by static invokes and instance invokes; the
    /// receiver (`this`) binding for instance invokes is handled separately
    /// in [`Self::process_call`], since static calls have none.
    fn connect_call(
        &mut self,
        caller_ctx: &C,
        caller_method: &MethodRef,
        callee_ctx: C,
        callee: &MethodRef,
        args: &[Var],
        lhs: Option<Var>,
    ) -> Result<(), AnalysisError> {
        let program = self.program;
        let callee_body = program
            .body(callee)
            .ok_or_else(|| AnalysisError::MissingMethodBody(callee.clone()))?;
        for (&arg, &param) in args.iter().zip(callee_body.params.iter()) {
            let s = self.var_ptr(caller_ctx.clone(), arg, caller_method);
            let t = self.var_ptr(callee_ctx.clone(), param, callee);
            self.add_pfg_edge(s, t);
        }
        if let Some(lhs_var) = lhs {
            for &ret in &callee_body.ret_vars {
                let s = self.var_ptr(callee_ctx.clone(), ret, callee);
                let t = self.var_ptr(caller_ctx.clone(), lhs_var, caller_method);
                self.add_pfg_edge(s, t);
            }
        }
        Ok(())
    }

    /// Resolves and wires an instance invoke once its receiver's points-to
    /// set contains `obj`.
    fn process_call(
        &mut self,
        ctx: &C,
        method: &MethodRef,
        stmt_id: StmtId,
        obj: &CsObj<C, O>,
    ) -> Result<(), AnalysisError> {
        let program = self.program;
        let body = program
            .body(method)
            .ok_or_else(|| AnalysisError::MissingMethodBody(method.clone()))?;
        let Some(Stmt::Invoke {
            lhs,
            receiver: _,
            kind,
            method: declared,
            args,
            call_site,
        }) = body.stmt(stmt_id)
        else {
            return Ok(());
        };

        let Some(callee) = self
            .class_hierarchy
            .resolve_callee(Some(obj.class()), declared)
        else {
            // No implementation reachable for this receiver type: no
            // call-graph edge is added and this is not an error.
            return Ok(());
        };

        let callee_ctx = self.ctx_selector.select_context_instance(ctx, obj, &callee);
        let cs_caller = self.mgr.cs_method(ctx.clone(), method.clone());
        let cs_callee = self.mgr.cs_method(callee_ctx.clone(), callee.clone());

        let callee_body = program
            .body(&callee)
            .ok_or_else(|| AnalysisError::MissingMethodBody(callee.clone()))?;
        if let Some(this_var) = callee_body.this_var {
            let this_ptr = self.var_ptr(callee_ctx.clone(), this_var, &callee);
            self.worklist.push(this_ptr, PointsToSet::singleton(obj.clone()));
        }

        self.add_reachable(cs_callee);

        let edge_kind = match kind {
            InstanceInvokeKind::Virtual => CallEdgeKind::Virtual,
            InstanceInvokeKind::Interface => CallEdgeKind::Interface,
            InstanceInvokeKind::Special => CallEdgeKind::Special,
            InstanceInvokeKind::Dynamic => CallEdgeKind::Dynamic,
        };
        if self
            .call_graph
            .add_edge(cs_caller, cs_callee, *call_site, edge_kind)
        {
            let args = args.clone();
            let lhs = *lhs;
            self.connect_call(ctx, method, callee_ctx, &callee, &args, lhs)?;
        }
        Ok(())
    }

    fn propagate(&mut self, n: PointerId, delta: PointsToSet<CsObj<C, O>>) -> Result<(), AnalysisError> {
        let current = self.pts.entry(n).or_default().clone();
        let new_delta = current.diff(&delta);
        if new_delta.is_empty() {
            return Ok(());
        }
        self.pts.get_mut(&n).expect("just inserted above").union_with(&new_delta);

        for succ in self.pfg.succs(n) {
            self.worklist.push(succ, new_delta.clone());
        }

        if let Pointer::Var(ctx, v) = self.mgr.pointer(n).clone() {
            if let Some(method) = self.var_home.get(&n).cloned() {
                self.handle_var_growth(&ctx, &method, v, &new_delta)?;
            }
        }
        Ok(())
    }

    /// Reacts to a `VarPtr(ctx, v)` pointer's points-to set growing by
    /// `delta`: wires the field/array/invoke statements on `v` that the
    /// initial statement processor deferred.
    fn handle_var_growth(
        &mut self,
        ctx: &C,
        method: &MethodRef,
        v: Var,
        delta: &PointsToSet<CsObj<C, O>>,
    ) -> Result<(), AnalysisError> {
        let index = self.method_index.get(method).cloned().unwrap_or_default();
        let stores = index.instance_stores.get(&v).cloned().unwrap_or_default();
        let loads = index.instance_loads.get(&v).cloned().unwrap_or_default();
        let array_stores = index.array_stores.get(&v).cloned().unwrap_or_default();
        let array_loads = index.array_loads.get(&v).cloned().unwrap_or_default();
        let invokes = index.invokes.get(&v).cloned().unwrap_or_default();

        for cso in delta.iter() {
            for (field, y) in &stores {
                let s = self.var_ptr(ctx.clone(), *y, method);
                let t = self.mgr.instance_field(cso.clone(), field.clone());
                self.add_pfg_edge(s, t);
            }
            for (x, field) in &loads {
                let s = self.mgr.instance_field(cso.clone(), field.clone());
                let t = self.var_ptr(ctx.clone(), *x, method);
                self.add_pfg_edge(s, t);
            }
            for y in &array_stores {
                let s = self.var_ptr(ctx.clone(), *y, method);
                let t = self.mgr.array_index(cso.clone());
                self.add_pfg_edge(s, t);
            }
            for x in &array_loads {
                let s = self.mgr.array_index(cso.clone());
                let t = self.var_ptr(ctx.clone(), *x, method);
                self.add_pfg_edge(s, t);
            }
            for stmt_id in &invokes {
                self.process_call(ctx, method, *stmt_id, cso)?;
            }
        }
        Ok(())
    }

    /// The merged (over every context) points-to set of `var` local to
    /// `method`, as consumed by [`crate::icp`].
    fn merged_points_to(&self, method: &MethodRef, var: Var) -> Vec<CsObj<C, O>> {
        let mut merged = PointsToSet::new();
        for (id, ptr) in self.mgr.pointers() {
            if let Pointer::Var(_, v) = ptr {
                if *v == var && self.var_home.get(&id) == Some(method) {
                    if let Some(pts) = self.pts.get(&id) {
                        merged.union_with(pts);
                    }
                }
            }
        }
        merged.iter().cloned().collect()
    }
}

impl<'e, C, O, Prog, Heap, Hier, Sel> PointerAnalysisResult<CsObj<C, O>>
    for PointerAnalysis<'e, C, O, Prog, Heap, Hier, Sel>
where
    C: Token,
    O: Object,
    Prog: Program,
    Heap: HeapModel<O>,
    Hier: ClassHierarchy,
    Sel: ContextSelector<C, O>,
{
    fn vars(&self) -> Vec<(MethodRef, Var)> {
        let mut set = BTreeSet::new();
        for (id, ptr) in self.mgr.pointers() {
            if let Pointer::Var(_, v) = ptr {
                if let Some(method) = self.var_home.get(&id) {
                    set.insert((method.clone(), *v));
                }
            }
        }
        set.into_iter().collect()
    }

    fn points_to_set(&self, method: &MethodRef, var: Var) -> Vec<CsObj<C, O>> {
        self.merged_points_to(method, var)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Field, MethodBody, Type};
    use std::collections::HashMap as StdHashMap;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Obj(StmtId);
    impl Object for Obj {
        fn class(&self) -> &Type {
            static T: std::sync::OnceLock<Type> = std::sync::OnceLock::new();
            T.get_or_init(|| Type::new("A"))
        }
    }

    struct FakeProgram {
        entry: MethodRef,
        bodies: StdHashMap<MethodRef, MethodBody>,
    }
    impl Program for FakeProgram {
        fn entry_method(&self) -> MethodRef {
            self.entry.clone()
        }
        fn body(&self, method: &MethodRef) -> Option<&MethodBody> {
            self.bodies.get(method)
        }
    }

    struct FakeHeap;
    impl HeapModel<Obj> for FakeHeap {
        fn get_obj(&self, site: &AllocSite) -> Obj {
            Obj(site.stmt)
        }
    }

    struct FakeHierarchy;
    impl ClassHierarchy for FakeHierarchy {
        fn resolve_callee(&self, _receiver_type: Option<&Type>, declared: &MethodRef) -> Option<MethodRef> {
            Some(declared.clone())
        }
    }

    struct Insensitive;
    impl ContextSelector<(), Obj> for Insensitive {
        fn empty_context(&self) {}
        fn select_heap_context(&self, _: &(), _: &MethodRef, _: &AllocSite) {}
        fn select_context_static(&self, _: &(), _: &MethodRef) {}
        fn select_context_instance(&self, _: &(), _: &CsObj<(), Obj>, _: &MethodRef) {}
    }

    fn m(name: &str) -> MethodRef {
        MethodRef::new(Type::new("A"), name, "()V")
    }

    #[test]
    fn allocation_and_copy_reach_the_same_object() {
        let entry = m("main");
        let mut body = MethodBody::default();
        body.stmts.push((
            StmtId(0),
            Stmt::New {
                lhs: Var(0),
                alloc: StmtId(0),
            },
        ));
        body.stmts.push((
            StmtId(1),
            Stmt::Copy {
                lhs: Var(1),
                rhs: Var(0),
            },
        ));
        let mut bodies = StdHashMap::new();
        bodies.insert(entry.clone(), body);
        let program = FakeProgram { entry: entry.clone(), bodies };
        let heap = FakeHeap;
        let hierarchy = FakeHierarchy;
        let selector = Insensitive;

        let mut pta = PointerAnalysis::new(&program, &heap, &hierarchy, &selector);
        pta.solve().unwrap();

        let x = pta.points_to_set(&entry, Var(0));
        let y = pta.points_to_set(&entry, Var(1));
        assert_eq!(x.len(), 1);
        assert_eq!(y.len(), 1);
        assert_eq!(x[0].base, y[0].base);
    }

    #[test]
    fn field_store_then_load_carries_the_stored_value() {
        let entry = m("main");
        let field = Field::new(Type::new("A"), "f");
        let mut body = MethodBody::default();
        body.stmts.push((
            StmtId(0),
            Stmt::New {
                lhs: Var(0), // a = new A()
                alloc: StmtId(0),
            },
        ));
        body.stmts.push((
            StmtId(1),
            Stmt::New {
                lhs: Var(1), // x = new A()
                alloc: StmtId(1),
            },
        ));
        body.stmts.push((
            StmtId(2),
            Stmt::StoreField {
                base: Var(0),
                field: field.clone(),
                rhs: Var(1),
            }, // a.f = x
        ));
        body.stmts.push((
            StmtId(3),
            Stmt::LoadField {
                lhs: Var(2),
                base: Var(0),
                field,
            }, // z = a.f
        ));
        let mut bodies = StdHashMap::new();
        bodies.insert(entry.clone(), body);
        let program = FakeProgram { entry: entry.clone(), bodies };
        let heap = FakeHeap;
        let hierarchy = FakeHierarchy;
        let selector = Insensitive;

        let mut pta = PointerAnalysis::new(&program, &heap, &hierarchy, &selector);
        pta.solve().unwrap();

        let z = pta.points_to_set(&entry, Var(2));
        let x = pta.points_to_set(&entry, Var(1));
        assert_eq!(z.len(), 1);
        assert_eq!(z[0].base, x[0].base);
    }

    #[test]
    fn unreachable_call_site_adds_no_edge() {
        // A call site on a variable that never gets a points-to set (no
        // allocation reaches it) must resolve no callee and add no edge.
        let entry = m("main");
        let callee = m("target");
        let mut body = MethodBody::default();
        body.stmts.push((
            StmtId(0),
            Stmt::Invoke {
                lhs: None,
                receiver: Var(0),
                kind: InstanceInvokeKind::Virtual,
                method: callee.clone(),
                args: vec![],
                call_site: CallSiteId { stmt: StmtId(0) },
            },
        ));
        let mut callee_body = MethodBody::default();
        callee_body.this_var = Some(Var(0));
        let mut bodies = StdHashMap::new();
        bodies.insert(entry.clone(), body);
        bodies.insert(callee.clone(), callee_body);
        let program = FakeProgram { entry: entry.clone(), bodies };
        let heap = FakeHeap;
        let hierarchy = FakeHierarchy;
        let selector = Insensitive;

        let mut pta = PointerAnalysis::new(&program, &heap, &hierarchy, &selector);
        pta.solve().unwrap();

        assert_eq!(pta.call_graph().edges().count(), 0);
    }
}
