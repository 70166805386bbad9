//! Concrete end-to-end scenarios exercising the public solver API together:
//! pointer analysis driving virtual dispatch, constant propagation feeding
//! dead-code elimination, and (when enabled) taint tracking layered on top.

use std::collections::HashMap;

use flowcore::callgraph::CallGraph;
use flowcore::collaborators::{ClassHierarchy, ContextSelector, HeapModel, PointerAnalysisResult, Program};
use flowcore::cs::CsManager;
use flowcore::deadcode::find_dead_code;
use flowcore::graph::{EdgeKind, SimpleGraph};
use flowcore::icp::{project_call_graph, run_icp, CallInfo, IcpAnalysis, InterproceduralGraph};
use flowcore::ir::{
    AllocSite, BinOp, CallSiteId, Expr, InstanceInvokeKind, MethodBody, MethodRef, Stmt, StmtId, Type, Var,
};
use flowcore::lattice::Value;
use flowcore::obj::Object;
use flowcore::pta::PointerAnalysis;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TaggedObj(Type);

impl Object for TaggedObj {
    fn class(&self) -> &Type {
        &self.0
    }
}

struct Program1(HashMap<MethodRef, MethodBody>, MethodRef);

impl Program for Program1 {
    fn entry_method(&self) -> MethodRef {
        self.1.clone()
    }
    fn body(&self, method: &MethodRef) -> Option<&MethodBody> {
        self.0.get(method)
    }
}

fn method(owner: &str, name: &str) -> MethodRef {
    MethodRef::new(Type::new(owner), name, "()V")
}

/// Scenario: `B b = new B(); b.m();` with `B extends A` and both declaring
/// `m`. Dispatch against the runtime object's class must resolve to `B.m`
/// alone, and `b`'s points-to set must hold only the allocated `B`.
#[test]
fn virtual_dispatch_resolves_only_the_overriding_method() {
    let entry = method("Main", "main");
    let b_m = method("B", "m");

    let mut main_body = MethodBody::default();
    main_body.stmts.push((
        StmtId(0),
        Stmt::New {
            lhs: Var(0),
            alloc: StmtId(0),
        },
    ));
    main_body.stmts.push((
        StmtId(1),
        Stmt::Invoke {
            lhs: None,
            receiver: Var(0),
            kind: InstanceInvokeKind::Virtual,
            method: method("A", "m"),
            args: vec![],
            call_site: CallSiteId { stmt: StmtId(1) },
        },
    ));

    let mut b_m_body = MethodBody::default();
    b_m_body.this_var = Some(Var(0));

    let mut bodies = HashMap::new();
    bodies.insert(entry.clone(), main_body);
    bodies.insert(b_m.clone(), b_m_body);
    let program = Program1(bodies, entry.clone());

    struct Heap;
    impl HeapModel<TaggedObj> for Heap {
        fn get_obj(&self, _site: &AllocSite) -> TaggedObj {
            TaggedObj(Type::new("B"))
        }
    }

    struct Hierarchy;
    impl ClassHierarchy for Hierarchy {
        fn resolve_callee(&self, receiver_type: Option<&Type>, declared: &MethodRef) -> Option<MethodRef> {
            match receiver_type {
                Some(t) if t == &Type::new("B") => Some(MethodRef::new(Type::new("B"), "m", "()V")),
                _ => Some(declared.clone()),
            }
        }
    }

    struct Insensitive;
    impl ContextSelector<(), TaggedObj> for Insensitive {
        fn empty_context(&self) {}
        fn select_heap_context(&self, _: &(), _: &MethodRef, _: &AllocSite) {}
        fn select_context_static(&self, _: &(), _: &MethodRef) {}
        fn select_context_instance(&self, _: &(), _: &flowcore::obj::CsObj<(), TaggedObj>, _: &MethodRef) {}
    }

    let heap = Heap;
    let hierarchy = Hierarchy;
    let selector = Insensitive;
    let mut pta = PointerAnalysis::new(&program, &heap, &hierarchy, &selector);
    pta.solve().unwrap();

    let callees: Vec<_> = pta
        .call_graph()
        .edges()
        .map(|e| pta.cs_manager().resolve_method(e.callee).method.clone())
        .collect();
    assert_eq!(callees, vec![b_m]);

    let b = pta.points_to_set(&entry, Var(0));
    assert_eq!(b.len(), 1);
    assert_eq!(*b[0].class(), Type::new("B"));
}

/// Scenario: `x = 1; if (x == 1) y = 2; else y = 3;`. The taken branch's
/// assignment resolves to a fixed constant, and the untaken branch is
/// reported dead.
#[test]
fn constant_propagation_eliminates_the_untaken_branch() {
    let entry = method("Main", "main");

    // 0: x = 1
    // 1: one = 1
    // 2: if (x == one)
    // 3: y = 2        (IfTrue)
    // 4: y = 3        (IfFalse)
    // 5: return y
    let body = MethodBody {
        this_var: None,
        params: vec![],
        ret_vars: vec![],
        stmts: vec![
            (
                StmtId(0),
                Stmt::Assign {
                    lhs: Var(0),
                    rhs: Expr::IntConst(1),
                },
            ),
            (
                StmtId(1),
                Stmt::Assign {
                    lhs: Var(1),
                    rhs: Expr::IntConst(1),
                },
            ),
            (
                StmtId(2),
                Stmt::If {
                    cond: Expr::Binary(BinOp::Eq, Var(0), Var(1)),
                },
            ),
            (
                StmtId(3),
                Stmt::Assign {
                    lhs: Var(2),
                    rhs: Expr::IntConst(2),
                },
            ),
            (
                StmtId(4),
                Stmt::Assign {
                    lhs: Var(2),
                    rhs: Expr::IntConst(3),
                },
            ),
            (StmtId(5), Stmt::Return { vars: vec![Var(2)] }),
        ],
    };
    let cfg = SimpleGraph::from_edges(
        StmtId(0),
        [
            (StmtId(0), StmtId(1), EdgeKind::Normal),
            (StmtId(1), StmtId(2), EdgeKind::Normal),
            (StmtId(2), StmtId(3), EdgeKind::IfTrue),
            (StmtId(2), StmtId(4), EdgeKind::IfFalse),
            (StmtId(3), StmtId(5), EdgeKind::Normal),
            (StmtId(4), StmtId(5), EdgeKind::Normal),
        ],
    );

    let mut bodies = HashMap::new();
    bodies.insert(entry.clone(), body);
    let program = Program1(bodies, entry.clone());

    struct Cfg(HashMap<MethodRef, SimpleGraph<StmtId>>);
    impl flowcore::collaborators::CfgProvider for Cfg {
        fn cfg(&self, method: &MethodRef) -> Option<&SimpleGraph<StmtId>> {
            self.0.get(method)
        }
    }
    let mut cfgs = HashMap::new();
    cfgs.insert(entry.clone(), cfg);
    let cfg_provider = Cfg(cfgs);

    struct AllIntegral;
    impl flowcore::collaborators::VarTypes for AllIntegral {
        fn is_integral(&self, _method: &MethodRef, _var: Var) -> bool {
            true
        }
    }
    let var_types = AllIntegral;

    struct NoPta;
    impl PointerAnalysisResult<TaggedObj> for NoPta {
        fn vars(&self) -> Vec<(MethodRef, Var)> {
            vec![]
        }
        fn points_to_set(&self, _method: &MethodRef, _var: Var) -> Vec<TaggedObj> {
            vec![]
        }
    }
    let pta = NoPta;

    let mut mgr: CsManager<(), TaggedObj> = CsManager::new();
    let cs_entry = mgr.cs_method((), entry.clone());
    let mut call_graph = CallGraph::new();
    call_graph.mark_reachable(cs_entry);
    let call_info = project_call_graph(&call_graph, &mgr);

    let mut analysis = IcpAnalysis::new(&program, &var_types, &cfg_provider, &call_info, &pta);
    let icfg = InterproceduralGraph::new(&cfg_provider, &program, &call_info);
    let icp = run_icp(&icfg, &mut analysis);

    let out_true = icp.get_out_fact(flowcore::graph::Loc {
        method: entry.clone(),
        stmt: StmtId(3),
    });
    assert_eq!(out_true.get(Var(2)), Value::Const(2));

    let dead = find_dead_code(&cfg_provider, &program, &call_info, &icp);
    assert!(dead[&entry].contains(&StmtId(4)));
    assert!(!dead[&entry].contains(&StmtId(3)));
}

/// Scenario: `t = source(); sink(t);` reports exactly one flow from the
/// source call to the sink call at argument index 0.
#[cfg(feature = "unstable-taint-analysis")]
#[test]
fn taint_flows_from_source_call_to_sink_call() {
    use flowcore::taint::{TaintConfig, TaintFlow, TaintSink, TaintSource, TaintTracker};

    let entry = method("Main", "main");
    let source_m = method("Lib", "source");
    let sink_m = method("Lib", "sink");

    let source_call = CallSiteId { stmt: StmtId(0) };
    let sink_call = CallSiteId { stmt: StmtId(1) };

    let mut body = MethodBody::default();
    body.stmts.push((
        StmtId(0),
        Stmt::InvokeStatic {
            lhs: Some(Var(0)),
            method: source_m.clone(),
            args: vec![],
            call_site: source_call,
        },
    ));
    body.stmts.push((
        StmtId(1),
        Stmt::InvokeStatic {
            lhs: None,
            method: sink_m.clone(),
            args: vec![Var(0)],
            call_site: sink_call,
        },
    ));
    let mut bodies = HashMap::new();
    bodies.insert(entry.clone(), body);
    let program = Program1(bodies, entry.clone());

    let config = TaintConfig {
        sources: vec![TaintSource {
            method: source_m,
            produces: Type::new("Tainted"),
        }],
        sinks: vec![TaintSink { method: sink_m, arg: 0 }],
        transfers: vec![],
    };

    let mut mgr: CsManager<(), TaggedObj> = CsManager::new();
    let cs_entry = mgr.cs_method((), entry.clone());
    let mut call_graph = CallGraph::new();
    call_graph.mark_reachable(cs_entry);

    let mut tracker = TaintTracker::new(&program, &config, &call_graph, &mgr);
    let flows = tracker.run().unwrap();
    assert_eq!(
        flows,
        vec![TaintFlow {
            source_call,
            sink_call,
            arg_index: 0,
        }]
    );
}
