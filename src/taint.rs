//! Taint-flow tracking: a secondary fixed point over reachable calls, seeded
//! at configured sources and collected at configured sinks, run after
//! [`crate::pta`] has reached its own fixed point.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::callgraph::CallGraph;
use crate::collaborators::Program;
use crate::cs::{CsManager, CsMethodId};
use crate::errors::AnalysisError;
use crate::ir::{CallSiteId, MethodRef, Stmt, Type, Var};
use crate::obj::{Object, Token};

/// The sentinel `from`/`to` position denoting a call's receiver.
pub const BASE: i32 = -1;

/// The sentinel `from`/`to` position denoting a call's return value
/// (lvalue). Not named in the wire format this module's configuration is
/// modeled after, but required to express a transfer like `launder(arg0 ->
/// ret)`: see `DESIGN.md` for this resolution.
pub const RETURN: i32 = -2;

/// One source rule: a call to `method` produces a fresh taint object of type
/// `produces` at the call's return value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct TaintSource {
    pub method: MethodRef,
    pub produces: Type,
}

/// One sink rule: any taint reaching argument `arg` of a call to `method` is
/// reported.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct TaintSink {
    pub method: MethodRef,
    pub arg: i32,
}

/// One transfer rule: taint reaching position `from` of a call to `method`
/// also reaches position `to`, re-keyed to type `produces`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct TaintTransfer {
    pub method: MethodRef,
    pub from: i32,
    pub to: i32,
    pub produces: Type,
}

/// The taint configuration: sources, sinks and transfers, normally loaded by
/// the embedder from JSON/YAML/TOML and handed to this crate as a parsed
/// record (this crate never reads configuration files itself).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct TaintConfig {
    pub sources: Vec<TaintSource>,
    pub sinks: Vec<TaintSink>,
    pub transfers: Vec<TaintTransfer>,
}

/// An abstract taint object: data tainted at `source_call`, currently typed
/// `ty` (the type re-keys as the taint crosses a [`TaintTransfer`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaintObj {
    pub source_call: CallSiteId,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("t{_0}")]
struct TaintObjId(u32);

#[derive(Debug, Default)]
struct TaintManager {
    objs: Vec<TaintObj>,
    index: HashMap<TaintObj, TaintObjId>,
}

impl TaintManager {
    fn intern(&mut self, obj: TaintObj) -> TaintObjId {
        if let Some(&id) = self.index.get(&obj) {
            return id;
        }
        let id = TaintObjId(self.objs.len() as u32);
        self.index.insert(obj.clone(), id);
        self.objs.push(obj);
        id
    }

    fn resolve(&self, id: TaintObjId) -> &TaintObj {
        &self.objs[id.0 as usize]
    }
}

/// A reported taint flow: data produced at `source_call` reached argument
/// `arg_index` of `sink_call`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaintFlow {
    pub source_call: CallSiteId,
    pub sink_call: CallSiteId,
    pub arg_index: i32,
}

struct CallShape<'a> {
    method: &'a MethodRef,
    receiver: Option<Var>,
    lhs: Option<Var>,
    args: &'a [Var],
    call_site: CallSiteId,
}

fn call_shape(stmt: &Stmt) -> Option<CallShape<'_>> {
    match stmt {
        Stmt::InvokeStatic {
            lhs,
            method,
            args,
            call_site,
        } => Some(CallShape {
            method,
            receiver: None,
            lhs: *lhs,
            args,
            call_site: *call_site,
        }),
        Stmt::Invoke {
            lhs,
            receiver,
            method,
            args,
            call_site,
            ..
        } => Some(CallShape {
            method,
            receiver: Some(*receiver),
            lhs: *lhs,
            args,
            call_site: *call_site,
        }),
        _ => None,
    }
}

fn resolve_slot(slot: i32, receiver: Option<Var>, lhs: Option<Var>, args: &[Var]) -> Option<Var> {
    match slot {
        BASE => receiver,
        RETURN => lhs,
        i if i >= 0 => args.get(i as usize).copied(),
        _ => None,
    }
}

/// Runs taint propagation over a call graph and variable-owning program
/// already produced by [`crate::pta::PointerAnalysis`].
///
/// Maintains its own `tpts : (CsMethod, Var) -> Set<TaintObj>` map and
/// worklist, independent of the pointer analysis's own pointer-flow-graph
/// state: propagation here only ever needs exact `Var` identity within the
/// same calling context, never alias information.
#[instability::unstable(feature = "taint-analysis")]
pub struct TaintTracker<'e, C, O, Prog> {
    program: &'e Prog,
    config: &'e TaintConfig,
    call_graph: &'e CallGraph,
    mgr: &'e CsManager<C, O>,
    tpts: HashMap<(CsMethodId, Var), HashSet<TaintObjId>>,
    taint_mgr: TaintManager,
    worklist: VecDeque<(CsMethodId, Var, TaintObjId)>,
}

impl<'e, C, O, Prog> TaintTracker<'e, C, O, Prog>
where
    C: Token,
    O: Object,
    Prog: Program,
{
    /// Builds a tracker over the call graph and manager a finished
    /// [`crate::pta::PointerAnalysis`] exposes.
    pub fn new(program: &'e Prog, config: &'e TaintConfig, call_graph: &'e CallGraph, mgr: &'e CsManager<C, O>) -> Self {
        Self {
            program,
            config,
            call_graph,
            mgr,
            tpts: HashMap::new(),
            taint_mgr: TaintManager::default(),
            worklist: VecDeque::new(),
        }
    }

    /// Runs the tracker to quiescence and returns every reported flow,
    /// sorted by `(source_call, sink_call, arg_index)`.
    pub fn run(&mut self) -> Result<Vec<TaintFlow>, AnalysisError> {
        tracing::info!("taint tracking started");
        self.seed_sources()?;
        while let Some((cm, var, taint_id)) = self.worklist.pop_front() {
            let is_new = self.tpts.entry((cm, var)).or_default().insert(taint_id);
            if !is_new {
                continue;
            }
            tracing::debug!(method = %self.mgr.resolve_method(cm).method, var = %var, "taint reached variable");
            self.propagate_transfers(cm, var, taint_id)?;
        }
        let flows = self.collect_sinks()?;
        tracing::info!(flows = flows.len(), "taint tracking reached quiescence");
        Ok(flows)
    }

    fn seed_sources(&mut self) -> Result<(), AnalysisError> {
        for cm in self.call_graph.reachable_methods().collect::<Vec<_>>() {
            let method = self.mgr.resolve_method(cm).method.clone();
            let Some(body) = self.program.body(&method) else {
                continue;
            };
            for (_, stmt) in body.iter() {
                let Some(shape) = call_shape(stmt) else {
                    continue;
                };
                for source in &self.config.sources {
                    if *shape.method != source.method {
                        continue;
                    }
                    if let Some(lhs) = shape.lhs {
                        let obj = TaintObj {
                            source_call: shape.call_site,
                            ty: source.produces.clone(),
                        };
                        let id = self.taint_mgr.intern(obj);
                        self.worklist.push_back((cm, lhs, id));
                    }
                }
            }
        }
        Ok(())
    }

    fn propagate_transfers(&mut self, cm: CsMethodId, var: Var, taint_id: TaintObjId) -> Result<(), AnalysisError> {
        let method = self.mgr.resolve_method(cm).method.clone();
        let Some(body) = self.program.body(&method) else {
            return Ok(());
        };
        let source_call = self.taint_mgr.resolve(taint_id).source_call;
        for (_, stmt) in body.iter() {
            let Some(shape) = call_shape(stmt) else {
                continue;
            };
            for transfer in &self.config.transfers {
                if *shape.method != transfer.method {
                    continue;
                }
                let Some(from_var) = resolve_slot(transfer.from, shape.receiver, shape.lhs, shape.args) else {
                    continue;
                };
                if from_var != var {
                    continue;
                }
                let Some(to_var) = resolve_slot(transfer.to, shape.receiver, shape.lhs, shape.args) else {
                    continue;
                };
                let rekeyed = TaintObj {
                    source_call,
                    ty: transfer.produces.clone(),
                };
                let id = self.taint_mgr.intern(rekeyed);
                self.worklist.push_back((cm, to_var, id));
            }
        }
        Ok(())
    }

    fn collect_sinks(&self) -> Result<Vec<TaintFlow>, AnalysisError> {
        let mut flows = BTreeSet::new();
        for cm in self.call_graph.reachable_methods() {
            let method = self.mgr.resolve_method(cm).method.clone();
            let Some(body) = self.program.body(&method) else {
                continue;
            };
            for (_, stmt) in body.iter() {
                let Some(shape) = call_shape(stmt) else {
                    continue;
                };
                for sink in &self.config.sinks {
                    if *shape.method != sink.method {
                        continue;
                    }
                    let Some(sink_var) = resolve_slot(sink.arg, shape.receiver, shape.lhs, shape.args) else {
                        continue;
                    };
                    let Some(set) = self.tpts.get(&(cm, sink_var)) else {
                        continue;
                    };
                    for taint_id in set {
                        let obj = self.taint_mgr.resolve(*taint_id);
                        flows.insert(TaintFlow {
                            source_call: obj.source_call,
                            sink_call: shape.call_site,
                            arg_index: sink.arg,
                        });
                    }
                }
            }
        }
        Ok(flows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{MethodBody, StmtId};
    use crate::testing::DummyObj;
    use std::collections::HashMap as StdHashMap;

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

    fn m(name: &str) -> MethodRef {
        MethodRef::new(Type::new("Prog"), name, "()V")
    }

    #[test]
    fn direct_source_to_sink_flow_is_reported() {
        let entry = m("main");
        let source_m = m("source");
        let sink_m = m("sink");

        let mut body = MethodBody::default();
        let source_call = CallSiteId { stmt: StmtId(0) };
        let sink_call = CallSiteId { stmt: StmtId(1) };
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
        let mut bodies = StdHashMap::new();
        bodies.insert(entry.clone(), body);
        let program = FakeProgram { entry: entry.clone(), bodies };

        let config = TaintConfig {
            sources: vec![TaintSource {
                method: source_m,
                produces: Type::new("Tainted"),
            }],
            sinks: vec![TaintSink { method: sink_m, arg: 0 }],
            transfers: vec![],
        };

        let mut mgr: CsManager<(), DummyObj> = CsManager::new();
        let cm = mgr.cs_method((), entry);
        let mut call_graph = CallGraph::new();
        call_graph.mark_reachable(cm);

        let mut tracker = TaintTracker::new(&program, &config, &call_graph, &mgr);
        let flows = tracker.run().unwrap();
        assert_eq!(flows, vec![TaintFlow {
            source_call,
            sink_call,
            arg_index: 0,
        }]);
    }

    #[test]
    fn transfer_rekeys_taint_before_it_reaches_the_sink() {
        let entry = m("main");
        let source_m = m("source");
        let launder_m = m("launder");
        let sink_m = m("sink");

        let mut body = MethodBody::default();
        let source_call = CallSiteId { stmt: StmtId(0) };
        let launder_call = CallSiteId { stmt: StmtId(1) };
        let sink_call = CallSiteId { stmt: StmtId(2) };
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
                lhs: Some(Var(1)),
                method: launder_m.clone(),
                args: vec![Var(0)],
                call_site: launder_call,
            },
        ));
        body.stmts.push((
            StmtId(2),
            Stmt::InvokeStatic {
                lhs: None,
                method: sink_m.clone(),
                args: vec![Var(1)],
                call_site: sink_call,
            },
        ));
        let mut bodies = StdHashMap::new();
        bodies.insert(entry.clone(), body);
        let program = FakeProgram { entry: entry.clone(), bodies };

        let config = TaintConfig {
            sources: vec![TaintSource {
                method: source_m,
                produces: Type::new("Tainted"),
            }],
            sinks: vec![TaintSink { method: sink_m, arg: 0 }],
            transfers: vec![TaintTransfer {
                method: launder_m,
                from: 0,
                to: RETURN,
                produces: Type::new("Laundered"),
            }],
        };

        let mut mgr: CsManager<(), DummyObj> = CsManager::new();
        let cm = mgr.cs_method((), entry);
        let mut call_graph = CallGraph::new();
        call_graph.mark_reachable(cm);

        let mut tracker = TaintTracker::new(&program, &config, &call_graph, &mgr);
        let flows = tracker.run().unwrap();
        assert_eq!(flows, vec![TaintFlow {
            source_call,
            sink_call,
            arg_index: 0,
        }]);
    }

    #[test]
    fn untransferred_taint_does_not_reach_an_unrelated_sink() {
        let entry = m("main");
        let source_m = m("source");
        let sink_m = m("sink");

        let mut body = MethodBody::default();
        body.stmts.push((
            StmtId(0),
            Stmt::InvokeStatic {
                lhs: Some(Var(0)),
                method: source_m.clone(),
                args: vec![],
                call_site: CallSiteId { stmt: StmtId(0) },
            },
        ));
        // sink call reads an unrelated, never-tainted variable.
        body.stmts.push((
            StmtId(1),
            Stmt::InvokeStatic {
                lhs: None,
                method: sink_m.clone(),
                args: vec![Var(1)],
                call_site: CallSiteId { stmt: StmtId(1) },
            },
        ));
        let mut bodies = StdHashMap::new();
        bodies.insert(entry.clone(), body);
        let program = FakeProgram { entry: entry.clone(), bodies };

        let config = TaintConfig {
            sources: vec![TaintSource {
                method: source_m,
                produces: Type::new("Tainted"),
            }],
            sinks: vec![TaintSink { method: sink_m, arg: 0 }],
            transfers: vec![],
        };

        let mut mgr: CsManager<(), DummyObj> = CsManager::new();
        let cm = mgr.cs_method((), entry);
        let mut call_graph = CallGraph::new();
        call_graph.mark_reachable(cm);

        let mut tracker = TaintTracker::new(&program, &config, &call_graph, &mgr);
        let flows = tracker.run().unwrap();
        assert!(flows.is_empty());
    }
}
