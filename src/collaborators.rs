//! External interfaces this crate consumes but never implements.
//!
//! IR construction, class hierarchy resolution, the type system,
//! virtual-dispatch resolution, and context selection are all supplied by
//! the embedder. This module only declares the shape of that contract.

use crate::graph::SimpleGraph;
use crate::ir::{AllocSite, MethodBody, MethodRef, StmtId, Type, Var};
use crate::obj::{CsObj, Object, Token};

/// Gives the solver access to method bodies by reference, standing in for
/// whatever IR storage the embedder actually uses.
pub trait Program {
    /// The program's entry method (e.g. `main`).
    fn entry_method(&self) -> MethodRef;

    /// Looks up a method's body, if known.
    fn body(&self, method: &MethodRef) -> Option<&MethodBody>;
}

/// Resolves virtual dispatch. Implemented by the embedder's class hierarchy
/// analysis; this crate never inspects the hierarchy itself.
pub trait ClassHierarchy {
    /// Resolves the callee of an instance invoke against the receiver's
    /// runtime type (`None` if the receiver's type is not yet known, which
    /// should not normally happen once an object is in a pointer's
    /// points-to set). The `declared` method is the statically-declared
    /// target at the call site, used to identify which signature is being
    /// dispatched. Returning `None` (e.g. an abstract method with no
    /// override reachable for this type) is valid and not an error: the
    /// call-graph edge is simply not added.
    fn resolve_callee(&self, receiver_type: Option<&Type>, declared: &MethodRef) -> Option<MethodRef>;
}

/// Produces the abstract object for an allocation site. Must be
/// deterministic: the same [`AllocSite`] always yields an object that
/// compares equal to itself.
pub trait HeapModel<O: Object> {
    /// Returns the abstract object a `new` statement at `site` allocates.
    fn get_obj(&self, site: &AllocSite) -> O;
}

/// Chooses context identities. The same token type is used for both calling
/// contexts and heap (object-allocation) contexts.
pub trait ContextSelector<C: Token, O: Object> {
    /// The context assigned to the program's entry method.
    fn empty_context(&self) -> C;

    /// The heap context under which a `new` executed by `method` (reached
    /// under `method_ctx`) should be distinguished.
    fn select_heap_context(&self, method_ctx: &C, method: &MethodRef, site: &AllocSite) -> C;

    /// The context assigned to a static callee, given the context of the
    /// call site that invokes it.
    fn select_context_static(&self, caller_ctx: &C, callee: &MethodRef) -> C;

    /// The context assigned to an instance-invoke callee, given the caller's
    /// context and the context-sensitive receiver object the dispatch
    /// resolved against.
    fn select_context_instance(
        &self,
        caller_ctx: &C,
        receiver_obj: &CsObj<C, O>,
        callee: &MethodRef,
    ) -> C;
}

/// Tells constant propagation which variables carry 32-bit-or-narrower
/// integral or boolean values; everything else passes through unmodeled
/// (no floating-point, `long`, or reference-typed constant is tracked).
pub trait VarTypes {
    /// Whether `var` (local to `method`) should be tracked by the integer
    /// lattice.
    fn is_integral(&self, method: &MethodRef, var: Var) -> bool;
}

/// Supplies one method's intraprocedural control flow graph. Building it
/// from bytecode or source is the caller's job (see [`crate::graph`]); this
/// crate's interprocedural analyses only stitch these graphs together at
/// call sites.
pub trait CfgProvider {
    /// The control flow graph for `method`'s body, if known.
    fn cfg(&self, method: &MethodRef) -> Option<&SimpleGraph<StmtId>>;
}

/// The final result a pointer analysis exposes to downstream clients (here,
/// [`crate::icp`]): one points-to set per program variable.
pub trait PointerAnalysisResult<O: Object> {
    /// Every variable the analysis tracked a points-to set for.
    fn vars(&self) -> Vec<(MethodRef, Var)>;

    /// The merged (over all contexts) points-to set for `var` in `method`.
    fn points_to_set(&self, method: &MethodRef, var: Var) -> Vec<O>;
}
