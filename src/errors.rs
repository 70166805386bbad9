//! Crate-wide fatal error type.
//!
//! Imprecision is the normal case for these analyses and is never an error
//! (see the lattice and points-to modules); this enum exists only for truly
//! fatal conditions: malformed IR, and unresolvable references that a
//! collaborator signals rather than degrading gracefully.

use crate::ir::{CallSiteId, MethodRef, StmtId, Var};

/// A fatal condition encountered while solving. No analysis here retries;
/// all errors surface synchronously from the solver's entry point and no
/// partial results are returned.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// A statement referenced a variable that is not defined anywhere in its
    /// method body's declared parameters, receiver, or prior definitions.
    #[error("method {method} statement {stmt}: reference to unknown variable {var}")]
    UnknownVariable {
        method: MethodRef,
        stmt: StmtId,
        var: Var,
    },

    /// A call site's containing method has no body registered with the
    /// [`crate::collaborators::Program`].
    #[error("method {0} has no body")]
    MissingMethodBody(MethodRef),

    /// The program's declared entry method has no body.
    #[error("entry method {0} has no body")]
    MissingEntryPoint(MethodRef),

    /// A collaborator (class hierarchy, context selector, heap model)
    /// signaled that a reference could not be resolved at all, as opposed to
    /// resolving to "no callee" which is not an error (see
    /// [`crate::collaborators::ClassHierarchy::resolve_callee`]).
    #[error("unresolvable reference at call site {0}: {1}")]
    UnresolvableReference(CallSiteId, String),
}
