//! Structural validation of the IR a [`Program`] hands this crate, run once
//! before any solver starts so a malformed body fails fast with a precise
//! [`AnalysisError`] instead of panicking or silently under-approximating
//! deep inside a fixed-point loop.

use std::collections::HashSet;

use crate::collaborators::Program;
use crate::errors::AnalysisError;
use crate::ir::{MethodRef, Var};

fn defined_vars(body: &crate::ir::MethodBody) -> HashSet<Var> {
    let mut defined: HashSet<Var> = body.this_var.into_iter().chain(body.params.iter().copied()).collect();
    for (_, stmt) in body.iter() {
        if let Some(def) = stmt.def() {
            defined.insert(def);
        }
    }
    defined
}

/// Checks that the program's entry method has a body, and that every
/// variable used anywhere in that method (and transitively, nothing else:
/// reachability itself is the solver's job, not validation's) is defined by
/// a parameter, the receiver, or some statement in the same body.
///
/// Call this once up front; the solvers in [`crate::pta`] and
/// [`crate::icp`] assume it has already passed.
pub fn validate_entry_method(program: &impl Program) -> Result<(), AnalysisError> {
    let entry = program.entry_method();
    validate_method(program, &entry)
}

/// Validates a single method body's variable references, independent of
/// whether it is reachable.
pub fn validate_method(program: &impl Program, method: &MethodRef) -> Result<(), AnalysisError> {
    let Some(body) = program.body(method) else {
        return Err(AnalysisError::MissingMethodBody(method.clone()));
    };
    let defined = defined_vars(body);
    for (stmt, s) in body.iter() {
        for used in s.uses() {
            if !defined.contains(&used) {
                return Err(AnalysisError::UnknownVariable {
                    method: method.clone(),
                    stmt,
                    var: used,
                });
            }
        }
    }
    Ok(())
}
