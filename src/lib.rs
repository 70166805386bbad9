#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    rust_2021_compatibility
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

//! A whole-program static analysis core: interprocedural constant
//! propagation and context-sensitive pointer analysis over a class-based
//! intermediate representation, with an optional taint-flow tracker layered
//! on top of the points-to result.
//!
//! [`ir`] fixes the IR vocabulary; [`collaborators`] declares what the
//! embedder must supply (class hierarchy, heap model, context selection,
//! CFGs); [`pta`] and [`icp`] are the two solvers; [`deadcode`] combines
//! their results into a dead-code report.
//!
//! ## Features
#![doc = document_features::document_features!()]

pub mod callgraph;
pub mod collaborators;
pub mod cs;
pub mod dataflow;
pub mod deadcode;
pub mod errors;
pub mod graph;
pub mod icp;
pub mod ir;
pub mod lattice;
pub mod liveness;
pub mod obj;
pub mod pfg;
pub mod pta;
pub mod pts;

/// Experimental taint-flow tracking layered on top of [`pta`]'s points-to
/// result.
#[cfg(feature = "unstable-taint-analysis")]
pub mod taint;

pub mod validate;
pub mod worklist;

/// Builds `petgraph` graphs from [`pfg::PointerFlowGraph`] and
/// [`callgraph::CallGraph`], for callers that want to run a library
/// algorithm over them or render one with `petgraph::dot::Dot`.
#[cfg(feature = "petgraph")]
pub mod export;

/// Fixtures shared by unit tests across modules.
#[cfg(test)]
pub mod testing;
