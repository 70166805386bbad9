//! Small fixtures shared by unit tests across modules. Not part of the
//! public API.

use crate::ir::Type;
use crate::obj::Object;

/// A minimal stand-in for a real heap-model object: useful whenever a test
/// only cares about pointer-identity plumbing, not object semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DummyObj;

impl Object for DummyObj {
    fn class(&self) -> &Type {
        static T: std::sync::OnceLock<Type> = std::sync::OnceLock::new();
        T.get_or_init(|| Type::new("T"))
    }
}
