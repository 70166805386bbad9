//! Interning of context-sensitive pointer nodes, methods, call sites and
//! objects.
//!
//! Pointer nodes, [`CsMethod`]s and [`CsCallSite`]s are arena-allocated and
//! identified by small `Copy` ids: equal `(context, ...)` keys always map to
//! the same id, so two lookups of the same logical node are always
//! comparable by id alone. Field and array nodes embed their owning object
//! by value rather than through a back-pointer.

use std::collections::HashMap;
use std::hash::Hash;

use derive_more::Display;

use crate::ir::{CallSiteId, Field, MethodRef, Var};
use crate::obj::{CsObj, Object, Token};

/// An interned handle to a [`Pointer`] node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("p{_0}")]
pub struct PointerId(u32);

impl PointerId {
    /// This id's position in interning order, for callers that need a dense
    /// index (e.g. [`crate::export`]'s `petgraph` adapter).
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned handle to a [`CsMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("m{_0}")]
pub struct CsMethodId(u32);

impl CsMethodId {
    /// This id's position in interning order, for callers that need a dense
    /// index (e.g. [`crate::export`]'s `petgraph` adapter).
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An interned handle to a [`CsCallSite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("cs{_0}")]
pub struct CsCallSiteId(u32);

/// A pointer node: one of a local variable under a context, an instance
/// field of an abstract object, a class-level static field, or the
/// index-collapsed slot of an abstract array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pointer<C, O> {
    /// A local variable under a calling context.
    Var(C, Var),
    /// A field of a context-sensitive abstract object.
    InstanceField(CsObj<C, O>, Field),
    /// A class-level field. Context-free: static fields have one identity
    /// program-wide.
    StaticField(Field),
    /// The single index-collapsed slot of an abstract array object.
    ArrayIndex(CsObj<C, O>),
}

/// A method reachable under a particular calling context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CsMethod<C> {
    pub ctx: C,
    pub method: MethodRef,
}

/// A call site reached under a particular calling context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CsCallSite<C> {
    pub ctx: C,
    pub call_site: CallSiteId,
}

/// Interns every context-sensitive identity the solver touches: pointer
/// nodes, reachable methods, and call sites.
///
/// Owned exclusively by one solver instance (never process-global), created
/// fresh for each `solve()` and dropped with it.
#[derive(Debug)]
pub struct CsManager<C: Token, O: Object> {
    pointers: Vec<Pointer<C, O>>,
    pointer_index: HashMap<Pointer<C, O>, PointerId>,

    methods: Vec<CsMethod<C>>,
    method_index: HashMap<(C, MethodRef), CsMethodId>,

    call_sites: Vec<CsCallSite<C>>,
    call_site_index: HashMap<(C, CallSiteId), CsCallSiteId>,
}

impl<C: Token, O: Object> Default for CsManager<C, O> {
    fn default() -> Self {
        Self {
            pointers: Vec::new(),
            pointer_index: HashMap::new(),
            methods: Vec::new(),
            method_index: HashMap::new(),
            call_sites: Vec::new(),
            call_site_index: HashMap::new(),
        }
    }
}

impl<C: Token, O: Object> CsManager<C, O> {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn intern_pointer(&mut self, pointer: Pointer<C, O>) -> PointerId {
        if let Some(&id) = self.pointer_index.get(&pointer) {
            return id;
        }
        let id = PointerId(self.pointers.len() as u32);
        self.pointer_index.insert(pointer.clone(), id);
        self.pointers.push(pointer);
        id
    }

    /// Interns `VarPtr(ctx, var)`.
    pub fn var_ptr(&mut self, ctx: C, var: Var) -> PointerId {
        self.intern_pointer(Pointer::Var(ctx, var))
    }

    /// Interns `InstanceField(obj, field)`.
    pub fn instance_field(&mut self, obj: CsObj<C, O>, field: Field) -> PointerId {
        self.intern_pointer(Pointer::InstanceField(obj, field))
    }

    /// Interns `StaticField(field)`.
    pub fn static_field(&mut self, field: Field) -> PointerId {
        self.intern_pointer(Pointer::StaticField(field))
    }

    /// Interns `ArrayIndex(obj)`.
    pub fn array_index(&mut self, obj: CsObj<C, O>) -> PointerId {
        self.intern_pointer(Pointer::ArrayIndex(obj))
    }

    /// Resolves an interned pointer id back to its node.
    #[must_use]
    pub fn pointer(&self, id: PointerId) -> &Pointer<C, O> {
        &self.pointers[id.0 as usize]
    }

    /// Iterates over every pointer node interned so far.
    pub fn pointers(&self) -> impl Iterator<Item = (PointerId, &Pointer<C, O>)> {
        self.pointers
            .iter()
            .enumerate()
            .map(|(i, p)| (PointerId(i as u32), p))
    }

    /// Interns a method reached under `ctx`.
    pub fn cs_method(&mut self, ctx: C, method: MethodRef) -> CsMethodId {
        let key = (ctx.clone(), method.clone());
        if let Some(&id) = self.method_index.get(&key) {
            return id;
        }
        let id = CsMethodId(self.methods.len() as u32);
        self.method_index.insert(key, id);
        self.methods.push(CsMethod { ctx, method });
        id
    }

    /// Resolves an interned method id back to its `(context, method)` pair.
    #[must_use]
    pub fn resolve_method(&self, id: CsMethodId) -> &CsMethod<C> {
        &self.methods[id.0 as usize]
    }

    /// Interns a call site reached under `ctx`.
    pub fn cs_call_site(&mut self, ctx: C, call_site: CallSiteId) -> CsCallSiteId {
        let key = (ctx.clone(), call_site);
        if let Some(&id) = self.call_site_index.get(&key) {
            return id;
        }
        let id = CsCallSiteId(self.call_sites.len() as u32);
        self.call_site_index.insert(key, id);
        self.call_sites.push(CsCallSite { ctx, call_site });
        id
    }

    /// Resolves an interned call-site id back to its `(context, call site)` pair.
    #[must_use]
    pub fn resolve_call_site(&self, id: CsCallSiteId) -> &CsCallSite<C> {
        &self.call_sites[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Type;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TestObj;
    impl Object for TestObj {
        fn class(&self) -> &Type {
            static T: std::sync::OnceLock<Type> = std::sync::OnceLock::new();
            T.get_or_init(|| Type::new("T"))
        }
    }

    #[test]
    fn interning_is_identity_preserving() {
        let mut mgr: CsManager<(), TestObj> = CsManager::new();
        let a = mgr.var_ptr((), Var(0));
        let b = mgr.var_ptr((), Var(0));
        let c = mgr.var_ptr((), Var(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn static_field_is_context_free() {
        let mut mgr: CsManager<(), TestObj> = CsManager::new();
        let f = Field::new(Type::new("T"), "x");
        let a = mgr.static_field(f.clone());
        let b = mgr.static_field(f);
        assert_eq!(a, b);
    }
}
