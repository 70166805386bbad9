//! The shape of the intermediate representation this crate's analyses
//! operate over.
//!
//! Building this data from bytecode or source, resolving a class hierarchy,
//! and constructing control flow graphs are all the caller's job (see
//! [`crate::collaborators`]). This module only fixes the *vocabulary*:
//! variables, fields, methods, allocation sites, and the statement/expression
//! sum types that [`crate::pta`] and [`crate::icp`] pattern-match on.

use std::fmt;

/// A local variable, scoped to a single method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("v{_0}")]
pub struct Var(pub u32);

/// A class or interface name.
///
/// Stands in for the caller's real type system (out of scope here, see
/// [`crate::collaborators`]). Two [`Type`]s are equal iff they name the
/// same class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
pub struct Type(pub String);

impl Type {
    /// Creates a new type reference from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// A reference to a field, either static or instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{owner}.{name}")]
pub struct Field {
    /// The class that declares the field.
    pub owner: Type,
    /// The field's name.
    pub name: String,
}

impl Field {
    /// Creates a new field reference.
    pub fn new(owner: Type, name: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
        }
    }
}

/// A reference to a method, identified by owner, name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[display("{owner}.{name}{descriptor}")]
pub struct MethodRef {
    /// The class that declares the method.
    pub owner: Type,
    /// The method's name.
    pub name: String,
    /// An opaque descriptor string distinguishing overloads.
    pub descriptor: String,
}

impl MethodRef {
    /// Creates a new method reference.
    pub fn new(owner: Type, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner,
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// The index of a statement within its owning method's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("#{_0}")]
pub struct StmtId(pub u32);

/// Uniquely identifies a call site within the whole program: the method that
/// contains it plus the statement index of the invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSiteId {
    /// The statement holding the invoke.
    pub stmt: StmtId,
}

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call{}", self.stmt)
    }
}

/// Identifies a `New` statement as an allocation site, deterministically
/// (the same pair always denotes the same syntactic allocation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocSite {
    /// The method containing the allocation.
    pub method: MethodRef,
    /// The statement performing the allocation.
    pub stmt: StmtId,
}

impl fmt::Display for AllocSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.method, self.stmt)
    }
}

/// A binary operator tracked by the integer lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// arithmetic `>>`
    Shr,
    /// logical `>>>`
    UShr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// The right-hand side of an [`Stmt::Assign`] or the condition of an
/// [`Stmt::If`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A bare variable read.
    Var(Var),
    /// An integer literal.
    IntConst(i32),
    /// A binary arithmetic, bitwise or comparison operation.
    Binary(BinOp, Var, Var),
    /// A narrowing/widening cast. Never side-effect-free: it may throw.
    Cast(Var),
    /// Anything this IR does not give arithmetic meaning to (e.g. a
    /// non-integer-typed expression). Always evaluates to NAC.
    Other,
}

/// The kind of dispatch used at an instance invoke.
///
/// Mirrors the call-graph edge kinds this crate's pointer analysis can add
/// (`STATIC` has no instance-invoke counterpart; it is handled by
/// [`Stmt::InvokeStatic`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum InstanceInvokeKind {
    /// Ordinary virtual dispatch.
    Virtual,
    /// Dispatch through an interface method table.
    Interface,
    /// Dispatch that bypasses virtual lookup (private methods, constructors, `super` calls).
    Special,
    /// Dispatch resolved by a dynamic call-site bootstrap.
    Dynamic,
}

/// A single IR instruction.
///
/// Statement handling is implemented as pattern matching on this sum type
/// (not dynamic dispatch) throughout the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `lhs = new T(...)`. `alloc` identifies this statement as the
    /// allocation site passed to [`crate::collaborators::HeapModel`].
    New { lhs: Var, alloc: StmtId },
    /// `lhs = rhs`.
    Copy { lhs: Var, rhs: Var },
    /// `T.field = rhs`.
    StoreStaticField { field: Field, rhs: Var },
    /// `lhs = T.field`.
    LoadStaticField { lhs: Var, field: Field },
    /// `base.field = rhs`.
    StoreField { base: Var, field: Field, rhs: Var },
    /// `lhs = base.field`.
    LoadField { lhs: Var, base: Var, field: Field },
    /// `base[index] = rhs`.
    StoreArray { base: Var, index: Var, rhs: Var },
    /// `lhs = base[index]`.
    LoadArray { lhs: Var, base: Var, index: Var },
    /// `lhs = T.m(args...)`, a static invoke resolved without a receiver.
    InvokeStatic {
        lhs: Option<Var>,
        method: MethodRef,
        args: Vec<Var>,
        call_site: CallSiteId,
    },
    /// `lhs = receiver.m(args...)`, resolved against `receiver`'s points-to
    /// set once it is known.
    Invoke {
        lhs: Option<Var>,
        receiver: Var,
        kind: InstanceInvokeKind,
        method: MethodRef,
        args: Vec<Var>,
        call_site: CallSiteId,
    },
    /// A conditional branch on `cond`.
    If { cond: Expr },
    /// A multi-way branch on `var`.
    Switch { var: Var },
    /// `lhs = rhs` where `rhs` is an arithmetic expression (as opposed to
    /// [`Stmt::Copy`], a plain variable-to-variable move).
    Assign { lhs: Var, rhs: Expr },
    /// Returns zero or more values to the caller.
    Return { vars: Vec<Var> },
    /// An unconditional jump.
    Goto,
}

impl Stmt {
    /// The variable assigned by this statement, if any.
    #[must_use]
    pub fn def(&self) -> Option<Var> {
        match self {
            Stmt::New { lhs, .. }
            | Stmt::Copy { lhs, .. }
            | Stmt::LoadStaticField { lhs, .. }
            | Stmt::LoadField { lhs, .. }
            | Stmt::LoadArray { lhs, .. }
            | Stmt::Assign { lhs, .. } => Some(*lhs),
            Stmt::InvokeStatic { lhs, .. } | Stmt::Invoke { lhs, .. } => *lhs,
            Stmt::StoreStaticField { .. }
            | Stmt::StoreField { .. }
            | Stmt::StoreArray { .. }
            | Stmt::If { .. }
            | Stmt::Switch { .. }
            | Stmt::Return { .. }
            | Stmt::Goto => None,
        }
    }

    /// The variables read by this statement.
    #[must_use]
    pub fn uses(&self) -> Vec<Var> {
        match self {
            Stmt::New { .. } | Stmt::Goto => vec![],
            Stmt::Copy { rhs, .. } => vec![*rhs],
            Stmt::StoreStaticField { rhs, .. } => vec![*rhs],
            Stmt::LoadStaticField { .. } => vec![],
            Stmt::StoreField { base, rhs, .. } => vec![*base, *rhs],
            Stmt::LoadField { base, .. } => vec![*base],
            Stmt::StoreArray {
                base, index, rhs, ..
            } => vec![*base, *index, *rhs],
            Stmt::LoadArray { base, index, .. } => vec![*base, *index],
            Stmt::InvokeStatic { args, .. } => args.clone(),
            Stmt::Invoke { receiver, args, .. } => {
                let mut uses = vec![*receiver];
                uses.extend(args.iter().copied());
                uses
            }
            Stmt::If { cond } => expr_uses(cond),
            Stmt::Switch { var } => vec![*var],
            Stmt::Assign { rhs, .. } => expr_uses(rhs),
            Stmt::Return { vars } => vars.clone(),
        }
    }

    /// Whether this statement, as an assignment, has no observable effect
    /// other than binding its left-hand side. Object allocation, casts,
    /// field/array access and integer division/remainder are never
    /// considered side-effect-free, since each can diverge, throw, or touch
    /// the heap.
    #[must_use]
    pub fn is_side_effect_free_assign(&self) -> bool {
        match self {
            Stmt::Assign { rhs, .. } => match rhs {
                Expr::Var(_) | Expr::IntConst(_) => true,
                Expr::Binary(op, _, _) => !matches!(op, BinOp::Div | BinOp::Rem),
                Expr::Cast(_) | Expr::Other => false,
            },
            Stmt::Copy { .. } => true,
            _ => false,
        }
    }
}

fn expr_uses(expr: &Expr) -> Vec<Var> {
    match expr {
        Expr::Var(v) | Expr::Cast(v) => vec![*v],
        Expr::IntConst(_) | Expr::Other => vec![],
        Expr::Binary(_, a, b) => vec![*a, *b],
    }
}

/// The body of a single method: its parameters, optional receiver, return
/// variables and linear statement list.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// `Some` for instance methods; `None` for static methods.
    pub this_var: Option<Var>,
    /// Formal parameters, in declaration order (excluding `this`).
    pub params: Vec<Var>,
    /// Variables returned by any [`Stmt::Return`] in this body.
    pub ret_vars: Vec<Var>,
    /// Statements, addressed by [`StmtId`].
    pub stmts: Vec<(StmtId, Stmt)>,
}

impl MethodBody {
    /// Looks up a statement by id.
    #[must_use]
    pub fn stmt(&self, id: StmtId) -> Option<&Stmt> {
        self.stmts.iter().find(|(i, _)| *i == id).map(|(_, s)| s)
    }

    /// Iterates over all statements in this body.
    pub fn iter(&self) -> impl Iterator<Item = (StmtId, &Stmt)> {
        self.stmts.iter().map(|(id, s)| (*id, s))
    }
}
