//! The three-point integer lattice and the dataflow fact built on top of it.
//!
//! This is the value domain for [`crate::icp`]: `UNDEF ⊏ CONST(c) ⊏ NAC`, with
//! the standard meet (two distinct constants meet to `NAC`).

use std::collections::BTreeMap;

use crate::dataflow::Lattice;
use crate::ir::{BinOp, Expr, Var};

/// A value in the three-point integer lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Bottom: unknown-but-unreached.
    Undef,
    /// A known 32-bit constant.
    Const(i32),
    /// Top: not a constant.
    Nac,
}

impl Value {
    /// Computes the meet (greatest lower bound) of two values.
    ///
    /// `meet(UNDEF, x) = x`, `meet(NAC, x) = NAC`, and two distinct constants
    /// meet to `NAC`.
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        use Value::{Const, Nac, Undef};
        match (self, other) {
            (Undef, x) | (x, Undef) => x,
            (Nac, _) | (_, Nac) => Nac,
            (Const(a), Const(b)) if a == b => Const(a),
            (Const(_), Const(_)) => Nac,
        }
    }
}

/// A mapping from variable to [`Value`], with an implicit default of
/// [`Value::Undef`] for variables not present in the map.
///
/// Meet is pointwise over the union of both maps' keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpFact {
    values: BTreeMap<Var, Value>,
}

impl CpFact {
    /// Creates an empty fact (every variable is `UNDEF`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the value bound to `var`, defaulting to `UNDEF`.
    #[must_use]
    pub fn get(&self, var: Var) -> Value {
        self.values.get(&var).copied().unwrap_or(Value::Undef)
    }

    /// Binds `var` to `value`. Binding to `UNDEF` removes the entry, keeping
    /// the map's size proportional to the number of non-default bindings.
    pub fn set(&mut self, var: Var, value: Value) {
        if matches!(value, Value::Undef) {
            self.values.remove(&var);
        } else {
            self.values.insert(var, value);
        }
    }

    /// Computes the pointwise meet of two facts.
    #[must_use]
    pub fn meet(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (&var, &val) in &other.values {
            let current = merged.get(var);
            merged.set(var, current.meet(val));
        }
        merged
    }

    /// Iterates over the variables with a non-`UNDEF` binding.
    pub fn iter(&self) -> impl Iterator<Item = (Var, Value)> + '_ {
        self.values.iter().map(|(&v, &val)| (v, val))
    }
}

impl Lattice for CpFact {
    fn bottom() -> Self {
        Self::new()
    }

    fn meet(&self, other: &Self) -> Self {
        Self::meet(self, other)
    }
}

/// Evaluates an expression under a dataflow fact:
///
/// - A variable reads its binding (`UNDEF` if absent).
/// - An integer literal is always `CONST`.
/// - Division/remainder by a constant zero evaluates to `UNDEF` (modeled as
///   unreachable, never an error).
/// - Any other operand being `NAC` makes the result `NAC`.
/// - Any other operand being `UNDEF` (with no constant-zero divisor) makes
///   the result `UNDEF`.
/// - Two constants evaluate to the constant result of the operation.
/// - Comparisons yield `CONST(0)` or `CONST(1)`.
/// - Casts and unrecognized expression forms are `NAC`.
#[must_use]
pub fn evaluate(expr: &Expr, fact: &CpFact) -> Value {
    match expr {
        Expr::Var(v) => fact.get(*v),
        Expr::IntConst(c) => Value::Const(*c),
        Expr::Cast(_) | Expr::Other => Value::Nac,
        Expr::Binary(op, a, b) => {
            let (va, vb) = (fact.get(*a), fact.get(*b));
            evaluate_binary(*op, va, vb)
        }
    }
}

fn evaluate_binary(op: BinOp, a: Value, b: Value) -> Value {
    use Value::{Const, Nac, Undef};

    // Division by a known zero is treated as unreachable, not NAC, and this
    // check must run before the general NAC/UNDEF propagation rules below.
    if matches!(op, BinOp::Div | BinOp::Rem) && matches!(b, Const(0)) {
        return Undef;
    }
    match (a, b) {
        (Nac, _) | (_, Nac) => Nac,
        (Undef, _) | (_, Undef) => Undef,
        (Const(x), Const(y)) => Const(apply_binary(op, x, y)),
    }
}

fn apply_binary(op: BinOp, x: i32, y: i32) -> i32 {
    match op {
        BinOp::Add => x.wrapping_add(y),
        BinOp::Sub => x.wrapping_sub(y),
        BinOp::Mul => x.wrapping_mul(y),
        // Division-by-zero is intercepted in `evaluate_binary` before reaching here.
        BinOp::Div => x.wrapping_div(y),
        BinOp::Rem => x.wrapping_rem(y),
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        // 32-bit two's complement shift semantics: only the low 5 bits of the shift amount matter.
        BinOp::Shl => x.wrapping_shl(y as u32),
        BinOp::Shr => x.wrapping_shr(y as u32),
        BinOp::UShr => ((x as u32).wrapping_shr(y as u32)) as i32,
        BinOp::Eq => i32::from(x == y),
        BinOp::Ne => i32::from(x != y),
        BinOp::Lt => i32::from(x < y),
        BinOp::Le => i32::from(x <= y),
        BinOp::Gt => i32::from(x > y),
        BinOp::Ge => i32::from(x >= y),
    }
}
