//! Points-to sets: monotonic sets of abstract objects attached to a pointer.
//!
//! Favor the common case (a handful of objects per pointer) with an inline
//! vector, falling back to a hash set once a pointer has accumulated enough
//! aliases that linear scans start to show up.

use std::collections::HashSet;

use crate::obj::Object;

/// The inline-to-hashed promotion threshold. Chosen so the common
/// single-allocation-site pointer never pays for a `HashSet`.
const INLINE_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
enum Repr<O> {
    Inline(Vec<O>),
    Set(HashSet<O>),
}

/// A monotonic set of abstract objects.
///
/// Only ever grows: [`PointsToSet::add`] is the sole mutator, matching the
/// invariant that `pts(p)` never shrinks across a solver's lifetime.
#[derive(Debug, Clone)]
pub struct PointsToSet<O: Object> {
    repr: Repr<O>,
}

impl<O: Object> Default for PointsToSet<O> {
    fn default() -> Self {
        Self {
            repr: Repr::Inline(Vec::new()),
        }
    }
}

impl<O: Object> PointsToSet<O> {
    /// Creates an empty points-to set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a points-to set containing a single object.
    #[must_use]
    pub fn singleton(obj: O) -> Self {
        let mut set = Self::new();
        set.add(obj);
        set
    }

    /// Adds an object, returning `true` if it was not already present.
    pub fn add(&mut self, obj: O) -> bool {
        match &mut self.repr {
            Repr::Inline(v) => {
                if v.contains(&obj) {
                    return false;
                }
                if v.len() < INLINE_CAPACITY {
                    v.push(obj);
                    true
                } else {
                    let mut set: HashSet<O> = v.drain(..).collect();
                    let inserted = set.insert(obj);
                    self.repr = Repr::Set(set);
                    inserted
                }
            }
            Repr::Set(s) => s.insert(obj),
        }
    }

    /// Tests membership.
    #[must_use]
    pub fn contains(&self, obj: &O) -> bool {
        match &self.repr {
            Repr::Inline(v) => v.contains(obj),
            Repr::Set(s) => s.contains(obj),
        }
    }

    /// Whether the set has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.repr {
            Repr::Inline(v) => v.is_empty(),
            Repr::Set(s) => s.is_empty(),
        }
    }

    /// The number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Inline(v) => v.len(),
            Repr::Set(s) => s.len(),
        }
    }

    /// Iterates over the contained objects.
    pub fn iter(&self) -> impl Iterator<Item = &O> {
        match &self.repr {
            Repr::Inline(v) => Either::Left(v.iter()),
            Repr::Set(s) => Either::Right(s.iter()),
        }
    }

    /// Merges every object of `other` into `self`, returning `true` if
    /// `self` grew.
    pub fn union_with(&mut self, other: &Self) -> bool {
        let mut grew = false;
        for obj in other.iter() {
            grew |= self.add(obj.clone());
        }
        grew
    }

    /// The objects present in `other` but not in `self`: the delta that
    /// would need to be added to `self` to absorb `other`.
    ///
    /// This is the operation the solver's main loop uses to compute
    /// `δ = Δ \ pts(n)`, called as `pts(n).diff(&Δ)`.
    #[must_use]
    pub fn diff(&self, other: &Self) -> Self {
        let mut result = Self::new();
        for obj in other.iter() {
            if !self.contains(obj) {
                result.add(obj.clone());
            }
        }
        result
    }
}

/// A minimal `Either`-style iterator adapter so [`PointsToSet::iter`] can
/// return one concrete type regardless of the underlying representation,
/// without boxing.
enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<'a, L, R, O> Iterator for Either<L, R>
where
    L: Iterator<Item = &'a O>,
    R: Iterator<Item = &'a O>,
    O: 'a,
{
    type Item = &'a O;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Either::Left(l) => l.next(),
            Either::Right(r) => r.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct TestObj(u32, crate::ir::Type);

    impl Object for TestObj {
        fn class(&self) -> &crate::ir::Type {
            &self.1
        }
    }

    fn obj(id: u32) -> TestObj {
        TestObj(id, crate::ir::Type::new("T"))
    }

    #[test]
    fn add_is_idempotent() {
        let mut pts = PointsToSet::new();
        assert!(pts.add(obj(1)));
        assert!(!pts.add(obj(1)));
        assert_eq!(pts.len(), 1);
    }

    #[test]
    fn promotes_past_inline_capacity() {
        let mut pts = PointsToSet::new();
        for i in 0..20 {
            pts.add(obj(i));
        }
        assert_eq!(pts.len(), 20);
        for i in 0..20 {
            assert!(pts.contains(&obj(i)));
        }
    }

    #[test]
    fn diff_is_elements_in_other_not_self() {
        let mut a = PointsToSet::new();
        a.add(obj(1));
        a.add(obj(2));
        let mut b = PointsToSet::new();
        b.add(obj(2));
        b.add(obj(3));
        let delta = a.diff(&b);
        assert_eq!(delta.len(), 1);
        assert!(delta.contains(&obj(3)));
    }

    #[test]
    fn union_with_reports_growth() {
        let mut a = PointsToSet::singleton(obj(1));
        let b = PointsToSet::singleton(obj(1));
        assert!(!a.union_with(&b));
        let c = PointsToSet::singleton(obj(2));
        assert!(a.union_with(&c));
    }
}
