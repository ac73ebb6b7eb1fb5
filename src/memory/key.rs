use std::fmt::{Display, Formatter};

use crate::address::Address;
use crate::expr::{Expr, ExprContext, ExprKind};
use crate::regions::{IntervalsRegion, Region, RegionComparison, SetRegion};
use crate::types::Sort;

/// Key of a symbolic collection.
///
/// Per-object collections of allocated objects are keyed by the index (or map key) alone.
/// The shared input collection is keyed by the owning reference and the index, and the scalar
/// input collections (lengths, sizes) by the reference alone.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Single(Expr),
    Pair(Expr, Expr),
}

impl Key {
    pub fn with_owner(owner: Option<&Expr>, index: Expr) -> Self {
        match owner {
            Some(owner) => Key::Pair(owner.clone(), index),
            None => Key::Single(index),
        }
    }

    pub fn parts(&self) -> Vec<Expr> {
        match self {
            Key::Single(k) => vec![k.clone()],
            Key::Pair(o, k) => vec![o.clone(), k.clone()],
        }
    }

    /// The index component, which determines the region of the key.
    pub fn index(&self) -> &Expr {
        match self {
            Key::Single(k) | Key::Pair(_, k) => k,
        }
    }

    pub fn owner(&self) -> Option<&Expr> {
        match self {
            Key::Single(_) => None,
            Key::Pair(o, _) => Some(o),
        }
    }

    pub fn region(&self) -> KeyRegion {
        KeyRegion::of(self.index())
    }

    /// Symbolic equality of two keys of the same shape.
    pub fn eq_expr(&self, ctx: &ExprContext, other: &Key) -> Expr {
        match (self, other) {
            (Key::Single(a), Key::Single(b)) => ctx.mk_eq(a, b),
            (Key::Pair(o1, k1), Key::Pair(o2, k2)) => ctx.mk_and(&ctx.mk_eq(k1, k2), &ctx.mk_eq(o1, o2)),
            _ => panic!("Keys {} and {} have different shapes", self, other),
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Single(k) => write!(f, "{}", k),
            Key::Pair(o, k) => write!(f, "{}.{}", o, k),
        }
    }
}

/// Region of collection keys: integer intervals for indices and bit-vector keys, address sets
/// for reference keys.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum KeyRegion {
    Indices(IntervalsRegion),
    Refs(SetRegion<Address>),
}

impl KeyRegion {
    pub fn universe(key_sort: Sort) -> Self {
        match key_sort {
            Sort::Address => KeyRegion::Refs(SetRegion::universe()),
            _ => KeyRegion::Indices(IntervalsRegion::universe()),
        }
    }

    /// The smallest region containing every value `key` may take.
    pub fn of(key: &Expr) -> Self {
        match key.kind() {
            ExprKind::Bv { value, .. } => KeyRegion::Indices(IntervalsRegion::singleton(*value)),
            ExprKind::Bool(b) => KeyRegion::Indices(IntervalsRegion::singleton(*b as i64)),
            ExprKind::ConcreteRef(a) => KeyRegion::Refs(SetRegion::singleton(*a)),
            _ => Self::universe(key.sort()),
        }
    }

    /// Indices between `from` and `to`, both inclusive.
    pub fn range(from: &Expr, to: &Expr) -> Self {
        let lo = from.as_bv().unwrap_or(i64::MIN);
        let hi = to.as_bv().unwrap_or(i64::MAX);
        KeyRegion::Indices(IntervalsRegion::closed(lo, hi))
    }
}

impl Region for KeyRegion {
    fn is_empty(&self) -> bool {
        match self {
            KeyRegion::Indices(r) => r.is_empty(),
            KeyRegion::Refs(r) => r.is_empty(),
        }
    }

    fn compare(&self, other: &Self) -> RegionComparison {
        match (self, other) {
            (KeyRegion::Indices(a), KeyRegion::Indices(b)) => a.compare(b),
            (KeyRegion::Refs(a), KeyRegion::Refs(b)) => a.compare(b),
            _ => panic!("Mixed key regions {:?} and {:?}", self, other),
        }
    }

    fn intersect(&self, other: &Self) -> Self {
        match (self, other) {
            (KeyRegion::Indices(a), KeyRegion::Indices(b)) => KeyRegion::Indices(a.intersect(b)),
            (KeyRegion::Refs(a), KeyRegion::Refs(b)) => KeyRegion::Refs(a.intersect(b)),
            _ => panic!("Mixed key regions {:?} and {:?}", self, other),
        }
    }

    fn subtract(&self, other: &Self) -> Self {
        match (self, other) {
            (KeyRegion::Indices(a), KeyRegion::Indices(b)) => KeyRegion::Indices(a.subtract(b)),
            (KeyRegion::Refs(a), KeyRegion::Refs(b)) => KeyRegion::Refs(a.subtract(b)),
            _ => panic!("Mixed key regions {:?} and {:?}", self, other),
        }
    }

    fn union(&self, other: &Self) -> Self {
        match (self, other) {
            (KeyRegion::Indices(a), KeyRegion::Indices(b)) => KeyRegion::Indices(a.union(b)),
            (KeyRegion::Refs(a), KeyRegion::Refs(b)) => KeyRegion::Refs(a.union(b)),
            _ => panic!("Mixed key regions {:?} and {:?}", self, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_key_regions() {
        let ctx = ExprContext::new();
        let i = ctx.mk_const("i", Sort::bv(32));
        assert_eq!(
            KeyRegion::of(&ctx.mk_bv(3, 32)),
            KeyRegion::Indices(IntervalsRegion::singleton(3))
        );
        assert_eq!(KeyRegion::of(&i), KeyRegion::universe(Sort::bv(32)));
        assert_eq!(
            KeyRegion::of(&ctx.mk_concrete_ref(Address::new(2))),
            KeyRegion::Refs(SetRegion::singleton(Address::new(2)))
        );
        assert_eq!(
            KeyRegion::range(&ctx.mk_bv(2, 32), &i),
            KeyRegion::Indices(IntervalsRegion::closed(2, i64::MAX))
        );
    }

    #[test]
    fn test_key_equality() {
        let ctx = ExprContext::new();
        let r = ctx.mk_symbolic_ref("r");
        let i = ctx.mk_bv(1, 32);
        let a = Key::Pair(r.clone(), i.clone());
        assert!(a.eq_expr(&ctx, &a.clone()).is_true());
        let b = Key::Pair(r, ctx.mk_bv(2, 32));
        assert!(a.eq_expr(&ctx, &b).is_false());
    }

    #[test]
    #[should_panic(expected = "Mixed key regions")]
    fn test_mixed_regions() {
        let a = KeyRegion::universe(Sort::Address);
        let b = KeyRegion::universe(Sort::bv(8));
        a.compare(&b);
    }
}
