use std::collections::BTreeSet;
use std::fmt::Debug;

use super::{Region, RegionComparison};

/// A finite or co-finite set of keys without any useful order structure (e.g. addresses).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum SetRegion<T: Ord> {
    /// Exactly these keys.
    Finite(BTreeSet<T>),
    /// Every key except these.
    Cofinite(BTreeSet<T>),
}

impl<T: Ord + Clone> SetRegion<T> {
    pub fn empty() -> Self {
        SetRegion::Finite(BTreeSet::new())
    }

    pub fn universe() -> Self {
        SetRegion::Cofinite(BTreeSet::new())
    }

    pub fn singleton(key: T) -> Self {
        SetRegion::Finite(BTreeSet::from([key]))
    }

    pub fn from_keys(keys: impl IntoIterator<Item = T>) -> Self {
        SetRegion::Finite(keys.into_iter().collect())
    }

    pub fn contains(&self, key: &T) -> bool {
        match self {
            SetRegion::Finite(s) => s.contains(key),
            SetRegion::Cofinite(s) => !s.contains(key),
        }
    }

    pub fn is_universe(&self) -> bool {
        matches!(self, SetRegion::Cofinite(s) if s.is_empty())
    }

    pub fn complement(&self) -> Self {
        match self {
            SetRegion::Finite(s) => SetRegion::Cofinite(s.clone()),
            SetRegion::Cofinite(s) => SetRegion::Finite(s.clone()),
        }
    }
}

impl<T: Ord + Clone + Debug> Region for SetRegion<T> {
    fn is_empty(&self) -> bool {
        matches!(self, SetRegion::Finite(s) if s.is_empty())
    }

    fn compare(&self, other: &Self) -> RegionComparison {
        if other.subtract(self).is_empty() {
            RegionComparison::Includes
        } else if self.intersect(other).is_empty() {
            RegionComparison::Disjoint
        } else {
            RegionComparison::Intersects
        }
    }

    fn intersect(&self, other: &Self) -> Self {
        use SetRegion::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a.intersection(b).cloned().collect()),
            (Finite(a), Cofinite(b)) | (Cofinite(b), Finite(a)) => Finite(a.difference(b).cloned().collect()),
            (Cofinite(a), Cofinite(b)) => Cofinite(a.union(b).cloned().collect()),
        }
    }

    fn subtract(&self, other: &Self) -> Self {
        self.intersect(&other.complement())
    }

    fn union(&self, other: &Self) -> Self {
        use SetRegion::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Finite(a.union(b).cloned().collect()),
            (Finite(a), Cofinite(b)) | (Cofinite(b), Finite(a)) => Cofinite(b.difference(a).cloned().collect()),
            (Cofinite(a), Cofinite(b)) => Cofinite(a.intersection(b).cloned().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_finite_operations() {
        let a = SetRegion::from_keys([1, 2, 3]);
        let b = SetRegion::from_keys([3, 4]);
        assert_eq!(a.intersect(&b), SetRegion::singleton(3));
        assert_eq!(a.subtract(&b), SetRegion::from_keys([1, 2]));
        assert_eq!(a.union(&b), SetRegion::from_keys([1, 2, 3, 4]));
        assert_eq!(a.compare(&b), RegionComparison::Intersects);
        assert_eq!(a.compare(&SetRegion::singleton(2)), RegionComparison::Includes);
        assert_eq!(a.compare(&SetRegion::singleton(9)), RegionComparison::Disjoint);
    }

    #[test]
    fn test_cofinite_operations() {
        let u = SetRegion::<i32>::universe();
        let a = SetRegion::from_keys([1, 2]);
        let not_a = u.subtract(&a);
        assert!(!not_a.contains(&1));
        assert!(not_a.contains(&5));
        assert_eq!(not_a.compare(&a), RegionComparison::Disjoint);
        assert_eq!(u.compare(&not_a), RegionComparison::Includes);
        assert_eq!(not_a.compare(&u), RegionComparison::Intersects);
        assert_eq!(not_a.union(&a), u);
        assert!(u.subtract(&u).is_empty());
        assert_eq!(u.intersect(&a), a);
    }
}
