use std::fmt::{Display, Formatter};

use num_bigint::BigUint;

use super::{Region, RegionComparison};
use crate::utils::{bv_normalize, bv_signed_max, bv_signed_min};

/// A set of `i64` keys, stored as sorted, disjoint, non-adjacent closed intervals.
///
/// Used for array indices and for the value sets of the numeric constraint store, where a bound
/// is a single interval endpoint and a disequality is a one-point hole.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct IntervalsRegion {
    intervals: Vec<(i64, i64)>,
}

impl IntervalsRegion {
    pub fn empty() -> Self {
        Self { intervals: vec![] }
    }

    pub fn universe() -> Self {
        Self::closed(i64::MIN, i64::MAX)
    }

    /// All signed values representable in `width` bits.
    pub fn domain(width: u32) -> Self {
        Self::closed(bv_signed_min(width), bv_signed_max(width))
    }

    pub fn singleton(point: i64) -> Self {
        Self::closed(point, point)
    }

    /// The closed interval `[lo, hi]`, empty when `lo > hi`.
    pub fn closed(lo: i64, hi: i64) -> Self {
        if lo > hi {
            Self::empty()
        } else {
            Self {
                intervals: vec![(lo, hi)],
            }
        }
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = (i64, i64)>) -> Self {
        Self {
            intervals: normalize(intervals.into_iter().collect()),
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = i64>) -> Self {
        Self::from_intervals(points.into_iter().map(|p| (p, p)))
    }

    pub fn intervals(&self) -> &[(i64, i64)] {
        &self.intervals
    }

    pub fn contains(&self, point: i64) -> bool {
        // Intervals are sorted, so a binary search over the upper ends finds the candidate.
        let i = self.intervals.partition_point(|&(_, hi)| hi < point);
        i < self.intervals.len() && self.intervals[i].0 <= point
    }

    pub fn min(&self) -> Option<i64> {
        self.intervals.first().map(|&(lo, _)| lo)
    }

    pub fn max(&self) -> Option<i64> {
        self.intervals.last().map(|&(_, hi)| hi)
    }

    /// The only point of a one-point region.
    pub fn as_singleton(&self) -> Option<i64> {
        match self.intervals.as_slice() {
            [(lo, hi)] if lo == hi => Some(*lo),
            _ => None,
        }
    }

    /// Number of keys in the region.
    pub fn count(&self) -> BigUint {
        self.intervals
            .iter()
            .map(|&(lo, hi)| BigUint::from((hi as i128 - lo as i128 + 1) as u128))
            .sum()
    }

    pub fn complement(&self) -> Self {
        let mut gaps = Vec::with_capacity(self.intervals.len() + 1);
        let mut next = i64::MIN as i128;
        for &(lo, hi) in &self.intervals {
            if (lo as i128) > next {
                gaps.push((next as i64, lo - 1));
            }
            next = hi as i128 + 1;
        }
        if next <= i64::MAX as i128 {
            gaps.push((next as i64, i64::MAX));
        }
        Self { intervals: gaps }
    }

    /// The image of this region under `x -> x + offset` in `width`-bit wrapping arithmetic.
    ///
    /// # Panics
    ///
    /// Panics if the region is not contained in the `width`-bit domain.
    pub fn shift(&self, offset: i64, width: u32) -> Self {
        let lo = bv_signed_min(width) as i128;
        let hi = bv_signed_max(width) as i128;
        let mut shifted = Vec::with_capacity(self.intervals.len() + 1);
        for &(a, b) in &self.intervals {
            assert!(
                a as i128 >= lo && b as i128 <= hi,
                "Interval [{}, {}] is outside of the {}-bit domain",
                a,
                b,
                width
            );
            let len = b as i128 - a as i128;
            let start = bv_normalize(a as i128 + offset as i128, width) as i128;
            let end = start + len;
            if end <= hi {
                shifted.push((start as i64, end as i64));
            } else {
                shifted.push((start as i64, hi as i64));
                shifted.push((lo as i64, (lo + (end - hi - 1)) as i64));
            }
        }
        Self::from_intervals(shifted)
    }
}

fn normalize(mut intervals: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    intervals.retain(|(lo, hi)| lo <= hi);
    intervals.sort_unstable();
    let mut out: Vec<(i64, i64)> = Vec::with_capacity(intervals.len());
    for (lo, hi) in intervals {
        if let Some(last) = out.last_mut() {
            if lo as i128 <= last.1 as i128 + 1 {
                last.1 = last.1.max(hi);
                continue;
            }
        }
        out.push((lo, hi));
    }
    out
}

impl Region for IntervalsRegion {
    fn is_empty(&self) -> bool {
        self.intervals.is_empty()
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
        let (xs, ys) = (&self.intervals, &other.intervals);
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < xs.len() && j < ys.len() {
            let lo = xs[i].0.max(ys[j].0);
            let hi = xs[i].1.min(ys[j].1);
            if lo <= hi {
                out.push((lo, hi));
            }
            if xs[i].1 < ys[j].1 {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { intervals: out }
    }

    fn subtract(&self, other: &Self) -> Self {
        self.intersect(&other.complement())
    }

    fn union(&self, other: &Self) -> Self {
        Self::from_intervals(self.intervals.iter().chain(other.intervals.iter()).copied())
    }
}

impl Display for IntervalsRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, &(lo, hi)) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if lo == hi {
                write!(f, "{}", lo)?;
            } else {
                write!(f, "{}..{}", lo, hi)?;
            }
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_normalize_merges_adjacent() {
        let r = IntervalsRegion::from_intervals([(5, 7), (0, 2), (3, 4), (10, 9)]);
        assert_eq!(r.intervals(), &[(0, 7)]);
        assert_eq!(r.to_string(), "{0..7}");
    }

    #[test]
    fn test_basic_operations() {
        let a = IntervalsRegion::closed(0, 10);
        let b = IntervalsRegion::closed(5, 15);
        assert_eq!(a.intersect(&b), IntervalsRegion::closed(5, 10));
        assert_eq!(a.subtract(&b), IntervalsRegion::closed(0, 4));
        assert_eq!(a.union(&b), IntervalsRegion::closed(0, 15));
        assert_eq!(a.compare(&b), RegionComparison::Intersects);
        assert_eq!(a.compare(&IntervalsRegion::closed(2, 3)), RegionComparison::Includes);
        assert_eq!(a.compare(&IntervalsRegion::closed(11, 20)), RegionComparison::Disjoint);
        assert_eq!(a.compare(&a), RegionComparison::Includes);
        assert!(a.subtract(&a).is_empty());
    }

    #[test]
    fn test_holes() {
        let r = IntervalsRegion::closed(0, 10).subtract(&IntervalsRegion::singleton(5));
        assert_eq!(r.intervals(), &[(0, 4), (6, 10)]);
        assert!(!r.contains(5));
        assert!(r.contains(4));
        assert!(r.contains(10));
        assert!(!r.contains(11));
        assert_eq!(r.count(), BigUint::from(10u32));
    }

    #[test]
    fn test_universe() {
        let u = IntervalsRegion::universe();
        assert!(u.subtract(&u).is_empty());
        assert!(u.complement().is_empty());
        assert_eq!(IntervalsRegion::empty().complement(), u);
        assert_eq!(u.count(), BigUint::from(1u128 << 64));
        let a = IntervalsRegion::from_points([1, 3, 7]);
        assert_eq!(a.intersect(&u), a);
    }

    #[test]
    fn test_shift_without_wrap() {
        let r = IntervalsRegion::closed(0, 3);
        assert_eq!(r.shift(2, 8), IntervalsRegion::closed(2, 5));
        assert_eq!(r.shift(-2, 8), IntervalsRegion::closed(-2, 1));
    }

    #[test]
    fn test_shift_with_wrap() {
        // 4-bit domain is [-8, 7].
        let r = IntervalsRegion::closed(5, 7);
        assert_eq!(r.shift(2, 4), IntervalsRegion::from_intervals([(7, 7), (-8, -7)]));
        assert_eq!(IntervalsRegion::domain(4).shift(3, 4), IntervalsRegion::domain(4));
        let holed = IntervalsRegion::domain(4).subtract(&IntervalsRegion::singleton(7));
        assert_eq!(holed.shift(1, 4), IntervalsRegion::domain(4).subtract(&IntervalsRegion::singleton(-8)));
    }

    #[test]
    #[should_panic(expected = "outside of the 4-bit domain")]
    fn test_shift_outside_domain() {
        IntervalsRegion::closed(0, 100).shift(1, 4);
    }
}
