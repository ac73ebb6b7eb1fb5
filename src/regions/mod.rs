//! Region lattices and the region tree.
//!
//! A region is a (possibly infinite) set of keys. Collections use regions to over-approximate the
//! set of keys an update may touch: a write at a concrete index occupies a singleton, a write at a
//! symbolic index occupies the universe. Two updates with disjoint regions can never interfere.

pub mod intervals;
pub mod set;
pub mod tree;

pub use intervals::IntervalsRegion;
pub use set::SetRegion;
pub use tree::RegionTree;

use std::fmt::Debug;

/// Result of [`Region::compare`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RegionComparison {
    Disjoint,
    Intersects,
    Includes,
}

pub trait Region: Clone + Eq + Debug {
    fn is_empty(&self) -> bool;

    /// Compares `self` with `other`:
    /// - [`Includes`][RegionComparison::Includes] if `self` is a superset of `other`,
    /// - [`Disjoint`][RegionComparison::Disjoint] if they have no common keys,
    /// - [`Intersects`][RegionComparison::Intersects] otherwise.
    fn compare(&self, other: &Self) -> RegionComparison;

    fn intersect(&self, other: &Self) -> Self;

    fn subtract(&self, other: &Self) -> Self;

    fn union(&self, other: &Self) -> Self;
}
