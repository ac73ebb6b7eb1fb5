//! Persistent region tree.
//!
//! A region tree maps regions to values. Sibling regions are pairwise disjoint, and every child
//! region is included in its parent. Writing `(region, value)` splits every older entry that
//! partially overlaps `region` into the part inside `region` and the part outside of it. The inside
//! parts become the children of the new entry, the outside parts stay where they were. Thus the
//! children of an entry hold the history that the entry shadows, and the newest writes are always at
//! the top level, in insertion order.
//!
//! Entries are kept in an [`im::Vector`] of reference-counted nodes, so cloning a tree is cheap and a
//! write copies only the spine it touches.
use std::fmt::Debug;
use std::sync::Arc;

use im::Vector;
use log::debug;

use super::{Region, RegionComparison};

#[derive(Debug)]
pub struct TreeEntry<R, V> {
    pub region: R,
    pub value: V,
    /// Older entries shadowed by this one, restricted to `region`.
    pub children: RegionTree<R, V>,
}

#[derive(Debug, Clone)]
pub struct RegionTree<R, V> {
    entries: Vector<Arc<TreeEntry<R, V>>>,
}

impl<R, V> Default for RegionTree<R, V> {
    fn default() -> Self {
        Self { entries: Vector::new() }
    }
}

impl<R, V> RegionTree<R, V>
where
    R: Region,
    V: Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Total number of entries, including shadowed ones.
    pub fn size(&self) -> usize {
        self.entries.iter().map(|e| 1 + e.children.size()).sum()
    }

    /// Top-level entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &TreeEntry<R, V>> {
        self.entries.iter().map(|e| e.as_ref())
    }

    /// The newest top-level entry.
    pub fn last(&self) -> Option<&TreeEntry<R, V>> {
        self.entries.last().map(|e| e.as_ref())
    }

    /// Splits the tree into the part inside `region` and the part outside of it.
    ///
    /// Entries whose value does not satisfy `keep` are replaced by their (filtered) children.
    pub fn split(&self, region: &R, keep: &dyn Fn(&V) -> bool) -> (Self, Self) {
        if region.is_empty() {
            return (Self::new(), self.clone());
        }

        if let Some(pos) = self.entries.iter().position(|e| &e.region == region) {
            let entry = &self.entries[pos];
            let mut included = Vector::new();
            push_filtered(&mut included, entry.clone(), keep);
            let mut disjoint = self.entries.clone();
            disjoint.remove(pos);
            return (Self { entries: included }, Self { entries: disjoint });
        }

        let mut included = Vector::new();
        let mut disjoint = Vector::new();
        for entry in self.entries.iter() {
            match region.compare(&entry.region) {
                RegionComparison::Includes => push_filtered(&mut included, entry.clone(), keep),
                RegionComparison::Disjoint => disjoint.push_back(entry.clone()),
                RegionComparison::Intersects => {
                    let (inside, outside) = entry.children.split(region, keep);
                    let inside = TreeEntry {
                        region: entry.region.intersect(region),
                        value: entry.value.clone(),
                        children: inside,
                    };
                    let outside = TreeEntry {
                        region: entry.region.subtract(region),
                        value: entry.value.clone(),
                        children: outside,
                    };
                    push_filtered(&mut included, Arc::new(inside), keep);
                    disjoint.push_back(Arc::new(outside));
                }
            }
        }
        (Self { entries: included }, Self { entries: disjoint })
    }

    /// Writes `value` into `region`, keeping every shadowed entry as history.
    pub fn write(&self, region: R, value: V) -> Self {
        self.write_with(region, value, &|_| true)
    }

    /// Writes `value` into `region`, dropping shadowed entries that do not satisfy `keep`.
    pub fn write_with(&self, region: R, value: V, keep: &dyn Fn(&V) -> bool) -> Self {
        if region.is_empty() {
            return self.clone();
        }
        let (included, disjoint) = self.split(&region, keep);
        debug!(
            "write {:?}: {} shadowed, {} untouched",
            region,
            included.len(),
            disjoint.len()
        );
        let mut entries = disjoint.entries;
        entries.push_back(Arc::new(TreeEntry {
            region,
            value,
            children: included,
        }));
        Self { entries }
    }

    /// The part of the tree that may affect keys in `region`.
    pub fn localize(&self, region: &R) -> Self {
        self.localize_with(region, &|_| true)
    }

    pub fn localize_with(&self, region: &R, keep: &dyn Fn(&V) -> bool) -> Self {
        self.split(region, keep).0
    }

    /// All values in left-most topological order: children before their parent, older siblings
    /// before newer ones. Folding this sequence from left to right replays the writes in an order
    /// consistent with their precedence.
    pub fn iter(&self) -> Vec<(&R, &V)> {
        let mut out = Vec::with_capacity(self.size());
        self.collect_into(&mut out);
        out
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<(&'a R, &'a V)>) {
        for entry in self.entries.iter() {
            entry.children.collect_into(out);
            out.push((&entry.region, &entry.value));
        }
    }

    /// Asserts that siblings are pairwise disjoint and children are included in their parents.
    pub fn check_invariant(&self) {
        let entries: Vec<_> = self.entries.iter().collect();
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                assert_eq!(
                    a.region.compare(&b.region),
                    RegionComparison::Disjoint,
                    "Sibling regions {:?} and {:?} overlap",
                    a.region,
                    b.region
                );
            }
            for child in a.children.entries() {
                assert_eq!(
                    a.region.compare(&child.region),
                    RegionComparison::Includes,
                    "Child region {:?} escapes its parent {:?}",
                    child.region,
                    a.region
                );
            }
            a.children.check_invariant();
        }
    }
}

fn push_filtered<R, V>(out: &mut Vector<Arc<TreeEntry<R, V>>>, entry: Arc<TreeEntry<R, V>>, keep: &dyn Fn(&V) -> bool) {
    if keep(&entry.value) {
        out.push_back(entry);
    } else {
        for child in entry.children.entries.iter() {
            push_filtered(out, child.clone(), keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::regions::{IntervalsRegion, SetRegion};

    fn values(tree: &RegionTree<IntervalsRegion, i32>) -> Vec<i32> {
        tree.entries().map(|e| e.value).collect()
    }

    fn sample() -> RegionTree<IntervalsRegion, i32> {
        RegionTree::new()
            .write(IntervalsRegion::closed(0, 10), 0)
            .write(IntervalsRegion::closed(2, 4), 1)
            .write(IntervalsRegion::closed(3, 5), 2)
    }

    #[test]
    fn test_write_splits() {
        let tree = sample();
        tree.check_invariant();
        let top: Vec<_> = tree.entries().map(|e| (e.region.clone(), e.value)).collect();
        assert_eq!(
            top,
            vec![
                (IntervalsRegion::from_intervals([(0, 1), (6, 10)]), 0),
                (IntervalsRegion::singleton(2), 1),
                (IntervalsRegion::closed(3, 5), 2),
            ]
        );
        assert_eq!(tree.size(), 7);
    }

    #[test]
    fn test_localize() {
        let tree = sample();
        assert_eq!(values(&tree.localize(&IntervalsRegion::singleton(0))), vec![0]);
        assert_eq!(values(&tree.localize(&IntervalsRegion::singleton(2))), vec![1]);
        assert_eq!(values(&tree.localize(&IntervalsRegion::singleton(3))), vec![2]);
        assert_eq!(tree.localize(&IntervalsRegion::closed(1, 6)).len(), 3);
        assert!(tree.localize(&IntervalsRegion::singleton(42)).is_empty());
    }

    #[test]
    fn test_iter_order() {
        let tree = sample();
        let local = tree.localize(&IntervalsRegion::singleton(3));
        let order: Vec<i32> = local.iter().into_iter().map(|(_, v)| *v).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_persistence() {
        let before = RegionTree::new().write(IntervalsRegion::closed(0, 10), 0);
        let after = before.write(IntervalsRegion::closed(0, 5), 1);
        assert_eq!(values(&before), vec![0]);
        assert_eq!(values(&after), vec![0, 1]);
    }

    #[test]
    fn test_universe_overwrites_everything() {
        let tree = sample().write(IntervalsRegion::universe(), 9);
        assert_eq!(values(&tree), vec![9]);
        assert_eq!(values(&tree.localize(&IntervalsRegion::singleton(3))), vec![9]);
        tree.check_invariant();
    }

    #[test]
    fn test_empty_write_is_noop() {
        let tree = sample().write(IntervalsRegion::empty(), 9);
        assert_eq!(tree.size(), sample().size());
        assert_eq!(values(&tree), vec![0, 1, 2]);
    }

    #[test]
    fn test_filtered_write_drops_history() {
        let tree = RegionTree::new()
            .write(SetRegion::singleton(1), 10)
            .write(SetRegion::singleton(2), 20)
            .write_with(SetRegion::from_keys([1, 2]), 30, &|v| *v != 10);
        let last = tree.last().map(|e| e.children.iter().len());
        // Only the entry valued 20 survives below the new one.
        assert_eq!(last, Some(1));
    }

    #[test]
    fn test_localize_with_filter() {
        let tree = sample();
        let local = tree.localize_with(&IntervalsRegion::singleton(3), &|v| *v != 2);
        assert_eq!(values(&local), vec![1]);
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn test_invariant_violation_is_detected() {
        let broken = RegionTree {
            entries: Vector::from(vec![
                Arc::new(TreeEntry {
                    region: IntervalsRegion::closed(0, 5),
                    value: 0,
                    children: RegionTree::new(),
                }),
                Arc::new(TreeEntry {
                    region: IntervalsRegion::closed(3, 8),
                    value: 1,
                    children: RegionTree::new(),
                }),
            ]),
        };
        broken.check_invariant();
    }
}
