use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use super::id::{CollectionId, RegionKey};
use super::key::{Key, KeyRegion};
use super::updates::{Adapter, UpdateNode};
use crate::expr::{Expr, ExprContext};
use crate::regions::RegionTree;
use crate::types::Sort;

pub type Updates = RegionTree<KeyRegion, Arc<UpdateNode>>;

/// A persistent key-value collection: a history of guarded updates over a base.
///
/// The base of an allocated collection is the default value of its sort. The base of the input
/// collection is an uninterpreted function of the key.
#[derive(Debug, Clone)]
pub struct SymbolicCollection {
    id: CollectionId,
    updates: Updates,
}

impl SymbolicCollection {
    pub fn new(id: CollectionId) -> Self {
        Self {
            id,
            updates: RegionTree::new(),
        }
    }

    pub fn id(&self) -> &CollectionId {
        &self.id
    }

    pub fn region_key(&self) -> &RegionKey {
        self.id.region()
    }

    /// Sort of the stored values.
    pub fn sort(&self) -> Sort {
        self.region_key().sort
    }

    pub fn updates(&self) -> &Updates {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    fn check_key(&self, key: &Key) {
        let region = self.region_key();
        let expected = region.key_sort;
        assert_eq!(
            key.index().sort(),
            expected,
            "Sort mismatch: key {} used with {}",
            key,
            self.id
        );
        let paired = self.id.is_input() && !region.kind.is_scalar();
        assert_eq!(
            key.owner().is_some(),
            paired,
            "Key {} does not match the shape of {}",
            key,
            self.id
        );
    }

    /// Value of the base at `key`, i.e. the value before any update.
    pub fn base_read(&self, ctx: &ExprContext, key: &Key) -> Expr {
        match &self.id {
            CollectionId::Allocated { .. } => ctx.mk_default(self.sort()),
            CollectionId::Input { region } => ctx.mk_read(region, key.parts()),
        }
    }

    pub fn read(&self, ctx: &ExprContext, key: &Key) -> Expr {
        self.check_key(key);
        let localized = self
            .updates
            .localize_with(&key.region(), &|u: &Arc<UpdateNode>| !u.includes_symbolically(ctx, key).is_false());

        let Some(last) = localized.last() else {
            return self.base_read(ctx, key);
        };
        if last.value.includes_symbolically(ctx, key).is_true() {
            return last.value.value(ctx, key);
        }

        // Split entries share update nodes. A node takes the position of its newest fragment, so
        // every update nested under that fragment is applied before it.
        let mut seen = HashSet::new();
        let mut updates: Vec<&Arc<UpdateNode>> = localized
            .iter()
            .into_iter()
            .rev()
            .map(|(_, update)| update)
            .filter(|update| seen.insert(Arc::as_ptr(*update)))
            .collect();
        updates.reverse();

        let mut result = self.base_read(ctx, key);
        for update in updates {
            let guard = update.includes_symbolically(ctx, key);
            result = ctx.mk_ite(&guard, &update.value(ctx, key), &result);
        }
        result
    }

    /// Writes `value` at `key`, taking effect only when `guard` holds.
    pub fn write(&mut self, key: Key, value: Expr, guard: Expr) {
        self.check_key(&key);
        assert_eq!(
            value.sort(),
            self.sort(),
            "Sort mismatch: writing {} into {}",
            value,
            self.id
        );
        if guard.is_false() {
            return;
        }
        debug!("{}: write {} <- {}", self.id, key, value);
        self.push(UpdateNode::Pinpoint { key, value, guard });
    }

    /// Redirects the keys selected by `adapter` to `source`, taking effect only when `guard` holds.
    pub fn copy_range(&mut self, source: SymbolicCollection, adapter: Adapter, guard: Expr) {
        assert_eq!(
            source.sort(),
            self.sort(),
            "Sort mismatch: copying {} into {}",
            source.id,
            self.id
        );
        if guard.is_false() {
            return;
        }
        debug!("{}: {} from {}", self.id, adapter, source.id);
        self.push(UpdateNode::Ranged { source, adapter, guard });
    }

    fn push(&mut self, node: UpdateNode) {
        let node = Arc::new(node);
        let region = node.region();
        let keep = |old: &Arc<UpdateNode>| !old.is_included_by_update_concretely(&node);
        self.updates = self.updates.write_with(region, node.clone(), &keep);
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::address::Address;
    use crate::expr::ExprKind;
    use crate::memory::TypeTag;

    fn allocated(size: Sort) -> SymbolicCollection {
        let region = RegionKey::array(&TypeTag::new("int[]"), size, size);
        SymbolicCollection::new(CollectionId::Allocated {
            region,
            address: Address::new(1),
        })
    }

    #[test]
    fn test_read_absent_is_default() {
        let ctx = ExprContext::new();
        let c = allocated(Sort::bv(32));
        assert_eq!(c.read(&ctx, &Key::Single(ctx.mk_bv(5, 32))), ctx.mk_bv(0, 32));
    }

    #[test]
    fn test_read_after_write() {
        let ctx = ExprContext::new();
        let mut c = allocated(Sort::bv(32));
        let i = ctx.mk_const("i", Sort::bv(32));
        let v = ctx.mk_const("v", Sort::bv(32));
        c.write(Key::Single(i.clone()), v.clone(), ctx.mk_true());
        assert_eq!(c.read(&ctx, &Key::Single(i.clone())), v);

        let before = c.read(&ctx, &Key::Single(ctx.mk_bv(3, 32)));
        let mut d = c.clone();
        d.write(Key::Single(ctx.mk_bv(3, 32)), ctx.mk_bv(7, 32), ctx.mk_false());
        assert_eq!(d.read(&ctx, &Key::Single(ctx.mk_bv(3, 32))), before);
    }

    #[test]
    fn test_concrete_writes_do_not_interfere() {
        let ctx = ExprContext::new();
        let mut c = allocated(Sort::bv(32));
        for i in 0..4 {
            c.write(Key::Single(ctx.mk_bv(i, 32)), ctx.mk_bv(10 * i, 32), ctx.mk_true());
        }
        for i in 0..4 {
            assert_eq!(c.read(&ctx, &Key::Single(ctx.mk_bv(i, 32))).as_bv(), Some(10 * i));
        }
        // Overwritten keys drop out of the history.
        c.write(Key::Single(ctx.mk_bv(2, 32)), ctx.mk_bv(99, 32), ctx.mk_true());
        assert_eq!(c.updates().size(), 4);
    }

    #[test]
    fn test_symbolic_read_builds_ite() {
        let ctx = ExprContext::new();
        let mut c = allocated(Sort::bv(32));
        c.write(Key::Single(ctx.mk_bv(0, 32)), ctx.mk_bv(42, 32), ctx.mk_true());
        let i = ctx.mk_const("i", Sort::bv(32));
        let r = c.read(&ctx, &Key::Single(i.clone()));
        let expected = ctx.mk_ite(&ctx.mk_eq(&ctx.mk_bv(0, 32), &i), &ctx.mk_bv(42, 32), &ctx.mk_bv(0, 32));
        assert_eq!(r, expected);
    }

    #[test]
    fn test_guarded_write() {
        let ctx = ExprContext::new();
        let mut c = allocated(Sort::bv(32));
        let g = ctx.mk_const("g", Sort::Bool);
        let k = Key::Single(ctx.mk_bv(1, 32));
        c.write(k.clone(), ctx.mk_bv(5, 32), g.clone());
        let r = c.read(&ctx, &k);
        assert_eq!(r, ctx.mk_ite(&g, &ctx.mk_bv(5, 32), &ctx.mk_bv(0, 32)));
    }

    #[test]
    fn test_input_base_read() {
        let ctx = ExprContext::new();
        let region = RegionKey::array(&TypeTag::new("int[]"), Sort::bv(32), Sort::bv(32));
        let c = SymbolicCollection::new(CollectionId::Input { region });
        let r = ctx.mk_symbolic_ref("a");
        let v = c.read(&ctx, &Key::Pair(r, ctx.mk_bv(0, 32)));
        assert!(matches!(v.kind(), ExprKind::Read { .. }));
    }

    #[test]
    #[should_panic(expected = "Sort mismatch")]
    fn test_write_wrong_sort() {
        let ctx = ExprContext::new();
        let mut c = allocated(Sort::bv(32));
        c.write(Key::Single(ctx.mk_bv(0, 32)), ctx.mk_true(), ctx.mk_true());
    }

    #[test]
    fn test_copy_range() {
        let ctx = ExprContext::new();
        let mut src = allocated(Sort::bv(32));
        for i in 0..3 {
            src.write(Key::Single(ctx.mk_bv(i, 32)), ctx.mk_bv(100 + i, 32), ctx.mk_true());
        }
        let mut dst = allocated(Sort::bv(32));
        let adapter = Adapter::Copy {
            src_owner: None,
            dst_owner: None,
            src_from: ctx.mk_bv(0, 32),
            dst_from: ctx.mk_bv(5, 32),
            dst_to: ctx.mk_bv(7, 32),
        };
        dst.copy_range(src, adapter, ctx.mk_true());
        assert_eq!(dst.read(&ctx, &Key::Single(ctx.mk_bv(6, 32))).as_bv(), Some(101));
        assert_eq!(dst.read(&ctx, &Key::Single(ctx.mk_bv(4, 32))).as_bv(), Some(0));
    }
}
