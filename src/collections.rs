//! Lists, maps and sets on top of the symbolic memory.
//!
//! A list is an array region plus a length region. A map is an entry region, a containment set
//! keyed by the map type and a size region. Every operation takes a guard and has no effect where
//! the guard is false.
use log::debug;

use crate::expr::{Expr, ExprContext};
use crate::memory::{RegionKey, TypeTag};
use crate::state::ExecutionState;
use crate::types::Sort;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ListType {
    pub tag: TypeTag,
    pub element: Sort,
}

impl ListType {
    pub fn new(name: &str, element: Sort) -> Self {
        Self {
            tag: TypeTag::new(name),
            element,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MapType {
    pub tag: TypeTag,
    pub key: Sort,
    pub value: Sort,
}

impl MapType {
    pub fn new(name: &str, key: Sort, value: Sort) -> Self {
        Self {
            tag: TypeTag::new(name),
            key,
            value,
        }
    }

    pub fn entries_key(&self) -> RegionKey {
        RegionKey::map_entries(&self.tag, self.key, self.value)
    }

    pub fn contains_key(&self) -> RegionKey {
        RegionKey::set(&self.tag, self.key)
    }

    pub fn size_key(&self, size_sort: Sort) -> RegionKey {
        RegionKey::map_size(&self.tag, size_sort)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SetType {
    pub tag: TypeTag,
    pub element: Sort,
}

impl SetType {
    pub fn new(name: &str, element: Sort) -> Self {
        Self {
            tag: TypeTag::new(name),
            element,
        }
    }

    pub fn key(&self) -> RegionKey {
        RegionKey::set(&self.tag, self.element)
    }
}

impl ExecutionState {
    fn size_const(&self, ctx: &ExprContext, n: i64) -> Expr {
        ctx.mk_bv(n, self.memory.size_sort().width())
    }
}

// Lists
impl ExecutionState {
    pub fn list_new(&mut self, ctx: &ExprContext, ty: &ListType) -> Expr {
        let zero = self.size_const(ctx, 0);
        self.memory.alloc_array(ctx, &ty.tag, &zero)
    }

    pub fn list_size(&self, ctx: &ExprContext, ty: &ListType, r: &Expr) -> Expr {
        self.memory.read_array_length(ctx, &ty.tag, r)
    }

    pub fn list_get(&self, ctx: &ExprContext, ty: &ListType, r: &Expr, index: &Expr) -> Expr {
        self.memory.read_array(ctx, &ty.tag, ty.element, r, index)
    }

    pub fn list_set(&mut self, ctx: &ExprContext, ty: &ListType, r: &Expr, index: &Expr, value: &Expr, guard: &Expr) {
        self.memory.write_array(ctx, &ty.tag, r, index, value, guard);
    }

    /// Appends `value` at the current length.
    pub fn list_add(&mut self, ctx: &ExprContext, ty: &ListType, r: &Expr, value: &Expr, guard: &Expr) {
        let size = self.list_size(ctx, ty, r);
        self.memory.write_array(ctx, &ty.tag, r, &size, value, guard);
        let new_size = ctx.mk_bv_add(&size, &self.size_const(ctx, 1));
        self.memory.write_array_length(ctx, &ty.tag, r, &new_size, guard);
    }

    /// Shifts `[index, size)` one slot to the right, then stores `value` at `index`.
    pub fn list_insert(&mut self, ctx: &ExprContext, ty: &ListType, r: &Expr, index: &Expr, value: &Expr, guard: &Expr) {
        debug!("{}: insert {} at {}[{}]", ty.tag, value, r, index);
        let size = self.list_size(ctx, ty, r);
        let one = self.size_const(ctx, 1);
        let dst_from = ctx.mk_bv_add(index, &one);
        self.memory
            .memcpy(ctx, &ty.tag, ty.element, r, r, index, &dst_from, &size, guard);
        self.memory.write_array(ctx, &ty.tag, r, index, value, guard);
        self.memory
            .write_array_length(ctx, &ty.tag, r, &ctx.mk_bv_add(&size, &one), guard);
    }

    /// Shifts `[index + 1, size)` one slot to the left and shrinks the list.
    pub fn list_remove(&mut self, ctx: &ExprContext, ty: &ListType, r: &Expr, index: &Expr, guard: &Expr) {
        debug!("{}: remove {}[{}]", ty.tag, r, index);
        let size = self.list_size(ctx, ty, r);
        let one = self.size_const(ctx, 1);
        let src_from = ctx.mk_bv_add(index, &one);
        let dst_to = ctx.mk_bv_sub(&size, &self.size_const(ctx, 2));
        self.memory
            .memcpy(ctx, &ty.tag, ty.element, r, r, &src_from, index, &dst_to, guard);
        self.memory
            .write_array_length(ctx, &ty.tag, r, &ctx.mk_bv_sub(&size, &one), guard);
    }

    /// Copies `length` elements of `src` starting at `src_from` to `dst` starting at `dst_from`.
    #[allow(clippy::too_many_arguments)]
    pub fn list_copy_range(
        &mut self,
        ctx: &ExprContext,
        ty: &ListType,
        src: &Expr,
        dst: &Expr,
        src_from: &Expr,
        dst_from: &Expr,
        length: &Expr,
        guard: &Expr,
    ) {
        let dst_to = ctx.mk_bv_sub(&ctx.mk_bv_add(dst_from, length), &self.size_const(ctx, 1));
        self.memory
            .memcpy(ctx, &ty.tag, ty.element, src, dst, src_from, dst_from, &dst_to, guard);
    }
}

// Maps
impl ExecutionState {
    pub fn map_new(&mut self, ctx: &ExprContext, ty: &MapType) -> Expr {
        let r = self.memory.alloc(ctx);
        let key = ty.size_key(self.memory.size_sort());
        let zero = self.size_const(ctx, 0);
        self.memory.write(ctx, &key, &r, None, &zero, &ctx.mk_true());
        r
    }

    pub fn map_get(&self, ctx: &ExprContext, ty: &MapType, r: &Expr, key: &Expr) -> Expr {
        self.memory.read(ctx, &ty.entries_key(), r, Some(key))
    }

    pub fn map_contains(&self, ctx: &ExprContext, ty: &MapType, r: &Expr, key: &Expr) -> Expr {
        self.memory.read(ctx, &ty.contains_key(), r, Some(key))
    }

    /// Size of the map `r`, clamped to be non-negative.
    pub fn map_size(&self, ctx: &ExprContext, ty: &MapType, r: &Expr) -> Expr {
        let raw = self.memory.read(ctx, &ty.size_key(self.memory.size_sort()), r, None);
        ctx.mk_non_negative(&raw)
    }

    fn write_map_size(&mut self, ctx: &ExprContext, ty: &MapType, r: &Expr, size: &Expr, guard: &Expr) {
        let key = ty.size_key(self.memory.size_sort());
        self.memory.write(ctx, &key, r, None, size, guard);
    }

    /// Stores `value` at `key`. The size grows only if `key` was absent.
    pub fn map_put(&mut self, ctx: &ExprContext, ty: &MapType, r: &Expr, key: &Expr, value: &Expr, guard: &Expr) {
        let contained = self.map_contains(ctx, ty, r, key);
        let size = self.map_size(ctx, ty, r);
        self.memory.write(ctx, &ty.entries_key(), r, Some(key), value, guard);
        self.memory
            .write(ctx, &ty.contains_key(), r, Some(key), &ctx.mk_true(), guard);
        let grows = ctx.mk_and(guard, &ctx.mk_not(&contained));
        let new_size = ctx.mk_bv_add(&size, &self.size_const(ctx, 1));
        self.write_map_size(ctx, ty, r, &new_size, &grows);
    }

    /// Drops `key`. The size shrinks only if `key` was present.
    pub fn map_remove(&mut self, ctx: &ExprContext, ty: &MapType, r: &Expr, key: &Expr, guard: &Expr) {
        let contained = self.map_contains(ctx, ty, r, key);
        let size = self.map_size(ctx, ty, r);
        self.memory
            .write(ctx, &ty.contains_key(), r, Some(key), &ctx.mk_false(), guard);
        let shrinks = ctx.mk_and(guard, &contained);
        let new_size = ctx.mk_bv_sub(&size, &self.size_const(ctx, 1));
        self.write_map_size(ctx, ty, r, &new_size, &shrinks);
    }

    /// Puts every entry of `src` into `dst`.
    ///
    /// The overlap of the key sets is not tracked, so the new size is a fresh constant bounded by
    /// `max(|src|, |dst|) <= size <= |src| + |dst|`. The upper bound is dropped when the sum
    /// overflows.
    pub fn map_merge(&mut self, ctx: &ExprContext, ty: &MapType, src: &Expr, dst: &Expr, guard: &Expr) {
        if guard.is_false() {
            return;
        }
        debug!("{}: merge {} into {}", ty.tag, src, dst);
        let src_size = self.map_size(ctx, ty, src);
        let dst_size = self.map_size(ctx, ty, dst);
        let contains = ty.contains_key();
        self.memory
            .merge(ctx, &ty.entries_key(), src, dst, Some(&contains), guard);
        self.memory.merge(ctx, &contains, src, dst, None, guard);

        let size = ctx.mk_fresh_const("size", self.memory.size_sort());
        let lower = ctx.mk_bv_sle(&ctx.mk_bv_max(&src_size, &dst_size), &size);
        let sum = ctx.mk_bv_add(&src_size, &dst_size);
        let zero = self.size_const(ctx, 0);
        let upper = ctx.mk_or(&ctx.mk_bv_slt(&sum, &zero), &ctx.mk_bv_sle(&size, &sum));
        // The sum bounds the size from above: shared keys make the merged map smaller than the sum.
        self.assert(ctx, &ctx.mk_implies(guard, &ctx.mk_and(&lower, &upper)));
        self.write_map_size(ctx, ty, dst, &size, guard);
    }
}

// Sets
impl ExecutionState {
    pub fn set_new(&mut self, ctx: &ExprContext) -> Expr {
        self.memory.alloc(ctx)
    }

    pub fn set_contains(&self, ctx: &ExprContext, ty: &SetType, r: &Expr, element: &Expr) -> Expr {
        self.memory.read(ctx, &ty.key(), r, Some(element))
    }

    pub fn set_add(&mut self, ctx: &ExprContext, ty: &SetType, r: &Expr, element: &Expr, guard: &Expr) {
        self.memory
            .write(ctx, &ty.key(), r, Some(element), &ctx.mk_true(), guard);
    }

    pub fn set_remove(&mut self, ctx: &ExprContext, ty: &SetType, r: &Expr, element: &Expr, guard: &Expr) {
        self.memory
            .write(ctx, &ty.key(), r, Some(element), &ctx.mk_false(), guard);
    }

    /// Adds every element of `src` to `dst`.
    pub fn set_union(&mut self, ctx: &ExprContext, ty: &SetType, src: &Expr, dst: &Expr, guard: &Expr) {
        self.memory.merge(ctx, &ty.key(), src, dst, None, guard);
    }
}
