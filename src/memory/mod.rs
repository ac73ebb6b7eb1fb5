//! Symbolic memory of one execution state.
//!
//! [`Memory`] owns every [`MemoryRegion`] of the state, keyed by [`RegionKey`], together with the
//! address counter. All maps are persistent, so cloning a `Memory` at a fork is cheap and the two
//! copies never observe each other's writes.
use im::HashMap;
use log::debug;

pub mod collection;
pub mod id;
pub mod key;
pub mod region;
pub mod split;
pub mod updates;

pub use collection::SymbolicCollection;
pub use id::{CollectionId, CollectionKind, RegionKey, TypeTag};
pub use key::{Key, KeyRegion};
pub use region::{KeyedRegion, MemoryRegion, ScalarRegion};
pub use updates::{Adapter, UpdateNode};

use crate::address::AddressCounter;
use crate::expr::{Expr, ExprContext};
use crate::types::Sort;

#[derive(Debug, Clone)]
pub struct Memory {
    regions: HashMap<RegionKey, MemoryRegion>,
    counter: AddressCounter,
    size_sort: Sort,
}

impl Memory {
    /// Creates an empty memory whose lengths and indices have sort `size_sort`.
    pub fn new(size_sort: Sort) -> Self {
        assert!(size_sort.is_bv(), "Size sort must be a bit-vector, got {}", size_sort);
        Self {
            regions: HashMap::new(),
            counter: AddressCounter::new(),
            size_sort,
        }
    }

    pub fn size_sort(&self) -> Sort {
        self.size_sort
    }

    pub fn allocated_count(&self) -> u64 {
        self.counter.allocated_count()
    }

    pub fn input_count(&self) -> u64 {
        self.counter.input_count()
    }

    /// A reference to a fresh object allocated during execution.
    pub fn alloc(&mut self, ctx: &ExprContext) -> Expr {
        let address = self.counter.fresh_allocated();
        debug!("alloc {}", address);
        ctx.mk_concrete_ref(address)
    }

    /// A reference to a fresh concrete object of the initial heap.
    pub fn alloc_input(&mut self, ctx: &ExprContext) -> Expr {
        let address = self.counter.fresh_input();
        debug!("alloc input {}", address);
        ctx.mk_concrete_ref(address)
    }

    pub fn region(&self, key: &RegionKey) -> Option<&MemoryRegion> {
        self.regions.get(key)
    }

    pub fn regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.values()
    }

    fn region_mut(&mut self, key: &RegionKey) -> &mut MemoryRegion {
        self.regions
            .entry(key.clone())
            .or_insert_with(|| MemoryRegion::new(key.clone()))
    }

    /// Reads `r` in the region `key`. Keyed regions need an `index`, scalar regions take none.
    pub fn read(&self, ctx: &ExprContext, key: &RegionKey, r: &Expr, index: Option<&Expr>) -> Expr {
        match self.regions.get(key) {
            Some(region) => region.read(ctx, r, index),
            None => MemoryRegion::new(key.clone()).read(ctx, r, index),
        }
    }

    pub fn write(&mut self, ctx: &ExprContext, key: &RegionKey, r: &Expr, index: Option<&Expr>, value: &Expr, guard: &Expr) {
        if guard.is_false() {
            return;
        }
        self.region_mut(key).write(ctx, r, index, value, guard);
    }

    /// Range copy inside the keyed region `key`, see [`KeyedRegion::copy_range`].
    #[allow(clippy::too_many_arguments)]
    pub fn copy_range(
        &mut self,
        ctx: &ExprContext,
        key: &RegionKey,
        src: &Expr,
        dst: &Expr,
        src_from: &Expr,
        dst_from: &Expr,
        dst_to: &Expr,
        guard: &Expr,
    ) {
        if guard.is_false() {
            return;
        }
        self.region_mut(key)
            .keyed_mut()
            .copy_range(ctx, src, dst, src_from, dst_from, dst_to, guard);
    }

    /// Overlays the keyed region `key` of `src` onto `dst`, see [`KeyedRegion::merge`].
    pub fn merge(
        &mut self,
        ctx: &ExprContext,
        key: &RegionKey,
        src: &Expr,
        dst: &Expr,
        contains: Option<&RegionKey>,
        guard: &Expr,
    ) {
        if guard.is_false() {
            return;
        }
        let mask = contains.map(|k| {
            self.regions
                .get(k)
                .and_then(|r| r.as_keyed().cloned())
                .unwrap_or_else(|| KeyedRegion::new(k.clone()))
        });
        self.region_mut(key).keyed_mut().merge(ctx, src, dst, mask.as_ref(), guard);
    }
}

// Arrays
impl Memory {
    pub fn array_key(&self, array_type: &TypeTag, element: Sort) -> RegionKey {
        RegionKey::array(array_type, element, self.size_sort)
    }

    pub fn length_key(&self, array_type: &TypeTag) -> RegionKey {
        RegionKey::array_length(array_type, self.size_sort)
    }

    pub fn read_array(&self, ctx: &ExprContext, array_type: &TypeTag, element: Sort, r: &Expr, index: &Expr) -> Expr {
        self.read(ctx, &self.array_key(array_type, element), r, Some(index))
    }

    pub fn write_array(
        &mut self,
        ctx: &ExprContext,
        array_type: &TypeTag,
        r: &Expr,
        index: &Expr,
        value: &Expr,
        guard: &Expr,
    ) {
        let key = self.array_key(array_type, value.sort());
        self.write(ctx, &key, r, Some(index), value, guard);
    }

    /// Length of the array `r`, clamped to be non-negative.
    pub fn read_array_length(&self, ctx: &ExprContext, array_type: &TypeTag, r: &Expr) -> Expr {
        let raw = self.read(ctx, &self.length_key(array_type), r, None);
        ctx.mk_non_negative(&raw)
    }

    pub fn write_array_length(&mut self, ctx: &ExprContext, array_type: &TypeTag, r: &Expr, length: &Expr, guard: &Expr) {
        let key = self.length_key(array_type);
        self.write(ctx, &key, r, None, length, guard);
    }

    /// Allocates an array of `length` default elements.
    pub fn alloc_array(&mut self, ctx: &ExprContext, array_type: &TypeTag, length: &Expr) -> Expr {
        let r = self.alloc(ctx);
        self.write_array_length(ctx, array_type, &r, length, &ctx.mk_true());
        r
    }

    /// Allocates an array holding `contents`.
    pub fn alloc_array_initialized(
        &mut self,
        ctx: &ExprContext,
        array_type: &TypeTag,
        element: Sort,
        contents: &[Expr],
    ) -> Expr {
        let width = self.size_sort.width();
        let r = self.alloc_array(ctx, array_type, &ctx.mk_bv(contents.len() as i64, width));
        let key = self.array_key(array_type, element);
        let t = ctx.mk_true();
        for (i, value) in contents.iter().enumerate() {
            self.write(ctx, &key, &r, Some(&ctx.mk_bv(i as i64, width)), value, &t);
        }
        r
    }

    /// Copies `src[src_from..]` into `dst[dst_from..=dst_to]`.
    #[allow(clippy::too_many_arguments)]
    pub fn memcpy(
        &mut self,
        ctx: &ExprContext,
        array_type: &TypeTag,
        element: Sort,
        src: &Expr,
        dst: &Expr,
        src_from: &Expr,
        dst_from: &Expr,
        dst_to: &Expr,
        guard: &Expr,
    ) {
        let key = self.array_key(array_type, element);
        self.copy_range(ctx, &key, src, dst, src_from, dst_from, dst_to, guard);
    }
}
