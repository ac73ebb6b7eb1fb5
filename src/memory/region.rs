//! Memory regions: all collections of one [`RegionKey`].
//!
//! A region holds one symbolic collection per allocated object plus one shared collection for every
//! other reference (symbolic, input, null). Keyed regions (array contents, map entries, set
//! membership) store collections; scalar regions (array lengths, map sizes) store one expression per
//! allocated object.
use im::HashMap;
use log::debug;

use super::collection::SymbolicCollection;
use super::id::{CollectionId, CollectionKind, RegionKey};
use super::key::Key;
use super::split::{map_heap_ref, split_heap_ref, RefLeaf};
use super::updates::Adapter;
use crate::address::Address;
use crate::expr::{Expr, ExprContext};

/// Snapshot of the collection a reference possibility resolves to.
struct Resolved {
    collection: SymbolicCollection,
    owner: Option<Expr>,
    guard: Expr,
}

#[derive(Debug, Clone)]
pub struct KeyedRegion {
    key: RegionKey,
    allocated: HashMap<Address, SymbolicCollection>,
    input: Option<SymbolicCollection>,
}

impl KeyedRegion {
    pub fn new(key: RegionKey) -> Self {
        assert!(!key.kind.is_scalar(), "{} is not a keyed region", key);
        Self {
            key,
            allocated: HashMap::new(),
            input: None,
        }
    }

    pub fn key(&self) -> &RegionKey {
        &self.key
    }

    pub fn allocated(&self) -> impl Iterator<Item = (&Address, &SymbolicCollection)> {
        self.allocated.iter()
    }

    /// The shared input collection, if any symbolic write happened.
    pub fn input(&self) -> Option<&SymbolicCollection> {
        self.input.as_ref()
    }

    fn allocated_or_empty(&self, address: Address) -> SymbolicCollection {
        self.allocated.get(&address).cloned().unwrap_or_else(|| {
            SymbolicCollection::new(CollectionId::Allocated {
                region: self.key.clone(),
                address,
            })
        })
    }

    fn input_or_empty(&self) -> SymbolicCollection {
        self.input
            .clone()
            .unwrap_or_else(|| SymbolicCollection::new(CollectionId::Input { region: self.key.clone() }))
    }

    pub fn read(&self, ctx: &ExprContext, r: &Expr, index: &Expr) -> Expr {
        map_heap_ref(
            ctx,
            r,
            &mut |address: Address| {
                let key = Key::Single(index.clone());
                match self.allocated.get(&address) {
                    Some(c) => c.read(ctx, &key),
                    None => ctx.mk_default(self.key.sort),
                }
            },
            &mut |leaf: &Expr| {
                let key = Key::Pair(leaf.clone(), index.clone());
                match &self.input {
                    Some(c) => c.read(ctx, &key),
                    None => ctx.mk_read(&self.key, key.parts()),
                }
            },
        )
    }

    pub fn write(&mut self, ctx: &ExprContext, r: &Expr, index: &Expr, value: &Expr, guard: &Expr) {
        for part in split_heap_ref(ctx, r, guard) {
            match part.leaf {
                RefLeaf::Allocated(address) => {
                    let mut c = self.allocated_or_empty(address);
                    c.write(Key::Single(index.clone()), value.clone(), part.guard);
                    self.allocated.insert(address, c);
                }
                RefLeaf::Symbolic(leaf) => {
                    let mut c = self.input_or_empty();
                    c.write(Key::Pair(leaf, index.clone()), value.clone(), part.guard);
                    self.input = Some(c);
                }
            }
        }
    }

    /// Snapshots the collections `r` may resolve to.
    fn resolve(&self, ctx: &ExprContext, r: &Expr, guard: &Expr) -> Vec<Resolved> {
        split_heap_ref(ctx, r, guard)
            .into_iter()
            .map(|part| match part.leaf {
                RefLeaf::Allocated(address) => Resolved {
                    collection: self.allocated_or_empty(address),
                    owner: None,
                    guard: part.guard,
                },
                RefLeaf::Symbolic(leaf) => Resolved {
                    collection: self.input_or_empty(),
                    owner: Some(leaf),
                    guard: part.guard,
                },
            })
            .collect()
    }

    /// Applies one ranged update per destination possibility of `dst`.
    fn update_ranged(
        &mut self,
        ctx: &ExprContext,
        dst: &Expr,
        guard: &Expr,
        mut update: impl FnMut(&mut SymbolicCollection, Option<Expr>, &Expr),
    ) {
        for part in split_heap_ref(ctx, dst, guard) {
            match part.leaf {
                RefLeaf::Allocated(address) => {
                    let mut c = self.allocated_or_empty(address);
                    update(&mut c, None, &part.guard);
                    self.allocated.insert(address, c);
                }
                RefLeaf::Symbolic(leaf) => {
                    let mut c = self.input_or_empty();
                    update(&mut c, Some(leaf), &part.guard);
                    self.input = Some(c);
                }
            }
        }
    }

    /// `dst[k] = src[k - dst_from + src_from]` for every `k` in `[dst_from, dst_to]`.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_range(
        &mut self,
        ctx: &ExprContext,
        src: &Expr,
        dst: &Expr,
        src_from: &Expr,
        dst_from: &Expr,
        dst_to: &Expr,
        guard: &Expr,
    ) {
        debug!("{}: copy {}[{}..] to {}[{}..{}]", self.key, src, src_from, dst, dst_from, dst_to);
        // Sources are taken before any destination changes, so overlapping copies read old data.
        let sources = self.resolve(ctx, src, guard);
        self.update_ranged(ctx, dst, guard, |c, dst_owner, dst_guard| {
            for s in &sources {
                let adapter = Adapter::Copy {
                    src_owner: s.owner.clone(),
                    dst_owner: dst_owner.clone(),
                    src_from: src_from.clone(),
                    dst_from: dst_from.clone(),
                    dst_to: dst_to.clone(),
                };
                c.copy_range(s.collection.clone(), adapter, ctx.mk_and(dst_guard, &s.guard));
            }
        });
    }

    /// Overlays `src` onto `dst`.
    ///
    /// With `contains`, the keys taken from `src` are those marked in the `contains` region for
    /// `src` (map entries). Without it, every key `src` maps to `true` is set in `dst` (set union).
    pub fn merge(&mut self, ctx: &ExprContext, src: &Expr, dst: &Expr, contains: Option<&KeyedRegion>, guard: &Expr) {
        debug!("{}: merge {} into {}", self.key, src, dst);
        let sources = self.resolve(ctx, src, guard);
        let masks: Option<Vec<Resolved>> = contains.map(|set| set.resolve(ctx, src, guard));
        self.update_ranged(ctx, dst, guard, |c, dst_owner, dst_guard| {
            for (i, s) in sources.iter().enumerate() {
                let adapter = match &masks {
                    Some(masks) => Adapter::Merge {
                        src_owner: s.owner.clone(),
                        dst_owner: dst_owner.clone(),
                        contains: masks[i].collection.clone(),
                    },
                    None => Adapter::Union {
                        src_owner: s.owner.clone(),
                        dst_owner: dst_owner.clone(),
                    },
                };
                c.copy_range(s.collection.clone(), adapter, ctx.mk_and(dst_guard, &s.guard));
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct ScalarRegion {
    key: RegionKey,
    allocated: HashMap<Address, Expr>,
    input: Option<SymbolicCollection>,
}

impl ScalarRegion {
    pub fn new(key: RegionKey) -> Self {
        assert!(key.kind.is_scalar(), "{} is not a scalar region", key);
        Self {
            key,
            allocated: HashMap::new(),
            input: None,
        }
    }

    pub fn key(&self) -> &RegionKey {
        &self.key
    }

    pub fn allocated(&self) -> impl Iterator<Item = (&Address, &Expr)> {
        self.allocated.iter()
    }

    pub fn input(&self) -> Option<&SymbolicCollection> {
        self.input.as_ref()
    }

    pub fn read(&self, ctx: &ExprContext, r: &Expr) -> Expr {
        map_heap_ref(
            ctx,
            r,
            &mut |address: Address| match self.allocated.get(&address) {
                Some(v) => v.clone(),
                None => ctx.mk_default(self.key.sort),
            },
            &mut |leaf: &Expr| {
                let key = Key::Single(leaf.clone());
                match &self.input {
                    Some(c) => c.read(ctx, &key),
                    None => ctx.mk_read(&self.key, key.parts()),
                }
            },
        )
    }

    pub fn write(&mut self, ctx: &ExprContext, r: &Expr, value: &Expr, guard: &Expr) {
        assert_eq!(
            value.sort(),
            self.key.sort,
            "Sort mismatch: writing {} into {}",
            value,
            self.key
        );
        for part in split_heap_ref(ctx, r, guard) {
            match part.leaf {
                RefLeaf::Allocated(address) => {
                    let old = self.read(ctx, &ctx.mk_concrete_ref(address));
                    self.allocated.insert(address, ctx.mk_ite(&part.guard, value, &old));
                }
                RefLeaf::Symbolic(leaf) => {
                    let mut c = self
                        .input
                        .clone()
                        .unwrap_or_else(|| SymbolicCollection::new(CollectionId::Input { region: self.key.clone() }));
                    c.write(Key::Single(leaf), value.clone(), part.guard);
                    self.input = Some(c);
                }
            }
        }
    }
}

/// The collections of one region key, with the representation chosen by the kind of the key.
#[derive(Debug, Clone)]
pub enum MemoryRegion {
    Array(KeyedRegion),
    ArrayLength(ScalarRegion),
    MapEntries(KeyedRegion),
    MapSize(ScalarRegion),
    Set(KeyedRegion),
}

impl MemoryRegion {
    pub fn new(key: RegionKey) -> Self {
        match key.kind {
            CollectionKind::ArrayContents => MemoryRegion::Array(KeyedRegion::new(key)),
            CollectionKind::ArrayLength => MemoryRegion::ArrayLength(ScalarRegion::new(key)),
            CollectionKind::MapEntries => MemoryRegion::MapEntries(KeyedRegion::new(key)),
            CollectionKind::MapSize => MemoryRegion::MapSize(ScalarRegion::new(key)),
            CollectionKind::SetMembership => MemoryRegion::Set(KeyedRegion::new(key)),
        }
    }

    pub fn key(&self) -> &RegionKey {
        match self {
            MemoryRegion::Array(r) | MemoryRegion::MapEntries(r) | MemoryRegion::Set(r) => r.key(),
            MemoryRegion::ArrayLength(r) | MemoryRegion::MapSize(r) => r.key(),
        }
    }

    pub fn as_keyed(&self) -> Option<&KeyedRegion> {
        match self {
            MemoryRegion::Array(r) | MemoryRegion::MapEntries(r) | MemoryRegion::Set(r) => Some(r),
            MemoryRegion::ArrayLength(_) | MemoryRegion::MapSize(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarRegion> {
        match self {
            MemoryRegion::ArrayLength(r) | MemoryRegion::MapSize(r) => Some(r),
            MemoryRegion::Array(_) | MemoryRegion::MapEntries(_) | MemoryRegion::Set(_) => None,
        }
    }

    pub fn keyed_mut(&mut self) -> &mut KeyedRegion {
        match self {
            MemoryRegion::Array(r) | MemoryRegion::MapEntries(r) | MemoryRegion::Set(r) => r,
            MemoryRegion::ArrayLength(r) | MemoryRegion::MapSize(r) => panic!("{} is not a keyed region", r.key()),
        }
    }

    /// Reads the value of `r` at `index`. Scalar regions take no index.
    pub fn read(&self, ctx: &ExprContext, r: &Expr, index: Option<&Expr>) -> Expr {
        match (self, index) {
            (MemoryRegion::Array(c) | MemoryRegion::MapEntries(c) | MemoryRegion::Set(c), Some(i)) => c.read(ctx, r, i),
            (MemoryRegion::ArrayLength(c) | MemoryRegion::MapSize(c), None) => c.read(ctx, r),
            _ => panic!("Key shape mismatch for {}: index {:?}", self.key(), index),
        }
    }

    pub fn write(&mut self, ctx: &ExprContext, r: &Expr, index: Option<&Expr>, value: &Expr, guard: &Expr) {
        match (self, index) {
            (MemoryRegion::Array(c) | MemoryRegion::MapEntries(c) | MemoryRegion::Set(c), Some(i)) => {
                c.write(ctx, r, i, value, guard)
            }
            (MemoryRegion::ArrayLength(c) | MemoryRegion::MapSize(c), None) => c.write(ctx, r, value, guard),
            (region, _) => panic!("Key shape mismatch for {}: index {:?}", region.key(), index),
        }
    }
}
