//! Read-only concrete views of the memory under a model.
//!
//! A [`ModelDecoder`] answers point reads (`region`, `address`, `index`) by evaluating the symbolic
//! read under the model. Whole regions are decoded into [`DecodedRegion`] snapshots on request: every
//! allocated object contributes its own finite set of keys, and all input objects share one
//! collection decoded from the interpretation of the base-read function. Snapshots are memoized per
//! region. In eager mode every region of the memory is decoded when the decoder is created.
//!
//! Addresses reported by the decoder are stable per decoder. A symbolic reference denotes an input
//! object, so whatever address the model picks for it is mapped to an input address: null stays
//! null, input addresses the memory already handed out stay as they are, and every other model
//! address gets a fresh input address below those. The first reference seen at a model address
//! stands for that object in later reads.
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use log::{debug, trace};

use super::Model;
use crate::address::Address;
use crate::config::{CoreConfig, DecodeMode};
use crate::eval::Evaluator;
use crate::expr::{Expr, ExprContext};
use crate::memory::split::{split_heap_ref, RefLeaf};
use crate::memory::{Adapter, Key, Memory, MemoryRegion, RegionKey, SymbolicCollection, UpdateNode};
use crate::types::{Sort, Value};

/// A decoded key: the owning input object for keys of the shared input collection, and the index.
type Candidate = (Option<Address>, Value);

/// Concrete snapshot of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRegion {
    key: RegionKey,
    entries: BTreeMap<(Address, Option<Value>), Value>,
}

impl DecodedRegion {
    pub fn key(&self) -> &RegionKey {
        &self.key
    }

    /// Value at `index` of the object `address`. Scalar regions take no index.
    pub fn get(&self, address: Address, index: Option<Value>) -> Option<Value> {
        self.entries.get(&(address, index)).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Address, Option<Value>, Value)> + '_ {
        self.entries.iter().map(|(&(a, i), &v)| (a, i, v))
    }

    /// Objects with at least one decoded entry.
    pub fn addresses(&self) -> BTreeSet<Address> {
        self.entries.keys().map(|(a, _)| *a).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decoded regions are immutable snapshots of a model.
    ///
    /// # Panics
    ///
    /// Always.
    pub fn write(&mut self, address: Address, index: Option<Value>, value: Value) {
        let index = index.map(|i| i.to_string()).unwrap_or_default();
        panic!("Decoded region {} is read-only: write {}[{}] <- {}", self.key, address, index, value);
    }
}

impl Display for DecodedRegion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}:", self.key)?;
        for ((a, i), v) in &self.entries {
            match i {
                Some(i) => writeln!(f, "  {}[{}] = {}", a, i, v)?,
                None => writeln!(f, "  {} = {}", a, v)?,
            }
        }
        Ok(())
    }
}

pub struct ModelDecoder<'a, M: Model + ?Sized> {
    ctx: &'a ExprContext,
    memory: &'a Memory,
    evaluator: Evaluator<'a, M>,
    range_limit: u64,
    /// Model address of a symbolic reference -> decoded input address.
    mapping: RefCell<HashMap<Address, Address>>,
    /// Decoded input address -> reference standing for it.
    representatives: RefCell<HashMap<Address, Expr>>,
    input_floor: i64,
    next_input: Cell<i64>,
    reads: RefCell<HashMap<(RegionKey, Address, Option<Value>), Value>>,
    decoded: RefCell<HashMap<RegionKey, Rc<DecodedRegion>>>,
}

impl<'a, M: Model + ?Sized> ModelDecoder<'a, M> {
    pub fn new(ctx: &'a ExprContext, memory: &'a Memory, model: &'a M, config: &CoreConfig) -> Self {
        let decoder = Self {
            ctx,
            memory,
            evaluator: Evaluator::new(model),
            range_limit: config.eager_range_limit,
            mapping: RefCell::new(HashMap::new()),
            representatives: RefCell::new(HashMap::new()),
            input_floor: Address::INITIAL_INPUT.get() - memory.input_count() as i64,
            next_input: Cell::new(Address::INITIAL_INPUT.get() - memory.input_count() as i64),
            reads: RefCell::new(HashMap::new()),
            decoded: RefCell::new(HashMap::new()),
        };
        if config.decode_mode == DecodeMode::Eager {
            let keys: Vec<RegionKey> = memory.regions().map(|r| r.key().clone()).collect();
            debug!("decode {} regions eagerly", keys.len());
            for key in &keys {
                decoder.region(key);
            }
        }
        decoder
    }

    /// Value of an arbitrary expression under the model. References are decoded.
    pub fn value(&self, e: &Expr) -> Value {
        if e.sort() == Sort::Address {
            return Value::Address(self.decode_address(e));
        }
        self.evaluator.eval(e)
    }

    /// The concrete object a reference denotes under the model.
    pub fn decode_address(&self, r: &Expr) -> Address {
        for possibility in split_heap_ref(self.ctx, r, &self.ctx.mk_true()) {
            if !self.evaluator.eval_bool(&possibility.guard) {
                continue;
            }
            return match possibility.leaf {
                RefLeaf::Allocated(a) => a,
                RefLeaf::Symbolic(leaf) => match self.evaluator.eval(&leaf) {
                    Value::Address(raw) => self.map_input(raw, &leaf),
                    v => panic!("Expected an address for {}, got {}", leaf, v),
                },
            };
        }
        panic!("No possibility of {} holds under the model", r)
    }

    /// Input objects the memory itself handed out keep their addresses.
    fn is_known_input(&self, raw: Address) -> bool {
        raw.is_input() && raw.get() > self.input_floor
    }

    /// Decoded address of the model address `raw` of the symbolic reference `leaf`.
    fn map_input(&self, raw: Address, leaf: &Expr) -> Address {
        if raw.is_null() || self.is_known_input(raw) {
            return raw;
        }
        if let Some(a) = self.mapping.borrow().get(&raw) {
            return *a;
        }
        let a = Address::new(self.next_input.get());
        self.next_input.set(a.get() - 1);
        debug!("map model address {} of {} to {}", raw, leaf, a);
        self.mapping.borrow_mut().insert(raw, a);
        self.representatives.borrow_mut().insert(a, leaf.clone());
        a
    }

    /// Decoded address of a model address seen only inside a function interpretation.
    fn lookup_input(&self, raw: Address) -> Option<Address> {
        if raw.is_null() || self.is_known_input(raw) {
            return Some(raw);
        }
        self.mapping.borrow().get(&raw).copied()
    }

    /// Expression standing for the decoded value `v` in symbolic reads.
    fn value_expr(&self, v: Value) -> Expr {
        if let Value::Address(a) = v {
            if let Some(r) = self.representatives.borrow().get(&a) {
                return r.clone();
            }
        }
        self.ctx.mk_value(v)
    }

    /// Number of regions decoded so far.
    pub fn decoded_count(&self) -> usize {
        self.decoded.borrow().len()
    }

    /// Concrete value at `index` of the object `address` in the region `key`.
    ///
    /// Lengths and sizes are clamped to be non-negative.
    pub fn read(&self, key: &RegionKey, address: Address, index: Option<Value>) -> Value {
        let memo = (key.clone(), address, index);
        if let Some(v) = self.reads.borrow().get(&memo) {
            return *v;
        }
        let r = self.value_expr(Value::Address(address));
        let index_expr = index.map(|v| self.value_expr(v));
        let e = self.memory.read(self.ctx, key, &r, index_expr.as_ref());
        let value = match self.value(&e) {
            Value::Bv { value, width } if key.kind.is_scalar() && value < 0 => Value::bv(0, width),
            v => v,
        };
        trace!("decode {}@{} = {}", key, address, value);
        self.reads.borrow_mut().insert(memo, value);
        value
    }

    /// Snapshot of the region `key`, decoded on first use.
    pub fn region(&self, key: &RegionKey) -> Rc<DecodedRegion> {
        if let Some(d) = self.decoded.borrow().get(key) {
            return d.clone();
        }
        let decoded = Rc::new(self.decode_region(key));
        debug!("decoded {} with {} entries", key, decoded.len());
        self.decoded.borrow_mut().insert(key.clone(), decoded.clone());
        decoded
    }

    fn decode_region(&self, key: &RegionKey) -> DecodedRegion {
        let mut entries = BTreeMap::new();
        let mut add = |decoder: &Self, address: Address, index: Option<Value>| {
            entries.insert((address, index), decoder.read(key, address, index));
        };

        match self.memory.region(key) {
            Some(MemoryRegion::Array(region) | MemoryRegion::MapEntries(region) | MemoryRegion::Set(region)) => {
                for (address, c) in region.allocated() {
                    for (_, index) in self.candidate_keys(c) {
                        add(self, *address, Some(index));
                    }
                }
                if let Some(c) = region.input() {
                    for (owner, index) in self.candidate_keys(c) {
                        if let Some(a) = owner.filter(|a| a.is_input()) {
                            add(self, a, Some(index));
                        }
                    }
                }
            }
            Some(MemoryRegion::ArrayLength(region) | MemoryRegion::MapSize(region)) => {
                for (address, _) in region.allocated() {
                    add(self, *address, None);
                }
                if let Some(c) = region.input() {
                    for (_, index) in self.candidate_keys(c) {
                        if let Some(a) = index.as_address().filter(|a| a.is_input()) {
                            add(self, a, None);
                        }
                    }
                }
            }
            None => {}
        }

        if let Some(f) = self.evaluator.model().function(key) {
            for (args, _) in f.entries() {
                let owner = match args.first() {
                    Some(Value::Address(raw)) => self.lookup_input(*raw).filter(|a| a.is_input()),
                    _ => None,
                };
                match (owner, args.as_slice()) {
                    (Some(a), [_]) if key.kind.is_scalar() => add(self, a, None),
                    (Some(a), [_, index]) if !key.kind.is_scalar() => match *index {
                        Value::Address(raw) => match self.lookup_input(raw) {
                            Some(i) => add(self, a, Some(Value::Address(i))),
                            None => trace!("skip function entry {:?} of {}", args, key),
                        },
                        index => add(self, a, Some(index)),
                    },
                    _ => trace!("skip function entry {:?} of {}", args, key),
                }
            }
        }

        DecodedRegion {
            key: key.clone(),
            entries,
        }
    }

    fn decode_key(&self, key: &Key) -> Candidate {
        let owner = key.owner().map(|o| self.decode_address(o));
        (owner, self.value(key.index()))
    }

    /// Keys that any update of `c` may have written, under the model.
    fn candidate_keys(&self, c: &SymbolicCollection) -> BTreeSet<Candidate> {
        let mut out = BTreeSet::new();
        for (_, node) in c.updates().iter() {
            match node.as_ref() {
                UpdateNode::Pinpoint { key, .. } => {
                    out.insert(self.decode_key(key));
                }
                UpdateNode::Ranged { source, adapter, .. } => match adapter {
                    Adapter::Copy {
                        src_owner,
                        dst_owner,
                        dst_from,
                        dst_to,
                        ..
                    } => {
                        // The source object must have its address before its function entries are decoded.
                        if let Some(o) = src_owner {
                            self.decode_address(o);
                        }
                        let owner = dst_owner.as_ref().map(|o| self.decode_address(o));
                        let (Some(lo), Some(hi)) = (self.evaluator.eval(dst_from).as_i64(), self.evaluator.eval(dst_to).as_i64()) else {
                            continue;
                        };
                        if lo > hi {
                            continue;
                        }
                        if (hi as i128 - lo as i128) >= self.range_limit as i128 {
                            debug!("copy range [{}, {}] exceeds the decoding limit", lo, hi);
                            continue;
                        }
                        let width = dst_from.sort().width();
                        out.extend((lo..=hi).map(|k| (owner, Value::bv(k, width))));
                    }
                    Adapter::Merge {
                        src_owner, dst_owner, ..
                    }
                    | Adapter::Union { src_owner, dst_owner } => {
                        let src = src_owner.as_ref().map(|o| self.decode_address(o));
                        let dst = dst_owner.as_ref().map(|o| self.decode_address(o));
                        out.extend(
                            self.candidate_keys(source)
                                .into_iter()
                                .filter(|(owner, _)| *owner == src)
                                .map(|(_, index)| (dst, index)),
                        );
                    }
                },
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::memory::TypeTag;
    use crate::model::{Assignment, FunctionInterpretation};
    use crate::types::Sort;

    const INT: Sort = Sort::Bv(32);

    fn bv(v: i64) -> Value {
        Value::bv(v, 32)
    }

    #[test]
    fn test_decode_allocated_array() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut memory = Memory::new(INT);
        let i = ctx.mk_const("i", INT);
        let a = memory.alloc_array(&ctx, &ty, &ctx.mk_bv(3, 32));
        memory.write_array(&ctx, &ty, &a, &i, &ctx.mk_bv(7, 32), &ctx.mk_true());
        memory.write_array(&ctx, &ty, &a, &ctx.mk_bv(0, 32), &ctx.mk_bv(1, 32), &ctx.mk_true());

        let mut model = Assignment::new();
        model.set(&i, bv(2));
        let decoder = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        let address = decoder.decode_address(&a);
        let key = memory.array_key(&ty, INT);
        assert_eq!(decoder.read(&key, address, Some(bv(2))), bv(7));
        assert_eq!(decoder.read(&key, address, Some(bv(1))), bv(0));

        let region = decoder.region(&key);
        assert_eq!(region.len(), 2);
        assert_eq!(region.get(address, Some(bv(0))), Some(bv(1)));
        assert_eq!(region.get(address, Some(bv(2))), Some(bv(7)));

        let lengths = decoder.region(&memory.length_key(&ty));
        assert_eq!(lengths.get(address, None), Some(bv(3)));
    }

    #[test]
    fn test_decode_input_objects() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let memory = Memory::new(INT);
        let key = memory.array_key(&ty, INT);
        let r = ctx.mk_symbolic_ref("r");

        let mut model = Assignment::new();
        model.set(&r, Value::Address(Address::new(-3)));
        let mut f = FunctionInterpretation::new(None);
        f.insert(vec![Value::Address(Address::new(-3)), bv(4)], bv(42));
        model.set_function(key.clone(), f);
        let mut lengths = FunctionInterpretation::new(None);
        lengths.insert(vec![Value::Address(Address::new(-3))], bv(-5));
        model.set_function(memory.length_key(&ty), lengths);

        let decoder = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        let address = decoder.decode_address(&r);
        assert!(address.is_input());
        assert_eq!(decoder.read(&key, address, Some(bv(4))), bv(42));
        assert_eq!(decoder.read(&key, address, Some(bv(5))), bv(0));
        assert_eq!(decoder.region(&key).get(address, Some(bv(4))), Some(bv(42)));
        // Negative lengths are clamped.
        assert_eq!(decoder.region(&memory.length_key(&ty)).get(address, None), Some(bv(0)));
    }

    #[test]
    fn test_decode_copy_range() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut memory = Memory::new(INT);
        let src = ctx.mk_symbolic_ref("src");
        let dst = memory.alloc_array(&ctx, &ty, &ctx.mk_bv(4, 32));
        let zero = ctx.mk_bv(0, 32);
        let to = ctx.mk_const("to", INT);
        memory.memcpy(&ctx, &ty, INT, &src, &dst, &zero, &zero, &to, &ctx.mk_true());

        let key = memory.array_key(&ty, INT);
        let mut model = Assignment::new();
        model.set(&src, Value::Address(Address::new(-1)));
        model.set(&to, bv(2));
        let mut f = FunctionInterpretation::new(Some(bv(5)));
        f.insert(vec![Value::Address(Address::new(-1)), bv(1)], bv(6));
        model.set_function(key.clone(), f);

        let decoder = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        let address = decoder.decode_address(&dst);
        let region = decoder.region(&key);
        assert_eq!(region.get(address, Some(bv(0))), Some(bv(5)));
        assert_eq!(region.get(address, Some(bv(1))), Some(bv(6)));
        assert_eq!(region.get(address, Some(bv(2))), Some(bv(5)));
        assert_eq!(region.get(address, Some(bv(3))), None);
        assert_eq!(decoder.read(&key, address, Some(bv(3))), bv(0));
        // The input entry comes from the function interpretation.
        assert_eq!(region.get(Address::new(-1), Some(bv(1))), Some(bv(6)));
    }

    #[test]
    fn test_symbolic_ref_at_allocated_model_address() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut memory = Memory::new(INT);
        let zero = ctx.mk_bv(0, 32);
        let a = memory.alloc_array(&ctx, &ty, &ctx.mk_bv(1, 32));
        memory.write_array(&ctx, &ty, &a, &zero, &ctx.mk_bv(111, 32), &ctx.mk_true());
        let s = ctx.mk_symbolic_ref("s");
        memory.write_array(&ctx, &ty, &s, &zero, &ctx.mk_bv(222, 32), &ctx.mk_true());

        let mut model = Assignment::new();
        model.set(&s, Value::Address(Address::new(1)));
        let decoder = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        let key = memory.array_key(&ty, INT);
        let decoded_a = decoder.decode_address(&a);
        let decoded_s = decoder.decode_address(&s);
        assert_eq!(decoded_a, Address::new(1));
        assert!(decoded_s.is_input());
        assert_eq!(decoder.decode_address(&s), decoded_s);
        assert_eq!(decoder.read(&key, decoded_a, Some(bv(0))), bv(111));
        assert_eq!(decoder.read(&key, decoded_s, Some(bv(0))), bv(222));

        let region = decoder.region(&key);
        assert_eq!(region.get(decoded_a, Some(bv(0))), Some(bv(111)));
        assert_eq!(region.get(decoded_s, Some(bv(0))), Some(bv(222)));
    }

    #[test]
    fn test_input_addresses_of_the_memory_are_kept() {
        let ctx = ExprContext::new();
        let mut memory = Memory::new(INT);
        let i1 = memory.alloc_input(&ctx);
        let s = ctx.mk_symbolic_ref("s");
        let t = ctx.mk_symbolic_ref("t");
        let mut model = Assignment::new();
        model.set(&s, Value::Address(Address::new(-1)));
        model.set(&t, Value::Address(Address::new(7)));
        let decoder = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        assert_eq!(decoder.decode_address(&i1), Address::new(-1));
        // `s` aliases the input object, `t` gets an address below every known input.
        assert_eq!(decoder.decode_address(&s), Address::new(-1));
        assert_eq!(decoder.decode_address(&t), Address::new(-2));
        assert_eq!(decoder.decode_address(&ctx.mk_null()), Address::NULL);
    }

    #[test]
    fn test_lazy_and_eager() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut memory = Memory::new(INT);
        memory.alloc_array(&ctx, &ty, &ctx.mk_bv(1, 32));
        let model = Assignment::new();

        let lazy = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        assert_eq!(lazy.decoded_count(), 0);
        let first = lazy.region(&memory.length_key(&ty));
        let second = lazy.region(&memory.length_key(&ty));
        assert!(Rc::ptr_eq(&first, &second));

        let config = CoreConfig {
            decode_mode: DecodeMode::Eager,
            ..Default::default()
        };
        let eager = ModelDecoder::new(&ctx, &memory, &model, &config);
        assert_eq!(eager.decoded_count(), memory.regions().count());
    }

    #[test]
    #[should_panic(expected = "is read-only")]
    fn test_decoded_region_is_read_only() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut memory = Memory::new(INT);
        let a = memory.alloc_array(&ctx, &ty, &ctx.mk_bv(1, 32));
        let model = Assignment::new();
        let decoder = ModelDecoder::new(&ctx, &memory, &model, &CoreConfig::default());
        let address = decoder.decode_address(&a);
        let mut region = (*decoder.region(&memory.length_key(&ty))).clone();
        region.write(address, None, bv(2));
    }
}
