//! Integration tests for memory, collections and model decoding.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use rayon::prelude::*;
use symheap::address::Address;
use symheap::collections::{ListType, MapType};
use symheap::config::{CoreConfig, DecodeMode};
use symheap::eval::evaluate;
use symheap::expr::{Expr, ExprContext};
use symheap::memory::{Memory, TypeTag};
use symheap::model::{Assignment, ModelDecoder};
use symheap::state::ExecutionState;
use symheap::types::{Sort, Value};

const INT: Sort = Sort::Bv(32);

fn bv(v: i64) -> Value {
    Value::bv(v, 32)
}

#[derive(Debug, Clone)]
enum MapOp {
    Put(i64, bool),
    Remove(i64, bool),
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        (0i64..5, any::<bool>()).prop_map(|(k, g)| MapOp::Put(k, g)),
        (0i64..5, any::<bool>()).prop_map(|(k, g)| MapOp::Remove(k, g)),
    ]
}

#[derive(Debug, Clone)]
enum ListOp {
    Insert(i64),
    Remove(i64),
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![(0i64..6).prop_map(ListOp::Insert), (0i64..6).prop_map(ListOp::Remove)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_list_shifts_at_symbolic_indices(init in 0i64..4, ops in prop::collection::vec(list_op(), 1..6)) {
        let ctx = ExprContext::new();
        let ty = ListType::new("List<int>", INT);
        let t = ctx.mk_true();
        let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
        let list = state.list_new(&ctx, &ty);
        let mut expected: Vec<i64> = (0..init).map(|k| 10 + k).collect();
        for v in &expected {
            state.list_add(&ctx, &ty, &list, &ctx.mk_bv(*v, 32), &t);
        }

        let mut model = Assignment::new();
        for (n, op) in ops.iter().enumerate() {
            let index = ctx.mk_const(&format!("i{}", n), INT);
            let len = expected.len() as i64;
            match *op {
                ListOp::Insert(raw) => {
                    let at = raw % (len + 1);
                    let value = 100 + n as i64;
                    model.set(&index, bv(at));
                    state.list_insert(&ctx, &ty, &list, &index, &ctx.mk_bv(value, 32), &t);
                    expected.insert(at as usize, value);
                }
                ListOp::Remove(raw) => {
                    if len == 0 {
                        continue;
                    }
                    let at = raw % len;
                    model.set(&index, bv(at));
                    state.list_remove(&ctx, &ty, &list, &index, &t);
                    expected.remove(at as usize);
                }
            }
        }

        prop_assert_eq!(evaluate(&state.list_size(&ctx, &ty, &list), &model), bv(expected.len() as i64));
        let got: Vec<Value> = (0..expected.len() as i64)
            .map(|k| evaluate(&state.list_get(&ctx, &ty, &list, &ctx.mk_bv(k, 32)), &model))
            .collect();
        prop_assert_eq!(got, expected.iter().map(|v| bv(*v)).collect::<Vec<_>>());
    }

    #[test]
    fn prop_read_after_write(writes in prop::collection::vec((0i64..4, 0usize..6, any::<bool>()), 1..12)) {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut memory = Memory::new(INT);
        let a = memory.alloc_array(&ctx, &ty, &ctx.mk_bv(4, 32));
        let values: Vec<Expr> = (0..6).map(|i| ctx.mk_const(&format!("v{}", i), INT)).collect();

        let mut expected: BTreeMap<i64, Expr> = BTreeMap::new();
        for &(index, value, guard) in &writes {
            let index_expr = ctx.mk_bv(index, 32);
            memory.write_array(&ctx, &ty, &a, &index_expr, &values[value], &ctx.mk_bool(guard));
            if guard {
                expected.insert(index, values[value].clone());
            }
            let read = memory.read_array(&ctx, &ty, INT, &a, &index_expr);
            let newest = expected.get(&index).cloned().unwrap_or_else(|| ctx.mk_bv(0, 32));
            prop_assert_eq!(read, newest);
        }
        for index in 0..4 {
            let read = memory.read_array(&ctx, &ty, INT, &a, &ctx.mk_bv(index, 32));
            let newest = expected.get(&index).cloned().unwrap_or_else(|| ctx.mk_bv(0, 32));
            prop_assert_eq!(read, newest);
        }
    }

    #[test]
    fn prop_map_size_counts_keys(ops in prop::collection::vec(map_op(), 1..16)) {
        let ctx = ExprContext::new();
        let ty = MapType::new("Map<int,int>", INT, INT);
        let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
        let m = state.map_new(&ctx, &ty);
        let model = Assignment::new();

        let mut keys = BTreeSet::new();
        for op in &ops {
            match *op {
                MapOp::Put(k, guard) => {
                    state.map_put(&ctx, &ty, &m, &ctx.mk_bv(k, 32), &ctx.mk_bv(k * 10, 32), &ctx.mk_bool(guard));
                    if guard {
                        keys.insert(k);
                    }
                }
                MapOp::Remove(k, guard) => {
                    state.map_remove(&ctx, &ty, &m, &ctx.mk_bv(k, 32), &ctx.mk_bool(guard));
                    if guard {
                        keys.remove(&k);
                    }
                }
            }
            let size = state.map_size(&ctx, &ty, &m);
            prop_assert_eq!(evaluate(&size, &model), bv(keys.len() as i64));
        }
        for k in 0..5 {
            let contains = state.map_contains(&ctx, &ty, &m, &ctx.mk_bv(k, 32));
            prop_assert_eq!(evaluate(&contains, &model), Value::Bool(keys.contains(&k)));
            if keys.contains(&k) {
                let value = state.map_get(&ctx, &ty, &m, &ctx.mk_bv(k, 32));
                prop_assert_eq!(evaluate(&value, &model), bv(k * 10));
            }
        }
    }
}

#[test]
fn test_guarded_write_under_both_branches() {
    let ctx = ExprContext::new();
    let ty = TypeTag::new("int[]");
    let mut memory = Memory::new(INT);
    let a = memory.alloc_array_initialized(&ctx, &ty, INT, &[ctx.mk_bv(1, 32), ctx.mk_bv(2, 32)]);
    let g = ctx.mk_const("g", Sort::Bool);
    let one = ctx.mk_bv(1, 32);
    memory.write_array(&ctx, &ty, &a, &one, &ctx.mk_bv(9, 32), &g);

    let read = memory.read_array(&ctx, &ty, INT, &a, &one);
    let mut model = Assignment::new();
    model.set(&g, Value::Bool(true));
    assert_eq!(evaluate(&read, &model), bv(9));
    model.set(&g, Value::Bool(false));
    assert_eq!(evaluate(&read, &model), bv(2));
}

#[test]
fn test_concurrent_interning() {
    let ctx = ExprContext::new();
    let built: Vec<Expr> = (0..256)
        .into_par_iter()
        .map(|i| {
            let x = ctx.mk_const("x", INT);
            let y = ctx.mk_const("y", INT);
            let sum = ctx.mk_bv_add(&x, &ctx.mk_bv(i % 4, 32));
            ctx.mk_bv_slt(&sum, &y)
        })
        .collect();
    for (i, e) in built.iter().enumerate() {
        assert_eq!(e.id(), built[i % 4].id());
    }
    let distinct: BTreeSet<u64> = built.iter().map(|e| e.id()).collect();
    assert_eq!(distinct.len(), 4);
}

#[test]
fn test_forked_states_in_parallel() {
    let ctx = ExprContext::new();
    let ty = ListType::new("List<int>", INT);
    let mut root = ExecutionState::new(&CoreConfig::default()).unwrap();
    let list = root.list_new(&ctx, &ty);
    let states: Vec<ExecutionState> = (0..8).map(|_| root.fork()).collect();

    let sizes: Vec<Expr> = states
        .into_par_iter()
        .enumerate()
        .map(|(i, mut s)| {
            for v in 0..i {
                s.list_add(&ctx, &ty, &list, &ctx.mk_bv(v as i64, 32), &ctx.mk_true());
            }
            s.list_size(&ctx, &ty, &list)
        })
        .collect();
    for (i, size) in sizes.iter().enumerate() {
        assert_eq!(*size, ctx.mk_bv(i as i64, 32));
    }
    assert_eq!(root.list_size(&ctx, &ty, &list), ctx.mk_bv(0, 32));
}

#[test]
fn test_decode_list_after_insert() {
    let ctx = ExprContext::new();
    let ty = ListType::new("List<int>", INT);
    let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
    let x = ctx.mk_const("x", INT);
    let list = state.list_new(&ctx, &ty);
    state.list_add(&ctx, &ty, &list, &x, &ctx.mk_true());
    state.list_add(&ctx, &ty, &list, &ctx.mk_bv(5, 32), &ctx.mk_true());
    state.list_insert(&ctx, &ty, &list, &ctx.mk_bv(0, 32), &ctx.mk_bv(9, 32), &ctx.mk_true());

    let mut model = Assignment::new();
    model.set(&x, bv(3));
    let config = CoreConfig {
        decode_mode: DecodeMode::Eager,
        ..Default::default()
    };
    let decoder = ModelDecoder::new(&ctx, state.memory(), &model, &config);
    let address = decoder.decode_address(&list);
    let key = state.memory().array_key(&ty.tag, INT);

    let contents: Vec<Value> = (0..3).map(|i| decoder.read(&key, address, Some(bv(i)))).collect();
    assert_eq!(contents, vec![bv(9), bv(3), bv(5)]);
    let lengths = decoder.region(&state.memory().length_key(&ty.tag));
    assert_eq!(lengths.get(address, None), Some(bv(3)));

    let elements = decoder.region(&key);
    assert_eq!(elements.get(address, Some(bv(0))), Some(bv(9)));
    assert_eq!(elements.get(address, Some(bv(2))), Some(bv(5)));
    assert!(elements.addresses().contains(&address));
}

#[test]
fn test_symbolic_copy_over_concrete_history() {
    let ctx = ExprContext::new();
    let ty = TypeTag::new("int[]");
    let mut memory = Memory::new(INT);
    let contents: Vec<Expr> = (0..4).map(|k| ctx.mk_bv(k + 1, 32)).collect();
    let a = memory.alloc_array_initialized(&ctx, &ty, INT, &contents);
    let from = ctx.mk_const("from", INT);
    let to = ctx.mk_const("to", INT);
    // a[from..=to] = a[0..], then a concrete write on top.
    memory.memcpy(&ctx, &ty, INT, &a, &a, &ctx.mk_bv(0, 32), &from, &to, &ctx.mk_true());
    memory.write_array(&ctx, &ty, &a, &ctx.mk_bv(3, 32), &ctx.mk_bv(9, 32), &ctx.mk_true());

    let mut model = Assignment::new();
    model.set(&from, bv(1));
    model.set(&to, bv(2));
    let got: Vec<Value> = (0..4)
        .map(|k| evaluate(&memory.read_array(&ctx, &ty, INT, &a, &ctx.mk_bv(k, 32)), &model))
        .collect();
    assert_eq!(got, vec![bv(1), bv(1), bv(2), bv(9)]);
}

#[test]
fn test_decode_symbolic_ref_in_allocated_range() {
    let ctx = ExprContext::new();
    let ty = ListType::new("List<int>", INT);
    let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
    let list = state.list_new(&ctx, &ty);
    state.list_add(&ctx, &ty, &list, &ctx.mk_bv(111, 32), &ctx.mk_true());
    let s = ctx.mk_symbolic_ref("s");
    state.list_set(&ctx, &ty, &s, &ctx.mk_bv(0, 32), &ctx.mk_bv(222, 32), &ctx.mk_true());

    let mut model = Assignment::new();
    model.set(&s, Value::Address(Address::new(1)));
    let decoder = ModelDecoder::new(&ctx, state.memory(), &model, &CoreConfig::default());
    let key = state.memory().array_key(&ty.tag, INT);
    let (decoded_list, decoded_s) = (decoder.decode_address(&list), decoder.decode_address(&s));
    assert_ne!(decoded_list, decoded_s);
    assert!(decoded_s.is_input());
    assert_eq!(decoder.read(&key, decoded_list, Some(bv(0))), bv(111));
    assert_eq!(decoder.read(&key, decoded_s, Some(bv(0))), bv(222));
    assert_eq!(decoder.value(&s), Value::Address(decoded_s));
}
