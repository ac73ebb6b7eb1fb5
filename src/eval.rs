//! Evaluation of expressions under a model.
//!
//! Constants and function entries missing from the model complete to the default value of their
//! sort. Bit-vector arithmetic wraps at the width of the node, comparisons are signed.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use log::trace;

use crate::expr::{Expr, ExprKind};
use crate::model::Model;
use crate::types::Value;

/// Memoizing evaluator bound to one model.
pub struct Evaluator<'m, M: Model + ?Sized> {
    model: &'m M,
    cache: RefCell<HashMap<Expr, Value>>,
    hits: Cell<usize>,
}

impl<'m, M: Model + ?Sized> Evaluator<'m, M> {
    pub fn new(model: &'m M) -> Self {
        Self {
            model,
            cache: RefCell::new(HashMap::new()),
            hits: Cell::new(0),
        }
    }

    pub fn model(&self) -> &'m M {
        self.model
    }

    /// Number of memoized nodes.
    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }

    /// Number of evaluations answered from the memo.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    pub fn eval(&self, e: &Expr) -> Value {
        if let Some(v) = self.cache.borrow().get(e) {
            self.hits.set(self.hits.get() + 1);
            return *v;
        }
        let v = self.eval_node(e);
        trace!("eval {} = {}", e, v);
        debug_assert_eq!(v.sort(), e.sort());
        self.cache.borrow_mut().insert(e.clone(), v);
        v
    }

    pub fn eval_bool(&self, e: &Expr) -> bool {
        match self.eval(e) {
            Value::Bool(b) => b,
            v => panic!("Expected a boolean value for {}, got {}", e, v),
        }
    }

    fn eval_bv(&self, e: &Expr) -> i64 {
        match self.eval(e) {
            Value::Bv { value, .. } => value,
            v => panic!("Expected a bit-vector value for {}, got {}", e, v),
        }
    }

    fn eval_node(&self, e: &Expr) -> Value {
        let width = || e.sort().width();
        match e.kind() {
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Bv { value, width } => Value::Bv {
                value: *value,
                width: *width,
            },
            ExprKind::ConcreteRef(a) => Value::Address(*a),
            ExprKind::Const { name, sort, .. } => {
                self.model.constant(name, *sort).unwrap_or_else(|| sort.default_value())
            }
            ExprKind::Not(a) => Value::Bool(!self.eval_bool(a)),
            ExprKind::And(args) => Value::Bool(args.iter().all(|a| self.eval_bool(a))),
            ExprKind::Or(args) => Value::Bool(args.iter().any(|a| self.eval_bool(a))),
            ExprKind::Eq(a, b) => Value::Bool(self.eval(a) == self.eval(b)),
            ExprKind::Ite(c, t, f) => {
                if self.eval_bool(c) {
                    self.eval(t)
                } else {
                    self.eval(f)
                }
            }
            ExprKind::BvAdd(a, b) => Value::bv(self.eval_bv(a).wrapping_add(self.eval_bv(b)), width()),
            ExprKind::BvSub(a, b) => Value::bv(self.eval_bv(a).wrapping_sub(self.eval_bv(b)), width()),
            ExprKind::BvNeg(a) => Value::bv(self.eval_bv(a).wrapping_neg(), width()),
            ExprKind::BvSlt(a, b) => Value::Bool(self.eval_bv(a) < self.eval_bv(b)),
            ExprKind::BvSle(a, b) => Value::Bool(self.eval_bv(a) <= self.eval_bv(b)),
            ExprKind::Read { region, args } => {
                let args: Vec<Value> = args.iter().map(|a| self.eval(a)).collect();
                self.model
                    .function(region)
                    .and_then(|f| f.apply(&args))
                    .unwrap_or_else(|| region.sort.default_value())
            }
        }
    }
}

/// Evaluates `e` under `model` with a fresh memo.
pub fn evaluate<M: Model + ?Sized>(e: &Expr, model: &M) -> Value {
    Evaluator::new(model).eval(e)
}
