//! Hash-consed expressions.
//!
//! All expressions are created through an [`ExprContext`], which keeps one shared unique table for
//! the whole analysis run. Structurally equal expressions are physically equal, so [`Expr`]
//! compares and hashes by identity. The table is append-only and safe to use from several worker
//! threads at once: each bucket is guarded by its shard lock, and a lookup-or-insert is a single
//! operation on that bucket.
//!
//! The `mk_*` constructors simplify locally (constant folding, trivial `ite`s, boolean absorption),
//! so that reads and writes over concrete data do not build up symbolic noise.
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::trace;

use crate::address::{Address, HeapRef};
use crate::memory::RegionKey;
use crate::types::{Sort, Value};
use crate::utils::{bv_normalize, pairing2, pairing3, pairing_all, zigzag, MyHash};

/// Identity of a named constant.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ExprKind {
    Bool(bool),
    Bv { value: i64, width: u32 },
    ConcreteRef(Address),
    /// Named constant. Constants of sort `Address` are symbolic heap references.
    Const { symbol: SymbolId, name: Arc<str>, sort: Sort },
    Not(Expr),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Eq(Expr, Expr),
    Ite(Expr, Expr, Expr),
    BvAdd(Expr, Expr),
    BvSub(Expr, Expr),
    BvNeg(Expr),
    BvSlt(Expr, Expr),
    BvSle(Expr, Expr),
    /// Base read of the input collection of a region: an uninterpreted function application.
    Read { region: RegionKey, args: Vec<Expr> },
}

impl ExprKind {
    fn tag(&self) -> u64 {
        match self {
            ExprKind::Bool(_) => 1,
            ExprKind::Bv { .. } => 2,
            ExprKind::ConcreteRef(_) => 3,
            ExprKind::Const { .. } => 4,
            ExprKind::Not(_) => 5,
            ExprKind::And(_) => 6,
            ExprKind::Or(_) => 7,
            ExprKind::Eq(..) => 8,
            ExprKind::Ite(..) => 9,
            ExprKind::BvAdd(..) => 10,
            ExprKind::BvSub(..) => 11,
            ExprKind::BvNeg(_) => 12,
            ExprKind::BvSlt(..) => 13,
            ExprKind::BvSle(..) => 14,
            ExprKind::Read { .. } => 15,
        }
    }

    /// Direct children of this node.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            ExprKind::Bool(_) | ExprKind::Bv { .. } | ExprKind::ConcreteRef(_) | ExprKind::Const { .. } => vec![],
            ExprKind::Not(a) | ExprKind::BvNeg(a) => vec![a],
            ExprKind::And(args) | ExprKind::Or(args) | ExprKind::Read { args, .. } => args.iter().collect(),
            ExprKind::Eq(a, b)
            | ExprKind::BvAdd(a, b)
            | ExprKind::BvSub(a, b)
            | ExprKind::BvSlt(a, b)
            | ExprKind::BvSle(a, b) => vec![a, b],
            ExprKind::Ite(c, t, e) => vec![c, t, e],
        }
    }
}

impl MyHash for ExprKind {
    fn hash(&self) -> u64 {
        let tag = self.tag();
        match self {
            ExprKind::Bool(b) => pairing2(tag, *b as u64),
            ExprKind::Bv { value, width } => pairing3(tag, zigzag(*value), *width as u64),
            ExprKind::ConcreteRef(a) => pairing2(tag, zigzag(a.get())),
            ExprKind::Const { symbol, .. } => pairing2(tag, symbol.get() as u64),
            ExprKind::Read { region, args } => {
                let mut hasher = DefaultHasher::new();
                region.hash(&mut hasher);
                pairing_all(pairing2(tag, hasher.finish()), args.iter().map(|a| a.id()))
            }
            _ => pairing_all(tag, self.children().into_iter().map(|a| a.id())),
        }
    }
}

#[derive(Debug)]
struct ExprNode {
    id: u64,
    kind: ExprKind,
    sort: Sort,
}

/// A handle to an interned expression node.
#[derive(Clone)]
pub struct Expr(Arc<ExprNode>);

impl Expr {
    /// Unique id of this node within its context.
    pub fn id(&self) -> u64 {
        self.0.id
    }
    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }
    pub fn sort(&self) -> Sort {
        self.0.sort
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind(), ExprKind::Bool(true))
    }
    pub fn is_false(&self) -> bool {
        matches!(self.kind(), ExprKind::Bool(false))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind() {
            ExprKind::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bv(&self) -> Option<i64> {
        match self.kind() {
            ExprKind::Bv { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// The heap reference this leaf denotes, if it is a reference leaf.
    pub fn as_heap_ref(&self) -> Option<HeapRef> {
        match self.kind() {
            ExprKind::ConcreteRef(a) => Some(HeapRef::Concrete(*a)),
            ExprKind::Const {
                symbol,
                sort: Sort::Address,
                ..
            } => Some(HeapRef::Symbolic(*symbol)),
            _ => None,
        }
    }

    /// Concrete value of a constant leaf.
    pub fn as_value(&self) -> Option<Value> {
        match self.kind() {
            ExprKind::Bool(b) => Some(Value::Bool(*b)),
            ExprKind::Bv { value, width } => Some(Value::Bv {
                value: *value,
                width: *width,
            }),
            ExprKind::ConcreteRef(a) => Some(Value::Address(*a)),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        self.as_value().is_some()
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn list(f: &mut Formatter<'_>, op: &str, args: &[&Expr]) -> std::fmt::Result {
            write!(f, "({}", op)?;
            for a in args {
                write!(f, " {}", a)?;
            }
            write!(f, ")")
        }
        match self.kind() {
            ExprKind::Bool(b) => write!(f, "{}", b),
            ExprKind::Bv { value, .. } => write!(f, "{}", value),
            ExprKind::ConcreteRef(a) => write!(f, "{}", a),
            ExprKind::Const { name, .. } => write!(f, "{}", name),
            ExprKind::Not(_) => list(f, "not", &self.kind().children()),
            ExprKind::And(_) => list(f, "and", &self.kind().children()),
            ExprKind::Or(_) => list(f, "or", &self.kind().children()),
            ExprKind::Eq(..) => list(f, "=", &self.kind().children()),
            ExprKind::Ite(..) => list(f, "ite", &self.kind().children()),
            ExprKind::BvAdd(..) => list(f, "bvadd", &self.kind().children()),
            ExprKind::BvSub(..) => list(f, "bvsub", &self.kind().children()),
            ExprKind::BvNeg(_) => list(f, "bvneg", &self.kind().children()),
            ExprKind::BvSlt(..) => list(f, "bvslt", &self.kind().children()),
            ExprKind::BvSle(..) => list(f, "bvsle", &self.kind().children()),
            ExprKind::Read { region, args } => {
                write!(f, "{}[", region)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The expression manager: owns the unique table and the symbol table.
pub struct ExprContext {
    table: DashMap<u64, Vec<Expr>>,
    symbols: DashMap<Arc<str>, (SymbolId, Sort)>,
    next_id: AtomicU64,
    next_symbol: AtomicU32,
    next_fresh: AtomicU64,
    true_expr: Expr,
    false_expr: Expr,
}

impl Default for ExprContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ExprContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExprContext")
            .field("nodes", &self.len())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

impl ExprContext {
    pub fn new() -> Self {
        let table = DashMap::new();
        let next_id = AtomicU64::new(0);
        let mk_bool = |b: bool| {
            let kind = ExprKind::Bool(b);
            let e = Expr(Arc::new(ExprNode {
                id: next_id.fetch_add(1, Ordering::Relaxed),
                kind: kind.clone(),
                sort: Sort::Bool,
            }));
            table.insert(MyHash::hash(&kind), vec![e.clone()]);
            e
        };
        let false_expr = mk_bool(false);
        let true_expr = mk_bool(true);
        Self {
            table,
            symbols: DashMap::new(),
            next_id,
            next_symbol: AtomicU32::new(0),
            next_fresh: AtomicU64::new(0),
            true_expr,
            false_expr,
        }
    }

    /// Number of distinct nodes created so far.
    pub fn len(&self) -> usize {
        self.table.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn intern(&self, kind: ExprKind, sort: Sort) -> Expr {
        let hash = MyHash::hash(&kind);
        let mut bucket = self.table.entry(hash).or_default();
        if let Some(e) = bucket.iter().find(|e| e.kind() == &kind) {
            return e.clone();
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("intern #{} : {}", id, sort);
        let e = Expr(Arc::new(ExprNode { id, kind, sort }));
        bucket.push(e.clone());
        e
    }

    fn check_same_sort(a: &Expr, b: &Expr) {
        assert_eq!(a.sort(), b.sort(), "Sort mismatch between {} and {}", a, b);
    }

    fn check_sort(a: &Expr, sort: Sort) {
        assert_eq!(a.sort(), sort, "Sort mismatch: {} should be {}", a, sort);
    }

    fn check_bv(a: &Expr) -> u32 {
        assert!(a.sort().is_bv(), "Expected a bit-vector, got {} : {}", a, a.sort());
        a.sort().width()
    }
}

// Leaves
impl ExprContext {
    pub fn mk_true(&self) -> Expr {
        self.true_expr.clone()
    }
    pub fn mk_false(&self) -> Expr {
        self.false_expr.clone()
    }
    pub fn mk_bool(&self, b: bool) -> Expr {
        if b {
            self.mk_true()
        } else {
            self.mk_false()
        }
    }

    /// Bit-vector constant, wrapped into `width` bits.
    pub fn mk_bv(&self, value: i64, width: u32) -> Expr {
        let sort = Sort::bv(width);
        let value = bv_normalize(value as i128, width);
        self.intern(ExprKind::Bv { value, width }, sort)
    }

    pub fn mk_value(&self, value: Value) -> Expr {
        match value {
            Value::Bool(b) => self.mk_bool(b),
            Value::Bv { value, width } => self.mk_bv(value, width),
            Value::Address(a) => self.mk_concrete_ref(a),
        }
    }

    pub fn mk_default(&self, sort: Sort) -> Expr {
        self.mk_value(sort.default_value())
    }

    pub fn mk_concrete_ref(&self, address: Address) -> Expr {
        self.intern(ExprKind::ConcreteRef(address), Sort::Address)
    }

    pub fn mk_null(&self) -> Expr {
        self.mk_concrete_ref(Address::NULL)
    }

    /// Named constant. The same name always denotes the same symbol.
    ///
    /// # Panics
    ///
    /// Panics if the name was already declared with another sort.
    pub fn mk_const(&self, name: &str, sort: Sort) -> Expr {
        let (symbol, declared) = *self
            .symbols
            .entry(Arc::from(name))
            .or_insert_with(|| (SymbolId(self.next_symbol.fetch_add(1, Ordering::Relaxed)), sort));
        assert_eq!(declared, sort, "Symbol {} is already declared with sort {}", name, declared);
        self.intern(
            ExprKind::Const {
                symbol,
                name: Arc::from(name),
                sort,
            },
            sort,
        )
    }

    /// Constant with a name that was never used before.
    pub fn mk_fresh_const(&self, prefix: &str, sort: Sort) -> Expr {
        let n = self.next_fresh.fetch_add(1, Ordering::Relaxed);
        self.mk_const(&format!("{}!{}", prefix, n), sort)
    }

    pub fn mk_symbolic_ref(&self, name: &str) -> Expr {
        self.mk_const(name, Sort::Address)
    }

    pub fn mk_fresh_ref(&self, prefix: &str) -> Expr {
        self.mk_fresh_const(prefix, Sort::Address)
    }

    /// Base read of the input collection of `region`.
    pub fn mk_read(&self, region: &RegionKey, args: Vec<Expr>) -> Expr {
        let sort = region.sort;
        self.intern(
            ExprKind::Read {
                region: region.clone(),
                args,
            },
            sort,
        )
    }
}

// Boolean connectives
impl ExprContext {
    pub fn mk_not(&self, a: &Expr) -> Expr {
        Self::check_sort(a, Sort::Bool);
        match a.kind() {
            ExprKind::Bool(b) => self.mk_bool(!b),
            ExprKind::Not(x) => x.clone(),
            _ => self.intern(ExprKind::Not(a.clone()), Sort::Bool),
        }
    }

    pub fn mk_and(&self, a: &Expr, b: &Expr) -> Expr {
        self.mk_and_many([a.clone(), b.clone()])
    }

    pub fn mk_or(&self, a: &Expr, b: &Expr) -> Expr {
        self.mk_or_many([a.clone(), b.clone()])
    }

    pub fn mk_and_many(&self, args: impl IntoIterator<Item = Expr>) -> Expr {
        self.mk_junction(args, true)
    }

    pub fn mk_or_many(&self, args: impl IntoIterator<Item = Expr>) -> Expr {
        self.mk_junction(args, false)
    }

    /// `and` when `conjunction`, `or` otherwise.
    fn mk_junction(&self, args: impl IntoIterator<Item = Expr>, conjunction: bool) -> Expr {
        let unit = conjunction;
        let mut flat: Vec<Expr> = Vec::new();
        let mut seen: HashSet<Expr> = HashSet::new();
        let mut stack: Vec<Expr> = args.into_iter().collect();
        stack.reverse();
        while let Some(a) = stack.pop() {
            Self::check_sort(&a, Sort::Bool);
            match (a.kind(), conjunction) {
                (ExprKind::Bool(b), _) if *b == unit => continue,
                (ExprKind::Bool(_), _) => return self.mk_bool(!unit),
                (ExprKind::And(xs), true) | (ExprKind::Or(xs), false) => {
                    stack.extend(xs.iter().rev().cloned());
                    continue;
                }
                _ => {}
            }
            if seen.insert(a.clone()) {
                flat.push(a);
            }
        }
        for a in &flat {
            if let ExprKind::Not(x) = a.kind() {
                if seen.contains(x) {
                    return self.mk_bool(!unit);
                }
            }
        }
        match flat.len() {
            0 => self.mk_bool(unit),
            1 => flat.swap_remove(0),
            _ if conjunction => self.intern(ExprKind::And(flat), Sort::Bool),
            _ => self.intern(ExprKind::Or(flat), Sort::Bool),
        }
    }

    pub fn mk_implies(&self, a: &Expr, b: &Expr) -> Expr {
        self.mk_or(&self.mk_not(a), b)
    }

    pub fn mk_eq(&self, a: &Expr, b: &Expr) -> Expr {
        Self::check_same_sort(a, b);
        if a == b {
            return self.mk_true();
        }
        if let (Some(x), Some(y)) = (a.as_value(), b.as_value()) {
            return self.mk_bool(x == y);
        }
        match a.sort() {
            Sort::Bool => {
                if let Some(x) = a.as_bool() {
                    return if x { b.clone() } else { self.mk_not(b) };
                }
                if let Some(y) = b.as_bool() {
                    return if y { a.clone() } else { self.mk_not(a) };
                }
            }
            Sort::Address => {
                if let (Some(x), Some(y)) = (a.as_heap_ref(), b.as_heap_ref()) {
                    if x.trivially_distinct(&y) {
                        return self.mk_false();
                    }
                }
                if let ExprKind::Ite(c, t, e) = a.kind() {
                    return self.mk_ite(c, &self.mk_eq(t, b), &self.mk_eq(e, b));
                }
                if let ExprKind::Ite(c, t, e) = b.kind() {
                    return self.mk_ite(c, &self.mk_eq(a, t), &self.mk_eq(a, e));
                }
            }
            Sort::Bv(_) => {}
        }
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        self.intern(ExprKind::Eq(a.clone(), b.clone()), Sort::Bool)
    }

    pub fn mk_ite(&self, c: &Expr, t: &Expr, e: &Expr) -> Expr {
        Self::check_sort(c, Sort::Bool);
        Self::check_same_sort(t, e);
        if let Some(b) = c.as_bool() {
            return if b { t.clone() } else { e.clone() };
        }
        if t == e {
            return t.clone();
        }
        if let ExprKind::Not(x) = c.kind() {
            return self.mk_ite(x, e, t);
        }
        if t.sort() == Sort::Bool {
            match (t.as_bool(), e.as_bool()) {
                (Some(true), Some(false)) => return c.clone(),
                (Some(false), Some(true)) => return self.mk_not(c),
                (Some(true), None) => return self.mk_or(c, e),
                (Some(false), None) => return self.mk_and(&self.mk_not(c), e),
                (None, Some(false)) => return self.mk_and(c, t),
                (None, Some(true)) => return self.mk_or(&self.mk_not(c), t),
                _ => {}
            }
        }
        // ite(c, ite(c, x, _), y) = ite(c, x, y)
        if let ExprKind::Ite(c2, x, _) = t.kind() {
            if c2 == c {
                return self.mk_ite(c, x, e);
            }
        }
        if let ExprKind::Ite(c2, _, y) = e.kind() {
            if c2 == c {
                return self.mk_ite(c, t, y);
            }
        }
        self.intern(ExprKind::Ite(c.clone(), t.clone(), e.clone()), t.sort())
    }
}

// Bit-vector arithmetic and comparisons
impl ExprContext {
    pub fn mk_bv_add(&self, a: &Expr, b: &Expr) -> Expr {
        Self::check_same_sort(a, b);
        let width = Self::check_bv(a);
        match (a.as_bv(), b.as_bv()) {
            (Some(x), Some(y)) => return self.mk_bv(x.wrapping_add(y), width),
            (Some(0), None) => return b.clone(),
            (None, Some(0)) => return a.clone(),
            (Some(_), None) => return self.mk_bv_add(b, a),
            _ => {}
        }
        if let (ExprKind::BvAdd(x, c1), Some(c2)) = (a.kind(), b.as_bv()) {
            if let Some(c1) = c1.as_bv() {
                return self.mk_bv_add(x, &self.mk_bv(c1.wrapping_add(c2), width));
            }
        }
        self.intern(ExprKind::BvAdd(a.clone(), b.clone()), a.sort())
    }

    pub fn mk_bv_sub(&self, a: &Expr, b: &Expr) -> Expr {
        Self::check_same_sort(a, b);
        let width = Self::check_bv(a);
        if a == b {
            return self.mk_bv(0, width);
        }
        match (a.as_bv(), b.as_bv()) {
            (Some(x), Some(y)) => self.mk_bv(x.wrapping_sub(y), width),
            (None, Some(y)) => self.mk_bv_add(a, &self.mk_bv(y.wrapping_neg(), width)),
            (Some(0), None) => self.mk_bv_neg(b),
            _ => self.intern(ExprKind::BvSub(a.clone(), b.clone()), a.sort()),
        }
    }

    pub fn mk_bv_neg(&self, a: &Expr) -> Expr {
        let width = Self::check_bv(a);
        match a.kind() {
            ExprKind::Bv { value, .. } => self.mk_bv(value.wrapping_neg(), width),
            ExprKind::BvNeg(x) => x.clone(),
            _ => self.intern(ExprKind::BvNeg(a.clone()), a.sort()),
        }
    }

    /// Signed `a < b`.
    pub fn mk_bv_slt(&self, a: &Expr, b: &Expr) -> Expr {
        Self::check_same_sort(a, b);
        Self::check_bv(a);
        if a == b {
            return self.mk_false();
        }
        match (a.as_bv(), b.as_bv()) {
            (Some(x), Some(y)) => self.mk_bool(x < y),
            _ => self.intern(ExprKind::BvSlt(a.clone(), b.clone()), Sort::Bool),
        }
    }

    /// Signed `a <= b`.
    pub fn mk_bv_sle(&self, a: &Expr, b: &Expr) -> Expr {
        Self::check_same_sort(a, b);
        Self::check_bv(a);
        if a == b {
            return self.mk_true();
        }
        match (a.as_bv(), b.as_bv()) {
            (Some(x), Some(y)) => self.mk_bool(x <= y),
            _ => self.intern(ExprKind::BvSle(a.clone(), b.clone()), Sort::Bool),
        }
    }

    pub fn mk_bv_sgt(&self, a: &Expr, b: &Expr) -> Expr {
        self.mk_bv_slt(b, a)
    }

    pub fn mk_bv_sge(&self, a: &Expr, b: &Expr) -> Expr {
        self.mk_bv_sle(b, a)
    }

    /// Signed maximum of two bit-vectors.
    pub fn mk_bv_max(&self, a: &Expr, b: &Expr) -> Expr {
        self.mk_ite(&self.mk_bv_slt(a, b), b, a)
    }

    /// `max(0, a)`.
    pub fn mk_non_negative(&self, a: &Expr) -> Expr {
        let zero = self.mk_bv(0, Self::check_bv(a));
        self.mk_bv_max(&zero, a)
    }
}
