//! Signed bit-vector comparisons with incremental simplification.
//!
//! Every comparison is first split into linear sides `term + bias`, where `term` is an arbitrary
//! bit-vector expression and `bias` a constant. A comparison with one side constant restricts a
//! single term, and is folded into the exact set of admissible values of that term. A comparison
//! between two terms is kept as a relation, unless the value sets of the terms already imply it.
//!
//! Value sets are exact, so the emitted constraints are equivalent to the conjunction of all added
//! comparisons. Relations are only used for a bounded round of interval propagation, which feeds
//! contradiction detection and [`NumericConstraints::eval_interval`].
use std::fmt::{Display, Formatter};

use im::{HashMap, Vector};
use log::{debug, trace};

use crate::error::{Error, Result};
use crate::expr::{Expr, ExprContext, ExprKind};
use crate::regions::{IntervalsRegion, Region};
use crate::utils::{bv_normalize, bv_signed_max, bv_signed_min};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RelOp {
    Lt,
    Le,
    Eq,
    Ne,
}

impl RelOp {
    fn holds(self, a: i64, b: i64) -> bool {
        match self {
            RelOp::Lt => a < b,
            RelOp::Le => a <= b,
            RelOp::Eq => a == b,
            RelOp::Ne => a != b,
        }
    }
}

impl Display for RelOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

/// `term + bias` in wrapping arithmetic; a constant when `term` is `None`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Linear {
    pub term: Option<Expr>,
    pub bias: i64,
}

impl Linear {
    pub fn of(e: &Expr) -> Self {
        let width = e.sort().width();
        let opaque = || Linear {
            term: Some(e.clone()),
            bias: 0,
        };
        match e.kind() {
            ExprKind::Bv { value, .. } => Linear {
                term: None,
                bias: *value,
            },
            ExprKind::BvAdd(a, b) => {
                let (a, b) = (Linear::of(a), Linear::of(b));
                if a.term.is_some() && b.term.is_some() {
                    return opaque();
                }
                Linear {
                    term: a.term.or(b.term),
                    bias: bv_normalize(a.bias as i128 + b.bias as i128, width),
                }
            }
            ExprKind::BvSub(a, b) => {
                let (a, b) = (Linear::of(a), Linear::of(b));
                match b.term {
                    None => Linear {
                        term: a.term,
                        bias: bv_normalize(a.bias as i128 - b.bias as i128, width),
                    },
                    Some(_) => opaque(),
                }
            }
            _ => opaque(),
        }
    }
}

impl Display for Linear {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.term, self.bias) {
            (None, b) => write!(f, "{}", b),
            (Some(t), 0) => write!(f, "{}", t),
            (Some(t), b) => write!(f, "{} + {}", t, b),
        }
    }
}

/// A parsed comparison `left op right`.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub left: Expr,
    pub op: RelOp,
    pub right: Expr,
}

impl Comparison {
    /// Recognizes signed comparisons and bit-vector (dis)equalities, possibly negated.
    pub fn parse(e: &Expr) -> Result<Self> {
        let (negated, atom) = match e.kind() {
            ExprKind::Not(x) => (true, x),
            _ => (false, e),
        };
        let (left, op, right) = match (atom.kind(), negated) {
            (ExprKind::BvSlt(a, b), false) => (a, RelOp::Lt, b),
            (ExprKind::BvSle(a, b), false) => (a, RelOp::Le, b),
            (ExprKind::BvSlt(a, b), true) => (b, RelOp::Le, a),
            (ExprKind::BvSle(a, b), true) => (b, RelOp::Lt, a),
            (ExprKind::Eq(a, b), false) if a.sort().is_bv() => (a, RelOp::Eq, b),
            (ExprKind::Eq(a, b), true) if a.sort().is_bv() => (a, RelOp::Ne, b),
            _ => return Err(Error::UnsupportedConstraint(e.to_string())),
        };
        Ok(Self {
            left: left.clone(),
            op,
            right: right.clone(),
        })
    }

    pub fn to_expr(&self, ctx: &ExprContext) -> Expr {
        let (a, b) = (&self.left, &self.right);
        match self.op {
            RelOp::Lt => ctx.mk_bv_slt(a, b),
            RelOp::Le => ctx.mk_bv_sle(a, b),
            RelOp::Eq => ctx.mk_eq(a, b),
            RelOp::Ne => ctx.mk_not(&ctx.mk_eq(a, b)),
        }
    }
}

#[derive(Debug, Clone)]
struct Relation {
    lhs: Linear,
    op: RelOp,
    rhs: Linear,
    source: Comparison,
}

impl Relation {
    fn same(&self, other: &Relation) -> bool {
        self.lhs == other.lhs && self.op == other.op && self.rhs == other.rhs
    }
}

/// Values `v` in the `width`-bit domain with `v op c`, or `c op v` when `flipped`.
fn admissible(op: RelOp, c: i64, flipped: bool, width: u32) -> IntervalsRegion {
    let (min, max) = (bv_signed_min(width), bv_signed_max(width));
    let below = |hi: Option<i64>| hi.map_or(IntervalsRegion::empty(), |hi| IntervalsRegion::closed(min, hi));
    let above = |lo: Option<i64>| lo.map_or(IntervalsRegion::empty(), |lo| IntervalsRegion::closed(lo, max));
    match (op, flipped) {
        (RelOp::Lt, false) => below(c.checked_sub(1)),
        (RelOp::Le, false) => below(Some(c)),
        (RelOp::Lt, true) => above(c.checked_add(1)),
        (RelOp::Le, true) => above(Some(c)),
        (RelOp::Eq, _) => IntervalsRegion::singleton(c),
        (RelOp::Ne, _) => IntervalsRegion::domain(width).subtract(&IntervalsRegion::singleton(c)),
    }
}

/// Outcome of checking a comparison between two value sets.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Verdict {
    Always,
    Never,
    Unknown,
}

fn judge(l: &IntervalsRegion, op: RelOp, r: &IntervalsRegion) -> Verdict {
    let (Some(lmin), Some(lmax), Some(rmin), Some(rmax)) = (l.min(), l.max(), r.min(), r.max()) else {
        return Verdict::Never;
    };
    match op {
        RelOp::Lt if lmax < rmin => Verdict::Always,
        RelOp::Lt if lmin >= rmax => Verdict::Never,
        RelOp::Le if lmax <= rmin => Verdict::Always,
        RelOp::Le if lmin > rmax => Verdict::Never,
        RelOp::Eq | RelOp::Ne => {
            let disjoint = l.intersect(r).is_empty();
            let same_point = matches!((l.as_singleton(), r.as_singleton()), (Some(x), Some(y)) if x == y);
            match (op, disjoint, same_point) {
                (RelOp::Eq, true, _) | (RelOp::Ne, _, true) => Verdict::Never,
                (RelOp::Eq, _, true) | (RelOp::Ne, true, _) => Verdict::Always,
                _ => Verdict::Unknown,
            }
        }
        _ => Verdict::Unknown,
    }
}

/// The parts of `l` and `r` compatible with `l op r`.
fn narrow(l: &IntervalsRegion, op: RelOp, r: &IntervalsRegion) -> (IntervalsRegion, IntervalsRegion) {
    let (Some(lmin), Some(rmax)) = (l.min(), r.max()) else {
        return (IntervalsRegion::empty(), IntervalsRegion::empty());
    };
    let upto = |hi: Option<i64>| hi.map_or(IntervalsRegion::empty(), |hi| IntervalsRegion::closed(i64::MIN, hi));
    let from = |lo: Option<i64>| lo.map_or(IntervalsRegion::empty(), |lo| IntervalsRegion::closed(lo, i64::MAX));
    match op {
        RelOp::Lt => (l.intersect(&upto(rmax.checked_sub(1))), r.intersect(&from(lmin.checked_add(1)))),
        RelOp::Le => (l.intersect(&upto(Some(rmax))), r.intersect(&from(Some(lmin)))),
        RelOp::Eq => {
            let both = l.intersect(r);
            (both.clone(), both)
        }
        RelOp::Ne => {
            let l2 = match r.as_singleton() {
                Some(p) => l.subtract(&IntervalsRegion::singleton(p)),
                None => l.clone(),
            };
            let r2 = match l.as_singleton() {
                Some(p) => r.subtract(&IntervalsRegion::singleton(p)),
                None => r.clone(),
            };
            (l2, r2)
        }
    }
}

#[derive(Debug, Clone)]
pub struct NumericConstraints {
    /// Exact admissible values of each restricted term.
    bounds: HashMap<Expr, IntervalsRegion>,
    relations: Vector<Relation>,
    /// Over-approximation of the admissible values, refined through the relations.
    inferred: HashMap<Expr, IntervalsRegion>,
    rounds: usize,
    contradiction: bool,
    added: usize,
}

impl Default for NumericConstraints {
    fn default() -> Self {
        Self::new(8)
    }
}

impl NumericConstraints {
    /// Creates an empty store that propagates through relations for at most `rounds` rounds.
    pub fn new(rounds: usize) -> Self {
        Self {
            bounds: HashMap::new(),
            relations: Vector::new(),
            inferred: HashMap::new(),
            rounds,
            contradiction: false,
            added: 0,
        }
    }

    pub fn is_contradiction(&self) -> bool {
        self.contradiction
    }

    /// Number of comparisons added so far.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Exact admissible values of `term`, if it is restricted.
    pub fn bounds(&self, term: &Expr) -> Option<&IntervalsRegion> {
        self.bounds.get(term)
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    fn domain_of(term: &Expr) -> IntervalsRegion {
        IntervalsRegion::domain(term.sort().width())
    }

    fn bounds_or_domain(&self, term: &Expr) -> IntervalsRegion {
        self.bounds.get(term).cloned().unwrap_or_else(|| Self::domain_of(term))
    }

    fn inferred_or_domain(&self, term: &Expr) -> IntervalsRegion {
        self.inferred.get(term).cloned().unwrap_or_else(|| Self::domain_of(term))
    }

    /// Values `lin` may take, given the per-term sets selected by `sets`.
    fn values(lin: &Linear, width: u32, sets: impl Fn(&Expr) -> IntervalsRegion) -> IntervalsRegion {
        match &lin.term {
            None => IntervalsRegion::singleton(lin.bias),
            Some(t) => sets(t).shift(lin.bias, width),
        }
    }

    /// Adds the comparison `c`. Fails if `c` is not a signed comparison or a bit-vector
    /// (dis)equality; the store is unchanged in that case.
    pub fn add(&mut self, c: &Expr) -> Result<()> {
        let cmp = Comparison::parse(c)?;
        self.added += 1;
        if self.contradiction {
            return Ok(());
        }
        let width = cmp.left.sort().width();
        let (lhs, rhs) = (Linear::of(&cmp.left), Linear::of(&cmp.right));
        trace!("add {} {} {}", lhs, cmp.op, rhs);
        let terms = (lhs.term.clone(), rhs.term.clone());
        match &terms {
            (None, None) => {
                if !cmp.op.holds(lhs.bias, rhs.bias) {
                    self.set_contradiction(c);
                }
            }
            (Some(t), None) => {
                let allowed = admissible(cmp.op, rhs.bias, false, width);
                self.restrict(t, allowed.shift(lhs.bias.wrapping_neg(), width), c);
            }
            (None, Some(t)) => {
                let allowed = admissible(cmp.op, lhs.bias, true, width);
                self.restrict(t, allowed.shift(rhs.bias.wrapping_neg(), width), c);
            }
            (Some(a), Some(b)) if a == b && (lhs.bias == rhs.bias || matches!(cmp.op, RelOp::Eq | RelOp::Ne)) => {
                // Both sides move together, so only the biases matter.
                if !cmp.op.holds(lhs.bias, rhs.bias) {
                    self.set_contradiction(c);
                }
            }
            _ => self.relate(Relation {
                lhs,
                op: cmp.op,
                rhs,
                source: cmp,
            }),
        }
        debug_assert!(
            self.formula_count() <= self.added,
            "Numeric store grew to {} formulas from {} comparisons",
            self.formula_count(),
            self.added
        );
        Ok(())
    }

    /// Adds the negation of the comparison `c`.
    pub fn add_negated(&mut self, ctx: &ExprContext, c: &Expr) -> Result<()> {
        self.add(&ctx.mk_not(c))
    }

    fn set_contradiction(&mut self, c: &Expr) {
        debug!("numeric contradiction at {}", c);
        self.contradiction = true;
    }

    fn restrict(&mut self, term: &Expr, allowed: IntervalsRegion, c: &Expr) {
        let old = self.bounds_or_domain(term);
        let new = old.intersect(&allowed);
        if new == old {
            trace!("{} is implied", c);
            return;
        }
        if new.is_empty() {
            self.set_contradiction(c);
            return;
        }
        debug!("tighten {} to {}", term, new);
        self.bounds.insert(term.clone(), new);
        // Relations implied by the tighter bounds are redundant now.
        let bounds = &self.bounds;
        let domain = |t: &Expr| bounds.get(t).cloned().unwrap_or_else(|| Self::domain_of(t));
        self.relations.retain(|r| {
            let width = r.source.left.sort().width();
            let l = Self::values(&r.lhs, width, domain);
            let rr = Self::values(&r.rhs, width, domain);
            judge(&l, r.op, &rr) != Verdict::Always
        });
        self.propagate();
    }

    fn relate(&mut self, relation: Relation) {
        if self.relations.iter().any(|r| r.same(&relation)) {
            return;
        }
        let width = relation.source.left.sort().width();
        let l = Self::values(&relation.lhs, width, |t| self.bounds_or_domain(t));
        let r = Self::values(&relation.rhs, width, |t| self.bounds_or_domain(t));
        if judge(&l, relation.op, &r) == Verdict::Always {
            trace!("relation {} {} {} is implied", relation.lhs, relation.op, relation.rhs);
            return;
        }
        debug!("relate {} {} {}", relation.lhs, relation.op, relation.rhs);
        self.relations.push_back(relation);
        self.propagate();
    }

    /// Recomputes the inferred sets from the bounds, narrowing through the relations.
    fn propagate(&mut self) {
        let mut inferred = self.bounds.clone();
        for round in 0..self.rounds {
            let mut changed = false;
            for r in self.relations.iter() {
                let width = r.source.left.sort().width();
                let get = |t: &Expr| inferred.get(t).cloned().unwrap_or_else(|| Self::domain_of(t));
                let l = Self::values(&r.lhs, width, get);
                let rv = Self::values(&r.rhs, width, get);
                if judge(&l, r.op, &rv) == Verdict::Never {
                    self.contradiction = true;
                    debug!("relations contradict after {} rounds", round);
                    return;
                }
                let (l2, r2) = narrow(&l, r.op, &rv);
                for (lin, narrowed) in [(&r.lhs, l2), (&r.rhs, r2)] {
                    let Some(t) = &lin.term else { continue };
                    let old = inferred.get(t).cloned().unwrap_or_else(|| Self::domain_of(t));
                    let new = old.intersect(&narrowed.shift(lin.bias.wrapping_neg(), width));
                    if new.is_empty() {
                        self.contradiction = true;
                        debug!("relations contradict after {} rounds", round);
                        return;
                    }
                    if new != old {
                        inferred.insert(t.clone(), new);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        self.inferred = inferred;
    }

    /// Values `e` may take under the store: `term + bias` shifted from the inferred set of
    /// `term`. Empty on contradiction; the whole domain for an unknown term.
    pub fn eval_interval(&self, e: &Expr) -> IntervalsRegion {
        if self.contradiction {
            return IntervalsRegion::empty();
        }
        let width = e.sort().width();
        Self::values(&Linear::of(e), width, |t| self.inferred_or_domain(t))
    }

    fn term_formula_count(set: &IntervalsRegion, width: u32) -> usize {
        let (min, max) = (bv_signed_min(width), bv_signed_max(width));
        let outer = set.min() != Some(min) || set.max() != Some(max);
        set.intervals().len() - 1 + outer as usize
    }

    /// Number of formulas [`constraints`][Self::constraints] emits.
    pub fn formula_count(&self) -> usize {
        if self.contradiction {
            return 1;
        }
        let bounds: usize = self
            .bounds
            .iter()
            .map(|(t, s)| Self::term_formula_count(s, t.sort().width()))
            .sum();
        bounds + self.relations.len()
    }

    /// The constraints of the store as a list of formulas, equivalent to the conjunction of every
    /// added comparison.
    pub fn constraints(&self, ctx: &ExprContext) -> Vec<Expr> {
        if self.contradiction {
            return vec![ctx.mk_false()];
        }
        let mut terms: Vec<(&Expr, &IntervalsRegion)> = self.bounds.iter().collect();
        terms.sort_by(|a, b| a.0.cmp(b.0));
        let mut out = Vec::new();
        for (t, set) in terms {
            let width = t.sort().width();
            let (min, max) = (bv_signed_min(width), bv_signed_max(width));
            let bv = |x: i64| ctx.mk_bv(x, width);
            let (Some(lo), Some(hi)) = (set.min(), set.max()) else {
                continue;
            };
            // The gaps below `lo` and above `hi` wrap into one gap, emitted as one formula.
            let lower = (lo != min).then(|| ctx.mk_bv_sle(&bv(lo), t));
            let upper = (hi != max).then(|| ctx.mk_bv_sle(t, &bv(hi)));
            match (lower, upper) {
                _ if lo == hi => out.push(ctx.mk_eq(t, &bv(lo))),
                (Some(l), Some(u)) => out.push(ctx.mk_and(&l, &u)),
                (Some(f), None) | (None, Some(f)) => out.push(f),
                (None, None) => {}
            }
            for w in set.intervals().windows(2) {
                let (gap_lo, gap_hi) = (w[0].1 + 1, w[1].0 - 1);
                if gap_lo == gap_hi {
                    out.push(ctx.mk_not(&ctx.mk_eq(t, &bv(gap_lo))));
                } else {
                    out.push(ctx.mk_or(&ctx.mk_bv_slt(t, &bv(gap_lo)), &ctx.mk_bv_slt(&bv(gap_hi), t)));
                }
            }
        }
        out.extend(self.relations.iter().map(|r| r.source.to_expr(ctx)));
        out
    }
}
