use im::Vector;
use log::trace;

use super::equality::EqualityConstraints;
use super::numeric::NumericConstraints;
use crate::expr::{Expr, ExprContext, ExprKind};
use crate::regions::IntervalsRegion;
use crate::types::Sort;

/// The path condition of one execution state.
///
/// Every asserted formula is split into conjuncts. Equalities between reference leaves go to the
/// equality store, signed comparisons to the numeric store, and everything else is kept as is.
#[derive(Debug, Clone)]
pub struct PathConstraints {
    equality: EqualityConstraints,
    numeric: NumericConstraints,
    logical: Vector<Expr>,
    contradiction: bool,
}

impl Default for PathConstraints {
    fn default() -> Self {
        Self::new(NumericConstraints::default())
    }
}

impl PathConstraints {
    pub fn new(numeric: NumericConstraints) -> Self {
        Self {
            equality: EqualityConstraints::new(),
            numeric,
            logical: Vector::new(),
            contradiction: false,
        }
    }

    pub fn equality(&self) -> &EqualityConstraints {
        &self.equality
    }

    pub fn numeric(&self) -> &NumericConstraints {
        &self.numeric
    }

    pub fn is_contradiction(&self) -> bool {
        self.contradiction || self.equality.is_contradiction() || self.numeric.is_contradiction()
    }

    pub fn add(&mut self, ctx: &ExprContext, c: &Expr) {
        assert_eq!(c.sort(), Sort::Bool, "Sort mismatch: constraint {} is not boolean", c);
        match c.kind() {
            ExprKind::Bool(true) => {}
            ExprKind::Bool(false) => self.contradiction = true,
            ExprKind::And(xs) => xs.iter().for_each(|x| self.add(ctx, x)),
            ExprKind::Not(x) => match x.kind() {
                ExprKind::Or(xs) => xs.iter().for_each(|x| self.add(ctx, &ctx.mk_not(x))),
                ExprKind::Eq(a, b) if a.as_heap_ref().is_some() && b.as_heap_ref().is_some() => {
                    self.equality.add_disequality(a, b)
                }
                _ => self.add_other(c),
            },
            ExprKind::Eq(a, b) if a.as_heap_ref().is_some() && b.as_heap_ref().is_some() => {
                self.equality.add_equality(a, b)
            }
            _ => self.add_other(c),
        }
    }

    fn add_other(&mut self, c: &Expr) {
        if self.numeric.add(c).is_ok() {
            return;
        }
        trace!("keep {} as is", c);
        if !self.logical.contains(c) {
            self.logical.push_back(c.clone());
        }
    }

    /// Values `e` may take on this path, see [`NumericConstraints::eval_interval`].
    pub fn eval_interval(&self, e: &Expr) -> IntervalsRegion {
        self.numeric.eval_interval(e)
    }

    /// The path condition as a list of formulas for the solver.
    pub fn constraints(&self, ctx: &ExprContext) -> Vec<Expr> {
        if self.is_contradiction() {
            return vec![ctx.mk_false()];
        }
        let mut out = self.equality.constraints(ctx);
        out.extend(self.numeric.constraints(ctx));
        out.extend(self.logical.iter().cloned());
        out
    }
}
