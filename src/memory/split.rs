//! Splitting reference expressions into their concrete and symbolic possibilities.
//!
//! A reference expression is a tree of `ite`s whose leaves are concrete addresses or symbolic
//! references. Memory operations fold over the leaves: each allocated leaf is handled by the
//! per-object collection of that address, and all remaining leaves are handled together by the
//! shared input collection.
use log::trace;

use crate::address::Address;
use crate::expr::{Expr, ExprContext, ExprKind};
use crate::types::Sort;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RefLeaf {
    /// An object allocated during execution.
    Allocated(Address),
    /// Any other reference: symbolic, input, null, or an `ite` over those.
    Symbolic(Expr),
}

/// A reference possibility together with the condition under which the reference denotes it.
#[derive(Debug, Clone)]
pub struct GuardedRef {
    pub leaf: RefLeaf,
    pub guard: Expr,
}

/// Splits `r` into guarded possibilities, each conjoined with `guard`.
///
/// Allocated addresses are reported separately (at most once each). Every other leaf is merged
/// into one symbolic possibility, so the result holds at most one [`RefLeaf::Symbolic`] entry.
pub fn split_heap_ref(ctx: &ExprContext, r: &Expr, guard: &Expr) -> Vec<GuardedRef> {
    assert_eq!(r.sort(), Sort::Address, "Sort mismatch: {} is not a reference", r);
    let mut out: Vec<GuardedRef> = Vec::new();
    let mut symbolic: Option<(Expr, Expr)> = None;
    collect(ctx, r, guard.clone(), &mut out, &mut symbolic);
    if let Some((leaf, guard)) = symbolic {
        out.push(GuardedRef {
            leaf: RefLeaf::Symbolic(leaf),
            guard,
        });
    }
    trace!("split {} into {} possibilities", r, out.len());
    out
}

fn collect(ctx: &ExprContext, r: &Expr, guard: Expr, out: &mut Vec<GuardedRef>, symbolic: &mut Option<(Expr, Expr)>) {
    if guard.is_false() {
        return;
    }
    match r.kind() {
        ExprKind::Ite(c, t, e) => {
            collect(ctx, t, ctx.mk_and(&guard, c), out, symbolic);
            collect(ctx, e, ctx.mk_and(&guard, &ctx.mk_not(c)), out, symbolic);
        }
        ExprKind::ConcreteRef(a) if a.is_allocated() => {
            match out.iter_mut().find(|g| g.leaf == RefLeaf::Allocated(*a)) {
                Some(existing) => existing.guard = ctx.mk_or(&existing.guard, &guard),
                None => out.push(GuardedRef {
                    leaf: RefLeaf::Allocated(*a),
                    guard,
                }),
            }
        }
        _ => {
            *symbolic = Some(match symbolic.take() {
                None => (r.clone(), guard),
                Some((prev, prev_guard)) => (ctx.mk_ite(&guard, r, &prev), ctx.mk_or(&prev_guard, &guard)),
            });
        }
    }
}

/// Rebuilds a value of reference `r` by mapping each leaf and re-joining the results with the
/// `ite` structure of `r`.
pub fn map_heap_ref(
    ctx: &ExprContext,
    r: &Expr,
    on_allocated: &mut dyn FnMut(Address) -> Expr,
    on_symbolic: &mut dyn FnMut(&Expr) -> Expr,
) -> Expr {
    match r.kind() {
        ExprKind::Ite(c, t, e) => {
            let t = map_heap_ref(ctx, t, on_allocated, on_symbolic);
            let e = map_heap_ref(ctx, e, on_allocated, on_symbolic);
            ctx.mk_ite(c, &t, &e)
        }
        ExprKind::ConcreteRef(a) if a.is_allocated() => on_allocated(*a),
        _ => on_symbolic(r),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_split_concrete() {
        let ctx = ExprContext::new();
        let r = ctx.mk_concrete_ref(Address::new(3));
        let parts = split_heap_ref(&ctx, &r, &ctx.mk_true());
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].leaf, RefLeaf::Allocated(Address::new(3)));
        assert!(parts[0].guard.is_true());
    }

    #[test]
    fn test_split_ite() {
        let ctx = ExprContext::new();
        let c = ctx.mk_const("c", Sort::Bool);
        let d = ctx.mk_const("d", Sort::Bool);
        let a = ctx.mk_symbolic_ref("a");
        let b = ctx.mk_symbolic_ref("b");
        let one = ctx.mk_concrete_ref(Address::new(1));
        // ite(c, 0x1, ite(d, a, b))
        let r = ctx.mk_ite(&c, &one, &ctx.mk_ite(&d, &a, &b));
        let parts = split_heap_ref(&ctx, &r, &ctx.mk_true());
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].leaf, RefLeaf::Allocated(Address::new(1)));
        assert_eq!(parts[0].guard, c);
        let not_c = ctx.mk_not(&c);
        match &parts[1].leaf {
            RefLeaf::Symbolic(leaf) => assert_eq!(leaf, &ctx.mk_ite(&ctx.mk_and(&not_c, &ctx.mk_not(&d)), &b, &a)),
            leaf => panic!("unexpected leaf {:?}", leaf),
        }
        assert_eq!(
            parts[1].guard,
            ctx.mk_or(&ctx.mk_and(&not_c, &d), &ctx.mk_and(&not_c, &ctx.mk_not(&d)))
        );
    }

    #[test]
    fn test_split_false_guard() {
        let ctx = ExprContext::new();
        let r = ctx.mk_symbolic_ref("a");
        assert!(split_heap_ref(&ctx, &r, &ctx.mk_false()).is_empty());
    }

    #[test]
    fn test_map_heap_ref() {
        let ctx = ExprContext::new();
        let c = ctx.mk_const("c", Sort::Bool);
        let a = ctx.mk_symbolic_ref("a");
        let r = ctx.mk_ite(&c, &ctx.mk_concrete_ref(Address::new(2)), &a);
        let mapped = map_heap_ref(
            &ctx,
            &r,
            &mut |addr: Address| ctx.mk_bv(addr.get(), 8),
            &mut |_: &Expr| ctx.mk_bv(-1, 8),
        );
        assert_eq!(mapped, ctx.mk_ite(&c, &ctx.mk_bv(2, 8), &ctx.mk_bv(-1, 8)));
    }
}
