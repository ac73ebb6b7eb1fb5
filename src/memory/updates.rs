//! Update nodes of symbolic collections.
use std::fmt::{Display, Formatter};

use super::collection::SymbolicCollection;
use super::key::{Key, KeyRegion};
use crate::expr::{Expr, ExprContext};
use crate::types::Sort;

/// Converts destination keys of a ranged update into keys of its source collection.
#[derive(Debug, Clone)]
pub enum Adapter {
    /// `dst[k] = src[k - dst_from + src_from]` for `k` in `[dst_from, dst_to]`.
    Copy {
        src_owner: Option<Expr>,
        dst_owner: Option<Expr>,
        src_from: Expr,
        dst_from: Expr,
        dst_to: Expr,
    },
    /// `dst[k] = src[k]` for every `k` contained in the source key set `contains`.
    Merge {
        src_owner: Option<Expr>,
        dst_owner: Option<Expr>,
        contains: SymbolicCollection,
    },
    /// `dst[k] = true` for every `k` with `src[k]`; used for set union.
    Union {
        src_owner: Option<Expr>,
        dst_owner: Option<Expr>,
    },
}

impl Adapter {
    fn owners(&self) -> (Option<&Expr>, Option<&Expr>) {
        match self {
            Adapter::Copy {
                src_owner, dst_owner, ..
            }
            | Adapter::Merge {
                src_owner, dst_owner, ..
            }
            | Adapter::Union { src_owner, dst_owner } => (src_owner.as_ref(), dst_owner.as_ref()),
        }
    }

    /// Source key to read for the destination `key`.
    pub fn convert(&self, ctx: &ExprContext, key: &Key) -> Key {
        let (src_owner, _) = self.owners();
        let index = match self {
            Adapter::Copy { src_from, dst_from, .. } => ctx.mk_bv_add(&ctx.mk_bv_sub(key.index(), dst_from), src_from),
            Adapter::Merge { .. } | Adapter::Union { .. } => key.index().clone(),
        };
        Key::with_owner(src_owner, index)
    }

    fn owner_matches(&self, ctx: &ExprContext, key: &Key) -> Expr {
        match (self.owners().1, key.owner()) {
            (Some(dst), Some(owner)) => ctx.mk_eq(dst, owner),
            (None, None) => ctx.mk_true(),
            _ => panic!("Key {} does not match the shape of {}", key, self),
        }
    }

    fn region(&self, key_sort: Sort) -> KeyRegion {
        match self {
            Adapter::Copy { dst_from, dst_to, .. } => KeyRegion::range(dst_from, dst_to),
            Adapter::Merge { .. } | Adapter::Union { .. } => KeyRegion::universe(key_sort),
        }
    }
}

impl Display for Adapter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Adapter::Copy {
                src_from, dst_from, dst_to, ..
            } => write!(f, "[{}..{}] <- [{}..]", dst_from, dst_to, src_from),
            Adapter::Merge { .. } => write!(f, "merge"),
            Adapter::Union { .. } => write!(f, "union"),
        }
    }
}

#[derive(Debug)]
pub enum UpdateNode {
    /// A single key written under a guard.
    Pinpoint { key: Key, value: Expr, guard: Expr },
    /// A bulk update reading from a snapshot of another collection.
    Ranged {
        source: SymbolicCollection,
        adapter: Adapter,
        guard: Expr,
    },
}

impl UpdateNode {
    pub fn guard(&self) -> &Expr {
        match self {
            UpdateNode::Pinpoint { guard, .. } | UpdateNode::Ranged { guard, .. } => guard,
        }
    }

    /// Region of keys this update may touch.
    pub fn region(&self) -> KeyRegion {
        match self {
            UpdateNode::Pinpoint { key, .. } => key.region(),
            UpdateNode::Ranged { source, adapter, .. } => adapter.region(source.region_key().key_sort),
        }
    }

    /// Condition under which this update determines the value at `key`.
    pub fn includes_symbolically(&self, ctx: &ExprContext, key: &Key) -> Expr {
        match self {
            UpdateNode::Pinpoint { key: own, guard, .. } => ctx.mk_and(&own.eq_expr(ctx, key), guard),
            UpdateNode::Ranged { source, adapter, guard } => {
                let owner = adapter.owner_matches(ctx, key);
                let inside = match adapter {
                    Adapter::Copy { dst_from, dst_to, .. } => {
                        let index = key.index();
                        ctx.mk_and(&ctx.mk_bv_sle(dst_from, index), &ctx.mk_bv_sle(index, dst_to))
                    }
                    Adapter::Merge { contains, .. } => contains.read(ctx, &adapter.convert(ctx, key)),
                    Adapter::Union { .. } => source.read(ctx, &adapter.convert(ctx, key)),
                };
                ctx.mk_and_many([guard.clone(), owner, inside])
            }
        }
    }

    /// Whether this update surely determines the value at `key` whenever `precondition` holds.
    pub fn includes_concretely(&self, key: &Key, precondition: &Expr) -> bool {
        let guarded = self.guard().is_true() || self.guard() == precondition;
        match self {
            UpdateNode::Pinpoint { key: own, .. } => guarded && own == key,
            UpdateNode::Ranged {
                adapter: Adapter::Copy { dst_owner, dst_from, dst_to, .. },
                ..
            } => {
                let (Some(lo), Some(hi), Some(k)) = (dst_from.as_bv(), dst_to.as_bv(), key.index().as_bv()) else {
                    return false;
                };
                guarded && dst_owner.as_ref() == key.owner() && lo <= k && k <= hi
            }
            UpdateNode::Ranged { .. } => false,
        }
    }

    /// Whether `update` surely overwrites everything this update wrote.
    pub fn is_included_by_update_concretely(&self, update: &UpdateNode) -> bool {
        match self {
            UpdateNode::Pinpoint { key, guard, .. } => update.includes_concretely(key, guard),
            UpdateNode::Ranged {
                adapter: Adapter::Copy { dst_owner, dst_from, dst_to, .. },
                guard,
                ..
            } => {
                let from = Key::with_owner(dst_owner.as_ref(), dst_from.clone());
                let to = Key::with_owner(dst_owner.as_ref(), dst_to.clone());
                update.includes_concretely(&from, guard) && update.includes_concretely(&to, guard)
            }
            UpdateNode::Ranged { .. } => false,
        }
    }

    /// Value stored at `key`, assuming this update includes it.
    pub fn value(&self, ctx: &ExprContext, key: &Key) -> Expr {
        match self {
            UpdateNode::Pinpoint { value, .. } => value.clone(),
            UpdateNode::Ranged { source, adapter, .. } => match adapter {
                Adapter::Copy { .. } | Adapter::Merge { .. } => source.read(ctx, &adapter.convert(ctx, key)),
                Adapter::Union { .. } => ctx.mk_true(),
            },
        }
    }
}

impl Display for UpdateNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateNode::Pinpoint { key, value, guard } if guard.is_true() => write!(f, "{} <- {}", key, value),
            UpdateNode::Pinpoint { key, value, guard } => write!(f, "{} <- {} | {}", key, value, guard),
            UpdateNode::Ranged { source, adapter, .. } => write!(f, "{} from {}", adapter, source.id()),
        }
    }
}
