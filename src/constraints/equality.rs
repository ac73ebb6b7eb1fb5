//! Equalities and disequalities between heap references.
//!
//! Equal references are kept in a union-find forest. Disequalities are kept in two forms: one
//! global clique of representatives that are pairwise distinct, and a symmetric map of pairwise
//! disequalities for representatives outside of the clique. A representative that becomes
//! disequal to every clique member is moved into the clique, and its pairwise edges to the clique
//! are dropped.
//!
//! Concrete representatives are preferred, so a class containing a concrete address is always
//! represented by it. Two different concrete addresses, or an allocated address and a symbolic
//! reference, are distinct without any bookkeeping.
use im::{HashMap, HashSet};
use log::debug;

use crate::expr::{Expr, ExprContext};

#[derive(Debug, Clone, Default)]
pub struct EqualityConstraints {
    parents: HashMap<Expr, Expr>,
    distinct: HashSet<Expr>,
    disequalities: HashMap<Expr, HashSet<Expr>>,
    contradiction: bool,
}

fn check_leaf(r: &Expr) {
    assert!(r.as_heap_ref().is_some(), "{} is not a reference leaf", r);
}

fn trivially_distinct(a: &Expr, b: &Expr) -> bool {
    match (a.as_heap_ref(), b.as_heap_ref()) {
        (Some(x), Some(y)) => x.trivially_distinct(&y),
        _ => false,
    }
}

impl EqualityConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_contradiction(&self) -> bool {
        self.contradiction
    }

    /// Representative of the class of `r`.
    pub fn find(&self, r: &Expr) -> Expr {
        let mut cur = r.clone();
        while let Some(parent) = self.parents.get(&cur) {
            cur = parent.clone();
        }
        cur
    }

    /// Points every reference on the path from `r` directly to its representative.
    fn compress(&mut self, r: &Expr) -> Expr {
        let root = self.find(r);
        let mut cur = r.clone();
        while let Some(parent) = self.parents.get(&cur).cloned() {
            if parent != root {
                self.parents.insert(cur, root.clone());
            }
            cur = parent;
        }
        root
    }

    pub fn are_equal(&self, a: &Expr, b: &Expr) -> bool {
        self.find(a) == self.find(b)
    }

    pub fn are_distinct(&self, a: &Expr, b: &Expr) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        ra != rb && self.representatives_distinct(&ra, &rb)
    }

    fn representatives_distinct(&self, a: &Expr, b: &Expr) -> bool {
        trivially_distinct(a, b)
            || (self.distinct.contains(a) && self.distinct.contains(b))
            || self.disequalities.get(a).is_some_and(|s| s.contains(b))
    }

    /// Members of the distinct clique.
    pub fn distinct_refs(&self) -> impl Iterator<Item = &Expr> {
        self.distinct.iter()
    }

    /// Number of pairwise disequalities kept outside of the clique.
    pub fn pairwise_count(&self) -> usize {
        self.disequalities.values().map(|s| s.len()).sum::<usize>() / 2
    }

    fn add_edge(&mut self, a: &Expr, b: &Expr) {
        self.disequalities.entry(a.clone()).or_default().insert(b.clone());
        self.disequalities.entry(b.clone()).or_default().insert(a.clone());
    }

    fn remove_edge(&mut self, a: &Expr, b: &Expr) {
        for (x, y) in [(a, b), (b, a)] {
            if let Some(set) = self.disequalities.get_mut(x) {
                set.remove(y);
                if set.is_empty() {
                    self.disequalities.remove(x);
                }
            }
        }
    }

    /// Moves `r` into the clique if it is distinct from every member.
    fn try_absorb(&mut self, r: &Expr) {
        if self.distinct.contains(r) || self.distinct.is_empty() {
            return;
        }
        if !self.distinct.iter().all(|m| self.representatives_distinct(r, m)) {
            return;
        }
        debug!("absorb {} into the distinct clique", r);
        let members: Vec<Expr> = self.distinct.iter().cloned().collect();
        for m in &members {
            self.remove_edge(r, m);
        }
        self.distinct.insert(r.clone());
    }

    pub fn add_disequality(&mut self, a: &Expr, b: &Expr) {
        check_leaf(a);
        check_leaf(b);
        if self.contradiction {
            return;
        }
        let (ra, rb) = (self.compress(a), self.compress(b));
        if ra == rb {
            debug!("{} != {} contradicts {} == {}", a, b, a, b);
            self.contradiction = true;
            return;
        }
        if self.representatives_distinct(&ra, &rb) {
            return;
        }
        if self.distinct.is_empty() {
            debug!("start distinct clique with {} and {}", ra, rb);
            self.distinct.insert(ra);
            self.distinct.insert(rb);
            return;
        }
        self.add_edge(&ra, &rb);
        self.try_absorb(&ra);
        self.try_absorb(&rb);
    }

    pub fn add_equality(&mut self, a: &Expr, b: &Expr) {
        check_leaf(a);
        check_leaf(b);
        if self.contradiction {
            return;
        }
        let (ra, rb) = (self.compress(a), self.compress(b));
        if ra == rb {
            return;
        }
        if self.representatives_distinct(&ra, &rb) {
            debug!("{} == {} contradicts a known disequality", a, b);
            self.contradiction = true;
            return;
        }
        let a_concrete = ra.as_heap_ref().is_some_and(|r| r.is_concrete());
        let (from, to) = if a_concrete { (rb, ra) } else { (ra, rb) };
        debug!("merge {} into {}", from, to);
        self.parents.insert(from.clone(), to.clone());

        if self.distinct.remove(&from).is_some() {
            self.distinct.insert(to.clone());
            let members: Vec<Expr> = self.distinct.iter().cloned().collect();
            for m in &members {
                self.remove_edge(&to, m);
            }
        }
        if let Some(edges) = self.disequalities.remove(&from) {
            for x in edges.iter() {
                if let Some(set) = self.disequalities.get_mut(x) {
                    set.remove(&from);
                }
                if !(self.distinct.contains(x) && self.distinct.contains(&to)) {
                    self.add_edge(&to, x);
                }
            }
            self.disequalities.retain(|_, s| !s.is_empty());
        }
        self.try_absorb(&to);
    }

    /// The constraints of the store as a list of formulas.
    pub fn constraints(&self, ctx: &ExprContext) -> Vec<Expr> {
        let mut out = Vec::new();
        let mut members: Vec<&Expr> = self.parents.keys().collect();
        members.sort();
        for r in members {
            out.push(ctx.mk_eq(r, &self.find(r)));
        }
        let mut clique: Vec<&Expr> = self.distinct.iter().collect();
        clique.sort();
        for (i, a) in clique.iter().enumerate() {
            for b in &clique[i + 1..] {
                out.push(ctx.mk_not(&ctx.mk_eq(a, b)));
            }
        }
        let mut edges: Vec<(&Expr, &Expr)> = self
            .disequalities
            .iter()
            .flat_map(|(a, s)| s.iter().filter(move |b| a < *b).map(move |b| (a, b)))
            .collect();
        edges.sort();
        for (a, b) in edges {
            out.push(ctx.mk_not(&ctx.mk_eq(a, b)));
        }
        out.retain(|e| !e.is_true());
        out
    }
}
