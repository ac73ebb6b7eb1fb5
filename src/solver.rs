//! The boundary to an external SMT solver.
//!
//! Backends translate the boolean formulas of a path condition into their own terms, using
//! [`Declarations`] to learn which constants and base-read functions to declare, and answer with a
//! [`SolverResult`]. Models are read back through [`Model`].
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::error::Result;
use crate::expr::{Expr, ExprContext, ExprKind};
use crate::memory::RegionKey;
use crate::model::{Assignment, Model};
use crate::types::Sort;

#[derive(Debug, Clone)]
pub enum SolverResult<M> {
    Sat(M),
    Unsat,
    Unknown,
}

impl<M> SolverResult<M> {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolverResult::Sat(_))
    }

    pub fn is_unsat(&self) -> bool {
        matches!(self, SolverResult::Unsat)
    }

    pub fn model(&self) -> Option<&M> {
        match self {
            SolverResult::Sat(m) => Some(m),
            _ => None,
        }
    }
}

/// How an `Unknown` answer is treated.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum UnknownPolicy {
    #[default]
    AssumeFeasible,
    AssumeInfeasible,
}

impl UnknownPolicy {
    pub fn is_feasible(self) -> bool {
        self == UnknownPolicy::AssumeFeasible
    }
}

pub trait Solver {
    type Model: Model;

    /// Checks the conjunction of `assertions`.
    fn check(&mut self, ctx: &ExprContext, assertions: &[Expr]) -> Result<SolverResult<Self::Model>>;
}

/// Fallback used when no solver backend is available: every query is `Unknown`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSolver;

impl Solver for NoSolver {
    type Model = Assignment;

    fn check(&mut self, _ctx: &ExprContext, assertions: &[Expr]) -> Result<SolverResult<Assignment>> {
        if assertions.iter().any(|a| a.is_false()) {
            return Ok(SolverResult::Unsat);
        }
        debug!("no solver: {} assertions left unknown", assertions.len());
        Ok(SolverResult::Unknown)
    }
}

/// Signature of an uninterpreted base-read function.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FunctionDecl {
    pub region: RegionKey,
    pub domain: Vec<Sort>,
    pub range: Sort,
}

/// Symbols a backend must declare before asserting a set of formulas.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    constants: BTreeMap<Arc<str>, Sort>,
    functions: Vec<FunctionDecl>,
}

impl Declarations {
    pub fn collect<'a>(assertions: impl IntoIterator<Item = &'a Expr>) -> Self {
        let mut decls = Self::default();
        let mut visited = HashSet::new();
        let mut stack: Vec<&Expr> = assertions.into_iter().collect();
        while let Some(e) = stack.pop() {
            if !visited.insert(e.id()) {
                continue;
            }
            match e.kind() {
                ExprKind::Const { name, sort, .. } => {
                    decls.constants.insert(name.clone(), *sort);
                }
                ExprKind::Read { region, args } => {
                    if !decls.functions.iter().any(|f| &f.region == region) {
                        decls.functions.push(FunctionDecl {
                            region: region.clone(),
                            domain: args.iter().map(|a| a.sort()).collect(),
                            range: region.sort,
                        });
                    }
                }
                _ => {}
            }
            stack.extend(e.kind().children());
        }
        decls
    }

    pub fn constants(&self) -> impl Iterator<Item = (&str, Sort)> {
        self.constants.iter().map(|(n, s)| (n.as_ref(), *s))
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }
}
