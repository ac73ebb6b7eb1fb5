//! Execution states.
//!
//! A state owns its memory and its path condition. Both are built from persistent maps, so
//! [`ExecutionState::fork`] is a constant-time clone and the two states never observe each other's
//! writes.
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::config::CoreConfig;
use crate::constraints::{NumericConstraints, PathConstraints};
use crate::error::Result;
use crate::expr::{Expr, ExprContext};
use crate::memory::Memory;
use crate::solver::{Solver, SolverResult, UnknownPolicy};

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StateId(u64);

impl StateId {
    fn fresh() -> Self {
        Self(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StateStatus {
    Active,
    /// The step budget is exhausted.
    Interrupted,
    /// The path condition is unsatisfiable.
    Infeasible,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct ExecutionState {
    id: StateId,
    parent: Option<StateId>,
    pub(crate) memory: Memory,
    pub(crate) constraints: PathConstraints,
    status: StateStatus,
    steps: u64,
    budget: Option<u64>,
    unknown_policy: UnknownPolicy,
}

impl ExecutionState {
    pub fn new(config: &CoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: StateId::fresh(),
            parent: None,
            memory: Memory::new(config.size_sort()),
            constraints: PathConstraints::new(NumericConstraints::new(config.propagation_rounds)),
            status: StateStatus::Active,
            steps: 0,
            budget: config.step_budget,
            unknown_policy: config.unknown_policy,
        })
    }

    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    pub fn status(&self) -> StateStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == StateStatus::Active
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn constraints(&self) -> &PathConstraints {
        &self.constraints
    }

    /// A copy of this state with a fresh id.
    pub fn fork(&self) -> Self {
        let child = Self {
            id: StateId::fresh(),
            parent: Some(self.id),
            ..self.clone()
        };
        debug!("fork {} from {}", child.id, self.id);
        child
    }

    /// Accounts one step. Returns `false` once the state may not continue.
    pub fn step(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.steps += 1;
        if self.budget.is_some_and(|b| self.steps > b) {
            warn!("state {} exceeded its budget of {} steps", self.id, self.steps - 1);
            self.status = StateStatus::Interrupted;
            return false;
        }
        true
    }

    /// Adds `c` to the path condition. A contradiction makes the state infeasible.
    pub fn assert(&mut self, ctx: &ExprContext, c: &Expr) {
        self.constraints.add(ctx, c);
        if self.constraints.is_contradiction() && self.is_active() {
            debug!("state {} is infeasible after {}", self.id, c);
            self.status = StateStatus::Infeasible;
        }
    }

    /// Only an active state becomes infeasible; other statuses are final.
    fn mark_infeasible(&mut self) {
        if self.is_active() {
            debug!("state {} is infeasible", self.id);
            self.status = StateStatus::Infeasible;
        }
    }

    pub fn terminate(&mut self) {
        if self.is_active() {
            self.status = StateStatus::Terminated;
        }
    }

    /// Asks `solver` whether the path condition is satisfiable and updates the status.
    ///
    /// A known contradiction is reported as `Unsat` without calling the solver. `Unknown` answers
    /// are resolved with the configured [`UnknownPolicy`].
    pub fn check_feasibility<S: Solver>(&mut self, ctx: &ExprContext, solver: &mut S) -> Result<SolverResult<S::Model>> {
        if self.constraints.is_contradiction() {
            self.mark_infeasible();
            return Ok(SolverResult::Unsat);
        }
        let assertions = self.constraints.constraints(ctx);
        let result = solver.check(ctx, &assertions)?;
        let feasible = match &result {
            SolverResult::Sat(_) => true,
            SolverResult::Unsat => false,
            SolverResult::Unknown => self.unknown_policy.is_feasible(),
        };
        if !feasible {
            self.mark_infeasible();
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::Error;
    use crate::memory::TypeTag;
    use crate::model::Assignment;
    use crate::solver::NoSolver;
    use crate::types::Sort;

    #[test]
    fn test_fork_isolation() {
        let ctx = ExprContext::new();
        let ty = TypeTag::new("int[]");
        let mut parent = ExecutionState::new(&CoreConfig::default()).unwrap();
        let a = parent.memory_mut().alloc_array(&ctx, &ty, &ctx.mk_bv(2, 32));
        let mut child = parent.fork();
        assert_eq!(child.parent(), Some(parent.id()));
        assert_ne!(child.id(), parent.id());

        let one = ctx.mk_bv(1, 32);
        child.memory_mut().write_array(&ctx, &ty, &a, &one, &one, &ctx.mk_true());
        let x = ctx.mk_const("x", Sort::bv(32));
        child.assert(&ctx, &ctx.mk_bv_slt(&x, &one));

        let key = parent.memory().array_key(&ty, Sort::bv(32));
        assert_eq!(parent.memory().read(&ctx, &key, &a, Some(&one)), ctx.mk_bv(0, 32));
        assert_eq!(child.memory().read(&ctx, &key, &a, Some(&one)), one);
        assert!(parent.constraints().constraints(&ctx).is_empty());
        assert_eq!(child.constraints().constraints(&ctx).len(), 1);
    }

    #[test]
    fn test_budget() {
        let config = CoreConfig {
            step_budget: Some(2),
            ..Default::default()
        };
        let mut state = ExecutionState::new(&config).unwrap();
        assert!(state.step());
        assert!(state.step());
        assert!(!state.step());
        assert_eq!(state.status(), StateStatus::Interrupted);
        assert!(!state.step());
        assert_eq!(state.steps(), 3);
    }

    #[test]
    fn test_contradiction_is_infeasible() {
        let ctx = ExprContext::new();
        let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
        let a = ctx.mk_symbolic_ref("a");
        let b = ctx.mk_symbolic_ref("b");
        state.assert(&ctx, &ctx.mk_not(&ctx.mk_eq(&a, &b)));
        assert!(state.is_active());
        state.assert(&ctx, &ctx.mk_eq(&a, &b));
        assert_eq!(state.status(), StateStatus::Infeasible);
        let result = state.check_feasibility(&ctx, &mut NoSolver).unwrap();
        assert!(result.is_unsat());
    }

    #[test]
    fn test_unknown_policy() {
        let ctx = ExprContext::new();
        let p = ctx.mk_const("p", Sort::Bool);

        let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
        state.assert(&ctx, &p);
        state.check_feasibility(&ctx, &mut NoSolver).unwrap();
        assert!(state.is_active());

        let config = CoreConfig {
            unknown_policy: UnknownPolicy::AssumeInfeasible,
            ..Default::default()
        };
        let mut state = ExecutionState::new(&config).unwrap();
        state.assert(&ctx, &p);
        state.check_feasibility(&ctx, &mut NoSolver).unwrap();
        assert_eq!(state.status(), StateStatus::Infeasible);
    }

    struct Always(SolverResult<Assignment>);

    impl Solver for Always {
        type Model = Assignment;

        fn check(&mut self, _ctx: &ExprContext, _assertions: &[Expr]) -> Result<SolverResult<Assignment>> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    impl Solver for Failing {
        type Model = Assignment;

        fn check(&mut self, _ctx: &ExprContext, _assertions: &[Expr]) -> Result<SolverResult<Assignment>> {
            Err(Error::Solver("backend crashed".to_string()))
        }
    }

    #[test]
    fn test_solver_answers() {
        let ctx = ExprContext::new();
        let mut state = ExecutionState::new(&CoreConfig::default()).unwrap();
        let result = state.check_feasibility(&ctx, &mut Always(SolverResult::Sat(Assignment::new()))).unwrap();
        assert!(result.model().is_some());
        assert!(state.is_active());

        assert!(matches!(state.check_feasibility(&ctx, &mut Failing), Err(Error::Solver(_))));
        assert!(state.is_active());

        state.check_feasibility(&ctx, &mut Always(SolverResult::Unsat)).unwrap();
        assert_eq!(state.status(), StateStatus::Infeasible);
    }

    #[test]
    fn test_final_status_survives_feasibility_check() {
        let ctx = ExprContext::new();
        let config = CoreConfig {
            step_budget: Some(1),
            ..Default::default()
        };
        let mut interrupted = ExecutionState::new(&config).unwrap();
        assert!(interrupted.step());
        assert!(!interrupted.step());
        let result = interrupted.check_feasibility(&ctx, &mut Always(SolverResult::Unsat)).unwrap();
        assert!(result.is_unsat());
        assert_eq!(interrupted.status(), StateStatus::Interrupted);

        let mut terminated = ExecutionState::new(&CoreConfig::default()).unwrap();
        terminated.terminate();
        let (a, b) = (ctx.mk_symbolic_ref("a"), ctx.mk_symbolic_ref("b"));
        terminated.assert(&ctx, &ctx.mk_not(&ctx.mk_eq(&a, &b)));
        terminated.assert(&ctx, &ctx.mk_eq(&a, &b));
        assert!(terminated.constraints().is_contradiction());
        terminated.check_feasibility(&ctx, &mut NoSolver).unwrap();
        assert_eq!(terminated.status(), StateStatus::Terminated);
    }

    #[test]
    fn test_invalid_config() {
        let config = CoreConfig {
            size_width: 0,
            ..Default::default()
        };
        assert!(ExecutionState::new(&config).is_err());
    }
}
