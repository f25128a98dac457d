//! Solver capability used by the analyses and the refiner.
//!
//! A [`Solver`] hands out [`Prover`] environments. Each environment is a
//! stack of formulas, each tagged with a [`GroupId`], that can be checked for
//! satisfiability, split into two parts for Craig interpolation, or queried
//! for a model. Environments release their resources when dropped.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::formula::{Formula, Symbol};
use crate::shutdown::{Interrupt, ShutdownNotifier};

pub mod bdd_solver;

pub use bdd_solver::BddSolver;

/// Handle of one asserted formula inside a prover environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("solver interrupted: {0}")]
    Interrupted(#[from] Interrupt),

    /// Interpolation requested for a satisfiable conjunction.
    #[error("no interpolant: the formula is satisfiable")]
    NoInterpolant,

    #[error("no model: the formula is unsatisfiable")]
    NoModel,

    #[error("unknown interpolation group {0}")]
    UnknownGroup(GroupId),

    #[error("pop on an empty assertion stack")]
    EmptyStack,

    #[error("unsupported construct: {0}")]
    Unsupported(String),
}

/// Which of the valid interpolants to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterpolationStrategy {
    /// `∃(A-local symbols). A`
    Strongest,
    /// `¬∃(B-local symbols). B`
    #[default]
    Weakest,
}

/// Satisfying assignment, one signed value per instantiated symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    values: BTreeMap<Symbol, i64>,
}

impl Model {
    pub fn new(values: BTreeMap<Symbol, i64>) -> Self {
        Self { values }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<i64> {
        self.values.get(symbol).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, i64)> {
        self.values.iter().map(|(s, &v)| (s, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (symbol, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} = {}", symbol, value)?;
        }
        write!(f, "]")
    }
}

/// Scoped solver environment.
pub trait Prover {
    /// Asserts `formula` as a new group on top of the stack.
    fn push(&mut self, formula: &Formula) -> Result<GroupId, SolverError>;

    /// Removes the most recently pushed group.
    fn pop(&mut self) -> Result<(), SolverError>;

    fn is_unsat(&mut self) -> Result<bool, SolverError>;

    /// Interpolant for `A = groups in a_part` and `B = all other groups`.
    ///
    /// The result is implied by `A`, inconsistent with `B`, and mentions only
    /// symbols occurring in both.
    fn interpolant(&mut self, a_part: &[GroupId]) -> Result<Formula, SolverError>;

    fn model(&mut self) -> Result<Model, SolverError>;
}

pub trait Solver {
    fn new_prover(&self, shutdown: &ShutdownNotifier) -> Box<dyn Prover + '_>;

    /// Bit width of the machine integers.
    fn width(&self) -> u32;

    /// Number of prover environments currently alive.
    fn live_provers(&self) -> usize;

    fn is_unsat(&self, formula: &Formula, shutdown: &ShutdownNotifier) -> Result<bool, SolverError> {
        let mut prover = self.new_prover(shutdown);
        prover.push(formula)?;
        prover.is_unsat()
    }

    fn implies(&self, a: &Formula, b: &Formula, shutdown: &ShutdownNotifier) -> Result<bool, SolverError> {
        let query = a.clone().conjoin(b.clone().negate());
        self.is_unsat(&query, shutdown)
    }
}
