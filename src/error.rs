//! Error types of the analysis layers.

use thiserror::Error;

use crate::cfa::{EdgeId, NodeId};
use crate::shutdown::Interrupt;
use crate::solver::SolverError;

/// Malformed control-flow automaton.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CfaError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{0}` is defined twice")]
    DuplicateFunction(String),

    /// A call passes the wrong number of arguments.
    #[error("call to `{callee}` passes {given} arguments, expected {expected}")]
    ArityMismatch {
        callee: String,
        expected: usize,
        given: usize,
    },

    #[error("node {node} belongs to `{actual}`, expected `{expected}`")]
    ForeignNode {
        node: NodeId,
        expected: String,
        actual: String,
    },
}

/// Failure of a transfer relation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpaError {
    /// The edge carries an operation no analysis models.
    #[error("unrecognized edge {edge}: {description}")]
    UnrecognizedEdge { edge: EdgeId, description: String },

    #[error("recursive call to `{function}` is not supported")]
    UnsupportedRecursion { function: String },

    #[error("call stack depth limit {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl CpaError {
    /// The interrupt behind this error, if the solver was cancelled.
    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            CpaError::Solver(SolverError::Interrupted(i)) => Some(*i),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefinementError {
    /// None of the interpolants adds a predicate.
    #[error("refinement did not add any new predicate")]
    NoProgress,

    #[error(transparent)]
    Cpa(#[from] CpaError),

    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Errors that abort a whole verification run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CegarError {
    #[error(transparent)]
    Cpa(#[from] CpaError),

    #[error("analysis interrupted: {0}")]
    Interrupted(#[from] Interrupt),
}
