//! Precision refinement from interpolants.

use std::collections::BTreeSet;

use log::debug;

use crate::arg::{Arg, ArgNodeId};
use crate::cfa::Cfa;
use crate::cpa::precision::{Precision, PrecisionScope};
use crate::cpa::AbstractState;
use crate::error::RefinementError;
use crate::formula::Formula;

/// Where exploration restarts after a refinement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestartStrategy {
    /// The earliest path node whose precision changed (lazy abstraction).
    #[default]
    Pivot,
    /// The root of the ARG.
    Root,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementResult {
    pub precision: Precision,
    pub pivot: ArgNodeId,
    /// Number of predicates that were not tracked before.
    pub added: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrecisionRefiner {
    pub scope: PrecisionScope,
    pub restart: RestartStrategy,
}

/// Top-level conjuncts of an interpolant.
fn atoms(interpolant: &Formula) -> Vec<Formula> {
    match interpolant {
        Formula::And(parts) => parts.clone(),
        other => vec![other.clone()],
    }
}

impl PrecisionRefiner {
    pub fn new(scope: PrecisionScope, restart: RestartStrategy) -> Self {
        Self { scope, restart }
    }

    /// Adds the interpolant of every path node to a copy of `precision`.
    ///
    /// Fails with [`RefinementError::NoProgress`] if nothing new is tracked
    /// anywhere along the path.
    pub fn refine<S: AbstractState>(
        &self,
        cfa: &Cfa,
        arg: &Arg<S>,
        path: &[ArgNodeId],
        interpolants: &[Formula],
        precision: &Precision,
    ) -> Result<RefinementResult, RefinementError> {
        assert_eq!(
            path.len(),
            interpolants.len(),
            "Need exactly one interpolant per path node"
        );
        let nodes: Vec<_> = path.iter().map(|&id| cfa.node(arg.state(id).location())).collect();

        let mut refined = precision.clone();
        let mut added = 0;
        for (node, interpolant) in nodes.iter().zip(interpolants) {
            for atom in atoms(interpolant) {
                if refined.add(self.scope, node, atom) {
                    added += 1;
                }
            }
        }

        let changed = |i: usize| {
            let before: BTreeSet<Formula> = precision.predicates_at(nodes[i]);
            before != refined.predicates_at(nodes[i])
        };
        let Some(first_changed) = (0..path.len()).find(|&i| changed(i)) else {
            return Err(RefinementError::NoProgress);
        };
        let pivot = match self.restart {
            RestartStrategy::Pivot => path[first_changed],
            RestartStrategy::Root => path[0],
        };
        debug!(
            "Refined precision: {} new predicate(s), pivot {} at {}",
            added, pivot, nodes[first_changed].id
        );
        Ok(RefinementResult {
            precision: refined,
            pivot,
            added,
        })
    }
}
