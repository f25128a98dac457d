//! Precision adjustment: the last say on a successor before it is added.

use super::precision::Precision;
use super::AbstractState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentAction {
    Continue,
    /// Halt the reachability engine after this state.
    Break,
}

pub trait PrecisionAdjustment<S: AbstractState> {
    /// Called once at the start of every exploration round.
    fn reset(&mut self) {}

    /// Called on every worklist pop.
    fn on_iteration(&mut self) -> AdjustmentAction {
        AdjustmentAction::Continue
    }

    /// May replace the successor state and decide whether to go on.
    fn adjust(&mut self, state: S, precision: &Precision) -> (S, AdjustmentAction);
}

/// Leaves states unchanged and stops at the first target state.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticAdjustment;

impl<S: AbstractState> PrecisionAdjustment<S> for StaticAdjustment {
    fn adjust(&mut self, state: S, _precision: &Precision) -> (S, AdjustmentAction) {
        let action = if state.is_target() {
            AdjustmentAction::Break
        } else {
            AdjustmentAction::Continue
        };
        (state, action)
    }
}

/// Keeps exploring after target states until `max_targets` were found or
/// `extra_iterations` worklist pops happened since the first one.
#[derive(Debug, Clone)]
pub struct BreakOnTargets {
    pub max_targets: usize,
    pub extra_iterations: usize,
    found: usize,
    since_first: usize,
}

impl BreakOnTargets {
    pub fn new(max_targets: usize, extra_iterations: usize) -> Self {
        assert!(max_targets > 0, "At least one target must be allowed");
        Self {
            max_targets,
            extra_iterations,
            found: 0,
            since_first: 0,
        }
    }

    pub fn targets_found(&self) -> usize {
        self.found
    }
}

impl<S: AbstractState> PrecisionAdjustment<S> for BreakOnTargets {
    fn reset(&mut self) {
        self.found = 0;
        self.since_first = 0;
    }

    fn on_iteration(&mut self) -> AdjustmentAction {
        if self.found == 0 {
            return AdjustmentAction::Continue;
        }
        self.since_first += 1;
        if self.since_first > self.extra_iterations {
            log::debug!("{} iterations since the first target, breaking", self.since_first - 1);
            AdjustmentAction::Break
        } else {
            AdjustmentAction::Continue
        }
    }

    fn adjust(&mut self, state: S, _precision: &Precision) -> (S, AdjustmentAction) {
        if !state.is_target() {
            return (state, AdjustmentAction::Continue);
        }
        self.found += 1;
        if self.found >= self.max_targets {
            log::debug!("found {} target states, breaking", self.found);
            (state, AdjustmentAction::Break)
        } else {
            (state, AdjustmentAction::Continue)
        }
    }
}
