//! Worklist fixpoint over the ARG.
//!
//! The engine pops waiting nodes, computes their successors along every
//! leaving CFA edge and decides for each successor whether it is covered
//! (stop), absorbed into a reached state (merge), or added to the ARG.
//! Covered successors are kept as covered ARG leaves outside the reached set.
//! Target states are recorded but never expanded.

use std::collections::BTreeSet;
use std::rc::Rc;

use log::{debug, info, trace};

use crate::arg::{Arg, ArgNodeId, SubtreeRemoval};
use crate::cfa::Cfa;
use crate::cpa::adjustment::{AdjustmentAction, PrecisionAdjustment, StaticAdjustment};
use crate::cpa::merge::MergeOperator;
use crate::cpa::precision::Precision;
use crate::cpa::{AbstractState, ConfigurableProgramAnalysis, Element};
use crate::error::CpaError;
use crate::formula::Formula;
use crate::reached::{ReachedSet, WaitlistOrder};
use crate::shutdown::{Interrupt, ShutdownNotifier};
use crate::statistics::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityStatus {
    /// The waitlist ran empty without reaching a target.
    Exhausted,
    TargetFound,
    Interrupted(Interrupt),
}

/// Proves a node covered by an existing state without expanding it.
pub trait ForcedCovering<S> {
    /// `path` runs from a start node to the node to cover. Returns a fact
    /// holding at the last node if every concrete state reaching it from the
    /// abstraction of the start node lies within `candidate`.
    fn force_cover(&self, arg: &Arg<S>, path: &[ArgNodeId], candidate: ArgNodeId) -> Result<Option<Formula>, CpaError>;
}

pub struct ReachabilityEngine<C>
where
    C: ConfigurableProgramAnalysis,
    Element<C>: AbstractState,
{
    cpa: C,
    cfa: Rc<Cfa>,
    arg: Arg<Element<C>>,
    reached: ReachedSet,
    precision: Precision,
    adjustment: Box<dyn PrecisionAdjustment<Element<C>>>,
    forced_covering: Option<Box<dyn ForcedCovering<Element<C>>>>,
    shutdown: ShutdownNotifier,
    stats: Rc<Statistics>,
    targets: Vec<ArgNodeId>,
}

impl<C> ReachabilityEngine<C>
where
    C: ConfigurableProgramAnalysis,
    Element<C>: AbstractState,
{
    pub fn new(
        cpa: C,
        cfa: Rc<Cfa>,
        precision: Precision,
        order: WaitlistOrder,
        shutdown: ShutdownNotifier,
        stats: Rc<Statistics>,
    ) -> Self {
        let mut engine = Self {
            cpa,
            cfa,
            arg: Arg::new(),
            reached: ReachedSet::new(order),
            precision,
            adjustment: Box::new(StaticAdjustment),
            forced_covering: None,
            shutdown,
            stats,
            targets: Vec::new(),
        };
        engine.reset();
        engine
    }

    pub fn with_adjustment(mut self, adjustment: Box<dyn PrecisionAdjustment<Element<C>>>) -> Self {
        self.adjustment = adjustment;
        self
    }

    pub fn with_forced_covering(mut self, forced_covering: Box<dyn ForcedCovering<Element<C>>>) -> Self {
        self.forced_covering = Some(forced_covering);
        self
    }

    pub fn cpa(&self) -> &C {
        &self.cpa
    }

    pub fn cfa(&self) -> &Rc<Cfa> {
        &self.cfa
    }

    pub fn arg(&self) -> &Arg<Element<C>> {
        &self.arg
    }

    pub fn reached(&self) -> &ReachedSet {
        &self.reached
    }

    pub fn precision(&self) -> &Precision {
        &self.precision
    }

    /// Replaces the precision used for all further successor computations.
    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
    }

    /// Target nodes currently in the ARG, in discovery order.
    pub fn targets(&self) -> &[ArgNodeId] {
        &self.targets
    }

    pub fn status(&self) -> ReachabilityStatus {
        if self.targets.is_empty() {
            ReachabilityStatus::Exhausted
        } else {
            ReachabilityStatus::TargetFound
        }
    }

    /// Discards the ARG and starts over from the initial state.
    pub fn reset(&mut self) {
        self.arg = Arg::new();
        self.reached.clear();
        self.targets.clear();
        let init = self.cpa.initial_state(self.cfa.entry());
        let location = init.location();
        let root = self.arg.add_root(init);
        self.stats.record_arg_node();
        self.reached.insert(root, location);
        self.reached.enqueue(root);
    }

    /// Runs until the waitlist is empty, a precision adjustment breaks, or
    /// the run is interrupted.
    pub fn run(&mut self) -> Result<ReachabilityStatus, CpaError> {
        self.adjustment.reset();
        match self.explore() {
            Ok(status) => Ok(status),
            Err(e) => match e.interrupt() {
                Some(interrupt) => {
                    info!("Reachability interrupted inside the solver: {}", interrupt);
                    Ok(ReachabilityStatus::Interrupted(interrupt))
                }
                None => Err(e),
            },
        }
    }

    fn explore(&mut self) -> Result<ReachabilityStatus, CpaError> {
        loop {
            if let Err(interrupt) = self.shutdown.check() {
                info!("Reachability interrupted: {}", interrupt);
                return Ok(ReachabilityStatus::Interrupted(interrupt));
            }
            let Some(node) = self.reached.pop() else {
                break;
            };
            self.stats.record_iteration();

            if self.adjustment.on_iteration() == AdjustmentAction::Break {
                self.reached.enqueue(node);
                return Ok(self.status());
            }
            if self.arg.node(node).is_covered() {
                continue;
            }
            if self.try_force_cover(node)? {
                continue;
            }
            if self.expand(node)? == AdjustmentAction::Break {
                debug!("Precision adjustment stopped the exploration");
                return Ok(self.status());
            }
        }
        debug!("Waitlist empty, {} ARG nodes, {} targets", self.arg.len(), self.targets.len());
        Ok(self.status())
    }

    fn expand(&mut self, node: ArgNodeId) -> Result<AdjustmentAction, CpaError> {
        let state = self.arg.state(node).clone();
        let cfa = Rc::clone(&self.cfa);
        for edge in cfa.leaving_edges(state.location()) {
            let successors = self.cpa.successors(&state, edge, &self.precision)?;
            trace!("{}: {} successor(s) over {}", node, successors.len(), edge);
            for succ in successors {
                if !self.arg.contains(node) {
                    debug!("{} was merged away, stopping its expansion", node);
                    return Ok(AdjustmentAction::Continue);
                }
                if self.add_successor(node, succ) == AdjustmentAction::Break {
                    return Ok(AdjustmentAction::Break);
                }
            }
        }
        Ok(AdjustmentAction::Continue)
    }

    fn add_successor(&mut self, parent: ArgNodeId, succ: Element<C>) -> AdjustmentAction {
        let location = succ.location();
        let candidates: Vec<ArgNodeId> = self.reached.at_location(location).collect();

        let coverers = self.coverers(&succ, &candidates);
        if !coverers.is_empty() {
            let id = self.arg.add_child(parent, succ);
            trace!("{} at {} is covered by {:?}", id, location, coverers);
            self.stats.record_arg_node();
            self.stats.record_covered();
            for by in coverers {
                self.arg.set_covered(id, by);
            }
            return AdjustmentAction::Continue;
        }

        if self.cpa.merge_operator() != MergeOperator::Sep {
            for id in candidates {
                if !self.arg.contains(id) || self.arg.state(id).is_target() {
                    continue;
                }
                let reached_state = self.arg.state(id);
                let merged = self.cpa.merge(&succ, reached_state);
                if &merged != reached_state {
                    return self.replace_merged(parent, id, merged);
                }
            }
        }

        self.admit(succ, &[parent])
    }

    /// Reached nodes covering `state`: one of them if it suffices alone,
    /// otherwise all candidates. Empty if `state` is not covered.
    fn coverers(&self, state: &Element<C>, candidates: &[ArgNodeId]) -> Vec<ArgNodeId> {
        let states: Vec<&Element<C>> = candidates.iter().map(|&id| self.arg.state(id)).collect();
        if !self.cpa.stop(state, &states) {
            return Vec::new();
        }
        match candidates
            .iter()
            .zip(&states)
            .find(|(_, reached)| self.cpa.stop(state, &[**reached]))
        {
            Some((&id, _)) => vec![id],
            None => candidates.to_vec(),
        }
    }

    /// Replaces `old` by a node holding `merged`, reached from `old`'s parents and `parent`.
    fn replace_merged(&mut self, parent: ArgNodeId, old: ArgNodeId, merged: Element<C>) -> AdjustmentAction {
        self.stats.record_merge();
        let mut parents: Vec<ArgNodeId> = self.arg.node(old).parents().collect();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
        let removal = self.remove_subtree(old);
        debug!("Merged into {}, dropping {} node(s)", old, removal.removed.len());
        parents.retain(|&p| self.arg.contains(p));
        for &p in &removal.parents {
            if !parents.contains(&p) {
                self.reached.enqueue(p);
            }
        }
        if parents.is_empty() {
            debug!("{} vanished with the merged subtree", parent);
            return AdjustmentAction::Continue;
        }
        self.admit(merged, &parents)
    }

    fn admit(&mut self, state: Element<C>, parents: &[ArgNodeId]) -> AdjustmentAction {
        let (state, action) = self.adjustment.adjust(state, &self.precision);
        let location = state.location();
        let is_target = state.is_target();
        let id = self.arg.add_node(state, parents);
        self.stats.record_arg_node();
        self.reached.insert(id, location);
        if is_target {
            debug!("Target {} reached at {}", id, location);
            self.stats.record_target();
            self.targets.push(id);
        } else {
            self.reached.enqueue(id);
        }
        action
    }

    /// Removes the subtree of `root`. Nodes that lose a coverer go as well,
    /// so that re-expanding their parents recomputes them. The returned
    /// parents are the surviving parents of everything removed.
    fn remove_subtree(&mut self, root: ArgNodeId) -> SubtreeRemoval {
        let mut removed = BTreeSet::new();
        let mut uncovered = Vec::new();
        let mut parents = BTreeSet::new();
        let mut pending = vec![root];
        while let Some(next) = pending.pop() {
            if !self.arg.contains(next) {
                continue;
            }
            let removal = self.arg.remove_subtree(next);
            for &id in &removal.removed {
                self.reached.remove(id);
            }
            self.targets.retain(|t| !removal.removed.contains(t));
            for &id in &removal.uncovered {
                trace!("{} lost its coverer", id);
            }
            removed.extend(removal.removed);
            uncovered.extend(removal.uncovered.iter().copied());
            pending.extend(removal.uncovered);
            parents.extend(removal.parents);
        }
        SubtreeRemoval {
            removed,
            uncovered,
            parents: parents.into_iter().filter(|&p| self.arg.contains(p)).collect(),
        }
    }

    /// Removes the subtree of `pivot` and schedules the surviving parents of
    /// every removed node for re-expansion. Pruning the root restarts from
    /// the initial state.
    pub fn prune(&mut self, pivot: ArgNodeId) {
        if self.arg.root() == Some(pivot) {
            debug!("Restarting from the initial state");
            self.reset();
            return;
        }
        let removal = self.remove_subtree(pivot);
        debug!(
            "Pruned {} node(s) below {}, re-expanding {:?}",
            removal.removed.len(),
            pivot,
            removal.parents
        );
        for p in removal.parents {
            self.reached.enqueue(p);
        }
    }

    fn try_force_cover(&mut self, node: ArgNodeId) -> Result<bool, CpaError> {
        let Some(checker) = self.forced_covering.as_ref() else {
            return Ok(false);
        };
        let state = self.arg.state(node);
        let start = self.arg.node(node).parent().unwrap_or(node);
        let path = if start == node { vec![node] } else { vec![start, node] };
        let candidates: Vec<ArgNodeId> = self
            .reached
            .at_location(state.location())
            .filter(|&c| {
                c < node
                    && !self.arg.node(c).is_covered()
                    && !self.arg.state(c).is_target()
                    && self.arg.state(c).call_stack() == state.call_stack()
            })
            .collect();

        for candidate in candidates {
            if let Some(fact) = checker.force_cover(&self.arg, &path, candidate)? {
                debug!("{} is covered by {}", node, candidate);
                self.arg.set_covered(node, candidate);
                self.arg.state_mut(node).strengthen_abstraction(fact);
                self.stats.record_forced_covering();
                self.stats.record_covered();
                return Ok(true);
            }
        }
        Ok(false)
    }
}
