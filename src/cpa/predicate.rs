//! Cartesian predicate abstraction with single-edge blocks.
//!
//! A state is a set of literals over the predicates of the precision. The
//! successor across an edge keeps every predicate (or its negation) of the
//! successor location that is implied by `abstraction ∧ edge`.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

use super::composite::ComponentState;
use super::domain::AbstractDomain;
use super::precision::Precision;
use super::{ConfigurableProgramAnalysis, Element};
use crate::cfa::{Cfa, CfaEdge, NodeId};
use crate::error::CpaError;
use crate::formula::Formula;
use crate::pathformula::PathFormulaManager;
use crate::shutdown::ShutdownNotifier;
use crate::solver::{Prover, Solver, SolverError};
use crate::ssa::SsaMap;
use crate::statistics::Statistics;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PredicateState {
    /// `(predicate, polarity)` pairs known to hold.
    literals: BTreeSet<(Formula, bool)>,
    bottom: bool,
}

impl PredicateState {
    pub fn from_literals(literals: impl IntoIterator<Item = (Formula, bool)>) -> Self {
        let literals: BTreeSet<(Formula, bool)> = literals.into_iter().collect();
        let bottom = literals.iter().any(|(p, t)| literals.contains(&(p.clone(), !t)));
        if bottom {
            Self {
                literals: BTreeSet::new(),
                bottom,
            }
        } else {
            Self { literals, bottom }
        }
    }

    pub fn literals(&self) -> impl Iterator<Item = &(Formula, bool)> {
        self.literals.iter()
    }

    pub fn is_bottom(&self) -> bool {
        self.bottom
    }

    pub fn abstraction(&self) -> Formula {
        if self.bottom {
            return Formula::False;
        }
        Formula::and(self.literals.iter().map(|(p, truth)| {
            if *truth {
                p.clone()
            } else {
                p.clone().negate()
            }
        }))
    }

    pub fn add_literal(&mut self, predicate: Formula, truth: bool) {
        if self.bottom || predicate.is_true() {
            return;
        }
        if predicate.is_false() || self.literals.contains(&(predicate.clone(), !truth)) {
            *self = PredicateDomain.bottom();
            return;
        }
        self.literals.insert((predicate, truth));
    }
}

impl fmt::Display for PredicateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abstraction())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateDomain;

impl AbstractDomain for PredicateDomain {
    type Element = PredicateState;

    fn bottom(&self) -> PredicateState {
        PredicateState {
            literals: BTreeSet::new(),
            bottom: true,
        }
    }

    fn top(&self) -> PredicateState {
        PredicateState::default()
    }

    fn is_bottom(&self, elem: &PredicateState) -> bool {
        elem.bottom
    }

    fn is_top(&self, elem: &PredicateState) -> bool {
        !elem.bottom && elem.literals.is_empty()
    }

    /// More literals means fewer concrete states.
    fn le(&self, elem1: &PredicateState, elem2: &PredicateState) -> bool {
        elem1.bottom || (!elem2.bottom && elem1.literals.is_superset(&elem2.literals))
    }

    fn join(&self, elem1: &PredicateState, elem2: &PredicateState) -> PredicateState {
        match (elem1.bottom, elem2.bottom) {
            (true, _) => elem2.clone(),
            (_, true) => elem1.clone(),
            _ => PredicateState {
                literals: elem1.literals.intersection(&elem2.literals).cloned().collect(),
                bottom: false,
            },
        }
    }

    fn meet(&self, elem1: &PredicateState, elem2: &PredicateState) -> PredicateState {
        if elem1.bottom || elem2.bottom {
            return self.bottom();
        }
        PredicateState::from_literals(elem1.literals.union(&elem2.literals).cloned())
    }
}

pub struct PredicateCpa {
    cfa: Rc<Cfa>,
    pfm: PathFormulaManager,
    solver: Rc<dyn Solver>,
    shutdown: ShutdownNotifier,
    stats: Rc<Statistics>,
    domain: PredicateDomain,
}

impl fmt::Debug for PredicateCpa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateCpa").field("width", &self.solver.width()).finish()
    }
}

impl PredicateCpa {
    pub fn new(cfa: Rc<Cfa>, solver: Rc<dyn Solver>, shutdown: ShutdownNotifier, stats: Rc<Statistics>) -> Self {
        Self {
            pfm: PathFormulaManager::new(cfa.clone()),
            cfa,
            solver,
            shutdown,
            stats,
            domain: PredicateDomain,
        }
    }

    fn check(&self, prover: &mut dyn Prover) -> Result<bool, SolverError> {
        self.stats.time_solver(|| prover.is_unsat())
    }

    /// Abstract post; `None` if the edge is infeasible under the abstraction.
    fn post(&self, state: &PredicateState, edge: &CfaEdge, precision: &Precision) -> Result<Option<PredicateState>, CpaError> {
        let start = SsaMap::new();
        let step = self.pfm.edge_formula(edge, &start)?;
        let block = state.abstraction().instantiate(&start).conjoin(step.formula);

        let mut prover = self.solver.new_prover(&self.shutdown);
        prover.push(&block)?;
        if self.check(prover.as_mut())? {
            trace!("edge {} infeasible from {}", edge, state);
            return Ok(None);
        }

        let mut next = PredicateState::default();
        for predicate in precision.predicates_at(self.cfa.node(edge.successor)) {
            let instantiated = predicate.instantiate(&step.ssa);
            for truth in [true, false] {
                // The literal holds if its negation is inconsistent with the block.
                let negation = if truth {
                    instantiated.clone().negate()
                } else {
                    instantiated.clone()
                };
                prover.push(&negation)?;
                let implied = self.check(prover.as_mut())?;
                prover.pop()?;
                if implied {
                    next.add_literal(predicate.clone(), truth);
                    break;
                }
            }
        }
        if next.bottom {
            return Ok(None);
        }
        Ok(Some(next))
    }
}

impl ConfigurableProgramAnalysis for PredicateCpa {
    type Domain = PredicateDomain;

    fn domain(&self) -> &Self::Domain {
        &self.domain
    }

    fn initial_state(&self, _node: NodeId) -> PredicateState {
        PredicateState::default()
    }

    fn successors(
        &self,
        state: &Element<Self>,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Result<Vec<Element<Self>>, CpaError> {
        if state.bottom {
            return Ok(Vec::new());
        }
        let next = self.post(state, edge, precision)?;
        Ok(next.into_iter().collect())
    }

    /// Drops the state if a sibling interval state contradicts it.
    fn strengthen(&self, state: &PredicateState, siblings: &[ComponentState]) -> Result<Option<PredicateState>, CpaError> {
        if state.literals.is_empty() {
            return Ok(Some(state.clone()));
        }
        for sibling in siblings {
            if let ComponentState::Interval(intervals) = sibling {
                let bounds = intervals.to_formula();
                if bounds.is_true() {
                    continue;
                }
                let query = state.abstraction().conjoin(bounds).instantiate(&SsaMap::new());
                let contradicts = self.stats.time_solver(|| self.solver.is_unsat(&query, &self.shutdown))?;
                if contradicts {
                    debug!("predicate state {} contradicts intervals {}", state, intervals);
                    return Ok(None);
                }
            }
        }
        Ok(Some(state.clone()))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::CfaBuilder;
    use crate::cpa::domain::tests::test_lattice_axioms;
    use crate::cpa::precision::PrecisionScope;
    use crate::formula::Term;
    use crate::solver::BddSolver;

    fn neg_x() -> Formula {
        Term::var("x").less_than(Term::constant(0))
    }

    #[test]
    fn test_lattice() {
        let p = neg_x();
        let q = Term::var("y").equals(Term::constant(1));
        let samples = [
            PredicateDomain.bottom(),
            PredicateDomain.top(),
            PredicateState::from_literals([(p.clone(), true)]),
            PredicateState::from_literals([(p.clone(), false)]),
            PredicateState::from_literals([(p.clone(), true), (q.clone(), true)]),
            PredicateState::from_literals([(q, false)]),
        ];
        test_lattice_axioms(&PredicateDomain, &samples);
    }

    #[test]
    fn test_contradictory_literals_are_bottom() {
        let p = neg_x();
        let s = PredicateState::from_literals([(p.clone(), true), (p.clone(), false)]);
        assert!(s.is_bottom());
        assert_eq!(s.abstraction(), Formula::False);

        let mut t = PredicateState::default();
        t.add_literal(p.clone(), true);
        t.add_literal(p, false);
        assert!(t.is_bottom());
    }

    #[test]
    fn test_post_tracks_predicates() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        let mid = b.node("main").unwrap();
        let err = b.error_node("main", "neg").unwrap();
        let init = b.declare(entry, mid, "x", Some(Term::constant(5))).unwrap();
        let (to_err, _) = b.branch(mid, neg_x(), err, exit).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());

        let solver: Rc<dyn Solver> = Rc::new(BddSolver::default());
        let cpa = PredicateCpa::new(cfa.clone(), solver.clone(), ShutdownNotifier::new(), Rc::new(Statistics::new()));

        let mut prec = Precision::empty();
        prec.add(PrecisionScope::Location, cfa.node(mid), neg_x());

        let s0 = cpa.initial_state(entry);
        let s1 = cpa.successors(&s0, cfa.edge(init), &prec).unwrap();
        assert_eq!(s1, vec![PredicateState::from_literals([(neg_x(), false)])]);

        // x < 0 contradicts !(x < 0).
        assert!(cpa.successors(&s1[0], cfa.edge(to_err), &prec).unwrap().is_empty());
        // Without the predicate nothing is known and the edge stays feasible.
        let loose = cpa.successors(&s0, cfa.edge(init), &Precision::empty()).unwrap();
        assert_eq!(cpa.successors(&loose[0], cfa.edge(to_err), &prec).unwrap().len(), 1);
        assert_eq!(solver.live_provers(), 0);
    }
}
