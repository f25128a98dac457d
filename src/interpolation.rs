//! Counterexample checking and Craig interpolation.
//!
//! A trace formula is asserted group by group. If the conjunction is
//! unsatisfiable the counterexample is spurious and every inner path node
//! receives the interpolant between the groups before it and the groups
//! after it, with SSA indices stripped. Otherwise the solver model is a
//! witness of the error.

use std::rc::Rc;

use log::{debug, trace};

use crate::arg::{Arg, ArgNodeId};
use crate::cfa::Cfa;
use crate::cpa::AbstractState;
use crate::error::CpaError;
use crate::formula::Formula;
use crate::reachability::ForcedCovering;
use crate::shutdown::ShutdownNotifier;
use crate::solver::{GroupId, Model, Prover, Solver, SolverError};
use crate::ssa::SsaMap;
use crate::statistics::Statistics;
use crate::trace::{StepKind, TraceBuilder, TraceFormula};

/// Where the A-part of each interpolation query starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterpolationPartition {
    /// Always at the beginning of the trace.
    #[default]
    Unscoped,
    /// At the entry of the innermost function active at the split point.
    WellScoped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterexampleTraceInfo {
    /// One predicate per path node: `true` for the first, `false` for the last.
    Spurious { interpolants: Vec<Formula> },
    Real { model: Model },
}

impl CounterexampleTraceInfo {
    pub fn is_spurious(&self) -> bool {
        matches!(self, CounterexampleTraceInfo::Spurious { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageResult {
    /// One fact per path node; the last one implies the covering abstraction.
    Covered { interpolants: Vec<Formula> },
    NotCovered,
}

pub struct CounterexampleChecker {
    builder: TraceBuilder,
    solver: Rc<dyn Solver>,
    shutdown: ShutdownNotifier,
    stats: Rc<Statistics>,
    partition: InterpolationPartition,
}

impl CounterexampleChecker {
    pub fn new(cfa: Rc<Cfa>, solver: Rc<dyn Solver>, shutdown: ShutdownNotifier, stats: Rc<Statistics>) -> Self {
        Self {
            builder: TraceBuilder::new(cfa),
            solver,
            shutdown,
            stats,
            partition: InterpolationPartition::default(),
        }
    }

    pub fn with_partition(mut self, partition: InterpolationPartition) -> Self {
        self.partition = partition;
        self
    }

    pub fn partition(&self) -> InterpolationPartition {
        self.partition
    }

    pub fn trace_builder(&self) -> &TraceBuilder {
        &self.builder
    }

    fn push_all(&self, prover: &mut dyn Prover, groups: &[Formula]) -> Result<Vec<GroupId>, SolverError> {
        groups.iter().map(|g| prover.push(g)).collect()
    }

    /// Decides whether the path described by `trace` is feasible.
    pub fn check_counterexample(&self, trace: &TraceFormula) -> Result<CounterexampleTraceInfo, SolverError> {
        let groups = trace.groups();
        let mut prover = self.solver.new_prover(&self.shutdown);
        let ids = self.push_all(prover.as_mut(), &groups)?;

        if !self.stats.time_solver(|| prover.is_unsat())? {
            let model = self.stats.time_solver(|| prover.model())?;
            debug!("Counterexample is feasible");
            return Ok(CounterexampleTraceInfo::Real { model });
        }

        let nodes = trace.len() + 1;
        if nodes == 1 {
            return Ok(CounterexampleTraceInfo::Spurious {
                interpolants: vec![Formula::False],
            });
        }

        let mut interpolants = Vec::with_capacity(nodes);
        interpolants.push(Formula::True);
        let mut entries: Vec<usize> = Vec::new();
        for i in 1..nodes - 1 {
            // Step `i - 1` leads into node `i`.
            let start = match self.partition {
                InterpolationPartition::Unscoped => 0,
                InterpolationPartition::WellScoped => {
                    match trace.steps[i - 1].kind {
                        StepKind::Call => entries.push(i - 1),
                        StepKind::Return => {
                            entries.pop();
                        }
                        StepKind::Intraprocedural => {}
                    }
                    entries.last().copied().unwrap_or(0)
                }
            };
            let a_part = &ids[start..i];
            let interpolant = self.stats.time_solver(|| prover.interpolant(a_part))?;
            trace!("Interpolant at node {} (A = groups {}..{}): {}", i, start, i, interpolant);
            interpolants.push(interpolant.uninstantiate());
        }
        interpolants.push(Formula::False);
        debug!("Counterexample is spurious");
        Ok(CounterexampleTraceInfo::Spurious { interpolants })
    }

    /// Checks whether every concrete state reaching the end of `path` from the
    /// abstraction of its first state lies within the abstraction of `covering`.
    pub fn forced_coverage<S: AbstractState>(&self, path: &[&S], covering: &S) -> Result<CoverageResult, CpaError> {
        assert!(!path.is_empty(), "Forced coverage needs a non-empty path");
        let trace = self.builder.build(path, SsaMap::new(), Formula::True)?;

        let mut groups = Vec::with_capacity(trace.len() + 2);
        groups.push(path[0].abstraction().instantiate(&trace.initial_ssa));
        groups.extend(trace.steps.iter().map(|s| s.formula.clone()));
        groups.push(covering.abstraction().instantiate(trace.final_ssa()).negate());

        let mut prover = self.solver.new_prover(&self.shutdown);
        let ids = self.push_all(prover.as_mut(), &groups)?;
        if !self.stats.time_solver(|| prover.is_unsat())? {
            return Ok(CoverageResult::NotCovered);
        }

        let mut interpolants = Vec::with_capacity(path.len());
        for k in 0..path.len() {
            let a_part = &ids[..=k];
            let interpolant = self.stats.time_solver(|| prover.interpolant(a_part))?;
            interpolants.push(interpolant.uninstantiate());
        }
        Ok(CoverageResult::Covered { interpolants })
    }
}

impl<S: AbstractState> ForcedCovering<S> for CounterexampleChecker {
    fn force_cover(&self, arg: &Arg<S>, path: &[ArgNodeId], candidate: ArgNodeId) -> Result<Option<Formula>, CpaError> {
        let states: Vec<&S> = path.iter().map(|&id| arg.state(id)).collect();
        match self.forced_coverage(&states, arg.state(candidate))? {
            CoverageResult::Covered { mut interpolants } => Ok(interpolants.pop()),
            CoverageResult::NotCovered => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::{CfaBuilder, NodeId};
    use crate::formula::{Symbol, Term};
    use crate::solver::BddSolver;

    #[derive(Debug, Clone, PartialEq)]
    struct At(NodeId, Formula);

    impl AbstractState for At {
        fn location(&self) -> NodeId {
            self.0
        }

        fn abstraction(&self) -> Formula {
            self.1.clone()
        }
    }

    fn at(node: NodeId) -> At {
        At(node, Formula::True)
    }

    fn checker(cfa: &Rc<Cfa>, solver: &Rc<BddSolver>) -> CounterexampleChecker {
        let solver: Rc<dyn Solver> = solver.clone();
        CounterexampleChecker::new(cfa.clone(), solver, ShutdownNotifier::new(), Rc::new(Statistics::new()))
    }

    /// `x = init; if (x < 0) error;`
    fn guarded(init: i64, bad: Formula) -> (Rc<Cfa>, Vec<NodeId>) {
        let mut b = CfaBuilder::new();
        let (entry, _exit) = b.function("main", &[]).unwrap();
        let mid = b.node("main").unwrap();
        let err = b.error_node("main", "neg").unwrap();
        b.declare(entry, mid, "x", Some(Term::constant(init))).unwrap();
        b.assume(mid, err, bad, true).unwrap();
        (Rc::new(b.build("main").unwrap()), vec![entry, mid, err])
    }

    fn path_trace(checker: &CounterexampleChecker, nodes: &[NodeId]) -> TraceFormula {
        let states: Vec<At> = nodes.iter().map(|&n| at(n)).collect();
        let refs: Vec<&At> = states.iter().collect();
        checker.trace_builder().build(&refs, SsaMap::new(), Formula::True).unwrap()
    }

    #[test]
    fn test_spurious_interpolants_are_valid() {
        let (cfa, nodes) = guarded(5, Term::var("x").less_than(Term::constant(0)));
        let solver = Rc::new(BddSolver::default());
        let checker = checker(&cfa, &solver);
        let trace = path_trace(&checker, &nodes);

        let CounterexampleTraceInfo::Spurious { interpolants } = checker.check_counterexample(&trace).unwrap() else {
            panic!("expected a spurious counterexample");
        };
        assert_eq!(interpolants.len(), 3);
        assert_eq!(interpolants[0], Formula::True);
        assert_eq!(interpolants[2], Formula::False);

        // A => I and I && B unsat, with I pinned to the SSA map after the prefix.
        let groups = trace.groups();
        let itp = interpolants[1].instantiate(&trace.steps[0].ssa);
        let shutdown = ShutdownNotifier::new();
        assert!(solver.implies(&groups[0], &itp, &shutdown).unwrap());
        assert!(solver.is_unsat(&itp.clone().conjoin(groups[1].clone()), &shutdown).unwrap());
        assert!(itp.symbols().iter().all(|s| s == &Symbol::indexed("x", 2)) || itp.symbols().is_empty());
        assert_eq!(solver.live_provers(), 0);
    }

    #[test]
    fn test_feasible_counterexample_has_model() {
        let (cfa, nodes) = guarded(5, Term::var("x").greater_than(Term::constant(0)));
        let solver = Rc::new(BddSolver::default());
        let checker = checker(&cfa, &solver);
        let trace = path_trace(&checker, &nodes);
        match checker.check_counterexample(&trace).unwrap() {
            CounterexampleTraceInfo::Real { model } => {
                assert_eq!(model.get(&Symbol::indexed("x", 2)), Some(5));
            }
            other => panic!("expected a real counterexample, got {:?}", other),
        }
    }

    /// `g = 1; f(g); if (g < 0) error;` where `f(a) { assume(a > 0); }`
    fn call_and_return() -> (Rc<Cfa>, Vec<NodeId>) {
        let mut b = CfaBuilder::new();
        let (m_entry, _m_exit) = b.function("main", &[]).unwrap();
        let (f_entry, f_exit) = b.function("f", &["a"]).unwrap();
        let before = b.node("main").unwrap();
        let after = b.node("main").unwrap();
        let err = b.error_node("main", "neg").unwrap();
        b.assign(m_entry, before, "g", Term::constant(1)).unwrap();
        b.call(before, after, "f", vec![Term::var("g")], None).unwrap();
        b.assume(f_entry, f_exit, Term::var("f::a").greater_than(Term::constant(0)), true)
            .unwrap();
        b.assume(after, err, Term::var("g").less_than(Term::constant(0)), true).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        (cfa, vec![m_entry, before, f_entry, f_exit, after, err])
    }

    #[test]
    fn test_well_scoped_keeps_callee_trivial() {
        let (cfa, nodes) = call_and_return();
        let solver = Rc::new(BddSolver::default());

        let unscoped = checker(&cfa, &solver);
        let trace = path_trace(&unscoped, &nodes);
        let CounterexampleTraceInfo::Spurious { interpolants } = unscoped.check_counterexample(&trace).unwrap() else {
            panic!("expected a spurious counterexample");
        };
        assert_eq!(interpolants.len(), nodes.len());
        assert!(interpolants[2].variables().contains("g"));

        let scoped = checker(&cfa, &solver).with_partition(InterpolationPartition::WellScoped);
        let CounterexampleTraceInfo::Spurious { interpolants } = scoped.check_counterexample(&trace).unwrap() else {
            panic!("expected a spurious counterexample");
        };
        // Inside the callee the A-part is just the callee's own steps.
        assert_eq!(interpolants[2], Formula::True);
        assert_eq!(interpolants[3], Formula::True);
        assert!(!interpolants[4].variables().contains("f::a"));
        assert_eq!(interpolants[5], Formula::False);
    }

    #[test]
    fn test_forced_coverage() {
        let (cfa, nodes) = guarded(5, Term::var("x").less_than(Term::constant(0)));
        let solver = Rc::new(BddSolver::default());
        let checker = checker(&cfa, &solver);
        let range = |lo: i64, hi: i64| {
            Formula::and([
                Term::var("x").greater_eq(Term::constant(lo)),
                Term::var("x").less_eq(Term::constant(hi)),
            ])
        };
        let low = At(nodes[1], range(0, 5));
        let high = At(nodes[1], range(10, 20));
        assert_eq!(checker.forced_coverage(&[&low], &high).unwrap(), CoverageResult::NotCovered);
        assert!(matches!(
            checker.forced_coverage(&[&low], &low.clone()).unwrap(),
            CoverageResult::Covered { .. }
        ));

        // Along an edge: from the entry, `x = 5` always lands in [0, 5].
        let start = at(nodes[0]);
        let CoverageResult::Covered { interpolants } = checker.forced_coverage(&[&start, &at(nodes[1])], &low).unwrap()
        else {
            panic!("expected coverage");
        };
        assert_eq!(interpolants.len(), 2);
        assert_eq!(interpolants[0], Formula::True);
    }
}
