use std::rc::Rc;

use test_log::test;

use cpa_rs::cegar::{Cegar, Verdict};
use cpa_rs::cfa::{is_local_to, Cfa, CfaBuilder, NodeId};
use cpa_rs::config::CegarConfig;
use cpa_rs::counterexample::Witness;
use cpa_rs::cpa::callstack::CallstackCpa;
use cpa_rs::cpa::composite::{Component, ComponentState, CompositeCpa, CompositeState};
use cpa_rs::cpa::domain::Flat;
use cpa_rs::cpa::interval::{Interval, IntervalDomain};
use cpa_rs::cpa::location::{LocationCpa, LocationState};
use cpa_rs::cpa::merge::MergeOperator;
use cpa_rs::cpa::precision::{Precision, PrecisionScope};
use cpa_rs::cpa::predicate::PredicateCpa;
use cpa_rs::formula::{Formula, Term};
use cpa_rs::interpolation::{CounterexampleChecker, CounterexampleTraceInfo, CoverageResult, InterpolationPartition};
use cpa_rs::reachability::{ReachabilityEngine, ReachabilityStatus};
use cpa_rs::reached::WaitlistOrder;
use cpa_rs::refinement::{PrecisionRefiner, RestartStrategy};
use cpa_rs::shutdown::ShutdownNotifier;
use cpa_rs::solver::{BddSolver, Solver};
use cpa_rs::ssa::SsaMap;
use cpa_rs::statistics::Statistics;

fn predicates_only() -> CegarConfig {
    CegarConfig {
        use_intervals: false,
        ..Default::default()
    }
}

fn cegar(cfa: Cfa, config: CegarConfig) -> Cegar {
    Cegar::new(Rc::new(cfa), Rc::new(BddSolver::default()), config)
}

#[test]
fn test_direct_error_edge_is_a_bug() {
    let mut b = CfaBuilder::new();
    let (entry, _exit) = b.function("main", &[]).unwrap();
    let err = b.error_node("main", "reach").unwrap();
    let edge = b.assume(entry, err, Formula::True, true).unwrap();
    let cegar = cegar(b.build("main").unwrap(), CegarConfig::default());

    let Verdict::False { property, path, witness } = cegar.run().unwrap() else {
        panic!("expected FALSE");
    };
    assert_eq!(property, "reach");
    assert_eq!(path, vec![entry, err]);
    let Witness::Path(cex) = witness else {
        panic!("expected a reconstructed path");
    };
    assert_eq!(cex.edges().collect::<Vec<_>>(), vec![edge]);
}

/// `x = 5; if (x < 0) error;`
fn guarded_by_sign() -> Cfa {
    let mut b = CfaBuilder::new();
    let (entry, exit) = b.function("main", &[]).unwrap();
    let mid = b.node("main").unwrap();
    let err = b.error_node("main", "neg").unwrap();
    b.assign(entry, mid, "x", Term::constant(5)).unwrap();
    b.assume(mid, err, Term::var("x").less_than(Term::constant(0)), true).unwrap();
    b.assume(mid, exit, Term::var("x").greater_eq(Term::constant(0)), true).unwrap();
    b.build("main").unwrap()
}

#[test]
fn test_spurious_error_converges_after_one_refinement() {
    let cegar = cegar(guarded_by_sign(), predicates_only());
    assert_eq!(cegar.run().unwrap(), Verdict::True);
    assert_eq!(cegar.statistics().refinements, 1);
}

#[test]
fn test_spurious_error_with_root_restart_and_bfs() {
    let config = CegarConfig {
        order: WaitlistOrder::Bfs,
        restart: RestartStrategy::Root,
        ..predicates_only()
    };
    let cegar = cegar(guarded_by_sign(), config);
    assert_eq!(cegar.run().unwrap(), Verdict::True);
}

/// `g = 1; f(g); if (g < 0) error;` with `f(a) { assume(a > 0); }`
fn call_and_return() -> Cfa {
    let mut b = CfaBuilder::new();
    let (m_entry, m_exit) = b.function("main", &[]).unwrap();
    let (f_entry, f_exit) = b.function("f", &["a"]).unwrap();
    let before = b.node("main").unwrap();
    let after = b.node("main").unwrap();
    let err = b.error_node("main", "neg").unwrap();
    b.assign(m_entry, before, "g", Term::constant(1)).unwrap();
    b.call(before, after, "f", vec![Term::var("g")], None).unwrap();
    b.assume(f_entry, f_exit, Term::var("f::a").greater_than(Term::constant(0)), true)
        .unwrap();
    b.branch(after, Term::var("g").less_than(Term::constant(0)), err, m_exit)
        .unwrap();
    b.build("main").unwrap()
}

/// Runs the refinement loop by hand and returns the final precision.
fn refine_to_fixpoint(cfa: Rc<Cfa>, partition: InterpolationPartition, scope: PrecisionScope) -> Precision {
    let solver: Rc<dyn Solver> = Rc::new(BddSolver::default());
    let shutdown = ShutdownNotifier::new();
    let stats = Rc::new(Statistics::new());
    let cpa = CompositeCpa::new(
        vec![
            Component::Location(LocationCpa::new(cfa.clone())),
            Component::Callstack(CallstackCpa::new("main", 8, false)),
            Component::Predicate(PredicateCpa::new(
                cfa.clone(),
                solver.clone(),
                shutdown.clone(),
                stats.clone(),
            )),
        ],
        solver.width(),
    );
    let mut engine = ReachabilityEngine::new(
        cpa,
        cfa.clone(),
        Precision::empty(),
        WaitlistOrder::Bfs,
        shutdown.clone(),
        stats.clone(),
    );
    let checker = CounterexampleChecker::new(cfa.clone(), solver, shutdown, stats).with_partition(partition);
    let refiner = PrecisionRefiner::new(scope, RestartStrategy::Pivot);

    for _ in 0..10 {
        let status = engine.run().unwrap();
        if status == ReachabilityStatus::Exhausted {
            return engine.precision().clone();
        }
        assert_eq!(status, ReachabilityStatus::TargetFound);
        let path = engine.arg().path_to(engine.targets()[0]);
        let states: Vec<&CompositeState> = path.iter().map(|&id| engine.arg().state(id)).collect();
        let trace = checker
            .trace_builder()
            .build(&states, SsaMap::new(), Formula::True)
            .unwrap();
        let CounterexampleTraceInfo::Spurious { interpolants } = checker.check_counterexample(&trace).unwrap() else {
            panic!("expected a spurious counterexample");
        };
        let refined = refiner
            .refine(&cfa, engine.arg(), &path, &interpolants, engine.precision())
            .unwrap();
        engine.set_precision(refined.precision);
        engine.prune(refined.pivot);
    }
    panic!("refinement did not converge");
}

fn leaked_into_main(cfa: &Cfa, precision: &Precision) -> Vec<Formula> {
    cfa.nodes()
        .filter(|n| n.function == "main")
        .flat_map(|n| precision.predicates_at(n))
        .filter(|p| p.variables().iter().any(|v| is_local_to(v, "f")))
        .collect()
}

#[test]
fn test_callee_locals_stay_out_of_caller_precision() {
    let cfa = Rc::new(call_and_return());

    let precision = refine_to_fixpoint(cfa.clone(), InterpolationPartition::Unscoped, PrecisionScope::Location);
    assert!(!precision.is_empty());
    assert_eq!(leaked_into_main(&cfa, &precision), vec![]);

    // Well-scoped interpolants never mention callee locals, even when shared globally.
    let precision = refine_to_fixpoint(cfa.clone(), InterpolationPartition::WellScoped, PrecisionScope::Global);
    assert!(!precision.is_empty());
    assert_eq!(leaked_into_main(&cfa, &precision), vec![]);

    // Unscoped interpolants inside the callee do.
    let precision = refine_to_fixpoint(cfa.clone(), InterpolationPartition::Unscoped, PrecisionScope::Global);
    assert!(!leaked_into_main(&cfa, &precision).is_empty());
}

#[test]
fn test_call_and_return_is_safe() {
    let cegar = cegar(call_and_return(), predicates_only());
    assert_eq!(cegar.run().unwrap(), Verdict::True);
}

fn ranged(node: NodeId, lo: i64, hi: i64) -> CompositeState {
    let domain = IntervalDomain::new(8);
    CompositeState::new(vec![
        ComponentState::Location(Flat::Value(LocationState { node, property: None })),
        ComponentState::Interval(domain.state([("x".to_string(), Interval::new(lo, hi).unwrap())])),
    ])
}

#[test]
fn test_forced_coverage_of_numeric_ranges() {
    let cfa = Rc::new(guarded_by_sign());
    let solver: Rc<dyn Solver> = Rc::new(BddSolver::default());
    let checker = CounterexampleChecker::new(
        cfa,
        solver,
        ShutdownNotifier::new(),
        Rc::new(Statistics::new()),
    );
    let mid = NodeId(2);
    let low = ranged(mid, 0, 5);
    let high = ranged(mid, 10, 20);

    assert_eq!(checker.forced_coverage(&[&low], &high).unwrap(), CoverageResult::NotCovered);
    assert!(matches!(
        checker.forced_coverage(&[&low], &low.clone()).unwrap(),
        CoverageResult::Covered { .. }
    ));
}

#[test]
fn test_forced_covering_run_is_sound() {
    let config = CegarConfig {
        forced_covering: true,
        ..CegarConfig::default()
    };
    assert_eq!(cegar(guarded_by_sign(), config.clone()).run().unwrap(), Verdict::True);
    assert!(cegar(call_and_return(), config).run().unwrap().is_true());
}

/// `havoc x; if (x < 0) y = 0; else y = 1; if (check) error;`
fn meeting_branches(check: Formula) -> Cfa {
    let mut b = CfaBuilder::new();
    let (entry, exit) = b.function("main", &[]).unwrap();
    let split = b.node("main").unwrap();
    let left = b.node("main").unwrap();
    let right = b.node("main").unwrap();
    let join = b.node("main").unwrap();
    let err = b.error_node("main", "meet").unwrap();
    b.havoc(entry, split, "x").unwrap();
    b.branch(split, Term::var("x").less_than(Term::constant(0)), left, right).unwrap();
    b.assign(left, join, "y", Term::constant(0)).unwrap();
    b.assign(right, join, "y", Term::constant(1)).unwrap();
    b.branch(join, check, err, exit).unwrap();
    b.build("main").unwrap()
}

#[test]
fn test_bug_behind_covered_branch() {
    for order in [WaitlistOrder::Dfs, WaitlistOrder::Bfs] {
        let config = CegarConfig {
            order,
            ..predicates_only()
        };
        let cegar = cegar(meeting_branches(Term::var("y").equals(Term::constant(1))), config);
        let verdict = cegar.run().unwrap();
        assert!(verdict.is_false(), "{:?}: got {}", order, verdict);
        let Verdict::False { property, .. } = verdict else {
            unreachable!()
        };
        assert_eq!(property, "meet");
    }
}

#[test]
fn test_bug_behind_merged_branch() {
    for order in [WaitlistOrder::Bfs, WaitlistOrder::Dfs] {
        let config = CegarConfig {
            order,
            merge: MergeOperator::Join,
            ..CegarConfig::default()
        };
        let cegar = cegar(meeting_branches(Term::var("x").greater_eq(Term::constant(0))), config);
        let verdict = cegar.run().unwrap();
        assert!(verdict.is_false(), "{:?}: got {}", order, verdict);
    }
}
