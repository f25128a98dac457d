//! Counterexample-guided abstraction refinement.
//!
//! Each round explores the program under the current precision. A target
//! state hands its ARG path to the counterexample checker: a feasible path
//! ends the run with `FALSE`, a spurious one yields interpolants that refine
//! the precision, after which the ARG is pruned back to the pivot and
//! exploration resumes. An exhausted waitlist means `TRUE`.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use log::{debug, info, warn};

use crate::cfa::{Cfa, NodeId};
use crate::config::CegarConfig;
use crate::counterexample::{reconstruct, Witness};
use crate::cpa::callstack::CallstackCpa;
use crate::cpa::composite::{Component, CompositeCpa, CompositeState};
use crate::cpa::interval::IntervalCpa;
use crate::cpa::location::LocationCpa;
use crate::cpa::predicate::PredicateCpa;
use crate::cpa::AbstractState;
use crate::error::{CegarError, CpaError, RefinementError};
use crate::interpolation::{CounterexampleChecker, CounterexampleTraceInfo};
use crate::reachability::{ReachabilityEngine, ReachabilityStatus};
use crate::refinement::PrecisionRefiner;
use crate::shutdown::{Interrupt, ShutdownNotifier};
use crate::solver::{Solver, SolverError};
use crate::ssa::SsaMap;
use crate::statistics::{Statistics, StatisticsSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No target state is reachable.
    True,
    False {
        property: String,
        /// CFA locations of the error path, entry first.
        path: Vec<NodeId>,
        witness: Witness,
    },
    Unknown {
        reason: String,
    },
}

impl Verdict {
    pub fn is_true(&self) -> bool {
        matches!(self, Verdict::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Verdict::False { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::True => write!(f, "TRUE"),
            Verdict::False { property, .. } => write!(f, "FALSE ({})", property),
            Verdict::Unknown { reason } => write!(f, "UNKNOWN ({})", reason),
        }
    }
}

pub struct Cegar {
    cfa: Rc<Cfa>,
    solver: Rc<dyn Solver>,
    config: CegarConfig,
    shutdown: ShutdownNotifier,
    stats: Rc<Statistics>,
}

impl Cegar {
    pub fn new(cfa: Rc<Cfa>, solver: Rc<dyn Solver>, config: CegarConfig) -> Self {
        let shutdown = match config.time_limit {
            Some(limit) => ShutdownNotifier::with_time_limit(limit),
            None => ShutdownNotifier::new(),
        };
        Self {
            cfa,
            solver,
            config,
            shutdown,
            stats: Rc::new(Statistics::new()),
        }
    }

    /// Replaces the notifier of the run, including any configured time limit.
    pub fn with_shutdown(mut self, shutdown: ShutdownNotifier) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn cfa(&self) -> &Rc<Cfa> {
        &self.cfa
    }

    pub fn config(&self) -> &CegarConfig {
        &self.config
    }

    pub fn shutdown(&self) -> &ShutdownNotifier {
        &self.shutdown
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.stats.snapshot()
    }

    /// Checks every property of the CFA at once.
    pub fn run(&self) -> Result<Verdict, CegarError> {
        self.run_for(None, &self.shutdown)
    }

    fn build_cpa(&self, properties: Option<&BTreeSet<String>>, shutdown: &ShutdownNotifier) -> CompositeCpa {
        let cfa = &self.cfa;
        let width = self.solver.width();
        let mut location = LocationCpa::new(cfa.clone());
        if let Some(properties) = properties {
            location = location.with_properties(properties.clone());
        }
        let mut components = vec![
            Component::Location(location),
            Component::Callstack(CallstackCpa::new(
                &cfa.main_function().name,
                self.config.max_call_depth,
                self.config.allow_recursion,
            )),
            Component::Predicate(PredicateCpa::new(
                cfa.clone(),
                self.solver.clone(),
                shutdown.clone(),
                self.stats.clone(),
            )),
        ];
        if self.config.use_intervals {
            components.push(Component::Interval(IntervalCpa::new(cfa.clone(), width)));
        }
        CompositeCpa::new(components, width)
            .with_merge(self.config.merge)
            .with_stop(self.config.stop)
    }

    fn checker(&self, shutdown: &ShutdownNotifier) -> CounterexampleChecker {
        CounterexampleChecker::new(self.cfa.clone(), self.solver.clone(), shutdown.clone(), self.stats.clone())
            .with_partition(self.config.partition)
    }

    /// Inner timeouts end only the current run; anything else ends them all.
    fn interrupted(&self, interrupt: Interrupt) -> Result<Verdict, CegarError> {
        match interrupt {
            Interrupt::InnerTimeout => {
                info!("Run stopped: {}", interrupt);
                Ok(Verdict::Unknown {
                    reason: interrupt.to_string(),
                })
            }
            _ => Err(CegarError::Interrupted(interrupt)),
        }
    }

    fn solver_failure(&self, error: SolverError) -> Result<Verdict, CegarError> {
        match error {
            SolverError::Interrupted(interrupt) => self.interrupted(interrupt),
            other => {
                warn!("Solver failure: {}", other);
                Ok(Verdict::Unknown {
                    reason: format!("solver failure: {}", other),
                })
            }
        }
    }

    fn cpa_failure(&self, error: CpaError) -> Result<Verdict, CegarError> {
        match error {
            CpaError::Solver(e) => self.solver_failure(e),
            other => Err(other.into()),
        }
    }

    /// Checks the given properties (all of them if `None`) under `shutdown`.
    pub fn run_for(
        &self,
        properties: Option<&BTreeSet<String>>,
        shutdown: &ShutdownNotifier,
    ) -> Result<Verdict, CegarError> {
        let cpa = self.build_cpa(properties, shutdown);
        let checker = self.checker(shutdown);
        let refiner = PrecisionRefiner::new(self.config.scope, self.config.restart);

        let mut engine = ReachabilityEngine::new(
            cpa,
            self.cfa.clone(),
            self.config.initial_precision.clone(),
            self.config.order,
            shutdown.clone(),
            self.stats.clone(),
        );
        if let Some(limits) = &self.config.break_on_targets {
            engine = engine.with_adjustment(Box::new(limits.clone()));
        }
        if self.config.forced_covering {
            engine = engine.with_forced_covering(Box::new(self.checker(shutdown)));
        }

        let mut refinements = 0;
        loop {
            match engine.run() {
                Ok(ReachabilityStatus::Exhausted) => {
                    info!("Program is safe after {} refinement(s)", refinements);
                    return Ok(Verdict::True);
                }
                Ok(ReachabilityStatus::Interrupted(interrupt)) => return self.interrupted(interrupt),
                Ok(ReachabilityStatus::TargetFound) => {}
                Err(e) => return self.cpa_failure(e),
            }

            let target = engine.targets()[0];
            let path = engine.arg().path_to(target);
            let states: Vec<&CompositeState> = path.iter().map(|&id| engine.arg().state(id)).collect();
            let trace = match checker
                .trace_builder()
                .build(&states, SsaMap::new(), self.config.final_axioms.clone())
            {
                Ok(trace) => trace,
                Err(e) => return self.cpa_failure(e),
            };
            debug!("Checking error path to {}:\n{}", target, trace);

            let interpolants = match checker.check_counterexample(&trace) {
                Ok(CounterexampleTraceInfo::Real { model }) => {
                    let property = states[states.len() - 1].property().unwrap_or_default().to_string();
                    info!("Property `{}` is violated", property);
                    let witness = match reconstruct(&trace, &model, self.solver.width()) {
                        Some(cex) => Witness::Path(cex),
                        None => Witness::Raw {
                            model,
                            reason: "no edge of some step is satisfied by the model".to_string(),
                        },
                    };
                    return Ok(Verdict::False {
                        property,
                        path: states.iter().map(|s| s.location()).collect(),
                        witness,
                    });
                }
                Ok(CounterexampleTraceInfo::Spurious { interpolants }) => interpolants,
                Err(e) => return self.solver_failure(e),
            };

            if refinements >= self.config.max_refinements {
                warn!("Giving up after {} refinements", refinements);
                return Ok(Verdict::Unknown {
                    reason: format!("refinement limit of {} reached", self.config.max_refinements),
                });
            }
            let result = match refiner.refine(&self.cfa, engine.arg(), &path, &interpolants, engine.precision()) {
                Ok(result) => result,
                Err(RefinementError::NoProgress) => {
                    warn!("Refinement of the path to {} added no predicate", target);
                    return Ok(Verdict::Unknown {
                        reason: RefinementError::NoProgress.to_string(),
                    });
                }
                Err(RefinementError::Cpa(e)) => return self.cpa_failure(e),
                Err(RefinementError::Solver(e)) => return self.solver_failure(e),
            };
            refinements += 1;
            self.stats.record_refinement();
            info!(
                "Refinement {}: {} new predicate(s), restarting at {}",
                refinements, result.added, result.pivot
            );
            engine.set_precision(result.precision);
            engine.prune(result.pivot);
        }
    }
}
