//! # cpa-rs: Configurable Program Analysis with CEGAR
//!
//! **`cpa-rs`** decides whether an error location of a program, given as a
//! control-flow automaton (CFA), is reachable. It answers `TRUE` (safe),
//! `FALSE` (with a concrete error path) or `UNKNOWN` (with a reason).
//!
//! ## How it works
//!
//! - **Configurable program analyses**: abstract domains, transfer relations and
//!   merge/stop operators for locations, call stacks, predicates and intervals,
//!   combined positionally into a [`CompositeCpa`][crate::cpa::composite::CompositeCpa].
//! - **Reachability**: a worklist fixpoint grows an [abstract reachability graph][crate::arg::Arg]
//!   until the waitlist is empty or a target state shows up.
//! - **CEGAR**: an error path is turned into an SSA trace formula; if it is
//!   infeasible, Craig interpolants become new predicates, the ARG is pruned
//!   back and exploration resumes.
//! - **Solver**: formulas over machine integers are bit-blasted into the
//!   built-in BDD manager, which also computes exact interpolants.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use cpa_rs::cegar::{Cegar, Verdict};
//! use cpa_rs::cfa::CfaBuilder;
//! use cpa_rs::config::CegarConfig;
//! use cpa_rs::formula::Term;
//! use cpa_rs::solver::BddSolver;
//!
//! // x = 5; if (x < 0) error;
//! let mut b = CfaBuilder::new();
//! let (entry, exit) = b.function("main", &[]).unwrap();
//! let mid = b.node("main").unwrap();
//! let err = b.error_node("main", "negative").unwrap();
//! b.assign(entry, mid, "x", Term::constant(5)).unwrap();
//! b.branch(mid, Term::var("x").less_than(Term::constant(0)), err, exit).unwrap();
//! let cfa = Rc::new(b.build("main").unwrap());
//!
//! let cegar = Cegar::new(cfa, Rc::new(BddSolver::default()), CegarConfig::default());
//! assert_eq!(cegar.run().unwrap(), Verdict::True);
//! ```
//!
//! ## Core Components
//!
//! - **[`cegar`]**: the refinement loop and its verdicts.
//! - **[`reachability`]**: the fixpoint engine over the ARG.
//! - **[`interpolation`]**: counterexample checking, interpolants and forced coverage.
//! - **[`multiproperty`]**: checking many properties, partition by partition.
//! - **[`bdd`]**: the BDD manager backing the [`solver`].
//! - **[`dot`]**: ARG visualisation using Graphviz.

pub mod arg;
pub mod bdd;
pub mod bitvec;
pub mod cegar;
pub mod cfa;
pub mod config;
pub mod counterexample;
pub mod cpa;
pub mod dot;
pub mod error;
pub mod formula;
pub mod interpolation;
pub mod multiproperty;
pub mod pathformula;
pub mod reachability;
pub mod reached;
pub mod reference;
pub mod refinement;
pub mod sat;
pub mod shutdown;
pub mod solver;
pub mod ssa;
pub mod statistics;
pub mod trace;
