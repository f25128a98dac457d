//! Read-only counters for external reporting.

use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

/// Live counters, shared by the components of one analysis run.
#[derive(Debug, Default)]
pub struct Statistics {
    iterations: Cell<u64>,
    arg_nodes: Cell<u64>,
    covered: Cell<u64>,
    merges: Cell<u64>,
    targets: Cell<u64>,
    refinements: Cell<u64>,
    forced_coverings: Cell<u64>,
    solver_queries: Cell<u64>,
    solver_time: Cell<Duration>,
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub iterations: u64,
    pub arg_nodes: u64,
    pub covered: u64,
    pub merges: u64,
    pub targets: u64,
    pub refinements: u64,
    pub forced_coverings: u64,
    pub solver_queries: u64,
    pub solver_time: Duration,
}

fn bump(cell: &Cell<u64>) {
    cell.set(cell.get() + 1);
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            iterations: self.iterations.get(),
            arg_nodes: self.arg_nodes.get(),
            covered: self.covered.get(),
            merges: self.merges.get(),
            targets: self.targets.get(),
            refinements: self.refinements.get(),
            forced_coverings: self.forced_coverings.get(),
            solver_queries: self.solver_queries.get(),
            solver_time: self.solver_time.get(),
        }
    }

    pub(crate) fn record_iteration(&self) {
        bump(&self.iterations);
    }

    pub(crate) fn record_arg_node(&self) {
        bump(&self.arg_nodes);
    }

    pub(crate) fn record_covered(&self) {
        bump(&self.covered);
    }

    pub(crate) fn record_merge(&self) {
        bump(&self.merges);
    }

    pub(crate) fn record_target(&self) {
        bump(&self.targets);
    }

    pub(crate) fn record_refinement(&self) {
        bump(&self.refinements);
    }

    pub(crate) fn record_forced_covering(&self) {
        bump(&self.forced_coverings);
    }

    /// Runs one solver query, counting it and its wall time.
    pub(crate) fn time_solver<T>(&self, query: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let res = query();
        bump(&self.solver_queries);
        self.solver_time.set(self.solver_time.get() + start.elapsed());
        res
    }
}

impl fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iterations:       {}", self.iterations)?;
        writeln!(f, "ARG nodes:        {}", self.arg_nodes)?;
        writeln!(f, "covered:          {}", self.covered)?;
        writeln!(f, "merges:           {}", self.merges)?;
        writeln!(f, "targets:          {}", self.targets)?;
        writeln!(f, "refinements:      {}", self.refinements)?;
        writeln!(f, "forced coverings: {}", self.forced_coverings)?;
        writeln!(f, "solver queries:   {}", self.solver_queries)?;
        write!(f, "solver time:      {:.3}s", self.solver_time.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = Statistics::new();
        stats.record_iteration();
        stats.record_iteration();
        stats.record_refinement();
        let answer = stats.time_solver(|| 42);
        assert_eq!(answer, 42);

        let snap = stats.snapshot();
        assert_eq!(snap.iterations, 2);
        assert_eq!(snap.refinements, 1);
        assert_eq!(snap.solver_queries, 1);
        assert_eq!(snap.arg_nodes, 0);
        assert!(snap.to_string().contains("refinements:      1"));
    }
}
