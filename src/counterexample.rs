//! Concrete error paths recovered from solver models.

use std::fmt;

use log::debug;

use crate::cfa::{Cfa, EdgeId};
use crate::formula::Symbol;
use crate::solver::Model;
use crate::ssa::SsaMap;
use crate::trace::TraceFormula;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessStep {
    pub edge: EdgeId,
    /// Variables written by the step, with the value they receive.
    pub assignments: Vec<(String, i64)>,
}

/// A single feasible path through the CFA with the values it computes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counterexample {
    pub initial_values: Vec<(String, i64)>,
    pub steps: Vec<WitnessStep>,
}

impl Counterexample {
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.steps.iter().map(|s| s.edge)
    }

    /// Multi-line rendering with the CFA edges spelled out.
    pub fn describe(&self, cfa: &Cfa) -> String {
        let mut out = String::new();
        for (name, value) in &self.initial_values {
            out.push_str(&format!("  initially {} = {}\n", name, value));
        }
        for step in &self.steps {
            out.push_str(&format!("  {}", cfa.edge(step.edge)));
            write_assignments(&mut out, &step.assignments);
            out.push('\n');
        }
        out
    }
}

fn write_assignments(out: &mut String, assignments: &[(String, i64)]) {
    if assignments.is_empty() {
        return;
    }
    out.push_str("  {");
    for (i, (name, value)) in assignments.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!("{} = {}", name, value));
    }
    out.push('}');
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.initial_values {
            writeln!(f, "initially {} = {}", name, value)?;
        }
        for step in &self.steps {
            let mut line = format!("{}", step.edge);
            write_assignments(&mut line, &step.assignments);
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Evidence attached to a `FALSE` verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Witness {
    Path(Counterexample),
    /// The model could not be mapped back onto single edges.
    Raw { model: Model, reason: String },
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Witness::Path(cex) => write!(f, "{}", cex),
            Witness::Raw { model, reason } => writeln!(f, "{} ({})", model, reason),
        }
    }
}

/// Picks, for every step of `trace`, the first alternative edge that `model`
/// satisfies, and reads off the values it assigns.
///
/// Returns `None` if some step has no alternative the model satisfies.
pub fn reconstruct(trace: &TraceFormula, model: &Model, width: u32) -> Option<Counterexample> {
    let valuation = |s: &Symbol| model.get(s);

    let mut initial_values: Vec<(String, i64)> = model
        .iter()
        .filter(|(s, _)| s.index == Some(trace.initial_ssa.index(&s.name)))
        .map(|(s, v)| (s.name.clone(), v))
        .collect();
    initial_values.dedup_by(|a, b| a.0 == b.0);

    let mut steps = Vec::with_capacity(trace.len());
    let mut before: &SsaMap = &trace.initial_ssa;
    for (i, step) in trace.steps.iter().enumerate() {
        let Some(chosen) = step
            .alternatives
            .iter()
            .find(|alt| alt.formula.evaluate(&valuation, width) == Some(true))
        else {
            debug!("No alternative of step {} ({} -> {}) holds in the model", i, step.from, step.to);
            return None;
        };
        let assignments = step
            .ssa
            .iter()
            .filter(|&(name, index)| index > before.index(name))
            .filter_map(|(name, index)| model.get(&Symbol::indexed(name, index)).map(|v| (name.to_string(), v)))
            .collect();
        steps.push(WitnessStep {
            edge: chosen.edge,
            assignments,
        });
        before = &step.ssa;
    }

    Some(Counterexample { initial_values, steps })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use test_log::test;

    use super::*;
    use crate::cfa::{CfaBuilder, NodeId};
    use crate::cpa::AbstractState;
    use crate::formula::{Formula, Term};
    use crate::trace::TraceBuilder;

    #[derive(Debug, Clone, PartialEq)]
    struct At(NodeId);

    impl AbstractState for At {
        fn location(&self) -> NodeId {
            self.0
        }
    }

    /// `havoc x; if (x > 3 || x < -3) { y = x } error;`, with two parallel edges into the error node.
    fn setup() -> (Rc<Cfa>, TraceFormula, Vec<EdgeId>) {
        let mut b = CfaBuilder::new();
        let (entry, _exit) = b.function("main", &[]).unwrap();
        let mid = b.node("main").unwrap();
        let err = b.error_node("main", "p").unwrap();
        let havoc = b.havoc(entry, mid, "x").unwrap();
        let big = b.assume(mid, err, Term::var("x").greater_than(Term::constant(3)), true).unwrap();
        let small = b.assume(mid, err, Term::var("x").less_than(Term::constant(-3)), true).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let states = [At(entry), At(mid), At(err)];
        let refs: Vec<&At> = states.iter().collect();
        let trace = TraceBuilder::new(cfa.clone())
            .build(&refs, SsaMap::new(), Formula::True)
            .unwrap();
        (cfa, trace, vec![havoc, big, small])
    }

    fn model(pairs: &[(&str, u32, i64)]) -> Model {
        Model::new(
            pairs
                .iter()
                .map(|&(n, i, v)| (Symbol::indexed(n, i), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_picks_satisfied_alternative() {
        let (cfa, trace, edges) = setup();
        let cex = reconstruct(&trace, &model(&[("x", 1, 0), ("x", 2, -7)]), 8).unwrap();
        assert_eq!(cex.edges().collect::<Vec<_>>(), vec![edges[0], edges[2]]);
        assert_eq!(cex.steps[0].assignments, vec![("x".to_string(), -7)]);
        assert!(cex.steps[1].assignments.is_empty());
        assert_eq!(cex.initial_values, vec![("x".to_string(), 0)]);
        assert!(cex.describe(&cfa).contains("x := *"));
    }

    #[test]
    fn test_unsatisfied_step_gives_none() {
        let (_cfa, trace, _edges) = setup();
        assert_eq!(reconstruct(&trace, &model(&[("x", 2, 1)]), 8), None);
    }
}
