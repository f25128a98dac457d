//! Trace formulas of abstract paths.
//!
//! An abstract path is a sequence of states; between two consecutive states
//! there may be several CFA edges (e.g. parallel assume edges, or return
//! edges to different call sites). Each step becomes the disjunction of its
//! alternatives over a common SSA map, so step `i` starts where step `i-1`
//! ended.

use std::fmt;
use std::rc::Rc;

use log::trace;

use crate::cfa::{Cfa, CfaEdge, EdgeId, EdgeKind, NodeId};
use crate::cpa::callstack::{CallFrame, CallStack};
use crate::cpa::AbstractState;
use crate::error::CpaError;
use crate::formula::Formula;
use crate::pathformula::PathFormulaManager;
use crate::ssa::SsaMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Intraprocedural,
    /// Enters a function.
    Call,
    /// Leaves a function.
    Return,
}

/// One CFA edge realising a step, with its formula already lifted to the
/// SSA map at the end of the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub edge: EdgeId,
    pub formula: Formula,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStep {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: StepKind,
    pub alternatives: Vec<Alternative>,
    /// Disjunction of the alternatives.
    pub formula: Formula,
    /// SSA map at the end of the step.
    pub ssa: SsaMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFormula {
    pub initial_ssa: SsaMap,
    pub steps: Vec<TraceStep>,
    /// Conjoined onto the last group only.
    pub final_axioms: Formula,
}

impl TraceFormula {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn final_ssa(&self) -> &SsaMap {
        self.steps.last().map_or(&self.initial_ssa, |s| &s.ssa)
    }

    /// One formula per step, in path order.
    pub fn groups(&self) -> Vec<Formula> {
        let mut groups: Vec<Formula> = self.steps.iter().map(|s| s.formula.clone()).collect();
        if !self.final_axioms.is_true() {
            match groups.last_mut() {
                Some(last) => *last = last.clone().conjoin(self.final_axioms.clone()),
                None => groups.push(self.final_axioms.clone()),
            }
        }
        groups
    }

    pub fn formula(&self) -> Formula {
        Formula::and(self.groups())
    }
}

impl fmt::Display for TraceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, group) in self.groups().iter().enumerate() {
            writeln!(f, "{:>3}: {}", i, group)?;
        }
        Ok(())
    }
}

fn top_frame<S: AbstractState>(state: &S) -> Option<&CallFrame> {
    state.call_stack().and_then(CallStack::top)
}

/// Whether `edge` can connect `from` and `to` given their call stacks.
fn matches_context<S: AbstractState>(edge: &CfaEdge, from: &S, to: &S) -> bool {
    match &edge.kind {
        EdgeKind::FunctionCall { return_node, .. } => top_frame(to)
            .map_or(true, |frame| frame.call_node == edge.predecessor && frame.return_node == *return_node),
        EdgeKind::FunctionReturn { call_node, .. } => top_frame(from)
            .map_or(true, |frame| frame.call_node == *call_node && frame.return_node == edge.successor),
        _ => true,
    }
}

#[derive(Debug, Clone)]
pub struct TraceBuilder {
    cfa: Rc<Cfa>,
    pfm: PathFormulaManager,
}

impl TraceBuilder {
    pub fn new(cfa: Rc<Cfa>) -> Self {
        Self {
            pfm: PathFormulaManager::new(cfa.clone()),
            cfa,
        }
    }

    pub fn cfa(&self) -> &Rc<Cfa> {
        &self.cfa
    }

    /// Formula of the step from `from` to `to`, starting at `ssa`.
    ///
    /// Panics if no CFA edge connects the two states.
    pub fn step<S: AbstractState>(&self, from: &S, to: &S, ssa: &SsaMap) -> Result<TraceStep, CpaError> {
        let (a, b) = (from.location(), to.location());
        let edges: Vec<&CfaEdge> = self
            .cfa
            .edges_between(a, b)
            .filter(|e| matches_context(*e, from, to))
            .collect();
        assert!(!edges.is_empty(), "No CFA edge connects {} and {} on the path", a, b);

        let kind = match edges[0].kind {
            EdgeKind::FunctionCall { .. } => StepKind::Call,
            EdgeKind::FunctionReturn { .. } => StepKind::Return,
            _ => StepKind::Intraprocedural,
        };

        let mut parts = Vec::with_capacity(edges.len());
        for edge in &edges {
            parts.push((edge.id, self.pfm.edge_formula(edge, ssa)?));
        }
        let merged = SsaMap::merge_all(parts.iter().map(|(_, pf)| &pf.ssa));
        let alternatives: Vec<Alternative> = parts
            .into_iter()
            .map(|(edge, pf)| Alternative {
                edge,
                formula: pf.formula.conjoin(pf.ssa.equalities_to(&merged)),
            })
            .collect();
        let formula = Formula::or(alternatives.iter().map(|alt| alt.formula.clone()));
        trace!("step {} -> {}: {}", a, b, formula);

        Ok(TraceStep {
            from: a,
            to: b,
            kind,
            alternatives,
            formula,
            ssa: merged,
        })
    }

    /// Trace formula of `path`, one step per consecutive pair of states.
    pub fn build<S: AbstractState>(
        &self,
        path: &[&S],
        initial_ssa: SsaMap,
        final_axioms: Formula,
    ) -> Result<TraceFormula, CpaError> {
        let mut steps: Vec<TraceStep> = Vec::with_capacity(path.len().saturating_sub(1));
        for pair in path.windows(2) {
            let ssa = steps.last().map_or(&initial_ssa, |s| &s.ssa);
            let step = self.step(pair[0], pair[1], ssa)?;
            steps.push(step);
        }
        Ok(TraceFormula {
            initial_ssa,
            steps,
            final_axioms,
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::CfaBuilder;
    use crate::formula::{Symbol, Term};

    #[derive(Debug, Clone, PartialEq)]
    struct At(NodeId, Option<CallStack>);

    impl AbstractState for At {
        fn location(&self) -> NodeId {
            self.0
        }

        fn call_stack(&self) -> Option<&CallStack> {
            self.1.as_ref()
        }
    }

    #[test]
    fn test_parallel_edges_are_disjoined() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        let err = b.error_node("main", "p").unwrap();
        b.assign(entry, exit, "y", Term::constant(0)).unwrap();
        b.assume(exit, err, Term::var("x").less_than(Term::constant(0)), true).unwrap();
        b.assign(exit, err, "x", Term::constant(7)).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let builder = TraceBuilder::new(cfa);

        let path = [At(entry, None), At(exit, None), At(err, None)];
        let refs: Vec<&At> = path.iter().collect();
        let tf = builder.build(&refs, SsaMap::new(), Formula::True).unwrap();
        assert_eq!(tf.len(), 2);
        assert_eq!(tf.steps[0].ssa.index("y"), 2);

        let last = &tf.steps[1];
        assert_eq!(last.alternatives.len(), 2);
        assert_eq!(last.ssa.index("x"), 2);
        // The assume branch is lifted to x@2 = x@1.
        let x = |i| Term::Var(Symbol::indexed("x", i));
        assert_eq!(
            last.alternatives[0].formula,
            Formula::and([x(1).less_than(Term::constant(0)), x(2).equals(x(1))])
        );
        assert_eq!(tf.groups().len(), 2);
    }

    #[test]
    fn test_final_axioms_on_last_group() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        b.blank(entry, exit).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let builder = TraceBuilder::new(cfa);
        let path = [At(entry, None), At(exit, None)];
        let axiom = Term::var("g").equals(Term::constant(1));
        let tf = builder
            .build(&[&path[0], &path[1]], SsaMap::new(), axiom.clone())
            .unwrap();
        assert_eq!(tf.groups(), vec![axiom]);
        assert_eq!(tf.final_ssa(), &SsaMap::new());
    }

    #[test]
    fn test_return_follows_call_stack() {
        let mut b = CfaBuilder::new();
        let (m_entry, m_exit) = b.function("main", &[]).unwrap();
        let (f_entry, f_exit) = b.function("f", &[]).unwrap();
        let mid = b.node("main").unwrap();
        b.blank(f_entry, f_exit).unwrap();
        b.call(m_entry, mid, "f", vec![], None).unwrap();
        b.call(mid, m_exit, "f", vec![], None).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let builder = TraceBuilder::new(cfa);

        let frame = |call_node, return_node| {
            Some(CallStack::new().push(CallFrame {
                function: "f".to_string(),
                call_node,
                return_node,
            }))
        };
        let empty = Some(CallStack::new());
        let path = [
            At(mid, empty.clone()),
            At(f_entry, frame(mid, m_exit)),
            At(f_exit, frame(mid, m_exit)),
            At(m_exit, empty),
        ];
        let refs: Vec<&At> = path.iter().collect();
        let tf = builder.build(&refs, SsaMap::new(), Formula::True).unwrap();
        let kinds: Vec<StepKind> = tf.steps.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![StepKind::Call, StepKind::Intraprocedural, StepKind::Return]);
        // Only the return to the second call site matches.
        assert_eq!(tf.steps[2].alternatives.len(), 1);
    }

    #[test]
    #[should_panic]
    fn test_disconnected_path_panics() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let builder = TraceBuilder::new(cfa);
        let path = [At(entry, None), At(exit, None)];
        let _ = builder.build(&[&path[0], &path[1]], SsaMap::new(), Formula::True);
    }
}
