//! SSA-indexed formulas of CFA edges and paths.

use std::rc::Rc;

use crate::cfa::{Cfa, CfaEdge, EdgeKind};
use crate::error::CpaError;
use crate::formula::{Formula, Symbol, Term};
use crate::ssa::SsaMap;

/// A formula together with the SSA map reached at its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFormula {
    pub formula: Formula,
    pub ssa: SsaMap,
}

#[derive(Debug, Clone)]
pub struct PathFormulaManager {
    cfa: Rc<Cfa>,
}

impl PathFormulaManager {
    pub fn new(cfa: Rc<Cfa>) -> Self {
        Self { cfa }
    }

    fn assign(ssa: &mut SsaMap, variable: &str, value: Term) -> Formula {
        let index = ssa.fresh(variable);
        Term::Var(Symbol::indexed(variable, index)).equals(value)
    }

    /// Formula of a single edge, starting from `ssa`.
    pub fn edge_formula(&self, edge: &CfaEdge, ssa: &SsaMap) -> Result<PathFormula, CpaError> {
        let mut ssa = ssa.clone();
        let formula = match &edge.kind {
            EdgeKind::Blank => Formula::True,
            EdgeKind::Assume { condition, truth } => {
                let condition = condition.instantiate(&ssa);
                if *truth {
                    condition
                } else {
                    condition.negate()
                }
            }
            EdgeKind::Assignment { variable, value } => {
                let value = value.instantiate(&ssa);
                Self::assign(&mut ssa, variable, value)
            }
            EdgeKind::Havoc { variable } => {
                ssa.fresh(variable);
                Formula::True
            }
            EdgeKind::Declaration { variable, initializer } => match initializer {
                Some(init) => {
                    let value = init.instantiate(&ssa);
                    Self::assign(&mut ssa, variable, value)
                }
                None => {
                    ssa.fresh(variable);
                    Formula::True
                }
            },
            EdgeKind::FunctionCall { callee, arguments, .. } => {
                let def = self.cfa.function(callee).ok_or_else(|| CpaError::UnrecognizedEdge {
                    edge: edge.id,
                    description: format!("call to unknown function `{}`", callee),
                })?;
                // Arguments are evaluated before any parameter is bound.
                let values: Vec<Term> = arguments.iter().map(|a| a.instantiate(&ssa)).collect();
                let mut parts = Vec::with_capacity(values.len());
                for (param, value) in def.parameters.iter().zip(values) {
                    parts.push(Self::assign(&mut ssa, param, value));
                }
                Formula::and(parts)
            }
            EdgeKind::FunctionReturn { callee, result, .. } => match result {
                Some(variable) => {
                    let retval = crate::cfa::return_variable(callee);
                    let value = Term::Var(Symbol::indexed(retval.as_str(), ssa.index(&retval)));
                    Self::assign(&mut ssa, variable, value)
                }
                None => Formula::True,
            },
            EdgeKind::Unsupported { statement } => {
                return Err(CpaError::UnrecognizedEdge {
                    edge: edge.id,
                    description: statement.clone(),
                })
            }
        };
        Ok(PathFormula { formula, ssa })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::CfaBuilder;

    fn sym(name: &str, index: u32) -> Term {
        Term::Var(Symbol::indexed(name, index))
    }

    #[test]
    fn test_assignment_and_assume() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        let mid = b.node("main").unwrap();
        let e1 = b.assign(entry, mid, "x", Term::var("x").add(Term::constant(1))).unwrap();
        let e2 = b.assume(mid, exit, Term::var("x").less_than(Term::constant(3)), false).unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let pfm = PathFormulaManager::new(cfa.clone());

        let p1 = pfm.edge_formula(cfa.edge(e1), &SsaMap::new()).unwrap();
        assert_eq!(p1.formula, sym("x", 2).equals(sym("x", 1).add(Term::constant(1))));
        assert_eq!(p1.ssa.index("x"), 2);

        let p2 = pfm.edge_formula(cfa.edge(e2), &p1.ssa).unwrap();
        assert_eq!(p2.formula, sym("x", 2).greater_eq(Term::constant(3)));
        assert_eq!(p2.ssa, p1.ssa);
    }

    #[test]
    fn test_call_and_return_binding() {
        let mut b = CfaBuilder::new();
        let (m_entry, m_exit) = b.function("main", &[]).unwrap();
        b.function("f", &["a"]).unwrap();
        let (call, ret) = b
            .call(m_entry, m_exit, "f", vec![Term::var("g")], Some("main::r"))
            .unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let pfm = PathFormulaManager::new(cfa.clone());

        let p = pfm.edge_formula(cfa.edge(call), &SsaMap::new()).unwrap();
        assert_eq!(p.formula, sym("f::a", 2).equals(sym("g", 1)));
        let p = pfm.edge_formula(cfa.edge(ret), &p.ssa).unwrap();
        assert_eq!(p.ssa.index("main::r"), 2);
        assert!(p.formula.symbols().contains(&Symbol::indexed("f::__retval__", 1)));
    }

    #[test]
    fn test_unsupported() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        let e = b.unsupported(entry, exit, "*p = 1").unwrap();
        let cfa = Rc::new(b.build("main").unwrap());
        let pfm = PathFormulaManager::new(cfa.clone());
        assert!(matches!(
            pfm.edge_formula(cfa.edge(e), &SsaMap::new()),
            Err(CpaError::UnrecognizedEdge { .. })
        ));
    }
}
