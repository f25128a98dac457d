//! Predicates tracked by the analysis, per location, function, or globally.

use std::collections::{BTreeMap, BTreeSet};

use crate::cfa::{CfaNode, NodeId};
use crate::formula::Formula;

/// Where a newly discovered predicate becomes visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrecisionScope {
    /// Only at the location it was discovered at.
    #[default]
    Location,
    /// At every location of the same function.
    Function,
    /// Everywhere.
    Global,
}

/// Immutable during an exploration round; refinement builds a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precision {
    global: BTreeSet<Formula>,
    function: BTreeMap<String, BTreeSet<Formula>>,
    location: BTreeMap<NodeId, BTreeSet<Formula>>,
}

impl Precision {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Predicates tracked at `node`.
    pub fn predicates_at(&self, node: &CfaNode) -> BTreeSet<Formula> {
        let mut out = self.global.clone();
        if let Some(preds) = self.function.get(&node.function) {
            out.extend(preds.iter().cloned());
        }
        if let Some(preds) = self.location.get(&node.id) {
            out.extend(preds.iter().cloned());
        }
        out
    }

    /// Adds `predicate` with the given scope; returns whether it was new there.
    /// Constant predicates are ignored.
    pub fn add(&mut self, scope: PrecisionScope, node: &CfaNode, predicate: Formula) -> bool {
        if predicate.is_true() || predicate.is_false() {
            return false;
        }
        match scope {
            PrecisionScope::Global => self.global.insert(predicate),
            PrecisionScope::Function => self.function.entry(node.function.clone()).or_default().insert(predicate),
            PrecisionScope::Location => self.location.entry(node.id).or_default().insert(predicate),
        }
    }

    /// Total number of stored predicates, counting each scope entry.
    pub fn len(&self) -> usize {
        self.global.len()
            + self.function.values().map(BTreeSet::len).sum::<usize>()
            + self.location.values().map(BTreeSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every distinct predicate, regardless of scope.
    pub fn all_predicates(&self) -> BTreeSet<Formula> {
        let mut out = self.global.clone();
        for preds in self.function.values().chain(self.location.values()) {
            out.extend(preds.iter().cloned());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::cfa::NodeKind;
    use crate::formula::Term;

    fn node(id: usize, function: &str) -> CfaNode {
        CfaNode {
            id: NodeId(id),
            function: function.to_string(),
            kind: NodeKind::Regular,
        }
    }

    #[test]
    fn test_scopes() {
        let p = Term::var("x").less_than(Term::constant(0));
        let (a, b, c) = (node(0, "main"), node(1, "main"), node(2, "f"));

        let mut loc = Precision::empty();
        assert!(loc.add(PrecisionScope::Location, &a, p.clone()));
        assert!(!loc.add(PrecisionScope::Location, &a, p.clone()));
        assert!(loc.predicates_at(&a).contains(&p));
        assert!(loc.predicates_at(&b).is_empty());

        let mut fun = Precision::empty();
        fun.add(PrecisionScope::Function, &a, p.clone());
        assert!(fun.predicates_at(&b).contains(&p));
        assert!(fun.predicates_at(&c).is_empty());

        let mut glob = Precision::empty();
        glob.add(PrecisionScope::Global, &a, p.clone());
        assert!(glob.predicates_at(&c).contains(&p));
        assert_eq!(glob.len(), 1);
    }

    #[test]
    fn test_constants_ignored() {
        let mut prec = Precision::empty();
        assert!(!prec.add(PrecisionScope::Global, &node(0, "main"), Formula::True));
        assert!(!prec.add(PrecisionScope::Global, &node(0, "main"), Formula::False));
        assert!(prec.is_empty());
    }
}
