use std::collections::BTreeMap;

use crate::bdd::Bdd;
use crate::reference::Ref;

impl Bdd {
    /// Returns one satisfying (partial) assignment for the BDD, if any exists.
    ///
    /// Variables absent from the result are don't-cares on the chosen path.
    /// Returns `None` if the BDD represents the constant false function.
    pub fn one_sat(&self, node: Ref) -> Option<BTreeMap<u32, bool>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = BTreeMap::new();
        let mut current = node;

        // Walk down the BDD, always picking a satisfying branch.
        while !self.is_one(current) {
            let var = self.variable(current);
            let high = self.high_node(current);
            let low = self.low_node(current);

            // Prefer the low branch, so unconstrained bits come out as zero.
            if !self.is_zero(low) {
                path.insert(var, false);
                current = low;
            } else {
                path.insert(var, true);
                current = high;
            }
        }

        Some(path)
    }

    /// Evaluates the function under a total assignment.
    pub fn eval(&self, node: Ref, assignment: impl Fn(u32) -> bool) -> bool {
        let mut current = node;
        while !self.is_terminal(current) {
            current = if assignment(self.variable(current)) {
                self.high_node(current)
            } else {
                self.low_node(current)
            };
        }
        self.is_one(current)
    }
}
