//! Reduced ordered BDD manager backing the bit-blasting solver.
//!
//! All operations go through the [`Bdd`] manager, which owns the unique table
//! (hash consing) and the computed table for `ite`. Nodes are addressed by
//! lightweight [`Ref`] handles with complement edges: the `high` child of a
//! stored node is never complemented, which keeps the representation canonical.
//!
//! Variables are 1-indexed (0 is reserved for the terminal), and a smaller
//! index means closer to the root.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Debug;

use log::trace;

use crate::reference::Ref;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

pub struct Bdd {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    cache: RefCell<HashMap<(Ref, Ref, Ref), Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Bdd {
    pub fn new() -> Self {
        let one = Ref::positive(1);
        // Slot 0 is unused, slot 1 is the terminal.
        let terminal = Node {
            variable: 0,
            low: one,
            high: one,
        };
        Self {
            nodes: RefCell::new(vec![terminal, terminal]),
            unique: RefCell::new(HashMap::new()),
            cache: RefCell::new(HashMap::new()),
            zero: -one,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new()
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bdd")
            .field("nodes", &self.num_nodes())
            .field("cache", &self.cache.borrow().len())
            .finish()
    }
}

impl Bdd {
    /// Number of allocated non-terminal nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len() - 2
    }

    pub fn variable(&self, node: Ref) -> u32 {
        self.nodes.borrow()[node.index() as usize].variable
    }

    /// Position of the node in the variable order; terminals sink to the bottom.
    fn level(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.variable(node)
        }
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.nodes.borrow()[node.index() as usize].low;
        if node.is_negated() {
            -low
        } else {
            low
        }
    }

    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.nodes.borrow()[node.index() as usize].high;
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }

    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }

    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        if low == high {
            return low;
        }

        // Restore canonicity: the high edge is always regular.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        debug_assert!(v < self.level(low) && v < self.level(high));

        let node = Node {
            variable: v,
            low,
            high,
        };
        if let Some(&index) = self.unique.borrow().get(&node) {
            return Ref::positive(index);
        }

        let index = {
            let mut nodes = self.nodes.borrow_mut();
            let index = nodes.len();
            assert!(index < i32::MAX as usize, "BDD node table overflow");
            nodes.push(node);
            index as u32
        };
        self.unique.borrow_mut().insert(node, index);
        Ref::positive(index)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.mk_node(v, self.zero, self.one)
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || self.variable(node) != v {
            return (node, node);
        }
        (self.low_node(node), self.high_node(node))
    }

    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        trace!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Terminal cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,G,~F) => ite(F,G,1)
        let g2 = if g == f {
            self.one
        } else if g == -f {
            self.zero
        } else {
            g
        };
        let h2 = if h == f {
            self.zero
        } else if h == -f {
            self.one
        } else {
            h
        };
        if g2 != g || h2 != h {
            return self.apply_ite(f, g2, h2);
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };
        // ite(F,~G,H) => ~ite(F,G,~H)
        let (g, h, negate) = if g.is_negated() {
            (-g, -h, true)
        } else {
            (g, h, false)
        };

        let key = (f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return if negate { -res } else { res };
        }

        let m = self.level(f).min(self.level(g)).min(self.level(h));
        assert_ne!(m, u32::MAX);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);
        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if negate {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        self.is_zero(self.apply_and(f, -g))
    }

    /// Existential quantification `∃vars. f`.
    pub fn exists(&self, f: Ref, vars: &BTreeSet<u32>) -> Ref {
        if vars.is_empty() {
            return f;
        }
        let mut cache = HashMap::new();
        self.exists_(f, vars, &mut cache)
    }

    fn exists_(&self, f: Ref, vars: &BTreeSet<u32>, cache: &mut HashMap<Ref, Ref>) -> Ref {
        if self.is_terminal(f) {
            return f;
        }

        let v = self.variable(f);
        if vars.range(v..).next().is_none() {
            // No quantified variable at or below this node.
            return f;
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let low = self.exists_(self.low_node(f), vars, cache);
        let high = self.exists_(self.high_node(f), vars, cache);
        let res = if vars.contains(&v) {
            self.apply_or(low, high)
        } else {
            self.mk_node(v, low, high)
        };
        cache.insert(f, res);
        res
    }

    /// Universal quantification `∀vars. f`.
    pub fn forall(&self, f: Ref, vars: &BTreeSet<u32>) -> Ref {
        -self.exists(-f, vars)
    }

    /// Variables the function depends on.
    pub fn support(&self, f: Ref) -> BTreeSet<u32> {
        let mut vars = BTreeSet::new();
        let mut seen = HashSet::new();
        let mut stack = vec![f];
        while let Some(node) = stack.pop() {
            if self.is_terminal(node) || !seen.insert(node.index()) {
                continue;
            }
            vars.insert(self.variable(node));
            stack.push(self.low_node(node));
            stack.push(self.high_node(node));
        }
        vars
    }

    /// Number of distinct non-terminal nodes reachable from `f`.
    pub fn size(&self, f: Ref) -> usize {
        let mut seen = HashSet::new();
        let mut stack = vec![f];
        while let Some(node) = stack.pop() {
            if self.is_terminal(node) || !seen.insert(node.index()) {
                continue;
            }
            stack.push(self.low_node(node));
            stack.push(self.high_node(node));
        }
        seen.len()
    }
}
