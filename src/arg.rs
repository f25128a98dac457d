//! Abstract reachability graph.
//!
//! Nodes live in an arena and refer to each other by [`ArgNodeId`]. Every
//! non-root node has one designated parent, used to extract counterexample
//! paths, and possibly further parents gained through merges. Successors
//! found covered stay in the graph as covered leaves, so their parents can
//! be expanded again once a coverer disappears. Removed ids are never reused.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArgNodeId(pub usize);

impl fmt::Display for ArgNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ArgNode<S> {
    pub id: ArgNodeId,
    pub state: S,
    parent: Option<ArgNodeId>,
    other_parents: Vec<ArgNodeId>,
    children: Vec<ArgNodeId>,
    coverers: BTreeSet<ArgNodeId>,
    covering: BTreeSet<ArgNodeId>,
}

impl<S> ArgNode<S> {
    /// The designated parent; `None` for the root.
    pub fn parent(&self) -> Option<ArgNodeId> {
        self.parent
    }

    /// The designated parent followed by the parents gained through merges.
    pub fn parents(&self) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.parent.into_iter().chain(self.other_parents.iter().copied())
    }

    pub fn children(&self) -> &[ArgNodeId] {
        &self.children
    }

    /// Nodes whose states together cover this one.
    pub fn coverers(&self) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.coverers.iter().copied()
    }

    pub fn is_covered(&self) -> bool {
        !self.coverers.is_empty()
    }

    /// Nodes covered by this one.
    pub fn covering(&self) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.covering.iter().copied()
    }
}

/// Outcome of [`Arg::remove_subtree`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtreeRemoval {
    pub removed: BTreeSet<ArgNodeId>,
    /// Surviving nodes that were covered by a removed node. They are no
    /// longer covered by anything.
    pub uncovered: Vec<ArgNodeId>,
    /// Surviving parents of any removed node.
    pub parents: Vec<ArgNodeId>,
}

#[derive(Debug, Clone)]
pub struct Arg<S> {
    nodes: Vec<Option<ArgNode<S>>>,
    root: Option<ArgNodeId>,
    len: usize,
}

impl<S> Default for Arg<S> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            len: 0,
        }
    }
}

impl<S> Arg<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<ArgNodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: ArgNodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn get(&self, id: ArgNodeId) -> Option<&ArgNode<S>> {
        self.nodes.get(id.0).and_then(|n| n.as_ref())
    }

    pub fn node(&self, id: ArgNodeId) -> &ArgNode<S> {
        match self.get(id) {
            Some(node) => node,
            None => panic!("ARG node {} does not exist", id),
        }
    }

    fn node_mut(&mut self, id: ArgNodeId) -> &mut ArgNode<S> {
        match self.nodes.get_mut(id.0).and_then(|n| n.as_mut()) {
            Some(node) => node,
            None => panic!("ARG node {} does not exist", id),
        }
    }

    pub fn state(&self, id: ArgNodeId) -> &S {
        &self.node(id).state
    }

    pub fn state_mut(&mut self, id: ArgNodeId) -> &mut S {
        &mut self.node_mut(id).state
    }

    /// Live nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ArgNode<S>> {
        self.nodes.iter().flatten()
    }

    /// Adds a node below `parents`; the first one becomes the designated
    /// parent. Without parents the node becomes the root.
    pub fn add_node(&mut self, state: S, parents: &[ArgNodeId]) -> ArgNodeId {
        let id = ArgNodeId(self.nodes.len());
        for &p in parents {
            assert!(self.contains(p), "Parent {} of new node {} does not exist", p, id);
        }
        if parents.is_empty() {
            assert!(self.root.is_none(), "ARG already has a root");
            self.root = Some(id);
        }
        for &p in parents {
            self.node_mut(p).children.push(id);
        }
        self.nodes.push(Some(ArgNode {
            id,
            state,
            parent: parents.first().copied(),
            other_parents: parents.iter().skip(1).copied().collect(),
            children: Vec::new(),
            coverers: BTreeSet::new(),
            covering: BTreeSet::new(),
        }));
        self.len += 1;
        id
    }

    pub fn add_root(&mut self, state: S) -> ArgNodeId {
        self.add_node(state, &[])
    }

    pub fn add_child(&mut self, parent: ArgNodeId, state: S) -> ArgNodeId {
        self.add_node(state, &[parent])
    }

    /// Adds `by` to the coverers of `node`.
    pub fn set_covered(&mut self, node: ArgNodeId, by: ArgNodeId) {
        assert_ne!(node, by, "Node {} cannot cover itself", node);
        assert!(self.contains(by), "Covering node {} does not exist", by);
        self.node_mut(node).coverers.insert(by);
        self.node_mut(by).covering.insert(node);
    }

    /// `root` and every node reachable from it through child edges.
    pub fn subtree(&self, root: ArgNodeId) -> BTreeSet<ArgNodeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.node(id).children.iter().copied());
            }
        }
        seen
    }

    /// Removes the subtree rooted at `root`, detaching it from the rest of the graph.
    ///
    /// A surviving node covered by a removed one loses all of its coverers.
    pub fn remove_subtree(&mut self, root: ArgNodeId) -> SubtreeRemoval {
        let removed = self.subtree(root);
        let mut parents = BTreeSet::new();
        let mut uncovered = BTreeSet::new();
        for &id in &removed {
            let node = match self.nodes[id.0].take() {
                Some(node) => node,
                None => continue,
            };
            self.len -= 1;
            for p in node.parents() {
                if removed.contains(&p) {
                    continue;
                }
                parents.insert(p);
                if let Some(Some(parent)) = self.nodes.get_mut(p.0) {
                    parent.children.retain(|&c| c != id);
                }
            }
            for by in &node.coverers {
                if let Some(Some(coverer)) = self.nodes.get_mut(by.0) {
                    coverer.covering.remove(&id);
                }
            }
            uncovered.extend(node.covering.iter().copied().filter(|c| !removed.contains(c)));
        }
        for &c in &uncovered {
            let coverers = match self.nodes.get_mut(c.0) {
                Some(Some(covered)) => std::mem::take(&mut covered.coverers),
                _ => continue,
            };
            for by in coverers {
                if let Some(Some(coverer)) = self.nodes.get_mut(by.0) {
                    coverer.covering.remove(&c);
                }
            }
        }
        if self.root.map_or(false, |r| removed.contains(&r)) {
            self.root = None;
        }
        SubtreeRemoval {
            removed,
            uncovered: uncovered.into_iter().collect(),
            parents: parents.into_iter().collect(),
        }
    }

    /// Designated-parent chain from the root to `target`, root first.
    pub fn path_to(&self, target: ArgNodeId) -> Vec<ArgNodeId> {
        let mut path = vec![target];
        let mut current = target;
        while let Some(p) = self.node(current).parent {
            assert!(!path.contains(&p), "Cycle in the designated-parent chain at {}", p);
            path.push(p);
            current = p;
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_tree_and_path() {
        let mut arg = Arg::new();
        let r = arg.add_root("r");
        let a = arg.add_child(r, "a");
        let b = arg.add_child(a, "b");
        let c = arg.add_child(r, "c");
        assert_eq!(arg.len(), 4);
        assert_eq!(arg.root(), Some(r));
        assert_eq!(arg.path_to(b), vec![r, a, b]);
        assert_eq!(arg.node(r).children(), &[a, c]);
        assert_eq!(*arg.state(c), "c");
    }

    #[test]
    fn test_remove_subtree() {
        let mut arg = Arg::new();
        let r = arg.add_root(0);
        let a = arg.add_child(r, 1);
        let b = arg.add_child(a, 2);
        let c = arg.add_child(r, 3);
        let d = arg.add_child(c, 4);
        let e = arg.add_child(c, 5);
        // `d` is covered by `b` and `e` together.
        arg.set_covered(d, b);
        arg.set_covered(d, e);

        let removal = arg.remove_subtree(a);
        assert_eq!(removal.removed, BTreeSet::from([a, b]));
        assert_eq!(removal.uncovered, vec![d]);
        assert_eq!(removal.parents, vec![r]);
        assert!(!arg.contains(a));
        assert!(!arg.contains(b));
        assert!(!arg.node(d).is_covered());
        assert_eq!(arg.node(e).covering().count(), 0);
        assert_eq!(arg.node(r).children(), &[c]);
        assert_eq!(arg.node(c).children(), &[d, e]);
        assert_eq!(arg.len(), 4);

        // Ids are not reused.
        let f = arg.add_child(r, 6);
        assert_eq!(f, ArgNodeId(6));
    }

    #[test]
    fn test_remove_root() {
        let mut arg = Arg::new();
        let r = arg.add_root(());
        arg.add_child(r, ());
        let removal = arg.remove_subtree(r);
        assert_eq!(removal.removed.len(), 2);
        assert!(removal.parents.is_empty());
        assert!(arg.is_empty());
        assert_eq!(arg.root(), None);
        arg.add_root(());
        assert_eq!(arg.len(), 1);
    }

    #[test]
    fn test_merged_node_has_several_parents() {
        let mut arg = Arg::new();
        let r = arg.add_root('r');
        let a = arg.add_child(r, 'a');
        let b = arg.add_child(r, 'b');
        let m = arg.add_node('m', &[a, b]);
        assert_eq!(arg.node(m).parent(), Some(a));
        assert_eq!(arg.node(m).parents().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(arg.node(b).children(), &[m]);

        // A merged node goes with the subtree of any of its parents, and
        // its other parents are reported alongside the root's.
        let removal = arg.remove_subtree(a);
        assert_eq!(removal.removed, BTreeSet::from([a, m]));
        assert_eq!(removal.parents, vec![r, b]);
        assert!(arg.node(b).children().is_empty());
    }

    #[test]
    #[should_panic]
    fn test_missing_node_panics() {
        let arg: Arg<()> = Arg::new();
        arg.node(ArgNodeId(0));
    }
}
