//! Reached set and waitlist.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::arg::ArgNodeId;
use crate::cfa::NodeId;

/// Order in which waiting nodes are expanded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WaitlistOrder {
    Bfs,
    #[default]
    Dfs,
}

/// All reached ARG nodes, indexed by CFA location, plus the nodes still
/// waiting to be expanded.
#[derive(Debug, Clone, Default)]
pub struct ReachedSet {
    order: WaitlistOrder,
    locations: BTreeMap<ArgNodeId, NodeId>,
    by_location: BTreeMap<NodeId, BTreeSet<ArgNodeId>>,
    waitlist: VecDeque<ArgNodeId>,
    waiting: BTreeSet<ArgNodeId>,
}

impl ReachedSet {
    pub fn new(order: WaitlistOrder) -> Self {
        Self {
            order,
            ..Default::default()
        }
    }

    pub fn order(&self) -> WaitlistOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, id: ArgNodeId) -> bool {
        self.locations.contains_key(&id)
    }

    /// Adds a node to the reached set without scheduling it.
    pub fn insert(&mut self, id: ArgNodeId, location: NodeId) {
        self.locations.insert(id, location);
        self.by_location.entry(location).or_default().insert(id);
    }

    /// Schedules a reached node for expansion; no-op if it already waits.
    pub fn enqueue(&mut self, id: ArgNodeId) {
        assert!(self.contains(id), "Node {} is not reached", id);
        if self.waiting.insert(id) {
            self.waitlist.push_back(id);
        }
    }

    pub fn remove(&mut self, id: ArgNodeId) {
        if let Some(location) = self.locations.remove(&id) {
            if let Some(ids) = self.by_location.get_mut(&location) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_location.remove(&location);
                }
            }
        }
        if self.waiting.remove(&id) {
            self.waitlist.retain(|&w| w != id);
        }
    }

    pub fn pop(&mut self) -> Option<ArgNodeId> {
        let id = match self.order {
            WaitlistOrder::Bfs => self.waitlist.pop_front(),
            WaitlistOrder::Dfs => self.waitlist.pop_back(),
        }?;
        self.waiting.remove(&id);
        Some(id)
    }

    pub fn has_waiting(&self) -> bool {
        !self.waitlist.is_empty()
    }

    pub fn waiting(&self) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.waitlist.iter().copied()
    }

    /// Reached nodes at `location`, oldest first.
    pub fn at_location(&self, location: NodeId) -> impl Iterator<Item = ArgNodeId> + '_ {
        self.by_location.get(&location).into_iter().flatten().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArgNodeId, NodeId)> + '_ {
        self.locations.iter().map(|(&id, &loc)| (id, loc))
    }

    pub fn clear(&mut self) {
        *self = Self::new(self.order);
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn filled(order: WaitlistOrder) -> ReachedSet {
        let mut reached = ReachedSet::new(order);
        for i in 0..3 {
            reached.insert(ArgNodeId(i), NodeId(i % 2));
            reached.enqueue(ArgNodeId(i));
        }
        reached
    }

    #[test]
    fn test_orders() {
        let mut bfs = filled(WaitlistOrder::Bfs);
        assert_eq!(bfs.pop(), Some(ArgNodeId(0)));
        let mut dfs = filled(WaitlistOrder::Dfs);
        assert_eq!(dfs.pop(), Some(ArgNodeId(2)));
        // Popped nodes stay reached.
        assert!(dfs.contains(ArgNodeId(2)));
        assert_eq!(dfs.len(), 3);
    }

    #[test]
    fn test_location_index_and_removal() {
        let mut reached = filled(WaitlistOrder::Bfs);
        assert_eq!(
            reached.at_location(NodeId(0)).collect::<Vec<_>>(),
            vec![ArgNodeId(0), ArgNodeId(2)]
        );
        reached.remove(ArgNodeId(0));
        assert_eq!(reached.at_location(NodeId(0)).collect::<Vec<_>>(), vec![ArgNodeId(2)]);
        assert_eq!(reached.pop(), Some(ArgNodeId(1)));
        assert_eq!(reached.pop(), Some(ArgNodeId(2)));
        assert_eq!(reached.pop(), None);
        assert!(!reached.has_waiting());
    }

    #[test]
    fn test_enqueue_is_deduplicated() {
        let mut reached = ReachedSet::new(WaitlistOrder::Bfs);
        reached.insert(ArgNodeId(7), NodeId(0));
        reached.enqueue(ArgNodeId(7));
        reached.enqueue(ArgNodeId(7));
        assert_eq!(reached.waiting().count(), 1);
        reached.clear();
        assert!(reached.is_empty());
        assert_eq!(reached.order(), WaitlistOrder::Bfs);
    }
}
