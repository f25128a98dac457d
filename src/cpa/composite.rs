//! Positional product of analyses.
//!
//! The location component always comes first. States are merged only when
//! their location and call stack agree; the remaining components are then
//! joined component-wise.

use std::fmt;

use super::callstack::{CallStack, CallstackCpa};
use super::domain::{AbstractDomain, Flat, FlatDomain};
use super::interval::{IntervalCpa, IntervalDomain, IntervalState};
use super::location::{LocationCpa, LocationState};
use super::merge::MergeOperator;
use super::precision::Precision;
use super::predicate::{PredicateCpa, PredicateDomain, PredicateState};
use super::stop::StopOperator;
use super::{AbstractState, ConfigurableProgramAnalysis};
use crate::cfa::{CfaEdge, NodeId};
use crate::error::CpaError;
use crate::formula::Formula;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Location(Flat<LocationState>),
    Callstack(Flat<CallStack>),
    Predicate(PredicateState),
    Interval(IntervalState),
}

#[derive(Debug)]
pub enum Component {
    Location(LocationCpa),
    Callstack(CallstackCpa),
    Predicate(PredicateCpa),
    Interval(IntervalCpa),
}

macro_rules! dispatch {
    ($component:expr, $state:expr, |$cpa:ident, $s:ident| $body:expr) => {
        match ($component, $state) {
            (Component::Location($cpa), ComponentState::Location($s)) => {
                $body.map(|v| v.into_iter().map(ComponentState::Location).collect::<Vec<_>>())
            }
            (Component::Callstack($cpa), ComponentState::Callstack($s)) => {
                $body.map(|v| v.into_iter().map(ComponentState::Callstack).collect::<Vec<_>>())
            }
            (Component::Predicate($cpa), ComponentState::Predicate($s)) => {
                $body.map(|v| v.into_iter().map(ComponentState::Predicate).collect::<Vec<_>>())
            }
            (Component::Interval($cpa), ComponentState::Interval($s)) => {
                $body.map(|v| v.into_iter().map(ComponentState::Interval).collect::<Vec<_>>())
            }
            (component, state) => panic!("Component {:?} cannot handle state {:?}", component, state),
        }
    };
}

impl Component {
    fn initial_state(&self, node: NodeId) -> ComponentState {
        match self {
            Component::Location(cpa) => ComponentState::Location(cpa.initial_state(node)),
            Component::Callstack(cpa) => ComponentState::Callstack(cpa.initial_state(node)),
            Component::Predicate(cpa) => ComponentState::Predicate(cpa.initial_state(node)),
            Component::Interval(cpa) => ComponentState::Interval(cpa.initial_state(node)),
        }
    }

    fn successors(
        &self,
        state: &ComponentState,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Result<Vec<ComponentState>, CpaError> {
        dispatch!(self, state, |cpa, s| cpa.successors(s, edge, precision))
    }

    fn strengthen(&self, state: &ComponentState, siblings: &[ComponentState]) -> Result<Option<ComponentState>, CpaError> {
        let res = dispatch!(self, state, |cpa, s| cpa.strengthen(s, siblings))?;
        Ok(res.into_iter().next())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeState {
    components: Vec<ComponentState>,
}

impl CompositeState {
    pub fn new(components: Vec<ComponentState>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[ComponentState] {
        &self.components
    }

    fn location_state(&self) -> Option<&LocationState> {
        self.components.iter().find_map(|c| match c {
            ComponentState::Location(Flat::Value(s)) => Some(s),
            _ => None,
        })
    }

    pub fn predicates(&self) -> Option<&PredicateState> {
        self.components.iter().find_map(|c| match c {
            ComponentState::Predicate(s) => Some(s),
            _ => None,
        })
    }

    pub fn intervals(&self) -> Option<&IntervalState> {
        self.components.iter().find_map(|c| match c {
            ComponentState::Interval(s) => Some(s),
            _ => None,
        })
    }

    /// Location and call stack equal.
    pub fn same_context(&self, other: &CompositeState) -> bool {
        self.location_state().map(|s| s.node) == other.location_state().map(|s| s.node)
            && self.call_stack() == other.call_stack()
    }
}

impl AbstractState for CompositeState {
    fn location(&self) -> NodeId {
        match self.location_state() {
            Some(s) => s.node,
            None => panic!("Composite state without a location: {:?}", self),
        }
    }

    fn call_stack(&self) -> Option<&CallStack> {
        self.components.iter().find_map(|c| match c {
            ComponentState::Callstack(Flat::Value(s)) => Some(s),
            _ => None,
        })
    }

    fn property(&self) -> Option<&str> {
        self.location_state().and_then(|s| s.property.as_deref())
    }

    fn abstraction(&self) -> Formula {
        let mut parts = Vec::new();
        for c in &self.components {
            match c {
                ComponentState::Predicate(s) => parts.push(s.abstraction()),
                ComponentState::Interval(s) => parts.push(s.to_formula()),
                _ => {}
            }
        }
        Formula::and(parts)
    }

    fn strengthen_abstraction(&mut self, fact: Formula) {
        for c in &mut self.components {
            if let ComponentState::Predicate(s) = c {
                s.add_literal(fact.clone(), true);
            }
        }
    }
}

impl fmt::Display for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, c) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match c {
                ComponentState::Location(Flat::Value(s)) => write!(f, "{}", s.node)?,
                ComponentState::Location(other) => write!(f, "{:?}", other)?,
                ComponentState::Callstack(Flat::Value(s)) => write!(f, "{}", s)?,
                ComponentState::Callstack(other) => write!(f, "{:?}", other)?,
                ComponentState::Predicate(s) => write!(f, "{}", s)?,
                ComponentState::Interval(s) => write!(f, "{}", s)?,
            }
        }
        write!(f, ")")
    }
}

/// Product lattice of the component domains.
#[derive(Debug, Clone)]
pub struct CompositeDomain {
    kinds: Vec<ComponentKind>,
    interval: IntervalDomain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentKind {
    Location,
    Callstack,
    Predicate,
    Interval,
}

impl CompositeDomain {
    fn component_bottom(&self, kind: ComponentKind) -> ComponentState {
        match kind {
            ComponentKind::Location => ComponentState::Location(Flat::Bottom),
            ComponentKind::Callstack => ComponentState::Callstack(Flat::Bottom),
            ComponentKind::Predicate => ComponentState::Predicate(PredicateDomain.bottom()),
            ComponentKind::Interval => ComponentState::Interval(self.interval.bottom()),
        }
    }

    fn component_top(&self, kind: ComponentKind) -> ComponentState {
        match kind {
            ComponentKind::Location => ComponentState::Location(Flat::Top),
            ComponentKind::Callstack => ComponentState::Callstack(Flat::Top),
            ComponentKind::Predicate => ComponentState::Predicate(PredicateDomain.top()),
            ComponentKind::Interval => ComponentState::Interval(self.interval.top()),
        }
    }

    fn zip<T>(
        &self,
        a: &CompositeState,
        b: &CompositeState,
        f: impl Fn(&ComponentState, &ComponentState) -> T,
    ) -> Vec<T> {
        assert_eq!(a.components.len(), b.components.len(), "Composite states of different shape");
        a.components.iter().zip(&b.components).map(|(x, y)| f(x, y)).collect()
    }

    fn component_le(&self, a: &ComponentState, b: &ComponentState) -> bool {
        match (a, b) {
            (ComponentState::Location(x), ComponentState::Location(y)) => FlatDomain::new().le(x, y),
            (ComponentState::Callstack(x), ComponentState::Callstack(y)) => FlatDomain::new().le(x, y),
            (ComponentState::Predicate(x), ComponentState::Predicate(y)) => PredicateDomain.le(x, y),
            (ComponentState::Interval(x), ComponentState::Interval(y)) => self.interval.le(x, y),
            _ => panic!("Mismatched components {:?} and {:?}", a, b),
        }
    }

    fn component_join(&self, a: &ComponentState, b: &ComponentState) -> ComponentState {
        match (a, b) {
            (ComponentState::Location(x), ComponentState::Location(y)) => {
                ComponentState::Location(FlatDomain::new().join(x, y))
            }
            (ComponentState::Callstack(x), ComponentState::Callstack(y)) => {
                ComponentState::Callstack(FlatDomain::new().join(x, y))
            }
            (ComponentState::Predicate(x), ComponentState::Predicate(y)) => {
                ComponentState::Predicate(PredicateDomain.join(x, y))
            }
            (ComponentState::Interval(x), ComponentState::Interval(y)) => {
                ComponentState::Interval(self.interval.join(x, y))
            }
            _ => panic!("Mismatched components {:?} and {:?}", a, b),
        }
    }

    fn component_meet(&self, a: &ComponentState, b: &ComponentState) -> ComponentState {
        match (a, b) {
            (ComponentState::Location(x), ComponentState::Location(y)) => {
                ComponentState::Location(FlatDomain::new().meet(x, y))
            }
            (ComponentState::Callstack(x), ComponentState::Callstack(y)) => {
                ComponentState::Callstack(FlatDomain::new().meet(x, y))
            }
            (ComponentState::Predicate(x), ComponentState::Predicate(y)) => {
                ComponentState::Predicate(PredicateDomain.meet(x, y))
            }
            (ComponentState::Interval(x), ComponentState::Interval(y)) => {
                ComponentState::Interval(self.interval.meet(x, y))
            }
            _ => panic!("Mismatched components {:?} and {:?}", a, b),
        }
    }

    fn component_is_bottom(&self, c: &ComponentState) -> bool {
        match c {
            ComponentState::Location(x) => matches!(x, Flat::Bottom),
            ComponentState::Callstack(x) => matches!(x, Flat::Bottom),
            ComponentState::Predicate(x) => x.is_bottom(),
            ComponentState::Interval(x) => x.is_bottom(),
        }
    }

    /// Joining states of different contexts is a contract violation.
    fn check_context(&self, a: &CompositeState, b: &CompositeState) {
        if self.is_bottom(a) || self.is_bottom(b) {
            return;
        }
        let located = |s: &CompositeState| s.location_state().is_some();
        if located(a) && located(b) {
            assert!(
                a.same_context(b),
                "Domain operation on states of different contexts: {} and {}",
                a,
                b
            );
        }
    }
}

impl AbstractDomain for CompositeDomain {
    type Element = CompositeState;

    fn bottom(&self) -> CompositeState {
        CompositeState::new(self.kinds.iter().map(|&k| self.component_bottom(k)).collect())
    }

    fn top(&self) -> CompositeState {
        CompositeState::new(self.kinds.iter().map(|&k| self.component_top(k)).collect())
    }

    fn is_bottom(&self, elem: &CompositeState) -> bool {
        elem.components.iter().any(|c| self.component_is_bottom(c))
    }

    fn is_top(&self, elem: &CompositeState) -> bool {
        elem == &self.top()
    }

    fn le(&self, elem1: &CompositeState, elem2: &CompositeState) -> bool {
        if self.is_bottom(elem1) {
            return true;
        }
        self.zip(elem1, elem2, |a, b| self.component_le(a, b)).into_iter().all(|x| x)
    }

    fn join(&self, elem1: &CompositeState, elem2: &CompositeState) -> CompositeState {
        if self.is_bottom(elem1) {
            return elem2.clone();
        }
        if self.is_bottom(elem2) {
            return elem1.clone();
        }
        self.check_context(elem1, elem2);
        CompositeState::new(self.zip(elem1, elem2, |a, b| self.component_join(a, b)))
    }

    fn meet(&self, elem1: &CompositeState, elem2: &CompositeState) -> CompositeState {
        let res = CompositeState::new(self.zip(elem1, elem2, |a, b| self.component_meet(a, b)));
        if self.is_bottom(&res) {
            self.bottom()
        } else {
            res
        }
    }
}

#[derive(Debug)]
pub struct CompositeCpa {
    components: Vec<Component>,
    domain: CompositeDomain,
    merge: MergeOperator,
    stop: StopOperator,
}

impl CompositeCpa {
    /// `components` must start with the location analysis.
    pub fn new(components: Vec<Component>, width: u32) -> Self {
        assert!(
            matches!(components.first(), Some(Component::Location(_))),
            "The location analysis must come first"
        );
        let kinds = components
            .iter()
            .map(|c| match c {
                Component::Location(_) => ComponentKind::Location,
                Component::Callstack(_) => ComponentKind::Callstack,
                Component::Predicate(_) => ComponentKind::Predicate,
                Component::Interval(_) => ComponentKind::Interval,
            })
            .collect();
        Self {
            components,
            domain: CompositeDomain {
                kinds,
                interval: IntervalDomain::new(width),
            },
            merge: MergeOperator::Sep,
            stop: StopOperator::Sep,
        }
    }

    pub fn with_merge(mut self, merge: MergeOperator) -> Self {
        self.merge = merge;
        self
    }

    pub fn with_stop(mut self, stop: StopOperator) -> Self {
        self.stop = stop;
        self
    }
}

impl ConfigurableProgramAnalysis for CompositeCpa {
    type Domain = CompositeDomain;

    fn domain(&self) -> &CompositeDomain {
        &self.domain
    }

    fn initial_state(&self, node: NodeId) -> CompositeState {
        CompositeState::new(self.components.iter().map(|c| c.initial_state(node)).collect())
    }

    fn successors(
        &self,
        state: &CompositeState,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Result<Vec<CompositeState>, CpaError> {
        let mut products: Vec<Vec<ComponentState>> = vec![Vec::new()];
        for (component, s) in self.components.iter().zip(&state.components) {
            let succs = component.successors(s, edge, precision)?;
            if succs.is_empty() {
                return Ok(Vec::new());
            }
            products = products
                .into_iter()
                .flat_map(|prefix| {
                    succs.iter().map(move |succ| {
                        let mut next = prefix.clone();
                        next.push(succ.clone());
                        next
                    })
                })
                .collect();
        }

        let mut res = Vec::with_capacity(products.len());
        'products: for product in products {
            let mut strengthened = Vec::with_capacity(product.len());
            for (component, s) in self.components.iter().zip(&product) {
                match component.strengthen(s, &product)? {
                    Some(s) => strengthened.push(s),
                    None => continue 'products,
                }
            }
            res.push(CompositeState::new(strengthened));
        }
        Ok(res)
    }

    fn merge_operator(&self) -> MergeOperator {
        self.merge
    }

    fn stop_operator(&self) -> StopOperator {
        self.stop
    }

    /// Merges only states of the same context.
    fn merge(&self, new: &CompositeState, reached: &CompositeState) -> CompositeState {
        if self.merge == MergeOperator::Sep || !new.same_context(reached) {
            return reached.clone();
        }
        self.domain.join(new, reached)
    }

    fn stop(&self, state: &CompositeState, reached: &[&CompositeState]) -> bool {
        let compatible: Vec<&CompositeState> = reached.iter().copied().filter(|r| r.same_context(state)).collect();
        self.stop.stop(&self.domain, state, &compatible)
    }
}
