//! Configurable program analyses.
//!
//! A CPA bundles an [abstract domain][domain::AbstractDomain], a transfer
//! relation ([`ConfigurableProgramAnalysis::successors`]) and the
//! [merge][merge::MergeOperator] and [stop][stop::StopOperator] operators.
//! Individual analyses are combined positionally by
//! [`CompositeCpa`][composite::CompositeCpa].

use std::fmt::Debug;

use crate::cfa::{CfaEdge, NodeId};
use crate::error::CpaError;
use crate::formula::Formula;

pub mod adjustment;
pub mod callstack;
pub mod composite;
pub mod domain;
pub mod interval;
pub mod location;
pub mod merge;
pub mod precision;
pub mod predicate;
pub mod stop;

use self::callstack::CallStack;
use self::composite::ComponentState;
use self::domain::AbstractDomain;
use self::merge::MergeOperator;
use self::precision::Precision;
use self::stop::StopOperator;

/// What the engine and the refiner need to know about a state.
pub trait AbstractState: Clone + Debug + PartialEq {
    fn location(&self) -> NodeId;

    fn call_stack(&self) -> Option<&CallStack> {
        None
    }

    /// Name of the violated property, if this is a target state.
    fn property(&self) -> Option<&str> {
        None
    }

    fn is_target(&self) -> bool {
        self.property().is_some()
    }

    /// Formula over program variables describing the state.
    fn abstraction(&self) -> Formula {
        Formula::True
    }

    /// Conjoins a fact known to hold in every concrete state represented.
    fn strengthen_abstraction(&mut self, _fact: Formula) {}
}

pub type Element<C> = <<C as ConfigurableProgramAnalysis>::Domain as AbstractDomain>::Element;

pub trait ConfigurableProgramAnalysis: Sized {
    type Domain: AbstractDomain;

    fn domain(&self) -> &Self::Domain;

    fn initial_state(&self, node: NodeId) -> Element<Self>;

    /// Abstract successors across `edge`; empty if the edge is infeasible.
    fn successors(
        &self,
        state: &Element<Self>,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Result<Vec<Element<Self>>, CpaError>;

    /// Lets the analysis prune `state` given the sibling states of a composite successor.
    fn strengthen(&self, state: &Element<Self>, _siblings: &[ComponentState]) -> Result<Option<Element<Self>>, CpaError> {
        Ok(Some(state.clone()))
    }

    fn merge_operator(&self) -> MergeOperator {
        MergeOperator::Sep
    }

    fn stop_operator(&self) -> StopOperator {
        StopOperator::Sep
    }

    fn merge(&self, new: &Element<Self>, reached: &Element<Self>) -> Element<Self> {
        self.merge_operator().merge(self.domain(), new, reached)
    }

    fn stop(&self, state: &Element<Self>, reached: &[&Element<Self>]) -> bool {
        self.stop_operator().stop(self.domain(), state, reached)
    }
}
