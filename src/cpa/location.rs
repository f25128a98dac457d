//! Location analysis: which CFA node a state is at.

use std::collections::BTreeSet;
use std::rc::Rc;

use super::domain::{Flat, FlatDomain};
use super::precision::Precision;
use super::{ConfigurableProgramAnalysis, Element};
use crate::cfa::{Cfa, CfaEdge, EdgeKind, NodeId};
use crate::error::CpaError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationState {
    pub node: NodeId,
    /// Set when the node is an error location of a checked property.
    pub property: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LocationCpa {
    cfa: Rc<Cfa>,
    /// Checked properties; `None` checks all of them.
    properties: Option<BTreeSet<String>>,
    domain: FlatDomain<LocationState>,
}

impl LocationCpa {
    pub fn new(cfa: Rc<Cfa>) -> Self {
        Self {
            cfa,
            properties: None,
            domain: FlatDomain::new(),
        }
    }

    pub fn with_properties(mut self, properties: BTreeSet<String>) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn state_at(&self, node: NodeId) -> LocationState {
        let property = self
            .cfa
            .node(node)
            .property()
            .filter(|p| self.properties.as_ref().map_or(true, |set| set.contains(*p)))
            .map(str::to_string);
        LocationState { node, property }
    }
}

impl ConfigurableProgramAnalysis for LocationCpa {
    type Domain = FlatDomain<LocationState>;

    fn domain(&self) -> &Self::Domain {
        &self.domain
    }

    fn initial_state(&self, node: NodeId) -> Flat<LocationState> {
        Flat::Value(self.state_at(node))
    }

    fn successors(
        &self,
        state: &Element<Self>,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Result<Vec<Element<Self>>, CpaError> {
        let Flat::Value(current) = state else {
            return Ok(Vec::new());
        };
        assert_eq!(current.node, edge.predecessor, "Edge {} does not leave {}", edge.id, current.node);
        if let EdgeKind::Unsupported { statement } = &edge.kind {
            return Err(CpaError::UnrecognizedEdge {
                edge: edge.id,
                description: statement.clone(),
            });
        }
        // Nothing leaves a target.
        if current.property.is_some() {
            return Ok(Vec::new());
        }
        Ok(vec![Flat::Value(self.state_at(edge.successor))])
    }
}
