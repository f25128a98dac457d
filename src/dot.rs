//! ARG to DOT (Graphviz) conversion.
//!
//! The generated DOT output follows these conventions:
//! - **Nodes** are labelled with their id, CFA location and (optionally) the
//!   abstract state; target nodes are highlighted, covered nodes are dashed
//! - **Edges**:
//!   - Solid lines lead from the designated parent
//!   - Dashed lines lead from parents gained through merges
//!   - Dotted lines point from a covered node to its coverer
//! - **The root** is placed at the top (source rank)
//!
//! # Examples
//!
//! ```
//! use std::rc::Rc;
//!
//! use cpa_rs::cfa::CfaBuilder;
//! use cpa_rs::cpa::composite::{Component, CompositeCpa};
//! use cpa_rs::cpa::location::LocationCpa;
//! use cpa_rs::cpa::precision::Precision;
//! use cpa_rs::reachability::ReachabilityEngine;
//! use cpa_rs::reached::WaitlistOrder;
//! use cpa_rs::shutdown::ShutdownNotifier;
//! use cpa_rs::statistics::Statistics;
//!
//! let mut b = CfaBuilder::new();
//! let (entry, exit) = b.function("main", &[]).unwrap();
//! b.blank(entry, exit).unwrap();
//! let cfa = Rc::new(b.build("main").unwrap());
//!
//! let mut engine = ReachabilityEngine::new(
//!     CompositeCpa::new(vec![Component::Location(LocationCpa::new(cfa.clone()))], 8),
//!     cfa,
//!     Precision::empty(),
//!     WaitlistOrder::Bfs,
//!     ShutdownNotifier::new(),
//!     Rc::new(Statistics::new()),
//! );
//! engine.run().unwrap();
//! let dot = engine.arg().to_dot().unwrap();
//! // Write to file and render with: dot -Tpng arg.dot -o arg.png
//! ```

use std::fmt;

use crate::arg::Arg;
use crate::cpa::AbstractState;

/// Configuration options for DOT output generation.
///
/// Use `DotConfig::default()` for standard settings.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for ARG nodes (default: "box")
    pub node_shape: &'static str,
    /// Fill color of target nodes (default: "red")
    pub target_color: &'static str,
    /// Style for designated-parent edges (default: "solid")
    pub parent_edge_style: &'static str,
    /// Style for edges from merged-in parents (default: "dashed")
    pub merge_edge_style: &'static str,
    /// Style for coverage edges (default: "dotted")
    pub cover_edge_style: &'static str,
    /// Whether to print the abstract state inside each node (default: true)
    pub show_states: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "box",
            target_color: "red",
            parent_edge_style: "solid",
            merge_edge_style: "dashed",
            cover_edge_style: "dotted",
            show_states: true,
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

impl<S: AbstractState + fmt::Display> Arg<S> {
    /// Converts the ARG to DOT (Graphviz) format.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(&DotConfig::default())
    }

    /// Converts the ARG to DOT format with custom configuration.
    pub fn to_dot_with_config(&self, config: &DotConfig) -> Result<String, std::fmt::Error> {
        use std::fmt::Write as _;

        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;

        let label = |node: &crate::arg::ArgNode<S>| {
            let mut label = format!("{} @ {}", node.id, node.state.location());
            if config.show_states {
                label.push('\n');
                label.push_str(&node.state.to_string());
            }
            escape(&label)
        };

        if let Some(root) = self.root() {
            writeln!(dot, "{{ rank=source")?;
            writeln!(dot, "{} [label=\"{}\"];", root, label(self.node(root)))?;
            writeln!(dot, "}}")?;
        }

        for node in self.iter() {
            if Some(node.id) == self.root() {
                continue;
            }
            let mut attrs = format!("label=\"{}\"", label(node));
            if node.state.is_target() {
                write!(attrs, ", style=filled, fillcolor={}", config.target_color)?;
            } else if node.is_covered() {
                write!(attrs, ", style=dashed")?;
            }
            writeln!(dot, "{} [{}];", node.id, attrs)?;
        }

        for node in self.iter() {
            for parent in node.parents() {
                let style = if Some(parent) == node.parent() {
                    config.parent_edge_style
                } else {
                    config.merge_edge_style
                };
                writeln!(dot, "{} -> {} [style={}];", parent, node.id, style)?;
            }
            for coverer in node.coverers() {
                writeln!(
                    dot,
                    "{} -> {} [style={}, constraint=false];",
                    node.id, coverer, config.cover_edge_style
                )?;
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}
