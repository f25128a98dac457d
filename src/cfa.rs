//! Control-flow automaton: the program representation the analyses run on.
//!
//! Nodes are program locations; edges carry one operation each. Variables
//! local to a function are qualified as `function::name`, unqualified names
//! are globals. Every function has a return variable `function::__retval__`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::CfaError;
use crate::formula::{Formula, Term};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Regular,
    FunctionEntry,
    FunctionExit,
    /// Error location violating the named property.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfaNode {
    pub id: NodeId,
    pub function: String,
    pub kind: NodeKind,
}

impl CfaNode {
    pub fn property(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Error(property) => Some(property),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    Blank,
    Assume {
        condition: Formula,
        truth: bool,
    },
    Assignment {
        variable: String,
        value: Term,
    },
    /// Nondeterministic value.
    Havoc {
        variable: String,
    },
    Declaration {
        variable: String,
        initializer: Option<Term>,
    },
    FunctionCall {
        callee: String,
        arguments: Vec<Term>,
        return_node: NodeId,
    },
    FunctionReturn {
        callee: String,
        /// Caller variable receiving the callee's return value.
        result: Option<String>,
        call_node: NodeId,
    },
    /// Statement no analysis models.
    Unsupported {
        statement: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfaEdge {
    pub id: EdgeId,
    pub predecessor: NodeId,
    pub successor: NodeId,
    pub kind: EdgeKind,
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: ", self.predecessor, self.successor)?;
        match &self.kind {
            EdgeKind::Blank => write!(f, "skip"),
            EdgeKind::Assume { condition, truth } => {
                if *truth {
                    write!(f, "[{}]", condition)
                } else {
                    write!(f, "[!({})]", condition)
                }
            }
            EdgeKind::Assignment { variable, value } => write!(f, "{} := {}", variable, value),
            EdgeKind::Havoc { variable } => write!(f, "{} := *", variable),
            EdgeKind::Declaration { variable, initializer } => match initializer {
                Some(init) => write!(f, "var {} := {}", variable, init),
                None => write!(f, "var {}", variable),
            },
            EdgeKind::FunctionCall { callee, arguments, .. } => {
                write!(f, "call {}(", callee)?;
                for (i, arg) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            EdgeKind::FunctionReturn { callee, result, .. } => match result {
                Some(var) => write!(f, "{} := return from {}", var, callee),
                None => write!(f, "return from {}", callee),
            },
            EdgeKind::Unsupported { statement } => write!(f, "<{}>", statement),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub entry: NodeId,
    pub exit: NodeId,
    /// Qualified parameter names.
    pub parameters: Vec<String>,
    pub return_variable: String,
}

/// Qualified name of a function-local variable.
pub fn local_variable(function: &str, name: &str) -> String {
    format!("{}::{}", function, name)
}

pub fn return_variable(function: &str) -> String {
    local_variable(function, "__retval__")
}

/// Whether `variable` is local to `function`.
pub fn is_local_to(variable: &str, function: &str) -> bool {
    variable
        .strip_prefix(function)
        .map_or(false, |rest| rest.starts_with("::"))
}

#[derive(Debug, Clone)]
pub struct Cfa {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    leaving: Vec<Vec<EdgeId>>,
    entering: Vec<Vec<EdgeId>>,
    functions: BTreeMap<String, FunctionDef>,
    main: String,
}

impl Cfa {
    pub fn node(&self, id: NodeId) -> &CfaNode {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &CfaEdge {
        &self.edges[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaving_edges(&self, node: NodeId) -> impl Iterator<Item = &CfaEdge> {
        self.leaving[node.0].iter().map(move |&e| self.edge(e))
    }

    pub fn entering_edges(&self, node: NodeId) -> impl Iterator<Item = &CfaEdge> {
        self.entering[node.0].iter().map(move |&e| self.edge(e))
    }

    /// All edges from `from` to `to`.
    pub fn edges_between(&self, from: NodeId, to: NodeId) -> impl Iterator<Item = &CfaEdge> {
        self.leaving_edges(from).filter(move |e| e.successor == to)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn main_function(&self) -> &FunctionDef {
        &self.functions[&self.main]
    }

    pub fn entry(&self) -> NodeId {
        self.main_function().entry
    }

    pub fn error_nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter().filter(|n| n.property().is_some())
    }

    /// Names of all properties, i.e. error labels.
    pub fn properties(&self) -> BTreeSet<String> {
        self.error_nodes().filter_map(|n| n.property()).map(str::to_string).collect()
    }
}

/// Validating builder for [`Cfa`].
#[derive(Debug, Default)]
pub struct CfaBuilder {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    functions: BTreeMap<String, FunctionDef>,
}

impl CfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_node(&mut self, function: &str, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(CfaNode {
            id,
            function: function.to_string(),
            kind,
        });
        id
    }

    /// Declares a function with unqualified parameter names; returns `(entry, exit)`.
    pub fn function(&mut self, name: &str, parameters: &[&str]) -> Result<(NodeId, NodeId), CfaError> {
        if self.functions.contains_key(name) {
            return Err(CfaError::DuplicateFunction(name.to_string()));
        }
        let entry = self.add_node(name, NodeKind::FunctionEntry);
        let exit = self.add_node(name, NodeKind::FunctionExit);
        let def = FunctionDef {
            name: name.to_string(),
            entry,
            exit,
            parameters: parameters.iter().map(|p| local_variable(name, p)).collect(),
            return_variable: return_variable(name),
        };
        self.functions.insert(name.to_string(), def);
        Ok((entry, exit))
    }

    fn check_function(&self, function: &str) -> Result<&FunctionDef, CfaError> {
        self.functions
            .get(function)
            .ok_or_else(|| CfaError::UnknownFunction(function.to_string()))
    }

    fn check_node(&self, node: NodeId) -> Result<&CfaNode, CfaError> {
        self.nodes.get(node.0).ok_or(CfaError::UnknownNode(node))
    }

    pub fn node(&mut self, function: &str) -> Result<NodeId, CfaError> {
        self.check_function(function)?;
        Ok(self.add_node(function, NodeKind::Regular))
    }

    pub fn error_node(&mut self, function: &str, property: &str) -> Result<NodeId, CfaError> {
        self.check_function(function)?;
        Ok(self.add_node(function, NodeKind::Error(property.to_string())))
    }

    pub fn edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<EdgeId, CfaError> {
        let from_function = self.check_node(from)?.function.clone();
        let to_node = self.check_node(to)?;
        let crosses = matches!(kind, EdgeKind::FunctionCall { .. } | EdgeKind::FunctionReturn { .. });
        if !crosses && to_node.function != from_function {
            return Err(CfaError::ForeignNode {
                node: to,
                expected: from_function,
                actual: to_node.function.clone(),
            });
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(CfaEdge {
            id,
            predecessor: from,
            successor: to,
            kind,
        });
        Ok(id)
    }

    pub fn blank(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, CfaError> {
        self.edge(from, to, EdgeKind::Blank)
    }

    pub fn assume(&mut self, from: NodeId, to: NodeId, condition: Formula, truth: bool) -> Result<EdgeId, CfaError> {
        self.edge(from, to, EdgeKind::Assume { condition, truth })
    }

    /// Adds the pair of assume edges `[c]` to `then` and `[!c]` to `otherwise`.
    pub fn branch(
        &mut self,
        from: NodeId,
        condition: Formula,
        then: NodeId,
        otherwise: NodeId,
    ) -> Result<(EdgeId, EdgeId), CfaError> {
        let t = self.assume(from, then, condition.clone(), true)?;
        let f = self.assume(from, otherwise, condition, false)?;
        Ok((t, f))
    }

    pub fn assign(&mut self, from: NodeId, to: NodeId, variable: &str, value: Term) -> Result<EdgeId, CfaError> {
        let variable = variable.to_string();
        self.edge(from, to, EdgeKind::Assignment { variable, value })
    }

    pub fn havoc(&mut self, from: NodeId, to: NodeId, variable: &str) -> Result<EdgeId, CfaError> {
        let variable = variable.to_string();
        self.edge(from, to, EdgeKind::Havoc { variable })
    }

    pub fn declare(
        &mut self,
        from: NodeId,
        to: NodeId,
        variable: &str,
        initializer: Option<Term>,
    ) -> Result<EdgeId, CfaError> {
        let variable = variable.to_string();
        self.edge(from, to, EdgeKind::Declaration { variable, initializer })
    }

    pub fn unsupported(&mut self, from: NodeId, to: NodeId, statement: &str) -> Result<EdgeId, CfaError> {
        let statement = statement.to_string();
        self.edge(from, to, EdgeKind::Unsupported { statement })
    }

    /// Adds a call from `call_node` into `callee` and the matching return
    /// edge from the callee's exit to `return_node`.
    pub fn call(
        &mut self,
        call_node: NodeId,
        return_node: NodeId,
        callee: &str,
        arguments: Vec<Term>,
        result: Option<&str>,
    ) -> Result<(EdgeId, EdgeId), CfaError> {
        let def = self.check_function(callee)?;
        if def.parameters.len() != arguments.len() {
            return Err(CfaError::ArityMismatch {
                callee: callee.to_string(),
                expected: def.parameters.len(),
                given: arguments.len(),
            });
        }
        let (entry, exit) = (def.entry, def.exit);
        let caller = self.check_node(call_node)?.function.clone();
        let return_function = &self.check_node(return_node)?.function;
        if *return_function != caller {
            return Err(CfaError::ForeignNode {
                node: return_node,
                expected: caller,
                actual: return_function.clone(),
            });
        }

        let call = self.edge(
            call_node,
            entry,
            EdgeKind::FunctionCall {
                callee: callee.to_string(),
                arguments,
                return_node,
            },
        )?;
        let ret = self.edge(
            exit,
            return_node,
            EdgeKind::FunctionReturn {
                callee: callee.to_string(),
                result: result.map(str::to_string),
                call_node,
            },
        )?;
        Ok((call, ret))
    }

    pub fn build(self, main: &str) -> Result<Cfa, CfaError> {
        self.check_function(main)?;
        let mut leaving = vec![Vec::new(); self.nodes.len()];
        let mut entering = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            leaving[edge.predecessor.0].push(edge.id);
            entering[edge.successor.0].push(edge.id);
        }
        log::debug!(
            "built CFA with {} nodes, {} edges, {} functions",
            self.nodes.len(),
            self.edges.len(),
            self.functions.len()
        );
        Ok(Cfa {
            nodes: self.nodes,
            edges: self.edges,
            leaving,
            entering,
            functions: self.functions,
            main: main.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_build_and_navigate() {
        let mut b = CfaBuilder::new();
        let (entry, exit) = b.function("main", &[]).unwrap();
        let err = b.error_node("main", "unreach").unwrap();
        let x = Term::var("x");
        b.branch(entry, x.clone().less_than(Term::constant(0)), err, exit).unwrap();
        let cfa = b.build("main").unwrap();

        assert_eq!(cfa.entry(), entry);
        assert_eq!(cfa.leaving_edges(entry).count(), 2);
        assert_eq!(cfa.entering_edges(err).count(), 1);
        assert_eq!(cfa.edges_between(entry, exit).count(), 1);
        assert_eq!(cfa.properties().into_iter().collect::<Vec<_>>(), vec!["unreach".to_string()]);
    }

    #[test]
    fn test_call_pair() {
        let mut b = CfaBuilder::new();
        let (m_entry, _m_exit) = b.function("main", &[]).unwrap();
        let (f_entry, f_exit) = b.function("f", &["a"]).unwrap();
        let after = b.node("main").unwrap();
        let (call, ret) = b
            .call(m_entry, after, "f", vec![Term::constant(1)], Some("main::r"))
            .unwrap();
        let cfa = b.build("main").unwrap();

        assert_eq!(cfa.edge(call).successor, f_entry);
        assert_eq!(cfa.edge(ret).predecessor, f_exit);
        assert_eq!(cfa.function("f").unwrap().parameters, vec!["f::a".to_string()]);
        assert_eq!(cfa.function("f").unwrap().return_variable, "f::__retval__");
    }

    #[test]
    fn test_validation() {
        let mut b = CfaBuilder::new();
        let (m_entry, _) = b.function("main", &[]).unwrap();
        let (f_entry, _) = b.function("f", &["a"]).unwrap();
        assert_eq!(b.function("f", &[]), Err(CfaError::DuplicateFunction("f".into())));
        assert!(matches!(b.blank(m_entry, f_entry), Err(CfaError::ForeignNode { .. })));
        assert!(matches!(
            b.call(m_entry, m_entry, "f", vec![], None),
            Err(CfaError::ArityMismatch { expected: 1, given: 0, .. })
        ));
        assert!(matches!(b.node("g"), Err(CfaError::UnknownFunction(_))));
        assert!(matches!(b.build("nope"), Err(CfaError::UnknownFunction(_))));
    }

    #[test]
    fn test_locality() {
        assert!(is_local_to("f::x", "f"));
        assert!(!is_local_to("ff::x", "f"));
        assert!(!is_local_to("x", "f"));
        assert_eq!(return_variable("g"), "g::__retval__");
    }
}
