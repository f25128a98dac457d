//! Call-stack analysis: the chain of active calls.

use std::fmt;

use super::domain::{Flat, FlatDomain};
use super::precision::Precision;
use super::{ConfigurableProgramAnalysis, Element};
use crate::cfa::{CfaEdge, EdgeKind, NodeId};
use crate::error::CpaError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallFrame {
    pub function: String,
    pub call_node: NodeId,
    pub return_node: NodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn top(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    pub fn contains_function(&self, function: &str) -> bool {
        self.frames.iter().any(|f| f.function == function)
    }

    pub fn push(&self, frame: CallFrame) -> Self {
        let mut frames = self.frames.clone();
        frames.push(frame);
        Self { frames }
    }

    pub fn pop(&self) -> Self {
        let mut frames = self.frames.clone();
        frames.pop();
        Self { frames }
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}@{}", frame.function, frame.call_node)?;
        }
        write!(f, "]")
    }
}

#[derive(Debug, Clone)]
pub struct CallstackCpa {
    main: String,
    max_depth: usize,
    allow_recursion: bool,
    domain: FlatDomain<CallStack>,
}

impl CallstackCpa {
    pub fn new(main: &str, max_depth: usize, allow_recursion: bool) -> Self {
        Self {
            main: main.to_string(),
            max_depth,
            allow_recursion,
            domain: FlatDomain::new(),
        }
    }
}

impl ConfigurableProgramAnalysis for CallstackCpa {
    type Domain = FlatDomain<CallStack>;

    fn domain(&self) -> &Self::Domain {
        &self.domain
    }

    fn initial_state(&self, _node: NodeId) -> Flat<CallStack> {
        Flat::Value(CallStack::new())
    }

    fn successors(
        &self,
        state: &Element<Self>,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Result<Vec<Element<Self>>, CpaError> {
        let Flat::Value(stack) = state else {
            return Ok(Vec::new());
        };
        match &edge.kind {
            EdgeKind::FunctionCall {
                callee, return_node, ..
            } => {
                if !self.allow_recursion && (*callee == self.main || stack.contains_function(callee)) {
                    return Err(CpaError::UnsupportedRecursion {
                        function: callee.clone(),
                    });
                }
                if stack.depth() >= self.max_depth {
                    return Err(CpaError::CallDepthExceeded { limit: self.max_depth });
                }
                let frame = CallFrame {
                    function: callee.clone(),
                    call_node: edge.predecessor,
                    return_node: *return_node,
                };
                Ok(vec![Flat::Value(stack.push(frame))])
            }
            EdgeKind::FunctionReturn { callee, .. } => match stack.top() {
                // Only the return edge back to the recorded call site is feasible.
                Some(frame) if frame.function == *callee && frame.return_node == edge.successor => {
                    Ok(vec![Flat::Value(stack.pop())])
                }
                _ => Ok(Vec::new()),
            },
            _ => Ok(vec![state.clone()]),
        }
    }
}
