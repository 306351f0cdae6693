//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Problems found while building a graph from a definition
//! - `SourceError`: Registry lookups and definition loading (wraps `GraphError`)
//! - `EvaluationError`: Failures reported by the injected guard/action evaluator
//! - `TransitionError`: Per-entity transition failures (wraps the errors above)

use statusflow_core::{NodeId, NodeRef, WorkflowId};
use std::fmt;

/// Formats an optional source node, using `(unbound)` for entities outside any workflow.
struct SourceDisplay<'a>(&'a Option<NodeRef>);

impl fmt::Display for SourceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(node) => write!(f, "{node}"),
            None => f.write_str("(unbound)"),
        }
    }
}

/// Errors found while building a graph from a definition.
///
/// Any of these makes the definition malformed: the graph is discarded and
/// never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An identifier in the definition is not a valid name.
    InvalidId { input: String, reason: String },
    /// Two node definitions share an id.
    DuplicateNode { node_id: NodeId },
    /// The `initial` id names no node of the definition.
    InitialNotFound { initial: String },
    /// The `initial` id is qualified with another workflow.
    ForeignInitial { initial: NodeRef },
    /// A transition targets a node that does not exist in this workflow.
    UnresolvedTarget { source: NodeId, target: NodeRef },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { input, reason } => {
                write!(f, "invalid identifier '{input}': {reason}")
            }
            Self::DuplicateNode { node_id } => {
                write!(f, "node '{node_id}' is defined more than once")
            }
            Self::InitialNotFound { initial } => {
                write!(f, "initial node '{initial}' is not defined")
            }
            Self::ForeignInitial { initial } => {
                write!(f, "initial node {initial} belongs to another workflow")
            }
            Self::UnresolvedTarget { source, target } => {
                write!(f, "transition from '{source}' targets unknown node {target}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from the workflow registry and its definition stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The definition could not be turned into a graph (use as context wrapper).
    Malformed { workflow_id: WorkflowId },
    /// No definition exists for the workflow.
    WorkflowNotFound { workflow_id: WorkflowId },
    /// The workflow exists but has no such node.
    NodeNotFound { node: NodeRef },
    /// A status reference could not be parsed.
    InvalidReference { input: String, reason: String },
    /// The backing store failed to produce a definition.
    StoreFailed {
        workflow_id: WorkflowId,
        details: String,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { workflow_id } => {
                write!(f, "workflow '{workflow_id}' is malformed")
            }
            Self::WorkflowNotFound { workflow_id } => {
                write!(f, "workflow not found: {workflow_id}")
            }
            Self::NodeNotFound { node } => write!(f, "node not found: {node}"),
            Self::InvalidReference { input, reason } => {
                write!(f, "invalid status reference '{input}': {reason}")
            }
            Self::StoreFailed {
                workflow_id,
                details,
            } => {
                write!(f, "failed to read definition of '{workflow_id}': {details}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// A failure reported by the evaluator while running a guard or an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    /// The guard expression or action reference being evaluated.
    pub expression: String,
    /// What went wrong.
    pub reason: String,
}

impl EvaluationError {
    /// Creates an evaluation error.
    #[must_use]
    pub fn new(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation of '{}' failed: {}", self.expression, self.reason)
    }
}

impl std::error::Error for EvaluationError {}

/// Errors from a single transition attempt on one entity.
///
/// Every variant names the node the entity was in and the node it was heading
/// for, as far as they are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// No edge leads to the candidate, or its guard evaluated false.
    Unreachable {
        source: Option<NodeRef>,
        destination: NodeRef,
    },
    /// A transition was requested while another one is running on the same entity.
    Reentrancy {
        source: Option<NodeRef>,
        candidate: String,
    },
    /// The edge action failed (use as context wrapper).
    ActionFailed {
        source: Option<NodeRef>,
        destination: NodeRef,
        action: String,
    },
    /// The guard of the candidate could not be evaluated (use as context wrapper).
    GuardFailed {
        source: Option<NodeRef>,
        destination: NodeRef,
    },
    /// The candidate could not be resolved to a node (use as context wrapper).
    Lookup {
        source: Option<NodeRef>,
        candidate: String,
    },
    /// An empty candidate was given to an entity that is already in a workflow.
    EmptyCandidate { source: NodeRef },
    /// The entity could not be bound to its workflow (use as context wrapper).
    Attach { entity_type: String },
}

impl TransitionError {
    /// Returns true if the caller may retry with another candidate.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. } | Self::Lookup { .. } | Self::EmptyCandidate { .. }
        )
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable {
                source,
                destination,
            } => {
                write!(
                    f,
                    "status {destination} is not reachable from {}",
                    SourceDisplay(source)
                )
            }
            Self::Reentrancy { source, candidate } => {
                write!(
                    f,
                    "transition to '{candidate}' requested from {} while another transition is in progress",
                    SourceDisplay(source)
                )
            }
            Self::ActionFailed {
                source,
                destination,
                action,
            } => {
                write!(
                    f,
                    "action '{action}' failed on transition {} -> {destination}",
                    SourceDisplay(source)
                )
            }
            Self::GuardFailed {
                source,
                destination,
            } => {
                write!(
                    f,
                    "guard of {destination} could not be evaluated (from {})",
                    SourceDisplay(source)
                )
            }
            Self::Lookup { source, candidate } => {
                write!(
                    f,
                    "status '{candidate}' could not be resolved (from {})",
                    SourceDisplay(source)
                )
            }
            Self::EmptyCandidate { source } => {
                write!(f, "an empty status cannot replace {source}")
            }
            Self::Attach { entity_type } => {
                write!(f, "failed to attach '{entity_type}' entity to its workflow")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(text: &str) -> NodeRef {
        text.parse().expect("valid node ref")
    }

    #[test]
    fn graph_error_display() {
        let err = GraphError::UnresolvedTarget {
            source: NodeId::new("draft").expect("valid"),
            target: node("post/missing"),
        };
        assert!(err.to_string().contains("targets unknown node post/missing"));
    }

    #[test]
    fn source_error_display() {
        let workflow_id = WorkflowId::new("post").expect("valid");
        let err = SourceError::WorkflowNotFound { workflow_id };
        assert_eq!(err.to_string(), "workflow not found: post");
    }

    #[test]
    fn transition_error_names_both_ends() {
        let err = TransitionError::Unreachable {
            source: Some(node("post/published")),
            destination: node("post/draft"),
        };
        let text = err.to_string();
        assert!(text.contains("post/published"));
        assert!(text.contains("post/draft"));
    }

    #[test]
    fn unbound_source_display() {
        let err = TransitionError::Unreachable {
            source: None,
            destination: node("post/review"),
        };
        assert!(err.to_string().contains("(unbound)"));
    }

    #[test]
    fn recoverable_classification() {
        let unreachable = TransitionError::Unreachable {
            source: None,
            destination: node("post/review"),
        };
        let reentrant = TransitionError::Reentrancy {
            source: None,
            candidate: "review".to_string(),
        };
        assert!(unreachable.is_recoverable());
        assert!(!reentrant.is_recoverable());
    }
}
