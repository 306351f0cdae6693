//! Workflow nodes.
//!
//! A node is one status of a workflow. Each node has:
//! - A qualified identity (workflow id, node id)
//! - A label for display
//! - An optional guard constraint an entity must satisfy to enter it
//! - Its outgoing transitions
//! - Free-form metadata carried over from the definition

use crate::edge::Transition;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use statusflow_core::{NodeId, NodeRef, WorkflowId};

/// An immutable status of a workflow graph.
///
/// Equality is structural: two nodes built from the same definition compare
/// equal even when they come from different graph instances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    node_ref: NodeRef,
    label: String,
    constraint: Option<String>,
    transitions: Vec<Transition>,
    #[serde(default)]
    metadata: Map<String, JsonValue>,
}

impl WorkflowNode {
    /// Creates a node whose label is its id.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, node_id: NodeId) -> Self {
        let label = node_id.to_string();
        Self {
            node_ref: NodeRef::new(workflow_id, node_id),
            label,
            constraint: None,
            transitions: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the guard constraint.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Adds an outgoing transition. A second transition to the same target replaces the first.
    #[must_use]
    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.retain(|t| t.target != transition.target);
        self.transitions.push(transition);
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, JsonValue>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the qualified reference of this node.
    #[must_use]
    pub fn node_ref(&self) -> &NodeRef {
        &self.node_ref
    }

    /// Returns the workflow id.
    #[must_use]
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.node_ref.workflow_id
    }

    /// Returns the node id.
    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.node_ref.node_id
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the guard constraint, if any.
    #[must_use]
    pub fn constraint(&self) -> Option<&str> {
        self.constraint.as_deref()
    }

    /// Returns the outgoing transitions in definition order.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Returns the transition leading to `target`, if any.
    #[must_use]
    pub fn transition_to(&self, target: &NodeRef) -> Option<&Transition> {
        self.transitions.iter().find(|t| &t.target == target)
    }

    /// Returns the metadata map.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, JsonValue> {
        &self.metadata
    }

    /// A node without outgoing transitions is terminal.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.transitions.is_empty()
    }
}
