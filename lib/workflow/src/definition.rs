//! Declarative workflow definitions.
//!
//! A definition is the document a workflow is loaded from:
//!
//! ```json
//! {
//!   "initial": "draft",
//!   "node": [
//!     { "id": "draft", "label": "Draft", "transition": "review" },
//!     { "id": "review", "constraint": "has_reviewer",
//!       "transition": { "published": "notify_author", "rejected": null } },
//!     { "id": "published" },
//!     { "id": "rejected" }
//!   ]
//! }
//! ```
//!
//! Definitions are plain data. Turning one into a checked
//! [`WorkflowGraph`](crate::graph::WorkflowGraph) happens in the graph module.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Id of the node every entity enters the workflow through.
    pub initial: String,
    /// The statuses of the workflow.
    #[serde(default)]
    pub node: Vec<NodeDefinition>,
}

impl WorkflowDefinition {
    /// Creates a definition with the given initial node and no nodes yet.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            initial: initial.into(),
            node: Vec::new(),
        }
    }

    /// Adds a node.
    #[must_use]
    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.node.push(node);
        self
    }

    /// Parses a definition from JSON text.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the text is not a valid definition document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// One status of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Node id, bare or qualified with this workflow's id.
    pub id: String,
    /// Human-readable label. Defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Guard expression that must hold for an entity to enter this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    /// Outgoing transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionSpec>,
    /// Free-form data attached to the node, opaque to the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, JsonValue>>,
}

impl NodeDefinition {
    /// Creates a node definition with only an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            constraint: None,
            transition: None,
            metadata: None,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the guard expression.
    #[must_use]
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    /// Sets transitions from a comma-separated list of target ids.
    #[must_use]
    pub fn with_targets(mut self, targets: impl Into<String>) -> Self {
        self.transition = Some(TransitionSpec::List(targets.into()));
        self
    }

    /// Adds one transition with an optional action.
    ///
    /// Any previous transition spec is converted to the map form first.
    #[must_use]
    pub fn with_transition(mut self, target: impl Into<String>, action: Option<&str>) -> Self {
        let mut map: BTreeMap<String, Option<String>> = self
            .transition
            .take()
            .map(|spec| spec.entries().into_iter().collect())
            .unwrap_or_default();
        map.insert(target.into(), action.map(str::to_string));
        self.transition = Some(TransitionSpec::Map(map));
        self
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }
}

/// The outgoing transitions of a node, in one of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransitionSpec {
    /// `"review, rejected"`: targets without actions.
    List(String),
    /// `["review", "rejected"]`: targets without actions.
    Array(Vec<String>),
    /// `{"published": "notify", "rejected": null}`: target to action.
    Map(BTreeMap<String, Option<String>>),
}

impl TransitionSpec {
    /// Returns `(target, action)` pairs with blank targets dropped.
    ///
    /// List and array order is preserved; the map form is ordered by target id.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Option<String>)> {
        match self {
            Self::List(text) => text
                .split(',')
                .map(str::trim)
                .filter(|target| !target.is_empty())
                .map(|target| (target.to_string(), None))
                .collect(),
            Self::Array(targets) => targets
                .iter()
                .map(|target| target.trim())
                .filter(|target| !target.is_empty())
                .map(|target| (target.to_string(), None))
                .collect(),
            Self::Map(map) => map
                .iter()
                .filter(|(target, _)| !target.trim().is_empty())
                .map(|(target, action)| {
                    let action = action
                        .as_deref()
                        .map(str::trim)
                        .filter(|action| !action.is_empty())
                        .map(str::to_string);
                    (target.trim().to_string(), action)
                })
                .collect(),
        }
    }
}
