//! Transition edges between statuses.

use serde::{Deserialize, Serialize};
use statusflow_core::NodeRef;

/// An outgoing transition of a node.
///
/// The target may live in another workflow. The optional action is an opaque
/// reference handed to the evaluator when the transition is processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    /// The node this transition leads to.
    pub target: NodeRef,
    /// Action run while the transition is processed.
    pub action: Option<String>,
}

impl Transition {
    /// Creates a transition without an action.
    #[must_use]
    pub fn new(target: NodeRef) -> Self {
        Self {
            target,
            action: None,
        }
    }

    /// Sets the action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Returns true if the target belongs to another workflow than `source`.
    #[must_use]
    pub fn crosses_from(&self, source: &NodeRef) -> bool {
        self.target.workflow_id != source.workflow_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(text: &str) -> NodeRef {
        text.parse().expect("valid node ref")
    }

    #[test]
    fn transition_without_action() {
        let transition = Transition::new(node("post/review"));
        assert!(transition.action.is_none());
    }

    #[test]
    fn transition_with_action() {
        let transition = Transition::new(node("post/published")).with_action("notify_author");
        assert_eq!(transition.action.as_deref(), Some("notify_author"));
    }

    #[test]
    fn crossing_detection() {
        let transition = Transition::new(node("archive/stored"));
        assert!(transition.crosses_from(&node("post/published")));
        assert!(!transition.crosses_from(&node("archive/pending")));
    }
}
