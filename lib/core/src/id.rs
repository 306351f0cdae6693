//! Strongly-typed identifiers for workflows and their statuses.
//!
//! Workflow and node identifiers are short names chosen by whoever writes the
//! definition. A status is addressed by [`NodeRef`], the pair of both; its
//! textual form `workflowId/nodeId` only appears when reading definitions and
//! when encoding the persisted status attribute.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between the workflow id and the node id in a qualified status.
pub const SEPARATOR: char = '/';

/// Error returned when parsing an identifier from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The text that was rejected.
    pub input: String,
    /// The reason for the parse failure.
    pub reason: &'static str,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to parse {} from '{}': {}",
            self.id_type, self.input, self.reason
        )
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to generate a validated, string-backed name type.
macro_rules! define_name {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a name, rejecting empty text and text containing the separator.
            ///
            /// # Errors
            ///
            /// Returns an error if the trimmed input is empty or contains `/`.
            pub fn new(value: impl AsRef<str>) -> Result<Self, ParseIdError> {
                let raw = value.as_ref();
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(ParseIdError {
                        id_type: stringify!($name),
                        input: raw.to_string(),
                        reason: "empty identifier",
                    });
                }
                if trimmed.contains(SEPARATOR) {
                    return Err(ParseIdError {
                        id_type: stringify!($name),
                        input: raw.to_string(),
                        reason: "identifier contains '/'",
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseIdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_name!(
    /// Identifier of a workflow definition.
    WorkflowId
);

define_name!(
    /// Identifier of a node (status) inside one workflow.
    NodeId
);

/// A fully qualified reference to one status: `(workflow, node)`.
///
/// Equality is structural. Bare node ids are completed against a default
/// workflow id at parse time; once built, a `NodeRef` never changes meaning.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// The workflow the node belongs to.
    pub workflow_id: WorkflowId,
    /// The node inside that workflow.
    pub node_id: NodeId,
}

impl NodeRef {
    /// Creates a reference from its parts.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, node_id: NodeId) -> Self {
        Self {
            workflow_id,
            node_id,
        }
    }

    /// Parses `workflowId/nodeId`, or a bare `nodeId` completed with `default_workflow`.
    ///
    /// # Errors
    ///
    /// Returns an error if either part is empty, if the text holds more than
    /// one separator, or if the id is bare and no default workflow is given.
    pub fn parse(text: &str, default_workflow: Option<&WorkflowId>) -> Result<Self, ParseIdError> {
        let trimmed = text.trim();
        match trimmed.split_once(SEPARATOR) {
            Some((workflow, node)) => {
                if node.contains(SEPARATOR) {
                    return Err(ParseIdError {
                        id_type: "NodeRef",
                        input: text.to_string(),
                        reason: "more than one '/'",
                    });
                }
                Ok(Self::new(WorkflowId::new(workflow)?, NodeId::new(node)?))
            }
            None => {
                let workflow_id = default_workflow.cloned().ok_or_else(|| ParseIdError {
                    id_type: "NodeRef",
                    input: text.to_string(),
                    reason: "bare node id without a default workflow",
                })?;
                Ok(Self::new(workflow_id, NodeId::new(trimmed)?))
            }
        }
    }

    /// Returns true if this node belongs to the given workflow.
    #[must_use]
    pub fn is_in(&self, workflow_id: &WorkflowId) -> bool {
        &self.workflow_id == workflow_id
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.workflow_id, SEPARATOR, self.node_id)
    }
}

impl FromStr for NodeRef {
    type Err = ParseIdError;

    /// Parses the qualified form only; bare ids need [`NodeRef::parse`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}
