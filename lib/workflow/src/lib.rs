//! Status workflow engine for statusflow.
//!
//! This crate drives the status attribute of persisted entities through a
//! declared workflow graph:
//!
//! - **Definitions**: Serde-loaded node lists with guards, transitions and edge actions
//! - **Graph Model**: Validated directed graphs using petgraph, one per workflow id
//! - **Registry**: Thread-safe, lazily loaded cache of graphs over a definition store
//! - **Runtime**: Per-entity state machine with lifecycle events and save-cycle hooks
//! - **Validation**: Pending-status checks and transition scenario validators

pub mod config;
pub mod definition;
pub mod edge;
pub mod entity;
pub mod error;
pub mod event;
pub mod graph;
pub mod node;
pub mod runtime;
pub mod source;
pub mod store;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{EngineConfig, RuntimeConfig, SourceConfig};
pub use definition::{NodeDefinition, TransitionSpec, WorkflowDefinition};
pub use edge::Transition;
pub use entity::{ActionContext, EntityWorkflow, Evaluator, NoEvaluator, WorkflowEntity};
pub use error::{EvaluationError, GraphError, SourceError, TransitionError};
pub use event::{EventKind, TransitionEvent, WorkflowListener};
pub use graph::WorkflowGraph;
pub use node::WorkflowNode;
pub use runtime::{WorkflowRuntime, WorkflowRuntimeBuilder, WorkflowState};
pub use source::WorkflowRegistry;
pub use store::{DefinitionStore, DirectoryStore, MemoryStore};
pub use validator::{ScenarioMode, ScenarioValidators, TransitionValidator, scenario_name};
