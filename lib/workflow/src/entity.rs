//! Collaborator interfaces the engine consumes.
//!
//! The engine never stores entities or interprets expressions itself:
//! - [`WorkflowEntity`] is the persisted object carrying the status attribute
//! - [`Evaluator`] decides guards and runs edge actions

use crate::definition::WorkflowDefinition;
use crate::error::EvaluationError;
use crate::event::{EventKind, TransitionEvent};
use crate::runtime::WorkflowRuntime;
use statusflow_core::{Result, WorkflowId};

/// Where an entity type says its workflow comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityWorkflow {
    /// Use the workflow with this id from the registry.
    Id(WorkflowId),
    /// Register this definition under the name-derived workflow id and use it.
    Definition(WorkflowDefinition),
}

/// A persisted object whose status follows a workflow.
///
/// The status attribute holds either a bare node id or `workflowId/nodeId`.
/// The runtime always writes the qualified form.
pub trait WorkflowEntity {
    /// Name of the entity type, used to derive the default workflow id.
    fn entity_type(&self) -> &str;

    /// Returns the raw status attribute value.
    fn status(&self) -> Option<String>;

    /// Overwrites the raw status attribute value.
    fn set_status(&mut self, status: Option<String>);

    /// Workflow supplied by the entity type itself, if any.
    fn workflow_source(&self) -> Option<EntityWorkflow> {
        None
    }

    /// Records a validation failure on an attribute.
    fn add_error(&mut self, attribute: &str, message: String);

    /// Optional hook called for every fired lifecycle event, before registered listeners.
    fn on_workflow_event(&mut self, _kind: EventKind, _event: &TransitionEvent) {}
}

/// What an edge action gets to work with.
///
/// The runtime is reachable so actions can query it; asking it for another
/// transition while this one is running fails with a reentrancy error.
pub struct ActionContext<'a, E> {
    /// The entity being transitioned.
    pub entity: &'a mut E,
    /// The runtime running the transition.
    pub runtime: &'a WorkflowRuntime<E>,
    /// The transition being processed.
    pub event: &'a TransitionEvent,
}

/// Evaluates guard constraints and runs edge actions for entities of type `E`.
pub trait Evaluator<E> {
    /// Returns whether the guard expression holds for the entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression cannot be evaluated.
    fn evaluate(&self, expression: &str, entity: &E) -> Result<bool, EvaluationError>;

    /// Runs an edge action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails; the transition is then not committed.
    fn invoke(&self, action: &str, context: ActionContext<'_, E>) -> Result<(), EvaluationError>;
}

/// Evaluator for workflows without guards or actions.
///
/// Any guard or action reaching it is an error, so a definition that needs a
/// real evaluator fails loudly instead of silently passing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvaluator;

impl<E> Evaluator<E> for NoEvaluator {
    fn evaluate(&self, expression: &str, _entity: &E) -> Result<bool, EvaluationError> {
        Err(EvaluationError::new(expression, "no evaluator configured").into())
    }

    fn invoke(
        &self,
        action: &str,
        _context: ActionContext<'_, E>,
    ) -> Result<(), EvaluationError> {
        Err(EvaluationError::new(action, "no evaluator configured").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_evaluator_rejects_guards() {
        let err = Evaluator::<()>::evaluate(&NoEvaluator, "is_admin", &()).unwrap_err();
        assert_eq!(err.current_context().expression, "is_admin");
    }
}
