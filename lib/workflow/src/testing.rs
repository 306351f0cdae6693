//! Fixtures shared by the unit tests.

use crate::definition::{NodeDefinition, WorkflowDefinition};
use crate::entity::{ActionContext, EntityWorkflow, Evaluator, WorkflowEntity};
use crate::error::{EvaluationError, TransitionError};
use crate::event::{EventKind, TransitionEvent, WorkflowListener};
use crate::source::WorkflowRegistry;
use crate::store::MemoryStore;
use statusflow_core::{Result, WorkflowId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

pub(crate) fn wf(name: &str) -> WorkflowId {
    WorkflowId::new(name).expect("valid workflow id")
}

/// draft -> review -> {published, rejected}; rejected -> archive/stored.
pub(crate) fn post_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("draft")
        .with_node(NodeDefinition::new("draft").with_targets("review"))
        .with_node(
            NodeDefinition::new("review")
                .with_transition("published", Some("notify_author"))
                .with_transition("rejected", None),
        )
        .with_node(NodeDefinition::new("published"))
        .with_node(NodeDefinition::new("rejected").with_targets("archive/stored"))
}

pub(crate) fn archive_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("stored").with_node(NodeDefinition::new("stored"))
}

pub(crate) fn post_registry() -> Arc<WorkflowRegistry> {
    let store = MemoryStore::new()
        .with(wf("swPost"), post_definition())
        .with(wf("archive"), archive_definition());
    Arc::new(WorkflowRegistry::new(store))
}

#[derive(Debug, Default)]
pub(crate) struct Post {
    pub status: Option<String>,
    pub flags: HashSet<String>,
    pub errors: Vec<(String, String)>,
    pub events: Vec<(EventKind, TransitionEvent)>,
    pub source: Option<EntityWorkflow>,
}

impl Post {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_flag(mut self, flag: &str) -> Self {
        self.flags.insert(flag.to_string());
        self
    }

    pub fn with_source(mut self, source: EntityWorkflow) -> Self {
        self.source = Some(source);
        self
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|(kind, _)| *kind).collect()
    }
}

impl WorkflowEntity for Post {
    fn entity_type(&self) -> &str {
        "Post"
    }

    fn status(&self) -> Option<String> {
        self.status.clone()
    }

    fn set_status(&mut self, status: Option<String>) {
        self.status = status;
    }

    fn workflow_source(&self) -> Option<EntityWorkflow> {
        self.source.clone()
    }

    fn add_error(&mut self, attribute: &str, message: String) {
        self.errors.push((attribute.to_string(), message));
    }

    fn on_workflow_event(&mut self, kind: EventKind, event: &TransitionEvent) {
        self.events.push((kind, event.clone()));
    }
}

/// Guards hold when the entity carries a flag of the same name.
///
/// Actions are recorded. `fail` fails, `broken` cannot be evaluated as a guard,
/// and `reenter:<status>` asks the runtime for a nested transition.
#[derive(Default)]
pub(crate) struct ScriptedEvaluator {
    invoked: RefCell<Vec<String>>,
    nested: RefCell<Vec<TransitionError>>,
}

impl ScriptedEvaluator {
    pub fn invoked(&self) -> Vec<String> {
        self.invoked.borrow().clone()
    }

    pub fn nested(&self) -> Vec<TransitionError> {
        self.nested.borrow().clone()
    }
}

impl Evaluator<Post> for ScriptedEvaluator {
    fn evaluate(&self, expression: &str, entity: &Post) -> Result<bool, EvaluationError> {
        if expression == "broken" {
            return Err(EvaluationError::new(expression, "cannot evaluate").into());
        }
        Ok(entity.flags.contains(expression))
    }

    fn invoke(
        &self,
        action: &str,
        context: ActionContext<'_, Post>,
    ) -> Result<(), EvaluationError> {
        self.invoked.borrow_mut().push(action.to_string());
        if action == "fail" {
            return Err(EvaluationError::new(action, "action failed").into());
        }
        if let Some(target) = action.strip_prefix("reenter:") {
            if let Err(report) = context.runtime.transition_to(context.entity, target) {
                self.nested
                    .borrow_mut()
                    .push(report.current_context().clone());
                return Err(EvaluationError::new(action, "nested transition rejected").into());
            }
        }
        Ok(())
    }
}

/// Records each event it receives with the entity's status at that moment.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingListener {
    seen: Rc<RefCell<Vec<(EventKind, Option<String>)>>>,
}

impl RecordingListener {
    pub fn seen(&self) -> Vec<(EventKind, Option<String>)> {
        self.seen.borrow().clone()
    }

    pub fn clear(&self) {
        self.seen.borrow_mut().clear();
    }
}

impl WorkflowListener<Post> for RecordingListener {
    fn on_event(&self, kind: EventKind, _event: &TransitionEvent, entity: &Post) {
        self.seen.borrow_mut().push((kind, entity.status.clone()));
    }
}
