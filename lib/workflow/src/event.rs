//! Lifecycle events fired around status transitions.
//!
//! A successful transition fires, in order:
//! 1. `EnterWorkflow` (entity was unbound) or `BeforeTransition`
//! 2. `ProcessTransition`, then the edge action runs and the status is committed
//! 3. `AfterTransition`
//! 4. `FinalStatus`, when the new status has no outgoing transitions
//!
//! `Restored` is fired alone when an entity is rebound from its persisted
//! status attribute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statusflow_core::NodeRef;
use std::fmt;

/// The kind of a lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The entity entered a workflow from the unbound state.
    EnterWorkflow,
    /// A transition between two statuses is about to run.
    BeforeTransition,
    /// The transition is being processed; the edge action runs next.
    ProcessTransition,
    /// The status has been committed.
    AfterTransition,
    /// The new status is terminal.
    FinalStatus,
    /// The entity was rebound from its persisted status without a transition.
    Restored,
}

impl EventKind {
    /// Every event kind, in firing order.
    pub const ALL: [EventKind; 6] = [
        Self::EnterWorkflow,
        Self::BeforeTransition,
        Self::ProcessTransition,
        Self::AfterTransition,
        Self::FinalStatus,
        Self::Restored,
    ];

    /// Returns the kind as a static string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnterWorkflow => "enter_workflow",
            Self::BeforeTransition => "before_transition",
            Self::ProcessTransition => "process_transition",
            Self::AfterTransition => "after_transition",
            Self::FinalStatus => "final_status",
            Self::Restored => "restored",
        }
    }

    /// Returns true for the kinds that may be held back until after the entity is written.
    #[must_use]
    pub fn is_deferrable(&self) -> bool {
        matches!(
            self,
            Self::ProcessTransition | Self::AfterTransition | Self::FinalStatus
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transition attempt, as seen by listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    /// The status the entity was in, `None` when entering a workflow.
    pub source: Option<NodeRef>,
    /// The status the entity moves to.
    pub destination: NodeRef,
    /// When the attempt started.
    pub occurred_at: DateTime<Utc>,
}

impl TransitionEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(source: Option<NodeRef>, destination: NodeRef) -> Self {
        Self {
            source,
            destination,
            occurred_at: Utc::now(),
        }
    }

    /// Returns true if the entity was unbound before this transition.
    #[must_use]
    pub fn is_entering(&self) -> bool {
        self.source.is_none()
    }
}

/// An observer of lifecycle events for entities of type `E`.
///
/// Listeners are registered per event kind on a runtime and called in
/// registration order, after the entity's own
/// [`on_workflow_event`](crate::entity::WorkflowEntity::on_workflow_event) hook.
pub trait WorkflowListener<E> {
    /// Called once per fired event of a kind this listener subscribed to.
    fn on_event(&self, kind: EventKind, event: &TransitionEvent, entity: &E);
}

impl<E, F> WorkflowListener<E> for F
where
    F: Fn(EventKind, &TransitionEvent, &E),
{
    fn on_event(&self, kind: EventKind, event: &TransitionEvent, entity: &E) {
        self(kind, event, entity)
    }
}

/// One step of a transition after the guard has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransitionStep {
    /// Fire a notification.
    Notify(EventKind, TransitionEvent),
    /// Run the edge action.
    Action {
        action: String,
        event: TransitionEvent,
    },
}

impl TransitionStep {
    /// Edge actions and post-commit notifications can wait for the entity to be written.
    pub(crate) fn is_deferrable(&self) -> bool {
        match self {
            Self::Notify(kind, _) => kind.is_deferrable(),
            Self::Action { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_post_commit_kinds_are_deferrable() {
        let deferrable: Vec<_> = EventKind::ALL
            .iter()
            .filter(|kind| kind.is_deferrable())
            .copied()
            .collect();
        assert_eq!(
            deferrable,
            vec![
                EventKind::ProcessTransition,
                EventKind::AfterTransition,
                EventKind::FinalStatus
            ]
        );
    }

    #[test]
    fn actions_are_deferrable_but_opening_events_are_not() {
        let event = TransitionEvent::new(None, "post/draft".parse().expect("valid"));
        let action = TransitionStep::Action {
            action: "notify".to_string(),
            event: event.clone(),
        };
        assert!(action.is_deferrable());
        assert!(!TransitionStep::Notify(EventKind::EnterWorkflow, event.clone()).is_deferrable());
        assert!(TransitionStep::Notify(EventKind::AfterTransition, event).is_deferrable());
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&EventKind::FinalStatus).expect("serialize");
        assert_eq!(json, "\"final_status\"");
        assert_eq!(EventKind::FinalStatus.to_string(), "final_status");
    }

    #[test]
    fn entering_event_has_no_source() {
        let destination: NodeRef = "post/draft".parse().expect("valid");
        let event = TransitionEvent::new(None, destination);
        assert!(event.is_entering());
    }

    #[test]
    fn closures_are_listeners() {
        use std::cell::Cell;

        let calls = Cell::new(0);
        let listener = |_: EventKind, _: &TransitionEvent, _: &()| calls.set(calls.get() + 1);
        let event = TransitionEvent::new(None, "post/draft".parse().expect("valid"));
        listener.on_event(EventKind::EnterWorkflow, &event, &());
        assert_eq!(calls.get(), 1);
    }
}
