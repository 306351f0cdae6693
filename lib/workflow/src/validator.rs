//! Validation of a pending status value.
//!
//! [`TransitionValidator`] checks that the status attribute of an entity
//! names a node the entity may move to, recording the failure on the
//! attribute. Optionally it also runs scenario validators named after the
//! transition, such as `draft_review` for `draft -> review`.

use crate::entity::WorkflowEntity;
use crate::runtime::WorkflowRuntime;
use regex::Regex;
use serde::Deserialize;
use statusflow_core::{NodeRef, SEPARATOR};
use tracing::{debug, warn};

/// How scenario validators are matched against a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    /// Only the status check runs.
    #[default]
    Disabled,
    /// Run validators declared under the exact scenario name.
    Exact,
    /// Also run validators declared as `/regex/` that match the scenario name.
    Pattern,
}

/// Validators grouped by scenario name, supplied by the host.
pub trait ScenarioValidators<E> {
    /// Scenario names that have validators; `/regex/` entries are patterns.
    fn declared_scenarios(&self) -> Vec<String>;

    /// Runs the validators of one declared scenario, recording failures on the entity.
    fn validate_scenario(&self, scenario: &str, entity: &mut E);
}

/// Checks pending status values.
#[derive(Debug, Clone)]
pub struct TransitionValidator {
    attribute: String,
    mode: ScenarioMode,
}

impl TransitionValidator {
    /// Creates a validator that records errors on `attribute`.
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            mode: ScenarioMode::Disabled,
        }
    }

    /// Creates a validator for the status attribute configured on the runtime.
    #[must_use]
    pub fn for_runtime<E>(runtime: &WorkflowRuntime<E>) -> Self
    where
        E: WorkflowEntity,
    {
        Self::new(runtime.config().status_attribute.clone())
    }

    /// Sets the scenario mode.
    #[must_use]
    pub fn with_scenarios(mut self, mode: ScenarioMode) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the attribute errors are recorded on.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Checks the entity's pending status.
    ///
    /// Returns false and records an error on the attribute if the value is
    /// empty while the entity is in a workflow, does not resolve to a node, or
    /// names a node that cannot be reached from the current one. Keeping the
    /// current status is valid.
    pub fn validate<E: WorkflowEntity>(
        &self,
        runtime: &WorkflowRuntime<E>,
        entity: &mut E,
    ) -> bool {
        self.check(runtime, entity).is_some()
    }

    /// Like [`validate`](Self::validate), then runs the scenario validators
    /// that apply when the status changes.
    pub fn validate_with<E: WorkflowEntity>(
        &self,
        runtime: &WorkflowRuntime<E>,
        entity: &mut E,
        scenarios: &dyn ScenarioValidators<E>,
    ) -> bool {
        let Some(destination) = self.check(runtime, entity) else {
            return false;
        };

        let source = runtime.current_status();
        if self.mode == ScenarioMode::Disabled || source.as_ref() == Some(&destination) {
            return true;
        }

        let scenario = scenario_name(source.as_ref(), &destination);
        for declared in scenarios.declared_scenarios() {
            if self.applies(&declared, &scenario) {
                debug!(scenario = %scenario, declared = %declared, "running scenario validators");
                scenarios.validate_scenario(&declared, entity);
            }
        }
        true
    }

    fn check<E: WorkflowEntity>(
        &self,
        runtime: &WorkflowRuntime<E>,
        entity: &mut E,
    ) -> Option<NodeRef> {
        let pending = entity.status();
        match runtime.check_candidate(entity, pending.as_deref()) {
            Ok(destination) => Some(destination),
            Err(report) => {
                let message = report.current_context().to_string();
                debug!(attribute = %self.attribute, error = %message, "status rejected");
                entity.add_error(&self.attribute, message);
                None
            }
        }
    }

    fn applies(&self, declared: &str, scenario: &str) -> bool {
        if declared == scenario {
            return true;
        }
        if self.mode != ScenarioMode::Pattern {
            return false;
        }
        let Some(pattern) = declared
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        else {
            return false;
        };
        match Regex::new(pattern) {
            Ok(regex) => regex.is_match(scenario),
            Err(e) => {
                warn!(declared, error = %e, "invalid scenario pattern, skipping");
                false
            }
        }
    }
}

/// Returns the scenario name of a transition.
///
/// `draft -> review` is `draft_review`, entering a workflow at `draft` is
/// `_draft`, and a target in another workflow keeps its qualifier:
/// `rejected_archive/stored`.
#[must_use]
pub fn scenario_name(source: Option<&NodeRef>, destination: &NodeRef) -> String {
    let target = match source {
        Some(source) if !destination.is_in(&source.workflow_id) => {
            format!("{}{SEPARATOR}{}", destination.workflow_id, destination.node_id)
        }
        _ => destination.node_id.to_string(),
    };
    let origin = source.map(|node| node.node_id.to_string()).unwrap_or_default();
    format!("{origin}_{target}")
}
