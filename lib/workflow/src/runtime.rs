//! Per-entity transition runtime.
//!
//! A [`WorkflowRuntime`] is bound to one entity instance. It holds the
//! entity's current node, runs transitions against the shared
//! [`WorkflowRegistry`], and fires lifecycle events. Transitions are
//! requested either directly through [`WorkflowRuntime::transition_to`] or by
//! the persistence layer through the save-cycle hooks
//! ([`before_write`](WorkflowRuntime::before_write),
//! [`after_write`](WorkflowRuntime::after_write),
//! [`after_read`](WorkflowRuntime::after_read)).
//!
//! A runtime is single-threaded: it is neither `Send` nor `Sync`, and at most
//! one transition runs on it at a time.

use crate::config::RuntimeConfig;
use crate::entity::{ActionContext, EntityWorkflow, Evaluator, NoEvaluator, WorkflowEntity};
use crate::error::{SourceError, TransitionError};
use crate::event::{EventKind, TransitionEvent, TransitionStep, WorkflowListener};
use crate::node::WorkflowNode;
use crate::source::WorkflowRegistry;
use rootcause::prelude::{Report, ResultExt};
use statusflow_core::{NodeRef, Result, WorkflowId};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Where an entity stands relative to its workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    /// Not inserted into any workflow yet.
    #[default]
    Unbound,
    /// Currently in this node.
    Bound(NodeRef),
}

impl WorkflowState {
    /// Returns the current node, if bound.
    #[must_use]
    pub fn node(&self) -> Option<&NodeRef> {
        match self {
            Self::Unbound => None,
            Self::Bound(node) => Some(node),
        }
    }
}

/// What requested a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// An explicit call; never deferred.
    Direct,
    /// The `before_write` hook; deferred when `transition_before_save` is off.
    SaveCycle,
}

/// Held for the duration of a transition; released on drop, including on error paths.
struct TransitionLock<'a> {
    held: &'a Cell<bool>,
}

impl<'a> TransitionLock<'a> {
    fn acquire(held: &'a Cell<bool>) -> Option<Self> {
        if held.replace(true) {
            None
        } else {
            Some(Self { held })
        }
    }
}

impl Drop for TransitionLock<'_> {
    fn drop(&mut self) {
        self.held.set(false);
    }
}

struct Subscription<E> {
    kinds: Vec<EventKind>,
    listener: Arc<dyn WorkflowListener<E>>,
}

/// Builder for a [`WorkflowRuntime`].
pub struct WorkflowRuntimeBuilder<E> {
    registry: Arc<WorkflowRegistry>,
    config: RuntimeConfig,
    evaluator: Arc<dyn Evaluator<E>>,
    subscriptions: Vec<Subscription<E>>,
}

impl<E: WorkflowEntity> WorkflowRuntimeBuilder<E> {
    /// Sets the runtime configuration.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the evaluator for guards and actions.
    #[must_use]
    pub fn evaluator(mut self, evaluator: impl Evaluator<E> + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Sets an evaluator shared with other runtimes.
    #[must_use]
    pub fn shared_evaluator(mut self, evaluator: Arc<dyn Evaluator<E>>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Registers a listener for the given event kinds.
    #[must_use]
    pub fn listen(
        mut self,
        kinds: &[EventKind],
        listener: impl WorkflowListener<E> + 'static,
    ) -> Self {
        self.subscriptions.push(Subscription {
            kinds: kinds.to_vec(),
            listener: Arc::new(listener),
        });
        self
    }

    /// Binds the runtime to an entity.
    ///
    /// Resolves the default workflow, then restores the entity's current node
    /// from its status attribute. An entity without a status is inserted into
    /// the default workflow when `auto_insert` is on, and left unbound otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the default workflow cannot be resolved or loaded,
    /// if the stored status does not name a node, or if the initial insertion
    /// fails.
    #[instrument(skip_all, fields(entity_type = %entity.entity_type()))]
    pub fn attach(self, entity: &mut E) -> Result<WorkflowRuntime<E>, TransitionError> {
        let entity_type = entity.entity_type().to_string();
        let attach_error = || TransitionError::Attach {
            entity_type: entity_type.clone(),
        };

        let default_workflow_id =
            resolve_default_workflow(&self.config, &self.registry, entity)
                .context_with(attach_error)?;
        self.registry
            .load_workflow(&default_workflow_id, false)
            .context_with(attach_error)?;

        let runtime = WorkflowRuntime {
            registry: self.registry,
            config: self.config,
            evaluator: self.evaluator,
            subscriptions: self.subscriptions,
            default_workflow_id,
            state: RefCell::new(WorkflowState::Unbound),
            locked: Cell::new(false),
            deferred: RefCell::new(Vec::new()),
        };

        runtime.restore(entity).context_with(attach_error)?;
        if !runtime.has_status() && runtime.config.auto_insert {
            runtime
                .insert_into_workflow(entity)
                .context_with(attach_error)?;
        }

        debug!(
            workflow_id = %runtime.default_workflow_id,
            status = ?runtime.current_status(),
            "runtime attached"
        );
        Ok(runtime)
    }
}

/// Picks the default workflow of an entity.
///
/// Order: configured id, then the workflow the entity type supplies, then the
/// id derived from the entity type name. A supplied definition is registered
/// under the derived id.
fn resolve_default_workflow<E: WorkflowEntity>(
    config: &RuntimeConfig,
    registry: &WorkflowRegistry,
    entity: &E,
) -> Result<WorkflowId, SourceError> {
    if let Some(workflow_id) = &config.default_workflow {
        return Ok(workflow_id.clone());
    }

    let derived = || {
        let name = format!("{}{}", config.workflow_name_prefix, entity.entity_type());
        WorkflowId::new(&name).map_err(|e| {
            Report::from(SourceError::InvalidReference {
                input: name,
                reason: e.reason.to_string(),
            })
        })
    };

    match entity.workflow_source() {
        Some(EntityWorkflow::Id(workflow_id)) => Ok(workflow_id),
        Some(EntityWorkflow::Definition(definition)) => {
            let workflow_id = derived()?;
            registry.add_workflow(&definition, &workflow_id)?;
            Ok(workflow_id)
        }
        None => derived(),
    }
}

/// The workflow state machine of one entity instance.
pub struct WorkflowRuntime<E> {
    registry: Arc<WorkflowRegistry>,
    config: RuntimeConfig,
    evaluator: Arc<dyn Evaluator<E>>,
    subscriptions: Vec<Subscription<E>>,
    default_workflow_id: WorkflowId,
    state: RefCell<WorkflowState>,
    locked: Cell<bool>,
    deferred: RefCell<Vec<TransitionStep>>,
}

impl<E> fmt::Debug for WorkflowRuntime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRuntime")
            .field("default_workflow_id", &self.default_workflow_id)
            .field("state", &self.state.borrow())
            .field("locked", &self.locked.get())
            .field("deferred", &self.deferred.borrow().len())
            .field("listeners", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl<E: WorkflowEntity> WorkflowRuntime<E> {
    /// Starts building a runtime over a shared registry.
    #[must_use]
    pub fn builder(registry: Arc<WorkflowRegistry>) -> WorkflowRuntimeBuilder<E> {
        WorkflowRuntimeBuilder {
            registry,
            config: RuntimeConfig::default(),
            evaluator: Arc::new(NoEvaluator),
            subscriptions: Vec::new(),
        }
    }

    /// Binds a runtime with the given configuration and no evaluator or listeners.
    ///
    /// # Errors
    ///
    /// See [`WorkflowRuntimeBuilder::attach`].
    pub fn attach(
        registry: Arc<WorkflowRegistry>,
        config: RuntimeConfig,
        entity: &mut E,
    ) -> Result<Self, TransitionError> {
        Self::builder(registry).config(config).attach(entity)
    }

    /// Registers a listener for the given event kinds.
    pub fn subscribe(
        &mut self,
        kinds: &[EventKind],
        listener: impl WorkflowListener<E> + 'static,
    ) {
        self.subscriptions.push(Subscription {
            kinds: kinds.to_vec(),
            listener: Arc::new(listener),
        });
    }

    /// Moves the entity to `candidate`.
    ///
    /// The candidate is a bare node id (resolved against the current workflow,
    /// or the default one when unbound) or `workflowId/nodeId`. An empty
    /// candidate inserts an unbound entity into its default workflow.
    /// Requesting the current node is a no-op. Direct transitions always run
    /// their actions and events immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate cannot be resolved or is not
    /// reachable, if another transition is running on this entity, or if
    /// the edge action fails. The current node is unchanged in every case.
    pub fn transition_to(
        &self,
        entity: &mut E,
        candidate: &str,
    ) -> Result<(), TransitionError> {
        self.run_transition(entity, Some(candidate), Trigger::Direct)
    }

    /// Inserts an unbound entity into the initial node of its default workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is already in a workflow, or if the
    /// initial node cannot be entered.
    pub fn insert_into_workflow(&self, entity: &mut E) -> Result<(), TransitionError> {
        self.run_transition(entity, None, Trigger::Direct)
    }

    /// Save-cycle hook called before the entity is written.
    ///
    /// Treats the entity's status attribute as the candidate and transitions to
    /// it, exactly as [`check_candidate`](Self::check_candidate) resolves it: an
    /// empty status inserts an unbound entity into its default workflow. With
    /// `transition_before_save` off, the node is committed now while the
    /// action and post-commit events wait for [`after_write`](Self::after_write).
    ///
    /// # Errors
    ///
    /// Returns an error if the pending status is empty while the entity is in
    /// a workflow, or if the transition fails.
    pub fn before_write(&self, entity: &mut E) -> Result<(), TransitionError> {
        let pending = entity.status();
        self.run_transition(entity, non_blank(pending.as_deref()), Trigger::SaveCycle)
    }

    /// Save-cycle hook called after the entity is written.
    ///
    /// Replays deferred steps in order. The first failing action stops the
    /// replay and the remaining steps are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a transition is running, or if a deferred action fails.
    pub fn after_write(&self, entity: &mut E) -> Result<(), TransitionError> {
        let Some(_lock) = TransitionLock::acquire(&self.locked) else {
            return Err(self.reentrancy(""));
        };

        let steps = std::mem::take(&mut *self.deferred.borrow_mut());
        let total = steps.len();
        for (position, step) in steps.into_iter().enumerate() {
            if let Err(report) = self.run_step(entity, step) {
                warn!(
                    error = %report.current_context(),
                    dropped = total - position - 1,
                    "deferred step failed, remaining steps dropped"
                );
                return Err(report);
            }
        }
        Ok(())
    }

    /// Save-cycle hook called after the entity is loaded.
    ///
    /// Re-reads the current node from the status attribute and drops any
    /// deferred steps.
    ///
    /// # Errors
    ///
    /// Returns an error if a transition is running, or if the stored status
    /// does not name a node.
    pub fn after_read(&self, entity: &mut E) -> Result<(), TransitionError> {
        let Some(_lock) = TransitionLock::acquire(&self.locked) else {
            return Err(self.reentrancy(""));
        };
        self.restore(entity)
    }

    /// Number of deferred steps waiting for [`after_write`](Self::after_write).
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Drops deferred steps without running them, returning how many were dropped.
    pub fn discard_deferred(&self) -> usize {
        let dropped = std::mem::take(&mut *self.deferred.borrow_mut()).len();
        if dropped > 0 {
            debug!(dropped, "deferred steps discarded");
        }
        dropped
    }

    /// Returns the current node, or `None` when unbound.
    #[must_use]
    pub fn current_status(&self) -> Option<NodeRef> {
        self.state.borrow().node().cloned()
    }

    /// Returns the full state.
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.state.borrow().clone()
    }

    /// Returns true if the entity is in a workflow.
    #[must_use]
    pub fn has_status(&self) -> bool {
        self.state.borrow().node().is_some()
    }

    /// Returns the node the entity is in.
    ///
    /// # Errors
    ///
    /// Returns an error if the node can no longer be loaded.
    pub fn current_node(&self) -> Result<Option<WorkflowNode>, SourceError> {
        self.current_status()
            .map(|node| self.registry.get_node(&node))
            .transpose()
    }

    /// Returns the workflow the entity is currently in.
    #[must_use]
    pub fn workflow_id(&self) -> Option<WorkflowId> {
        self.state.borrow().node().map(|node| node.workflow_id.clone())
    }

    /// Returns the workflow used to insert the entity and to complete bare ids while unbound.
    #[must_use]
    pub fn default_workflow_id(&self) -> &WorkflowId {
        &self.default_workflow_id
    }

    /// Returns the shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    /// Returns the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns true if `candidate` names the current node.
    ///
    /// Bare ids are completed with the current workflow; unbound entities equal nothing.
    #[must_use]
    pub fn status_equals(&self, candidate: &str) -> bool {
        let Some(current) = self.current_status() else {
            return false;
        };
        NodeRef::parse(candidate, Some(&current.workflow_id))
            .map(|node| node == current)
            .unwrap_or(false)
    }

    /// Returns the nodes one edge away, guards ignored.
    ///
    /// An unbound entity can only go to the initial node of its default workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be loaded.
    pub fn next_statuses(&self) -> Result<Vec<WorkflowNode>, SourceError> {
        match self.current_status() {
            None => Ok(vec![
                self.registry.get_initial_node(&self.default_workflow_id)?,
            ]),
            Some(current) => self.registry.get_next_nodes(&current),
        }
    }

    /// Returns the nodes one edge away whose guard holds for the entity.
    ///
    /// # Errors
    ///
    /// Returns an error if a node cannot be loaded or a guard cannot be evaluated.
    pub fn next_reachable_statuses(
        &self,
        entity: &E,
    ) -> Result<Vec<WorkflowNode>, TransitionError> {
        let source = self.current_status();
        let candidates = self
            .next_statuses()
            .context_with(|| TransitionError::Lookup {
                source: source.clone(),
                candidate: String::new(),
            })?;

        let mut reachable = Vec::with_capacity(candidates.len());
        for node in candidates {
            if self.guard_allows(entity, source.as_ref(), &node)? {
                reachable.push(node);
            }
        }
        Ok(reachable)
    }

    /// Returns every node of the current workflow, or of the default one when unbound.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow cannot be loaded.
    pub fn all_statuses(&self) -> Result<Vec<WorkflowNode>, SourceError> {
        let workflow_id = self
            .workflow_id()
            .unwrap_or_else(|| self.default_workflow_id.clone());
        self.registry.get_all_nodes(&workflow_id)
    }

    /// Returns true if the entity is in a node without outgoing transitions.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self.current_node(), Ok(Some(node)) if node.is_final())
    }

    /// Returns true if the entity is in the initial node of its workflow.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        let Some(current) = self.current_status() else {
            return false;
        };
        self.registry
            .get_initial_node(&current.workflow_id)
            .map(|initial| initial.node_ref() == &current)
            .unwrap_or(false)
    }

    /// Returns whether `candidate` names a node without outgoing transitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate does not name a node.
    pub fn is_final_status(&self, candidate: &str) -> Result<bool, SourceError> {
        Ok(self.find_node(candidate)?.is_final())
    }

    /// Returns whether `candidate` names the initial node of its workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate does not name a node.
    pub fn is_initial_status(&self, candidate: &str) -> Result<bool, SourceError> {
        let node = self.find_node(candidate)?;
        let initial = self.registry.get_initial_node(node.workflow_id())?;
        Ok(initial.node_ref() == node.node_ref())
    }

    /// Returns true if a transition to `candidate` would currently be accepted.
    ///
    /// The current node itself is not a next status. Repeated calls with the
    /// same entity state return the same answer.
    #[must_use]
    pub fn is_next_status(&self, entity: &E, candidate: &str) -> bool {
        let source = self.current_status();
        let Ok(destination) = self.resolve_candidate(source.as_ref(), Some(candidate)) else {
            return false;
        };
        if source.as_ref() == Some(destination.node_ref()) {
            return false;
        }
        self.check_reachable(entity, source.as_ref(), &destination)
            .is_ok()
    }

    /// Checks a pending status value without changing anything.
    ///
    /// Staying in the current node is accepted.
    ///
    /// # Errors
    ///
    /// Returns the error the corresponding transition would fail with.
    pub fn check_candidate(
        &self,
        entity: &E,
        candidate: Option<&str>,
    ) -> Result<NodeRef, TransitionError> {
        let source = self.current_status();
        let destination = self.resolve_candidate(source.as_ref(), candidate)?;
        if source.as_ref() != Some(destination.node_ref()) {
            self.check_reachable(entity, source.as_ref(), &destination)?;
        }
        Ok(destination.node_ref().clone())
    }

    /// Returns true if [`check_candidate`](Self::check_candidate) accepts the value.
    #[must_use]
    pub fn validate_candidate(&self, entity: &E, candidate: Option<&str>) -> bool {
        match self.check_candidate(entity, candidate) {
            Ok(_) => true,
            Err(report) => {
                debug!(error = %report.current_context(), "candidate rejected");
                false
            }
        }
    }

    #[instrument(skip(self, entity), fields(source = ?self.current_status()))]
    fn run_transition(
        &self,
        entity: &mut E,
        candidate: Option<&str>,
        trigger: Trigger,
    ) -> Result<(), TransitionError> {
        let Some(_lock) = TransitionLock::acquire(&self.locked) else {
            warn!("transition requested while another one is running");
            return Err(self.reentrancy(candidate.unwrap_or_default()));
        };

        let source = self.current_status();
        let destination = self.resolve_candidate(source.as_ref(), candidate)?;
        if source.as_ref() == Some(destination.node_ref()) {
            debug!("already in requested status");
            return Ok(());
        }

        let action = self.check_reachable(entity, source.as_ref(), &destination)?;
        self.apply(entity, source, &destination, action, trigger)
    }

    fn apply(
        &self,
        entity: &mut E,
        source: Option<NodeRef>,
        destination: &WorkflowNode,
        action: Option<String>,
        trigger: Trigger,
    ) -> Result<(), TransitionError> {
        let event = TransitionEvent::new(source, destination.node_ref().clone());
        let opening = if event.is_entering() {
            EventKind::EnterWorkflow
        } else {
            EventKind::BeforeTransition
        };

        let mut steps = vec![
            TransitionStep::Notify(opening, event.clone()),
            TransitionStep::Notify(EventKind::ProcessTransition, event.clone()),
        ];
        if let Some(action) = action {
            steps.push(TransitionStep::Action {
                action,
                event: event.clone(),
            });
        }
        steps.push(TransitionStep::Notify(EventKind::AfterTransition, event.clone()));
        if destination.is_final() {
            steps.push(TransitionStep::Notify(EventKind::FinalStatus, event.clone()));
        }

        if trigger == Trigger::SaveCycle && !self.config.transition_before_save {
            let (deferred, immediate): (Vec<_>, Vec<_>) =
                steps.into_iter().partition(TransitionStep::is_deferrable);
            for step in immediate {
                self.run_step(entity, step)?;
            }
            self.commit(entity, &event.destination);
            debug!(
                deferred = deferred.len(),
                destination = %event.destination,
                "transition committed, steps deferred"
            );
            self.deferred.borrow_mut().extend(deferred);
            return Ok(());
        }

        for step in steps {
            // The status is committed once the action has run.
            if matches!(step, TransitionStep::Notify(EventKind::AfterTransition, _)) {
                self.commit(entity, &event.destination);
            }
            self.run_step(entity, step)?;
        }

        info!(
            source = ?event.source,
            destination = %event.destination,
            "transition complete"
        );
        Ok(())
    }

    fn run_step(&self, entity: &mut E, step: TransitionStep) -> Result<(), TransitionError> {
        match step {
            TransitionStep::Notify(kind, event) => {
                self.dispatch(kind, &event, entity);
                Ok(())
            }
            TransitionStep::Action { action, event } => self.run_action(entity, &action, &event),
        }
    }

    fn commit(&self, entity: &mut E, destination: &NodeRef) {
        *self.state.borrow_mut() = WorkflowState::Bound(destination.clone());
        entity.set_status(Some(destination.to_string()));
    }

    fn run_action(
        &self,
        entity: &mut E,
        action: &str,
        event: &TransitionEvent,
    ) -> Result<(), TransitionError> {
        debug!(action, "running transition action");
        self.evaluator
            .invoke(
                action,
                ActionContext {
                    entity,
                    runtime: self,
                    event,
                },
            )
            .context_with(|| TransitionError::ActionFailed {
                source: event.source.clone(),
                destination: event.destination.clone(),
                action: action.to_string(),
            })
    }

    fn dispatch(&self, kind: EventKind, event: &TransitionEvent, entity: &mut E) {
        if !self.config.enable_events {
            return;
        }
        debug!(event = %kind, destination = %event.destination, "firing workflow event");

        entity.on_workflow_event(kind, event);
        for subscription in self
            .subscriptions
            .iter()
            .filter(|subscription| subscription.kinds.contains(&kind))
        {
            subscription.listener.on_event(kind, event, entity);
        }
    }

    /// Reads the current node from the status attribute.
    fn restore(&self, entity: &mut E) -> Result<(), TransitionError> {
        self.discard_deferred();

        let status = entity.status();
        let Some(text) = non_blank(status.as_deref()) else {
            *self.state.borrow_mut() = WorkflowState::Unbound;
            return Ok(());
        };

        let node = self.lookup(text, None)?;
        *self.state.borrow_mut() = WorkflowState::Bound(node.node_ref().clone());
        debug!(status = %node.node_ref(), "status restored");

        let event = TransitionEvent::new(None, node.node_ref().clone());
        self.dispatch(EventKind::Restored, &event, entity);
        Ok(())
    }

    /// Resolves a candidate, treating an empty one as the initial node of an unbound entity.
    fn resolve_candidate(
        &self,
        source: Option<&NodeRef>,
        candidate: Option<&str>,
    ) -> Result<WorkflowNode, TransitionError> {
        match (non_blank(candidate), source) {
            (Some(text), _) => self.lookup(text, source),
            (None, Some(source)) => Err(TransitionError::EmptyCandidate {
                source: source.clone(),
            }
            .into()),
            (None, None) => self
                .registry
                .get_initial_node(&self.default_workflow_id)
                .context(TransitionError::Lookup {
                    source: None,
                    candidate: String::new(),
                }),
        }
    }

    fn lookup(
        &self,
        text: &str,
        source: Option<&NodeRef>,
    ) -> Result<WorkflowNode, TransitionError> {
        let workflow_id = source.map_or(&self.default_workflow_id, |node| &node.workflow_id);
        self.registry
            .get_node_definition(text, Some(workflow_id))
            .context_with(|| TransitionError::Lookup {
                source: source.cloned(),
                candidate: text.to_string(),
            })
    }

    fn find_node(&self, candidate: &str) -> Result<WorkflowNode, SourceError> {
        let workflow_id = self
            .workflow_id()
            .unwrap_or_else(|| self.default_workflow_id.clone());
        self.registry
            .get_node_definition(candidate, Some(&workflow_id))
    }

    /// Checks the edge and the guard, returning the edge action.
    fn check_reachable(
        &self,
        entity: &E,
        source: Option<&NodeRef>,
        destination: &WorkflowNode,
    ) -> Result<Option<String>, TransitionError> {
        let target = destination.node_ref();
        let unreachable = || TransitionError::Unreachable {
            source: source.cloned(),
            destination: target.clone(),
        };
        let lookup = || TransitionError::Lookup {
            source: source.cloned(),
            candidate: target.to_string(),
        };

        let action = match source {
            None => {
                let initial = self
                    .registry
                    .get_initial_node(&target.workflow_id)
                    .context_with(lookup)?;
                if initial.node_ref() != target {
                    return Err(unreachable().into());
                }
                None
            }
            Some(source) => {
                self.registry
                    .get_transition(source, target)
                    .context_with(lookup)?
                    .ok_or_else(unreachable)?
                    .action
            }
        };

        if !self.guard_allows(entity, source, destination)? {
            return Err(unreachable().into());
        }
        Ok(action)
    }

    fn guard_allows(
        &self,
        entity: &E,
        source: Option<&NodeRef>,
        destination: &WorkflowNode,
    ) -> Result<bool, TransitionError> {
        let Some(constraint) = destination.constraint() else {
            return Ok(true);
        };
        let allowed = self
            .evaluator
            .evaluate(constraint, entity)
            .context_with(|| TransitionError::GuardFailed {
                source: source.cloned(),
                destination: destination.node_ref().clone(),
            })?;
        if !allowed {
            debug!(constraint, destination = %destination.node_ref(), "guard rejected");
        }
        Ok(allowed)
    }

    fn reentrancy(&self, candidate: &str) -> Report<TransitionError> {
        TransitionError::Reentrancy {
            source: self.current_status(),
            candidate: candidate.to_string(),
        }
        .into()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
