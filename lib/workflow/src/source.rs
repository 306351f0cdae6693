//! The workflow registry.
//!
//! The registry resolves workflow ids to checked graphs. Graphs are parsed
//! from the backing [`DefinitionStore`] on first use and cached for the life
//! of the registry, which applications share between runtimes through an
//! `Arc`.
//!
//! Reads of a cached graph only take the cache read lock. The first load of
//! an id, a forced reload and a programmatic registration are serialized by
//! a mutex dedicated to that id, so concurrent first access parses once and
//! never observes a partially built graph.

use crate::config::SourceConfig;
use crate::definition::WorkflowDefinition;
use crate::edge::Transition;
use crate::error::SourceError;
use crate::graph::WorkflowGraph;
use crate::node::WorkflowNode;
use crate::store::{DefinitionStore, DirectoryStore, MemoryStore};
use rootcause::prelude::ResultExt;
use statusflow_core::{NodeRef, Result, WorkflowId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, instrument, warn};

/// Process-wide cache of workflow graphs backed by a definition store.
pub struct WorkflowRegistry {
    store: Box<dyn DefinitionStore>,
    cache: RwLock<HashMap<WorkflowId, Arc<WorkflowGraph>>>,
    load_locks: Mutex<HashMap<WorkflowId, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("loaded", &self.loaded_workflows())
            .finish_non_exhaustive()
    }
}

impl WorkflowRegistry {
    /// Creates a registry over a definition store.
    #[must_use]
    pub fn new(store: impl DefinitionStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            cache: RwLock::new(HashMap::new()),
            load_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry with no backing definitions; workflows must be added.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Creates a registry from configuration.
    #[must_use]
    pub fn from_config(config: &SourceConfig) -> Self {
        match &config.definition_dir {
            Some(dir) => Self::new(DirectoryStore::new(dir)),
            None => Self::in_memory(),
        }
    }

    /// Returns the graph of a workflow, loading it on first access.
    ///
    /// With `force_reload` the definition is read and parsed again even if
    /// cached. A failed reload leaves the cached graph in place.
    ///
    /// # Errors
    ///
    /// Returns an error if no definition exists for the id, if the store
    /// fails, or if the definition is malformed. A transition into another
    /// workflow whose node does not exist makes the definition malformed.
    #[instrument(skip_all, fields(workflow_id = %workflow_id, force_reload = force_reload))]
    pub fn load_workflow(
        &self,
        workflow_id: &WorkflowId,
        force_reload: bool,
    ) -> Result<Arc<WorkflowGraph>, SourceError> {
        if !force_reload {
            if let Some(graph) = self.cached(workflow_id) {
                return Ok(graph);
            }
        }

        let lock = self.load_lock(workflow_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another thread may have finished the load while we waited.
        if !force_reload {
            if let Some(graph) = self.cached(workflow_id) {
                return Ok(graph);
            }
        }

        let definition =
            self.store
                .load(workflow_id)?
                .ok_or_else(|| SourceError::WorkflowNotFound {
                    workflow_id: workflow_id.clone(),
                })?;
        let graph = build_graph(workflow_id, &definition)?;
        self.check_foreign_targets(&graph)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow_id.clone(), Arc::clone(&graph));

        info!(
            nodes = graph.node_count(),
            reload = force_reload,
            "workflow loaded"
        );
        Ok(graph)
    }

    /// Registers an in-memory definition under `workflow_id`.
    ///
    /// The first registration wins: if the id is already cached, whether
    /// loaded from the store or added earlier, the call logs a warning and
    /// returns `Ok(false)` without touching the cached graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition is malformed, including a
    /// transition into a node of another workflow that does not exist.
    #[instrument(skip_all, fields(workflow_id = %workflow_id))]
    pub fn add_workflow(
        &self,
        definition: &WorkflowDefinition,
        workflow_id: &WorkflowId,
    ) -> Result<bool, SourceError> {
        let lock = self.load_lock(workflow_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if self.cached(workflow_id).is_some() {
            warn!("workflow already registered, keeping the first definition");
            return Ok(false);
        }

        let graph = build_graph(workflow_id, definition)?;
        self.check_foreign_targets(&graph)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(workflow_id.clone(), graph);
        info!("workflow registered");
        Ok(true)
    }

    /// Returns true if the workflow is cached.
    #[must_use]
    pub fn is_loaded(&self, workflow_id: &WorkflowId) -> bool {
        self.cached(workflow_id).is_some()
    }

    /// Returns the ids of all cached workflows, sorted.
    #[must_use]
    pub fn loaded_workflows(&self) -> Vec<WorkflowId> {
        let mut ids: Vec<_> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Resolves a textual status reference to its node.
    ///
    /// Bare ids are completed with `default_workflow`.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid reference, or if the
    /// workflow or the node does not exist.
    pub fn get_node_definition(
        &self,
        text: &str,
        default_workflow: Option<&WorkflowId>,
    ) -> Result<WorkflowNode, SourceError> {
        let node = NodeRef::parse(text, default_workflow).map_err(|e| {
            SourceError::InvalidReference {
                input: e.input,
                reason: e.reason.to_string(),
            }
        })?;
        self.get_node(&node)
    }

    /// Returns the node a reference points to.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow or the node does not exist.
    pub fn get_node(&self, node: &NodeRef) -> Result<WorkflowNode, SourceError> {
        let graph = self.load_workflow(&node.workflow_id, false)?;
        graph
            .node(&node.node_id)
            .cloned()
            .ok_or_else(|| SourceError::NodeNotFound { node: node.clone() }.into())
    }

    /// Returns the nodes reachable in one transition from `node`, guards ignored.
    ///
    /// Targets in other workflows are resolved through their own graphs.
    ///
    /// # Errors
    ///
    /// Returns an error if `node` or one of its targets does not exist.
    pub fn get_next_nodes(&self, node: &NodeRef) -> Result<Vec<WorkflowNode>, SourceError> {
        self.get_node(node)?
            .transitions()
            .iter()
            .map(|transition| self.get_node(&transition.target))
            .collect()
    }

    /// Returns true if the edge `source -> target` exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` does not exist.
    pub fn is_next_node(
        &self,
        source: &NodeRef,
        target: &NodeRef,
    ) -> Result<bool, SourceError> {
        Ok(self.get_transition(source, target)?.is_some())
    }

    /// Returns the transition `source -> target`, if the edge exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `source` does not exist.
    pub fn get_transition(
        &self,
        source: &NodeRef,
        target: &NodeRef,
    ) -> Result<Option<Transition>, SourceError> {
        Ok(self.get_node(source)?.transition_to(target).cloned())
    }

    /// Returns the initial node of a workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow does not exist.
    pub fn get_initial_node(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<WorkflowNode, SourceError> {
        Ok(self
            .load_workflow(workflow_id, false)?
            .initial_node()
            .clone())
    }

    /// Returns every node of a workflow in definition order.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow does not exist.
    pub fn get_all_nodes(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowNode>, SourceError> {
        Ok(self
            .load_workflow(workflow_id, false)?
            .nodes()
            .cloned()
            .collect())
    }

    /// Checks that every transition leaving `graph` lands on an existing node.
    ///
    /// Foreign workflows are looked up in the cache or read from the store
    /// without being cached, so no load lock is taken and workflows that point
    /// at each other cannot deadlock.
    fn check_foreign_targets(&self, graph: &WorkflowGraph) -> Result<(), SourceError> {
        for node in graph.nodes() {
            for transition in node.transitions() {
                if !transition.crosses_from(node.node_ref()) {
                    continue;
                }
                self.foreign_target_exists(&transition.target)
                    .context_with(|| SourceError::Malformed {
                        workflow_id: graph.workflow_id().clone(),
                    })?;
            }
        }
        Ok(())
    }

    fn foreign_target_exists(&self, target: &NodeRef) -> Result<(), SourceError> {
        let exists = match self.cached(&target.workflow_id) {
            Some(graph) => graph.node(&target.node_id).is_some(),
            None => {
                let definition = self.store.load(&target.workflow_id)?.ok_or_else(|| {
                    SourceError::WorkflowNotFound {
                        workflow_id: target.workflow_id.clone(),
                    }
                })?;
                definition.node.iter().any(|node| {
                    NodeRef::parse(&node.id, Some(&target.workflow_id))
                        .is_ok_and(|parsed| &parsed == target)
                })
            }
        };
        if exists {
            Ok(())
        } else {
            Err(SourceError::NodeNotFound {
                node: target.clone(),
            }
            .into())
        }
    }

    fn cached(&self, workflow_id: &WorkflowId) -> Option<Arc<WorkflowGraph>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(workflow_id)
            .cloned()
    }

    fn load_lock(&self, workflow_id: &WorkflowId) -> Arc<Mutex<()>> {
        let mut locks = self
            .load_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(workflow_id.clone()).or_default())
    }
}

fn build_graph(
    workflow_id: &WorkflowId,
    definition: &WorkflowDefinition,
) -> Result<Arc<WorkflowGraph>, SourceError> {
    let graph = WorkflowGraph::from_definition(workflow_id.clone(), definition).context(
        SourceError::Malformed {
            workflow_id: workflow_id.clone(),
        },
    )?;

    for node in graph.unreachable_nodes() {
        warn!(
            workflow_id = %workflow_id,
            node = %node.id(),
            "node cannot be reached from the initial node"
        );
    }
    debug!(
        workflow_id = %workflow_id,
        terminal = graph.terminal_nodes().len(),
        "workflow graph built"
    );

    Ok(Arc::new(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NodeDefinition;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn wf(name: &str) -> WorkflowId {
        WorkflowId::new(name).expect("valid workflow id")
    }

    fn node_ref(text: &str) -> NodeRef {
        text.parse().expect("valid node ref")
    }

    fn post_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("draft")
            .with_node(NodeDefinition::new("draft").with_targets("review"))
            .with_node(
                NodeDefinition::new("review")
                    .with_targets("rejected")
                    .with_transition("published", Some("notify_author")),
            )
            .with_node(NodeDefinition::new("published"))
            .with_node(NodeDefinition::new("rejected").with_targets("archive/stored"))
    }

    fn archive_definition() -> WorkflowDefinition {
        WorkflowDefinition::new("stored").with_node(NodeDefinition::new("stored"))
    }

    fn registry() -> WorkflowRegistry {
        WorkflowRegistry::new(
            MemoryStore::new()
                .with(wf("post"), post_definition())
                .with(wf("archive"), archive_definition()),
        )
    }

    /// Store that counts how often the definition of `counted` is read.
    struct CountingStore {
        inner: MemoryStore,
        counted: WorkflowId,
        loads: Arc<AtomicUsize>,
    }

    impl CountingStore {
        fn new(loads: &Arc<AtomicUsize>) -> Self {
            Self {
                inner: MemoryStore::new()
                    .with(wf("post"), post_definition())
                    .with(wf("archive"), archive_definition()),
                counted: wf("post"),
                loads: Arc::clone(loads),
            }
        }
    }

    impl DefinitionStore for CountingStore {
        fn load(
            &self,
            workflow_id: &WorkflowId,
        ) -> Result<Option<WorkflowDefinition>, SourceError> {
            if workflow_id == &self.counted {
                self.loads.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.load(workflow_id)
        }
    }

    /// Store whose definitions the test can still change after handing it over.
    struct SharedStore(Arc<MemoryStore>);

    impl DefinitionStore for SharedStore {
        fn load(
            &self,
            workflow_id: &WorkflowId,
        ) -> Result<Option<WorkflowDefinition>, SourceError> {
            self.0.load(workflow_id)
        }
    }

    #[test]
    fn loads_lazily_and_caches() {
        let loads = Arc::new(AtomicUsize::new(0));
        let registry = WorkflowRegistry::new(CountingStore::new(&loads));

        assert!(!registry.is_loaded(&wf("post")));
        let first = registry.load_workflow(&wf("post"), false).expect("load");
        let second = registry.load_workflow(&wf("post"), false).expect("load");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        registry.load_workflow(&wf("post"), true).expect("reload");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_access_parses_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(WorkflowRegistry::new(CountingStore::new(&loads)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry
                        .load_workflow(&wf("post"), false)
                        .map(|graph| graph.node_count())
                        .ok()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().expect("thread finished"), Some(4));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_workflow_is_not_found() {
        let err = registry().load_workflow(&wf("missing"), false).unwrap_err();
        assert_eq!(
            err.current_context(),
            &SourceError::WorkflowNotFound {
                workflow_id: wf("missing")
            }
        );
    }

    #[test]
    fn malformed_definition_is_not_cached() {
        let registry = WorkflowRegistry::in_memory();
        let broken = WorkflowDefinition::new("nowhere").with_node(NodeDefinition::new("a"));

        let err = registry.add_workflow(&broken, &wf("broken")).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::Malformed { .. }
        ));
        assert!(!registry.is_loaded(&wf("broken")));
    }

    #[test]
    fn first_registration_wins() {
        let registry = WorkflowRegistry::in_memory();
        registry
            .add_workflow(&archive_definition(), &wf("archive"))
            .expect("register archive");
        assert!(
            registry
                .add_workflow(&post_definition(), &wf("post"))
                .expect("register")
        );
        assert!(
            !registry
                .add_workflow(&archive_definition(), &wf("post"))
                .expect("second registration is a no-op")
        );

        let initial = registry.get_initial_node(&wf("post")).expect("lookup");
        assert_eq!(initial.id().as_str(), "draft");
    }

    #[test]
    fn failed_reload_keeps_cached_graph() {
        let store = Arc::new(
            MemoryStore::new()
                .with(wf("post"), post_definition())
                .with(wf("archive"), archive_definition()),
        );
        let registry = WorkflowRegistry::new(SharedStore(Arc::clone(&store)));
        let loaded = registry.load_workflow(&wf("post"), false).expect("load");

        let broken = WorkflowDefinition::new("nowhere").with_node(NodeDefinition::new("a"));
        store.insert(wf("post"), broken);
        let err = registry.load_workflow(&wf("post"), true).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::Malformed { .. }
        ));

        assert!(registry.is_loaded(&wf("post")));
        let cached = registry.load_workflow(&wf("post"), false).expect("cached");
        assert!(Arc::ptr_eq(&loaded, &cached));
        let initial = registry.get_initial_node(&wf("post")).expect("lookup");
        assert_eq!(initial.id().as_str(), "draft");
    }

    #[test]
    fn dangling_foreign_target_is_malformed() {
        let dangling = WorkflowDefinition::new("draft")
            .with_node(NodeDefinition::new("draft").with_targets("archive/ghost"));

        let registry = WorkflowRegistry::new(
            MemoryStore::new()
                .with(wf("post"), dangling.clone())
                .with(wf("archive"), archive_definition()),
        );
        let err = registry.load_workflow(&wf("post"), false).unwrap_err();
        assert_eq!(
            err.current_context(),
            &SourceError::Malformed {
                workflow_id: wf("post")
            }
        );
        assert!(!registry.is_loaded(&wf("post")));
        assert!(!registry.is_loaded(&wf("archive")));

        let err = registry.add_workflow(&dangling, &wf("other")).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::Malformed { .. }
        ));
        let missing_workflow = WorkflowDefinition::new("draft")
            .with_node(NodeDefinition::new("draft").with_targets("ghost/stored"));
        assert!(registry.add_workflow(&missing_workflow, &wf("other")).is_err());
        assert!(!registry.is_loaded(&wf("other")));
    }

    #[test]
    fn workflows_pointing_at_each_other_load() {
        let ping = WorkflowDefinition::new("a")
            .with_node(NodeDefinition::new("a").with_targets("pong/b"));
        let pong = WorkflowDefinition::new("b")
            .with_node(NodeDefinition::new("b").with_targets("ping/a"));
        let registry = WorkflowRegistry::new(
            MemoryStore::new()
                .with(wf("ping"), ping)
                .with(wf("pong"), pong),
        );

        let next = registry
            .get_next_nodes(&node_ref("ping/a"))
            .expect("lookup");
        assert_eq!(next[0].node_ref(), &node_ref("pong/b"));
        assert!(registry.is_loaded(&wf("pong")));
    }

    #[test]
    fn registration_after_store_load_is_ignored() {
        let registry = registry();
        registry.load_workflow(&wf("archive"), false).expect("load");
        assert!(
            !registry
                .add_workflow(&post_definition(), &wf("archive"))
                .expect("no-op")
        );
        assert_eq!(registry.get_all_nodes(&wf("archive")).expect("lookup").len(), 1);
    }

    #[test]
    fn node_queries() {
        let registry = registry();
        let review = registry
            .get_node_definition("review", Some(&wf("post")))
            .expect("lookup");
        assert_eq!(review.node_ref(), &node_ref("post/review"));

        let next: Vec<_> = registry
            .get_next_nodes(&node_ref("post/review"))
            .expect("lookup")
            .iter()
            .map(|node| node.node_ref().to_string())
            .collect();
        assert_eq!(next, vec!["post/published", "post/rejected"]);

        assert!(
            registry
                .is_next_node(&node_ref("post/draft"), &node_ref("post/review"))
                .expect("lookup")
        );
        assert!(
            !registry
                .is_next_node(&node_ref("post/draft"), &node_ref("post/published"))
                .expect("lookup")
        );

        let transition = registry
            .get_transition(&node_ref("post/review"), &node_ref("post/published"))
            .expect("lookup")
            .expect("edge exists");
        assert_eq!(transition.action.as_deref(), Some("notify_author"));
    }

    #[test]
    fn next_nodes_cross_workflows() {
        let registry = registry();
        let next = registry
            .get_next_nodes(&node_ref("post/rejected"))
            .expect("lookup");
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].node_ref(), &node_ref("archive/stored"));
        assert!(registry.is_loaded(&wf("archive")));
    }

    #[test]
    fn unknown_node_is_not_found() {
        let err = registry()
            .get_node_definition("post/missing", None)
            .unwrap_err();
        assert_eq!(
            err.current_context(),
            &SourceError::NodeNotFound {
                node: node_ref("post/missing")
            }
        );
    }

    #[test]
    fn bare_reference_without_default_is_invalid() {
        let err = registry().get_node_definition("draft", None).unwrap_err();
        assert!(matches!(
            err.current_context(),
            SourceError::InvalidReference { .. }
        ));
    }

    #[test]
    fn loaded_workflows_are_sorted() {
        let registry = registry();
        registry.load_workflow(&wf("post"), false).expect("load");
        registry.load_workflow(&wf("archive"), false).expect("load");
        assert_eq!(registry.loaded_workflows(), vec![wf("archive"), wf("post")]);
    }
}
