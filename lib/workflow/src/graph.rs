//! Workflow graph implementation using petgraph.
//!
//! A workflow is a directed graph where:
//! - Nodes are statuses an entity can be in
//! - Edges are the transitions allowed between them
//!
//! Transitions may target a node of another workflow. Those are kept on the
//! source node only; the petgraph structure holds the edges internal to the
//! workflow, which is what reachability diagnostics need.

use crate::definition::{NodeDefinition, TransitionSpec, WorkflowDefinition};
use crate::edge::Transition;
use crate::error::GraphError;
use crate::node::WorkflowNode;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use statusflow_core::{NodeId, NodeRef, ParseIdError, Result, WorkflowId};
use std::collections::{BTreeMap, HashMap, HashSet};

/// A checked workflow graph for one workflow id.
///
/// Graphs are only built through [`WorkflowGraph::from_definition`], which
/// guarantees exactly one initial node and resolvable intra-workflow targets.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    workflow_id: WorkflowId,
    /// The underlying directed graph.
    graph: DiGraph<WorkflowNode, Transition>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    initial: NodeIndex,
}

impl WorkflowGraph {
    /// Builds a graph from a definition.
    ///
    /// Bare ids in the definition resolve against `workflow_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An id is empty or otherwise invalid
    /// - A node is defined twice, or belongs to another workflow
    /// - The initial id names no node, or names a node of another workflow
    /// - A transition targets an unknown node of this workflow
    pub fn from_definition(
        workflow_id: WorkflowId,
        definition: &WorkflowDefinition,
    ) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_index_map = HashMap::new();

        for node_definition in &definition.node {
            let node = build_node(&workflow_id, node_definition)?;
            let node_id = node.id().clone();
            if node_index_map.contains_key(&node_id) {
                return Err(GraphError::DuplicateNode { node_id }.into());
            }
            let index = graph.add_node(node);
            node_index_map.insert(node_id, index);
        }

        let mut edges = Vec::new();
        for source_index in graph.node_indices() {
            let source = &graph[source_index];
            for transition in source.transitions() {
                if !transition.target.is_in(&workflow_id) {
                    continue;
                }
                let target_index = node_index_map
                    .get(&transition.target.node_id)
                    .ok_or_else(|| GraphError::UnresolvedTarget {
                        source: source.id().clone(),
                        target: transition.target.clone(),
                    })?;
                edges.push((source_index, *target_index, transition.clone()));
            }
        }
        for (source_index, target_index, transition) in edges {
            graph.add_edge(source_index, target_index, transition);
        }

        let initial_ref =
            NodeRef::parse(&definition.initial, Some(&workflow_id)).map_err(invalid_id)?;
        if !initial_ref.is_in(&workflow_id) {
            return Err(GraphError::ForeignInitial {
                initial: initial_ref,
            }
            .into());
        }
        let initial = *node_index_map
            .get(&initial_ref.node_id)
            .ok_or_else(|| GraphError::InitialNotFound {
                initial: definition.initial.clone(),
            })?;

        Ok(Self {
            workflow_id,
            graph,
            node_index_map,
            initial,
        })
    }

    /// Returns the workflow id.
    #[must_use]
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// Returns the node every entity enters this workflow through.
    #[must_use]
    pub fn initial_node(&self) -> &WorkflowNode {
        &self.graph[self.initial]
    }

    /// Returns true if `node` is the initial node of this workflow.
    #[must_use]
    pub fn is_initial(&self, node: &NodeRef) -> bool {
        self.initial_node().node_ref() == node
    }

    /// Returns a node by its id.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&WorkflowNode> {
        let index = self.node_index_map.get(node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns a node by its qualified reference, if it belongs to this workflow.
    #[must_use]
    pub fn node_by_ref(&self, node: &NodeRef) -> Option<&WorkflowNode> {
        if !node.is_in(&self.workflow_id) {
            return None;
        }
        self.node(&node.node_id)
    }

    /// Returns all nodes in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &WorkflowNode> {
        self.graph.node_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of transitions between nodes of this workflow.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the targets of every outgoing transition of a node.
    ///
    /// Guards are not evaluated. Unknown nodes have no successors.
    pub fn next_nodes(&self, node_id: &NodeId) -> Vec<&NodeRef> {
        self.node(node_id)
            .map(|node| node.transitions().iter().map(|t| &t.target).collect())
            .unwrap_or_default()
    }

    /// Returns the transition `source -> target`, if the edge exists.
    #[must_use]
    pub fn transition(&self, source: &NodeRef, target: &NodeRef) -> Option<&Transition> {
        self.node_by_ref(source)?.transition_to(target)
    }

    /// Returns true if the edge `source -> target` exists.
    #[must_use]
    pub fn is_edge(&self, source: &NodeRef, target: &NodeRef) -> bool {
        self.transition(source, target).is_some()
    }

    /// Returns whether a node is terminal, or `None` if the node is unknown.
    #[must_use]
    pub fn is_final(&self, node_id: &NodeId) -> Option<bool> {
        self.node(node_id).map(WorkflowNode::is_final)
    }

    /// Returns nodes that have no outgoing transitions.
    pub fn terminal_nodes(&self) -> Vec<&WorkflowNode> {
        self.nodes().filter(|node| node.is_final()).collect()
    }

    /// Returns the nodes of this workflow with a transition into `node_id`.
    pub fn predecessors(&self, node_id: &NodeId) -> Vec<(&WorkflowNode, &Transition)> {
        let Some(&index) = self.node_index_map.get(node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Incoming)
            .filter_map(|edge| {
                let source = self.graph.node_weight(edge.source())?;
                Some((source, edge.weight()))
            })
            .collect()
    }

    /// Returns nodes no entity can reach from the initial node inside this workflow.
    ///
    /// Such nodes are legal (another workflow may lead into them) but usually
    /// point at a typo in the definition.
    pub fn unreachable_nodes(&self) -> Vec<&WorkflowNode> {
        let mut reached = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, self.initial);
        while let Some(index) = bfs.next(&self.graph) {
            reached.insert(index);
        }

        self.graph
            .node_indices()
            .filter(|index| !reached.contains(index))
            .filter_map(|index| self.graph.node_weight(index))
            .collect()
    }

    /// Converts the graph back into a definition with qualified ids.
    #[must_use]
    pub fn to_definition(&self) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new(self.initial_node().id().to_string());
        for node in self.nodes() {
            definition.node.push(NodeDefinition {
                id: node.id().to_string(),
                label: Some(node.label().to_string()),
                constraint: node.constraint().map(str::to_string),
                transition: transition_spec(node.transitions()),
                metadata: (!node.metadata().is_empty()).then(|| node.metadata().clone()),
            });
        }
        definition
    }
}

/// Keeps definition order: the array form for action-less transitions, the
/// map form (ordered by target) otherwise.
fn transition_spec(transitions: &[Transition]) -> Option<TransitionSpec> {
    if transitions.is_empty() {
        return None;
    }
    if transitions.iter().all(|t| t.action.is_none()) {
        return Some(TransitionSpec::Array(
            transitions.iter().map(|t| t.target.to_string()).collect(),
        ));
    }
    Some(TransitionSpec::Map(
        transitions
            .iter()
            .map(|t| (t.target.to_string(), t.action.clone()))
            .collect::<BTreeMap<_, _>>(),
    ))
}

fn invalid_id(err: ParseIdError) -> GraphError {
    GraphError::InvalidId {
        input: err.input,
        reason: err.reason.to_string(),
    }
}

fn build_node(
    workflow_id: &WorkflowId,
    definition: &NodeDefinition,
) -> Result<WorkflowNode, GraphError> {
    let node_ref = NodeRef::parse(&definition.id, Some(workflow_id)).map_err(invalid_id)?;
    if !node_ref.is_in(workflow_id) {
        return Err(GraphError::InvalidId {
            input: definition.id.clone(),
            reason: format!("node is qualified with another workflow than '{workflow_id}'"),
        }
        .into());
    }

    let mut node = WorkflowNode::new(node_ref.workflow_id, node_ref.node_id);
    if let Some(label) = definition.label.as_deref().map(str::trim) {
        if !label.is_empty() {
            node = node.with_label(label);
        }
    }
    if let Some(constraint) = definition.constraint.as_deref().map(str::trim) {
        if !constraint.is_empty() {
            node = node.with_constraint(constraint);
        }
    }
    if let Some(metadata) = &definition.metadata {
        node = node.with_metadata(metadata.clone());
    }

    let entries = definition
        .transition
        .as_ref()
        .map(TransitionSpec::entries)
        .unwrap_or_default();
    for (target, action) in entries {
        let target = NodeRef::parse(&target, Some(workflow_id)).map_err(invalid_id)?;
        let mut transition = Transition::new(target);
        if let Some(action) = action {
            transition = transition.with_action(action);
        }
        node = node.with_transition(transition);
    }

    Ok(node)
}
