//! Workflow graphs: nodes, named edges, and structural validation
//!
//! A workflow is a directed graph whose nodes are either concrete step
//! references or variant slots, and whose edges carry labels. The
//! `output` label is the ordinary forward route; a `loop` label routes a
//! batch back for another iteration, so cycles are not merely tolerated
//! but are the convergence mechanism. Structural checks here are
//! shape-only; the resolver layers step and slot semantics on top.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, PipelineResult};

/// Edge label for the ordinary forward route.
pub const OUTPUT_EDGE: &str = "output";

/// Edge label routing a batch back for another iteration.
pub const LOOP_EDGE: &str = "loop";

// ── Identity ───────────────────────────────────────────────────────────

/// Unique identifier for a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn short(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one node within a workflow. Unique per workflow, not
/// globally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Nodes and edges ────────────────────────────────────────────────────

/// What a workflow node stands for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// A concrete processing step, referenced by registered name.
    Step { step: String },
    /// A variant slot, replaced at resolution time by the step chain of
    /// the mode the experiment selects.
    VariantSlot { slot: String },
}

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    pub kind: NodeKind,
}

impl WorkflowNode {
    /// A node referencing a registered step.
    pub fn step(id: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            kind: NodeKind::Step { step: step.into() },
        }
    }

    /// A node standing for a variant slot.
    pub fn slot(id: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            kind: NodeKind::VariantSlot { slot: slot.into() },
        }
    }
}

/// A labelled, directed connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub source: NodeId,
    pub label: String,
    pub target: NodeId,
}

impl WorkflowEdge {
    pub fn new(source: NodeId, label: impl Into<String>, target: NodeId) -> Self {
        Self {
            source,
            label: label.into(),
            target,
        }
    }

    /// An ordinary forward edge.
    pub fn forward(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(NodeId::new(source), OUTPUT_EDGE, NodeId::new(target))
    }

    /// A loop edge routing a batch back for another iteration.
    pub fn loop_back(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(NodeId::new(source), LOOP_EDGE, NodeId::new(target))
    }

    pub fn is_loop(&self) -> bool {
        self.label == LOOP_EDGE
    }
}

// ── Workflow definition ────────────────────────────────────────────────

/// The directed graph of steps and variant slots an experiment executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: WorkflowId,
    pub name: String,
    pub description: String,
    pub version: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::generate(),
            name: name.into(),
            description: String::new(),
            version: "1.0.0".to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a node. Node ids must be unique within the workflow.
    pub fn add_node(&mut self, node: WorkflowNode) -> PipelineResult<()> {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return Err(PipelineError::DuplicateNodeId(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Add an edge between existing nodes.
    ///
    /// At most one edge may leave a node under a given label, so routing
    /// by label is unambiguous and a node cannot carry two loop edges.
    pub fn add_edge(&mut self, edge: WorkflowEdge) -> PipelineResult<()> {
        if self.get_node(&edge.source).is_none() {
            return Err(PipelineError::NodeNotFound(edge.source));
        }
        if self.get_node(&edge.target).is_none() {
            return Err(PipelineError::NodeNotFound(edge.target));
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == edge.source && e.label == edge.label)
        {
            return Err(PipelineError::DuplicateEdge {
                from: edge.source,
                label: edge.label,
            });
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn outgoing_edges(&self, id: &NodeId) -> Vec<&WorkflowEdge> {
        self.edges.iter().filter(|e| &e.source == id).collect()
    }

    /// Where the edge leaving `id` under `label` points, if present.
    pub fn edge_target(&self, id: &NodeId, label: &str) -> Option<&NodeId> {
        self.edges
            .iter()
            .find(|e| &e.source == id && e.label == label)
            .map(|e| &e.target)
    }

    /// The unique node with no inbound edge. Loop edges count as
    /// inbound, so the first node of a loop body is not mistaken for an
    /// entry when only the loop edge reaches it.
    pub fn entry_node(&self) -> PipelineResult<&NodeId> {
        let targets: HashSet<&NodeId> = self.edges.iter().map(|e| &e.target).collect();
        let mut entries: Vec<&NodeId> = self
            .nodes
            .iter()
            .map(|n| &n.id)
            .filter(|id| !targets.contains(id))
            .collect();
        match entries.len() {
            0 => Err(PipelineError::NoEntryNode),
            1 => Ok(entries.remove(0)),
            _ => {
                entries.sort();
                Err(PipelineError::MultipleEntryNodes(
                    entries.into_iter().cloned().collect(),
                ))
            }
        }
    }

    /// Structural validation: the workflow is non-empty, node ids and
    /// `(source, label)` routes are unique, every edge joins existing
    /// nodes, and every node is reachable from the one entry node.
    ///
    /// Repeats the `add_node`/`add_edge` checks because a deserialized
    /// definition bypasses both.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.nodes.is_empty() {
            return Err(PipelineError::EmptyWorkflow);
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(&node.id) {
                return Err(PipelineError::DuplicateNodeId(node.id.clone()));
            }
        }
        let mut routes = HashSet::new();
        for edge in &self.edges {
            if !ids.contains(&edge.source) {
                return Err(PipelineError::NodeNotFound(edge.source.clone()));
            }
            if !ids.contains(&edge.target) {
                return Err(PipelineError::NodeNotFound(edge.target.clone()));
            }
            if !routes.insert((&edge.source, &edge.label)) {
                return Err(PipelineError::DuplicateEdge {
                    from: edge.source.clone(),
                    label: edge.label.clone(),
                });
            }
        }

        let entry = self.entry_node()?;

        let mut adjacency: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(&edge.source).or_default().push(&edge.target);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(entry);
        queue.push_back(entry);
        while let Some(current) = queue.pop_front() {
            for next in adjacency.get(current).into_iter().flatten() {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        for node in &self.nodes {
            if !visited.contains(&node.id) {
                return Err(PipelineError::UnreachableNode(node.id.clone()));
            }
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
