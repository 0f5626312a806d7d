// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use crate::dag::step::{Dependencies, Step, StepKind};
use crate::errors::GraphError;

/// Reserved ID of the synthetic root vertex.
pub const ROOT_ID: &str = "acb_root";

/// Edges out of a node plus its count of unresolved predecessors.
#[derive(Debug, Default)]
struct NodeEdges {
    children: BTreeMap<String, Arc<Node>>,
    degree: usize,
}

/// Graph vertex wrapping a [`Step`].
///
/// Children and in-degree live behind the node's own lock so that
/// predecessors of different children never contend.
#[derive(Debug)]
pub struct Node {
    step: Arc<Step>,
    edges: Mutex<NodeEdges>,
}

impl Node {
    fn new(step: Arc<Step>) -> Self {
        Self {
            step,
            edges: Mutex::new(NodeEdges::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.step.id
    }

    pub fn step(&self) -> &Arc<Step> {
        &self.step
    }

    fn edges(&self) -> MutexGuard<'_, NodeEdges> {
        self.edges.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the current children.
    pub fn children(&self) -> Vec<Arc<Node>> {
        self.edges().children.values().cloned().collect()
    }

    pub fn degree(&self) -> usize {
        self.edges().degree
    }
}

/// In-memory step graph with a synthetic root.
///
/// The vertex table lock only covers structural changes (adding vertices);
/// edge bookkeeping takes per-node locks.
#[derive(Debug)]
pub struct Dag {
    root: Arc<Node>,
    nodes: RwLock<HashMap<String, Arc<Node>>>,
}

impl Dag {
    pub fn new() -> Self {
        let root_step = Step::new(
            ROOT_ID,
            StepKind::Push { images: Vec::new() },
            Dependencies::Immediate,
        );
        Self {
            root: Arc::new(Node::new(Arc::new(root_step))),
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub fn add_vertex(&self, step: Arc<Step>) -> Result<Arc<Node>, GraphError> {
        if step.id.is_empty() {
            return Err(GraphError::EmptyStepId);
        }
        if step.id == ROOT_ID {
            return Err(GraphError::ReservedStepId(step.id.clone()));
        }

        let mut nodes = self.nodes.write().unwrap_or_else(|p| p.into_inner());
        if nodes.contains_key(&step.id) {
            return Err(GraphError::DuplicateStep(step.id.clone()));
        }

        let node = Arc::new(Node::new(step));
        nodes.insert(node.id().to_string(), Arc::clone(&node));
        Ok(node)
    }

    /// Look up a vertex; the root is addressable by [`ROOT_ID`].
    pub fn vertex(&self, id: &str) -> Option<Arc<Node>> {
        if id == ROOT_ID {
            return Some(Arc::clone(&self.root));
        }
        self.nodes
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(id)
            .cloned()
    }

    fn endpoints(&self, from: &str, to: &str) -> Result<(Arc<Node>, Arc<Node>), GraphError> {
        if from.is_empty() || to.is_empty() {
            return Err(GraphError::EmptyEdgeEndpoint);
        }
        if from == to {
            return Err(GraphError::SelfEdge(from.to_string()));
        }
        let parent = self
            .vertex(from)
            .ok_or_else(|| GraphError::MissingVertex(from.to_string()))?;
        let child = self
            .vertex(to)
            .ok_or_else(|| GraphError::MissingVertex(to.to_string()))?;
        Ok((parent, child))
    }

    /// Add `from -> to` and bump `to`'s in-degree.
    pub fn add_edge(&self, from: &str, to: &str) -> Result<(), GraphError> {
        if to == ROOT_ID {
            return Err(GraphError::ReservedStepId(to.to_string()));
        }
        let (parent, child) = self.endpoints(from, to)?;

        // Held in parent -> child order; edges only ever point away from
        // root in declaration order, so this cannot deadlock.
        let mut parent_edges = parent.edges();
        if parent_edges.children.contains_key(to) {
            return Ok(());
        }
        parent_edges
            .children
            .insert(to.to_string(), Arc::clone(&child));
        child.edges().degree += 1;
        Ok(())
    }

    pub fn add_edge_from_root(&self, to: &str) -> Result<(), GraphError> {
        self.add_edge(ROOT_ID, to)
    }

    /// Retire `from -> to`, returning `to`'s remaining in-degree.
    ///
    /// The decrement and the returned count are taken under `to`'s lock, so
    /// when several predecessors retire concurrently exactly one of them
    /// observes zero.
    pub fn remove_edge(&self, from: &str, to: &str) -> Result<usize, GraphError> {
        let (parent, child) = self.endpoints(from, to)?;

        let removed = parent.edges().children.remove(to);
        if removed.is_none() {
            return Err(GraphError::MissingEdge {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut child_edges = child.edges();
        child_edges.degree = child_edges
            .degree
            .checked_sub(1)
            .ok_or_else(|| GraphError::DegreeUnderflow(to.to_string()))?;
        Ok(child_edges.degree)
    }

    pub fn children(&self, id: &str) -> Result<Vec<Arc<Node>>, GraphError> {
        self.vertex(id)
            .map(|node| node.children())
            .ok_or_else(|| GraphError::MissingVertex(id.to_string()))
    }

    pub fn degree(&self, id: &str) -> Result<usize, GraphError> {
        self.vertex(id)
            .map(|node| node.degree())
            .ok_or_else(|| GraphError::MissingVertex(id.to_string()))
    }

    /// Number of non-root vertices.
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all current edges, root edges included.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut nodes: Vec<Arc<Node>> = self
            .nodes
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .values()
            .cloned()
            .collect();
        nodes.push(Arc::clone(&self.root));

        let mut out = Vec::new();
        for node in nodes {
            for child in node.children() {
                out.push((node.id().to_string(), child.id().to_string()));
            }
        }
        out.sort();
        out
    }
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}
