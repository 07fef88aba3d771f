use std::{collections::HashSet, sync::Arc};

use shared::domain::{EdgeId, NodeConfig, NodeId, Position, ServiceConfig, ServiceType, Viewport};

const NODE_ID_PREFIX: &str = "node";
const EDGE_ID_PREFIX: &str = "edge";

#[derive(Debug, Clone, PartialEq)]
pub struct NodeData {
    pub label: String,
    pub service_type: ServiceType,
    pub description: String,
    pub config: Option<NodeConfig>,
}

impl NodeData {
    pub fn new(service_type: ServiceType, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            service_type,
            description: String::new(),
            config: None,
        }
    }

    /// Stored config, or the defaults for this node's kind. Defaults are never written back.
    pub fn effective_config(&self) -> ServiceConfig {
        self.config
            .as_ref()
            .map(NodeConfig::typed)
            .unwrap_or_else(|| ServiceConfig::default_for(self.service_type))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub position: Position,
    pub data: NodeData,
    pub selected: bool,
    pub dragging: bool,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, position: Position, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position,
            data,
            selected: false,
            dragging: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
    pub label: String,
    pub selected: bool,
}

impl Edge {
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            label: label.into(),
            selected: false,
        }
    }
}

/// A handle-drag between two nodes, as reported by the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: Option<String>,
    pub target_handle: Option<String>,
}

impl Connection {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeDelta {
    Move {
        id: NodeId,
        position: Option<Position>,
        dragging: bool,
    },
    Select {
        id: NodeId,
        selected: bool,
    },
    Remove {
        id: NodeId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeDelta {
    Select { id: EdgeId, selected: bool },
    Remove { id: EdgeId },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub viewport: Viewport,
    pub selected_node_id: Option<NodeId>,
}

impl GraphState {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|edge| &edge.id == id)
    }

    pub fn selected_node(&self) -> Option<&Node> {
        self.selected_node_id.as_ref().and_then(|id| self.node(id))
    }

    fn node_index(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|node| &node.id == id)
    }

    fn edge_index(&self, id: &EdgeId) -> Option<usize> {
        self.edges.iter().position(|edge| &edge.id == id)
    }
}

/// Canonical editor state.
///
/// Every operation is a state transition over an immutable snapshot: the current
/// [`GraphState`] is replaced (copy-on-write) rather than edited under a reader's feet, and
/// operations that change nothing keep the previous snapshot. Two snapshots returned by
/// [`GraphStore::state`] are therefore `Arc::ptr_eq` exactly when nothing changed in between.
///
/// Operations never fail; unknown ids are ignored.
#[derive(Debug, Default)]
pub struct GraphStore {
    state: Arc<GraphState>,
    node_counter: u64,
    edge_counter: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<GraphState> {
        Arc::clone(&self.state)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.state.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.state.edges
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    pub fn selected_node_id(&self) -> Option<&NodeId> {
        self.state.selected_node_id.as_ref()
    }

    pub fn selected_node(&self) -> Option<&Node> {
        self.state.selected_node()
    }

    pub fn add_node(&mut self, position: Position, data: NodeData) -> NodeId {
        let id = self.next_node_id();
        Arc::make_mut(&mut self.state)
            .nodes
            .push(Node::new(id.clone(), position, data));
        id
    }

    pub fn apply_node_deltas(&mut self, deltas: &[NodeDelta]) {
        if deltas.is_empty() {
            return;
        }

        let mut next = (*self.state).clone();
        let mut removed = HashSet::new();
        for delta in deltas {
            match delta {
                NodeDelta::Move {
                    id,
                    position,
                    dragging,
                } => {
                    if let Some(index) = next.node_index(id) {
                        let node = &mut next.nodes[index];
                        if let Some(position) = position {
                            node.position = *position;
                        }
                        node.dragging = *dragging;
                    }
                }
                NodeDelta::Select { id, selected } => {
                    if let Some(index) = next.node_index(id) {
                        next.nodes[index].selected = *selected;
                    }
                }
                NodeDelta::Remove { id } => {
                    if let Some(index) = next.node_index(id) {
                        next.nodes.remove(index);
                        removed.insert(id.clone());
                    }
                }
            }
        }

        if !removed.is_empty() {
            next.edges
                .retain(|edge| !removed.contains(&edge.source) && !removed.contains(&edge.target));
            if next
                .selected_node_id
                .as_ref()
                .is_some_and(|selected| removed.contains(selected))
            {
                next.selected_node_id = None;
            }
        }

        self.replace(next);
    }

    pub fn apply_edge_deltas(&mut self, deltas: &[EdgeDelta]) {
        if deltas.is_empty() {
            return;
        }

        let mut next = (*self.state).clone();
        for delta in deltas {
            match delta {
                EdgeDelta::Select { id, selected } => {
                    if let Some(index) = next.edge_index(id) {
                        next.edges[index].selected = *selected;
                    }
                }
                EdgeDelta::Remove { id } => {
                    if let Some(index) = next.edge_index(id) {
                        next.edges.remove(index);
                    }
                }
            }
        }

        self.replace(next);
    }

    /// Adds an edge unless one already runs from `source` to `target`. Handles are not part of
    /// the duplicate check.
    pub fn connect(&mut self, connection: Connection) -> Option<EdgeId> {
        let state = &self.state;
        if state.node_index(&connection.source).is_none()
            || state.node_index(&connection.target).is_none()
        {
            return None;
        }
        let duplicate = state
            .edges
            .iter()
            .any(|edge| edge.source == connection.source && edge.target == connection.target);
        if duplicate {
            return None;
        }

        let id = self.next_edge_id();
        Arc::make_mut(&mut self.state).edges.push(Edge {
            id: id.clone(),
            source: connection.source,
            target: connection.target,
            source_handle: connection.source_handle,
            target_handle: connection.target_handle,
            label: String::new(),
            selected: false,
        });
        Some(id)
    }

    pub fn select_node(&mut self, id: Option<NodeId>) {
        if self.state.selected_node_id != id {
            Arc::make_mut(&mut self.state).selected_node_id = id;
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.state.viewport != viewport {
            Arc::make_mut(&mut self.state).viewport = viewport;
        }
    }

    pub fn update_node_label(&mut self, id: &NodeId, label: impl Into<String>) {
        if let Some(index) = self.state.node_index(id) {
            Arc::make_mut(&mut self.state).nodes[index].data.label = label.into();
        }
    }

    /// Ignored when `config` is for a different kind than the node.
    pub fn update_node_config(&mut self, id: &NodeId, config: ServiceConfig) {
        let Some(index) = self.state.node_index(id) else {
            return;
        };
        let data = &self.state.nodes[index].data;
        if config.service_type() != data.service_type {
            return;
        }
        let next = match &data.config {
            Some(current) => current.updated(&config),
            None => NodeConfig::from(config),
        };
        Arc::make_mut(&mut self.state).nodes[index].data.config = Some(next);
    }

    pub fn update_edge_label(&mut self, id: &EdgeId, label: impl Into<String>) {
        if let Some(index) = self.state.edge_index(id) {
            Arc::make_mut(&mut self.state).edges[index].label = label.into();
        }
    }

    pub fn remove_edge(&mut self, id: &EdgeId) {
        if let Some(index) = self.state.edge_index(id) {
            Arc::make_mut(&mut self.state).edges.remove(index);
        }
    }

    /// Replaces the whole graph. The viewport is kept; selection is cleared.
    pub fn load_diagram(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) {
        self.state = Arc::new(GraphState {
            nodes,
            edges,
            viewport: self.state.viewport,
            selected_node_id: None,
        });
    }

    fn replace(&mut self, next: GraphState) {
        if *self.state != next {
            self.state = Arc::new(next);
        }
    }

    fn next_node_id(&mut self) -> NodeId {
        loop {
            self.node_counter += 1;
            let id = NodeId(format!("{NODE_ID_PREFIX}-{}", self.node_counter));
            if self.state.node_index(&id).is_none() {
                return id;
            }
        }
    }

    fn next_edge_id(&mut self) -> EdgeId {
        loop {
            self.edge_counter += 1;
            let id = EdgeId(format!("{EDGE_ID_PREFIX}-{}", self.edge_counter));
            if self.state.edge_index(&id).is_none() {
                return id;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
