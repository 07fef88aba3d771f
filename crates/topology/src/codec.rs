//! Mapping between the editor's [`Node`]/[`Edge`] and the [`Diagram`] wire form.
//!
//! Import is strict: the raw JSON is checked structurally before anything is trusted, and any
//! violation rejects the whole document.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};
use shared::{
    domain::{DiagramId, EdgeId, NodeConfig, NodeId, Position, ServiceType},
    protocol::{Diagram, DiagramEdge, DiagramNode},
};
use thiserror::Error;

use crate::store::{Edge, Node, NodeData};

pub const DEFAULT_DIAGRAM_NAME: &str = "Untitled Diagram";
pub const DEFAULT_DIAGRAM_FILE_NAME: &str = "diagram.json";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid diagram JSON: expected an object")]
    NotAnObject,
    #[error("invalid diagram JSON: missing nodes or edges arrays")]
    MissingCollections,
    #[error("invalid diagram JSON: nodes[{index}] {reason}")]
    InvalidNode { index: usize, reason: String },
    #[error("invalid diagram JSON: edges[{index}] {reason}")]
    InvalidEdge { index: usize, reason: String },
    #[error("invalid diagram JSON: duplicate node id {id:?}")]
    DuplicateNodeId { id: String },
    #[error("invalid diagram JSON: edges[{index}].{endpoint} references unknown node {node_id:?}")]
    DanglingEdge {
        index: usize,
        endpoint: &'static str,
        node_id: String,
    },
    #[error("invalid diagram JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to access diagram file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

pub fn export_diagram(nodes: &[Node], edges: &[Edge]) -> Diagram {
    Diagram {
        id: DiagramId::generate(),
        name: DEFAULT_DIAGRAM_NAME.to_string(),
        nodes: nodes
            .iter()
            .map(|node| DiagramNode {
                id: node.id.clone(),
                service_type: node.data.service_type,
                name: node.data.label.clone(),
                description: node.data.description.clone(),
                position: node.position,
                config: node.data.config.clone(),
            })
            .collect(),
        edges: edges
            .iter()
            .map(|edge| DiagramEdge {
                id: edge.id.clone(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                label: edge.label.clone(),
            })
            .collect(),
    }
}

pub fn import_diagram(raw: &Value) -> Result<ImportedGraph, CodecError> {
    let diagram = raw.as_object().ok_or(CodecError::NotAnObject)?;
    let (Some(Value::Array(raw_nodes)), Some(Value::Array(raw_edges))) =
        (diagram.get("nodes"), diagram.get("edges"))
    else {
        return Err(CodecError::MissingCollections);
    };

    let nodes = raw_nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            parse_node(node).map_err(|reason| CodecError::InvalidNode { index, reason })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let edges = raw_edges
        .iter()
        .enumerate()
        .map(|(index, edge)| {
            parse_edge(edge).map_err(|reason| CodecError::InvalidEdge { index, reason })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut node_ids = HashSet::with_capacity(nodes.len());
    for node in &nodes {
        if !node_ids.insert(&node.id) {
            return Err(CodecError::DuplicateNodeId {
                id: node.id.to_string(),
            });
        }
    }
    for (index, edge) in edges.iter().enumerate() {
        for (endpoint, node_id) in [("source", &edge.source), ("target", &edge.target)] {
            if !node_ids.contains(node_id) {
                return Err(CodecError::DanglingEdge {
                    index,
                    endpoint,
                    node_id: node_id.to_string(),
                });
            }
        }
    }

    Ok(ImportedGraph { nodes, edges })
}

pub fn import_diagram_str(raw: &str) -> Result<ImportedGraph, CodecError> {
    let value: Value = serde_json::from_str(raw)?;
    import_diagram(&value)
}

pub fn write_diagram_file(path: &Path, diagram: &Diagram) -> Result<(), CodecError> {
    let json = serde_json::to_string_pretty(diagram)?;
    fs::write(path, json).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_diagram_file(path: &Path) -> Result<ImportedGraph, CodecError> {
    let raw = fs::read_to_string(path).map_err(|source| CodecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    import_diagram_str(&raw)
}

impl From<&Diagram> for ImportedGraph {
    fn from(diagram: &Diagram) -> Self {
        Self {
            nodes: diagram
                .nodes
                .iter()
                .map(|node| {
                    Node::new(
                        node.id.clone(),
                        node.position,
                        NodeData {
                            label: node.name.clone(),
                            service_type: node.service_type,
                            description: node.description.clone(),
                            config: node.config.clone(),
                        },
                    )
                })
                .collect(),
            edges: diagram
                .edges
                .iter()
                .map(|edge| {
                    Edge::new(
                        edge.id.clone(),
                        edge.source.clone(),
                        edge.target.clone(),
                        edge.label.clone(),
                    )
                })
                .collect(),
        }
    }
}

fn parse_node(raw: &Value) -> Result<Node, String> {
    let node = raw
        .as_object()
        .ok_or_else(|| "must be an object".to_string())?;
    let id = required_str(node, "id")?;
    let kind = required_str(node, "type")?;
    let name = required_str(node, "name")?;
    let position = node
        .get("position")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing object field `position`".to_string())?;
    let x = coordinate(position, "x")?;
    let y = coordinate(position, "y")?;

    let service_type: ServiceType = kind
        .parse()
        .map_err(|_| format!("type {kind:?} is not a valid service type"))?;
    let description = node
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let config = match node.get("config") {
        None | Some(Value::Null) => None,
        Some(config) => Some(parse_config(config, service_type)?),
    };

    Ok(Node::new(
        id,
        Position::new(x, y),
        NodeData {
            label: name.to_string(),
            service_type,
            description: description.to_string(),
            config,
        },
    ))
}

fn parse_config(raw: &Value, service_type: ServiceType) -> Result<NodeConfig, String> {
    let fields = raw
        .as_object()
        .ok_or_else(|| "config must be an object".to_string())?;
    let tag = fields
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "config is missing string field `type`".to_string())?;
    if tag != service_type.as_str() {
        return Err(format!(
            "config.type {tag:?} does not match node type {:?}",
            service_type.as_str()
        ));
    }
    NodeConfig::from_fields(fields.clone()).map_err(|err| err.to_string())
}

fn parse_edge(raw: &Value) -> Result<Edge, String> {
    let edge = raw
        .as_object()
        .ok_or_else(|| "must be an object".to_string())?;
    let id = required_str(edge, "id")?;
    let source = required_str(edge, "source")?;
    let target = required_str(edge, "target")?;
    let label = edge
        .get("label")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(Edge::new(
        EdgeId::from(id),
        NodeId::from(source),
        NodeId::from(target),
        label,
    ))
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &str) -> Result<&'a str, String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing string field `{field}`"))
}

fn coordinate(position: &Map<String, Value>, axis: &str) -> Result<f64, String> {
    position
        .get(axis)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("position.{axis} must be a number"))
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
