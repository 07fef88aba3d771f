use serde::{Deserialize, Serialize};

use crate::domain::{DiagramId, EdgeId, NodeConfig, NodeId, Position, ServiceType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub label: String,
}

/// Wire and file form of a topology. The only shape that is persisted or sent to the deploy API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
    pub id: DiagramId,
    pub name: String,
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    #[default]
    Idle,
    Deploying,
    Deployed,
    TearingDown,
    Error,
}

impl DeployStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Idle => "idle",
            DeployStatus::Deploying => "deploying",
            DeployStatus::Deployed => "deployed",
            DeployStatus::TearingDown => "tearing_down",
            DeployStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Error,
    Healthy,
    Unhealthy,
}

impl ContainerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Stopped => "stopped",
            ContainerStatus::Error => "error",
            ContainerStatus::Healthy => "healthy",
            ContainerStatus::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub container_id: String,
    pub status: ContainerStatus,
}

/// Body of `PUT /api/deploy` and `GET /api/deploy/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployStatusResponse {
    pub deploy_status: DeployStatus,
    #[serde(default)]
    pub node_statuses: Vec<NodeStatus>,
}

/// Acknowledgement returned by `POST /api/deploy` and `DELETE /api/deploy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub status: String,
}

/// Push messages on `/ws/status`. Anything that does not decode into a known variant is noise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        deploy_status: DeployStatus,
        #[serde(default)]
        node_statuses: Vec<NodeStatus>,
    },
}

impl From<DeployStatusResponse> for ServerEvent {
    fn from(value: DeployStatusResponse) -> Self {
        ServerEvent::StatusUpdate {
            deploy_status: value.deploy_status,
            node_statuses: value.node_statuses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_decodes_from_wire_shape() {
        let raw = r#"{
            "type": "status_update",
            "deployStatus": "deployed",
            "nodeStatuses": [
                { "nodeId": "node-1", "containerId": "abc123", "status": "healthy" }
            ]
        }"#;
        let event: ServerEvent = serde_json::from_str(raw).expect("decode");
        let ServerEvent::StatusUpdate {
            deploy_status,
            node_statuses,
        } = event;
        assert_eq!(deploy_status, DeployStatus::Deployed);
        assert_eq!(node_statuses.len(), 1);
        assert_eq!(node_statuses[0].node_id, NodeId::from("node-1"));
        assert_eq!(node_statuses[0].status, ContainerStatus::Healthy);
    }

    #[test]
    fn other_message_types_do_not_decode() {
        assert!(serde_json::from_str::<ServerEvent>(r#"{"type":"ping"}"#).is_err());
        assert!(serde_json::from_str::<ServerEvent>(r#"{"deployStatus":"idle"}"#).is_err());
    }

    #[test]
    fn node_without_config_omits_the_field() {
        let node = DiagramNode {
            id: NodeId::from("n1"),
            service_type: ServiceType::Nginx,
            name: "Proxy".into(),
            description: String::new(),
            position: Position::new(10.0, 20.0),
            config: None,
        };
        let value = serde_json::to_value(&node).expect("serialize");
        assert!(value.get("config").is_none());
        assert_eq!(value["type"], "nginx");
    }
}
