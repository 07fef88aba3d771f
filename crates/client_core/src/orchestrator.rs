use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use shared::{
    domain::NodeId,
    protocol::{ContainerStatus, DeployStatus, Diagram, ServerEvent},
};
use thiserror::Error;
use tokio::sync::broadcast;
use topology::{has_diagram_changes, Node};
use tracing::{debug, info, warn};

use crate::{
    gateway::{DeployGateway, GatewayError},
    status_channel::{StatusHandler, StatusSource},
};

const STATE_EVENTS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployState {
    pub deploy_status: DeployStatus,
    pub node_statuses: HashMap<NodeId, ContainerStatus>,
    pub error: Option<String>,
    /// Diagram of the last successful deploy or update.
    pub last_deployed: Option<Diagram>,
    pub is_updating: bool,
    pub last_status_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("cannot {action} while deployment is {from}")]
    InvalidTransition {
        action: &'static str,
        from: DeployStatus,
    },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

struct Shared {
    state: Mutex<DeployState>,
    events: broadcast::Sender<DeployState>,
}

impl Shared {
    /// Runs `f` against the state and publishes the result if anything changed.
    fn update<R>(&self, f: impl FnOnce(&mut DeployState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let before = state.clone();
        let result = f(&mut state);
        if *state != before {
            let _ = self.events.send(state.clone());
        }
        result
    }

    fn snapshot(&self) -> DeployState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn apply_event(&self, event: ServerEvent) {
        let ServerEvent::StatusUpdate {
            deploy_status,
            node_statuses,
        } = event;
        debug!(%deploy_status, nodes = node_statuses.len(), "applying status update");
        self.update(|state| {
            state.deploy_status = deploy_status;
            state.node_statuses = node_statuses
                .into_iter()
                .map(|status| (status.node_id, status.status))
                .collect();
            state.last_status_at = Some(Utc::now());
        });
    }
}

/// Single authority over the deployment lifecycle.
///
/// Drives the gateway and the status feed from one [`DeployStatus`] state machine and
/// publishes every state change to [`DeployOrchestrator::subscribe`]rs. Gateway failures are
/// recorded in the state (`error` status plus message) and also returned to the caller.
pub struct DeployOrchestrator {
    gateway: Arc<dyn DeployGateway>,
    status_source: Arc<dyn StatusSource>,
    shared: Arc<Shared>,
}

impl DeployOrchestrator {
    pub fn new(gateway: Arc<dyn DeployGateway>, status_source: Arc<dyn StatusSource>) -> Self {
        let (events, _) = broadcast::channel(STATE_EVENTS_CAPACITY);
        Self {
            gateway,
            status_source,
            shared: Arc::new(Shared {
                state: Mutex::new(DeployState::default()),
                events,
            }),
        }
    }

    pub fn state(&self) -> DeployState {
        self.shared.snapshot()
    }

    pub fn deploy_status(&self) -> DeployStatus {
        self.shared.snapshot().deploy_status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeployState> {
        self.shared.events.subscribe()
    }

    /// Whether the live nodes have drifted from the last deployed diagram (node-id set only).
    pub fn has_changes(&self, nodes: &[Node]) -> bool {
        let state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        has_diagram_changes(nodes, state.last_deployed.as_ref())
    }

    pub async fn deploy(&self, diagram: Diagram) -> Result<(), OrchestratorError> {
        self.shared.update(|state| match state.deploy_status {
            DeployStatus::Idle | DeployStatus::Error => {
                state.deploy_status = DeployStatus::Deploying;
                state.error = None;
                Ok(())
            }
            from => Err(OrchestratorError::InvalidTransition {
                action: "deploy",
                from,
            }),
        })?;
        info!(diagram_id = %diagram.id, nodes = diagram.nodes.len(), "deploying diagram");

        self.status_source.connect(self.status_handler());

        match self.gateway.deploy(&diagram).await {
            Ok(ack) => {
                info!(status = %ack.status, "deploy accepted");
                self.shared
                    .update(|state| state.last_deployed = Some(diagram));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "deploy failed");
                self.status_source.disconnect();
                self.shared.update(|state| {
                    state.deploy_status = DeployStatus::Error;
                    state.error = Some(err.message.clone());
                });
                Err(err.into())
            }
        }
    }

    pub async fn teardown(&self) -> Result<(), OrchestratorError> {
        self.shared.update(|state| match state.deploy_status {
            DeployStatus::Deployed | DeployStatus::Error => {
                state.deploy_status = DeployStatus::TearingDown;
                state.error = None;
                Ok(())
            }
            from => Err(OrchestratorError::InvalidTransition {
                action: "tear down",
                from,
            }),
        })?;
        info!("tearing down deployment");

        match self.gateway.teardown().await {
            Ok(_) => {
                self.status_source.disconnect();
                self.shared.update(|state| {
                    state.deploy_status = DeployStatus::Idle;
                    state.node_statuses.clear();
                    state.last_deployed = None;
                });
                info!("teardown complete");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "teardown failed");
                self.shared.update(|state| {
                    state.deploy_status = DeployStatus::Error;
                    state.error = Some(err.message.clone());
                });
                Err(err.into())
            }
        }
    }

    /// Submits a revised diagram to the running deployment. A call made while another update
    /// is in flight is ignored.
    pub async fn update_deploy(&self, diagram: Diagram) -> Result<(), OrchestratorError> {
        let start = self.shared.update(|state| {
            if state.is_updating {
                return Ok(false);
            }
            if state.deploy_status != DeployStatus::Deployed {
                return Err(OrchestratorError::InvalidTransition {
                    action: "update",
                    from: state.deploy_status,
                });
            }
            state.is_updating = true;
            state.error = None;
            Ok(true)
        })?;
        if !start {
            debug!("update already in flight");
            return Ok(());
        }

        match self.gateway.update_deploy(&diagram).await {
            Ok(response) => {
                info!(
                    status = %response.deploy_status,
                    nodes = response.node_statuses.len(),
                    "deployment updated"
                );
                self.shared.update(|state| {
                    state.last_deployed = Some(diagram);
                    state.is_updating = false;
                });
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "update deploy failed");
                self.shared.update(|state| {
                    state.error = Some(err.message.clone());
                    state.is_updating = false;
                });
                Err(err.into())
            }
        }
    }

    /// Polls the service and applies the answer as if it had arrived on the status feed.
    pub async fn refresh_status(&self) -> Result<DeployStatus, OrchestratorError> {
        match self.gateway.deploy_status().await {
            Ok(response) => {
                let status = response.deploy_status;
                self.shared.apply_event(response.into());
                Ok(status)
            }
            Err(err) => {
                self.shared
                    .update(|state| state.error = Some(err.message.clone()));
                Err(err.into())
            }
        }
    }

    /// Opens the status feed for a deployment this session did not start itself.
    pub fn attach(&self) -> Result<(), OrchestratorError> {
        match self.deploy_status() {
            DeployStatus::Deploying | DeployStatus::Deployed => {
                self.status_source.connect(self.status_handler());
                Ok(())
            }
            from => Err(OrchestratorError::InvalidTransition {
                action: "attach",
                from,
            }),
        }
    }

    pub fn apply_status_message(&self, event: ServerEvent) {
        self.shared.apply_event(event);
    }

    pub fn clear_error(&self) {
        self.shared.update(|state| state.error = None);
    }

    /// Forgets the deployment without telling the server and closes the status feed.
    pub fn reset(&self) {
        self.status_source.disconnect();
        self.shared.update(|state| *state = DeployState::default());
    }

    fn status_handler(&self) -> StatusHandler {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |event| shared.apply_event(event))
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
