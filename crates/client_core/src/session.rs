use std::{path::Path, sync::Arc};

use anyhow::Context;
use shared::protocol::Diagram;
use topology::{export_diagram, read_diagram_file, write_diagram_file, CodecError, GraphStore};
use tracing::info;

use crate::{
    config::Settings,
    gateway::{DeployGateway, HttpDeployGateway},
    orchestrator::{DeployOrchestrator, OrchestratorError},
    status_channel::{StatusChannel, StatusSource},
};

/// Owns the editable graph and the deployment lifecycle for one user session.
pub struct DeploySession {
    store: GraphStore,
    orchestrator: DeployOrchestrator,
}

impl DeploySession {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let gateway = HttpDeployGateway::new(&settings.api_base()?)
            .context("failed to build deploy api client")?;
        let channel = StatusChannel::new(settings.status_url()?, settings.reconnect_policy());
        info!(
            api = %settings.api_base_url,
            status = %channel.url(),
            "deploy session ready"
        );
        Ok(Self::with_parts(
            GraphStore::new(),
            Arc::new(gateway),
            Arc::new(channel),
        ))
    }

    pub fn with_parts(
        store: GraphStore,
        gateway: Arc<dyn DeployGateway>,
        status_source: Arc<dyn StatusSource>,
    ) -> Self {
        Self {
            store,
            orchestrator: DeployOrchestrator::new(gateway, status_source),
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    pub fn orchestrator(&self) -> &DeployOrchestrator {
        &self.orchestrator
    }

    /// Current graph in wire form, under a fresh diagram id.
    pub fn snapshot(&self) -> Diagram {
        export_diagram(self.store.nodes(), self.store.edges())
    }

    /// Replaces the graph with the diagram at `path`. The store is untouched when the file is
    /// rejected.
    pub fn import_file(&mut self, path: &Path) -> Result<(), CodecError> {
        let graph = read_diagram_file(path)?;
        info!(
            path = %path.display(),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "diagram imported"
        );
        self.store.load_diagram(graph.nodes, graph.edges);
        Ok(())
    }

    pub fn export_file(&self, path: &Path) -> Result<Diagram, CodecError> {
        let diagram = self.snapshot();
        write_diagram_file(path, &diagram)?;
        info!(path = %path.display(), diagram_id = %diagram.id, "diagram exported");
        Ok(diagram)
    }

    pub fn has_changes(&self) -> bool {
        self.orchestrator.has_changes(self.store.nodes())
    }

    pub async fn deploy(&self) -> Result<(), OrchestratorError> {
        self.orchestrator.deploy(self.snapshot()).await
    }

    pub async fn update_deploy(&self) -> Result<(), OrchestratorError> {
        self.orchestrator.update_deploy(self.snapshot()).await
    }

    pub async fn teardown(&self) -> Result<(), OrchestratorError> {
        self.orchestrator.teardown().await
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
