use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    error::ErrorBody,
    protocol::{DeployResponse, DeployStatusResponse, Diagram},
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::endpoint_url;

const DEPLOY_PATH: &str = "/api/deploy";
const DEPLOY_STATUS_PATH: &str = "/api/deploy/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOperation {
    Deploy,
    Teardown,
    UpdateDeploy,
    StatusCheck,
}

impl DeployOperation {
    pub fn label(self) -> &'static str {
        match self {
            DeployOperation::Deploy => "Deploy",
            DeployOperation::Teardown => "Teardown",
            DeployOperation::UpdateDeploy => "Update deploy",
            DeployOperation::StatusCheck => "Status check",
        }
    }
}

/// A failed gateway call. `status` is `None` when no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub operation: DeployOperation,
    pub status: Option<u16>,
    pub message: String,
}

impl GatewayError {
    fn transport(operation: DeployOperation, err: reqwest::Error) -> Self {
        Self {
            operation,
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Request/response access to the remote deployment service. No call retries on its own.
#[async_trait]
pub trait DeployGateway: Send + Sync {
    async fn deploy(&self, diagram: &Diagram) -> Result<DeployResponse, GatewayError>;
    async fn teardown(&self) -> Result<DeployResponse, GatewayError>;
    async fn update_deploy(&self, diagram: &Diagram)
        -> Result<DeployStatusResponse, GatewayError>;
    async fn deploy_status(&self) -> Result<DeployStatusResponse, GatewayError>;
}

pub struct HttpDeployGateway {
    http: Client,
    deploy_url: Url,
    status_url: Url,
}

impl HttpDeployGateway {
    pub fn new(api_base: &Url) -> anyhow::Result<Self> {
        Self::with_client(Client::new(), api_base)
    }

    pub fn with_client(http: Client, api_base: &Url) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            deploy_url: endpoint_url(api_base, DEPLOY_PATH)?,
            status_url: endpoint_url(api_base, DEPLOY_STATUS_PATH)?,
        })
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: DeployOperation,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request.send().await.map_err(|err| {
            warn!(operation = operation.label(), error = %err, "deploy api unreachable");
            GatewayError::transport(operation, err)
        })?;

        let status = response.status();
        if !status.is_success() {
            // Non-JSON error bodies fall back to the generic message.
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            let message = body
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} failed: {}", operation.label(), status.as_u16()));
            warn!(
                operation = operation.label(),
                status = status.as_u16(),
                %message,
                "deploy api returned an error"
            );
            return Err(GatewayError {
                operation,
                status: Some(status.as_u16()),
                message,
            });
        }

        debug!(operation = operation.label(), status = status.as_u16(), "deploy api call succeeded");
        response
            .json::<T>()
            .await
            .map_err(|err| GatewayError::transport(operation, err))
    }
}

#[async_trait]
impl DeployGateway for HttpDeployGateway {
    async fn deploy(&self, diagram: &Diagram) -> Result<DeployResponse, GatewayError> {
        let request = self.http.post(self.deploy_url.clone()).json(diagram);
        self.send(DeployOperation::Deploy, request).await
    }

    async fn teardown(&self) -> Result<DeployResponse, GatewayError> {
        let request = self.http.delete(self.deploy_url.clone());
        self.send(DeployOperation::Teardown, request).await
    }

    async fn update_deploy(
        &self,
        diagram: &Diagram,
    ) -> Result<DeployStatusResponse, GatewayError> {
        let request = self.http.put(self.deploy_url.clone()).json(diagram);
        self.send(DeployOperation::UpdateDeploy, request).await
    }

    async fn deploy_status(&self) -> Result<DeployStatusResponse, GatewayError> {
        let request = self.http.get(self.status_url.clone());
        self.send(DeployOperation::StatusCheck, request).await
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
