//! Client side of the deployment service: HTTP gateway, status feed and lifecycle state.

pub mod config;
pub mod gateway;
pub mod orchestrator;
pub mod session;
pub mod status_channel;

pub use config::{load_settings, Settings};
pub use gateway::{DeployGateway, DeployOperation, GatewayError, HttpDeployGateway};
pub use orchestrator::{DeployOrchestrator, DeployState, OrchestratorError};
pub use session::DeploySession;
pub use status_channel::{
    Backoff, ChannelState, ReconnectPolicy, StatusChannel, StatusHandler, StatusSource,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
