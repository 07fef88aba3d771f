use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body the deployment service attaches to non-2xx responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown service type: {0:?}")]
pub struct UnknownServiceType(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigTagError {
    #[error("config is missing string field `type`")]
    Missing,
    #[error("config.type {0:?} is not a valid service type")]
    Unknown(String),
}
