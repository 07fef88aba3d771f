use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigTagError, UnknownServiceType};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(NodeId);
id_newtype!(EdgeId);
id_newtype!(DiagramId);

impl DiagramId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    #[serde(rename = "api-service")]
    ApiService,
    #[serde(rename = "postgresql")]
    Postgresql,
    #[serde(rename = "redis")]
    Redis,
    #[serde(rename = "nginx")]
    Nginx,
    #[serde(rename = "rabbitmq")]
    RabbitMq,
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        ServiceType::ApiService,
        ServiceType::Postgresql,
        ServiceType::Redis,
        ServiceType::Nginx,
        ServiceType::RabbitMq,
    ];

    /// Wire literal used in diagram files and on the deploy API.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::ApiService => "api-service",
            ServiceType::Postgresql => "postgresql",
            ServiceType::Redis => "redis",
            ServiceType::Nginx => "nginx",
            ServiceType::RabbitMq => "rabbitmq",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceType::ApiService => "API Service",
            ServiceType::Postgresql => "PostgreSQL",
            ServiceType::Redis => "Redis",
            ServiceType::Nginx => "Nginx",
            ServiceType::RabbitMq => "RabbitMQ",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ServiceType::ApiService => "HTTP service exposing mock endpoints",
            ServiceType::Postgresql => "Relational database",
            ServiceType::Redis => "In-memory cache",
            ServiceType::Nginx => "Reverse proxy and load balancer",
            ServiceType::RabbitMq => "Message broker",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = UnknownServiceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownServiceType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub response_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiServiceConfig {
    pub port: u16,
    pub endpoints: Vec<Endpoint>,
}

impl Default for ApiServiceConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PostgresqlConfig {
    pub engine: String,
    pub version: String,
}

impl Default for PostgresqlConfig {
    fn default() -> Self {
        Self {
            engine: "PostgreSQL".into(),
            version: "16".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisConfig {
    pub max_memory: String,
    pub eviction_policy: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            max_memory: "256mb".into(),
            eviction_policy: "noeviction".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NginxConfig {
    pub upstream_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RabbitMqConfig {
    pub vhost: String,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self { vhost: "/".into() }
    }
}

/// Per-service configuration, tagged on the wire by the same literal as the node's `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceConfig {
    #[serde(rename = "api-service")]
    ApiService(ApiServiceConfig),
    #[serde(rename = "postgresql")]
    Postgresql(PostgresqlConfig),
    #[serde(rename = "redis")]
    Redis(RedisConfig),
    #[serde(rename = "nginx")]
    Nginx(NginxConfig),
    #[serde(rename = "rabbitmq")]
    RabbitMq(RabbitMqConfig),
}

impl ServiceConfig {
    pub fn service_type(&self) -> ServiceType {
        match self {
            ServiceConfig::ApiService(_) => ServiceType::ApiService,
            ServiceConfig::Postgresql(_) => ServiceType::Postgresql,
            ServiceConfig::Redis(_) => ServiceType::Redis,
            ServiceConfig::Nginx(_) => ServiceType::Nginx,
            ServiceConfig::RabbitMq(_) => ServiceType::RabbitMq,
        }
    }

    /// Values the configuration forms show for a node that has no stored config.
    pub fn default_for(kind: ServiceType) -> Self {
        match kind {
            ServiceType::ApiService => ServiceConfig::ApiService(ApiServiceConfig::default()),
            ServiceType::Postgresql => ServiceConfig::Postgresql(PostgresqlConfig::default()),
            ServiceType::Redis => ServiceConfig::Redis(RedisConfig::default()),
            ServiceType::Nginx => ServiceConfig::Nginx(NginxConfig::default()),
            ServiceType::RabbitMq => ServiceConfig::RabbitMq(RabbitMqConfig::default()),
        }
    }
}

/// A node's configuration exactly as the document carried it.
///
/// Only the `type` tag is checked. Every other field is kept verbatim, including fields the
/// typed [`ServiceConfig`] view does not know or cannot decode, so export writes back what
/// import read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct NodeConfig {
    service_type: ServiceType,
    fields: Map<String, Value>,
}

impl NodeConfig {
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ConfigTagError> {
        let tag = fields
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ConfigTagError::Missing)?;
        let service_type = tag
            .parse()
            .map_err(|_| ConfigTagError::Unknown(tag.to_string()))?;
        Ok(Self {
            service_type,
            fields,
        })
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Typed view. Fields that do not decode fall back to the form defaults.
    pub fn typed(&self) -> ServiceConfig {
        if let Ok(config) = decode_config(&self.fields) {
            return config;
        }

        let mut accepted = Map::new();
        accepted.insert("type".into(), Value::from(self.service_type.as_str()));
        for (key, value) in &self.fields {
            if key == "type" {
                continue;
            }
            accepted.insert(key.clone(), value.clone());
            if decode_config(&accepted).is_err() {
                accepted.remove(key);
            }
        }
        decode_config(&accepted).unwrap_or_else(|_| ServiceConfig::default_for(self.service_type))
    }

    /// Overwrites the typed fields with `config`, keeping any other field already present.
    pub fn updated(&self, config: &ServiceConfig) -> Self {
        let mut next = self.clone();
        next.service_type = config.service_type();
        next.fields.extend(Self::from(config.clone()).fields);
        next
    }
}

fn decode_config(fields: &Map<String, Value>) -> serde_json::Result<ServiceConfig> {
    serde_json::from_value(Value::Object(fields.clone()))
}

impl From<ServiceConfig> for NodeConfig {
    fn from(config: ServiceConfig) -> Self {
        let service_type = config.service_type();
        let mut fields = match serde_json::to_value(&config) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        fields.insert("type".into(), Value::from(service_type.as_str()));
        Self {
            service_type,
            fields,
        }
    }
}

impl TryFrom<Map<String, Value>> for NodeConfig {
    type Error = ConfigTagError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_fields(fields)
    }
}

impl From<NodeConfig> for Map<String, Value> {
    fn from(config: NodeConfig) -> Self {
        config.fields
    }
}
