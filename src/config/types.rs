use std::time::Duration;

use serde::Deserialize;

use crate::args::{OutputFormat, TransportKind};
use crate::error::ValidationError;

use super::parse_duration_value;

/// On-disk configuration. Every field is optional; absent fields keep the
/// CLI, environment or built-in value.
///
/// The `rabbitmq` section name and the camelCase keys of the older JSON
/// layout are accepted as aliases.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(alias = "rabbitmq")]
    pub bus: Option<BusConfig>,
    pub client: Option<ClientConfig>,
    pub load: Option<LoadConfig>,
    pub transport: Option<TransportKind>,
    pub output_format: Option<OutputFormat>,
    pub no_color: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BusConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(alias = "user")]
    pub username: Option<String>,
    #[serde(alias = "pass")]
    pub password: Option<String>,
    pub vhost: Option<String>,
    #[serde(alias = "exchangeName")]
    pub exchange: Option<String>,
    #[serde(alias = "routingKey")]
    pub routing_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    #[serde(alias = "timeoutSeconds")]
    pub timeout: Option<DurationValue>,
    pub connect_attempts: Option<u32>,
    pub connect_retry_delay: Option<DurationValue>,
    /// Default concurrency for load runs.
    #[serde(alias = "threadPoolSize")]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadConfig {
    pub requests: Option<u64>,
    pub concurrency: Option<usize>,
    pub run_timeout: Option<DurationValue>,
    #[serde(alias = "top")]
    pub top_failures: Option<usize>,
}

/// A duration written either as whole seconds or as text like `"500ms"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    /// # Errors
    ///
    /// Returns an error when the value is zero or cannot be parsed.
    pub fn to_duration(&self) -> Result<Duration, ValidationError> {
        match self {
            DurationValue::Seconds(0) => Err(ValidationError::DurationZero),
            DurationValue::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationValue::Text(text) => parse_duration_value(text),
        }
    }
}
