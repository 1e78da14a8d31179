//! Probe configuration
//!
//! Every field has a default, so the probe runs without a file. A TOML file
//! overrides any subset of the sections:
//!
//! ```toml
//! [broker]
//! url = "mqtt://broker.example:1883"
//!
//! [client]
//! client_id = "probe-1"
//! password_env = "MQTT_PASSWORD"
//!
//! [retry]
//! retry_cap = 5
//!
//! [workflow]
//! chunk_size = 512
//! ```

use crate::session::{
    PayloadChunker, RetryPolicy, Workflow, DEFAULT_CHUNK_SIZE, DEFAULT_PAYLOAD,
    DEFAULT_PUBLISH_TOPIC, DEFAULT_RETRY_CAP,
};
use crate::transport::{QosLevel, SubscribeIntent, TopicQos};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main probe configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProbeConfig {
    pub broker: BrokerSection,
    pub client: ClientSection,
    pub retry: RetrySection,
    pub workflow: WorkflowSection,
}

/// Broker address and transport security
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerSection {
    /// `mqtt://host[:port]` or `mqtts://host[:port]`
    pub url: String,
    /// Force TLS even for an `mqtt://` URL
    pub tls: bool,
    /// PEM CA bundle to trust instead of the platform roots
    pub ca_file: Option<PathBuf>,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: "mqtt://localhost".to_string(),
            tls: false,
            ca_file: None,
        }
    }
}

/// Fixed CONNECT parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientSection {
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub clean_start: bool,
    pub username: Option<String>,
    /// Environment variable containing the password
    pub password_env: Option<String>,
    pub will: Option<WillSection>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            client_id: "lwsMqttClient".to_string(),
            keep_alive_secs: 60,
            clean_start: true,
            username: Some("lwsUser".to_string()),
            password_env: Some("MQTT_PASSWORD".to_string()),
            will: Some(WillSection::default()),
        }
    }
}

/// Last will delivered by the broker if the probe drops off
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WillSection {
    pub topic: String,
    pub message: String,
    #[serde(default = "default_will_qos")]
    pub qos: QosLevel,
    #[serde(default)]
    pub retain: bool,
}

fn default_will_qos() -> QosLevel {
    QosLevel::AtMostOnce
}

impl Default for WillSection {
    fn default() -> Self {
        Self {
            topic: "good/bye".to_string(),
            message: "sign-off".to_string(),
            qos: default_will_qos(),
            retain: false,
        }
    }
}

/// Retry and idle policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySection {
    /// Seconds without a PUBACK before a QoS1 publish is resent; also caps
    /// the keep-alive, so a quiet connection is pinged at this interval
    pub secs_since_valid_ping: u64,
    /// Seconds without any traffic before the connection is declared dead
    pub secs_since_valid_hangup: u64,
    /// Resend attempts before permanent failure
    pub retry_cap: u32,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            secs_since_valid_ping: 20,
            secs_since_valid_hangup: 25,
            retry_cap: DEFAULT_RETRY_CAP,
        }
    }
}

/// Topics and payload of the probe workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowSection {
    pub publish_topic: String,
    pub chunk_size: usize,
    /// File whose bytes replace the built-in payload
    pub payload_file: Option<PathBuf>,
    pub subscriptions: Vec<TopicQos>,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            publish_topic: DEFAULT_PUBLISH_TOPIC.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            payload_file: None,
            subscriptions: vec![
                TopicQos::new("test/topic0", QosLevel::AtMostOnce),
                TopicQos::new("test/topic1", QosLevel::AtLeastOnce),
            ],
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to read payload file {path}: {source}")]
    PayloadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProbeConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ProbeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.chunk_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "workflow.chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.workflow.publish_topic.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "workflow.publish_topic must not be empty".to_string(),
            ));
        }
        if self.workflow.subscriptions.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "workflow.subscriptions must list at least one topic".to_string(),
            ));
        }
        if let Some(empty) = self.workflow.subscriptions.iter().find(|s| s.topic.is_empty()) {
            return Err(ConfigError::InvalidConfig(format!(
                "subscription topic must not be empty (qos {})",
                empty.qos
            )));
        }
        if self.retry.retry_cap == 0 {
            return Err(ConfigError::InvalidConfig(
                "retry.retry_cap must be greater than 0".to_string(),
            ));
        }
        // Also the keep-alive ceiling, so the same floor as keep_alive_secs
        if self.retry.secs_since_valid_ping < 5 {
            return Err(ConfigError::InvalidConfig(format!(
                "retry.secs_since_valid_ping must be at least 5, got {}",
                self.retry.secs_since_valid_ping
            )));
        }
        // A PINGRESP must be able to arrive before the idle hangup
        if self.retry.secs_since_valid_hangup <= self.retry.secs_since_valid_ping {
            return Err(ConfigError::InvalidConfig(format!(
                "retry.secs_since_valid_hangup ({}) must be greater than secs_since_valid_ping ({})",
                self.retry.secs_since_valid_hangup, self.retry.secs_since_valid_ping
            )));
        }
        if self.client.client_id.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "client.client_id must not be empty".to_string(),
            ));
        }
        // rumqttc refuses short non-zero keep-alives
        if self.client.keep_alive_secs != 0 && self.client.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(format!(
                "client.keep_alive_secs must be 0 or at least 5, got {}",
                self.client.keep_alive_secs
            )));
        }
        Ok(())
    }

    /// Get MQTT password from environment variable
    pub fn get_mqtt_password(&self) -> Option<String> {
        self.client
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }

    /// Build the workflow, reading `payload_file` if one is configured
    pub fn workflow(&self) -> Result<Workflow, ConfigError> {
        let payload = match &self.workflow.payload_file {
            Some(path) => Bytes::from(std::fs::read(path).map_err(|source| {
                ConfigError::PayloadRead {
                    path: path.clone(),
                    source,
                }
            })?),
            None => Bytes::from_static(DEFAULT_PAYLOAD.as_bytes()),
        };

        let chunker = PayloadChunker::new(payload, self.workflow.chunk_size)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        Ok(Workflow {
            subscribe: SubscribeIntent::new(self.workflow.subscriptions.clone()),
            publish_topic: self.workflow.publish_topic.clone(),
            chunker,
            retry: RetryPolicy::new(self.retry.retry_cap),
        })
    }
}
