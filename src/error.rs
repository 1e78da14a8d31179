//! Top-level error type for the probe
//!
//! Each layer has its own error enum; this one wraps the ones that can stop
//! the binary before a session starts.

use crate::config::ConfigError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for probe operations
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),
}

/// Result type for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;
