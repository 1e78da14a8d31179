//! Pure connection configuration for the MQTT client
//!
//! Turns the probe configuration into `rumqttc` options. Everything here
//! either succeeds synchronously or reports why the connection request
//! cannot be made.

use super::health_monitor::IdlePolicy;
use crate::config::ProbeConfig;
use crate::transport::QosLevel;
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

pub const MQTT_PORT: u16 = 1883;
pub const MQTTS_PORT: u16 = 8883;

/// ALPN protocol id announced on TLS connections
const MQTT_ALPN: &[u8] = b"mqtt";

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Failed to read CA file {path}")]
    TlsSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Publish of {expected} bytes reassembled to {actual} bytes")]
    IncompleteMessage { expected: usize, actual: usize },
    #[error("Service cancelled")]
    ServiceCancelled,
}

/// Resolved broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse the broker URL; `force_tls` upgrades an `mqtt://` URL (pure function)
///
/// Without an explicit port the default follows the transport: 1883 plain,
/// 8883 with TLS.
pub fn resolve_broker(broker_url: &str, force_tls: bool) -> Result<BrokerAddress, MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let tls = match url.scheme() {
        "mqtt" | "tcp" => force_tls,
        "mqtts" | "ssl" => true,
        _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
    };

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(if tls { MQTTS_PORT } else { MQTT_PORT });

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
        tls,
    })
}

pub fn to_rumqttc_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Build the TLS transport, trusting `ca_file` if one is given
fn configure_tls(ca_file: Option<&PathBuf>) -> Result<RumqttcTransport, MqttError> {
    match ca_file {
        Some(path) => {
            let ca = std::fs::read(path).map_err(|source| MqttError::TlsSetup {
                path: path.clone(),
                source,
            })?;
            Ok(RumqttcTransport::tls_with_config(TlsConfiguration::Simple {
                ca,
                alpn: Some(vec![MQTT_ALPN.to_vec()]),
                client_auth: None,
            }))
        }
        None => Ok(RumqttcTransport::tls_with_default_config()),
    }
}

/// Configure MQTT options from the probe configuration
///
/// Fixed CONNECT parameters: client id, keep-alive, clean start, last will,
/// credentials and optional TLS. The keep-alive never exceeds
/// `retry.secs_since_valid_ping`, since the engine's PINGREQ is what keeps
/// the idle timer from running out.
pub fn configure_mqtt_options(
    config: &ProbeConfig,
    force_tls: bool,
    password: Option<String>,
) -> Result<(MqttOptions, BrokerAddress), MqttError> {
    let address = resolve_broker(&config.broker.url, force_tls || config.broker.tls)?;
    let client = &config.client;

    let mut mqtt_options = MqttOptions::new(&client.client_id, &address.host, address.port);
    let keep_alive = IdlePolicy::from(&config.retry).keep_alive(client.keep_alive_secs);
    mqtt_options.set_keep_alive(keep_alive);
    mqtt_options.set_clean_start(client.clean_start);

    if let Some(username) = &client.username {
        mqtt_options.set_credentials(username, password.unwrap_or_default());
    }

    if let Some(will) = &client.will {
        let lwt = LastWill::new(
            &will.topic,
            will.message.clone(),
            to_rumqttc_qos(will.qos),
            will.retain,
            None,
        );
        mqtt_options.set_last_will(lwt);
    }

    if address.tls {
        mqtt_options.set_transport(configure_tls(config.broker.ca_file.as_ref())?);
    }

    Ok((mqtt_options, address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolve_default_ports() {
        let plain = resolve_broker("mqtt://localhost", false).unwrap();
        assert_eq!(plain.port, 1883);
        assert!(!plain.tls);

        let forced = resolve_broker("mqtt://localhost", true).unwrap();
        assert_eq!(forced.port, 8883);
        assert!(forced.tls);

        let secure = resolve_broker("mqtts://broker.example", false).unwrap();
        assert_eq!(secure.host, "broker.example");
        assert_eq!(secure.port, 8883);
        assert!(secure.tls);
    }

    #[test]
    fn test_resolve_explicit_port_wins() {
        let address = resolve_broker("mqtt://localhost:11883", true).unwrap();
        assert_eq!(address.port, 11883);
        assert!(address.tls);
    }

    #[test]
    fn test_invalid_broker_url() {
        assert!(matches!(
            resolve_broker("invalid-url", false),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
        assert!(matches!(
            resolve_broker("http://localhost", false),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(to_rumqttc_qos(QosLevel::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(to_rumqttc_qos(QosLevel::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let config = ProbeConfig::default();
        let (_, address) = configure_mqtt_options(&config, false, None).unwrap();
        assert_eq!(address.port, 1883);
        assert!(!address.tls);
    }

    #[test]
    fn test_keep_alive_follows_ping_interval() {
        let config = ProbeConfig::default();
        let (options, _) = configure_mqtt_options(&config, false, None).unwrap();
        assert_eq!(options.keep_alive(), Duration::from_secs(20));
        assert!(options.keep_alive().as_secs() < config.retry.secs_since_valid_hangup);

        let mut shorter = ProbeConfig::default();
        shorter.client.keep_alive_secs = 10;
        let (options, _) = configure_mqtt_options(&shorter, false, None).unwrap();
        assert_eq!(options.keep_alive(), Duration::from_secs(10));
    }

    #[test]
    fn test_missing_ca_file_is_rejected() {
        let mut config = ProbeConfig::default();
        config.broker.ca_file = Some(PathBuf::from("/nonexistent/mosq-ca.crt"));
        let result = configure_mqtt_options(&config, true, None);
        assert!(matches!(result, Err(MqttError::TlsSetup { .. })));
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::InvalidBrokerUrl("test".to_string()),
            MqttError::IncompleteMessage {
                expected: 10,
                actual: 4,
            },
            MqttError::ServiceCancelled,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
