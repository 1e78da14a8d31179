//! MQTT transport for the probe session
//!
//! Pure pieces and the I/O adapter are kept apart so most of the logic can be
//! tested without a broker:
//!
//! - [`connection`] - broker address and CONNECT options
//! - [`message_handler`] - routing of engine events
//! - [`health_monitor`] - ack timeout and idle hangup timers
//! - [`client`] - the [`SessionTransport`](crate::transport::SessionTransport)
//!   backed by `rumqttc`

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

pub use client::MqttSessionTransport;
pub use connection::{
    configure_mqtt_options, resolve_broker, to_rumqttc_qos, BrokerAddress, MqttError, MQTTS_PORT,
    MQTT_PORT,
};
pub use health_monitor::{IdlePolicy, LivenessDecision, LivenessMonitor};
pub use message_handler::{EventRoute, MessageHandler};
