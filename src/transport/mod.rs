//! Transport layer for the probe session
//!
//! This module provides the seam between the session state machine and the
//! MQTT engine: the events the engine delivers, the intents the session
//! issues, and the [`SessionTransport`] trait that carries them.

use bytes::Bytes;
use std::fmt;

pub mod mqtt;

/// Delivery guarantee for a subscription or publish (QoS2 is not used)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
}

impl QosLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
        }
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QosLevel::AtMostOnce),
            1 => Ok(QosLevel::AtLeastOnce),
            other => Err(format!("unsupported QoS level {other}, expected 0 or 1")),
        }
    }
}

impl From<QosLevel> for u8 {
    fn from(qos: QosLevel) -> Self {
        qos.as_u8()
    }
}

impl fmt::Display for QosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS{}", self.as_u8())
    }
}

/// One (topic filter, QoS) pair of a subscription
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TopicQos {
    pub topic: String,
    pub qos: QosLevel,
}

impl TopicQos {
    pub fn new(topic: impl Into<String>, qos: QosLevel) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

/// Ordered, immutable set of topics to subscribe to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeIntent {
    topics: Vec<TopicQos>,
}

impl SubscribeIntent {
    pub fn new(topics: Vec<TopicQos>) -> Self {
        Self { topics }
    }

    pub fn topics(&self) -> &[TopicQos] {
        &self.topics
    }
}

/// Parameters of a single publish write, built fresh for every chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishIntent {
    pub topic: String,
    pub qos: QosLevel,
    /// Length of the whole message, not of this chunk
    pub payload_len: usize,
    pub is_final: bool,
}

/// Events delivered by the MQTT engine, one at a time
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionEstablished,
    ConnectionError(String),
    ConnectionClosed,
    Subscribed,
    WriteOpportunity,
    Acknowledged,
    ResendRequested(u16),
    MessageReceived { topic: String, payload: Bytes },
}

impl SessionEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::ConnectionEstablished => "connection_established",
            SessionEvent::ConnectionError(_) => "connection_error",
            SessionEvent::ConnectionClosed => "connection_closed",
            SessionEvent::Subscribed => "subscribed",
            SessionEvent::WriteOpportunity => "write_opportunity",
            SessionEvent::Acknowledged => "acknowledged",
            SessionEvent::ResendRequested(_) => "resend_requested",
            SessionEvent::MessageReceived { .. } => "message_received",
        }
    }
}

/// Operations the session needs from the MQTT engine
///
/// Every call returns without blocking. A synchronous `Err` means the engine
/// refused the request outright.
pub trait SessionTransport {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Queue a SUBSCRIBE for all topics in the intent
    fn send_subscribe(&mut self, intent: &SubscribeIntent) -> Result<(), Self::Error>;

    /// Write one chunk of a publish; `intent.is_final` closes the message
    fn send_publish(&mut self, intent: &PublishIntent, chunk: &[u8]) -> Result<(), Self::Error>;

    /// Ask for a `WriteOpportunity` event to be delivered
    fn request_write_opportunity(&mut self);

    /// Stop servicing the connection
    fn cancel_service(&mut self);
}
