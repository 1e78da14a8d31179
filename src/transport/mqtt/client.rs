//! Session transport backed by `rumqttc`
//!
//! The engine takes whole messages, so publish chunks are reassembled here
//! and handed off when the final chunk arrives. This adapter also produces
//! the events the engine does not: the synthetic QoS0 ack, write
//! opportunities, resend requests and idle hangup.

use super::connection::{to_rumqttc_qos, MqttError};
use super::health_monitor::{IdlePolicy, LivenessDecision, LivenessMonitor};
use super::message_handler::EventRoute;
use crate::transport::{PublishIntent, QosLevel, SessionEvent, SessionTransport, SubscribeIntent};
use bytes::BytesMut;
use rumqttc::v5::mqttbytes::v5::Filter;
use rumqttc::v5::AsyncClient;
use std::collections::VecDeque;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// MQTT transport for one probe session
pub struct MqttSessionTransport {
    client: AsyncClient,
    pending_message: BytesMut,
    events: VecDeque<SessionEvent>,
    write_requested: bool,
    awaiting_ack: Option<QosLevel>,
    publish_seq: u16,
    liveness: LivenessMonitor,
    // Last instant handed in by the caller; QoS1 ack timers start from it
    clock: Instant,
    cancelled: bool,
}

impl MqttSessionTransport {
    pub fn new(client: AsyncClient, policy: IdlePolicy, now: Instant) -> Self {
        Self {
            client,
            pending_message: BytesMut::new(),
            events: VecDeque::new(),
            write_requested: false,
            awaiting_ack: None,
            publish_seq: 0,
            liveness: LivenessMonitor::new(policy, now),
            clock: now,
            cancelled: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack.is_some()
    }

    /// Next event produced locally: queued events first, then a write opportunity
    ///
    /// `now` is the instant the session handles the event at.
    pub fn take_event(&mut self, now: Instant) -> Option<SessionEvent> {
        self.clock = now;
        if self.cancelled {
            return None;
        }
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        if std::mem::take(&mut self.write_requested) {
            return Some(SessionEvent::WriteOpportunity);
        }
        None
    }

    /// Turn a routed engine event into a session event, if it means anything
    ///
    /// Only broker traffic keeps the connection alive.
    pub fn translate(&mut self, route: EventRoute, now: Instant) -> Option<SessionEvent> {
        self.clock = now;
        if route.is_incoming() {
            self.liveness.record_traffic(now);
        }

        match route {
            EventRoute::ConnectionAcknowledged => Some(SessionEvent::ConnectionEstablished),
            EventRoute::ConnectionRefused(code) => Some(SessionEvent::ConnectionError(format!(
                "connection refused: {code}"
            ))),
            EventRoute::SubscriptionAcknowledged { packet_id } => {
                debug!(target: "mqtt_transport", "SubAck for packet {}", packet_id);
                self.write_requested = true;
                Some(SessionEvent::Subscribed)
            }
            EventRoute::PublishAcknowledged { packet_id } => {
                if self.awaiting_ack == Some(QosLevel::AtLeastOnce) {
                    self.awaiting_ack = None;
                    self.liveness.disarm_ack_timer();
                    Some(SessionEvent::Acknowledged)
                } else {
                    debug!(
                        target: "mqtt_transport",
                        "Ignoring stale PubAck for packet {}", packet_id
                    );
                    None
                }
            }
            EventRoute::MessageReceived { topic, payload } => {
                Some(SessionEvent::MessageReceived { topic, payload })
            }
            EventRoute::Disconnected => Some(SessionEvent::ConnectionClosed),
            EventRoute::InfrastructureEvent(event) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event);
                None
            }
            EventRoute::OutgoingEvent => None,
        }
    }

    /// Earliest instant a timer can fire
    pub fn next_deadline(&self) -> Instant {
        self.liveness.next_deadline()
    }

    /// Raise a resend request or hangup if a timer ran out
    pub fn check_liveness(&mut self, now: Instant) -> Option<SessionEvent> {
        self.clock = now;
        match self.liveness.check(now) {
            LivenessDecision::Healthy => None,
            LivenessDecision::ResendDue { publish_id } => {
                self.awaiting_ack = None;
                Some(SessionEvent::ResendRequested(publish_id))
            }
            LivenessDecision::Hangup { idle } => Some(SessionEvent::ConnectionError(format!(
                "no valid traffic for {}s",
                idle.as_secs()
            ))),
        }
    }

    fn next_publish_id(&mut self) -> u16 {
        self.publish_seq = self.publish_seq.checked_add(1).unwrap_or(1);
        self.publish_seq
    }
}

impl SessionTransport for MqttSessionTransport {
    type Error = MqttError;

    fn send_subscribe(&mut self, intent: &SubscribeIntent) -> Result<(), Self::Error> {
        if self.cancelled {
            return Err(MqttError::ServiceCancelled);
        }

        let filters: Vec<Filter> = intent
            .topics()
            .iter()
            .map(|t| Filter::new(t.topic.clone(), to_rumqttc_qos(t.qos)))
            .collect();

        self.client
            .try_subscribe_many(filters)
            .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;

        for topic in intent.topics() {
            debug!(target: "mqtt_transport", "Subscribing to {} at {}", topic.topic, topic.qos);
        }
        Ok(())
    }

    fn send_publish(&mut self, intent: &PublishIntent, chunk: &[u8]) -> Result<(), Self::Error> {
        if self.cancelled {
            return Err(MqttError::ServiceCancelled);
        }

        self.pending_message.extend_from_slice(chunk);
        self.write_requested = true;
        if !intent.is_final {
            return Ok(());
        }

        let message = self.pending_message.split().freeze();
        if message.len() != intent.payload_len {
            return Err(MqttError::IncompleteMessage {
                expected: intent.payload_len,
                actual: message.len(),
            });
        }

        self.client
            .try_publish(
                intent.topic.clone(),
                to_rumqttc_qos(intent.qos),
                false,
                message,
            )
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        let publish_id = self.next_publish_id();
        debug!(
            target: "mqtt_transport",
            "Handed off publish {} to {} ({} bytes, {})",
            publish_id, intent.topic, intent.payload_len, intent.qos
        );

        match intent.qos {
            QosLevel::AtMostOnce => {
                // No PUBACK exists for QoS0; acknowledge as soon as it is handed off
                self.events.push_back(SessionEvent::Acknowledged);
            }
            QosLevel::AtLeastOnce => {
                self.awaiting_ack = Some(QosLevel::AtLeastOnce);
                self.liveness.arm_ack_timer(self.clock, publish_id);
            }
        }
        Ok(())
    }

    fn request_write_opportunity(&mut self) {
        self.write_requested = true;
    }

    fn cancel_service(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.events.clear();
        self.write_requested = false;
        match self.client.try_disconnect() {
            Ok(()) => info!("MQTT service cancelled, disconnect queued"),
            Err(e) => warn!("MQTT service cancelled, disconnect not queued: {}", e),
        }
    }
}
