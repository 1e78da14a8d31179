//! Pure routing of `rumqttc` events
//!
//! Reduces the engine's packet-level events to the handful the probe cares
//! about. Deciding what a route means for the session happens in the client.

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};
use rumqttc::v5::Event;

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to the matching [`EventRoute`] (pure function)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    if matches!(connack.code, ConnectReturnCode::Success) {
                        EventRoute::ConnectionAcknowledged
                    } else {
                        EventRoute::ConnectionRefused(format!("{:?}", connack.code))
                    }
                }
                Packet::SubAck(suback) => EventRoute::SubscriptionAcknowledged {
                    packet_id: suback.pkid,
                },
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged {
                    packet_id: puback.pkid,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// CONNACK with success code
    ConnectionAcknowledged,
    /// CONNACK with a failure code
    ConnectionRefused(String),
    SubscriptionAcknowledged { packet_id: u16 },
    PublishAcknowledged { packet_id: u16 },
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Bytes },
    /// Broker sent DISCONNECT
    Disconnected,
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

impl EventRoute {
    /// True for anything the broker sent us
    pub fn is_incoming(&self) -> bool {
        !matches!(self, EventRoute::OutgoingEvent)
    }
}
