//! Session driven through the rumqttc-backed transport
//!
//! Runs the same loop as the connection controller (local events drained
//! first, then broker traffic or a timer) on a paused clock. Broker traffic
//! is fed in as routed events, so no broker is needed; the engine's request
//! channel is left unpolled.

use mqtt_probe::config::ProbeConfig;
use mqtt_probe::lifecycle::{Outcome, RunSignal};
use mqtt_probe::session::{Session, SessionState};
use mqtt_probe::testing::RecordingInspector;
use mqtt_probe::transport::mqtt::{
    configure_mqtt_options, EventRoute, IdlePolicy, MqttSessionTransport,
};
use mqtt_probe::transport::SessionEvent;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

struct Harness {
    session: Session,
    transport: MqttSessionTransport,
    signal: RunSignal,
    keep_alive: Duration,
    start: Instant,
    seen: Vec<(u64, SessionEvent)>,
    _event_loop: EventLoop,
}

impl Harness {
    fn new(config: ProbeConfig) -> Self {
        let (options, _) = configure_mqtt_options(&config, false, None).unwrap();
        let keep_alive = options.keep_alive();
        let (client, event_loop) = AsyncClient::new(options, 10);
        let start = Instant::now();

        Self {
            session: Session::new(
                Arc::new(config.workflow().unwrap()),
                Box::new(RecordingInspector::default()),
            ),
            transport: MqttSessionTransport::new(client, IdlePolicy::from(&config.retry), start),
            signal: RunSignal::new(),
            keep_alive,
            start,
            seen: Vec::new(),
            _event_loop: event_loop,
        }
    }

    fn handle(&mut self, event: SessionEvent, now: Instant) {
        let at = now.duration_since(self.start).as_secs();
        self.seen.push((at, event.clone()));
        self.session.handle(event, &mut self.transport, &self.signal);
    }

    fn drain(&mut self) {
        let now = Instant::now();
        while !self.signal.is_interrupted() {
            match self.transport.take_event(now) {
                Some(event) => self.handle(event, now),
                None => break,
            }
        }
    }

    fn deliver(&mut self, route: EventRoute) {
        let now = Instant::now();
        if let Some(event) = self.transport.translate(route, now) {
            self.handle(event, now);
        }
        self.drain();
    }

    async fn fire_timer(&mut self) {
        sleep_until(self.transport.next_deadline()).await;
        let now = Instant::now();
        if let Some(event) = self.transport.check_liveness(now) {
            self.handle(event, now);
        }
        self.drain();
    }

    /// CONNACK and SUBACK, which lets both publishes go out
    fn connect_and_publish(&mut self) {
        self.deliver(EventRoute::ConnectionAcknowledged);
        assert_eq!(self.session.state(), SessionState::PublishQos0);
        self.deliver(EventRoute::SubscriptionAcknowledged { packet_id: 1 });
    }

    fn resends(&self) -> Vec<(u64, u16)> {
        self.seen
            .iter()
            .filter_map(|(at, event)| match event {
                SessionEvent::ResendRequested(id) => Some((*at, *id)),
                _ => None,
            })
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_run_over_mqtt_transport() {
    let mut h = Harness::new(ProbeConfig::default());

    h.connect_and_publish();
    assert_eq!(h.session.state(), SessionState::WaitAck1);
    assert!(h.transport.is_awaiting_ack());

    let events: Vec<&SessionEvent> = h.seen.iter().map(|(_, e)| e).collect();
    let ack = events
        .iter()
        .position(|e| **e == SessionEvent::Acknowledged)
        .unwrap();
    // Five QoS0 chunks, then the synthetic ack ahead of the next write slot
    assert!(events[ack - 5..ack]
        .iter()
        .all(|e| **e == SessionEvent::WriteOpportunity));
    assert_eq!(events[ack - 6], &SessionEvent::Subscribed);
    assert_eq!(events[ack + 1], &SessionEvent::WriteOpportunity);

    h.deliver(EventRoute::PublishAcknowledged { packet_id: 2 });

    assert_eq!(h.session.state(), SessionState::Finish);
    assert_eq!(h.signal.outcome(), Outcome::Success);
    assert!(h.signal.is_interrupted());
    assert!(h.transport.is_cancelled());
    assert_eq!(h.transport.take_event(Instant::now()), None);
}

#[tokio::test(start_paused = true)]
async fn test_unacked_qos1_reaches_resend_limit() {
    let mut h = Harness::new(ProbeConfig::default());
    assert_eq!(h.keep_alive, Duration::from_secs(20));

    h.connect_and_publish();
    assert_eq!(h.session.state(), SessionState::WaitAck1);

    // Broker answers every keep-alive PINGREQ but never sends the PUBACK
    let mut next_ping = Instant::now() + h.keep_alive;
    while !h.signal.is_interrupted() {
        if next_ping <= h.transport.next_deadline() {
            sleep_until(next_ping).await;
            h.deliver(EventRoute::InfrastructureEvent("PingResp".to_string()));
            next_ping += h.keep_alive;
        } else {
            h.fire_timer().await;
        }
    }

    assert_eq!(h.resends(), vec![(20, 2), (40, 3), (60, 4)]);
    assert!(h
        .seen
        .iter()
        .all(|(_, e)| !matches!(e, SessionEvent::ConnectionError(_))));
    assert!(h.session.is_aborted());
    assert_eq!(h.session.retry_count(), 3);

    let status = h.signal.status();
    assert_eq!(status.outcome, Outcome::Failure);
    assert!(status
        .reason
        .unwrap()
        .contains("Resend limit reached after 3 attempts"));
}

#[tokio::test(start_paused = true)]
async fn test_silent_broker_is_hung_up() {
    let mut h = Harness::new(ProbeConfig::default());
    h.connect_and_publish();

    // No PINGRESP either: one resend, then the idle timer runs out
    while !h.signal.is_interrupted() {
        h.fire_timer().await;
    }

    assert_eq!(h.resends(), vec![(20, 2)]);
    assert_eq!(
        h.seen.last(),
        Some(&(
            25,
            SessionEvent::ConnectionError("no valid traffic for 25s".to_string())
        ))
    );
    assert_eq!(h.signal.outcome(), Outcome::Failure);
}
