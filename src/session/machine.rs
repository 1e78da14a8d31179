//! The session event handler
//!
//! [`Session::handle`] is the single entry point. It dispatches each event to
//! one handler and turns any [`SessionError`] into an abort on the run signal.

use super::chunker::PayloadChunker;
use super::retry::RetryPolicy;
use super::state::SessionState;
use super::SessionError;
use crate::lifecycle::RunSignal;
use crate::observability::MessageInspector;
use crate::transport::{
    PublishIntent, QosLevel, SessionEvent, SessionTransport, SubscribeIntent, TopicQos,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Topic the payload is published to
pub const DEFAULT_PUBLISH_TOPIC: &str = "test/topic";

/// Fixed parameters of the probe workflow, shared by every session
#[derive(Debug, Clone)]
pub struct Workflow {
    pub subscribe: SubscribeIntent,
    pub publish_topic: String,
    pub chunker: PayloadChunker,
    pub retry: RetryPolicy,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            subscribe: SubscribeIntent::new(vec![
                TopicQos::new("test/topic0", QosLevel::AtMostOnce),
                TopicQos::new("test/topic1", QosLevel::AtLeastOnce),
            ]),
            publish_topic: DEFAULT_PUBLISH_TOPIC.to_string(),
            chunker: PayloadChunker::with_default_payload(),
            retry: RetryPolicy::default(),
        }
    }
}

/// State of one connection's run through the workflow
pub struct Session {
    state: SessionState,
    position: usize,
    retry_count: u32,
    aborted: bool,
    workflow: Arc<Workflow>,
    inspector: Box<dyn MessageInspector>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("position", &self.position)
            .field("retry_count", &self.retry_count)
            .field("aborted", &self.aborted)
            .finish()
    }
}

impl Session {
    pub fn new(workflow: Arc<Workflow>, inspector: Box<dyn MessageInspector>) -> Self {
        Self {
            state: SessionState::INITIAL,
            position: 0,
            retry_count: 0,
            aborted: false,
            workflow,
            inspector,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Finished or aborted; no further events have any effect
    pub fn is_terminal(&self) -> bool {
        self.aborted || self.state.is_terminal()
    }

    /// Handle one event from the MQTT engine
    pub fn handle<T>(&mut self, event: SessionEvent, transport: &mut T, signal: &RunSignal)
    where
        T: SessionTransport + ?Sized,
    {
        if self.is_terminal() {
            debug!(
                "Session {} ignoring {} event",
                if self.aborted { "aborted," } else { "finished," },
                event.kind()
            );
            return;
        }

        let result = match event {
            SessionEvent::ConnectionEstablished => {
                self.on_connection_established(transport);
                Ok(())
            }
            SessionEvent::ConnectionError(message) => Err(SessionError::ConnectionFailed(message)),
            SessionEvent::ConnectionClosed => Err(SessionError::ConnectionClosed),
            SessionEvent::Subscribed => {
                info!("MQTT subscribed");
                Ok(())
            }
            SessionEvent::WriteOpportunity => self.on_write_opportunity(transport, signal),
            SessionEvent::Acknowledged => {
                self.on_acknowledged(transport, signal);
                Ok(())
            }
            SessionEvent::ResendRequested(packet_id) => {
                self.on_resend_requested(packet_id, transport)
            }
            SessionEvent::MessageReceived { topic, payload } => {
                info!("MQTT message received on {} ({} bytes)", topic, payload.len());
                self.inspector.inspect(&topic, &payload);
                Ok(())
            }
        };

        if let Err(e) = result {
            self.abort(e, signal);
        }
    }

    fn on_connection_established<T>(&mut self, transport: &mut T)
    where
        T: SessionTransport + ?Sized,
    {
        info!("MQTT client established");
        transport.request_write_opportunity();
    }

    fn on_write_opportunity<T>(
        &mut self,
        transport: &mut T,
        signal: &RunSignal,
    ) -> Result<(), SessionError>
    where
        T: SessionTransport + ?Sized,
    {
        if signal.is_interrupted() {
            debug!("Run interrupted, not using write opportunity in {}", self.state);
            return Ok(());
        }

        match self.state {
            SessionState::Subscribe => {
                info!(
                    "Write opportunity: subscribing to {} topics",
                    self.workflow.subscribe.topics().len()
                );
                transport
                    .send_subscribe(&self.workflow.subscribe)
                    .map_err(|e| SessionError::SubscribeRejected(Box::new(e)))?;
                self.advance();
                Ok(())
            }
            SessionState::PublishQos0 | SessionState::PublishQos1 => {
                self.publish_next_chunk(transport)
            }
            SessionState::WaitAck0 | SessionState::WaitAck1 | SessionState::Finish => {
                debug!("Spurious write opportunity in {}, nothing to send", self.state);
                Ok(())
            }
        }
    }

    fn publish_next_chunk<T>(&mut self, transport: &mut T) -> Result<(), SessionError>
    where
        T: SessionTransport + ?Sized,
    {
        let Some(qos) = self.state.publish_qos() else {
            return Ok(());
        };

        let chunker = &self.workflow.chunker;
        let chunk = chunker.next_chunk(self.position)?;
        let intent = PublishIntent {
            topic: self.workflow.publish_topic.clone(),
            qos,
            payload_len: chunker.payload_len(),
            is_final: chunk.is_final,
        };

        debug!(
            "Write opportunity: publishing {} bytes at offset {} ({}, final: {})",
            chunk.len(),
            self.position,
            qos,
            chunk.is_final
        );
        transport
            .send_publish(&intent, &chunk.bytes)
            .map_err(|e| SessionError::PublishRejected(Box::new(e)))?;

        self.position += chunk.len();
        if chunk.is_final {
            self.position = 0;
            self.advance();
        }
        Ok(())
    }

    fn on_acknowledged<T>(&mut self, transport: &mut T, signal: &RunSignal)
    where
        T: SessionTransport + ?Sized,
    {
        if !self.state.is_waiting() {
            warn!("Unexpected ack in {}, ignoring", self.state);
            return;
        }
        info!("MQTT ack in {}", self.state);
        self.advance();

        if self.state.is_terminal() {
            info!("Probe workflow finished");
            signal.complete();
            transport.cancel_service();
        } else if self.state.publish_qos().is_some() {
            transport.request_write_opportunity();
        }
    }

    fn on_resend_requested<T>(
        &mut self,
        packet_id: u16,
        transport: &mut T,
    ) -> Result<(), SessionError>
    where
        T: SessionTransport + ?Sized,
    {
        let Some(target) = self.state.resend_target() else {
            warn!("Resend of packet {} requested in {}, ignoring", packet_id, self.state);
            return Ok(());
        };

        self.retry_count += 1;
        if !self.workflow.retry.should_retry(self.retry_count) {
            return Err(SessionError::RetriesExhausted {
                attempts: self.retry_count,
                packet_id,
            });
        }

        warn!(
            "Resend of packet {} requested, attempt {}/{}",
            packet_id,
            self.retry_count,
            self.workflow.retry.cap()
        );
        debug!("Session state: {} -> {} (resend)", self.state, target);
        self.state = target;
        self.position = 0;
        transport.request_write_opportunity();
        Ok(())
    }

    /// Take one forward step; entering a publish state starts a fresh attempt
    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            debug!("Session state: {} -> {}", self.state, next);
            if next.publish_qos().is_some() {
                self.retry_count = 0;
            }
            self.state = next;
        }
    }

    fn abort(&mut self, error: SessionError, signal: &RunSignal) {
        let reason = error.report();
        error!("Session aborted in {}: {}", self.state, reason);
        self.aborted = true;
        signal.fail(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockTransport, RecordingInspector, TransportCall};
    use bytes::Bytes;

    fn new_session() -> Session {
        Session::new(
            Arc::new(Workflow::default()),
            Box::new(RecordingInspector::default()),
        )
    }

    fn drive_to(
        session: &mut Session,
        target: SessionState,
        transport: &mut MockTransport,
        signal: &RunSignal,
    ) {
        while session.state() != target {
            match session.state() {
                SessionState::WaitAck0 | SessionState::WaitAck1 => {
                    session.handle(SessionEvent::Acknowledged, transport, signal)
                }
                _ => session.handle(SessionEvent::WriteOpportunity, transport, signal),
            }
        }
    }

    #[test]
    fn test_connection_established_requests_write() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();

        session.handle(SessionEvent::ConnectionEstablished, &mut transport, &signal);

        assert_eq!(session.state(), SessionState::Subscribe);
        assert_eq!(transport.calls, vec![TransportCall::RequestWrite]);
    }

    #[test]
    fn test_subscribe_advances_to_publish_qos0() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();

        session.handle(SessionEvent::WriteOpportunity, &mut transport, &signal);

        assert_eq!(session.state(), SessionState::PublishQos0);
        assert_eq!(transport.subscribe_count(), 1);
    }

    #[test]
    fn test_qos0_position_sequence() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();
        drive_to(&mut session, SessionState::PublishQos0, &mut transport, &signal);

        let mut positions = vec![session.position()];
        while session.state() == SessionState::PublishQos0 {
            session.handle(SessionEvent::WriteOpportunity, &mut transport, &signal);
            positions.push(session.position());
        }

        assert_eq!(positions, vec![0, 300, 600, 900, 1200, 0]);
        assert_eq!(session.state(), SessionState::WaitAck0);
    }

    #[test]
    fn test_resend_outside_wait_ack1_is_ignored() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();
        drive_to(&mut session, SessionState::WaitAck0, &mut transport, &signal);

        session.handle(SessionEvent::ResendRequested(1), &mut transport, &signal);

        assert_eq!(session.state(), SessionState::WaitAck0);
        assert_eq!(session.retry_count(), 0);
        assert!(!signal.is_interrupted());
    }

    #[test]
    fn test_retry_count_reset_on_forward_entry_only() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();
        drive_to(&mut session, SessionState::WaitAck1, &mut transport, &signal);

        session.handle(SessionEvent::ResendRequested(7), &mut transport, &signal);
        assert_eq!(session.state(), SessionState::PublishQos1);
        assert_eq!(session.retry_count(), 1);

        // Re-publishing after the backward step keeps the count
        drive_to(&mut session, SessionState::WaitAck1, &mut transport, &signal);
        session.handle(SessionEvent::ResendRequested(8), &mut transport, &signal);
        assert_eq!(session.retry_count(), 2);
    }

    #[test]
    fn test_message_received_is_read_only() {
        let inspector = RecordingInspector::default();
        let seen = inspector.seen.clone();
        let mut session = Session::new(Arc::new(Workflow::default()), Box::new(inspector));
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();
        drive_to(&mut session, SessionState::WaitAck1, &mut transport, &signal);
        let calls_before = transport.calls.len();

        session.handle(
            SessionEvent::MessageReceived {
                topic: "test/topic1".to_string(),
                payload: Bytes::from_static(b"hello"),
            },
            &mut transport,
            &signal,
        );

        assert_eq!(session.state(), SessionState::WaitAck1);
        assert_eq!(transport.calls.len(), calls_before);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "test/topic1");
        assert_eq!(seen[0].1, b"hello".to_vec());
    }

    #[test]
    fn test_connection_closed_after_finish_keeps_success() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();
        drive_to(&mut session, SessionState::Finish, &mut transport, &signal);

        session.handle(SessionEvent::ConnectionClosed, &mut transport, &signal);

        assert!(!session.is_aborted());
        assert_eq!(signal.outcome(), crate::lifecycle::Outcome::Success);
    }

    #[test]
    fn test_ack_outside_wait_state_is_ignored() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();

        session.handle(SessionEvent::Acknowledged, &mut transport, &signal);
        assert_eq!(session.state(), SessionState::Subscribe);

        drive_to(&mut session, SessionState::PublishQos0, &mut transport, &signal);
        session.handle(SessionEvent::Acknowledged, &mut transport, &signal);
        assert_eq!(session.state(), SessionState::PublishQos0);
        assert_eq!(transport.publish_count(), 0);
    }

    #[test]
    fn test_interrupted_signal_blocks_new_work() {
        let mut session = new_session();
        let mut transport = MockTransport::new();
        let signal = RunSignal::new();
        signal.interrupt();

        session.handle(SessionEvent::WriteOpportunity, &mut transport, &signal);

        assert_eq!(session.state(), SessionState::Subscribe);
        assert_eq!(transport.subscribe_count(), 0);
    }
}
