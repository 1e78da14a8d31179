//! Mock implementations for testing
//!
//! Provides a recording [`MockTransport`] and [`RecordingInspector`] so the
//! session can be driven event by event without a broker.

use crate::observability::MessageInspector;
use crate::transport::{PublishIntent, SessionTransport, SubscribeIntent, TopicQos};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Every call the session made on the transport, in order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Subscribe(Vec<TopicQos>),
    Publish { intent: PublishIntent, chunk: Vec<u8> },
    RequestWrite,
    Cancel,
}

#[derive(Debug, Error)]
#[error("Mock transport rejected {0}")]
pub struct MockTransportError(pub &'static str);

/// Mock transport for testing
#[derive(Debug, Default)]
pub struct MockTransport {
    pub calls: Vec<TransportCall>,
    pub fail_subscribe: bool,
    /// Reject the publish write with this zero-based index
    pub fail_publish_at: Option<usize>,
    publish_attempts: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribe_failure() -> Self {
        Self {
            fail_subscribe: true,
            ..Default::default()
        }
    }

    pub fn with_publish_failure_at(index: usize) -> Self {
        Self {
            fail_publish_at: Some(index),
            ..Default::default()
        }
    }

    pub fn subscribe_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, TransportCall::Subscribe(_)))
            .count()
    }

    /// Successful publish writes as (intent, chunk) pairs
    pub fn publishes(&self) -> Vec<(PublishIntent, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                TransportCall::Publish { intent, chunk } => Some((intent.clone(), chunk.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.publishes().len()
    }

    pub fn was_cancelled(&self) -> bool {
        self.calls.contains(&TransportCall::Cancel)
    }

    pub fn clear_history(&mut self) {
        self.calls.clear();
    }
}

impl SessionTransport for MockTransport {
    type Error = MockTransportError;

    fn send_subscribe(&mut self, intent: &SubscribeIntent) -> Result<(), Self::Error> {
        if self.fail_subscribe {
            return Err(MockTransportError("subscribe"));
        }
        self.calls
            .push(TransportCall::Subscribe(intent.topics().to_vec()));
        Ok(())
    }

    fn send_publish(&mut self, intent: &PublishIntent, chunk: &[u8]) -> Result<(), Self::Error> {
        let attempt = self.publish_attempts;
        self.publish_attempts += 1;
        if self.fail_publish_at == Some(attempt) {
            return Err(MockTransportError("publish"));
        }
        self.calls.push(TransportCall::Publish {
            intent: intent.clone(),
            chunk: chunk.to_vec(),
        });
        Ok(())
    }

    fn request_write_opportunity(&mut self) {
        self.calls.push(TransportCall::RequestWrite);
    }

    fn cancel_service(&mut self) {
        self.calls.push(TransportCall::Cancel);
    }
}

pub type InspectedMessage = (String, Vec<u8>);

/// Inspector that keeps every message it is shown
#[derive(Debug, Default, Clone)]
pub struct RecordingInspector {
    pub seen: Arc<Mutex<Vec<InspectedMessage>>>,
}

impl MessageInspector for RecordingInspector {
    fn inspect(&mut self, topic: &str, payload: &[u8]) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((topic.to_string(), payload.to_vec()));
        }
    }
}
