//! Session states and the transition table
//!
//! Forward steps follow the declaration order. The only backward edge is
//! [`SessionState::resend_target`], taken when a QoS1 publish has to be sent
//! again.

use crate::transport::QosLevel;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Subscribe to the test topics
    Subscribe,
    /// Send the payload at QoS0
    PublishQos0,
    /// Wait for the synthetic QoS0 ack
    WaitAck0,
    /// Send the payload at QoS1
    PublishQos1,
    /// Wait for the PUBACK, or a resend request
    WaitAck1,
    /// Workflow completed
    Finish,
}

impl SessionState {
    pub const INITIAL: SessionState = SessionState::Subscribe;

    /// Next state in the forward sequence, `None` once finished
    pub fn next(self) -> Option<SessionState> {
        match self {
            SessionState::Subscribe => Some(SessionState::PublishQos0),
            SessionState::PublishQos0 => Some(SessionState::WaitAck0),
            SessionState::WaitAck0 => Some(SessionState::PublishQos1),
            SessionState::PublishQos1 => Some(SessionState::WaitAck1),
            SessionState::WaitAck1 => Some(SessionState::Finish),
            SessionState::Finish => None,
        }
    }

    /// Backward edge taken on a resend request
    pub fn resend_target(self) -> Option<SessionState> {
        match self {
            SessionState::WaitAck1 => Some(SessionState::PublishQos1),
            _ => None,
        }
    }

    /// QoS used when this state publishes
    pub fn publish_qos(self) -> Option<QosLevel> {
        match self {
            SessionState::PublishQos0 => Some(QosLevel::AtMostOnce),
            SessionState::PublishQos1 => Some(QosLevel::AtLeastOnce),
            _ => None,
        }
    }

    pub fn is_waiting(self) -> bool {
        matches!(self, SessionState::WaitAck0 | SessionState::WaitAck1)
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Finish
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Subscribe => "SUBSCRIBE",
            SessionState::PublishQos0 => "PUBLISH_QOS0",
            SessionState::WaitAck0 => "WAIT_ACK0",
            SessionState::PublishQos1 => "PUBLISH_QOS1",
            SessionState::WaitAck1 => "WAIT_ACK1",
            SessionState::Finish => "FINISH",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_sequence() {
        let mut state = SessionState::INITIAL;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            assert!(next > state, "forward steps must move forward");
            state = next;
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                SessionState::Subscribe,
                SessionState::PublishQos0,
                SessionState::WaitAck0,
                SessionState::PublishQos1,
                SessionState::WaitAck1,
                SessionState::Finish,
            ]
        );
    }

    #[test]
    fn test_single_backward_edge() {
        let states = [
            SessionState::Subscribe,
            SessionState::PublishQos0,
            SessionState::WaitAck0,
            SessionState::PublishQos1,
            SessionState::WaitAck1,
            SessionState::Finish,
        ];
        let edges: Vec<_> = states
            .iter()
            .filter_map(|s| s.resend_target().map(|t| (*s, t)))
            .collect();
        assert_eq!(
            edges,
            vec![(SessionState::WaitAck1, SessionState::PublishQos1)]
        );
    }

    #[test]
    fn test_publish_qos() {
        assert_eq!(
            SessionState::PublishQos0.publish_qos(),
            Some(QosLevel::AtMostOnce)
        );
        assert_eq!(
            SessionState::PublishQos1.publish_qos(),
            Some(QosLevel::AtLeastOnce)
        );
        assert_eq!(SessionState::WaitAck1.publish_qos(), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(SessionState::WaitAck1.to_string(), "WAIT_ACK1");
        assert_eq!(SessionState::Finish.to_string(), "FINISH");
    }
}
