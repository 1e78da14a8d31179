//! Pure liveness tracking for the MQTT connection
//!
//! Two timers, both measured from explicit instants so they can be tested
//! without sleeping:
//!
//! - the ack timer, armed when a QoS1 message is handed to the engine; when
//!   it runs out the publish is due for a resend
//! - the idle timer, reset on every incoming packet; when it runs out the
//!   connection is considered dead
//!
//! Liveness pings are the engine's keep-alive. [`IdlePolicy::keep_alive`]
//! caps it at `secs_since_valid_ping`, so a quiet but healthy connection
//! sees a PINGRESP before the idle timer can run out.

use crate::config::RetrySection;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Retry and idle timing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdlePolicy {
    /// Seconds without a PUBACK before a resend is requested, and the
    /// longest the connection stays quiet before a PINGREQ goes out
    pub secs_since_valid_ping: u64,
    /// Seconds without any traffic before hanging up
    pub secs_since_valid_hangup: u64,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            secs_since_valid_ping: 20,
            secs_since_valid_hangup: 25,
        }
    }
}

impl From<&RetrySection> for IdlePolicy {
    fn from(retry: &RetrySection) -> Self {
        Self {
            secs_since_valid_ping: retry.secs_since_valid_ping,
            secs_since_valid_hangup: retry.secs_since_valid_hangup,
        }
    }
}

impl IdlePolicy {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.secs_since_valid_ping)
    }

    pub fn hangup_timeout(&self) -> Duration {
        Duration::from_secs(self.secs_since_valid_hangup)
    }

    /// Keep-alive to hand the engine, given the configured one (0 = unset)
    pub fn keep_alive(&self, configured_secs: u64) -> Duration {
        match configured_secs {
            0 => self.ack_timeout(),
            secs => Duration::from_secs(secs.min(self.secs_since_valid_ping)),
        }
    }
}

/// What the connection needs at a given instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessDecision {
    Healthy,
    /// The QoS1 publish `publish_id` was not acknowledged in time
    ResendDue { publish_id: u16 },
    /// No traffic at all for `idle`
    Hangup { idle: Duration },
}

#[derive(Debug, Clone, Copy)]
struct AckTimer {
    deadline: Instant,
    publish_id: u16,
}

/// Tracks traffic and the pending acknowledgment
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    policy: IdlePolicy,
    last_traffic: Instant,
    ack_timer: Option<AckTimer>,
}

impl LivenessMonitor {
    pub fn new(policy: IdlePolicy, now: Instant) -> Self {
        Self {
            policy,
            last_traffic: now,
            ack_timer: None,
        }
    }

    pub fn record_traffic(&mut self, now: Instant) {
        self.last_traffic = now;
    }

    /// Start waiting for the acknowledgment of `publish_id`
    pub fn arm_ack_timer(&mut self, now: Instant, publish_id: u16) {
        debug!(
            "Waiting up to {}s for ack of publish {}",
            self.policy.secs_since_valid_ping, publish_id
        );
        self.ack_timer = Some(AckTimer {
            deadline: now + self.policy.ack_timeout(),
            publish_id,
        });
    }

    pub fn disarm_ack_timer(&mut self) {
        self.ack_timer = None;
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.ack_timer.is_some()
    }

    /// Earliest instant at which [`Self::check`] can change its answer
    pub fn next_deadline(&self) -> Instant {
        let hangup = self.last_traffic + self.policy.hangup_timeout();
        match self.ack_timer {
            Some(timer) if timer.deadline < hangup => timer.deadline,
            _ => hangup,
        }
    }

    /// Decide whether a timer has run out; a reported resend disarms the ack timer
    pub fn check(&mut self, now: Instant) -> LivenessDecision {
        let idle = now.saturating_duration_since(self.last_traffic);
        if idle >= self.policy.hangup_timeout() {
            warn!("No valid traffic for {}s, hanging up", idle.as_secs());
            return LivenessDecision::Hangup { idle };
        }

        match self.ack_timer {
            Some(timer) if now >= timer.deadline => {
                self.ack_timer = None;
                LivenessDecision::ResendDue {
                    publish_id: timer.publish_id,
                }
            }
            _ => LivenessDecision::Healthy,
        }
    }
}
