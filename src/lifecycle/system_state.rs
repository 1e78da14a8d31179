//! Host startup phases and readiness notification
//!
//! The host walks through its startup phases in order. Each step is reported
//! to a [`StateNotifier`] as `(current, target)`; the probe only acts once
//! both are [`SystemState::Operational`].

use std::fmt;
use tracing::debug;

/// Startup phases of the host, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SystemState {
    ContextCreated,
    Initialized,
    Network,
    TimeValid,
    PolicyValid,
    Operational,
}

impl SystemState {
    /// Next phase, `None` once operational
    pub fn next(self) -> Option<SystemState> {
        match self {
            SystemState::ContextCreated => Some(SystemState::Initialized),
            SystemState::Initialized => Some(SystemState::Network),
            SystemState::Network => Some(SystemState::TimeValid),
            SystemState::TimeValid => Some(SystemState::PolicyValid),
            SystemState::PolicyValid => Some(SystemState::Operational),
            SystemState::Operational => None,
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SystemState::ContextCreated => "CONTEXT_CREATED",
            SystemState::Initialized => "INITIALIZED",
            SystemState::Network => "NETWORK",
            SystemState::TimeValid => "TIME_VALID",
            SystemState::PolicyValid => "POLICY_VALID",
            SystemState::Operational => "OPERATIONAL",
        };
        f.write_str(name)
    }
}

/// Receives every phase change on the way to a target phase
pub trait StateNotifier {
    fn on_state_change(&mut self, current: SystemState, target: SystemState);
}

/// Tracks the host phase and notifies as it advances
#[derive(Debug, Clone)]
pub struct SystemStateManager {
    current: SystemState,
}

impl Default for SystemStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemStateManager {
    pub fn new() -> Self {
        Self {
            current: SystemState::ContextCreated,
        }
    }

    pub fn current(&self) -> SystemState {
        self.current
    }

    /// Step through every phase up to `target`, notifying at each one
    ///
    /// A target at or behind the current phase notifies once with the
    /// current phase and does not move backwards.
    pub fn advance_to<N>(&mut self, target: SystemState, notifier: &mut N)
    where
        N: StateNotifier + ?Sized,
    {
        loop {
            debug!("System state {} (target {})", self.current, target);
            notifier.on_state_change(self.current, target);

            if self.current >= target {
                break;
            }
            match self.current.next() {
                Some(next) => self.current = next,
                None => break,
            }
        }
    }
}
