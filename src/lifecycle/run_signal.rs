//! Shared run/interrupt signal between the session and the host run loop
//!
//! Any component may interrupt. Only a finished session records success;
//! the outcome starts out as failure so that every early stop is reported
//! as one.

use tokio::sync::watch;
use tracing::debug;

/// Final result of a probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    Success,
    #[default]
    Failure,
}

impl Outcome {
    /// Process exit status for this outcome
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Failure => 1,
        }
    }
}

/// Snapshot of the run signal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub interrupted: bool,
    pub outcome: Outcome,
    /// First failure reason recorded, if any
    pub reason: Option<String>,
}

/// Process-wide `(interrupted, outcome)` pair, shared by reference
#[derive(Debug)]
pub struct RunSignal {
    tx: watch::Sender<RunStatus>,
}

impl Default for RunSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunStatus::default());
        Self { tx }
    }

    /// Record success and stop the run loop
    pub fn complete(&self) {
        self.tx.send_modify(|status| {
            status.outcome = Outcome::Success;
            status.interrupted = true;
        });
        debug!("Run signal: completed");
    }

    /// Stop the run loop with a failure reason, unless already successful
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_modify(|status| {
            if status.outcome == Outcome::Failure && status.reason.is_none() {
                status.reason = Some(reason.clone());
            }
            status.interrupted = true;
        });
        debug!("Run signal: failed ({})", reason);
    }

    /// Stop the run loop without touching the outcome
    pub fn interrupt(&self) {
        self.tx.send_modify(|status| status.interrupted = true);
    }

    pub fn is_interrupted(&self) -> bool {
        self.tx.borrow().interrupted
    }

    pub fn outcome(&self) -> Outcome {
        self.tx.borrow().outcome
    }

    pub fn status(&self) -> RunStatus {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every change, for `select!` in the run loop
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.tx.subscribe()
    }
}
