//! Bounded resend policy for QoS1 publishes

/// Resend attempts allowed before the session is permanently failed
pub const DEFAULT_RETRY_CAP: u32 = 3;

/// Decides whether another resend attempt is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    cap: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            cap: DEFAULT_RETRY_CAP,
        }
    }
}

impl RetryPolicy {
    pub fn new(cap: u32) -> Self {
        Self { cap }
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    /// True while `retry_count` is below the cap (pure function)
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.cap
    }
}
