//! Per-connection session state machine
//!
//! The session drives the fixed probe workflow: subscribe, publish the payload
//! at QoS0, wait for the synthetic ack, publish it again at QoS1, wait for the
//! PUBACK, finish. It is a flat event handler. It never blocks and never owns
//! I/O; everything it sends goes through a [`crate::transport::SessionTransport`].
//!
//! - [`state`] - the states and the transition table
//! - [`chunker`] - pure payload chunking
//! - [`retry`] - bounded resend policy
//! - [`machine`] - the [`Session`] itself

pub mod chunker;
pub mod machine;
pub mod retry;
pub mod state;

pub use chunker::{Chunk, PayloadChunker, DEFAULT_CHUNK_SIZE, DEFAULT_PAYLOAD};
pub use machine::{Session, Workflow, DEFAULT_PUBLISH_TOPIC};
pub use retry::{RetryPolicy, DEFAULT_RETRY_CAP};
pub use state::SessionState;

use thiserror::Error;

/// Conditions that end a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Subscribe rejected by transport")]
    SubscribeRejected(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publish rejected by transport")]
    PublishRejected(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Chunk size must be greater than 0")]
    InvalidChunkSize,
    #[error("Position {position} is out of range for a {payload_len} byte payload")]
    PositionOutOfRange { position: usize, payload_len: usize },
    #[error("Resend limit reached after {attempts} attempts (packet {packet_id})")]
    RetriesExhausted { attempts: u32, packet_id: u16 },
    #[error("Connection error: {0}")]
    ConnectionFailed(String),
    #[error("Connection closed")]
    ConnectionClosed,
}

impl SessionError {
    /// Message including the source error, for the final report
    pub fn report(&self) -> String {
        match std::error::Error::source(self) {
            Some(source) => format!("{self}: {source}"),
            None => self.to_string(),
        }
    }
}
