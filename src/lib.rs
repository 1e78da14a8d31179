//! mqtt-probe
//!
//! A deterministic MQTT client workflow: subscribe to the test topics,
//! publish a fixed payload at QoS0, wait for its acknowledgment, publish it
//! again at QoS1, wait for the PUBACK, then disconnect. The process exit code
//! reports whether every step succeeded.
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_probe::session::PayloadChunker;
//!
//! let chunker = PayloadChunker::with_default_payload();
//! assert_eq!(chunker.chunk_lengths(), vec![300, 300, 300, 300, 137]);
//! ```
//!
//! The session itself is transport agnostic; see [`session::Session`] and
//! [`transport::SessionTransport`].

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod session;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ProbeConfig};
pub use error::{ProbeError, ProbeResult};
pub use lifecycle::{ConnectionController, Outcome, RunSignal, SystemState, SystemStateManager};
pub use session::{Session, SessionError, SessionState, Workflow};
pub use transport::{SessionEvent, SessionTransport};
