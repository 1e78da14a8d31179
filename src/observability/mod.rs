//! Observability for the probe
//!
//! Structured logging setup and the inspector that surfaces received messages.

pub mod inspect;
pub mod logging;

pub use inspect::{hexdump_lines, HexdumpInspector, MessageInspector};
pub use logging::{init_default_logging, init_logging, LogFormat, LogSettings};

pub use logging::mqtt_span;
