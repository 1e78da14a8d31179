//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for driving the probe session
//! without an MQTT broker.

pub mod mocks;

pub use mocks::*;
