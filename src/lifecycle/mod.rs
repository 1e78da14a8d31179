//! Process lifecycle: readiness, the connection controller and the run signal

pub mod controller;
pub mod run_signal;
pub mod system_state;

pub use controller::ConnectionController;
pub use run_signal::{Outcome, RunSignal, RunStatus};
pub use system_state::{StateNotifier, SystemState, SystemStateManager};
