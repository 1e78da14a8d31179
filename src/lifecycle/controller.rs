//! Connection lifecycle for the probe
//!
//! The controller waits for the host to become operational, creates the one
//! MQTT connection together with its [`Session`], and drives both from a
//! single run loop until the run signal is interrupted.
//!
//! ```rust,no_run
//! use mqtt_probe::config::ProbeConfig;
//! use mqtt_probe::lifecycle::{ConnectionController, RunSignal, SystemState, SystemStateManager};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ProbeConfig::default();
//! let workflow = config.workflow()?;
//! let signal = Arc::new(RunSignal::new());
//!
//! let mut controller = ConnectionController::new(config, workflow, signal);
//! SystemStateManager::new().advance_to(SystemState::Operational, &mut controller);
//! let outcome = controller.run().await;
//! println!("exit code {}", outcome.exit_code());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

use super::run_signal::{Outcome, RunSignal};
use super::system_state::{StateNotifier, SystemState};
use crate::config::ProbeConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::observability::{HexdumpInspector, MessageInspector};
use crate::session::{Session, Workflow};
use crate::transport::mqtt::{
    configure_mqtt_options, BrokerAddress, IdlePolicy, MessageHandler, MqttError,
    MqttSessionTransport,
};
use crate::transport::{SessionEvent, SessionTransport};
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the request channel between client handle and event loop
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Upper bound on flushing the DISCONNECT after the run ends
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);

struct Connection {
    broker: BrokerAddress,
    session: Session,
    transport: MqttSessionTransport,
    event_loop: EventLoop,
}

/// Owns the single connection and its session
pub struct ConnectionController {
    config: ProbeConfig,
    workflow: Arc<Workflow>,
    signal: Arc<RunSignal>,
    force_tls: bool,
    inspector: Option<Box<dyn MessageInspector>>,
    connect_attempted: bool,
    connection: Option<Connection>,
}

impl ConnectionController {
    pub fn new(config: ProbeConfig, workflow: Workflow, signal: Arc<RunSignal>) -> Self {
        Self {
            config,
            workflow: Arc::new(workflow),
            signal,
            force_tls: false,
            inspector: None,
            connect_attempted: false,
            connection: None,
        }
    }

    /// Use TLS even when the broker URL is plain `mqtt://`
    pub fn with_tls(mut self, force_tls: bool) -> Self {
        self.force_tls = force_tls;
        self
    }

    /// Replace the default hexdump inspector
    pub fn with_inspector(mut self, inspector: Box<dyn MessageInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn signal(&self) -> &Arc<RunSignal> {
        &self.signal
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connect_attempted(&self) -> bool {
        self.connect_attempted
    }

    /// Resolved broker endpoint, once connected
    pub fn broker(&self) -> Option<&BrokerAddress> {
        self.connection.as_ref().map(|c| &c.broker)
    }

    /// Connect exactly once, when the host has reached its operational phase
    pub fn on_ready_notification(&mut self, current: SystemState, target: SystemState) {
        if current != SystemState::Operational || target != SystemState::Operational {
            return;
        }
        if self.connect_attempted {
            debug!("Already connected, ignoring readiness notification");
            return;
        }
        // Failure is already on the run signal
        let _ = self.connect();
    }

    /// Create the MQTT connection and its session
    ///
    /// A rejection here fails the run signal immediately; the connection
    /// handshake itself happens in [`Self::run`].
    pub fn connect(&mut self) -> ProbeResult<()> {
        self.connect_attempted = true;

        let password = self.config.get_mqtt_password();
        let (options, broker) = match configure_mqtt_options(&self.config, self.force_tls, password)
        {
            Ok(configured) => configured,
            Err(e) => return Err(self.reject(e)),
        };

        info!(
            "Connecting to {}:{}{} as {}",
            broker.host,
            broker.port,
            if broker.tls { " (TLS)" } else { "" },
            self.config.client.client_id
        );

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let transport =
            MqttSessionTransport::new(client, IdlePolicy::from(&self.config.retry), Instant::now());

        let inspector = self
            .inspector
            .take()
            .unwrap_or_else(|| Box::new(HexdumpInspector));
        let session = Session::new(self.workflow.clone(), inspector);

        self.connection = Some(Connection {
            broker,
            session,
            transport,
            event_loop,
        });
        Ok(())
    }

    fn reject(&self, e: MqttError) -> ProbeError {
        let reason = format!("MQTT client creation failed: {e}");
        error!("{}", reason);
        self.signal.fail(reason);
        ProbeError::Transport(e)
    }

    /// Run until the signal is interrupted or the connection ends
    pub async fn run(&mut self) -> Outcome {
        let signal = self.signal.clone();

        let Some(connection) = self.connection.as_mut() else {
            if !signal.is_interrupted() {
                signal.fail("no connection was established");
            }
            return signal.outcome();
        };

        let span = crate::mqtt_span!(
            broker = %connection.broker.host,
            port = connection.broker.port,
            tls = connection.broker.tls
        );

        async {
            Self::drive(connection, &signal).await;
            Self::shutdown(connection).await;
        }
        .instrument(span)
        .await;

        let status = signal.status();
        match status.outcome {
            Outcome::Success => info!("Run finished"),
            Outcome::Failure => warn!(
                "Run stopped: {}",
                status.reason.as_deref().unwrap_or("interrupted")
            ),
        }
        status.outcome
    }

    async fn drive(connection: &mut Connection, signal: &RunSignal) {
        let Connection {
            session,
            transport,
            event_loop,
            ..
        } = connection;
        let mut status_rx = signal.subscribe();

        loop {
            while !signal.is_interrupted() {
                match transport.take_event(Instant::now()) {
                    Some(event) => session.handle(event, transport, signal),
                    None => break,
                }
            }
            if signal.is_interrupted() {
                break;
            }
            if session.is_terminal() {
                signal.fail("session ended without a result");
                break;
            }

            let deadline = transport.next_deadline();

            tokio::select! {
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                polled = event_loop.poll() => match polled {
                    Ok(event) => {
                        let route = MessageHandler::route_mqtt_event(&event);
                        if let Some(event) = transport.translate(route, Instant::now()) {
                            session.handle(event, transport, signal);
                        }
                    }
                    Err(e) => {
                        let event = SessionEvent::ConnectionError(e.to_string());
                        session.handle(event, transport, signal);
                    }
                },
                _ = sleep_until(deadline) => {
                    if let Some(event) = transport.check_liveness(Instant::now()) {
                        session.handle(event, transport, signal);
                    }
                }
            }
        }
    }

    async fn shutdown(connection: &mut Connection) {
        connection.transport.cancel_service();

        // Poll until the engine reports the connection gone
        let flushed = timeout(DISCONNECT_FLUSH, async {
            while connection.event_loop.poll().await.is_ok() {}
        })
        .await;
        if flushed.is_err() {
            debug!("Disconnect not confirmed within {:?}", DISCONNECT_FLUSH);
        }
    }
}

impl StateNotifier for ConnectionController {
    fn on_state_change(&mut self, current: SystemState, target: SystemState) {
        self.on_ready_notification(current, target);
    }
}
