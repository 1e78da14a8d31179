//! mqtt-probe entry point

use clap::Parser;
use mqtt_probe::config::ProbeConfig;
use mqtt_probe::lifecycle::{
    ConnectionController, Outcome, RunSignal, SystemState, SystemStateManager,
};
use mqtt_probe::observability::init_default_logging;
use mqtt_probe::ProbeResult;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Configuration file picked up when `-c` is not given
const DEFAULT_CONFIG_FILE: &str = "mqtt-probe.toml";

/// Deterministic MQTT client workflow probe
#[derive(Parser)]
#[command(name = "mqtt-probe")]
#[command(about = "Subscribe, publish at QoS0 and QoS1, and report whether the broker kept up")]
#[command(version)]
struct Cli {
    /// Connect using TLS (port 8883 unless the broker URL names one)
    ///
    /// The broker certificate is checked against the system roots. A broker
    /// with a self-signed certificate needs `broker.ca_file` set to that
    /// certificate (or the CA that issued it) in the configuration file.
    #[arg(short = 's', long = "tls")]
    tls: bool,

    /// Verbose logging, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "MQTT_PROBE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    info!("mqtt-probe v{}", env!("CARGO_PKG_VERSION"));

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            info!("Completed: failed");
            1
        }
    };

    process::exit(code);
}

async fn run(cli: &Cli) -> ProbeResult<i32> {
    let config = load_configuration(cli.config.as_deref())?;
    let workflow = config.workflow()?;
    let signal = Arc::new(RunSignal::new());

    let interrupter = signal.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted");
            interrupter.fail("interrupted");
        }
    });

    let mut controller =
        ConnectionController::new(config, workflow, signal.clone()).with_tls(cli.tls);

    let mut system = SystemStateManager::new();
    system.advance_to(SystemState::Operational, &mut controller);

    let outcome = controller.run().await;
    match (outcome, signal.status().reason) {
        (Outcome::Success, _) => info!("Completed: OK"),
        (Outcome::Failure, Some(reason)) => info!("Completed: failed ({})", reason),
        (Outcome::Failure, None) => info!("Completed: failed"),
    }

    Ok(outcome.exit_code())
}

fn load_configuration(config_path: Option<&Path>) -> ProbeResult<ProbeConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ProbeConfig::load_from_file(path)?)
        }
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                info!("Loading configuration from: {}", path.display());
                Ok(ProbeConfig::load_from_file(path)?)
            } else {
                info!("No configuration file, using built-in defaults");
                Ok(ProbeConfig::default())
            }
        }
    }
}
