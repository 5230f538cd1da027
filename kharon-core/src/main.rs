//! `kharond`: the supervisor binary tying every pipeline stage together
//! (spec §6 CLI, §7 process model).

mod camera_net;
mod config;
mod error;
mod logging;
mod run_state;
mod sim;
mod supervisor;
mod terrain_map;

use anyhow::Context;
use clap::Parser;
use kharon_types::{MasterClock, Timestamp};
use run_state::ShutdownFlag;
use std::path::PathBuf;
use std::sync::Arc;

/// Kharon navigation core: fuses redundant IMUs into a stabilized heading,
/// stitches camera frames into a 360 degree panorama, plans a terrain- and
/// traffic-aware route, and drives the tiller autopilot.
#[derive(Parser, Debug)]
#[command(name = "kharond", version, about)]
struct Cli {
    /// Path to the TOML config file. Defaults to `$KHARON_CONFIG` or
    /// `/pinet/dev/<hostname>/kharon.toml` (spec §6).
    #[arg(short = 'f', long = "config")]
    config: Option<PathBuf>,

    /// Start the master clock at this many seconds past the epoch instead
    /// of system startup (spec §6 `-t`), useful for reproducing a run
    /// against a recorded log.
    #[arg(short = 't', long = "start-time")]
    start_time: Option<f64>,

    /// Inhibit the camera network listener entirely (spec §6 `-x`).
    #[arg(short = 'x', long = "inhibit-network")]
    inhibit_network: bool,

    /// Use the immediate (unbuffered, flush-per-line) stderr writer
    /// instead of the default buffered one (spec §6 `-l`).
    #[arg(short = 'l', long = "immediate-log")]
    immediate_log: bool,

    /// Additionally tee every log event to this file.
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(cli.immediate_log, cli.log_file.as_deref()).context("initializing logging")?;

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    let clock = match cli.start_time {
        Some(seconds) => Arc::new(MasterClock::starting_at(Timestamp::from_seconds(seconds))),
        None => Arc::new(MasterClock::new()),
    };

    let shutdown = ShutdownFlag::new();
    {
        let shutdown = shutdown.clone();
        ctrlc_handler(move || shutdown.signal());
    }

    tracing::info!(config = %config_path.display(), "kharond starting up");
    supervisor::run(config, clock, shutdown, cli.inhibit_network)?;
    tracing::info!("kharond shut down cleanly");
    Ok(())
}

/// Best-effort `SIGINT`/`SIGTERM` handling: if the platform signal hook
/// can't be installed, the process still runs, just without a clean
/// shutdown path on Ctrl-C (it can still be killed outright).
fn ctrlc_handler(on_signal: impl Fn() + Send + 'static) {
    if let Err(e) = ctrlc::set_handler(on_signal) {
        tracing::warn!("failed to install signal handler: {e}");
    }
}
