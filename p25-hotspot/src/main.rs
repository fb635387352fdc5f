//! P25 hotspot gateway
//!
//! Bridges a locally attached MMDVM modem to a P25 network reflector.
//! Startup failures exit with status 1; a termination signal shuts the
//! links down in order and exits 0; losing either link exits 1 so a
//! supervisor can restart the process.

mod config;
mod error;
mod hotspot;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use p25_link::{events, EventReceiver};
use tracing::{debug, error, info, warn};

use config::{Config, DEFAULT_CONFIG_PATH};
use hotspot::Hotspot;

/// P25 hotspot gateway
#[derive(Parser, Debug)]
#[command(name = "p25-hotspot")]
#[command(about = "Bridge an MMDVM modem to a P25 network reflector")]
#[command(version)]
struct Args {
    /// Configuration file (YAML, or JSON with a .json extension)
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level, overriding the configuration (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

/// Why the supervision loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Signal,
    LinkLost,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("p25-hotspot: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging, args.log_level.as_deref()) {
        eprintln!("p25-hotspot: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&config) {
        Ok(Exit::Signal) => ExitCode::SUCCESS,
        Ok(Exit::LinkLost) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> anyhow::Result<Exit> {
    config.validate()?;
    info!(
        "P25 hotspot v{} (radio {} as {})",
        env!("CARGO_PKG_VERSION"),
        config.reflector.radio_id,
        config.reflector.callsign
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (tx, rx) = events::channel();
    let hotspot = Hotspot::start(config, tx)?;

    let exit = runtime.block_on(supervise(&hotspot, rx));
    hotspot.shutdown();
    Ok(exit)
}

async fn supervise(hotspot: &Hotspot, mut events: EventReceiver) -> Exit {
    let mut health = tokio::time::interval(Duration::from_secs(1));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Termination signal received");
                return Exit::Signal;
            }
            Some(event) = events.recv() => {
                if event.is_link_lost() {
                    error!("{:?}", event);
                    return Exit::LinkLost;
                }
                debug!("{:?}", event);
            }
            _ = health.tick() => {
                if !hotspot.is_healthy() {
                    warn!("Link health check failed");
                    return Exit::LinkLost;
                }
            }
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default_config_path() {
        let args = Args::try_parse_from(["p25-hotspot"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/p25-hotspot.yaml"));
        assert!(args.log_level.is_none());

        let args =
            Args::try_parse_from(["p25-hotspot", "hotspot.json", "--log-level", "debug"]).unwrap();
        assert_eq!(args.config, PathBuf::from("hotspot.json"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        assert!(run(&Config::default()).is_err());
    }
}
