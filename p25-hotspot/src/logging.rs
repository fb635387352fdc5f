//! Tracing subscriber setup

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{parse_level, LoggingConfig};

/// Crates whose events pass the default filter
const CRATES: [&str; 4] = ["p25_hotspot", "p25_protocol", "p25_link", "p25_trunk"];

/// Default filter directive for a level name
fn default_directive(level: &str) -> anyhow::Result<String> {
    let level = parse_level(level)?.to_string().to_ascii_lowercase();
    Ok(CRATES
        .iter()
        .map(|krate| format!("{}={}", krate, level))
        .collect::<Vec<_>>()
        .join(","))
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over both the configured level and `level_override`.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> anyhow::Result<()> {
    let level = level_override.unwrap_or(&config.level);
    let directive = default_directive(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let console = config.console.then(fmt::layer);

    let file = if config.file.is_empty() {
        None
    } else {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file)
            .with_context(|| format!("cannot open log file {}", config.file))?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("logging already initialised")?;
    Ok(())
}
