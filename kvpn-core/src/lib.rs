//! Core library for the kvpn CLI tool
//!
//! This crate provides the connection monitor for the Kerio VPN client
//! service, the codec for its on-disk configuration record, and the
//! process/file collaborators both depend on.

pub mod error;

pub mod config;
pub mod vpn;

use anyhow::Context;

/// Environment variable used to override the log level (e.g. `debug`)
pub const LOG_ENV_VAR: &str = "KVPN_LOG";

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging when running as a unit.
/// Otherwise logs to stderr with compact formatting.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer =
                tracing_journald::layer().context("failed to connect to the systemd journal")?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(filter)
                .try_init()
                .context("failed to install journald subscriber")?;
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .context("failed to install stderr subscriber")?;

    Ok(())
}
