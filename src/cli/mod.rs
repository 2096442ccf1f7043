//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands.

pub mod config;
pub mod vpn;

use kvpn_core::config::toml_config::{get_config_path, load_settings};
use kvpn_core::config::{ConfigCodec, Settings, SudoFileStore};
use kvpn_core::error::KvpnError;
use kvpn_core::vpn::{ConnectionMonitor, SystemctlProbe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Monitor wired to the real service
pub type ServiceMonitor = ConnectionMonitor<SystemctlProbe, SudoFileStore>;

/// Load the user settings, warning about missing system tools
fn load_checked_settings() -> Result<Settings, KvpnError> {
    let settings = load_settings()?;
    debug!(path = ?get_config_path().ok(), "Loaded settings");

    let missing = SystemctlProbe::missing_tools();
    if !missing.is_empty() {
        warn!(tools = ?missing, "Required tools not found in PATH");
    }

    Ok(settings)
}

/// Build the codec for the Kerio record and the probe it restarts through
fn build_codec(settings: &Settings) -> (Arc<SystemctlProbe>, ConfigCodec<SudoFileStore, SystemctlProbe>) {
    let probe = Arc::new(SystemctlProbe::from_settings(&settings.service));
    let store = SudoFileStore::from_settings(&settings.service);
    let codec = ConfigCodec::from_settings(store, Arc::clone(&probe), &settings.service);
    (probe, codec)
}

/// Build a connection monitor from the user settings
fn build_monitor(settings: Settings) -> ServiceMonitor {
    let (probe, codec) = build_codec(&settings);
    ConnectionMonitor::new(probe, codec, settings.monitor)
}
