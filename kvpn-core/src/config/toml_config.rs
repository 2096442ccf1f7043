//! TOML settings file I/O
//!
//! Handles loading and saving the monitor settings (poll interval,
//! auto-reconnect, service names and paths) from the user's
//! configuration directory. A missing file means defaults.

use crate::error::{ConfigError, KvpnError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Polling and reconnection behaviour
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Names and paths of the VPN client installation
    #[serde(default)]
    pub service: ServiceSettings,
}

/// Externally configured inputs of the connection monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Seconds between status polls
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Reconnect when a connected tunnel drops
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Connect when the monitor starts
    #[serde(default)]
    pub auto_connect: bool,

    /// Report IP, server and duration while connected
    #[serde(default = "default_true")]
    pub show_connection_info: bool,

    /// Reconnect attempts before a drop is left to the user
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Seconds to wait after starting the service before re-checking status
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Seconds between detecting a drop and the reconnect attempt
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_check_interval() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_max_reconnect_attempts() -> u32 {
    3
}
fn default_settle_delay() -> u64 {
    2
}
fn default_reconnect_delay() -> u64 {
    2
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            auto_reconnect: true,
            auto_connect: false,
            show_connection_info: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            settle_delay_secs: default_settle_delay(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl MonitorSettings {
    /// Validate every field, returning the first violation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(3..=60).contains(&self.check_interval_secs) {
            return Err(invalid(format!(
                "check_interval_secs must be between 3 and 60, got: {}",
                self.check_interval_secs
            )));
        }
        if !(1..=10).contains(&self.max_reconnect_attempts) {
            return Err(invalid(format!(
                "max_reconnect_attempts must be between 1 and 10, got: {}",
                self.max_reconnect_attempts
            )));
        }
        if self.settle_delay_secs > 60 {
            return Err(invalid(format!(
                "settle_delay_secs must be at most 60, got: {}",
                self.settle_delay_secs
            )));
        }
        if self.reconnect_delay_secs > 60 {
            return Err(invalid(format!(
                "reconnect_delay_secs must be at most 60, got: {}",
                self.reconnect_delay_secs
            )));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Kerio VPN client installation details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// systemd unit of the VPN client
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Virtual network interface the client creates
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Client connection record
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Where the record is staged before being moved into place
    #[serde(default = "default_temp_path")]
    pub temp_path: PathBuf,

    /// Upper bound for any external command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Prefix privileged commands with sudo (ignored when running as root)
    #[serde(default = "default_true")]
    pub use_sudo: bool,
}

fn default_unit() -> String {
    "kerio-kvc.service".to_string()
}
fn default_interface() -> String {
    "kvnet".to_string()
}
fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/kerio-kvc.conf")
}
fn default_temp_path() -> PathBuf {
    PathBuf::from("/tmp/kerio-kvc.conf.tmp")
}
fn default_command_timeout() -> u64 {
    30
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            interface: default_interface(),
            config_path: default_config_path(),
            temp_path: default_temp_path(),
            command_timeout_secs: default_command_timeout(),
            use_sudo: true,
        }
    }
}

impl ServiceSettings {
    /// Validate every field, returning the first violation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.unit.trim().is_empty() {
            return Err(invalid("unit cannot be empty".to_string()));
        }
        if self.interface.trim().is_empty() {
            return Err(invalid("interface cannot be empty".to_string()));
        }
        if !(1..=600).contains(&self.command_timeout_secs) {
            return Err(invalid(format!(
                "command_timeout_secs must be between 1 and 600, got: {}",
                self.command_timeout_secs
            )));
        }
        if self.config_path == self.temp_path {
            return Err(invalid(
                "temp_path must differ from config_path".to_string(),
            ));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Settings {
    /// Validate both sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.monitor.validate()?;
        self.service.validate()
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, KvpnError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            KvpnError::Config(ConfigError::IoError {
                message: format!("Failed to read settings file: {}", e),
            })
        })?;

        let settings: Settings = toml::from_str(&contents)?;

        settings.validate().map_err(|e| {
            warn!("Settings validation failed: {}", e);
            KvpnError::Config(e)
        })?;

        info!(
            check_interval_secs = settings.monitor.check_interval_secs,
            auto_reconnect = settings.monitor.auto_reconnect,
            max_reconnect_attempts = settings.monitor.max_reconnect_attempts,
            unit = %settings.service.unit,
            interface = %settings.service.interface,
            "Loaded settings from {:?}",
            path
        );

        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), KvpnError> {
        self.validate()?;

        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                KvpnError::Config(ConfigError::IoError {
                    message: format!("Failed to create settings directory: {}", e),
                })
            })?;
        }

        std::fs::write(path, contents).map_err(|e| {
            KvpnError::Config(ConfigError::SaveFailed {
                path: path.to_string_lossy().to_string(),
                reason: e.to_string(),
            })
        })?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError { message }
}

/// Default settings file name
const SETTINGS_FILE_NAME: &str = "config.toml";

/// Get the settings directory
///
/// Returns ~/.config/kvpn, or KVPN_CONFIG_DIR if set. Under sudo the
/// invoking user's home is used so elevated runs see the same settings.
pub fn get_config_dir() -> Result<PathBuf, KvpnError> {
    if let Ok(config_dir) = std::env::var("KVPN_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }

    let home = if let Ok(sudo_user) = std::env::var("SUDO_USER") {
        std::env::var("SUDO_HOME").unwrap_or_else(|_| format!("/home/{}", sudo_user))
    } else {
        std::env::var("HOME").map_err(|_| {
            KvpnError::Config(ConfigError::IoError {
                message: "HOME environment variable not set".to_string(),
            })
        })?
    };

    Ok(PathBuf::from(home).join(".config").join("kvpn"))
}

/// Get the default settings file path
pub fn get_config_path() -> Result<PathBuf, KvpnError> {
    Ok(get_config_dir()?.join(SETTINGS_FILE_NAME))
}

/// Load settings from the default location, falling back to defaults when
/// the file does not exist
pub fn load_settings() -> Result<Settings, KvpnError> {
    load_settings_from_path(get_config_path()?)
}

/// Load settings from a specific file, falling back to defaults when it
/// does not exist
pub fn load_settings_from_path<P: AsRef<Path>>(path: P) -> Result<Settings, KvpnError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No settings file at {:?}, using defaults", path);
        return Ok(Settings::default());
    }
    Settings::from_file(path)
}
