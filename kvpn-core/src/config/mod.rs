//! Configuration module
//!
//! Two sources live here: the Kerio client's own connection record
//! (`/etc/kerio-kvc.conf`, see [`kerio_xml`]) and the monitor settings
//! read from the user's TOML file (see [`toml_config`]).

use secrecy::{ExposeSecret, Secret};

pub mod kerio_xml;
pub mod obfuscation;
pub mod store;
pub mod toml_config;

pub use kerio_xml::ConfigCodec;
pub use store::{FileStore, SudoFileStore};
pub use toml_config::{MonitorSettings, ServiceSettings, Settings};

/// Port used by the Kerio client when the record does not name one
pub const DEFAULT_PORT: u16 = 4090;

/// The single persistent connection record of the Kerio VPN client
///
/// The password is held in plaintext (wrapped so it never reaches logs);
/// obfuscation only happens when the record is rendered for disk.
#[derive(Debug, Clone)]
pub struct VpnConfig {
    /// VPN server hostname or IP address
    pub server: String,

    /// VPN server port (1-65535)
    pub port: u16,

    /// Username for VPN authentication
    pub username: String,

    /// Plaintext password
    pub password: Secret<String>,

    /// Server certificate fingerprint the client pins
    pub fingerprint: String,

    /// Whether the client should bring the connection up
    pub active: bool,
}

impl VpnConfig {
    /// Create an inactive record with default port and no fingerprint
    pub fn new(server: String, username: String, password: String) -> Self {
        Self {
            server,
            username,
            password: Secret::new(password),
            ..Self::default()
        }
    }

    /// Plaintext password
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Validate the record before it is written
    pub fn validate(&self) -> Result<(), String> {
        if self.server.trim().is_empty() {
            return Err("Server cannot be empty".to_string());
        }

        if self.server.contains(':') {
            return Err("Server must not contain a port; use the port field".to_string());
        }

        if self.server.contains('<') || self.server.contains('>') {
            return Err("Server contains invalid characters".to_string());
        }

        if self.port == 0 {
            return Err("Port cannot be zero".to_string());
        }

        if self.fingerprint.contains('<') || self.fingerprint.contains('>') {
            return Err("Fingerprint contains invalid characters".to_string());
        }

        Ok(())
    }
}

impl Default for VpnConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: Secret::new(String::new()),
            fingerprint: String::new(),
            active: false,
        }
    }
}

impl PartialEq for VpnConfig {
    fn eq(&self, other: &Self) -> bool {
        self.server == other.server
            && self.port == other.port
            && self.username == other.username
            && self.password() == other.password()
            && self.fingerprint == other.fingerprint
            && self.active == other.active
    }
}

impl Eq for VpnConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record() {
        let config = VpnConfig::default();
        assert_eq!(config.port, 4090);
        assert!(config.server.is_empty());
        assert!(config.fingerprint.is_empty());
        assert!(!config.active);
    }

    #[test]
    fn test_debug_does_not_leak_password() {
        let config = VpnConfig::new(
            "vpn.example.com".to_string(),
            "alice".to_string(),
            "hunter2".to_string(),
        );
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_validate() {
        let mut config = VpnConfig::new(
            "vpn.example.com".to_string(),
            "alice".to_string(),
            "pw".to_string(),
        );
        assert!(config.validate().is_ok());

        config.port = 0;
        assert_eq!(config.validate().unwrap_err(), "Port cannot be zero");

        config.port = 4090;
        config.server = "vpn.example.com:4090".to_string();
        assert!(config.validate().is_err());

        config.server = "  ".to_string();
        assert_eq!(config.validate().unwrap_err(), "Server cannot be empty");
    }

    #[test]
    fn test_equality_compares_password() {
        let a = VpnConfig::new("s".to_string(), "u".to_string(), "one".to_string());
        let mut b = a.clone();
        assert_eq!(a, b);
        b.password = Secret::new("two".to_string());
        assert_ne!(a, b);
    }
}
