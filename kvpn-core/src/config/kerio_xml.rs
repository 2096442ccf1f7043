//! Kerio VPN client connection record codec
//!
//! The client keeps a single persistent connection in `/etc/kerio-kvc.conf`:
//!
//! ```text
//! <config>
//!   <connections>
//!     <connection type="persistent">
//!       <server>HOST:PORT</server>
//!       <username>USER</username>
//!       <password>OBFUSCATED</password>
//!       <fingerprint>FP</fingerprint>
//!       <active>0|1</active>
//!     </connection>
//!   </connections>
//! </config>
//! ```
//!
//! Reading is tolerant field extraction, not XML parsing: each field is the
//! first single-line `<tag>...</tag>` match anywhere in the file, and a
//! missing or malformed field leaves its default. Files written by the
//! client itself are not guaranteed to be well-formed.

use crate::config::obfuscation::{decode_entities, encode_entities};
use crate::config::store::FileStore;
use crate::config::{ServiceSettings, VpnConfig, DEFAULT_PORT};
use crate::error::ConfigError;
use crate::vpn::probe::SystemProbe;
use regex::Regex;
use secrecy::Secret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// First-match extractor for the record's fields
#[derive(Debug)]
pub struct RecordParser {
    server: Regex,
    username: Regex,
    password: Regex,
    fingerprint: Regex,
    active: Regex,
}

impl RecordParser {
    /// Create a new RecordParser with compiled field patterns
    pub fn new() -> Self {
        Self {
            server: field_pattern("server"),
            username: field_pattern("username"),
            password: field_pattern("password"),
            fingerprint: field_pattern("fingerprint"),
            active: field_pattern("active"),
        }
    }

    /// Extract the record from raw file contents
    pub fn parse(&self, xml: &str) -> VpnConfig {
        let mut config = VpnConfig::default();

        if let Some(server_port) = first_match(&self.server, xml) {
            let mut parts = server_port.split(':');
            config.server = parts.next().unwrap_or_default().to_string();
            if let Some(port) = parts.next().filter(|p| !p.is_empty()) {
                match parse_port(port) {
                    Some(port) => config.port = port,
                    None => warn!(port, "Ignoring invalid port in VPN record"),
                }
            }
        }

        if let Some(username) = first_match(&self.username, xml) {
            config.username = decode_entities(username);
        }

        if let Some(password) = first_match(&self.password, xml) {
            config.password = Secret::new(decode_entities(password));
        }

        if let Some(fingerprint) = first_match(&self.fingerprint, xml) {
            config.fingerprint = fingerprint.to_string();
        }

        if let Some(active) = first_match(&self.active, xml) {
            config.active = active == "1";
        }

        config
    }
}

impl Default for RecordParser {
    fn default() -> Self {
        Self::new()
    }
}

fn field_pattern(tag: &str) -> Regex {
    // `.` stops at newlines, so a value split across lines is not a match
    Regex::new(&format!("<{tag}>(.*?)</{tag}>")).expect("Failed to compile field pattern")
}

fn first_match<'a>(pattern: &Regex, xml: &'a str) -> Option<&'a str> {
    pattern
        .captures(xml)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Leading decimal digits of `text` as a port, if they form one in 1-65535
fn parse_port(text: &str) -> Option<u16> {
    let trimmed = text.trim_start();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// Render the fixed single-connection record
pub fn render_config(config: &VpnConfig) -> String {
    let port = if config.port == 0 {
        DEFAULT_PORT
    } else {
        config.port
    };

    format!(
        r#"
<config>
  <connections>
    <connection type="persistent">
      <server>{server}:{port}</server>
      <username>{username}</username>
      <password>{password}</password>
      <fingerprint>{fingerprint}</fingerprint>
      <active>{active}</active>
    </connection>
  </connections>
</config>"#,
        server = config.server,
        port = port,
        username = encode_entities(&config.username),
        password = encode_entities(config.password()),
        fingerprint = config.fingerprint,
        active = if config.active { "1" } else { "0" },
    )
}

/// Reads and writes the Kerio record
///
/// Writing restarts the VPN service so the client picks up the change.
pub struct ConfigCodec<S, P> {
    store: S,
    probe: Arc<P>,
    parser: RecordParser,
    config_path: PathBuf,
    temp_path: PathBuf,
}

impl<S: FileStore, P: SystemProbe> ConfigCodec<S, P> {
    /// Create a codec for the record at `config_path`, staging writes at `temp_path`
    pub fn new(store: S, probe: Arc<P>, config_path: PathBuf, temp_path: PathBuf) -> Self {
        Self {
            store,
            probe,
            parser: RecordParser::new(),
            config_path,
            temp_path,
        }
    }

    /// Create a codec using the paths from the `[service]` settings
    pub fn from_settings(store: S, probe: Arc<P>, settings: &ServiceSettings) -> Self {
        Self::new(
            store,
            probe,
            settings.config_path.clone(),
            settings.temp_path.clone(),
        )
    }

    /// Path of the record on disk
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the record
    ///
    /// Returns `None` (logged) when the file cannot be read. Missing fields
    /// keep their defaults.
    #[tracing::instrument(skip(self), fields(path = %self.config_path.display()))]
    pub async fn read_config(&self) -> Option<VpnConfig> {
        let bytes = match self.store.read_file(&self.config_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to read VPN client record");
                return None;
            }
        };

        let xml = String::from_utf8_lossy(&bytes);
        let config = self.parser.parse(&xml);
        debug!(server = %config.server, port = config.port, active = config.active, "Read VPN client record");
        Some(config)
    }

    /// Write the record and restart the service
    ///
    /// Returns `false` (logged) if staging, moving into place or the restart
    /// fails. There is no rollback once the file has been moved.
    #[tracing::instrument(skip(self, config), fields(path = %self.config_path.display(), server = %config.server))]
    pub async fn write_config(&self, config: &VpnConfig) -> bool {
        match self.try_write(config).await {
            Ok(()) => {
                info!("Wrote VPN client record and restarted service");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to write VPN client record");
                false
            }
        }
    }

    async fn try_write(&self, config: &VpnConfig) -> Result<(), ConfigError> {
        let xml = render_config(config);
        let save_failed = |reason: String| ConfigError::SaveFailed {
            path: self.config_path.to_string_lossy().to_string(),
            reason,
        };

        self.store
            .write_file(&self.temp_path, xml.as_bytes())
            .await
            .map_err(|e| save_failed(format!("staging {}: {}", self.temp_path.display(), e)))?;

        self.store
            .write_file_elevated(&self.temp_path, &self.config_path)
            .await
            .map_err(|e| save_failed(e.to_string()))?;

        let outcome = self
            .probe
            .restart_service()
            .await
            .map_err(|e| save_failed(format!("service restart: {}", e)))?;

        if !outcome.success() {
            return Err(save_failed(format!(
                "service restart exited with {:?}: {}",
                outcome.code,
                outcome.stderr.trim()
            )));
        }

        Ok(())
    }
}
