//! Error types for the kvpn CLI tool
//!
//! Operations on the connection monitor and the config codec never surface
//! these to their callers (they degrade to `Error` state, `None` or `false`),
//! but the collaborators and helpers underneath them return them so the
//! cause can be logged at the boundary.

use thiserror::Error;

/// Main error type for the kvpn application
#[derive(Error, Debug)]
pub enum KvpnError {
    /// Errors related to configuration loading/parsing/writing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors raised while running external commands
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    /// Errors describing a failed VPN operation outcome
    #[error("VPN error: {0}")]
    Vpn(#[from] VpnError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to save configuration file {path}: {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Failures of an external command run on behalf of the monitor or codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Failed to run `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` did not finish within {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    #[error("Unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("`{command}` exited with status {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// VPN command outcomes reported as failures by the CLI
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VpnError {
    #[error("Connection failed, final state: {state}")]
    ConnectFailed { state: String },

    #[error("Disconnect failed")]
    DisconnectFailed,

    #[error("VPN service reported an error state")]
    ErrorState,
}
