//! VPN connection module
//!
//! Handles the Kerio VPN client service: status probing, lifecycle
//! commands, and the monitoring state machine with bounded auto-reconnect.

pub mod monitor;
pub mod output_parser;
pub mod probe;
pub mod process;
pub mod state;

// Public re-exports
pub use monitor::{format_duration, ConnectionInfo, ConnectionMonitor};
pub use output_parser::OutputParser;
pub use probe::{SystemProbe, SystemctlProbe};
pub use process::{CommandOutput, CommandRunner};
pub use state::{ConnectionState, MonitorSession};
