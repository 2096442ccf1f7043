//! kvpn - Kerio VPN client monitor
//!
//! A command-line tool for checking, starting and stopping the Kerio
//! Control VPN client service, reconnecting automatically when the tunnel
//! drops, and editing the client's connection record.

use clap::{Args, Parser, Subcommand};
use kvpn_core::{config::DEFAULT_PORT, error::KvpnError, init_logging};

mod cli;

#[derive(Parser)]
#[command(name = "kvpn")]
#[command(version)]
#[command(about = "Monitor and control the Kerio VPN client service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show VPN connection status
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the VPN service
    Connect,
    /// Stop the VPN service
    Disconnect,
    /// Stop and start the VPN service
    Reconnect,
    /// Watch the connection and reconnect when it drops
    Monitor,
    /// Show the Kerio client connection record
    ShowConfig {
        /// Print the password in plaintext
        #[arg(long)]
        show_password: bool,
    },
    /// Write the Kerio client connection record and restart the service
    SetConfig(SetConfigArgs),
    /// Print the certificate fingerprint a VPN server presents
    Fingerprint {
        /// Server hostname or IP address
        server: String,
        /// Server port
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

/// Fields left out keep their current value, or are prompted for
#[derive(Args, Debug, Default)]
pub struct SetConfigArgs {
    /// VPN server hostname or IP address
    #[arg(long)]
    server: Option<String>,
    /// VPN server port
    #[arg(long)]
    port: Option<u16>,
    /// Username for VPN authentication
    #[arg(long)]
    username: Option<String>,
    /// Password for VPN authentication
    #[arg(long)]
    password: Option<String>,
    /// Server certificate fingerprint
    #[arg(long, conflicts_with = "detect_fingerprint")]
    fingerprint: Option<String>,
    /// Ask the server for its certificate fingerprint
    #[arg(long)]
    detect_fingerprint: bool,
    /// Store the record without activating the connection
    #[arg(long)]
    inactive: bool,
}

fn main() {
    // Initialize logging
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();

    let result = tokio::runtime::Runtime::new()
        .map_err(KvpnError::Io)
        .and_then(|runtime| runtime.block_on(run(cli.command)));

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let exit_code = match e {
                // Configuration errors (exit code 2)
                KvpnError::Config(_) | KvpnError::Toml(_) | KvpnError::TomlSerialize(_) => 2,
                // Command and outcome failures (exit code 1 - runtime)
                KvpnError::Probe(_) | KvpnError::Vpn(_) | KvpnError::Io(_) => 1,
            };

            eprintln!("{}", e);
            std::process::exit(exit_code);
        }
    }
}

async fn run(command: Commands) -> Result<(), KvpnError> {
    match command {
        Commands::Status { json } => cli::vpn::run_status(json).await,
        Commands::Connect => cli::vpn::run_connect().await,
        Commands::Disconnect => cli::vpn::run_disconnect().await,
        Commands::Reconnect => cli::vpn::run_reconnect().await,
        Commands::Monitor => cli::vpn::run_monitor().await,
        Commands::ShowConfig { show_password } => cli::config::run_show_config(show_password).await,
        Commands::SetConfig(args) => cli::config::run_set_config(args).await,
        Commands::Fingerprint { server, port } => cli::config::run_fingerprint(&server, port).await,
    }
}
