//! VPN connection management commands

use super::{build_monitor, load_checked_settings, ServiceMonitor};
use chrono::Local;
use colored::{ColoredString, Colorize};
use kvpn_core::error::{KvpnError, VpnError};
use kvpn_core::vpn::{format_duration, ConnectionInfo, ConnectionState};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Machine-readable `status --json` output
#[derive(Debug, Serialize)]
struct StatusReport {
    state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server: Option<String>,
}

/// Run the status command
///
/// An `Error` state is printed and then reported as a failure.
pub async fn run_status(json: bool) -> Result<(), KvpnError> {
    let settings = load_checked_settings()?;
    let monitor = build_monitor(settings);

    let state = monitor.poll().await;
    let info = monitor.get_connection_info().await;

    if json {
        let report = StatusReport {
            state,
            ip: info.as_ref().and_then(|i| i.ip.clone()),
            server: info.map(|i| i.server),
        };
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| KvpnError::Io(std::io::Error::other(e)))?;
        println!("{}", rendered);
    } else {
        println!("VPN status: {}", paint(state));
        if let Some(info) = info {
            print_info(&info, false);
        }
    }

    if state == ConnectionState::Error {
        return Err(VpnError::ErrorState.into());
    }
    Ok(())
}

/// Run the connect command
pub async fn run_connect() -> Result<(), KvpnError> {
    let monitor = build_monitor(load_checked_settings()?);

    if monitor.poll().await.is_connected() {
        println!("✓ VPN is already connected");
        return Ok(());
    }

    println!("Connecting...");
    if !monitor.connect().await {
        return Err(connect_failed(&monitor));
    }

    println!("✓ VPN connected");
    if let Some(info) = monitor.get_connection_info().await {
        print_info(&info, false);
    }
    Ok(())
}

/// Run the disconnect command
pub async fn run_disconnect() -> Result<(), KvpnError> {
    let monitor = build_monitor(load_checked_settings()?);

    println!("Disconnecting...");
    if !monitor.disconnect().await {
        return Err(VpnError::DisconnectFailed.into());
    }

    println!("✓ VPN disconnected");
    Ok(())
}

/// Run the reconnect command
pub async fn run_reconnect() -> Result<(), KvpnError> {
    let monitor = build_monitor(load_checked_settings()?);

    println!("Reconnecting...");
    if !monitor.reconnect().await {
        return Err(connect_failed(&monitor));
    }

    println!("✓ VPN reconnected");
    Ok(())
}

/// Run the monitor command until interrupted
///
/// Prints every state change with a timestamp, and the connection details
/// on each change into `Connected` when `show_connection_info` is set.
pub async fn run_monitor() -> Result<(), KvpnError> {
    let settings = load_checked_settings()?;
    let show_info = settings.monitor.show_connection_info;
    let auto_connect = settings.monitor.auto_connect;
    let monitor = build_monitor(settings);

    let initial = monitor.poll().await;
    println!("{} VPN status: {}", timestamp(), paint(initial));
    if initial.is_connected() && show_info {
        print_connection_info(&monitor).await;
    }

    let mut events = monitor.subscribe();

    if auto_connect && initial == ConnectionState::Disconnected {
        info!("Auto-connect enabled, connecting");
        monitor.connect().await;
    }

    monitor.start_monitoring();
    println!(
        "Monitoring every {}s (auto-reconnect {}), press Ctrl-C to stop",
        monitor.settings().check_interval_secs,
        if monitor.settings().auto_reconnect {
            "on"
        } else {
            "off"
        }
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(state) => {
                    println!("{} VPN status: {}", timestamp(), paint(state));
                    if state.is_connected() && show_info {
                        print_connection_info(&monitor).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed state changes");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    monitor.stop_monitoring();
    println!("{} Stopped monitoring", timestamp());
    Ok(())
}

fn connect_failed(monitor: &ServiceMonitor) -> KvpnError {
    VpnError::ConnectFailed {
        state: monitor.current_state().to_string(),
    }
    .into()
}

async fn print_connection_info(monitor: &ServiceMonitor) {
    if let Some(info) = monitor.get_connection_info().await {
        print_info(&info, true);
    }
}

fn print_info(info: &ConnectionInfo, with_duration: bool) {
    println!("  Server:   {}", info.server);
    println!(
        "  IP:       {}",
        info.ip.as_deref().unwrap_or("unknown")
    );
    if with_duration {
        if let Some(duration) = info.duration {
            println!("  Duration: {}", format_duration(duration));
        }
    }
}

fn paint(state: ConnectionState) -> ColoredString {
    let label = state.to_string();
    match state {
        ConnectionState::Connected => label.green().bold(),
        ConnectionState::Connecting | ConnectionState::Disconnecting => label.yellow(),
        ConnectionState::Disconnected => label.normal(),
        ConnectionState::Error => label.red().bold(),
    }
}

fn timestamp() -> ColoredString {
    format!("[{}]", Local::now().format("%Y-%m-%d %H:%M:%S")).dimmed()
}
