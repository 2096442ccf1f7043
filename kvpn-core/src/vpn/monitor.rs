//! Connection monitor for the Kerio VPN client service
//!
//! [`ConnectionMonitor`] polls the service on a fixed interval, runs the
//! connect/disconnect commands, and retries a bounded number of times when
//! a connected tunnel drops. State changes are published on a broadcast
//! channel; nothing here depends on how they are presented.
//!
//! Commands are serialized with an async lock, so two connects or a connect
//! and a disconnect never run their steps interleaved; they queue instead.
//! Polls do not take that lock. A tick that lands during a user disconnect
//! can still see the drop and queue an auto-reconnect, which then runs
//! right after the disconnect. A tick may also observe a connect settling.

use crate::config::{ConfigCodec, FileStore, MonitorSettings};
use crate::vpn::probe::SystemProbe;
use crate::vpn::state::{ConnectionState, MonitorSession};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Pause between the disconnect and connect halves of a manual reconnect
pub const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Server name reported when the client record cannot be read
pub const UNKNOWN_SERVER: &str = "Unknown";

/// Capacity of the state-change channel
const EVENT_CAPACITY: usize = 64;

/// Details of an established connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Address assigned to the VPN interface
    pub ip: Option<String>,
    /// Server from the client record
    pub server: String,
    /// Whole seconds since the connection was confirmed
    pub duration: Option<u64>,
}

/// Polls and drives the VPN client service
///
/// Cloning is cheap and every clone shares one session.
pub struct ConnectionMonitor<P, S> {
    inner: Arc<Inner<P, S>>,
}

struct Inner<P, S> {
    probe: Arc<P>,
    codec: ConfigCodec<S, P>,
    settings: MonitorSettings,
    session: Mutex<MonitorSession>,
    events: broadcast::Sender<ConnectionState>,
    command_lock: tokio::sync::Mutex<()>,
    monitoring: Mutex<Option<MonitoringTask>>,
}

struct MonitoringTask {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<P, S> Clone for ConnectionMonitor<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, S> ConnectionMonitor<P, S>
where
    P: SystemProbe + 'static,
    S: FileStore + 'static,
{
    /// Create a disconnected monitor
    pub fn new(probe: Arc<P>, codec: ConfigCodec<S, P>, settings: MonitorSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = MonitorSession::new(settings.max_reconnect_attempts);

        Self {
            inner: Arc::new(Inner {
                probe,
                codec,
                settings,
                session: Mutex::new(session),
                events,
                command_lock: tokio::sync::Mutex::new(()),
                monitoring: Mutex::new(None),
            }),
        }
    }

    /// Receive every state the monitor emits from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.inner.events.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.session().current()
    }

    /// Auto-reconnect attempts spent since the last successful connect
    pub fn reconnect_attempts(&self) -> u32 {
        self.session().reconnect_attempts()
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    /// Query the service without touching the session
    ///
    /// `Connected` requires both an active unit and the tunnel interface;
    /// an active unit without the interface is `Disconnected`. Probe
    /// failures are logged and reported as `Error`.
    pub async fn get_status(&self) -> ConnectionState {
        match self.inner.probe.is_service_active().await {
            Ok(true) => match self.inner.probe.has_active_interface().await {
                Ok(true) => ConnectionState::Connected,
                Ok(false) => {
                    debug!("Service active but tunnel interface missing");
                    ConnectionState::Disconnected
                }
                Err(e) => {
                    error!(error = %e, "Error checking VPN interface");
                    ConnectionState::Error
                }
            },
            Ok(false) => ConnectionState::Disconnected,
            Err(e) => {
                error!(error = %e, "Error checking VPN service status");
                ConnectionState::Error
            }
        }
    }

    /// Start the service and report whether the tunnel came up
    pub async fn connect(&self) -> bool {
        let _command = self.inner.command_lock.lock().await;

        self.transition(ConnectionState::Connecting);
        info!("Starting VPN service");

        match self.inner.probe.start_service().await {
            Ok(outcome) if !outcome.success() => {
                warn!(code = ?outcome.code, "Service start reported failure, checking status anyway");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Error connecting");
                self.transition(ConnectionState::Error);
                return false;
            }
        }

        tokio::time::sleep(self.inner.settings.settle_delay()).await;

        let status = self.get_status().await;
        self.with_session(|session| {
            if status.is_connected() {
                session.mark_connected();
            } else {
                session.set_state(status);
            }
        });
        self.emit(status);

        match status {
            ConnectionState::Connected => info!("VPN connected"),
            other => warn!(state = %other, "VPN did not connect"),
        }
        status.is_connected()
    }

    /// Stop the service
    ///
    /// Ends `Disconnected` once the stop command has run, whatever its exit
    /// status; only a command that cannot run at all yields `Error`.
    pub async fn disconnect(&self) -> bool {
        let _command = self.inner.command_lock.lock().await;

        self.transition(ConnectionState::Disconnecting);
        info!("Stopping VPN service");

        match self.inner.probe.stop_service().await {
            Ok(outcome) if !outcome.success() => {
                warn!(code = ?outcome.code, "Service stop reported failure");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Error disconnecting");
                self.transition(ConnectionState::Error);
                return false;
            }
        }

        self.transition(ConnectionState::Disconnected);
        info!("VPN disconnected");
        true
    }

    /// Disconnect, pause briefly, then connect again
    pub async fn reconnect(&self) -> bool {
        self.disconnect().await;
        tokio::time::sleep(RECONNECT_PAUSE).await;
        self.connect().await
    }

    /// Run one monitoring tick and return the observed status
    ///
    /// A status different from the current state replaces it and is
    /// emitted. If the previous tick saw `Connected` and this one sees
    /// `Disconnected`, a reconnect is scheduled while auto-reconnect is on
    /// and attempts remain.
    pub async fn poll(&self) -> ConnectionState {
        let status = self.get_status().await;
        let auto_reconnect = self.inner.settings.auto_reconnect;

        let (changed, attempt) = self.with_session(|session| {
            let was_connected = session.last_observed().is_connected();
            let changed = status != session.current();
            let mut attempt = None;

            if changed {
                session.set_state(status);

                if was_connected && status == ConnectionState::Disconnected && auto_reconnect {
                    attempt = session.try_take_reconnect_attempt();
                    if attempt.is_none() {
                        warn!(
                            max_attempts = session.max_reconnect_attempts(),
                            "Connection dropped and reconnect attempts are exhausted"
                        );
                    }
                }
            }

            session.observe(status);
            (changed, attempt)
        });

        if let Some(attempt) = attempt {
            info!(
                attempt,
                max_attempts = self.inner.settings.max_reconnect_attempts,
                "Auto-reconnect attempt {}/{}",
                attempt,
                self.inner.settings.max_reconnect_attempts
            );
            self.schedule_reconnect();
        }

        if changed {
            self.emit(status);
        }

        status
    }

    /// Begin polling every `check_interval_secs`
    ///
    /// The first poll happens one interval from now. Calling this while
    /// monitoring is already running does nothing. Must be called from
    /// within a tokio runtime.
    pub fn start_monitoring(&self) {
        let mut monitoring = lock(&self.inner.monitoring);
        if monitoring.as_ref().is_some_and(|m| !m.task.is_finished()) {
            debug!("Monitoring already running");
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let interval = self.inner.settings.check_interval();
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Consume first immediate tick

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        monitor.poll().await;
                    }
                }
            }
            debug!("Monitoring loop exited");
        });

        info!(interval_secs = interval.as_secs(), "Started monitoring");
        *monitoring = Some(MonitoringTask { stop_tx, task });
    }

    /// Stop future polls; a poll or command already running completes
    pub fn stop_monitoring(&self) {
        if let Some(monitoring) = lock(&self.inner.monitoring).take() {
            let _ = monitoring.stop_tx.send(true);
            info!("Stopped monitoring");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.inner.monitoring)
            .as_ref()
            .is_some_and(|m| !m.task.is_finished())
    }

    /// Whole seconds connected, or `None` unless the state is `Connected`
    pub fn get_connection_duration(&self) -> Option<u64> {
        self.session().connection_duration()
    }

    /// IP, server and duration of the current connection
    ///
    /// `None` unless connected, or if the interface address cannot be
    /// queried. An unreadable client record only degrades the server name.
    pub async fn get_connection_info(&self) -> Option<ConnectionInfo> {
        if !self.current_state().is_connected() {
            return None;
        }

        let ip = match self.inner.probe.get_interface_address().await {
            Ok(ip) => ip,
            Err(e) => {
                error!(error = %e, "Error getting connection info");
                return None;
            }
        };

        let server = match self.inner.codec.read_config().await {
            Some(config) if !config.server.is_empty() => config.server,
            Some(_) => UNKNOWN_SERVER.to_string(),
            None => {
                warn!("Failed to read server from VPN client record");
                UNKNOWN_SERVER.to_string()
            }
        };

        Some(ConnectionInfo {
            ip,
            server,
            duration: self.get_connection_duration(),
        })
    }

    fn schedule_reconnect(&self) {
        let monitor = self.clone();
        let delay = self.inner.settings.reconnect_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            monitor.connect().await;
        });
    }

    fn transition(&self, state: ConnectionState) {
        self.with_session(|session| session.set_state(state));
        self.emit(state);
    }

    fn emit(&self, state: ConnectionState) {
        debug!(state = %state, "State changed");
        // No subscribers is fine
        let _ = self.inner.events.send(state);
    }

    fn session(&self) -> MutexGuard<'_, MonitorSession> {
        lock(&self.inner.session)
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut MonitorSession) -> R) -> R {
        f(&mut *self.session())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Format seconds as `HH:MM:SS`
pub fn format_duration(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}
