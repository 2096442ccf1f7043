//! System probe: the process-execution seam of the connection monitor
//!
//! [`SystemProbe`] is what the monitor and codec call to observe and drive
//! the VPN client service. [`SystemctlProbe`] implements it with
//! `systemctl`, `ip` and `openssl`; tests substitute their own.

use crate::config::ServiceSettings;
use crate::error::ProbeError;
use crate::vpn::output_parser::OutputParser;
use crate::vpn::process::{missing_tools, CommandOutput, CommandRunner};
use std::future::Future;
use tracing::{debug, warn};

/// Tools [`SystemctlProbe`] needs on `PATH`
pub const REQUIRED_TOOLS: [&str; 3] = ["systemctl", "ip", "openssl"];

/// Operations the monitor and codec consume from the operating system
pub trait SystemProbe: Send + Sync {
    /// Whether the service manager reports the VPN unit as running
    fn is_service_active(&self) -> impl Future<Output = Result<bool, ProbeError>> + Send;

    /// Whether the VPN's virtual network interface exists
    fn has_active_interface(&self) -> impl Future<Output = Result<bool, ProbeError>> + Send;

    /// IPv4 address bound to the VPN interface, if any
    fn get_interface_address(
        &self,
    ) -> impl Future<Output = Result<Option<String>, ProbeError>> + Send;

    /// Start the VPN unit (privileged)
    fn start_service(&self) -> impl Future<Output = Result<CommandOutput, ProbeError>> + Send;

    /// Stop the VPN unit (privileged)
    fn stop_service(&self) -> impl Future<Output = Result<CommandOutput, ProbeError>> + Send;

    /// Restart the VPN unit (privileged)
    fn restart_service(&self) -> impl Future<Output = Result<CommandOutput, ProbeError>> + Send;

    /// Fingerprint of the certificate the server presents during a TLS handshake
    fn detect_server_fingerprint(
        &self,
        server: &str,
        port: u16,
    ) -> impl Future<Output = Result<Option<String>, ProbeError>> + Send;
}

/// [`SystemProbe`] backed by `systemctl`, `ip` and `openssl`
#[derive(Debug)]
pub struct SystemctlProbe {
    runner: CommandRunner,
    parser: OutputParser,
    unit: String,
    interface: String,
}

impl SystemctlProbe {
    /// Create a probe for the given unit and interface
    pub fn new(runner: CommandRunner, unit: String, interface: String) -> Self {
        Self {
            runner,
            parser: OutputParser::new(),
            unit,
            interface,
        }
    }

    /// Create a probe from the `[service]` settings
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::new(
            CommandRunner::new(settings.command_timeout(), settings.use_sudo),
            settings.unit.clone(),
            settings.interface.clone(),
        )
    }

    /// Required tools that are not installed
    pub fn missing_tools() -> Vec<String> {
        missing_tools(&REQUIRED_TOOLS)
    }

    /// Whether `ip link show` output lists the tunnel interface
    ///
    /// A failed listing counts as absent, the same as an empty one.
    fn interface_listed(&self, output: &CommandOutput) -> bool {
        if !output.success() {
            debug!(code = ?output.code, stderr = %output.stderr.trim(), "ip link show failed");
            return false;
        }
        self.parser.has_interface(&output.stdout, &self.interface)
    }

    async fn lifecycle(&self, action: &str) -> Result<CommandOutput, ProbeError> {
        let output = self
            .runner
            .run_privileged("systemctl", &[action, &self.unit])
            .await?;
        if output.success() {
            debug!(unit = %self.unit, action, "Service command succeeded");
        } else {
            warn!(
                unit = %self.unit,
                action,
                code = ?output.code,
                stderr = %output.stderr.trim(),
                "Service command exited with failure"
            );
        }
        Ok(output)
    }
}

impl SystemProbe for SystemctlProbe {
    #[tracing::instrument(skip(self), fields(unit = %self.unit))]
    async fn is_service_active(&self) -> Result<bool, ProbeError> {
        // is-active exits non-zero for inactive units; only stdout matters
        let output = self
            .runner
            .run("systemctl", &["is-active", &self.unit])
            .await?;
        Ok(self.parser.is_active(&output.stdout))
    }

    #[tracing::instrument(skip(self), fields(interface = %self.interface))]
    async fn has_active_interface(&self) -> Result<bool, ProbeError> {
        let output = self.runner.run("ip", &["link", "show"]).await?;
        Ok(self.interface_listed(&output))
    }

    #[tracing::instrument(skip(self), fields(interface = %self.interface))]
    async fn get_interface_address(&self) -> Result<Option<String>, ProbeError> {
        let output = self
            .runner
            .run("ip", &["addr", "show", &self.interface])
            .await?;
        if !output.success() {
            // ip exits non-zero when the device does not exist
            debug!(stderr = %output.stderr.trim(), "No address for VPN interface");
            return Ok(None);
        }
        Ok(self.parser.inet_address(&output.stdout))
    }

    async fn start_service(&self) -> Result<CommandOutput, ProbeError> {
        self.lifecycle("start").await
    }

    async fn stop_service(&self) -> Result<CommandOutput, ProbeError> {
        self.lifecycle("stop").await
    }

    async fn restart_service(&self) -> Result<CommandOutput, ProbeError> {
        self.lifecycle("restart").await
    }

    #[tracing::instrument(skip(self))]
    async fn detect_server_fingerprint(
        &self,
        server: &str,
        port: u16,
    ) -> Result<Option<String>, ProbeError> {
        let endpoint = format!("{}:{}", server, port);
        // Closing stdin makes s_client exit right after the handshake
        let handshake = self
            .runner
            .run_with_input(
                "openssl",
                &["s_client", "-connect", &endpoint, "-servername", server],
                b"",
            )
            .await?;

        let Some(certificate) = self.parser.certificate(&handshake.stdout) else {
            warn!(%endpoint, stderr = %handshake.stderr.trim(), "Server presented no certificate");
            return Ok(None);
        };

        let digest = self
            .runner
            .run_with_input(
                "openssl",
                &["x509", "-noout", "-fingerprint", "-md5"],
                certificate.as_bytes(),
            )
            .await?;

        match self.parser.fingerprint(&digest.stdout) {
            Some(fingerprint) => Ok(Some(fingerprint)),
            None => Err(ProbeError::UnexpectedOutput {
                command: "openssl x509 -noout -fingerprint -md5".to_string(),
                output: digest.stdout.trim().to_string(),
            }),
        }
    }
}
