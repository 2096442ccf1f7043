//! Kerio client record commands
//!
//! Show and edit `/etc/kerio-kvc.conf`, and look up the certificate
//! fingerprint a server presents.

use super::{build_codec, load_checked_settings};
use crate::SetConfigArgs;
use kvpn_core::config::VpnConfig;
use kvpn_core::error::{ConfigError, KvpnError};
use kvpn_core::vpn::SystemProbe;
use secrecy::{ExposeSecret, Secret};
use std::io::{self, Write};
use tracing::warn;

/// Shown in place of the password unless asked otherwise
const PASSWORD_MASK: &str = "********";

/// Run the show-config command
pub async fn run_show_config(show_password: bool) -> Result<(), KvpnError> {
    let settings = load_checked_settings()?;
    let (_, codec) = build_codec(&settings);

    let config = codec.read_config().await.ok_or_else(|| ConfigError::LoadFailed {
        path: codec.config_path().display().to_string(),
    })?;

    let password = if show_password {
        config.password()
    } else if config.password().is_empty() {
        ""
    } else {
        PASSWORD_MASK
    };

    println!("Kerio VPN record ({})", codec.config_path().display());
    println!("  Server:      {}", config.server);
    println!("  Port:        {}", config.port);
    println!("  Username:    {}", config.username);
    println!("  Password:    {}", password);
    println!("  Fingerprint: {}", config.fingerprint);
    println!("  Active:      {}", if config.active { "yes" } else { "no" });

    Ok(())
}

/// Run the set-config command
///
/// Flags override the current record; a missing server, username or
/// password is prompted for. Writing restarts the VPN service.
pub async fn run_set_config(args: SetConfigArgs) -> Result<(), KvpnError> {
    let settings = load_checked_settings()?;
    let (probe, codec) = build_codec(&settings);

    let current = match codec.read_config().await {
        Some(config) => config,
        None => {
            println!("No existing record, starting from defaults.");
            VpnConfig::default()
        }
    };

    let mut config = merge_args(current, args.overrides());

    if config.server.trim().is_empty() {
        config.server = prompt_required("VPN Server (hostname or IP)")?;
    }
    if config.username.trim().is_empty() {
        config.username = prompt_required("Username")?;
    }
    if config.password().is_empty() {
        config.password = prompt_password("Password")?;
    }

    if args.detect_fingerprint {
        println!("Detecting fingerprint of {}:{}...", config.server, config.port);
        match probe
            .detect_server_fingerprint(&config.server, config.port)
            .await?
        {
            Some(fingerprint) => {
                println!("✓ Fingerprint: {}", fingerprint);
                config.fingerprint = fingerprint;
            }
            None => {
                warn!(server = %config.server, "Server presented no certificate, keeping fingerprint");
            }
        }
    }

    config.validate().map_err(|e| ConfigError::ValidationError {
        message: format!("Configuration validation failed: {}", e),
    })?;

    println!("💾 Writing {} and restarting the VPN service...", codec.config_path().display());
    if !codec.write_config(&config).await {
        return Err(ConfigError::SaveFailed {
            path: codec.config_path().display().to_string(),
            reason: "write or service restart failed, see log".to_string(),
        }
        .into());
    }

    println!("✅ Configuration saved");
    Ok(())
}

/// Run the fingerprint command
pub async fn run_fingerprint(server: &str, port: u16) -> Result<(), KvpnError> {
    let settings = load_checked_settings()?;
    let (probe, _) = build_codec(&settings);

    match probe.detect_server_fingerprint(server, port).await? {
        Some(fingerprint) => {
            println!("{}", fingerprint);
            Ok(())
        }
        None => Err(ConfigError::ValidationError {
            message: format!("{}:{} presented no certificate", server, port),
        }
        .into()),
    }
}

/// Field overrides taken from the command line
#[derive(Debug, Default)]
struct Overrides {
    server: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<Secret<String>>,
    fingerprint: Option<String>,
    inactive: bool,
}

impl SetConfigArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            server: self.server.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone().map(Secret::new),
            fingerprint: self.fingerprint.clone(),
            inactive: self.inactive,
        }
    }
}

/// Apply overrides to the current record; the result is active unless
/// `--inactive` was given
fn merge_args(mut config: VpnConfig, overrides: Overrides) -> VpnConfig {
    if let Some(server) = overrides.server {
        config.server = server.trim().to_string();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if let Some(username) = overrides.username {
        config.username = username;
    }
    if let Some(password) = overrides.password {
        config.password = password;
    }
    if let Some(fingerprint) = overrides.fingerprint {
        config.fingerprint = fingerprint.trim().to_string();
    }
    config.active = !overrides.inactive;
    config
}

/// Prompt until a non-empty value is entered
fn prompt_required(prompt: &str) -> Result<String, KvpnError> {
    let prompt_text = format!("{}: ", prompt);

    loop {
        let input = prompt_input(&prompt_text)?;

        if input.trim().is_empty() {
            println!("❌ This field is required. Please enter a value.");
            continue;
        }

        return Ok(input.trim().to_string());
    }
}

/// Prompt for a password
fn prompt_password(prompt: &str) -> Result<Secret<String>, KvpnError> {
    loop {
        let password = Secret::new(prompt_input(&format!("{}: ", prompt))?);
        if password.expose_secret().is_empty() {
            println!("❌ Password cannot be empty. Please try again.");
            continue;
        }
        return Ok(password);
    }
}

/// Low-level input prompting
fn prompt_input(prompt: &str) -> Result<String, KvpnError> {
    print!("{}", prompt);
    io::stdout().flush().map_err(KvpnError::Io)?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input).map_err(KvpnError::Io)? == 0 {
        return Err(ConfigError::ValidationError {
            message: format!("no input for '{}'", prompt.trim_end_matches([':', ' '])),
        }
        .into());
    }

    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current() -> VpnConfig {
        let mut config = VpnConfig::new(
            "old.example.com".to_string(),
            "alice".to_string(),
            "old-secret".to_string(),
        );
        config.fingerprint = "AA:BB".to_string();
        config
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let merged = merge_args(
            current(),
            Overrides {
                port: Some(4443),
                ..Overrides::default()
            },
        );

        assert_eq!(merged.server, "old.example.com");
        assert_eq!(merged.port, 4443);
        assert_eq!(merged.username, "alice");
        assert_eq!(merged.password(), "old-secret");
        assert_eq!(merged.fingerprint, "AA:BB");
        assert!(merged.active);
    }

    #[test]
    fn test_merge_overrides_and_inactive() {
        let merged = merge_args(
            current(),
            Overrides {
                server: Some(" new.example.com ".to_string()),
                username: Some("bob".to_string()),
                password: Some(Secret::new("n3w!".to_string())),
                fingerprint: Some("CC:DD".to_string()),
                inactive: true,
                ..Overrides::default()
            },
        );

        assert_eq!(merged.server, "new.example.com");
        assert_eq!(merged.username, "bob");
        assert_eq!(merged.password(), "n3w!");
        assert_eq!(merged.fingerprint, "CC:DD");
        assert!(!merged.active);
    }

    #[test]
    fn test_set_config_args_to_overrides() {
        let args = SetConfigArgs {
            password: Some("pw".to_string()),
            inactive: true,
            ..SetConfigArgs::default()
        };
        let overrides = args.overrides();
        assert_eq!(
            overrides.password.as_ref().map(|p| p.expose_secret().as_str()),
            Some("pw")
        );
        assert!(overrides.inactive);
        assert!(overrides.server.is_none());
    }
}
