//! Pattern-based parser for `systemctl`, `ip` and `openssl` output
//!
//! Extracts the facts the probe needs from the text the system tools print.

use regex::Regex;

/// Parser for the output of the tools [`SystemctlProbe`](super::SystemctlProbe) runs
#[derive(Debug)]
pub struct OutputParser {
    /// Pattern for "    inet 10.0.0.2/24 brd ..." lines from `ip addr show`
    inet_pattern: Regex,
    /// Pattern for "SHA1 Fingerprint=AB:CD:..." from `openssl x509 -fingerprint`
    fingerprint_pattern: Regex,
    /// Pattern for a PEM certificate block in `openssl s_client` output
    certificate_pattern: Regex,
}

impl OutputParser {
    /// Create a new OutputParser with compiled regex patterns
    pub fn new() -> Self {
        Self {
            inet_pattern: Regex::new(r"(?m)^\s*inet\s+(\d{1,3}(?:\.\d{1,3}){3})/\d+")
                .expect("Failed to compile inet pattern"),
            fingerprint_pattern: Regex::new(r"(?i)fingerprint\s*=\s*([0-9a-f]{2}(?::[0-9a-f]{2})+)")
                .expect("Failed to compile fingerprint pattern"),
            certificate_pattern: Regex::new(
                r"(?s)-----BEGIN CERTIFICATE-----.*?-----END CERTIFICATE-----",
            )
            .expect("Failed to compile certificate pattern"),
        }
    }

    /// Whether `systemctl is-active` reported the unit as running
    ///
    /// Only the exact word `active` counts; `activating`, `inactive`,
    /// `failed` and empty output all mean not running.
    pub fn is_active(&self, stdout: &str) -> bool {
        stdout.trim() == "active"
    }

    /// Whether any line of `ip link show` mentions the interface
    ///
    /// Matches case-insensitively anywhere in the line, like piping the
    /// listing through `grep -i`.
    pub fn has_interface(&self, stdout: &str, interface: &str) -> bool {
        let needle = interface.to_lowercase();
        if needle.is_empty() {
            return false;
        }
        stdout
            .lines()
            .any(|line| line.to_lowercase().contains(&needle))
    }

    /// First IPv4 address from `ip addr show <iface>`, without the prefix length
    pub fn inet_address(&self, stdout: &str) -> Option<String> {
        self.inet_pattern
            .captures(stdout)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// First PEM certificate printed by `openssl s_client`
    pub fn certificate<'a>(&self, stdout: &'a str) -> Option<&'a str> {
        self.certificate_pattern.find(stdout).map(|m| m.as_str())
    }

    /// Colon-separated fingerprint from `openssl x509 -fingerprint`, upper-cased
    pub fn fingerprint(&self, stdout: &str) -> Option<String> {
        self.fingerprint_pattern
            .captures(stdout)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_uppercase())
    }
}

impl Default for OutputParser {
    fn default() -> Self {
        Self::new()
    }
}
