//! Test doubles shared by the integration tests

#![allow(dead_code)]

use kvpn_core::config::{ConfigCodec, FileStore, MonitorSettings};
use kvpn_core::error::ProbeError;
use kvpn_core::vpn::{CommandOutput, ConnectionMonitor, ConnectionState, SystemProbe};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const CONFIG_PATH: &str = "/etc/kerio-kvc.conf";
pub const TEMP_PATH: &str = "/tmp/kerio-kvc.conf.tmp";

/// Scriptable stand-in for systemctl/ip/openssl
#[derive(Debug, Default)]
pub struct FakeProbe {
    pub active: AtomicBool,
    pub interface: AtomicBool,
    pub fail_status: AtomicBool,
    pub fail_interface: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_address: AtomicBool,
    /// Whether start_service brings the tunnel up
    pub start_brings_up: AtomicBool,
    pub restart_code: AtomicI32,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub restart_calls: AtomicUsize,
    pub address: Mutex<Option<String>>,
}

impl FakeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Service active with the tunnel interface present
    pub fn set_up(&self, up: bool) {
        self.active.store(up, Ordering::SeqCst);
        self.interface.store(up, Ordering::SeqCst);
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn restart_calls(&self) -> usize {
        self.restart_calls.load(Ordering::SeqCst)
    }

    fn failure(command: &str) -> ProbeError {
        ProbeError::Spawn {
            command: command.to_string(),
            reason: "simulated failure".to_string(),
        }
    }

    fn exited(code: i32) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

impl SystemProbe for FakeProbe {
    async fn is_service_active(&self) -> Result<bool, ProbeError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Self::failure("systemctl is-active"));
        }
        Ok(self.active.load(Ordering::SeqCst))
    }

    async fn has_active_interface(&self) -> Result<bool, ProbeError> {
        if self.fail_interface.load(Ordering::SeqCst) {
            return Err(Self::failure("ip link show"));
        }
        Ok(self.interface.load(Ordering::SeqCst))
    }

    async fn get_interface_address(&self) -> Result<Option<String>, ProbeError> {
        if self.fail_address.load(Ordering::SeqCst) {
            return Err(Self::failure("ip addr show"));
        }
        Ok(self.address.lock().unwrap().clone())
    }

    async fn start_service(&self) -> Result<CommandOutput, ProbeError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Self::failure("systemctl start"));
        }
        if self.start_brings_up.load(Ordering::SeqCst) {
            self.set_up(true);
        }
        Ok(Self::exited(0))
    }

    async fn stop_service(&self) -> Result<CommandOutput, ProbeError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Self::failure("systemctl stop"));
        }
        self.set_up(false);
        Ok(Self::exited(0))
    }

    async fn restart_service(&self) -> Result<CommandOutput, ProbeError> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::exited(self.restart_code.load(Ordering::SeqCst)))
    }

    async fn detect_server_fingerprint(
        &self,
        _server: &str,
        _port: u16,
    ) -> Result<Option<String>, ProbeError> {
        Ok(Some("AA:BB:CC".to_string()))
    }
}

/// In-memory file system; clones share the same files
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
    pub fail_write: Arc<AtomicBool>,
    pub fail_move: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(path: &str, contents: &str) -> Self {
        let store = Self::new();
        store.put(path, contents);
        store
    }

    pub fn put(&self, path: &str, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), contents.as_bytes().to_vec());
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(Path::new(path))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl FileStore for MemoryStore {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if self.fail_write.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    async fn write_file_elevated(&self, tmp_path: &Path, final_path: &Path) -> Result<(), ProbeError> {
        if self.fail_move.load(Ordering::SeqCst) {
            return Err(ProbeError::CommandFailed {
                command: "sudo mv".to_string(),
                code: Some(1),
                stderr: "sudo: a password is required".to_string(),
            });
        }
        let mut files = self.files.lock().unwrap();
        let contents = files.remove(tmp_path).ok_or_else(|| ProbeError::CommandFailed {
            command: "sudo mv".to_string(),
            code: Some(1),
            stderr: "No such file or directory".to_string(),
        })?;
        files.insert(final_path.to_path_buf(), contents);
        Ok(())
    }
}

pub fn codec(probe: &Arc<FakeProbe>, store: &MemoryStore) -> ConfigCodec<MemoryStore, FakeProbe> {
    ConfigCodec::new(
        store.clone(),
        Arc::clone(probe),
        PathBuf::from(CONFIG_PATH),
        PathBuf::from(TEMP_PATH),
    )
}

pub fn monitor_with(
    probe: &Arc<FakeProbe>,
    store: &MemoryStore,
    settings: MonitorSettings,
) -> ConnectionMonitor<FakeProbe, MemoryStore> {
    ConnectionMonitor::new(Arc::clone(probe), codec(probe, store), settings)
}

pub fn monitor(probe: &Arc<FakeProbe>) -> ConnectionMonitor<FakeProbe, MemoryStore> {
    monitor_with(probe, &MemoryStore::new(), MonitorSettings::default())
}

/// Everything emitted so far
pub fn drain(rx: &mut broadcast::Receiver<ConnectionState>) -> Vec<ConnectionState> {
    let mut states = Vec::new();
    while let Ok(state) = rx.try_recv() {
        states.push(state);
    }
    states
}

pub const SAMPLE_RECORD: &str = r#"
<config>
  <connections>
    <connection type="persistent">
      <server>vpn.example.com:4090</server>
      <username>alice</username>
      <password>s3cr&#33;t</password>
      <fingerprint>68:8E:2B:1A:00:FF</fingerprint>
      <active>1</active>
    </connection>
  </connections>
</config>"#;
