//! File access for the Kerio record
//!
//! The record lives in `/etc`, so writes go to a temporary file first and
//! are moved into place with elevated privileges.

use crate::config::ServiceSettings;
use crate::error::ProbeError;
use crate::vpn::process::CommandRunner;
use std::future::Future;
use std::io;
use std::path::Path;
use tracing::debug;

/// File operations the config codec consumes
pub trait FileStore: Send + Sync {
    /// Read the whole file
    fn read_file(&self, path: &Path) -> impl Future<Output = io::Result<Vec<u8>>> + Send;

    /// Write a file the current user owns (the temporary copy)
    fn write_file(
        &self,
        path: &Path,
        contents: &[u8],
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Move `tmp_path` over `final_path` with elevated privileges
    fn write_file_elevated(
        &self,
        tmp_path: &Path,
        final_path: &Path,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// [`FileStore`] using tokio file I/O and `sudo mv`
#[derive(Debug, Clone)]
pub struct SudoFileStore {
    runner: CommandRunner,
}

impl SudoFileStore {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Create a store from the `[service]` settings
    pub fn from_settings(settings: &ServiceSettings) -> Self {
        Self::new(CommandRunner::new(
            settings.command_timeout(),
            settings.use_sudo,
        ))
    }
}

impl FileStore for SudoFileStore {
    async fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }

    async fn write_file_elevated(&self, tmp_path: &Path, final_path: &Path) -> Result<(), ProbeError> {
        let tmp = tmp_path.to_string_lossy();
        let target = final_path.to_string_lossy();
        let output = self
            .runner
            .run_privileged("mv", &[tmp.as_ref(), target.as_ref()])
            .await?;

        if !output.success() {
            return Err(ProbeError::CommandFailed {
                command: format!("mv {} {}", tmp, target),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        debug!(from = %tmp, to = %target, "Moved file into place");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_then_move_into_place() {
        let dir = tempdir().unwrap();
        let tmp = dir.path().join("record.tmp");
        let target = dir.path().join("record.conf");
        let store = SudoFileStore::new(CommandRunner::new(Duration::from_secs(5), false));

        store.write_file(&tmp, b"<config/>").await.unwrap();
        store.write_file_elevated(&tmp, &target).await.unwrap();

        assert!(!tmp.exists());
        assert_eq!(store.read_file(&target).await.unwrap(), b"<config/>");
    }

    #[tokio::test]
    async fn test_move_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        let store = SudoFileStore::new(CommandRunner::new(Duration::from_secs(5), false));
        let err = store
            .write_file_elevated(&dir.path().join("missing"), &dir.path().join("target"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::CommandFailed { .. }));
    }
}
