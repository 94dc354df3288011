//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the agent.
///
/// Every path the agent touches outside the per-job deploy paths is
/// derived from one base directory: the config-file pipeline
/// (`pending/`, `processed/`), the global state file, the lock file
/// and the log directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Inbox for new job configuration files
    pub fn pending_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("pending"))
    }

    /// Validated/active job records
    pub fn processed_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("processed"))
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Last deployed commit, shared across jobs
    pub fn state_file(&self) -> File {
        File::new(self.base_dir.join("last_commit.json"))
    }

    /// Single-flight install lock file
    pub fn lock_file(&self) -> PathBuf {
        self.base_dir.join("deployd.lock")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), AgentError> {
        Dir::new(&self.base_dir).create().await?;
        self.pending_dir().create().await?;
        self.processed_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }

    /// Verify every directory of the layout is writable.
    ///
    /// Probes with a create-and-delete of a marker file, the closest
    /// portable equivalent of an access(W_OK) check.
    pub async fn assert_writable(&self) -> Result<(), AgentError> {
        for dir in [
            Dir::new(&self.base_dir),
            self.pending_dir(),
            self.processed_dir(),
            self.logs_dir(),
        ] {
            let probe = dir.file(".write-probe");
            probe.write_string("").await.map_err(|e| {
                AgentError::ConfigError(format!(
                    "directory {} is not writable: {}",
                    dir.path().display(),
                    e
                ))
            })?;
            probe.delete().await?;
        }
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        // System-wide location on Linux, home directory elsewhere
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/deployd");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deployd");

        Self::new(base_dir)
    }
}
