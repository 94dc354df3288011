//! System-wide install lock
//!
//! At most one agent instance may run deployments on a host. The lock
//! combines three checks: a process scan for another live instance,
//! a JSON lock record describing the current holder, and an advisory
//! OS lock on the file itself.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{info, warn};

use crate::errors::AgentError;

/// Lock acquisition options
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Lock file location
    pub path: PathBuf,

    /// Age after which a lock whose holder is dead counts as stale
    pub stale_after: Duration,

    /// Scan the process table for another live agent instance.
    /// Disabled in tests, where the test runner itself would match.
    pub check_process_signature: bool,
}

impl LockOptions {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            stale_after: Duration::from_secs(3600),
            check_process_signature: true,
        }
    }
}

/// Persisted description of the lock holder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub user: String,
}

/// Held install lock.
///
/// Released explicitly with [`release`](InstallLock::release) or on
/// drop.
#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
    file: Option<std::fs::File>,
}

impl InstallLock {
    /// Acquire the host-wide install lock.
    ///
    /// Refuses when another agent process is running, when the lock
    /// record names a live holder, or when a dead holder's record is
    /// younger than the staleness threshold. A dead holder past the
    /// threshold is taken over.
    pub fn acquire(options: &LockOptions) -> Result<Self, AgentError> {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        if options.check_process_signature {
            if let Some(pid) = find_sibling_process(&system) {
                return Err(AgentError::LockError(format!(
                    "another agent instance is running (pid {})",
                    pid
                )));
            }
        }

        if options.path.exists() {
            match read_record(&options.path) {
                Some(record) => {
                    if system.process(Pid::from_u32(record.pid)).is_some() {
                        return Err(AgentError::LockError(format!(
                            "lock held by live process {} since {}",
                            record.pid, record.acquired_at
                        )));
                    }

                    let age = Utc::now().signed_duration_since(record.acquired_at);
                    if age.num_seconds() >= 0
                        && (age.num_seconds() as u64) < options.stale_after.as_secs()
                    {
                        return Err(AgentError::LockError(format!(
                            "lock held by dead process {} but only {}s old",
                            record.pid,
                            age.num_seconds()
                        )));
                    }

                    warn!(
                        "Taking over stale lock from dead process {} (acquired {})",
                        record.pid, record.acquired_at
                    );
                }
                None => {
                    warn!(
                        "Lock file {} is unreadable, taking over",
                        options.path.display()
                    );
                }
            }
        }

        if let Some(parent) = options.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&options.path)?;

        file.try_lock_exclusive().map_err(|e| {
            AgentError::LockError(format!("failed to lock {}: {}", options.path.display(), e))
        })?;

        let record = LockRecord {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        };
        let contents = serde_json::to_string_pretty(&record)?;
        file.set_len(0)?;
        std::io::Write::write_all(&mut (&file), contents.as_bytes())?;
        std::io::Write::flush(&mut (&file))?;

        info!("Acquired install lock at {}", options.path.display());
        Ok(Self {
            path: options.path.clone(),
            file: Some(file),
        })
    }

    /// Release the lock and remove the lock file
    pub fn release(mut self) -> Result<(), AgentError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), AgentError> {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
            drop(file);
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            info!("Released install lock at {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            warn!("Failed to release install lock: {}", e);
        }
    }
}

fn read_record(path: &std::path::Path) -> Option<LockRecord> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Find another process with the same executable name as ours
fn find_sibling_process(system: &System) -> Option<u32> {
    let own_pid = std::process::id();
    let own_name = std::env::current_exe()
        .ok()?
        .file_name()?
        .to_os_string();

    system
        .processes()
        .iter()
        .find(|(pid, process)| pid.as_u32() != own_pid && process.name() == own_name)
        .map(|(pid, _)| pid.as_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(path: PathBuf) -> LockOptions {
        LockOptions {
            path,
            stale_after: Duration::from_secs(3600),
            check_process_signature: false,
        }
    }

    #[test]
    fn test_acquire_writes_record_and_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployd.lock");

        let lock = InstallLock::acquire(&options(path.clone())).unwrap();
        let record = read_record(&path).unwrap();
        assert_eq!(record.pid, std::process::id());

        lock.release().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_refused_while_holder_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployd.lock");

        let _lock = InstallLock::acquire(&options(path.clone())).unwrap();
        let err = InstallLock::acquire(&options(path)).unwrap_err();
        assert!(matches!(err, AgentError::LockError(_)));
    }

    #[test]
    fn test_stale_lock_from_dead_process_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployd.lock");

        let record = LockRecord {
            pid: u32::MAX - 1,
            acquired_at: Utc::now() - chrono::Duration::hours(2),
            user: "ghost".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

        let lock = InstallLock::acquire(&options(path.clone())).unwrap();
        let rewritten = read_record(&path).unwrap();
        assert_eq!(rewritten.pid, std::process::id());
        drop(lock);
    }

    #[test]
    fn test_fresh_lock_from_dead_process_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployd.lock");

        let record = LockRecord {
            pid: u32::MAX - 1,
            acquired_at: Utc::now(),
            user: "ghost".to_string(),
        };
        std::fs::write(&path, serde_json::to_string(&record).unwrap()).unwrap();

        let err = InstallLock::acquire(&options(path)).unwrap_err();
        assert!(matches!(err, AgentError::LockError(_)));
    }
}
