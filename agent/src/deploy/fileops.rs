//! Privileged filesystem operations
//!
//! Deploy paths are typically owned by the web user, not the agent,
//! so destructive moves and ownership changes go through `sudo -n`.
//! [`DirectFileOps`] performs the same operations unprivileged for
//! targets the agent owns.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use crate::errors::AgentError;

/// Result of running a setup script
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,

    /// Combined stdout and stderr
    pub output: String,
}

impl ScriptResult {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Filesystem operations against the deploy path
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Remove every entry inside `dir`, keeping the directory itself
    async fn remove_tree_contents(&self, dir: &Path) -> Result<(), AgentError>;

    /// Move every entry from `src` into `dst`, replacing collisions
    async fn move_tree_contents(&self, src: &Path, dst: &Path) -> Result<(), AgentError>;

    /// Move a single file, replacing any existing destination
    async fn move_file(&self, src: &Path, dst: &Path) -> Result<(), AgentError>;

    /// Recursively set ownership of `dir` to `owner` (`user:group`)
    async fn chown_recursive(&self, dir: &Path, owner: &str) -> Result<(), AgentError>;

    /// Mark a script executable
    async fn make_executable(&self, path: &Path) -> Result<(), AgentError>;

    /// Run a script in `workdir` with a single argument string
    async fn run_script(
        &self,
        script: &Path,
        args: &str,
        workdir: &Path,
    ) -> Result<ScriptResult, AgentError>;
}

/// Privileged implementation, every operation goes through `sudo -n`
pub struct SudoFileOps;

impl SudoFileOps {
    async fn sudo(&self, args: &[&str]) -> Result<(), AgentError> {
        debug!("sudo -n {}", args.join(" "));
        let output = Command::new("sudo")
            .arg("-n")
            .args(args)
            .output()
            .await
            .map_err(|e| AgentError::SyncError(format!("failed to spawn sudo: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::SyncError(format!(
                "sudo {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FileOps for SudoFileOps {
    async fn remove_tree_contents(&self, dir: &Path) -> Result<(), AgentError> {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let path_str = path
                .to_str()
                .ok_or_else(|| AgentError::SyncError("non-UTF8 path".to_string()))?;
            self.sudo(&["rm", "-rf", path_str]).await?;
        }
        Ok(())
    }

    async fn move_tree_contents(&self, src: &Path, dst: &Path) -> Result<(), AgentError> {
        let mut entries = fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            self.move_file(&from, &to).await?;
        }
        Ok(())
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> Result<(), AgentError> {
        let src_str = src
            .to_str()
            .ok_or_else(|| AgentError::SyncError("non-UTF8 path".to_string()))?;
        let dst_str = dst
            .to_str()
            .ok_or_else(|| AgentError::SyncError("non-UTF8 path".to_string()))?;

        // mv refuses to replace a non-empty directory, clear it first
        if dst.is_dir() {
            self.sudo(&["rm", "-rf", dst_str]).await?;
        }
        self.sudo(&["mv", "-f", src_str, dst_str]).await
    }

    async fn chown_recursive(&self, dir: &Path, owner: &str) -> Result<(), AgentError> {
        let dir_str = dir
            .to_str()
            .ok_or_else(|| AgentError::SyncError("non-UTF8 path".to_string()))?;
        self.sudo(&["chown", "-R", owner, dir_str]).await
    }

    async fn make_executable(&self, path: &Path) -> Result<(), AgentError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| AgentError::SyncError("non-UTF8 path".to_string()))?;
        self.sudo(&["chmod", "+x", path_str]).await
    }

    async fn run_script(
        &self,
        script: &Path,
        args: &str,
        workdir: &Path,
    ) -> Result<ScriptResult, AgentError> {
        debug!("sudo -n {} {} (in {})", script.display(), args, workdir.display());
        let output = Command::new("sudo")
            .arg("-n")
            .arg(script)
            .arg(args)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|e| AgentError::SetupError(format!("failed to spawn script: {}", e)))?;

        Ok(ScriptResult {
            code: output.status.code(),
            output: combine_output(&output.stdout, &output.stderr),
        })
    }
}

/// Unprivileged implementation using plain filesystem calls
pub struct DirectFileOps;

#[async_trait]
impl FileOps for DirectFileOps {
    async fn remove_tree_contents(&self, dir: &Path) -> Result<(), AgentError> {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path).await?;
            } else {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    async fn move_tree_contents(&self, src: &Path, dst: &Path) -> Result<(), AgentError> {
        let mut entries = fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let from = entry.path();
            let to = dst.join(entry.file_name());
            self.move_file(&from, &to).await?;
        }
        Ok(())
    }

    async fn move_file(&self, src: &Path, dst: &Path) -> Result<(), AgentError> {
        if dst.is_dir() {
            fs::remove_dir_all(dst).await?;
        } else if dst.is_file() {
            fs::remove_file(dst).await?;
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(src, dst).await?;
        Ok(())
    }

    async fn chown_recursive(&self, _dir: &Path, _owner: &str) -> Result<(), AgentError> {
        // Ownership already matches the agent user
        Ok(())
    }

    async fn make_executable(&self, path: &Path) -> Result<(), AgentError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(path).await?;
            let mut perms = metadata.permissions();
            perms.set_mode(perms.mode() | 0o755);
            fs::set_permissions(path, perms).await?;
        }
        Ok(())
    }

    async fn run_script(
        &self,
        script: &Path,
        args: &str,
        workdir: &Path,
    ) -> Result<ScriptResult, AgentError> {
        let output = Command::new(script)
            .arg(args)
            .current_dir(workdir)
            .output()
            .await
            .map_err(|e| AgentError::SetupError(format!("failed to spawn script: {}", e)))?;

        Ok(ScriptResult {
            code: output.status.code(),
            output: combine_output(&output.stdout, &output.stderr),
        })
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    let err = String::from_utf8_lossy(stderr);
    if !err.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&err);
    }
    combined
}
