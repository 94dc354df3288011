//! Deployment engine
//!
//! Drives one deployment run end to end: download the branch
//! snapshot, extract it into a scratch area, sync it into the deploy
//! path (full replace or changed-files-only), persist the new commit
//! id and optionally run the setup script.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, warn};

use crate::deploy::archive;
use crate::deploy::fileops::{DirectFileOps, FileOps};
use crate::deploy::fsm::{DeployEvent, DeployFsm};
use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::github::changes::ChangeSetResolver;
use crate::github::client::GithubClient;
use crate::github::commits::{CommitRange, CommitTracker};
use crate::jobs::config::JobConfig;
use crate::storage::state::StateStore;

/// Outcome of the setup script stage
#[derive(Debug, Clone, PartialEq)]
pub enum SetupOutcome {
    /// No setup script in the deployed tree
    NotFound,

    /// Script exited zero
    Succeeded,

    /// Script exited non-zero or was killed
    Failed { code: Option<i32>, output: String },
}

/// Report of a completed deployment run.
///
/// A report existing at all means the deploy path was synced and the
/// commit id persisted; only the setup stage can still have gone
/// wrong.
#[derive(Debug, Clone)]
pub struct DeployReport {
    /// Commit the deploy path now reflects
    pub commit: String,

    /// Setup script outcome
    pub setup: SetupOutcome,

    /// Human-readable run log, one line per stage
    pub log: String,
}

/// Deployment engine
pub struct DeploymentEngine {
    github: Arc<GithubClient>,
    tracker: CommitTracker,
    resolver: ChangeSetResolver,
    state: StateStore,
    fileops: Arc<dyn FileOps>,
    deploy_user: String,
}

impl DeploymentEngine {
    pub fn new(
        github: Arc<GithubClient>,
        state: StateStore,
        fileops: Arc<dyn FileOps>,
        deploy_user: String,
    ) -> Self {
        Self {
            tracker: CommitTracker::new(github.clone()),
            resolver: ChangeSetResolver::new(github.clone()),
            github,
            state,
            fileops,
            deploy_user,
        }
    }

    /// Run one deployment of `current` for `job`.
    ///
    /// `last` is the previously deployed commit, if any. The scratch
    /// area is removed whether the run succeeds or fails.
    pub async fn deploy(
        &self,
        job: &JobConfig,
        current: &str,
        last: Option<&str>,
    ) -> Result<DeployReport, AgentError> {
        let scratch = Dir::create_temp_dir("deployd").await?;
        let result = self.deploy_inner(job, current, last, &scratch).await;

        if let Err(e) = scratch.delete().await {
            warn!("Failed to clean scratch dir {}: {}", scratch.path().display(), e);
        }

        result
    }

    async fn deploy_inner(
        &self,
        job: &JobConfig,
        current: &str,
        last: Option<&str>,
        scratch: &Dir,
    ) -> Result<DeployReport, AgentError> {
        let mut fsm = DeployFsm::new();
        let mut log: Vec<String> = Vec::new();

        info!(
            "Deploying {}/{}@{} ({}) to {}",
            job.repo_owner,
            job.repo_name,
            job.branch,
            current,
            job.deploy_path.display()
        );

        fsm.process(DeployEvent::Fetch).map_err(stage_error)?;
        let bytes = match self.github.download_archive(job).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fsm.process(DeployEvent::Error(e.to_string()));
                return Err(e);
            }
        };
        log.push(format!("downloaded snapshot ({} bytes)", bytes.len()));

        let snapshot_root = match archive::extract_snapshot(bytes, scratch.path()).await {
            Ok(root) => root,
            Err(e) => {
                let _ = fsm.process(DeployEvent::Error(e.to_string()));
                return Err(e);
            }
        };
        fsm.process(DeployEvent::Extracted).map_err(stage_error)?;
        log.push(format!(
            "extracted snapshot root {}",
            archive::snapshot_root_name(&job.repo_name, &job.branch)
        ));

        let change_set = self.resolve_change_set(job, last).await;

        fsm.process(DeployEvent::Sync).map_err(stage_error)?;
        fs::create_dir_all(&job.deploy_path).await?;

        let sync_result = match &change_set {
            Some(files) => {
                log.push(format!("incremental sync, {} changed files", files.len()));
                sync_incremental(
                    self.fileops.as_ref(),
                    &snapshot_root,
                    &job.deploy_path,
                    files,
                )
                .await
            }
            None => {
                log.push("full replace".to_string());
                sync_full(self.fileops.as_ref(), &snapshot_root, &job.deploy_path).await
            }
        };
        if let Err(e) = sync_result {
            let _ = fsm.process(DeployEvent::Error(e.to_string()));
            return Err(e);
        }

        if let Err(e) = self
            .fileops
            .chown_recursive(&job.deploy_path, &self.deploy_user)
            .await
        {
            warn!("Ownership fix-up failed: {}", e);
            log.push(format!("chown failed: {}", e));
        }

        // The deploy path reflects the new commit from here on, even
        // if the setup script later fails
        self.state.save(Some(current)).await?;
        log.push(format!("synced commit {}", current));

        let script = job.deploy_path.join(&job.setup_script);
        let setup = if file_present(&script).await {
            fsm.process(DeployEvent::Setup).map_err(stage_error)?;
            let outcome = self.run_setup(job, &script, &mut log).await;
            fsm.process(DeployEvent::SetupDone).map_err(stage_error)?;
            outcome
        } else {
            warn!("Setup script {} not found", script.display());
            log.push(format!("setup script {} not found", job.setup_script));
            fsm.process(DeployEvent::Finish).map_err(stage_error)?;
            SetupOutcome::NotFound
        };

        info!(
            "Deployed {}/{}@{} commit {}",
            job.repo_owner, job.repo_name, job.branch, current
        );

        Ok(DeployReport {
            commit: current.to_string(),
            setup,
            log: log.join("\n"),
        })
    }

    /// Decide between incremental sync (`Some(files)`) and full
    /// replace (`None`).
    async fn resolve_change_set(
        &self,
        job: &JobConfig,
        last: Option<&str>,
    ) -> Option<BTreeSet<PathBuf>> {
        if !job.update_only_changed_files {
            return None;
        }
        let last = last?;

        match self.tracker.commits_between(last, job).await {
            CommitRange::Exact(commits) if !commits.is_empty() => {
                let files = self.resolver.changed_files_for_range(&commits, job).await;
                if files.is_empty() {
                    warn!("Change set resolution came back empty, falling back to full replace");
                    None
                } else {
                    Some(files)
                }
            }
            CommitRange::Exact(_) => {
                warn!("No commit range available, falling back to full replace");
                None
            }
            CommitRange::BaseNotFound => {
                warn!(
                    "Previously deployed commit {} not found in branch history, \
                     falling back to full replace",
                    last
                );
                None
            }
        }
    }

    /// Run the setup script. `run_setup_script` selects the
    /// privileged invocation path; otherwise the script runs as the
    /// agent user.
    async fn run_setup(
        &self,
        job: &JobConfig,
        script: &Path,
        log: &mut Vec<String>,
    ) -> SetupOutcome {
        if let Err(e) = self.fileops.make_executable(script).await {
            error!("Failed to mark setup script executable: {}", e);
            log.push(format!("setup script not executable: {}", e));
            return SetupOutcome::Failed {
                code: None,
                output: e.to_string(),
            };
        }

        let result = if job.run_setup_script {
            self.fileops
                .run_script(script, &job.setup_args, &job.deploy_path)
                .await
        } else {
            DirectFileOps
                .run_script(script, &job.setup_args, &job.deploy_path)
                .await
        };

        match result {
            Ok(result) if result.success() => {
                info!("Setup script {} succeeded", job.setup_script);
                log.push(format!("setup script {} succeeded", job.setup_script));
                SetupOutcome::Succeeded
            }
            Ok(result) => {
                error!(
                    "Setup script {} failed with code {:?}",
                    job.setup_script, result.code
                );
                log.push(format!(
                    "setup script {} failed with code {:?}",
                    job.setup_script, result.code
                ));
                SetupOutcome::Failed {
                    code: result.code,
                    output: result.output,
                }
            }
            Err(e) => {
                error!("Setup script {} could not run: {}", job.setup_script, e);
                log.push(format!("setup script failed to start: {}", e));
                SetupOutcome::Failed {
                    code: None,
                    output: e.to_string(),
                }
            }
        }
    }
}

fn stage_error(msg: String) -> AgentError {
    AgentError::Internal(msg)
}

/// Non-blocking check that `path` exists and is a regular file
async fn file_present(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Replace the deploy path contents with the snapshot
pub async fn sync_full(
    fileops: &dyn FileOps,
    snapshot_root: &Path,
    deploy_path: &Path,
) -> Result<(), AgentError> {
    fileops.remove_tree_contents(deploy_path).await?;
    fileops.move_tree_contents(snapshot_root, deploy_path).await
}

/// Move only the changed files into the deploy path.
///
/// A changed file missing from the snapshot was deleted upstream and
/// is skipped; the deployed copy stays in place.
pub async fn sync_incremental(
    fileops: &dyn FileOps,
    snapshot_root: &Path,
    deploy_path: &Path,
    files: &BTreeSet<PathBuf>,
) -> Result<(), AgentError> {
    for file in files {
        let src = snapshot_root.join(file);
        if file_present(&src).await {
            fileops.move_file(&src, &deploy_path.join(file)).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, contents).await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_full_replaces_everything() {
        let scratch = tempfile::tempdir().unwrap();
        let deploy = tempfile::tempdir().unwrap();

        let root = scratch.path().join("site-main");
        write(&root.join("index.html"), "new").await;
        write(&root.join("css/style.css"), "new css").await;

        write(&deploy.path().join("index.html"), "old").await;
        write(&deploy.path().join("stale.txt"), "gone").await;

        sync_full(&DirectFileOps, &root, deploy.path())
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(deploy.path().join("index.html"))
                .await
                .unwrap(),
            "new"
        );
        assert_eq!(
            fs::read_to_string(deploy.path().join("css/style.css"))
                .await
                .unwrap(),
            "new css"
        );
        assert!(!deploy.path().join("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_sync_incremental_moves_only_change_set() {
        let scratch = tempfile::tempdir().unwrap();
        let deploy = tempfile::tempdir().unwrap();

        let root = scratch.path().join("site-main");
        write(&root.join("index.html"), "new").await;
        write(&root.join("untouched.html"), "snapshot copy").await;

        write(&deploy.path().join("index.html"), "old").await;
        write(&deploy.path().join("untouched.html"), "deployed copy").await;

        let files: BTreeSet<PathBuf> = [PathBuf::from("index.html")].into_iter().collect();
        sync_incremental(&DirectFileOps, &root, deploy.path(), &files)
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(deploy.path().join("index.html"))
                .await
                .unwrap(),
            "new"
        );
        // Files outside the change set stay as deployed
        assert_eq!(
            fs::read_to_string(deploy.path().join("untouched.html"))
                .await
                .unwrap(),
            "deployed copy"
        );
    }

    #[tokio::test]
    async fn test_sync_incremental_skips_files_missing_from_snapshot() {
        let scratch = tempfile::tempdir().unwrap();
        let deploy = tempfile::tempdir().unwrap();

        let root = scratch.path().join("site-main");
        fs::create_dir_all(&root).await.unwrap();
        write(&deploy.path().join("removed.html"), "old").await;

        let files: BTreeSet<PathBuf> = [PathBuf::from("removed.html")].into_iter().collect();
        sync_incremental(&DirectFileOps, &root, deploy.path(), &files)
            .await
            .unwrap();

        // Deleted upstream, but the deployed copy is left alone
        assert_eq!(
            fs::read_to_string(deploy.path().join("removed.html"))
                .await
                .unwrap(),
            "old"
        );
    }

    #[tokio::test]
    async fn test_file_present_only_for_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("setup.sh"), "#!/bin/sh").await;

        assert!(file_present(&dir.path().join("setup.sh")).await);
        assert!(!file_present(&dir.path().join("missing.sh")).await);
        assert!(!file_present(dir.path()).await);
    }
}
