//! Change-set resolution
//!
//! Extracts the set of repository-relative paths touched by one or
//! more commits. Destination parent directories are pre-created under
//! the deploy path because the subsequent move step assumes they
//! exist.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, error, warn};

use crate::github::client::GithubClient;
use crate::jobs::config::JobConfig;

/// Resolves which files a commit (or a range of commits) touched
pub struct ChangeSetResolver {
    client: Arc<GithubClient>,
}

impl ChangeSetResolver {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }

    /// Files touched by a single commit.
    ///
    /// An unavailable diff yields an empty set; the caller decides
    /// whether that warrants a fallback.
    pub async fn changed_files(&self, sha: &str, job: &JobConfig) -> BTreeSet<PathBuf> {
        let detail = match self.client.commit_detail(job, sha).await {
            Ok(Some(detail)) => detail,
            Ok(None) => {
                warn!("Diff for commit {} unavailable", sha);
                return BTreeSet::new();
            }
            Err(e) => {
                error!("Failed to fetch diff for commit {}: {}", sha, e);
                return BTreeSet::new();
            }
        };

        let mut files = BTreeSet::new();
        for file in detail.files {
            let path = PathBuf::from(&file.filename);

            // Scaffold the destination directory ahead of the move
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    let dst_dir = job.deploy_path.join(parent);
                    if let Err(e) = fs::create_dir_all(&dst_dir).await {
                        warn!("Failed to pre-create {}: {}", dst_dir.display(), e);
                    }
                }
            }

            files.insert(path);
        }

        debug!("Commit {} touched {} files", sha, files.len());
        files
    }

    /// Union of touched files across every commit in the range
    pub async fn changed_files_for_range(
        &self,
        commits: &[String],
        job: &JobConfig,
    ) -> BTreeSet<PathBuf> {
        let mut all = BTreeSet::new();
        for sha in commits {
            all.extend(self.changed_files(sha, job).await);
        }
        all
    }
}
