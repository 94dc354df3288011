//! Commit tracking
//!
//! Resolves "latest commit" and "commits between A and B" for a
//! tracked branch. Stateless; every call goes through the API client.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::github::client::GithubClient;
use crate::jobs::config::JobConfig;

/// Result of a commit range query
#[derive(Debug, Clone, PartialEq)]
pub enum CommitRange {
    /// Commits oldest first, base excluded, head included
    Exact(Vec<String>),

    /// The base commit was not found anywhere in the available
    /// history; the caller should fall back to a full replace
    BaseNotFound,
}

/// Commit tracker over the hosting API
pub struct CommitTracker {
    client: Arc<GithubClient>,
}

impl CommitTracker {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }

    /// Resolve the tip of the job's branch.
    ///
    /// `None` means "unavailable, try again later" and covers both
    /// transport failures and non-success responses.
    pub async fn latest(&self, job: &JobConfig) -> Option<String> {
        match self.client.branch_tip(job).await {
            Ok(tip) => tip,
            Err(e) => {
                error!(
                    "Failed to resolve tip of {}/{}@{}: {}",
                    job.repo_owner, job.repo_name, job.branch, e
                );
                None
            }
        }
    }

    /// Commits between `base` (excluded) and the branch tip
    /// (included), oldest first.
    ///
    /// Paginates the history endpoint until `base` is observed. Any
    /// API failure terminates the walk with an empty exact range
    /// rather than looping; exhausting history without seeing `base`
    /// yields [`CommitRange::BaseNotFound`].
    pub async fn commits_between(&self, base: &str, job: &JobConfig) -> CommitRange {
        let mut newest_first: Vec<String> = Vec::new();
        let mut page: u32 = 1;

        loop {
            let batch = match self.client.commits_page(job, page).await {
                Ok(Some(batch)) => batch,
                Ok(None) => {
                    warn!("Commit history unavailable, returning empty range");
                    return CommitRange::Exact(Vec::new());
                }
                Err(e) => {
                    error!("Commit history query failed: {}", e);
                    return CommitRange::Exact(Vec::new());
                }
            };

            if batch.is_empty() {
                debug!("History exhausted without finding base {}", base);
                return CommitRange::BaseNotFound;
            }

            for commit in batch {
                if commit.sha == base {
                    newest_first.reverse();
                    return CommitRange::Exact(newest_first);
                }
                newest_first.push(commit.sha);
            }

            page += 1;
        }
    }
}
