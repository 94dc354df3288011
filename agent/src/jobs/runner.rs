//! Update check and deployment driver
//!
//! Compares the tracked branch tip against the last deployed commit
//! and runs the engine when they differ.

use std::sync::Arc;

use tracing::{error, info};

use crate::deploy::engine::{DeployReport, DeploymentEngine};
use crate::errors::AgentError;
use crate::github::client::GithubClient;
use crate::github::commits::CommitTracker;
use crate::jobs::config::JobConfig;
use crate::storage::state::StateStore;

/// Result of one update check
#[derive(Debug)]
pub enum CheckOutcome {
    /// The branch tip could not be resolved; try again later
    Unavailable,

    /// Deploy path already reflects the branch tip
    UpToDate { commit: String },

    /// A new commit was deployed
    Deployed {
        commit: String,
        report: DeployReport,
    },

    /// A new commit was found but the deployment failed
    DeployFailed {
        commit: String,
        error: AgentError,
    },
}

/// Runs update checks for configured jobs
pub struct JobRunner {
    tracker: CommitTracker,
    engine: DeploymentEngine,
    state: StateStore,
}

impl JobRunner {
    pub fn new(github: Arc<GithubClient>, engine: DeploymentEngine, state: StateStore) -> Self {
        Self {
            tracker: CommitTracker::new(github),
            engine,
            state,
        }
    }

    /// Check the job's branch for a new commit and deploy it if found
    pub async fn check_and_deploy(&self, job: &JobConfig) -> CheckOutcome {
        let current = match self.tracker.latest(job).await {
            Some(commit) => commit,
            None => {
                info!(
                    "Branch tip for {}/{}@{} unavailable, skipping",
                    job.repo_owner, job.repo_name, job.branch
                );
                return CheckOutcome::Unavailable;
            }
        };

        let last = self.state.load().await;
        if last.as_deref() == Some(current.as_str()) {
            info!(
                "{}/{}@{} is up to date at {}",
                job.repo_owner, job.repo_name, job.branch, current
            );
            return CheckOutcome::UpToDate { commit: current };
        }

        match self.engine.deploy(job, &current, last.as_deref()).await {
            Ok(report) => CheckOutcome::Deployed {
                commit: current,
                report,
            },
            Err(e) => {
                error!(
                    "Deployment of {}/{}@{} commit {} failed: {}",
                    job.repo_owner, job.repo_name, job.branch, current, e
                );
                CheckOutcome::DeployFailed {
                    commit: current,
                    error: e,
                }
            }
        }
    }
}
