//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::deploy::engine::DeploymentEngine;
use crate::deploy::fileops::{FileOps, SudoFileOps};
use crate::errors::AgentError;
use crate::github::client::GithubClient;
use crate::jobs::lifecycle::ConfigLifecycle;
use crate::jobs::runner::JobRunner;
use crate::storage::layout::StorageLayout;
use crate::storage::state::StateStore;

/// Main application state
pub struct AppState {
    /// GitHub API client, shared by every component
    pub github: Arc<GithubClient>,

    /// Last-deployed-commit store
    pub state: StateStore,

    /// Update check driver
    pub runner: Arc<JobRunner>,

    /// Config file pipeline
    pub lifecycle: Arc<ConfigLifecycle>,
}

impl AppState {
    /// Initialize application state
    pub fn init(layout: &StorageLayout, deploy_user: String) -> Result<Self, AgentError> {
        info!("Initializing application state...");

        let github = Arc::new(GithubClient::new()?);
        let state = StateStore::new(layout.state_file());
        let fileops: Arc<dyn FileOps> = Arc::new(SudoFileOps);

        let engine = DeploymentEngine::new(
            github.clone(),
            state.clone(),
            fileops,
            deploy_user,
        );
        let runner = Arc::new(JobRunner::new(github.clone(), engine, state.clone()));
        let lifecycle = Arc::new(ConfigLifecycle::new(layout, runner.clone()));

        Ok(Self {
            github,
            state,
            runner,
            lifecycle,
        })
    }
}
