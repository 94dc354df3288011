//! Config file lifecycle
//!
//! Dropped-in job configs move through a one-way pipeline: a JSON
//! file appears in the pending directory, gets validated and checked
//! once, and its enriched record lands in the processed directory.
//! The pending file is deleted in every case so a bad config cannot
//! wedge the inbox.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::jobs::config::{JobConfig, JobRecord, JobStatus, RawJobConfig};
use crate::jobs::runner::{CheckOutcome, JobRunner};
use crate::storage::layout::StorageLayout;
use crate::utils;

/// What happened to a staged config file
#[derive(Debug)]
pub enum StageOutcome {
    /// Config was invalid and the file was discarded
    Rejected { reason: String },

    /// Config was accepted; the record is in the processed directory
    Staged { status: JobStatus },
}

/// Moves configs from the pending inbox into the processed area
pub struct ConfigLifecycle {
    pending: Dir,
    processed: Dir,
    runner: Arc<JobRunner>,
}

impl ConfigLifecycle {
    pub fn new(layout: &StorageLayout, runner: Arc<JobRunner>) -> Self {
        Self {
            pending: layout.pending_dir(),
            processed: layout.processed_dir(),
            runner,
        }
    }

    /// The pending inbox directory
    pub fn pending(&self) -> &Dir {
        &self.pending
    }

    /// The processed records directory
    pub fn processed(&self) -> &Dir {
        &self.processed
    }

    /// Stage one pending config file.
    ///
    /// The file is parsed, validated, checked once and its record
    /// written into the processed directory. The inbox file is
    /// removed whether staging succeeds or not.
    pub async fn stage(&self, path: &Path) -> Result<StageOutcome, AgentError> {
        let file = File::new(path);
        let name = file
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AgentError::ConfigError("config file has no name".to_string()))?;

        info!("Staging config {}", name);
        let outcome = self.stage_inner(&file, &name).await;

        if let Err(e) = file.delete().await {
            warn!("Failed to remove pending config {}: {}", name, e);
        }

        outcome
    }

    async fn stage_inner(&self, file: &File, name: &str) -> Result<StageOutcome, AgentError> {
        let raw: RawJobConfig = match file.read_json().await {
            Ok(raw) => raw,
            Err(e) => {
                error!("Config {} is not valid JSON: {}", name, e);
                return Ok(StageOutcome::Rejected {
                    reason: format!("invalid JSON: {}", e),
                });
            }
        };

        let config = match raw.validate() {
            Ok(config) => config,
            Err(e) => {
                error!("Config {} rejected: {}", name, e);
                return Ok(StageOutcome::Rejected {
                    reason: e.to_string(),
                });
            }
        };

        let outcome = self.runner.check_and_deploy(&config).await;
        let record = record_from_outcome(config, &outcome);
        let status = record.status;

        self.processed.create().await?;
        self.processed.file(name).write_json(&record).await?;
        info!("Config {} staged with status {:?}", name, status);

        Ok(StageOutcome::Staged { status })
    }
}

/// Build the persisted record for a config after one check
pub fn record_from_outcome(config: JobConfig, outcome: &CheckOutcome) -> JobRecord {
    let (last_commit, status, update_log) = match outcome {
        CheckOutcome::Unavailable => (
            None,
            JobStatus::Failed,
            "branch tip unavailable".to_string(),
        ),
        CheckOutcome::UpToDate { commit } => (
            Some(commit.clone()),
            JobStatus::Success,
            "already up to date".to_string(),
        ),
        CheckOutcome::Deployed { commit, report } => {
            (Some(commit.clone()), JobStatus::Success, report.log.clone())
        }
        CheckOutcome::DeployFailed { commit, error } => (
            Some(commit.clone()),
            JobStatus::Failed,
            format!("deployment failed: {}", error),
        ),
    };

    JobRecord {
        config,
        last_commit,
        last_update: utils::timestamp(),
        status,
        update_log,
    }
}
