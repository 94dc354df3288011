//! Scheduler worker
//!
//! Drives the config pipeline: drains the pending inbox at startup,
//! stages configs as the watcher reports them, and periodically
//! re-checks every processed job for new commits.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use crate::jobs::config::RawJobConfig;
use crate::jobs::lifecycle::{record_from_outcome, ConfigLifecycle};
use crate::jobs::runner::{CheckOutcome, JobRunner};

/// Settle time after an inbox event before the file is read
const SETTLE_MS: u64 = 100;

/// Scheduler worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between periodic sweeps of processed jobs
    pub sweep_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1200),
        }
    }
}

/// Outcome counters for one sweep of the processed directory
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub checked: usize,
    pub deployed: usize,
    pub failed: usize,
}

/// Run the scheduler worker
pub async fn run<S, F>(
    options: &Options,
    lifecycle: &ConfigLifecycle,
    runner: &JobRunner,
    mut watch_rx: UnboundedReceiver<PathBuf>,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Scheduler worker starting...");

    // Configs dropped in while the agent was down
    drain_pending(lifecycle).await;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Scheduler worker shutting down...");
                return;
            }
            event = watch_rx.recv() => {
                match event {
                    Some(first) => {
                        let batch = collect_burst(first, &mut watch_rx).await;
                        for path in batch {
                            stage_one(lifecycle, &path).await;
                        }
                    }
                    None => {
                        warn!("Inbox watcher channel closed");
                        return;
                    }
                }
            }
            _ = sleep_fn(options.sweep_interval) => {
                let stats = sweep_once(lifecycle, runner).await;
                debug!(
                    "Sweep finished: {} checked, {} deployed, {} failed",
                    stats.checked, stats.deployed, stats.failed
                );
            }
        }
    }
}

/// Stage everything currently sitting in the pending inbox
pub async fn drain_pending(lifecycle: &ConfigLifecycle) {
    let files = match lifecycle.pending().list_files_with_extension("json").await {
        Ok(files) => files,
        Err(e) => {
            error!("Failed to list pending configs: {}", e);
            return;
        }
    };

    if !files.is_empty() {
        info!("Draining {} pending configs", files.len());
    }
    for path in files {
        stage_one(lifecycle, &path).await;
    }
}

/// Re-check every processed job once.
///
/// Records are rewritten only when a deployment was attempted; a job
/// that is up to date or unreachable keeps its last record. One job
/// failing never stops the sweep.
pub async fn sweep_once(lifecycle: &ConfigLifecycle, runner: &JobRunner) -> SweepStats {
    let mut stats = SweepStats::default();

    let files = match lifecycle
        .processed()
        .list_files_with_extension("json")
        .await
    {
        Ok(files) => files,
        Err(e) => {
            error!("Failed to list processed jobs: {}", e);
            return stats;
        }
    };

    for path in files {
        let file = crate::filesys::file::File::new(&path);
        let raw: RawJobConfig = match file.read_json().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping unreadable job record {}: {}", path.display(), e);
                continue;
            }
        };
        let config = match raw.validate() {
            Ok(config) => config,
            Err(e) => {
                warn!("Skipping invalid job record {}: {}", path.display(), e);
                continue;
            }
        };

        stats.checked += 1;
        let outcome = runner.check_and_deploy(&config).await;
        match &outcome {
            CheckOutcome::Deployed { commit, .. } => {
                info!("Job {} deployed commit {}", path.display(), commit);
                stats.deployed += 1;
                write_record(&file, config, &outcome).await;
            }
            CheckOutcome::DeployFailed { commit, error } => {
                error!(
                    "Job {} failed to deploy commit {}: {}",
                    path.display(),
                    commit,
                    error
                );
                stats.failed += 1;
                write_record(&file, config, &outcome).await;
            }
            CheckOutcome::UpToDate { .. } | CheckOutcome::Unavailable => {}
        }
    }

    stats
}

async fn write_record(
    file: &crate::filesys::file::File,
    config: crate::jobs::config::JobConfig,
    outcome: &CheckOutcome,
) {
    let record = record_from_outcome(config, outcome);
    if let Err(e) = file.write_json(&record).await {
        error!(
            "Failed to rewrite job record {}: {}",
            file.path().display(),
            e
        );
    }
}

async fn stage_one(lifecycle: &ConfigLifecycle, path: &PathBuf) {
    // The watcher can outrun staging; the file may already be gone
    if !path.exists() {
        return;
    }
    if let Err(e) = lifecycle.stage(path).await {
        error!("Failed to stage config {}: {}", path.display(), e);
    }
}

/// Collect a burst of inbox events into a deduplicated batch.
///
/// Editors and atomic renames fire several events per file; a short
/// settle delay lets the writes finish before the batch is staged.
async fn collect_burst(
    first: PathBuf,
    rx: &mut UnboundedReceiver<PathBuf>,
) -> BTreeSet<PathBuf> {
    tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;

    let mut batch = BTreeSet::new();
    batch.insert(first);
    while let Ok(path) = rx.try_recv() {
        batch.insert(path);
    }
    batch
}
