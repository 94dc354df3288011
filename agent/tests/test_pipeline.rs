//! Config pipeline integration tests
//!
//! The GitHub client points at an unreachable endpoint, so every
//! check resolves to "branch tip unavailable". That exercises the
//! whole pending -> processed flow without touching the network.

use std::sync::Arc;

use tempfile::TempDir;

use deployd::deploy::engine::DeploymentEngine;
use deployd::deploy::fileops::DirectFileOps;
use deployd::github::client::GithubClient;
use deployd::jobs::config::{JobStatus, RawJobConfig};
use deployd::jobs::lifecycle::{ConfigLifecycle, StageOutcome};
use deployd::jobs::runner::JobRunner;
use deployd::storage::layout::StorageLayout;
use deployd::storage::state::StateStore;
use deployd::workers::scheduler;

struct Harness {
    _base: TempDir,
    layout: StorageLayout,
    lifecycle: ConfigLifecycle,
    runner: Arc<JobRunner>,
}

async fn harness() -> Harness {
    let base = TempDir::new().unwrap();
    let layout = StorageLayout::new(base.path());
    layout.setup().await.unwrap();

    // Nothing listens on port 9; every API call fails fast
    let github =
        Arc::new(GithubClient::with_bases("http://127.0.0.1:9", "http://127.0.0.1:9").unwrap());
    let state = StateStore::new(layout.state_file());
    let engine = DeploymentEngine::new(
        github.clone(),
        state.clone(),
        Arc::new(DirectFileOps),
        String::new(),
    );
    let runner = Arc::new(JobRunner::new(github, engine, state));
    let lifecycle = ConfigLifecycle::new(&layout, runner.clone());

    Harness {
        _base: base,
        layout,
        lifecycle,
        runner,
    }
}

#[tokio::test]
async fn test_valid_config_is_staged_and_inbox_cleared() {
    let h = harness().await;
    let deploy_dir = TempDir::new().unwrap();

    let pending = h.layout.pending_dir().path().join("site.json");
    std::fs::write(
        &pending,
        format!(
            r#"{{"repo_owner": "acme", "repo_name": "site", "deploy_path": "{}"}}"#,
            deploy_dir.path().display()
        ),
    )
    .unwrap();

    let outcome = h.lifecycle.stage(&pending).await.unwrap();
    // Branch tip is unreachable, so the first check fails
    assert!(matches!(
        outcome,
        StageOutcome::Staged {
            status: JobStatus::Failed
        }
    ));

    assert!(!pending.exists());
    let record_path = h.layout.processed_dir().path().join("site.json");
    assert!(record_path.exists());

    // The record round-trips back into a valid config
    let contents = std::fs::read_to_string(&record_path).unwrap();
    let raw: RawJobConfig = serde_json::from_str(&contents).unwrap();
    let config = raw.validate().unwrap();
    assert_eq!(config.repo_owner, "acme");
    assert_eq!(config.branch, "main");

    let record: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(record["status"], "failed");
    assert_eq!(record["last_commit"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_and_deleted() {
    let h = harness().await;

    let pending = h.layout.pending_dir().path().join("broken.json");
    std::fs::write(&pending, r#"{"repo_owner": "acme"}"#).unwrap();

    let outcome = h.lifecycle.stage(&pending).await.unwrap();
    assert!(matches!(outcome, StageOutcome::Rejected { .. }));

    assert!(!pending.exists());
    assert!(!h.layout.processed_dir().path().join("broken.json").exists());
}

#[tokio::test]
async fn test_unparsable_config_is_rejected_and_deleted() {
    let h = harness().await;

    let pending = h.layout.pending_dir().path().join("garbage.json");
    std::fs::write(&pending, b"this is not json").unwrap();

    let outcome = h.lifecycle.stage(&pending).await.unwrap();
    match outcome {
        StageOutcome::Rejected { reason } => assert!(reason.contains("invalid JSON")),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(!pending.exists());
}

#[tokio::test]
async fn test_drain_pending_stages_everything() {
    let h = harness().await;
    let deploy_dir = TempDir::new().unwrap();

    for name in ["a.json", "b.json"] {
        std::fs::write(
            h.layout.pending_dir().path().join(name),
            format!(
                r#"{{"repo_owner": "acme", "repo_name": "site", "deploy_path": "{}"}}"#,
                deploy_dir.path().display()
            ),
        )
        .unwrap();
    }
    // Non-JSON files stay untouched
    std::fs::write(h.layout.pending_dir().path().join("notes.txt"), b"hi").unwrap();

    scheduler::drain_pending(&h.lifecycle).await;

    let processed_dir = h.layout.processed_dir();
    let processed = processed_dir.path();
    assert!(processed.join("a.json").exists());
    assert!(processed.join("b.json").exists());
    assert!(h.layout.pending_dir().path().join("notes.txt").exists());
}

#[tokio::test]
async fn test_sweep_isolates_bad_records() {
    let h = harness().await;
    let deploy_dir = TempDir::new().unwrap();

    let processed_dir = h.layout.processed_dir();
    let processed = processed_dir.path();
    std::fs::write(processed.join("bad.json"), b"not json").unwrap();
    std::fs::write(
        processed.join("good.json"),
        format!(
            r#"{{"repo_owner": "acme", "repo_name": "site", "deploy_path": "{}"}}"#,
            deploy_dir.path().display()
        ),
    )
    .unwrap();

    let stats = scheduler::sweep_once(&h.lifecycle, h.runner.as_ref()).await;

    // Only the readable record was checked; the unreachable API means
    // no deployment was attempted and the record stays as-is
    assert_eq!(stats.checked, 1);
    assert_eq!(stats.deployed, 0);
    assert_eq!(stats.failed, 0);
    assert!(processed.join("bad.json").exists());
    assert!(processed.join("good.json").exists());
}
