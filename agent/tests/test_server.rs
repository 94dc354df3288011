//! Trigger server integration tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tower::ServiceExt;

use deployd::server::serve::router;
use deployd::server::state::ServerState;
use deployd::storage::layout::StorageLayout;

async fn harness() -> (TempDir, StorageLayout, axum::Router) {
    let base = TempDir::new().unwrap();
    let layout = StorageLayout::new(base.path());
    layout.setup().await.unwrap();
    let app = router(Arc::new(ServerState::new(&layout)));
    (base, layout, app)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_base, _layout, app) = harness().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "deployd");
}

#[tokio::test]
async fn test_deploy_without_filename_returns_usage() {
    let (_base, layout, app) = harness().await;
    std::fs::write(
        layout.processed_dir().path().join("site.json"),
        b"{}",
    )
    .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/deploy").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["usage"].as_str().unwrap().contains("/deploy/"));
    assert_eq!(body["available_files"][0], "site.json");
}

#[tokio::test]
async fn test_deploy_unknown_file_lists_available() {
    let (_base, layout, app) = harness().await;
    std::fs::write(
        layout.processed_dir().path().join("other.json"),
        b"{}",
    )
    .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/deploy/missing.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("missing.json"));
    assert_eq!(body["available_files"][0], "other.json");
}

#[tokio::test]
async fn test_deploy_requeues_record_with_overrides() {
    let (_base, layout, app) = harness().await;

    let record = serde_json::json!({
        "repo_owner": "acme",
        "repo_name": "site",
        "deploy_path": "/var/www/site",
        "run_setup_script": false,
        "last_commit": "abc123",
        "status": "success"
    });
    std::fs::write(
        layout.processed_dir().path().join("site.json"),
        serde_json::to_vec(&record).unwrap(),
    )
    .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/deploy/site.json?run_setup_script=1&update_only_changed_files=yes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    // Record moved back into the inbox with the overrides applied
    assert!(!layout.processed_dir().path().join("site.json").exists());
    let requeued: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(layout.pending_dir().path().join("site.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(requeued["run_setup_script"], true);
    assert_eq!(requeued["update_only_changed_files"], true);
    assert_eq!(requeued["last_commit"], "abc123");
}
