//! Deployment primitive integration tests

#![cfg(unix)]

use std::path::Path;

use tempfile::TempDir;

use deployd::deploy::fileops::{DirectFileOps, FileOps};

async fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    DirectFileOps.make_executable(&path).await.unwrap();
    path
}

#[tokio::test]
async fn test_run_script_captures_exit_code_and_output() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "setup.sh", "echo building; echo oops >&2; exit 3").await;

    let result = DirectFileOps
        .run_script(&script, "production", dir.path())
        .await
        .unwrap();

    assert_eq!(result.code, Some(3));
    assert!(!result.success());
    assert!(result.output.contains("building"));
    assert!(result.output.contains("oops"));
}

#[tokio::test]
async fn test_run_script_passes_args_and_workdir() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "setup.sh", "echo \"$1\" > args.txt").await;

    let result = DirectFileOps
        .run_script(&script, "production", dir.path())
        .await
        .unwrap();

    assert!(result.success());
    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    assert_eq!(args.trim(), "production");
}

#[tokio::test]
async fn test_run_script_missing_binary_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = DirectFileOps
        .run_script(Path::new("/nonexistent/setup.sh"), "production", dir.path())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to spawn"));
}
