//! HTTP request handlers
//!
//! The deploy endpoint re-queues an already-processed job: the record
//! moves back into the pending inbox, where the watcher picks it up
//! and runs a fresh check. Optional query flags override the job's
//! setup and incremental-sync behavior for that run.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::server::state::ServerState;
use crate::utils::{parse_bool, version_info};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deployd".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub error: String,
    pub usage: String,
    pub available_files: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
}

/// Handler for `/deploy` without a filename: explain the contract
pub async fn deploy_usage_handler(
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    let available = available_files(&state).await;
    (
        StatusCode::BAD_REQUEST,
        Json(UsageResponse {
            error: "missing job filename".to_string(),
            usage: "/deploy/{filename}?run_setup_script=1&update_only_changed_files=1"
                .to_string(),
            available_files: available,
        }),
    )
}

/// Re-queue a processed job for an immediate check
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(filename): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let record_file = state.processed.file(&filename);
    if !record_file.exists().await {
        let available = available_files(&state).await;
        return (
            StatusCode::BAD_REQUEST,
            Json(UsageResponse {
                error: format!("unknown job file '{}'", filename),
                usage: "/deploy/{filename}?run_setup_script=1&update_only_changed_files=1"
                    .to_string(),
                available_files: available,
            }),
        )
            .into_response();
    }

    let mut record: Value = match record_file.read_json().await {
        Ok(record) => record,
        Err(e) => {
            error!("Failed to read job record {}: {}", filename, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(DeployResponse {
                    success: false,
                    message: format!("failed to read job record: {}", e),
                    filename,
                }),
            )
                .into_response();
        }
    };

    // Per-request overrides, applied to the record before re-queueing
    if let Some(fields) = record.as_object_mut() {
        for flag in ["run_setup_script", "update_only_changed_files"] {
            if let Some(value) = params.get(flag) {
                fields.insert(flag.to_string(), Value::Bool(parse_bool(value)));
            }
        }
    }

    if let Err(e) = state.pending.file(&filename).write_json(&record).await {
        error!("Failed to re-queue job {}: {}", filename, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DeployResponse {
                success: false,
                message: format!("failed to re-queue job: {}", e),
                filename,
            }),
        )
            .into_response();
    }
    if let Err(e) = record_file.delete().await {
        error!("Failed to remove processed record {}: {}", filename, e);
    }

    info!("Job {} re-queued for deployment", filename);
    (
        StatusCode::OK,
        Json(DeployResponse {
            success: true,
            message: "job queued for deployment".to_string(),
            filename,
        }),
    )
        .into_response()
}

async fn available_files(state: &ServerState) -> Vec<String> {
    match state.processed.list_files_with_extension("json").await {
        Ok(files) => files
            .iter()
            .filter_map(|p| p.file_name())
            .filter_map(|n| n.to_str())
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}
