//! Job configuration model
//!
//! One configuration identifies one deployment target: a repository,
//! a branch and a filesystem deploy path. Files are dropped into the
//! pending directory as JSON, validated once, and persisted into the
//! processed area enriched with outcome metadata.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;

fn default_branch() -> String {
    "main".to_string()
}

fn default_setup_script() -> String {
    "setup.sh".to_string()
}

fn default_setup_args() -> String {
    "production".to_string()
}

/// A validated job configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Repository owner (user or organization)
    pub repo_owner: String,

    /// Repository name
    pub repo_name: String,

    /// Absolute filesystem location the snapshot is synced to
    pub deploy_path: PathBuf,

    /// API bearer token; empty means unauthenticated
    #[serde(default)]
    pub github_token: String,

    /// Branch to track
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Setup script name, resolved relative to the deploy path root
    #[serde(default = "default_setup_script")]
    pub setup_script: String,

    /// Arguments passed to the setup script
    #[serde(default = "default_setup_args")]
    pub setup_args: String,

    /// Run the setup script through the privileged path
    #[serde(default)]
    pub run_setup_script: bool,

    /// Sync only files touched since the last deployed commit
    #[serde(default)]
    pub update_only_changed_files: bool,
}

/// Raw, unvalidated shape of a dropped-in configuration file.
///
/// Unknown fields are ignored so a processed job record (config plus
/// outcome metadata) parses back into this.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobConfig {
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub deploy_path: Option<String>,
    pub github_token: Option<String>,
    pub branch: Option<String>,
    pub setup_script: Option<String>,
    pub setup_args: Option<String>,
    pub run_setup_script: Option<bool>,
    pub update_only_changed_files: Option<bool>,
}

impl RawJobConfig {
    /// Validate required fields and back-fill optional ones.
    ///
    /// Required fields must be present and non-empty. Optional string
    /// fields that are absent *or empty* receive their documented
    /// default, matching the original falsy-means-default contract.
    pub fn validate(self) -> Result<JobConfig, AgentError> {
        let repo_owner = require("repo_owner", self.repo_owner)?;
        let repo_name = require("repo_name", self.repo_name)?;
        let deploy_path = require("deploy_path", self.deploy_path)?;

        Ok(JobConfig {
            repo_owner,
            repo_name,
            deploy_path: PathBuf::from(deploy_path),
            github_token: self.github_token.unwrap_or_default(),
            branch: fill(self.branch, default_branch),
            setup_script: fill(self.setup_script, default_setup_script),
            setup_args: fill(self.setup_args, default_setup_args),
            run_setup_script: self.run_setup_script.unwrap_or(false),
            update_only_changed_files: self.update_only_changed_files.unwrap_or(false),
        })
    }
}

fn require(name: &str, value: Option<String>) -> Result<String, AgentError> {
    match value {
        None => Err(AgentError::MissingField(name.to_string())),
        Some(v) if v.is_empty() => Err(AgentError::EmptyField(name.to_string())),
        Some(v) => Ok(v),
    }
}

fn fill(value: Option<String>, default: fn() -> String) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => default(),
    }
}

/// Outcome status persisted into a processed job record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// A processed job record: the config plus outcome metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(flatten)]
    pub config: JobConfig,

    pub last_commit: Option<String>,
    pub last_update: String,
    pub status: JobStatus,
    pub update_log: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(json: &str) -> RawJobConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_validate_minimal_config_backfills_defaults() {
        let config = raw(
            r#"{"repo_owner": "acme", "repo_name": "site", "deploy_path": "/var/www/site"}"#,
        )
        .validate()
        .unwrap();

        assert_eq!(config.branch, "main");
        assert_eq!(config.setup_script, "setup.sh");
        assert_eq!(config.setup_args, "production");
        assert_eq!(config.github_token, "");
        assert!(!config.run_setup_script);
        assert!(!config.update_only_changed_files);
    }

    #[test]
    fn test_validate_missing_deploy_path() {
        let err = raw(r#"{"repo_owner": "acme", "repo_name": "site"}"#)
            .validate()
            .unwrap_err();
        assert!(matches!(err, AgentError::MissingField(f) if f == "deploy_path"));
    }

    #[test]
    fn test_validate_empty_required_field() {
        let err = raw(r#"{"repo_owner": "", "repo_name": "site", "deploy_path": "/x"}"#)
            .validate()
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyField(f) if f == "repo_owner"));
    }

    #[test]
    fn test_validate_empty_optional_gets_default() {
        let config = raw(
            r#"{"repo_owner": "acme", "repo_name": "site", "deploy_path": "/x", "branch": ""}"#,
        )
        .validate()
        .unwrap();
        assert_eq!(config.branch, "main");
    }

    #[test]
    fn test_record_reparses_as_raw_config() {
        let config = raw(
            r#"{"repo_owner": "acme", "repo_name": "site", "deploy_path": "/x", "branch": "dev"}"#,
        )
        .validate()
        .unwrap();

        let record = JobRecord {
            config,
            last_commit: Some("abc".to_string()),
            last_update: "2024-01-01 00:00:00".to_string(),
            status: JobStatus::Success,
            update_log: "ok".to_string(),
        };

        let json = serde_json::to_string(&record).unwrap();
        let reparsed: RawJobConfig = serde_json::from_str(&json).unwrap();
        let config = reparsed.validate().unwrap();
        assert_eq!(config.branch, "dev");
    }
}
