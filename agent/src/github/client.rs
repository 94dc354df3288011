//! HTTP client for the GitHub API

use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, error};

use crate::errors::AgentError;
use crate::jobs::config::JobConfig;

/// Commit entry from the paginated history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
}

/// Single-commit detail including the touched files
#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub sha: String,
    #[serde(default)]
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitFile {
    pub filename: String,
}

/// HTTP client for the source-control hosting API.
///
/// Certificate verification is disabled on purpose: the agent is
/// routinely pointed at self-hosted forges behind self-signed
/// certificates, and callers must not depend on transport validation.
pub struct GithubClient {
    client: Client,
    api_base: String,
    download_base: String,
}

impl GithubClient {
    /// Create a client against the public GitHub endpoints
    pub fn new() -> Result<Self, AgentError> {
        Self::with_bases("https://api.github.com", "https://github.com")
    }

    /// Create a client with explicit endpoint bases
    pub fn with_bases(api_base: &str, download_base: &str) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .user_agent(concat!("deployd/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            download_base: download_base.trim_end_matches('/').to_string(),
        })
    }

    fn authorize(&self, request: RequestBuilder, job: &JobConfig) -> RequestBuilder {
        if job.github_token.is_empty() {
            request
        } else {
            request.header(
                header::AUTHORIZATION,
                format!("token {}", job.github_token),
            )
        }
    }

    /// Resolve the tip commit of the configured branch.
    ///
    /// Returns `Ok(None)` on any non-success status; callers treat
    /// that as "try again later", never as "no commits".
    pub async fn branch_tip(&self, job: &JobConfig) -> Result<Option<String>, AgentError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base, job.repo_owner, job.repo_name, job.branch
        );
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url), job).send().await?;
        if !response.status().is_success() {
            error!("Branch tip lookup failed: {}", response.status());
            return Ok(None);
        }

        let commit: CommitSummary = response.json().await?;
        Ok(Some(commit.sha))
    }

    /// Fetch one page of branch history, newest first.
    ///
    /// `Ok(None)` signals a non-success response.
    pub async fn commits_page(
        &self,
        job: &JobConfig,
        page: u32,
    ) -> Result<Option<Vec<CommitSummary>>, AgentError> {
        let url = format!(
            "{}/repos/{}/{}/commits?sha={}&per_page=100&page={}",
            self.api_base, job.repo_owner, job.repo_name, job.branch, page
        );
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url), job).send().await?;
        if !response.status().is_success() {
            error!("Commit history page {} failed: {}", page, response.status());
            return Ok(None);
        }

        let commits = response.json().await?;
        Ok(Some(commits))
    }

    /// Fetch the diff detail for a single commit.
    pub async fn commit_detail(
        &self,
        job: &JobConfig,
        sha: &str,
    ) -> Result<Option<CommitDetail>, AgentError> {
        let url = format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_base, job.repo_owner, job.repo_name, sha
        );
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url), job).send().await?;
        if !response.status().is_success() {
            error!("Commit detail for {} failed: {}", sha, response.status());
            return Ok(None);
        }

        let detail = response.json().await?;
        Ok(Some(detail))
    }

    /// Download the branch snapshot archive.
    pub async fn download_archive(&self, job: &JobConfig) -> Result<Vec<u8>, AgentError> {
        let url = format!(
            "{}/{}/{}/archive/refs/heads/{}.zip",
            self.download_base, job.repo_owner, job.repo_name, job.branch
        );
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url), job).send().await?;
        let status: StatusCode = response.status();
        if !status.is_success() {
            return Err(AgentError::DownloadError(format!(
                "snapshot download returned {}",
                status
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
