//! Code hosting collaborator (pull requests)

use super::vcs::RepoRef;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("depup/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum HostingError {
    #[error("No access token provided")]
    MissingToken,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Hosting API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Pull request to open
#[derive(Debug, Clone, Serialize)]
pub struct PullRequestSpec {
    pub title: String,
    /// Source branch
    pub head: String,
    /// Target branch
    pub base: String,
    pub body: String,
}

/// Opened pull request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PullRequest {
    pub html_url: String,
    #[serde(default)]
    pub number: u64,
}

#[async_trait]
pub trait PullRequestHost: Send + Sync {
    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
        spec: &PullRequestSpec,
    ) -> Result<PullRequest, HostingError>;
}

/// GitHub REST API client
pub struct GitHubClient {
    client: Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(api_base: &str) -> Result<Self, HostingError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HostingError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn pulls_url(&self, repo: &RepoRef) -> String {
        format!("{}/repos/{}/{}/pulls", self.api_base, repo.owner, repo.name)
    }
}

#[async_trait]
impl PullRequestHost for GitHubClient {
    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        token: Option<&str>,
        spec: &PullRequestSpec,
    ) -> Result<PullRequest, HostingError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(HostingError::MissingToken)?;

        tracing::info!(repo = %repo, head = %spec.head, base = %spec.base, "Opening pull request");

        let response = self
            .client
            .post(self.pulls_url(repo))
            .header(header::AUTHORIZATION, format!("token {}", token))
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .json(spec)
            .send()
            .await
            .map_err(|e| HostingError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HostingError::Api(status.as_u16(), text));
        }

        response
            .json::<PullRequest>()
            .await
            .map_err(|e| HostingError::Parse(e.to_string()))
    }
}
