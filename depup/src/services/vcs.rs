//! Version control collaborator
//!
//! Clone, branch, commit and push are delegated to the `git` executable.
//! Repository URLs are parsed into an owner/name pair for the hosting API.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use depup_common::Error as CommonError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum VcsError {
    /// `git` could not be started
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    /// `git` exited non-zero
    #[error("git {command} failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Repository owner and name on the hosting service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn https_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse `https://github.com/owner/repo[.git]`, `git@github.com:owner/repo.git`
/// or `owner/repo`
pub fn parse_github_url(url: &str) -> Result<RepoRef, CommonError> {
    let trimmed = url.trim().trim_end_matches('/');
    let invalid = || {
        CommonError::InvalidInput(format!(
            "Invalid GitHub URL '{}': expected owner/repo or a github.com URL",
            url
        ))
    };

    let path = if let Some(rest) = trimmed.strip_prefix("git@") {
        rest.strip_prefix("github.com:").ok_or_else(invalid)?
    } else if let Some(rest) = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
    {
        let rest = rest.strip_prefix("www.").unwrap_or(rest);
        rest.strip_prefix("github.com/").ok_or_else(invalid)?
    } else if trimmed.contains("://") || trimmed.contains('@') {
        return Err(invalid());
    } else {
        trimmed
    };

    let path = path.strip_suffix(".git").unwrap_or(path);
    let mut segments = path.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(owner), Some(name), None) if !owner.trim().is_empty() && !name.trim().is_empty() => {
            Ok(RepoRef {
                owner: owner.trim().to_string(),
                name: name.trim().to_string(),
            })
        }
        _ => Err(invalid()),
    }
}

/// `{base}_{YYYYMMDD_HHMMSS}`
pub fn generate_branch_name(base: &str, at: DateTime<Local>) -> String {
    format!("{}_{}", base, at.format("%Y%m%d_%H%M%S"))
}

/// Working-tree operations needed for publication
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Clone `url` into `dest`, authenticating with `token` when given
    async fn clone_repo(&self, url: &str, token: Option<&str>, dest: &Path) -> Result<PathBuf, VcsError>;

    /// Create and check out a new branch
    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), VcsError>;

    /// Stage everything, commit and push `branch` to `origin`
    ///
    /// Returns `false` without committing when the working tree is clean.
    async fn commit_and_push(&self, repo: &Path, branch: &str, message: &str) -> Result<bool, VcsError>;
}

/// `git` command-line implementation
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    /// Committer identity passed with `-c user.name/-c user.email`
    identity: Option<(String, String)>,
    /// Skip `git push` (local-only runs and tests)
    push_enabled: bool,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            identity: None,
            push_enabled: true,
        }
    }

    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some((name.into(), email.into()));
        self
    }

    pub fn without_push(mut self) -> Self {
        self.push_enabled = false;
        self
    }

    async fn git(&self, repo: Option<&Path>, args: &[&str]) -> Result<String, VcsError> {
        let mut cmd = Command::new("git");
        if let Some(repo) = repo {
            cmd.arg("-C").arg(repo);
        }
        if let Some((name, email)) = &self.identity {
            cmd.arg("-c").arg(format!("user.name={}", name));
            cmd.arg("-c").arg(format!("user.email={}", email));
        }
        cmd.args(args);
        cmd.env("GIT_TERMINAL_PROMPT", "0");

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                status: output.status.to_string(),
                stderr: redact(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Insert `x-access-token:{token}@` into an https URL
fn authenticated_url(url: &str, token: Option<&str>) -> String {
    match (token, url.strip_prefix("https://")) {
        (Some(token), Some(rest)) if !token.is_empty() => {
            format!("https://x-access-token:{}@{}", token, rest)
        }
        _ => url.to_string(),
    }
}

/// Strip credentials from URLs echoed in git output
fn redact(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, part) in text.split("https://").enumerate() {
        if i > 0 {
            out.push_str("https://");
            match (part.find('@'), part.find(|c: char| c == '/' || c.is_whitespace())) {
                (Some(at), Some(end)) if at < end => {
                    out.push_str("***@");
                    out.push_str(&part[at + 1..]);
                    continue;
                }
                _ => {}
            }
        }
        out.push_str(part);
    }
    out
}

#[async_trait]
impl Vcs for GitCli {
    async fn clone_repo(&self, url: &str, token: Option<&str>, dest: &Path) -> Result<PathBuf, VcsError> {
        let remote = authenticated_url(url, token);
        let dest_str = dest.to_string_lossy();
        tracing::info!(url = %url, dest = %dest.display(), "Cloning repository");
        self.git(None, &["clone", "--", &remote, &dest_str]).await?;
        Ok(dest.to_path_buf())
    }

    async fn create_branch(&self, repo: &Path, branch: &str) -> Result<(), VcsError> {
        self.git(Some(repo), &["checkout", "-b", branch]).await?;
        tracing::info!(branch = %branch, "Switched to new branch");
        Ok(())
    }

    async fn commit_and_push(&self, repo: &Path, branch: &str, message: &str) -> Result<bool, VcsError> {
        self.git(Some(repo), &["add", "--all"]).await?;
        let status = self.git(Some(repo), &["status", "--porcelain"]).await?;
        if status.trim().is_empty() {
            tracing::info!("Working tree clean, nothing to commit");
            return Ok(false);
        }

        self.git(Some(repo), &["commit", "-m", message]).await?;
        if self.push_enabled {
            self.git(Some(repo), &["push", "-u", "origin", branch]).await?;
            tracing::info!(branch = %branch, "Pushed branch to origin");
        }
        Ok(true)
    }
}
