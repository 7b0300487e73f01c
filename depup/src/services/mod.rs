//! External collaborators
//!
//! Every collaborator sits behind an async trait so the pipeline can be driven
//! by in-memory implementations in tests.
//!
//! - **reasoning** - OpenAI-compatible chat completions (insights and patches)
//! - **search** - web search for upgrade context
//! - **vcs** - clone/branch/commit/push via `git`
//! - **hosting** - pull requests via the GitHub API

pub mod hosting;
pub mod reasoning;
pub mod search;
pub mod vcs;

pub use hosting::{GitHubClient, HostingError, PullRequest, PullRequestHost, PullRequestSpec};
pub use reasoning::{
    CompletionRequest, CompletionResponse, OpenAiCompatibleBackend, ReasoningBackend, ReasoningError,
};
pub use search::{SearchError, SearchHit, SearchService, TavilyClient};
pub use vcs::{generate_branch_name, parse_github_url, GitCli, RepoRef, Vcs, VcsError};
