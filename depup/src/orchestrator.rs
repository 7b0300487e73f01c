//! Publication orchestrator
//!
//! State progression (linear, each transition attempted once per run):
//! CLONED → BRANCHED → ANALYZED → PATCHED → COMMITTED → PR_OPENED
//!
//! A failed stage stops the run. Work already done (branch, local commits,
//! rewritten files) is left in place and the summary names the failed stage
//! and the branch so it can be cleaned up by hand.

use crate::error::PipelineError;
use crate::insight::InsightSynthesizer;
use crate::manifest::{self, ManifestRewrite};
use crate::patcher::{CodePatcher, PatchReport};
use crate::registry::{MavenRegistryClient, VersionResolver, VersionSource};
use crate::services::{
    generate_branch_name, parse_github_url, GitCli, GitHubClient, OpenAiCompatibleBackend, PullRequestHost,
    PullRequestSpec, ReasoningBackend, RepoRef, SearchService, TavilyClient, Vcs,
};
use crate::tasks;
use crate::types::{DependencyMap, InsightMap, Severity};
use chrono::{DateTime, Local, Utc};
use depup_common::config::TomlConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Publication state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Fresh working tree available
    Cloned,
    /// Upgrade branch created and checked out
    Branched,
    /// Dependencies parsed, resolved, analyzed; tasks extracted
    Analyzed,
    /// Manifest rewritten and source files patched
    Patched,
    /// Changes committed and pushed
    Committed,
    /// Pull request opened
    PrOpened,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Cloned => "CLONED",
            RunState::Branched => "BRANCHED",
            RunState::Analyzed => "ANALYZED",
            RunState::Patched => "PATCHED",
            RunState::Committed => "COMMITTED",
            RunState::PrOpened => "PR_OPENED",
        }
    }

    pub fn next(&self) -> Option<RunState> {
        match self {
            RunState::Cloned => Some(RunState::Branched),
            RunState::Branched => Some(RunState::Analyzed),
            RunState::Analyzed => Some(RunState::Patched),
            RunState::Patched => Some(RunState::Committed),
            RunState::Committed => Some(RunState::PrOpened),
            RunState::PrOpened => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborators and tuning for one or more runs
///
/// Built once by the caller and passed by reference to every stage.
pub struct PipelineContext {
    pub versions: Arc<dyn VersionSource>,
    pub search: Arc<dyn SearchService>,
    pub reasoning: Arc<dyn ReasoningBackend>,
    pub vcs: Arc<dyn Vcs>,
    pub host: Arc<dyn PullRequestHost>,
    pub config: TomlConfig,
}

impl PipelineContext {
    /// Production collaborators from configuration and resolved secrets
    pub fn from_config(
        config: TomlConfig,
        reasoning_key: Option<String>,
        search_key: Option<String>,
    ) -> depup_common::Result<Self> {
        let internal = |what: &str, e: &dyn fmt::Display| depup_common::Error::Internal(format!("{}: {}", what, e));

        let versions = MavenRegistryClient::new(&config.registry.base_url, config.registry.timeout())
            .map_err(|e| internal("Registry client", &e))?;
        let search = TavilyClient::new(&config.search, search_key).map_err(|e| internal("Search client", &e))?;
        let reasoning = OpenAiCompatibleBackend::new(&config.reasoning, reasoning_key)
            .map_err(|e| internal("Reasoning backend", &e))?;
        let host = GitHubClient::new(&config.hosting.api_base).map_err(|e| internal("Hosting client", &e))?;

        Ok(Self {
            versions: Arc::new(versions),
            search: Arc::new(search),
            reasoning: Arc::new(reasoning),
            vcs: Arc::new(GitCli::new()),
            host: Arc::new(host),
            config,
        })
    }
}

/// Caller input for one run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub repo_url: String,
    pub token: Option<String>,
    /// Overrides `[hosting].base_branch`
    pub base_branch: Option<String>,
    /// Directory receiving the clone and the manifest backup
    pub work_dir: Option<PathBuf>,
}

/// Everything a run produced, including partial results of a failed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub repository: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Last state reached
    pub state: Option<RunState>,
    pub work_dir: Option<PathBuf>,
    pub repo_path: Option<PathBuf>,
    pub branch: Option<String>,
    pub manifest_path: Option<PathBuf>,
    pub dependencies: DependencyMap,
    pub insights: InsightMap,
    /// `(artifact, error)` for dependencies the reasoning service could not analyze
    pub analysis_failures: Vec<(String, String)>,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub task_count: usize,
    #[serde(skip)]
    pub manifest: Option<ManifestRewrite>,
    #[serde(skip)]
    pub patch: PatchReport,
    /// `false` when there was nothing to commit
    pub committed: bool,
    pub pr_url: Option<String>,
    pub error: Option<PipelineError>,
}

impl RunSummary {
    fn new(repository: &str) -> Self {
        Self {
            repository: repository.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            state: None,
            work_dir: None,
            repo_path: None,
            branch: None,
            manifest_path: None,
            dependencies: DependencyMap::new(),
            insights: InsightMap::new(),
            analysis_failures: Vec::new(),
            severity_counts: BTreeMap::new(),
            task_count: 0,
            manifest: None,
            patch: PatchReport::default(),
            committed: false,
            pr_url: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    fn reach(&mut self, state: RunState) {
        info!(state = %state, "Run state reached");
        self.state = Some(state);
    }
}

/// Dependency upgrade pipeline
pub struct Pipeline;

impl Pipeline {
    /// Execute one run; always returns a summary
    pub async fn run(ctx: &PipelineContext, request: &RunRequest) -> RunSummary {
        let mut summary = RunSummary::new(&request.repo_url);
        info!(repository = %request.repo_url, "Starting dependency upgrade run");

        if let Err(e) = Self::execute(ctx, request, &mut summary).await {
            error!(
                stage = %e.stage,
                branch = summary.branch.as_deref().unwrap_or("-"),
                error = %e.message,
                "Dependency upgrade run failed"
            );
            summary.error = Some(e);
        }

        summary.ended_at = Some(Utc::now());
        summary
    }

    async fn execute(
        ctx: &PipelineContext,
        request: &RunRequest,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let repo = parse_github_url(&request.repo_url).map_err(|e| PipelineError::new(RunState::Cloned, e))?;
        let now = Local::now();

        // CLONED
        let work_dir = request
            .work_dir
            .clone()
            .unwrap_or_else(|| default_work_dir(&repo, now));
        summary.work_dir = Some(work_dir.clone());
        let clone_url = if request.repo_url.contains("://") || request.repo_url.starts_with("git@") {
            request.repo_url.clone()
        } else {
            repo.https_url()
        };
        let repo_path = ctx
            .vcs
            .clone_repo(&clone_url, request.token.as_deref(), &work_dir.join(&repo.name))
            .await
            .map_err(|e| PipelineError::new(RunState::Cloned, e))?;
        summary.repo_path = Some(repo_path.clone());
        summary.reach(RunState::Cloned);

        // BRANCHED
        let branch = generate_branch_name(&ctx.config.hosting.branch_prefix, now);
        ctx.vcs
            .create_branch(&repo_path, &branch)
            .await
            .map_err(|e| PipelineError::new(RunState::Branched, e))?;
        summary.branch = Some(branch.clone());
        summary.reach(RunState::Branched);

        // ANALYZED
        let task_map = Self::analyze(ctx, &repo_path, summary).await?;
        summary.reach(RunState::Analyzed);

        // PATCHED
        let manifest_path = summary
            .manifest_path
            .clone()
            .ok_or_else(|| PipelineError::new(RunState::Patched, "Manifest path missing after analysis"))?;
        let rewrite = manifest::update_manifest(&manifest_path, &summary.dependencies, Some(&work_dir.join("backup")))
            .map_err(|e| PipelineError::new(RunState::Patched, e))?;
        summary.manifest = Some(rewrite);

        let patcher = CodePatcher::new(
            Arc::clone(&ctx.reasoning),
            ctx.config.patcher.source_extension.clone(),
            ctx.config.patcher.ignore_dirs.clone(),
        )
        .with_temperature(ctx.config.reasoning.temperature);
        summary.patch = patcher.patch_project(&repo_path, &task_map).await;
        summary.reach(RunState::Patched);

        // COMMITTED
        let committed = ctx
            .vcs
            .commit_and_push(&repo_path, &branch, &ctx.config.hosting.commit_message)
            .await
            .map_err(|e| PipelineError::new(RunState::Committed, e))?;
        summary.committed = committed;
        if !committed {
            info!("No manifest or source changes, skipping commit and pull request");
            return Ok(());
        }
        summary.reach(RunState::Committed);

        // PR_OPENED
        let base = request
            .base_branch
            .clone()
            .unwrap_or_else(|| ctx.config.hosting.base_branch.clone());
        let spec = PullRequestSpec {
            title: ctx.config.hosting.pr_title.clone(),
            head: branch,
            base,
            body: pull_request_body(summary, &repo_path),
        };
        let pr = ctx
            .host
            .open_pull_request(&repo, request.token.as_deref(), &spec)
            .await
            .map_err(|e| PipelineError::new(RunState::PrOpened, e))?;
        info!(url = %pr.html_url, "Pull request opened");
        summary.pr_url = Some(pr.html_url);
        summary.reach(RunState::PrOpened);

        Ok(())
    }

    /// Parse, resolve, synthesize, extract
    async fn analyze(
        ctx: &PipelineContext,
        repo_path: &Path,
        summary: &mut RunSummary,
    ) -> Result<crate::types::TaskMap, PipelineError> {
        let stage = RunState::Analyzed;

        let manifest_path = manifest::find_manifest(repo_path, &ctx.config.patcher.ignore_dirs)
            .map_err(|e| PipelineError::new(stage, e))?;
        info!(manifest = %manifest_path.display(), "Manifest found");
        let dependencies = manifest::parse_manifest_file(&manifest_path).map_err(|e| PipelineError::new(stage, e))?;
        summary.manifest_path = Some(manifest_path);

        if dependencies.is_empty() {
            warn!("Manifest declares no dependencies");
        }

        let resolver = VersionResolver::new(
            Arc::clone(&ctx.versions),
            ctx.config.registry.timeout(),
            ctx.config.registry.worker_limit(),
        );
        let dependencies = resolver.resolve(dependencies).await;

        let synthesizer = InsightSynthesizer::new(
            Arc::clone(&ctx.search),
            Arc::clone(&ctx.reasoning),
            ctx.config.search.max_results,
        );
        let outcome = synthesizer.synthesize_all(&dependencies).await;

        let insights = tasks::normalize_insights(&outcome.insights);
        let task_map = tasks::extract_tasks(&insights);
        summary.task_count = tasks::task_count(&task_map);
        info!(tasks = summary.task_count, "Code tasks extracted");

        summary.dependencies = dependencies;
        summary.insights = insights;
        summary.analysis_failures = outcome.failures;
        summary.severity_counts = outcome.severity_counts;

        Ok(task_map)
    }
}

fn default_work_dir(repo: &RepoRef, now: DateTime<Local>) -> PathBuf {
    std::env::temp_dir().join(format!("depup_{}_{}", repo.name, now.format("%Y%m%d_%H%M%S")))
}

/// Manifest updates and modified files, as markdown
pub fn pull_request_body(summary: &RunSummary, repo_path: &Path) -> String {
    let mut body = String::from("This PR upgrades dependencies in pom.xml.\n");

    if let Some(rewrite) = summary.manifest.as_ref().filter(|r| !r.plan.is_empty()) {
        body.push_str("\n### Dependency updates\n\n");
        for update in &rewrite.plan.updates {
            body.push_str(&format!(
                "- `{}:{}`: {} → {}\n",
                update.group_id, update.artifact_id, update.old_version, update.new_version
            ));
        }
    }

    if !summary.patch.results.is_empty() {
        body.push_str("\n### Modified files\n\n");
        for result in &summary.patch.results {
            let shown = result.file_path.strip_prefix(repo_path).unwrap_or(&result.file_path);
            body.push_str(&format!("- `{}`\n", shown.display()));
            for task in &result.applied_tasks {
                body.push_str(&format!("  - {}\n", task));
            }
        }
    }

    body
}
