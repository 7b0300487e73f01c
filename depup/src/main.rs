//! depup - dependency upgrade pipeline
//!
//! Clones a GitHub repository, upgrades the dependencies declared in its
//! `pom.xml`, patches affected Java sources and opens a pull request.

use anyhow::{Context, Result};
use clap::Parser;
use depup::report;
use depup::{Pipeline, PipelineContext, RunRequest};
use depup_common::config::{self, TomlConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "depup", version, about = "Upgrade Maven dependencies and open a pull request")]
struct Args {
    /// Repository URL (https://github.com/owner/repo, git@github.com:owner/repo.git or owner/repo)
    repo_url: String,

    /// GitHub access token used for clone, push and pull request
    #[arg(long, env = "DEPUP_GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file
    #[arg(long, env = config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Pull request target branch (default from config)
    #[arg(long)]
    base_branch: Option<String>,

    /// Directory for the clone and manifest backup (default: system temp dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Write resolved dependencies and insights as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let toml_config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    depup_common::logging::init_tracing(&toml_config.logging.level)?;

    info!(
        "Starting depup v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let reasoning_key = config::resolve_secret(
        "Reasoning API key",
        config::REASONING_KEY_ENV_VARS,
        toml_config.reasoning.api_key.as_deref(),
    );
    let search_key = config::resolve_secret(
        "Search API key",
        config::SEARCH_KEY_ENV_VARS,
        toml_config.search.api_key.as_deref(),
    );
    if reasoning_key.is_none() {
        warn!("No reasoning API key configured; dependency analysis will fail");
    }
    if search_key.is_none() {
        warn!("No search API key configured; analysis runs without web insights");
    }
    if args.token.is_none() {
        warn!("No GitHub token provided; push and pull request creation may fail");
    }

    let ctx = PipelineContext::from_config(toml_config, reasoning_key, search_key)
        .context("Failed to initialize pipeline")?;

    let request = RunRequest {
        repo_url: args.repo_url,
        token: args.token,
        base_branch: args.base_branch,
        work_dir: args.work_dir,
    };

    let summary = Pipeline::run(&ctx, &request).await;

    let analysis = report::render_analysis_report(&summary.dependencies, &summary.insights);
    if !analysis.is_empty() {
        println!("Analysis Report\n{}\n{}", "=".repeat(15), analysis);
    }
    println!("{}", report::render_summary(&summary));

    if let Some(path) = &args.report_json {
        report::export_json(&summary, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if let Some(e) = &summary.error {
        error!("Run failed at stage {}: {}", e.stage, e.message);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
