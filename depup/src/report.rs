//! Run reporting
//!
//! - Run summary: what succeeded, what failed, where the run stopped
//! - Analysis report: one numbered block per analyzed dependency
//! - JSON export of the resolved dependency map and insights

use crate::orchestrator::RunSummary;
use crate::types::{DependencyMap, InsightMap, Severity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

const SEPARATOR_WIDTH: usize = 50;

/// Plain-text analysis report
pub fn render_analysis_report(dependencies: &DependencyMap, insights: &InsightMap) -> String {
    let mut out = String::new();

    for (i, (artifact, insight)) in insights.iter().enumerate() {
        let (current, latest) = dependencies
            .get(artifact)
            .map(|d| (d.current_version.as_str(), d.latest_str()))
            .unwrap_or(("?", "?"));

        let _ = writeln!(out, "{}. {} ({} → {})", i + 1, artifact, current, latest);
        let _ = writeln!(out, "Severity Level: {}", insight.severity_level);
        let _ = writeln!(out, "Security Changes: {}", insight.security_changes);
        let _ = writeln!(out, "Deprecated Methods: {}", insight.deprecated_methods);
        let _ = writeln!(out, "Code Changes: {}", insight.code_changes);
        for (j, url) in insight.sources.iter().enumerate() {
            let _ = writeln!(out, "Source {}: {}", j + 1, url);
        }
        let _ = writeln!(out, "{}", "-".repeat(SEPARATOR_WIDTH));
    }

    out
}

/// End-of-run summary
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    let _ = writeln!(out, "Repository:        {}", summary.repository);
    let _ = writeln!(
        out,
        "Reached state:     {}",
        summary.state.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
    );
    if let Some(branch) = &summary.branch {
        let _ = writeln!(out, "Branch:            {}", branch);
    }
    if let Some(path) = &summary.repo_path {
        let _ = writeln!(out, "Working tree:      {}", path.display());
    }

    let unknown = summary
        .dependencies
        .values()
        .filter(|d| d.latest_str() == crate::types::UNKNOWN_SENTINEL)
        .count();
    let _ = writeln!(
        out,
        "Dependencies:      {} declared, {} unresolved",
        summary.dependencies.len(),
        unknown
    );
    let _ = writeln!(
        out,
        "Analyzed:          {} ({} failed)",
        summary.insights.len(),
        summary.analysis_failures.len()
    );
    for (artifact, error) in &summary.analysis_failures {
        let _ = writeln!(out, "  ! {}: {}", artifact, error);
    }

    let severities: Vec<String> = Severity::ALL
        .iter()
        .map(|s| format!("{} {}", s, summary.severity_counts.get(s).copied().unwrap_or(0)))
        .collect();
    let _ = writeln!(out, "Severity:          {}", severities.join(", "));
    let _ = writeln!(out, "Code tasks:        {}", summary.task_count);

    match &summary.manifest {
        Some(rewrite) if rewrite.written => {
            let _ = writeln!(out, "Manifest updated:  yes ({} versions)", rewrite.plan.len());
            for update in &rewrite.plan.updates {
                let _ = writeln!(
                    out,
                    "  {}:{} {} → {}",
                    update.group_id, update.artifact_id, update.old_version, update.new_version
                );
            }
            let _ = writeln!(out, "Manifest backup:   {}", rewrite.backup_path.display());
        }
        Some(_) => {
            let _ = writeln!(out, "Manifest updated:  no (already current)");
        }
        None => {
            let _ = writeln!(out, "Manifest updated:  no");
        }
    }

    let patch = &summary.patch;
    let _ = writeln!(
        out,
        "Files modified:    {} of {} scanned ({} tasks applied)",
        patch.files_modified(),
        patch.files_scanned,
        patch.tasks_applied
    );
    for result in &patch.results {
        let _ = writeln!(out, "  {}", result.file_path.display());
        for task in &result.applied_tasks {
            let _ = writeln!(out, "    - {}", task);
        }
    }
    for warning in &patch.warnings {
        let _ = writeln!(out, "  ! {}", warning);
    }

    let _ = writeln!(out, "Committed:         {}", yes_no(summary.committed));
    match (&summary.pr_url, &summary.error) {
        (Some(url), _) => {
            let _ = writeln!(out, "Pull request:      {}", url);
        }
        (None, Some(error)) => {
            let _ = writeln!(out, "Pull request:      not opened");
            let _ = writeln!(out, "Failed stage:      {}", error.stage);
            let _ = writeln!(out, "Error:             {}", error.message);
            if let Some(branch) = &summary.branch {
                let _ = writeln!(out, "Clean up branch '{}' manually if it was pushed.", branch);
            }
        }
        (None, None) => {
            let _ = writeln!(out, "Pull request:      not needed (no changes)");
        }
    }

    out
}

#[derive(Serialize)]
struct AnalysisExport<'a> {
    dependencies: &'a DependencyMap,
    insights: &'a InsightMap,
    severity_counts: &'a BTreeMap<Severity, usize>,
}

/// Write the dependency map and insights as pretty JSON
pub fn export_json(summary: &RunSummary, path: &Path) -> std::io::Result<()> {
    let export = AnalysisExport {
        dependencies: &summary.dependencies,
        insights: &summary.insights,
        severity_counts: &summary.severity_counts,
    };
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "Analysis exported");
    Ok(())
}
