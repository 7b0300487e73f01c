//! Code patcher
//!
//! Applies code tasks to every source file of the target language. For one
//! file, tasks are folded in extractor order: each reasoning call sees the
//! output of the previous task. A task counts as applied only when it changes
//! the content; failures leave the content as it was and become warnings.
//! A file is written back, and reported, only when its final content differs
//! from what was on disk.

use crate::manifest::is_ignored;
use crate::services::{CompletionRequest, ReasoningBackend};
use crate::types::{CodeTask, PatchResult, TaskMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Per-file failure reported alongside the patch results
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .file_path.display())]
pub struct PatchWarning {
    pub file_path: PathBuf,
    /// Task description when the failure belongs to one task
    pub task: Option<String>,
    pub message: String,
}

/// Outcome of one project scan
#[derive(Debug, Clone, Default)]
pub struct PatchReport {
    /// Changed files only
    pub results: Vec<PatchResult>,
    pub warnings: Vec<PatchWarning>,
    pub files_scanned: usize,
    /// Applied tasks summed over changed files
    pub tasks_applied: usize,
}

impl PatchReport {
    pub fn files_modified(&self) -> usize {
        self.results.len()
    }
}

/// Content after folding all tasks over one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub content: String,
    pub applied_tasks: Vec<String>,
    pub warnings: Vec<PatchWarning>,
}

/// Instruction prompt for one (dependency, task, content) triple
pub fn build_patch_prompt(dependency: &str, instruction: &str, code: &str) -> String {
    format!(
        "You are an expert Java developer upgrading the dependencies of a codebase.\n\n\
         Dependency: {dependency}\n\
         Upgrade context:\n{instruction}\n\n\
         Apply the changes this upgrade requires to the Java code below.\n\n\
         Instructions:\n\
         1. Replace deprecated methods and usages with their recommended alternatives, including imports.\n\
         2. Do not rename classes, methods or variables unless the upgrade requires it.\n\
         3. Do not add methods, tests, `main()` or logging that were not asked for.\n\
         4. Preserve the original formatting and indentation.\n\
         5. Do not alter existing functionality unless the upgrade requires it.\n\
         6. If nothing needs to change, return the code exactly as given.\n\
         7. Return only the complete updated file, without markdown fences or explanations.\n\n\
         ---\n\n\
         {code}"
    )
}

/// Strip a surrounding markdown code fence (```` ``` ```` or ```` ```lang ````)
///
/// Only the fence lines are removed; the body keeps its own whitespace and
/// line endings.
pub fn clean_code_output(response: &str) -> String {
    let mut text = response;

    if let Some(rest) = text.trim_start().strip_prefix("```") {
        text = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => "",
        };
    }
    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.to_string()
}

/// Equal up to line endings and surrounding whitespace
fn same_code(a: &str, b: &str) -> bool {
    a.replace("\r\n", "\n").trim() == b.replace("\r\n", "\n").trim()
}

/// Carry the line-ending convention and final newline of `current` over to `updated`
fn match_line_endings(updated: String, current: &str) -> String {
    let ending = if current.contains("\r\n") { "\r\n" } else { "\n" };
    let mut updated = if ending == "\r\n" {
        updated.replace("\r\n", "\n").replace('\n', "\r\n")
    } else {
        updated
    };
    if current.ends_with('\n') && !updated.ends_with('\n') {
        updated.push_str(ending);
    }
    updated
}

pub struct CodePatcher {
    reasoning: Arc<dyn ReasoningBackend>,
    source_extension: String,
    ignore_dirs: Vec<String>,
    temperature: Option<f32>,
}

impl CodePatcher {
    pub fn new(reasoning: Arc<dyn ReasoningBackend>, source_extension: impl Into<String>, ignore_dirs: Vec<String>) -> Self {
        Self {
            reasoning,
            source_extension: source_extension.into().trim_start_matches('.').to_string(),
            ignore_dirs,
            temperature: Some(0.0),
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Source files under `root`, sorted by path
    pub fn find_source_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_ignored(e, &self.ignore_dirs))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == self.source_extension)
            })
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    /// One task against the current content; `None` when nothing changed
    async fn apply_task(&self, task: &CodeTask, current: &str) -> Result<Option<String>, String> {
        let request = CompletionRequest::user(build_patch_prompt(&task.dependency_id, &task.instruction, current))
            .with_temperature(self.temperature);
        let response = self.reasoning.complete(request).await.map_err(|e| e.to_string())?;

        let cleaned = clean_code_output(&response.content);
        if cleaned.trim().is_empty() || same_code(&cleaned, current) {
            return Ok(None);
        }
        Ok(Some(match_line_endings(cleaned, current)))
    }

    /// Fold every task over `original`
    pub async fn patch_content(&self, file_path: &Path, original: &str, tasks: &TaskMap) -> FilePatch {
        let mut content = original.to_string();
        let mut applied_tasks = Vec::new();
        let mut warnings = Vec::new();

        for task in tasks.values().flatten() {
            match self.apply_task(task, &content).await {
                Ok(Some(updated)) => {
                    tracing::debug!(file = %file_path.display(), task = %task.describe(), "Task changed content");
                    applied_tasks.push(task.describe());
                    content = updated;
                }
                Ok(None) => {
                    tracing::debug!(file = %file_path.display(), task = %task.describe(), "No change");
                }
                Err(message) => {
                    tracing::warn!(
                        file = %file_path.display(),
                        task = %task.describe(),
                        error = %message,
                        "Patch task failed, keeping previous content"
                    );
                    warnings.push(PatchWarning {
                        file_path: file_path.to_path_buf(),
                        task: Some(task.describe()),
                        message,
                    });
                }
            }
        }

        FilePatch {
            content,
            applied_tasks,
            warnings,
        }
    }

    /// Patch every source file under `root`
    pub async fn patch_project(&self, root: &Path, tasks: &TaskMap) -> PatchReport {
        let mut report = PatchReport::default();

        if tasks.values().all(Vec::is_empty) {
            tracing::info!("No code tasks, skipping source scan");
            return report;
        }

        let files = self.find_source_files(root);
        tracing::info!(files = files.len(), extension = %self.source_extension, "Patching source files");

        for file_path in files {
            report.files_scanned += 1;

            let original = match tokio::fs::read_to_string(&file_path).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(file = %file_path.display(), error = %e, "Cannot read source file");
                    report.warnings.push(PatchWarning {
                        file_path,
                        task: None,
                        message: format!("Read failed: {}", e),
                    });
                    continue;
                }
            };

            let patch = self.patch_content(&file_path, &original, tasks).await;
            report.warnings.extend(patch.warnings);

            if patch.content == original {
                continue;
            }

            if let Err(e) = tokio::fs::write(&file_path, &patch.content).await {
                tracing::warn!(file = %file_path.display(), error = %e, "Cannot write patched file");
                report.warnings.push(PatchWarning {
                    file_path,
                    task: None,
                    message: format!("Write failed: {}", e),
                });
                continue;
            }

            tracing::info!(file = %file_path.display(), tasks = patch.applied_tasks.len(), "File patched");
            report.tasks_applied += patch.applied_tasks.len();
            report.results.push(PatchResult {
                file_path,
                applied_tasks: patch.applied_tasks,
                final_content: patch.content,
            });
        }

        tracing::info!(
            scanned = report.files_scanned,
            modified = report.results.len(),
            tasks_applied = report.tasks_applied,
            warnings = report.warnings.len(),
            "Code patching complete"
        );
        report
    }
}
