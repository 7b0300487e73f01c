//! Manifest rewriter
//!
//! Rewrites `<version>` text in place for dependencies whose resolved latest
//! version differs from the version written in the manifest. Only the bytes of
//! the changed version texts are replaced; everything else in the document,
//! including namespace declarations, comments and formatting, is preserved.

use super::namespace::NamespaceContext;
use crate::error::ManifestError;
use crate::types::{DependencyMap, ManifestUpdate, ManifestUpdatePlan};
use roxmltree::Document;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of applying a plan to a manifest file
#[derive(Debug, Clone)]
pub struct ManifestRewrite {
    pub plan: ManifestUpdatePlan,
    pub backup_path: PathBuf,
    /// `false` when the plan was empty and the file was left untouched
    pub written: bool,
}

/// Byte range of a version text plus its replacement
#[derive(Debug)]
struct VersionEdit {
    range: Range<usize>,
    replacement: String,
}

/// Compute the update plan and rewritten text without touching the filesystem
///
/// Every `dependency` element in the document (including
/// `dependencyManagement`) whose `groupId`/`artifactId` match an entry with a
/// known latest version is considered. Entries resolved to `UNKNOWN` are never
/// written. Returns `None` for the text when the plan is empty.
pub fn plan_manifest_update(
    text: &str,
    dependencies: &DependencyMap,
) -> Result<(ManifestUpdatePlan, Option<String>), ManifestError> {
    let doc = Document::parse(text)?;
    let ns = NamespaceContext::detect(&doc);

    let mut plan = ManifestUpdatePlan::default();
    let mut edits = Vec::new();

    for dep in ns.descendants(doc.root_element(), "dependency") {
        let (Some(group_id), Some(artifact_id)) = (
            ns.child_text(dep, "groupId"),
            ns.child_text(dep, "artifactId"),
        ) else {
            continue;
        };

        let Some(record) = dependencies.get(artifact_id) else {
            continue;
        };
        if record.group_id != group_id {
            continue;
        }
        let Some(latest) = record.latest_version.as_ref().and_then(|v| v.known()) else {
            continue;
        };

        let Some(version_el) = ns.child(dep, "version") else {
            continue;
        };
        let Some(text_node) = version_el
            .children()
            .find(|c| c.is_text() && c.text().is_some_and(|t| !t.trim().is_empty()))
        else {
            debug!(artifact = artifact_id, "Empty version element left unchanged");
            continue;
        };

        let current = text_node.text().map(str::trim).unwrap_or_default();
        if current == latest {
            continue;
        }

        let range = trimmed_range(text, text_node.range());
        edits.push(VersionEdit {
            range,
            replacement: escape_text(latest),
        });
        plan.updates.push(ManifestUpdate {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            old_version: current.to_string(),
            new_version: latest.to_string(),
        });
    }

    if edits.is_empty() {
        return Ok((plan, None));
    }

    let rewritten = apply_edits(text, edits);

    // The whole in-memory document must still be well-formed before anything is written
    Document::parse(&rewritten)?;

    Ok((plan, Some(rewritten)))
}

/// Back up, rewrite and atomically replace a manifest file
///
/// The backup is written before any parsing or mutation. The manifest itself
/// is replaced (temp file + rename) only when at least one version changed.
pub fn update_manifest(
    manifest_path: &Path,
    dependencies: &DependencyMap,
    backup_dir: Option<&Path>,
) -> Result<ManifestRewrite, ManifestError> {
    let backup_path = backup_path_for(manifest_path, backup_dir);
    if let Some(parent) = backup_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(manifest_path, &backup_path)?;
    debug!(backup = %backup_path.display(), "Manifest backed up");

    let text = std::fs::read_to_string(manifest_path)?;
    let (plan, rewritten) = plan_manifest_update(&text, dependencies)?;

    let Some(rewritten) = rewritten else {
        info!("No updates needed in {}", manifest_path.display());
        return Ok(ManifestRewrite {
            plan,
            backup_path,
            written: false,
        });
    };

    for update in &plan.updates {
        info!(
            "Updating {}:{} from {} to {}",
            update.group_id, update.artifact_id, update.old_version, update.new_version
        );
    }

    write_atomically(manifest_path, &rewritten)?;
    info!(
        updates = plan.len(),
        "Manifest updated and saved to {}",
        manifest_path.display()
    );

    Ok(ManifestRewrite {
        plan,
        backup_path,
        written: true,
    })
}

/// `pom.xml` → `<dir>/pom_backup.xml`
fn backup_path_for(manifest_path: &Path, backup_dir: Option<&Path>) -> PathBuf {
    let stem = manifest_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest".to_string());
    let name = match manifest_path.extension() {
        Some(ext) => format!("{}_backup.{}", stem, ext.to_string_lossy()),
        None => format!("{}_backup", stem),
    };

    let dir = backup_dir
        .map(Path::to_path_buf)
        .or_else(|| manifest_path.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(name)
}

fn write_atomically(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest".to_string());
    let tmp = path.with_file_name(format!(".{}.depup-tmp", file_name));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

/// Narrow a text-node range to its non-whitespace content
fn trimmed_range(text: &str, range: Range<usize>) -> Range<usize> {
    let raw = &text[range.clone()];
    let lead = raw.len() - raw.trim_start().len();
    let trail = raw.len() - raw.trim_end().len();
    (range.start + lead)..(range.end - trail)
}

fn apply_edits(text: &str, mut edits: Vec<VersionEdit>) -> String {
    edits.sort_by_key(|e| e.range.start);

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for edit in edits {
        out.push_str(&text[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&text[cursor..]);
    out
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
