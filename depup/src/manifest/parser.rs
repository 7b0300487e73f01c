//! Manifest parser
//!
//! Extracts `(group, artifact, version)` triples from the top-level
//! `dependencies/dependency` list of a POM-style manifest.

use super::namespace::NamespaceContext;
use crate::error::ManifestError;
use crate::types::{DeclaredVersion, DependencyMap, DependencyRecord};
use roxmltree::Document;
use std::path::Path;
use tracing::{debug, warn};

/// Parse manifest text into a dependency map keyed by artifact id
///
/// - Missing `<version>` → `LATEST` sentinel
/// - Missing `<dependencies>` → empty map (not an error)
/// - Malformed XML → `ManifestError::Parse`
///
/// Two entries sharing an artifact id collapse into one; the later entry wins
/// and a warning is logged.
pub fn parse_manifest(text: &str) -> Result<DependencyMap, ManifestError> {
    let doc = Document::parse(text)?;
    let ns = NamespaceContext::detect(&doc);
    let root = doc.root_element();

    let mut dependencies = DependencyMap::new();

    let Some(list) = ns.child(root, "dependencies") else {
        debug!("Manifest has no dependencies element");
        return Ok(dependencies);
    };

    for dep in ns.children(list, "dependency") {
        let (Some(group_id), Some(artifact_id)) = (
            ns.child_text(dep, "groupId"),
            ns.child_text(dep, "artifactId"),
        ) else {
            warn!(
                position = dep.range().start,
                "Skipping dependency without groupId/artifactId"
            );
            continue;
        };

        let current_version = ns
            .child_text(dep, "version")
            .map(|v| DeclaredVersion::Explicit(v.to_string()))
            .unwrap_or(DeclaredVersion::Latest);

        let record = DependencyRecord::new(group_id, artifact_id, current_version);

        if let Some(previous) = dependencies.get(artifact_id) {
            warn!(
                artifact = artifact_id,
                previous = %previous.coordinate(),
                replacement = %record.coordinate(),
                "Duplicate artifact id in manifest, later declaration wins"
            );
        }

        dependencies.insert(artifact_id.to_string(), record);
    }

    debug!(count = dependencies.len(), "Manifest parsed");
    Ok(dependencies)
}

/// Read and parse a manifest file
pub fn parse_manifest_file(path: &Path) -> Result<DependencyMap, ManifestError> {
    let text = std::fs::read_to_string(path)?;
    parse_manifest(&text)
}
