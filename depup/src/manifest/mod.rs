//! Build manifest handling
//!
//! - **namespace** - default-namespace detection and namespace-aware queries
//! - **parser** - dependency extraction
//! - **rewriter** - in-place version rewriting with backup-before-write

pub mod namespace;
pub mod parser;
pub mod rewriter;

pub use namespace::NamespaceContext;
pub use parser::{parse_manifest, parse_manifest_file};
pub use rewriter::{plan_manifest_update, update_manifest, ManifestRewrite};

use crate::error::ManifestError;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Manifest file name searched for in the working tree
pub const MANIFEST_FILE_NAME: &str = "pom.xml";

/// Locate the manifest closest to the repository root
///
/// Directories named in `ignore_dirs` are not descended into. Among
/// candidates at the same depth, the lexicographically first path wins.
pub fn find_manifest(root: &Path, ignore_dirs: &[String]) -> Result<PathBuf, ManifestError> {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored(e, ignore_dirs))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Error accessing entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && e.file_name() == MANIFEST_FILE_NAME)
        .min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path())))
        .map(|e| e.into_path())
        .ok_or_else(|| ManifestError::NotFound(root.to_path_buf()))
}

/// Ignored directory (never the walk root itself)
pub(crate) fn is_ignored(entry: &DirEntry, ignore_dirs: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| ignore_dirs.iter().any(|d| d == name))
}
