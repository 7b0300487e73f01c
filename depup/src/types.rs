//! Core data model for the dependency upgrade pipeline
//!
//! Records flow strictly forward:
//! manifest parser → version resolver → insight synthesizer → task extractor → code patcher.
//! Each stage owns the map it produces; later stages only read it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Declared-version sentinel for dependencies without a `<version>` element
pub const LATEST_SENTINEL: &str = "LATEST";

/// Resolved-version sentinel for failed or timed-out registry lookups
pub const UNKNOWN_SENTINEL: &str = "UNKNOWN";

// ============================================================================
// Dependencies
// ============================================================================

/// Version as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeclaredVersion {
    /// Literal `<version>` text
    Explicit(String),
    /// No version element (serialized as `LATEST`)
    Latest,
}

impl DeclaredVersion {
    pub fn as_str(&self) -> &str {
        match self {
            DeclaredVersion::Explicit(v) => v,
            DeclaredVersion::Latest => LATEST_SENTINEL,
        }
    }
}

impl From<String> for DeclaredVersion {
    fn from(value: String) -> Self {
        if value == LATEST_SENTINEL {
            DeclaredVersion::Latest
        } else {
            DeclaredVersion::Explicit(value)
        }
    }
}

impl From<DeclaredVersion> for String {
    fn from(value: DeclaredVersion) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DeclaredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest published version reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LatestVersion {
    Known(String),
    /// Lookup failed, timed out, or the registry had no `latest` entry
    Unknown,
}

impl LatestVersion {
    pub fn as_str(&self) -> &str {
        match self {
            LatestVersion::Known(v) => v,
            LatestVersion::Unknown => UNKNOWN_SENTINEL,
        }
    }

    pub fn known(&self) -> Option<&str> {
        match self {
            LatestVersion::Known(v) => Some(v),
            LatestVersion::Unknown => None,
        }
    }
}

impl From<String> for LatestVersion {
    fn from(value: String) -> Self {
        if value == UNKNOWN_SENTINEL {
            LatestVersion::Unknown
        } else {
            LatestVersion::Known(value)
        }
    }
}

impl From<LatestVersion> for String {
    fn from(value: LatestVersion) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LatestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dependency declaration, enriched by the version resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub group_id: String,
    pub artifact_id: String,
    pub current_version: DeclaredVersion,
    /// `None` until the resolver has run; never `None` afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<LatestVersion>,
}

impl DependencyRecord {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        current_version: DeclaredVersion,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            current_version,
            latest_version: None,
        }
    }

    /// `group:artifact` coordinate
    pub fn coordinate(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// Resolved version text, `UNKNOWN` when unresolved
    pub fn latest_str(&self) -> &str {
        self.latest_version
            .as_ref()
            .map(LatestVersion::as_str)
            .unwrap_or(UNKNOWN_SENTINEL)
    }

    /// Known latest version that differs from the declared one
    pub fn upgrade_target(&self) -> Option<&str> {
        self.latest_version
            .as_ref()
            .and_then(LatestVersion::known)
            .filter(|latest| *latest != self.current_version.as_str())
    }
}

/// Dependencies keyed by artifact id, in manifest order
pub type DependencyMap = IndexMap<String, DependencyRecord>;

// ============================================================================
// Insights
// ============================================================================

/// Canonical shape of a reasoning-service text field
///
/// The service may answer with a string, a list, or nothing; downstream code
/// only ever sees one of these three variants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Empty,
    Single(String),
    Many(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Single(s) => s.trim().is_empty(),
            FieldValue::Many(items) => items.iter().all(|s| s.trim().is_empty()),
        }
    }

    /// Entries in order (a single string yields one entry)
    pub fn items(&self) -> Vec<&str> {
        match self {
            FieldValue::Empty => Vec::new(),
            FieldValue::Single(s) => vec![s.as_str()],
            FieldValue::Many(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => f.write_str("None"),
            FieldValue::Single(s) => f.write_str(s),
            FieldValue::Many(items) => f.write_str(&items.join("; ")),
        }
    }
}

/// Upgrade impact classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    High,
    Moderate,
    Low,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::High,
        Severity::Moderate,
        Severity::Low,
        Severity::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "High",
            Severity::Moderate => "Moderate",
            Severity::Low => "Low",
            Severity::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured upgrade-impact summary for one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightRecord {
    pub security_changes: FieldValue,
    pub deprecated_methods: FieldValue,
    pub code_changes: FieldValue,
    pub severity_level: Severity,
    /// Reference URLs (at most two)
    pub sources: Vec<String>,
}

/// Insights keyed by artifact id
pub type InsightMap = IndexMap<String, InsightRecord>;

// ============================================================================
// Tasks and patches
// ============================================================================

/// One discrete source-change instruction for a dependency upgrade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeTask {
    pub dependency_id: String,
    pub instruction: String,
}

impl CodeTask {
    /// `[dependency] instruction`, used in patch summaries
    pub fn describe(&self) -> String {
        format!("[{}] {}", self.dependency_id, self.instruction)
    }
}

/// Ordered tasks keyed by artifact id
pub type TaskMap = IndexMap<String, Vec<CodeTask>>;

/// A source file whose content changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub file_path: PathBuf,
    /// Descriptions of tasks that changed the content, in application order
    pub applied_tasks: Vec<String>,
    pub final_content: String,
}

// ============================================================================
// Manifest updates
// ============================================================================

/// One version rewrite (`old_version != new_version`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestUpdate {
    pub group_id: String,
    pub artifact_id: String,
    pub old_version: String,
    pub new_version: String,
}

/// Version rewrites applied to one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestUpdatePlan {
    pub updates: Vec<ManifestUpdate>,
}

impl ManifestUpdatePlan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }
}
