//! Insight normalization and code-task extraction
//!
//! Normalized fields are either `Empty` or `Many`; a lone string becomes a
//! one-element list, "nothing to do" entries are dropped from lists and a
//! field left with no entries becomes `Empty`, so
//! "has at least one task" means "apply this dependency's changes".

use crate::types::{CodeTask, FieldValue, InsightMap, InsightRecord, TaskMap};

/// Case-insensitive substrings marking a non-informative answer
pub const NO_OP_PHRASES: &[&str] = &["no deprecated", "not explicitly mentioned", "none"];

fn is_no_op(text: &str) -> bool {
    let lower = text.to_lowercase();
    NO_OP_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Canonicalize one field (idempotent)
pub fn normalize_field(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::Empty => FieldValue::Empty,
        FieldValue::Single(s) if s.trim().is_empty() || is_no_op(s) => FieldValue::Empty,
        FieldValue::Single(s) => FieldValue::Many(vec![s.clone()]),
        FieldValue::Many(items) => {
            let kept: Vec<String> = items
                .iter()
                .filter(|item| !item.trim().is_empty() && !is_no_op(item))
                .cloned()
                .collect();
            if kept.is_empty() {
                FieldValue::Empty
            } else {
                FieldValue::Many(kept)
            }
        }
    }
}

pub fn normalize_insight(insight: &InsightRecord) -> InsightRecord {
    InsightRecord {
        security_changes: normalize_field(&insight.security_changes),
        deprecated_methods: normalize_field(&insight.deprecated_methods),
        code_changes: normalize_field(&insight.code_changes),
        severity_level: insight.severity_level,
        sources: insight.sources.clone(),
    }
}

/// Normalize every record; order is preserved
pub fn normalize_insights(insights: &InsightMap) -> InsightMap {
    insights
        .iter()
        .map(|(artifact, insight)| (artifact.clone(), normalize_insight(insight)))
        .collect()
}

/// Ordered, trimmed, non-empty tasks per dependency
///
/// Every dependency in `insights` gets an entry, possibly empty.
pub fn extract_tasks(insights: &InsightMap) -> TaskMap {
    insights
        .iter()
        .map(|(artifact, insight)| {
            let tasks = insight
                .code_changes
                .items()
                .into_iter()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|instruction| CodeTask {
                    dependency_id: artifact.clone(),
                    instruction: instruction.to_string(),
                })
                .collect();
            (artifact.clone(), tasks)
        })
        .collect()
}

/// Total number of tasks across dependencies
pub fn task_count(tasks: &TaskMap) -> usize {
    tasks.values().map(Vec::len).sum()
}
