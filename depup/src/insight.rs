//! Insight synthesizer
//!
//! For each dependency: search the web for upgrade notes, then ask the
//! reasoning service for a structured summary (security changes, deprecated
//! methods, code changes, severity). Dependencies are processed one at a time.
//!
//! Failure policy:
//! - Search failure degrades to a placeholder context; analysis continues
//! - Reasoning failure is returned for that dependency only and never touches
//!   the records of other dependencies

use crate::services::{CompletionRequest, ReasoningBackend, ReasoningError, SearchService};
use crate::types::{DependencyMap, DependencyRecord, FieldValue, InsightMap, InsightRecord, Severity};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Context used when the search call itself fails
pub const SEARCH_FAILED_CONTEXT: &str = "No insights available.";

/// Maximum number of source URLs kept per insight
pub const MAX_SOURCES: usize = 2;

const SYSTEM_PROMPT: &str = "You analyze library upgrades for Java projects. \
Answer with a single JSON object and nothing else.";

/// Context used when search succeeded but returned nothing usable
pub fn fallback_context(artifact: &str) -> String {
    format!(
        "No significant web insights found for {}. Perform a standard dependency upgrade analysis.",
        artifact
    )
}

/// Search query for one upgrade
pub fn build_query(artifact: &str, current: &str, latest: &str) -> String {
    format!(
        "Classify the security impact of upgrading {} from {} to {} as High, Moderate, or Low. \
         Provide detailed information on security changes, deprecated methods, and code modifications.",
        artifact, current, latest
    )
}

fn build_prompt(artifact: &str, record: &DependencyRecord, context: &str) -> String {
    format!(
        "Dependency: {group}:{artifact}\n\
         Current version: {current}\n\
         Target version: {latest}\n\n\
         Web insights:\n{context}\n\n\
         Respond with a JSON object with these keys:\n\
         - \"security_changes\": list of security risks mitigated or introduced\n\
         - \"deprecated_methods\": list of deprecated methods or breaking changes\n\
         - \"code_changes\": list of probable code modifications needed, one instruction per entry\n\
         - \"severity_level\": classify the impact as High, Moderate, or Low",
        group = record.group_id,
        artifact = artifact,
        current = record.current_version,
        latest = record.latest_str(),
        context = context,
    )
}

fn severity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(high|moderate|low)").expect("severity pattern is valid"))
}

/// First case-insensitive High/Moderate/Low in `raw`, else `Unknown`
pub fn normalize_severity(raw: &str) -> Severity {
    match severity_pattern()
        .find(raw)
        .map(|m| m.as_str().to_ascii_lowercase())
        .as_deref()
    {
        Some("high") => Severity::High,
        Some("moderate") => Severity::Moderate,
        Some("low") => Severity::Low,
        _ => Severity::Unknown,
    }
}

/// Map one JSON answer field onto the canonical field shape
pub fn field_from_json(value: Option<&Value>) -> FieldValue {
    match value {
        None | Some(Value::Null) => FieldValue::Empty,
        Some(Value::String(s)) if s.trim().is_empty() => FieldValue::Empty,
        Some(Value::String(s)) => FieldValue::Single(s.trim().to_string()),
        Some(Value::Array(items)) => {
            let items: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    Value::Null => None,
                    Value::String(s) => Some(s.trim().to_string()),
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect();
            if items.is_empty() {
                FieldValue::Empty
            } else {
                FieldValue::Many(items)
            }
        }
        Some(other) => FieldValue::Single(other.to_string()),
    }
}

/// Extract the JSON object from a reasoning answer
///
/// Tolerates markdown fences and prose around the object.
pub fn parse_answer(content: &str) -> Result<serde_json::Map<String, Value>, ReasoningError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(ReasoningError::Parse("Answer contains no JSON object".to_string())),
    };

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ReasoningError::Parse("Answer is not a JSON object".to_string())),
        Err(e) => Err(ReasoningError::Parse(e.to_string())),
    }
}

fn severity_from_json(value: Option<&Value>) -> Severity {
    match value {
        Some(Value::String(s)) => normalize_severity(s),
        Some(Value::Null) | None => Severity::Unknown,
        Some(other) => normalize_severity(&other.to_string()),
    }
}

/// Result of synthesizing insights for a whole dependency map
#[derive(Debug, Default)]
pub struct SynthesisOutcome {
    pub insights: InsightMap,
    /// `(artifact, error)` for dependencies whose reasoning call failed
    pub failures: Vec<(String, String)>,
    pub severity_counts: BTreeMap<Severity, usize>,
}

impl SynthesisOutcome {
    pub fn count(&self, severity: Severity) -> usize {
        self.severity_counts.get(&severity).copied().unwrap_or(0)
    }
}

/// Per-dependency search + reasoning
pub struct InsightSynthesizer {
    search: Arc<dyn SearchService>,
    reasoning: Arc<dyn ReasoningBackend>,
    max_results: usize,
}

impl InsightSynthesizer {
    pub fn new(search: Arc<dyn SearchService>, reasoning: Arc<dyn ReasoningBackend>, max_results: usize) -> Self {
        Self {
            search,
            reasoning,
            max_results,
        }
    }

    /// Search context and up to two source URLs
    async fn gather_context(&self, artifact: &str, record: &DependencyRecord) -> (String, Vec<String>) {
        let query = build_query(artifact, record.current_version.as_str(), record.latest_str());

        match self.search.search(&query, self.max_results).await {
            Ok(hits) => {
                let context = hits
                    .iter()
                    .map(|h| h.content.trim())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n");
                let sources = hits
                    .iter()
                    .map(|h| h.url.clone())
                    .filter(|u| !u.is_empty())
                    .take(MAX_SOURCES)
                    .collect();
                debug!(artifact = %artifact, hits = hits.len(), "Search context gathered");

                if context.trim().is_empty() {
                    (fallback_context(artifact), sources)
                } else {
                    (context, sources)
                }
            }
            Err(e) => {
                warn!(artifact = %artifact, error = %e, "Search failed, continuing without web insights");
                (SEARCH_FAILED_CONTEXT.to_string(), Vec::new())
            }
        }
    }

    /// One dependency's insight record
    pub async fn synthesize(&self, artifact: &str, record: &DependencyRecord) -> Result<InsightRecord, ReasoningError> {
        let (context, sources) = self.gather_context(artifact, record).await;

        let request = CompletionRequest::user(build_prompt(artifact, record, &context))
            .with_system(SYSTEM_PROMPT)
            .with_json_output();
        let response = self.reasoning.complete(request).await?;
        let answer = parse_answer(&response.content)?;

        Ok(InsightRecord {
            security_changes: field_from_json(answer.get("security_changes")),
            deprecated_methods: field_from_json(answer.get("deprecated_methods")),
            code_changes: field_from_json(answer.get("code_changes")),
            severity_level: severity_from_json(answer.get("severity_level")),
            sources,
        })
    }

    /// Every dependency in manifest order
    pub async fn synthesize_all(&self, dependencies: &DependencyMap) -> SynthesisOutcome {
        let mut outcome = SynthesisOutcome::default();
        for severity in Severity::ALL {
            outcome.severity_counts.insert(severity, 0);
        }

        for (artifact, record) in dependencies {
            info!(artifact = %artifact, backend = self.reasoning.id(), "Analyzing dependency");
            match self.synthesize(artifact, record).await {
                Ok(insight) => {
                    *outcome.severity_counts.entry(insight.severity_level).or_insert(0) += 1;
                    outcome.insights.insert(artifact.clone(), insight);
                }
                Err(e) => {
                    warn!(artifact = %artifact, error = %e, "Insight synthesis failed, skipping dependency");
                    outcome.failures.push((artifact.clone(), e.to_string()));
                }
            }
        }

        info!(
            analyzed = outcome.insights.len(),
            failed = outcome.failures.len(),
            high = outcome.count(Severity::High),
            moderate = outcome.count(Severity::Moderate),
            low = outcome.count(Severity::Low),
            unknown = outcome.count(Severity::Unknown),
            "Insight synthesis complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CompletionResponse, SearchError, SearchHit};
    use crate::types::{DeclaredVersion, LatestVersion};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedSearch {
        hits: Option<Vec<SearchHit>>,
        queries: Mutex<Vec<String>>,
    }

    impl FixedSearch {
        fn new(hits: Option<Vec<SearchHit>>) -> Self {
            Self {
                hits,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchService for FixedSearch {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            match &self.hits {
                Some(hits) => Ok(hits.iter().take(max_results).cloned().collect()),
                None => Err(SearchError::Status(500)),
            }
        }
    }

    /// Answers by artifact name found in the prompt; records prompts
    struct ScriptedReasoning {
        answers: Vec<(&'static str, Result<&'static str, ()>)>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReasoningBackend for ScriptedReasoning {
        fn id(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ReasoningError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            for (artifact, answer) in &self.answers {
                if request.prompt.contains(&format!(":{}\n", artifact)) {
                    return match answer {
                        Ok(content) => Ok(CompletionResponse {
                            content: content.to_string(),
                        }),
                        Err(()) => Err(ReasoningError::RequestFailed("HTTP 500".into())),
                    };
                }
            }
            Err(ReasoningError::Unavailable("no scripted answer".into()))
        }
    }

    fn record(artifact: &str) -> DependencyRecord {
        let mut record = DependencyRecord::new("org.test", artifact, DeclaredVersion::Explicit("1.0.0".into()));
        record.latest_version = Some(LatestVersion::Known("2.1.0".into()));
        record
    }

    fn hit(content: &str, url: &str) -> SearchHit {
        SearchHit {
            content: content.into(),
            url: url.into(),
        }
    }

    #[test]
    fn test_normalize_severity() {
        assert_eq!(normalize_severity("High"), Severity::High);
        assert_eq!(normalize_severity("The impact is MODERATE overall"), Severity::Moderate);
        assert_eq!(normalize_severity("low, possibly high"), Severity::Low);
        assert_eq!(normalize_severity("critical"), Severity::Unknown);
        assert_eq!(normalize_severity(""), Severity::Unknown);
    }

    #[test]
    fn test_field_from_json_shapes() {
        let answer: Value = serde_json::json!({
            "a": "Replace Foo.bar()",
            "b": ["x", " ", 3, null],
            "c": null,
            "d": "   ",
            "e": 42
        });
        assert_eq!(field_from_json(answer.get("a")), FieldValue::Single("Replace Foo.bar()".into()));
        assert_eq!(field_from_json(answer.get("b")), FieldValue::Many(vec!["x".into(), "3".into()]));
        assert_eq!(field_from_json(answer.get("c")), FieldValue::Empty);
        assert_eq!(field_from_json(answer.get("d")), FieldValue::Empty);
        assert_eq!(field_from_json(answer.get("e")), FieldValue::Single("42".into()));
        assert_eq!(field_from_json(answer.get("missing")), FieldValue::Empty);
    }

    #[test]
    fn test_parse_answer_tolerates_fences() {
        let content = "Here you go:\n```json\n{\"severity_level\": \"Low\"}\n```";
        let map = parse_answer(content).unwrap();
        assert_eq!(map["severity_level"], "Low");

        assert!(parse_answer("no json here").is_err());
        assert!(parse_answer("{not json}").is_err());
    }

    #[tokio::test]
    async fn test_synthesize_uses_search_context_and_two_sources() {
        let search = Arc::new(FixedSearch::new(Some(vec![
            hit("CVE fixed", "https://a.example"),
            hit("Foo.bar removed", "https://b.example"),
            hit("more", "https://c.example"),
        ])));
        let reasoning = Arc::new(ScriptedReasoning {
            answers: vec![(
                "lib",
                Ok(r#"{"security_changes": "CVE fixed", "deprecated_methods": ["Foo.bar()"],
                       "code_changes": "Replace Foo.bar() with Foo.baz()", "severity_level": "High impact"}"#),
            )],
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = InsightSynthesizer::new(search.clone(), reasoning.clone(), 6);

        let insight = synthesizer.synthesize("lib", &record("lib")).await.unwrap();

        assert_eq!(insight.severity_level, Severity::High);
        assert_eq!(insight.sources, vec!["https://a.example", "https://b.example"]);
        assert_eq!(insight.code_changes, FieldValue::Single("Replace Foo.bar() with Foo.baz()".into()));

        let query = &search.queries.lock().unwrap()[0];
        assert!(query.contains("upgrading lib from 1.0.0 to 2.1.0"));
        let prompt = &reasoning.prompts.lock().unwrap()[0];
        assert!(prompt.contains("CVE fixed\nFoo.bar removed\nmore"));
    }

    #[tokio::test]
    async fn test_empty_search_uses_fallback_context() {
        let search = Arc::new(FixedSearch::new(Some(Vec::new())));
        let reasoning = Arc::new(ScriptedReasoning {
            answers: vec![("lib", Ok(r#"{"severity_level": "none"}"#))],
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = InsightSynthesizer::new(search, reasoning.clone(), 6);

        let insight = synthesizer.synthesize("lib", &record("lib")).await.unwrap();

        assert_eq!(insight.severity_level, Severity::Unknown);
        assert!(insight.sources.is_empty());
        assert!(reasoning.prompts.lock().unwrap()[0].contains(&fallback_context("lib")));
    }

    #[tokio::test]
    async fn test_search_failure_degrades_to_placeholder() {
        let search = Arc::new(FixedSearch::new(None));
        let reasoning = Arc::new(ScriptedReasoning {
            answers: vec![("lib", Ok(r#"{"severity_level": "Low"}"#))],
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = InsightSynthesizer::new(search, reasoning.clone(), 6);

        let insight = synthesizer.synthesize("lib", &record("lib")).await.unwrap();

        assert_eq!(insight.severity_level, Severity::Low);
        assert!(insight.sources.is_empty());
        assert!(reasoning.prompts.lock().unwrap()[0].contains(SEARCH_FAILED_CONTEXT));
    }

    #[tokio::test]
    async fn test_reasoning_failure_is_isolated() {
        let search = Arc::new(FixedSearch::new(Some(vec![hit("notes", "https://a.example")])));
        let reasoning = Arc::new(ScriptedReasoning {
            answers: vec![
                ("good", Ok(r#"{"code_changes": ["Do X"], "severity_level": "Moderate"}"#)),
                ("bad", Err(())),
            ],
            prompts: Mutex::new(Vec::new()),
        });
        let synthesizer = InsightSynthesizer::new(search, reasoning, 6);

        let deps: DependencyMap = ["bad", "good"]
            .iter()
            .map(|a| (a.to_string(), record(a)))
            .collect();
        let outcome = synthesizer.synthesize_all(&deps).await;

        assert_eq!(outcome.insights.len(), 1);
        assert_eq!(outcome.insights["good"].code_changes, FieldValue::Many(vec!["Do X".into()]));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "bad");
        assert_eq!(outcome.count(Severity::Moderate), 1);
        assert_eq!(outcome.count(Severity::High), 0);
    }
}
