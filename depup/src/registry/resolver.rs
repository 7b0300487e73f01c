//! Version resolver
//!
//! Fans out one registry lookup per dependency with a bounded number of
//! in-flight requests, then folds the immutable per-artifact results back into
//! the dependency map on the calling task. Lookups that fail or exceed their
//! deadline resolve to `UNKNOWN`; the resolver returns only after every
//! submitted lookup has produced a result.

use super::{RegistryError, VersionSource};
use crate::types::{DependencyMap, LatestVersion};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded-concurrency version resolver
pub struct VersionResolver {
    source: Arc<dyn VersionSource>,
    timeout: Duration,
    worker_limit: usize,
}

impl VersionResolver {
    pub fn new(source: Arc<dyn VersionSource>, timeout: Duration, worker_limit: usize) -> Self {
        Self {
            source,
            timeout,
            worker_limit: worker_limit.max(1),
        }
    }

    pub fn worker_limit(&self) -> usize {
        self.worker_limit
    }

    /// Fill `latest_version` for every entry
    pub async fn resolve(&self, dependencies: DependencyMap) -> DependencyMap {
        let lookups: Vec<(String, String)> = dependencies
            .iter()
            .map(|(artifact, record)| (artifact.clone(), record.group_id.clone()))
            .collect();
        let submitted = lookups.len();

        info!(
            source = self.source.name(),
            dependencies = submitted,
            workers = self.worker_limit,
            "Resolving latest versions"
        );

        let results: Vec<(String, LatestVersion)> = stream::iter(lookups)
            .map(|(artifact, group)| {
                let source = Arc::clone(&self.source);
                let timeout = self.timeout;
                async move {
                    let latest = match tokio::time::timeout(
                        timeout,
                        source.latest_version(&group, &artifact),
                    )
                    .await
                    {
                        Ok(Ok(version)) => {
                            debug!(artifact = %artifact, version = %version, "Latest version resolved");
                            LatestVersion::Known(version)
                        }
                        Ok(Err(e)) => {
                            warn!(artifact = %artifact, group = %group, error = %e, "Registry lookup failed");
                            LatestVersion::Unknown
                        }
                        Err(_) => {
                            let e = RegistryError::Timeout(timeout);
                            warn!(artifact = %artifact, group = %group, error = %e, "Registry lookup timed out");
                            LatestVersion::Unknown
                        }
                    };
                    (artifact, latest)
                }
            })
            .buffer_unordered(self.worker_limit)
            .collect()
            .await;

        debug_assert_eq!(results.len(), submitted);

        let mut resolved = dependencies;
        for (artifact, latest) in results {
            if let Some(record) = resolved.get_mut(&artifact) {
                record.latest_version = Some(latest);
            }
        }

        let unknown = resolved
            .values()
            .filter(|r| matches!(r.latest_version, Some(LatestVersion::Unknown)))
            .count();
        info!(
            resolved = submitted - unknown,
            unknown,
            "Version resolution complete"
        );

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeclaredVersion, DependencyRecord};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted version source: per-artifact result and delay
    struct ScriptedSource {
        versions: HashMap<String, Result<String, u16>>,
        delay: HashMap<String, Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                versions: HashMap::new(),
                delay: HashMap::new(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with(mut self, artifact: &str, result: Result<&str, u16>, delay: Duration) -> Self {
            self.versions
                .insert(artifact.to_string(), result.map(str::to_string));
            self.delay.insert(artifact.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl VersionSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn latest_version(&self, _group_id: &str, artifact_id: &str) -> Result<String, RegistryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay.get(artifact_id) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.versions.get(artifact_id) {
                Some(Ok(v)) => Ok(v.clone()),
                Some(Err(status)) => Err(RegistryError::Status(*status)),
                None => Err(RegistryError::Status(404)),
            }
        }
    }

    fn deps(artifacts: &[&str]) -> DependencyMap {
        artifacts
            .iter()
            .map(|a| {
                (
                    a.to_string(),
                    DependencyRecord::new("org.test", *a, DeclaredVersion::Explicit("1.0.0".into())),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_every_entry_gets_a_version() {
        let source = ScriptedSource::new()
            .with("ok", Ok("2.1.0"), Duration::ZERO)
            .with("missing", Err(404), Duration::ZERO)
            .with("broken", Err(500), Duration::ZERO);
        let resolver = VersionResolver::new(Arc::new(source), Duration::from_secs(5), 4);

        let resolved = resolver.resolve(deps(&["ok", "missing", "broken"])).await;

        assert_eq!(resolved.len(), 3);
        assert!(resolved.values().all(|r| r.latest_version.is_some()));
        assert_eq!(resolved["ok"].latest_str(), "2.1.0");
        assert_eq!(resolved["missing"].latest_str(), "UNKNOWN");
        assert_eq!(resolved["broken"].latest_str(), "UNKNOWN");
    }

    #[tokio::test]
    async fn test_timeout_resolves_unknown_without_blocking_others() {
        let source = ScriptedSource::new()
            .with("test-artifact", Ok("2.1.0"), Duration::ZERO)
            .with("test-artifact2", Ok("9.9.9"), Duration::from_secs(5));
        let resolver = VersionResolver::new(Arc::new(source), Duration::from_millis(100), 2);

        let started = std::time::Instant::now();
        let resolved = resolver.resolve(deps(&["test-artifact", "test-artifact2"])).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(resolved["test-artifact"].latest_str(), "2.1.0");
        assert_eq!(resolved["test-artifact2"].latest_version, Some(LatestVersion::Unknown));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let names = ["a", "b", "c", "d", "e", "f"];
        let mut source = ScriptedSource::new();
        for name in names {
            source = source.with(name, Ok("1.1"), Duration::from_millis(30));
        }
        let source = Arc::new(source);
        let resolver = VersionResolver::new(source.clone(), Duration::from_secs(5), 2);

        let resolved = resolver.resolve(deps(&names)).await;

        assert_eq!(resolved.len(), names.len());
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_order_preserved_after_merge() {
        let source = ScriptedSource::new()
            .with("slow", Ok("1"), Duration::from_millis(40))
            .with("fast", Ok("2"), Duration::ZERO);
        let resolver = VersionResolver::new(Arc::new(source), Duration::from_secs(5), 2);

        let resolved = resolver.resolve(deps(&["slow", "fast"])).await;
        let keys: Vec<_> = resolved.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["slow", "fast"]);
    }

    #[test]
    fn test_zero_worker_limit_clamped() {
        let resolver = VersionResolver::new(Arc::new(ScriptedSource::new()), Duration::from_secs(1), 0);
        assert_eq!(resolver.worker_limit(), 1);
    }
}
