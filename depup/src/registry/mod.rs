//! Package registry lookups
//!
//! - **maven** - Maven-repository metadata client
//! - **resolver** - bounded-concurrency fan-out with per-lookup timeout

pub mod maven;
pub mod resolver;

pub use maven::MavenRegistryClient;
pub use resolver::VersionResolver;

use async_trait::async_trait;
use thiserror::Error;

/// Registry lookup error
///
/// Never fatal for a run: the resolver maps every variant to `UNKNOWN`.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status
    #[error("Registry returned HTTP {0}")]
    Status(u16),

    /// Metadata document unreadable or missing `versioning/latest`
    #[error("Parse error: {0}")]
    Parse(String),

    /// Lookup exceeded its deadline
    #[error("Lookup timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Source of latest published versions
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Latest published version of `group_id:artifact_id`
    async fn latest_version(&self, group_id: &str, artifact_id: &str) -> Result<String, RegistryError>;
}
