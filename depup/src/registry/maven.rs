//! Maven repository metadata client
//!
//! Endpoint: `{base}/{group with '.' → '/'}/{artifact}/maven-metadata.xml`
//! Response: XML document carrying `versioning/latest`.

use super::{RegistryError, VersionSource};
use async_trait::async_trait;
use reqwest::{header, Client};
use roxmltree::Document;
use std::time::Duration;
use tracing::debug;

/// User-Agent header sent with registry requests
const USER_AGENT: &str = concat!("depup/", env!("CARGO_PKG_VERSION"));

/// Maven repository client
pub struct MavenRegistryClient {
    http_client: Client,
    base_url: String,
}

impl MavenRegistryClient {
    /// Create a client for `base_url` (e.g. `https://repo1.maven.org/maven2`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Metadata URL for one artifact
    pub fn metadata_url(&self, group_id: &str, artifact_id: &str) -> String {
        format!(
            "{}/{}/{}/maven-metadata.xml",
            self.base_url,
            group_id.replace('.', "/"),
            artifact_id
        )
    }
}

/// Extract `versioning/latest` from a metadata document
pub fn parse_latest_version(xml: &str) -> Result<String, RegistryError> {
    let doc = Document::parse(xml).map_err(|e| RegistryError::Parse(e.to_string()))?;

    doc.root_element()
        .children()
        .filter(|n| n.has_tag_name("versioning"))
        .flat_map(|versioning| versioning.children())
        .find(|n| n.has_tag_name("latest"))
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RegistryError::Parse("metadata has no versioning/latest".to_string()))
}

#[async_trait]
impl VersionSource for MavenRegistryClient {
    fn name(&self) -> &'static str {
        "maven"
    }

    async fn latest_version(&self, group_id: &str, artifact_id: &str) -> Result<String, RegistryError> {
        let url = self.metadata_url(group_id, artifact_id);
        debug!(url = %url, "Querying registry metadata");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RegistryError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        parse_latest_version(&body)
    }
}
