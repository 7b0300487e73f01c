//! Manifest → registry → rewrite against a mocked Maven repository

use depup::manifest::{parse_manifest, plan_manifest_update, update_manifest};
use depup::registry::{MavenRegistryClient, VersionResolver};
use depup::types::{DeclaredVersion, LatestVersion};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
    <modelVersion>4.0.0</modelVersion>
    <groupId>com.example</groupId>
    <artifactId>demo</artifactId>
    <version>0.1.0</version>

    <dependencies>
        <!-- upgraded -->
        <dependency>
            <groupId>org.test</groupId>
            <artifactId>test-artifact</artifactId>
            <version>1.0.0</version>
        </dependency>
        <dependency>
            <groupId>org.test2</groupId>
            <artifactId>test-artifact2</artifactId>
            <version>3.0</version>
        </dependency>
    </dependencies>
</project>
"#;

fn metadata(latest: &str) -> String {
    format!(
        "<metadata><groupId>g</groupId><artifactId>a</artifactId>\
         <versioning><latest>{latest}</latest><release>{latest}</release></versioning></metadata>"
    )
}

async fn registry() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/org/test/test-artifact/maven-metadata.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(metadata("2.1.0")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/org/test2/test-artifact2/maven-metadata.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(metadata("4.0"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    server
}

fn resolver(server: &MockServer, timeout: Duration) -> VersionResolver {
    let client = MavenRegistryClient::new(server.uri(), Duration::from_secs(10)).unwrap();
    VersionResolver::new(Arc::new(client), timeout, 4)
}

#[tokio::test]
async fn test_upgrade_and_timeout_scenarios() {
    let server = registry().await;
    let dependencies = parse_manifest(POM).unwrap();
    assert_eq!(dependencies.len(), 2);

    let resolved = resolver(&server, Duration::from_millis(500)).resolve(dependencies).await;

    let upgraded = &resolved["test-artifact"];
    assert_eq!(upgraded.current_version, DeclaredVersion::Explicit("1.0.0".into()));
    assert_eq!(upgraded.latest_version, Some(LatestVersion::Known("2.1.0".into())));

    let timed_out = &resolved["test-artifact2"];
    assert_eq!(timed_out.latest_version, Some(LatestVersion::Unknown));

    let (plan, rewritten) = plan_manifest_update(POM, &resolved).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.updates[0].artifact_id, "test-artifact");
    assert_eq!(plan.updates[0].new_version, "2.1.0");

    let expected = POM.replacen("<version>1.0.0</version>", "<version>2.1.0</version>", 1);
    assert_eq!(rewritten.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_missing_artifact_resolves_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dependencies = parse_manifest(POM).unwrap();
    let resolved = resolver(&server, Duration::from_secs(2)).resolve(dependencies).await;

    assert!(resolved
        .values()
        .all(|d| d.latest_version == Some(LatestVersion::Unknown)));
    let (plan, rewritten) = plan_manifest_update(POM, &resolved).unwrap();
    assert!(plan.is_empty());
    assert!(rewritten.is_none());
}

#[tokio::test]
async fn test_update_manifest_file_with_backup() {
    let server = registry().await;
    let repo = TempDir::new().unwrap();
    let backups = TempDir::new().unwrap();
    let manifest = repo.path().join("pom.xml");
    fs::write(&manifest, POM).unwrap();

    let resolved = resolver(&server, Duration::from_millis(500))
        .resolve(parse_manifest(POM).unwrap())
        .await;
    let rewrite = update_manifest(&manifest, &resolved, Some(backups.path())).unwrap();

    assert!(rewrite.written);
    assert_eq!(fs::read_to_string(&rewrite.backup_path).unwrap(), POM);
    assert!(rewrite.backup_path.starts_with(backups.path()));

    let after = fs::read_to_string(&manifest).unwrap();
    assert!(after.contains("<version>2.1.0</version>"));
    assert!(after.contains("<version>3.0</version>"));

    // Second pass: nothing left to change, file untouched
    let resolved_again = resolver(&server, Duration::from_millis(500))
        .resolve(parse_manifest(&after).unwrap())
        .await;
    let second = update_manifest(&manifest, &resolved_again, Some(backups.path())).unwrap();
    assert!(!second.written);
    assert_eq!(fs::read_to_string(&manifest).unwrap(), after);
}
