use ohtanks_core::{Platform, RegistryError, RegistryResolver, SupabaseRegistry};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn versions_query() -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path("/rest/v1/versions"))
        .and(query_param("select", "*"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "1"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer anon-key"))
}

#[tokio::test]
async fn resolves_latest_release_for_platform() {
    let server = MockServer::start().await;
    versions_query()
        .and(query_param("platform", "eq.LINUX"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": 17,
            "version": "2.0.0",
            "platform": "LINUX",
            "download_url": "https://drive.google.com/file/d/ABC123/view?usp=sharing",
            "created_at": "2024-05-01T12:00:00.123456+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let registry = SupabaseRegistry::new(&server.uri(), "anon-key").expect("registry should build");
    let release = registry
        .resolve_latest(Platform::Linux)
        .await
        .expect("lookup should succeed")
        .expect("a release should be found");

    assert_eq!(release.version, "2.0.0");
    assert_eq!(release.platform, Platform::Linux);
    assert_eq!(
        release.download_url,
        "https://drive.google.com/file/d/ABC123/view?usp=sharing"
    );
}

#[tokio::test]
async fn timestamp_column_without_offset_is_accepted() {
    let server = MockServer::start().await;
    versions_query()
        .and(query_param("platform", "eq.WINDOWS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "version": "2.1.0",
            "platform": "WINDOWS",
            "download_url": "https://example.com/ohtanks-2.1.0.zip",
            "created_at": "2024-05-01T12:30:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let registry = SupabaseRegistry::new(&server.uri(), "anon-key").expect("registry should build");
    let release = registry
        .resolve_latest(Platform::Windows)
        .await
        .expect("naive timestamp should not fail the lookup")
        .expect("a release should be found");

    assert_eq!(release.version, "2.1.0");
    assert_eq!(
        release.created_at.map(|at| at.to_rfc3339()).as_deref(),
        Some("2024-05-01T12:30:00+00:00")
    );
}

#[tokio::test]
async fn empty_result_means_no_release() {
    let server = MockServer::start().await;
    versions_query()
        .and(query_param("platform", "eq.WINDOWS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let registry = SupabaseRegistry::new(&server.uri(), "anon-key").expect("registry should build");
    let release = registry
        .resolve_latest(Platform::Windows)
        .await
        .expect("lookup should succeed");
    assert!(release.is_none());
}

#[tokio::test]
async fn server_error_is_reported_with_body_snippet() {
    let server = MockServer::start().await;
    versions_query()
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let registry = SupabaseRegistry::new(&server.uri(), "anon-key").expect("registry should build");
    let error = registry
        .resolve_latest(Platform::MacOs)
        .await
        .expect_err("lookup should fail");

    let RegistryError::HttpStatus {
        status,
        ref body_snippet,
    } = error
    else {
        panic!("expected http status error, got {error:?}");
    };
    assert_eq!(status.as_u16(), 500);
    assert_eq!(body_snippet, ": upstream unavailable");
}

#[tokio::test]
async fn malformed_rows_are_parse_errors() {
    let server = MockServer::start().await;
    versions_query()
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": 2 }])))
        .mount(&server)
        .await;

    let registry = SupabaseRegistry::new(&server.uri(), "anon-key").expect("registry should build");
    let error = registry
        .resolve_latest(Platform::Linux)
        .await
        .expect_err("lookup should fail");
    assert!(matches!(error, RegistryError::Parse(_)));
}

#[tokio::test]
async fn custom_table_is_queried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/beta_versions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let registry = SupabaseRegistry::new(&server.uri(), "anon-key")
        .expect("registry should build")
        .with_table("beta_versions");
    let release = registry
        .resolve_latest(Platform::Linux)
        .await
        .expect("lookup should succeed");
    assert!(release.is_none());
}
