//! Integration tests for the vault provider against a mocked trust broker.
//!
//! Each test starts its own broker so tests can run in parallel.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use vestibule::environ::{Environ, Provider};
use vestibule::secrets::vault::{
    AwsConfig, GcpConfig, GcpCredType, KvKey, VaultConfig, VaultProvider,
};
use vestibule::secrets::{ErrorKind, SecretString};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, keys: &str) -> VaultConfig {
    VaultConfig {
        address: server.uri(),
        token: Some(SecretString::new("s.integration")),
        keys: vestibule::secrets::vault::kv::parse_keys(keys).unwrap(),
        ..VaultConfig::default()
    }
}

fn versioned(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": {"data": data, "metadata": {"version": 1}}
    }))
}

fn legacy(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"data": data}))
}

async fn run(config: VaultConfig) -> BTreeMap<String, String> {
    let environ = Environ::new();
    let provider = VaultProvider::new(config).expect("provider should build");
    provider.add_to_environ(&environ).await.expect("provider should run");
    environ.map()
}

#[tokio::test]
async fn test_single_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secrets/data/foo/bar/0"))
        .and(header("X-Vault-Token", "s.integration"))
        .respond_with(versioned(json!({"0": "data"})))
        .expect(1)
        .mount(&server)
        .await;

    let env = run(config(&server, "secrets/foo/bar/0")).await;
    assert_eq!(env, BTreeMap::from([("0".to_string(), "data".to_string())]));
}

#[tokio::test]
async fn test_overlapping_keys_never_overwrite() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secrets/data/foo/bar/3"))
        .respond_with(versioned(json!({"a": "first", "b": "first", "c": "first"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/secrets/data/foo/bar/baz/3"))
        .respond_with(versioned(json!({"a": "second", "b": "second", "c": "second", "d": "second"})))
        .mount(&server)
        .await;

    let env = run(config(&server, "secrets/foo/bar/3:/secrets/foo/bar/baz/3")).await;
    assert_eq!(env.len(), 4);
    assert_eq!(env.get("D").map(String::as_str), Some("second"));

    // a, b and c come from whichever key landed first, never a mix
    let a = env.get("A").cloned().unwrap();
    assert_eq!(env.get("B"), Some(&a));
    assert_eq!(env.get("C"), Some(&a));
}

#[tokio::test]
async fn test_requested_version_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .and(query_param("version", "7"))
        .respond_with(versioned(json!({"DB_PASSWORD": "v7"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server, "");
    config.keys = vec![KvKey::new("secret/app").with_version(7)];
    let env = run(config).await;
    assert_eq!(env.get("DB_PASSWORD").map(String::as_str), Some("v7"));
}

#[tokio::test]
async fn test_versioned_404_falls_back_to_legacy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/data/foo/bar"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/foo/bar"))
        .respond_with(legacy(json!({"foo": "bar"})))
        .expect(1)
        .mount(&server)
        .await;

    let env = run(config(&server, "kv/foo/bar")).await;
    assert_eq!(env, BTreeMap::from([("FOO".to_string(), "bar".to_string())]));
}

#[tokio::test]
async fn test_versioned_error_falls_back_to_legacy() {
    for status in [500, 403] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/data/foo/bar"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"errors": ["nope"]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/kv/foo/bar"))
            .respond_with(legacy(json!({"foo": "bar"})))
            .expect(1)
            .mount(&server)
            .await;

        let env = run(config(&server, "kv/foo/bar")).await;
        assert_eq!(env, BTreeMap::from([("FOO".to_string(), "bar".to_string())]), "status {}", status);
    }
}

#[tokio::test]
async fn test_versioned_null_data_falls_back_to_legacy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/data/foo/bar"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/foo/bar"))
        .respond_with(legacy(json!({"foo": "bar"})))
        .expect(1)
        .mount(&server)
        .await;

    let env = run(config(&server, "kv/foo/bar")).await;
    assert_eq!(env, BTreeMap::from([("FOO".to_string(), "bar".to_string())]));
}

#[tokio::test]
async fn test_versioned_success_skips_legacy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/data/foo/bar"))
        .respond_with(versioned(json!({"foo": "bar"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/kv/foo/bar"))
        .respond_with(legacy(json!({"foo": "legacy"})))
        .expect(0)
        .mount(&server)
        .await;

    let env = run(config(&server, "kv/foo/bar")).await;
    assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
}

#[tokio::test]
async fn test_missing_key_does_not_affect_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/present"))
        .respond_with(versioned(json!({"PRESENT": "yes"})))
        .mount(&server)
        .await;

    // Every other path 404s, on both the versioned and legacy reads
    let env = run(config(&server, "secret/missing:secret/present")).await;
    assert_eq!(env, BTreeMap::from([("PRESENT".to_string(), "yes".to_string())]));
}

#[tokio::test]
async fn test_namespace_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .and(header("X-Vault-Namespace", "team-a"))
        .respond_with(versioned(json!({"A": "1"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server, "secret/app");
    config.namespace = Some("team-a".to_string());
    assert_eq!(run(config).await.len(), 1);
}

#[tokio::test]
async fn test_aws_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/aws/sts/deployer"))
        .respond_with(legacy(json!({
            "access_key": "aws-access-key",
            "secret_key": "aws-secret-key",
            "security_token": "aws-session-token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("aws/credentials");

    let mut config = config(&server, "");
    let mut aws = AwsConfig::new("deployer");
    aws.credentials_file = file.clone();
    config.aws = Some(aws);

    let env = run(config).await;
    assert_eq!(env.len(), 4);
    assert_eq!(env["AWS_ACCESS_KEY_ID"], "aws-access-key");
    assert_eq!(env["AWS_SECRET_ACCESS_KEY"], "aws-secret-key");
    assert_eq!(env["AWS_SESSION_TOKEN"], "aws-session-token");
    assert_eq!(env["AWS_SHARED_CREDENTIALS_FILE"], file.display().to_string());

    let ini = ini::Ini::load_from_file(&file).unwrap();
    let default = ini.section(Some("default")).unwrap();
    assert_eq!(default.get("aws_access_key_id"), Some("aws-access-key"));
    assert_eq!(default.get("aws_secret_access_key"), Some("aws-secret-key"));
    assert_eq!(default.get("aws_session_token"), Some("aws-session-token"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[tokio::test]
async fn test_aws_failure_keeps_kv_secrets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .respond_with(versioned(json!({"A": "1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/aws/sts/deployer"))
        .respond_with(ResponseTemplate::new(500).set_body_string("sts unavailable"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&server, "secret/app");
    let mut aws = AwsConfig::new("deployer");
    aws.credentials_file = dir.path().join("credentials");
    config.aws = Some(aws);

    let env = run(config).await;
    assert_eq!(env, BTreeMap::from([("A".to_string(), "1".to_string())]));
    assert!(!dir.path().join("credentials").exists());
}

#[tokio::test]
async fn test_gcp_key_is_written_to_file() {
    use base64::Engine;

    let key = r#"{"type":"service_account","project_id":"demo"}"#;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/gcp/key/reader"))
        .respond_with(legacy(json!({
            "private_key_data": base64::engine::general_purpose::STANDARD.encode(key)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("gcp/credentials.json");

    let mut config = config(&server, "");
    let mut gcp = GcpConfig::new("reader", GcpCredType::Key);
    gcp.credentials_file = file.clone();
    config.gcp = Some(gcp);

    let env = run(config).await;
    assert_eq!(env["GOOGLE_APPLICATION_CREDENTIALS"], file.display().to_string());
    assert_eq!(std::fs::read_to_string(&file).unwrap(), key);
}

#[tokio::test]
async fn test_gcp_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/gcp/token/reader"))
        .respond_with(legacy(json!({"token": "ya29.token", "expires_at_seconds": 1700000000})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server, "");
    config.gcp = Some(GcpConfig::new("reader", GcpCredType::Token));

    let env = run(config).await;
    assert_eq!(env, BTreeMap::from([("GOOGLE_OAUTH_ACCESS_TOKEN".to_string(), "ya29.token".to_string())]));
}

#[tokio::test]
async fn test_approle_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .and(body_json(json!({"role_id": "my-role", "secret_id": "my-secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {"client_token": "s.session", "lease_duration": 3600}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .and(header("X-Vault-Token", "s.session"))
        .respond_with(versioned(json!({"A": "1"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server, "secret/app");
    config.token = None;
    config.auth.role = Some(SecretString::new("my-role"));
    config.auth.secret = Some(SecretString::new("my-secret"));

    assert_eq!(run(config).await.len(), 1);
}

#[tokio::test]
async fn test_jwt_login_on_custom_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/oidc-ci/login"))
        .and(body_json(json!({"role": "ci", "jwt": "eyJ.token"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {"client_token": "s.jwt"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .and(header("X-Vault-Token", "s.jwt"))
        .respond_with(versioned(json!({"A": "1"})))
        .mount(&server)
        .await;

    let mut config = config(&server, "secret/app");
    config.token = None;
    config.auth.path = Some("oidc-ci".to_string());
    config.auth.role = Some(SecretString::new("ci"));
    config.auth.jwt = Some(SecretString::new("eyJ.token"));

    assert_eq!(run(config).await.len(), 1);
}

#[tokio::test]
async fn test_kubernetes_login_reads_token_file() {
    let dir = tempfile::tempdir().unwrap();
    let token_file = dir.path().join("token");
    std::fs::write(&token_file, "k8s-service-account-jwt\n").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/kubernetes/login"))
        .and(body_json(json!({"role": "web", "jwt": "k8s-service-account-jwt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "auth": {"client_token": "s.k8s"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .respond_with(versioned(json!({"A": "1"})))
        .mount(&server)
        .await;

    let mut config = config(&server, "secret/app");
    config.token = None;
    config.auth.role = Some(SecretString::new("web"));
    config.auth.k8s_token_path = token_file;

    assert_eq!(run(config).await.len(), 1);
}

#[tokio::test]
async fn test_auth_rejection_fails_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/approle/login"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"errors": ["permission denied"]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(versioned(json!({"A": "1"})))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config(&server, "secret/app");
    config.token = None;
    config.auth.role = Some(SecretString::new("my-role"));
    config.auth.secret = Some(SecretString::new("wrong"));

    let environ = Environ::new();
    let provider = VaultProvider::new(config).unwrap();
    let err = provider.add_to_environ(&environ).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authentication, "unexpected error: {}", err);
    assert!(environ.is_empty());
}
