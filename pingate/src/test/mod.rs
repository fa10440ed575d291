//! End-to-end tests: the full application against a mocked Kubo RPC node.

use crate::Application;
use crate::config::Config;
use crate::test_utils::{TEST_API_KEY, create_test_config};
use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn app_against(kubo: &MockServer, config: Option<Config>) -> TestServer {
    let mut config = config.unwrap_or_else(create_test_config);
    config.ipfs.url = Url::parse(&kubo.uri()).unwrap();
    Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server()
}

fn kubo_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(500).set_body_json(json!({"Message": message, "Code": 0, "Type": "error"}))
}

async fn mount_add(kubo: &MockServer, cid: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Name": "upload", "Hash": cid, "Size": "12"})))
        .mount(kubo)
        .await;
}

async fn mount_not_pinned(kubo: &MockServer, cid: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v0/pin/ls"))
        .and(query_param("arg", cid))
        .respond_with(kubo_error(&format!("path '{cid}' is not pinned")))
        .mount(kubo)
        .await;
}

fn png_form(name: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(&b"\x89PNG\r\n\x1a\nrest"[..]).file_name(name).mime_type("image/png"),
    )
}

/// Upload a file while the node rejects the first two pin attempts.
#[test_log::test(tokio::test)]
async fn test_e2e_upload_retries_pin_until_success() {
    let kubo = MockServer::start().await;
    mount_add(&kubo, "bafye2eflaky").await;
    mount_not_pinned(&kubo, "bafye2eflaky").await;

    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .respond_with(kubo_error("context deadline exceeded"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&kubo)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .and(query_param("arg", "bafye2eflaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Pins": ["bafye2eflaky"]})))
        .expect(1)
        .mount(&kubo)
        .await;

    let server = app_against(&kubo, None).await;
    let response = server
        .post("/upload")
        .add_header("x-api-key", TEST_API_KEY)
        .multipart(png_form("logo.png"))
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({
        "cid": "bafye2eflaky",
        "name": "logo.png",
        "size": 12,
        "pinned": true,
    }));

    let pin_calls = kubo
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/api/v0/pin/add")
        .count();
    assert_eq!(pin_calls, 3);
}

/// Content the node already pins is not pinned again.
#[test_log::test(tokio::test)]
async fn test_e2e_upload_of_pinned_content_skips_pin_add() {
    let kubo = MockServer::start().await;
    mount_add(&kubo, "bafye2epinned").await;

    Mock::given(method("POST"))
        .and(path("/api/v0/pin/ls"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Keys": {"bafye2epinned": {"Type": "recursive"}}
        })))
        .mount(&kubo)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&kubo)
        .await;

    let server = app_against(&kubo, None).await;
    let response = server
        .post("/upload")
        .add_header("x-api-key", TEST_API_KEY)
        .multipart(png_form("logo.png"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["pinned"], true);
}

/// Every pin attempt fails: the upload still succeeds, reported as unpinned.
#[test_log::test(tokio::test)]
async fn test_e2e_upload_reports_unpinned_content() {
    let kubo = MockServer::start().await;
    mount_add(&kubo, "bafye2edead").await;
    mount_not_pinned(&kubo, "bafye2edead").await;
    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .respond_with(kubo_error("pinning service unavailable"))
        .expect(3)
        .mount(&kubo)
        .await;

    let server = app_against(&kubo, None).await;
    let response = server
        .post("/upload")
        .add_header("x-api-key", TEST_API_KEY)
        .multipart(png_form("logo.png"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["cid"], "bafye2edead");
    assert_eq!(body["pinned"], false);
}

#[test_log::test(tokio::test)]
async fn test_e2e_upload_with_unreachable_node() {
    let mut config = create_test_config();
    config.ipfs.url = Url::parse("http://127.0.0.1:1").unwrap();
    let server = Application::new(config).await.unwrap().into_test_server();

    let response = server
        .post("/upload")
        .add_header("x-api-key", TEST_API_KEY)
        .multipart(png_form("logo.png"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_json(&json!({"error": "Internal server error"}));
}

#[test_log::test(tokio::test)]
async fn test_e2e_download_streams_file() {
    let kubo = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/files/stat"))
        .and(query_param("arg", "/ipfs/bafye2efile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Hash": "bafye2efile", "Size": 11, "CumulativeSize": 22, "Blocks": 0, "Type": "file"
        })))
        .mount(&kubo)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", "bafye2efile"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .mount(&kubo)
        .await;

    let server = app_against(&kubo, None).await;
    let response = server.get("/file/bafye2efile").add_header("x-api-key", TEST_API_KEY).await;

    response.assert_status_ok();
    response.assert_header("content-type", "application/octet-stream");
    response.assert_header("content-disposition", "attachment; filename=\"file_bafye2efile\"");
    assert_eq!(response.as_bytes().as_ref(), b"hello world");
}

#[test_log::test(tokio::test)]
async fn test_e2e_download_directory_and_missing() {
    let kubo = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/files/stat"))
        .and(query_param("arg", "/ipfs/bafye2edir"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Hash": "bafye2edir", "Size": 0, "CumulativeSize": 300, "Blocks": 2, "Type": "directory"
        })))
        .mount(&kubo)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/files/stat"))
        .and(query_param("arg", "/ipfs/bafye2emissing"))
        .respond_with(kubo_error("no link named \"bafye2emissing\" under root"))
        .mount(&kubo)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&kubo)
        .await;

    let server = app_against(&kubo, None).await;

    let response = server.get("/file/bafye2edir").add_header("x-api-key", TEST_API_KEY).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    response.assert_json(&json!({"error": "Requested CID is not a file"}));

    let response = server.get("/file/bafye2emissing").add_header("x-api-key", TEST_API_KEY).await;
    response.assert_status(StatusCode::NOT_FOUND);
    response.assert_json(&json!({"error": "File not found"}));
}

#[test_log::test(tokio::test)]
async fn test_e2e_public_and_documentation_routes() {
    let kubo = MockServer::start().await;
    let server = app_against(&kubo, None).await;

    let health = server.get("/healthz").await;
    health.assert_status_ok();
    health.assert_text("OK");

    server.get("/openapi.json").await.assert_status(StatusCode::UNAUTHORIZED);

    let spec = server.get("/openapi.json").add_header("x-api-key", TEST_API_KEY).await;
    spec.assert_status_ok();
    let spec: serde_json::Value = spec.json();
    assert!(spec["paths"]["/upload"].is_object());

    let docs = server.get("/docs").add_header("x-api-key", TEST_API_KEY).await;
    docs.assert_status_ok();
    assert!(docs.text().contains("<html"));
}

#[test_log::test(tokio::test)]
async fn test_e2e_cors_preflight_without_key() {
    let kubo = MockServer::start().await;
    let server = app_against(&kubo, None).await;

    let response = server
        .method(axum::http::Method::OPTIONS, "/upload")
        .add_header("origin", "https://app.example.com")
        .add_header("access-control-request-method", "POST")
        .await;

    response.assert_status_ok();
    response.assert_header("access-control-allow-origin", "*");
}

#[test_log::test(tokio::test)]
async fn test_e2e_metrics_count_pin_outcomes() {
    let kubo = MockServer::start().await;
    mount_add(&kubo, "bafye2emetrics").await;
    mount_not_pinned(&kubo, "bafye2emetrics").await;
    Mock::given(method("POST"))
        .and(path("/api/v0/pin/add"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Pins": ["bafye2emetrics"]})))
        .mount(&kubo)
        .await;

    let mut config = create_test_config();
    config.enable_metrics = true;
    let server = app_against(&kubo, Some(config)).await;

    server
        .post("/upload")
        .add_header("x-api-key", TEST_API_KEY)
        .multipart(png_form("logo.png"))
        .await
        .assert_status_ok();

    let metrics = server.get("/internal/metrics").add_header("x-api-key", TEST_API_KEY).await;
    metrics.assert_status_ok();
    assert!(metrics.text().contains("pingate_pin_outcomes_total"));
}
