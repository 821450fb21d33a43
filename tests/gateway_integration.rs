mod fixtures;

use std::fs;
use std::path::Path;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use fixtures::TestFixtures;
use pdfgate::config::GateConfig;
use pdfgate::gateway::{router, AppState, BUILD_TAG};
use pdfgate::pipeline::Pipeline;
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "s3cret";
const BOUNDARY: &str = "X-PDFGATE-BOUNDARY";

fn app(dir: &Path, max_upload_mb: u64) -> Router {
    let config = GateConfig {
        upload_dir: dir.to_path_buf(),
        max_upload_mb,
        service_secret: SECRET.to_string(),
        ..GateConfig::default()
    };
    let pipeline = Pipeline::new(&config).unwrap();
    router(AppState::new(pipeline, &config.service_secret))
}

fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"upload.pdf\"\r\nContent-Type: application/pdf\r\n\r\n",
        BOUNDARY, field
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload(uri: &str, secret: Option<&str>, field: &str, data: &[u8]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(secret) = secret {
        builder = builder.header("x-secret", secret);
    }
    builder.body(Body::from(multipart_body(field, data))).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

const SCAN: &str = "/v1/security/scan-upload";

#[tokio::test]
async fn test_liveness_routes() {
    let dir = tempfile::tempdir().unwrap();

    let request = Request::get("/").body(Body::empty()).unwrap();
    let (status, json) = send(app(dir.path(), 15), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "security-gate");
    assert_eq!(json["ok"], true);
    assert_eq!(json["build"], BUILD_TAG);

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, json) = send(app(dir.path(), 15), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn test_upload_returns_report() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::open_action_pdf();

    let (status, json) = send(
        app(dir.path(), 15),
        upload(SCAN, Some(SECRET), "file", &input),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_pdf"], true);
    assert_eq!(json["is_encrypted"], false);
    assert_eq!(json["pages"], 1);
    assert_eq!(json["size_bytes"], input.len() as u64);
    assert_eq!(json["removed"]["open_actions"], 1);
    assert_eq!(json["removed"]["metadata_cleared"], 1);
    assert_eq!(json["notes"], "Sanitization complete");

    let path = json["sanitized_path"].as_str().unwrap();
    let stored = fs::read(path).unwrap();
    assert_eq!(json["sha256"], pdfgate::report::sha256_hex(&stored));
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        app(dir.path(), 15),
        upload(SCAN, Some("guess"), "file", &TestFixtures::minimal_pdf()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["detail"], "Unauthorized");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_secret_in_query_and_header_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = TestFixtures::minimal_pdf();

    let uri = format!("{}?x_secret={}", SCAN, SECRET);
    let (status, _) = send(app(dir.path(), 15), upload(&uri, None, "file", &pdf)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(app(dir.path(), 15), upload(&uri, Some("wrong"), "file", &pdf)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_upload_wins_over_auth() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(app(dir.path(), 15), upload(SCAN, None, "file", b"")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Empty file");
}

#[tokio::test]
async fn test_missing_file_field_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let (status, _) = send(
        app(dir.path(), 15),
        upload(SCAN, Some(SECRET), "document", &TestFixtures::minimal_pdf()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = b"%PDF-1.4\n".to_vec();
    data.resize(1024 * 1024 + 16, b' ');

    let (status, json) = send(app(dir.path(), 1), upload(SCAN, Some(SECRET), "file", &data)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["detail"], "File too large");
}

#[tokio::test]
async fn test_png_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        app(dir.path(), 15),
        upload(SCAN, Some(SECRET), "file", &TestFixtures::png_bytes()),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["detail"], "Only PDF files are allowed");
}

#[tokio::test]
async fn test_encrypted_upload_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        app(dir.path(), 15),
        upload(SCAN, Some(SECRET), "file", &TestFixtures::encrypted_pdf()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Password-protected/encrypted PDFs are not allowed");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_garbage_after_header_could_not_sanitize() {
    let dir = tempfile::tempdir().unwrap();
    let (status, json) = send(
        app(dir.path(), 15),
        upload(SCAN, Some(SECRET), "file", b"%PDF-1.7\nthis is not a document"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Could not sanitize");
}
