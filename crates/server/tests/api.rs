//! Integration tests for the HTTP API, driven through the router in memory.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use churn_core::config::AppConfig;
use churn_core::pipeline::IngestContext;
use churn_core::testing::ArchiveBuilder;
use providers::stub::StubProvider;
use providers::{Prediction, PredictionProvider, PredictionRequest, ProviderError};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "churn-test-boundary";

struct FixedGateway(Vec<Prediction>);

#[async_trait::async_trait]
impl PredictionProvider for FixedGateway {
    async fn predict(&self, _request: &PredictionRequest) -> Result<Vec<Prediction>, ProviderError> {
        Ok(self.0.clone())
    }
}

struct DownGateway;

#[async_trait::async_trait]
impl PredictionProvider for DownGateway {
    async fn predict(&self, _request: &PredictionRequest) -> Result<Vec<Prediction>, ProviderError> {
        Err(ProviderError::RequestFailed("connection refused".into()))
    }
}

struct TestApp {
    router: Router,
    config: Arc<AppConfig>,
    _media: tempfile::TempDir,
}

async fn setup_app(name: &str, gateway: Arc<dyn PredictionProvider>) -> TestApp {
    setup_app_with(name, gateway, |_| {}).await
}

async fn setup_app_with(
    name: &str,
    gateway: Arc<dyn PredictionProvider>,
    tweak: impl FnOnce(&mut AppConfig),
) -> TestApp {
    let media = tempfile::tempdir().unwrap();
    let pool = storage::connect(&format!("sqlite://file:{name}?mode=memory&cache=shared"))
        .await
        .unwrap();
    storage::migrate(&pool).await.unwrap();

    let mut config = AppConfig::default();
    config.storage.media_root = media.path().to_string_lossy().into_owned();
    config.gateway.retries = 0;
    tweak(&mut config);
    let config = Arc::new(config);

    let ctx = IngestContext::new(pool, gateway, config.clone()).unwrap();
    TestApp {
        router: server::build_router(server::AppState::new(ctx)),
        config,
        _media: media,
    }
}

fn bundle(config: &AppConfig) -> Vec<u8> {
    ArchiveBuilder::new()
        .xlsx(
            &format!("{}/clients.xlsx", config.storage.marketing_dir),
            &[
                &["ID", "Город фактический", "ОКВЭД2.Наименование"],
                &["1", "Moscow", "Logistics"],
                &["2", "Kazan", "Retail"],
            ],
        )
        .dir(&config.storage.interests_dir)
        .finish()
}

fn multipart_request(field: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"bundle.zip\"\r\nContent-Type: application/zip\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/clients/upload-zip")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

#[tokio::test]
async fn health_reports_ok() {
    let app = setup_app("api_health", Arc::new(StubProvider)).await;
    let response = app.router.oneshot(empty_request("GET", "/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn upload_returns_distinct_cities() {
    let app = setup_app("api_upload", Arc::new(StubProvider)).await;
    let response = app
        .router
        .oneshot(multipart_request("file", &bundle(&app.config)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-upload-id"));
    let body = extract_json(response.into_body()).await;
    let mut cities: Vec<String> = body["cities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    cities.sort();
    assert_eq!(cities, vec!["Kazan", "Moscow"]);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let app = setup_app("api_nofile", Arc::new(StubProvider)).await;
    let response = app
        .router
        .oneshot(multipart_request("attachment", b"whatever"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn upload_without_multipart_body_is_rejected() {
    let app = setup_app("api_nobody", Arc::new(StubProvider)).await;
    let response = app
        .router
        .oneshot(empty_request("POST", "/clients/upload-zip/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"], "no file was attached to the request");
}

#[tokio::test]
async fn upload_missing_folder_is_rejected() {
    let app = setup_app("api_structure", Arc::new(StubProvider)).await;
    let bytes = ArchiveBuilder::new()
        .dir(&app.config.storage.marketing_dir)
        .finish();
    let response = app
        .router
        .oneshot(multipart_request("file", &bytes))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains(&app.config.storage.interests_dir));
}

#[tokio::test]
async fn upload_expanding_past_the_cap_is_rejected() {
    let app = setup_app_with("api_zip_cap", Arc::new(StubProvider), |config| {
        config.storage.max_upload_bytes = 1024 * 1024;
        config.storage.max_extracted_bytes = 4 * 1024 * 1024;
    })
    .await;
    let bytes = ArchiveBuilder::new()
        .dir(&app.config.storage.interests_dir)
        .deflated_file(
            &format!("{}/zeros.xlsx", app.config.storage.marketing_dir),
            vec![0u8; 32 * 1024 * 1024],
        )
        .finish();
    assert!(bytes.len() < 1024 * 1024);

    let response = app
        .router
        .oneshot(multipart_request("file", &bytes))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let uploads_root = app.config.storage.uploads_root();
    assert_eq!(std::fs::read_dir(uploads_root).unwrap().count(), 0);
}

#[tokio::test]
async fn listing_a_removed_bundle_is_not_found() {
    let app = setup_app("api_stale", Arc::new(StubProvider)).await;
    let upload = app
        .router
        .clone()
        .oneshot(multipart_request("file", &bundle(&app.config)))
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::OK);
    let id = upload.headers()["x-upload-id"].to_str().unwrap().to_string();
    std::fs::remove_dir_all(app.config.storage.uploads_root().join(&id)).unwrap();

    let response = app.router.oneshot(empty_request("GET", "/clients/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn listing_scores_and_stores_matched_clients() {
    let app = setup_app(
        "api_listing",
        Arc::new(FixedGateway(vec![Prediction::new(1, 0.85), Prediction::new(77, 0.3)])),
    )
    .await;

    let upload = app
        .router
        .clone()
        .oneshot(multipart_request("file", &bundle(&app.config)))
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::OK);

    let response = app
        .router
        .clone()
        .oneshot(empty_request(
            "GET",
            "/clients/?isMSP=1&companySize=small&cityActual=Moscow",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-unmatched-count"], "1");
    let body = extract_json(response.into_body()).await;
    assert_eq!(
        body,
        json!([{"id": 1, "OKVED2Name": "Logistics", "leavingChance": 0.85}])
    );

    let stored = app
        .router
        .oneshot(empty_request("GET", "/clients/1/"))
        .await
        .unwrap();
    assert_eq!(stored.status(), StatusCode::OK);
}

#[tokio::test]
async fn listing_before_any_upload_is_empty() {
    let app = setup_app("api_listing_empty", Arc::new(StubProvider)).await;
    let response = app.router.oneshot(empty_request("GET", "/clients/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(extract_json(response.into_body()).await, json!([]));
}

#[tokio::test]
async fn listing_with_unknown_upload_is_not_found() {
    let app = setup_app("api_listing_unknown", Arc::new(StubProvider)).await;
    let response = app
        .router
        .oneshot(empty_request("GET", "/clients/?upload=nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn gateway_outage_is_bad_gateway() {
    let app = setup_app("api_gateway_down", Arc::new(DownGateway)).await;
    let upload = app
        .router
        .clone()
        .oneshot(multipart_request("file", &bundle(&app.config)))
        .await
        .unwrap();
    assert_eq!(upload.status(), StatusCode::OK);

    let response = app.router.oneshot(empty_request("GET", "/clients/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn crud_round_trip() {
    let app = setup_app("api_crud", Arc::new(StubProvider)).await;
    let router = app.router;

    let created = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/clients/",
            json!({"id": 5, "OKVED2Name": "Mining", "leavingChance": 0.4}),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);

    let duplicate = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/clients/",
            json!({"id": 5, "OKVED2Name": "Mining", "leavingChance": 0.4}),
        ))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    let updated = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/clients/5/",
            json!({"OKVED2Name": "Energy", "leavingChance": 0.7}),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);

    let patched = router
        .clone()
        .oneshot(json_request("PATCH", "/clients/5", json!({"leavingChance": 0.1})))
        .await
        .unwrap();
    assert_eq!(
        extract_json(patched.into_body()).await,
        json!({"id": 5, "OKVED2Name": "Energy", "leavingChance": 0.1})
    );

    let deleted = router
        .clone()
        .oneshot(empty_request("DELETE", "/clients/5/"))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = router
        .oneshot(empty_request("GET", "/clients/5/"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() {
    let app = setup_app("api_invalid", Arc::new(StubProvider)).await;
    let router = app.router;

    let missing_field = router
        .clone()
        .oneshot(json_request("POST", "/clients/", json!({"id": 9})))
        .await
        .unwrap();
    assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);

    let long_name = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/clients/",
            json!({"id": 9, "OKVED2Name": "x".repeat(256), "leavingChance": 0.5}),
        ))
        .await
        .unwrap();
    assert_eq!(long_name.status(), StatusCode::BAD_REQUEST);

    let unknown = router
        .oneshot(json_request(
            "PUT",
            "/clients/404/",
            json!({"OKVED2Name": "Energy", "leavingChance": 0.7}),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
