//! End-to-end tests of the HTTP API over in-memory stores and the real
//! transcoder. Sources are generated in-process and served by a fixture
//! fetcher, so no network access is needed.

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use gallery_intake::api;
use gallery_intake::catalog::{CatalogStore, MemoryCatalog};
use gallery_intake::config::PaginationConfig;
use gallery_intake::fetch::{FetchError, Fetcher};
use gallery_intake::imaging::{EncodeParams, RustBackend, Speed, TranscodeConfig, TranscodePool};
use gallery_intake::ingest::{Orchestrator, Timeouts};
use gallery_intake::state::AppState;
use gallery_intake::storage::{ArtifactStore, FilesystemStore, MemoryStore};

const BASE: &str = "http://localhost/artifacts";
const PHOTO: &str = "https://photos.example.com/dawn.png";
const OTHER: &str = "https://photos.example.com/dusk.jpg";
const WIDE: &str = "https://photos.example.com/wide.png";
const JUNK: &str = "https://photos.example.com/not-an-image.png";

// =============================================================================
// Fixtures
// =============================================================================

fn gradient(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 96])
    })
}

fn encoded(width: u32, height: u32, format: image::ImageFormat) -> Bytes {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height).write_to(&mut out, format).unwrap();
    Bytes::from(out.into_inner())
}

/// Serves generated images for a fixed set of URLs; everything else 404s.
struct FixtureFetcher {
    bodies: HashMap<&'static str, Bytes>,
}

impl FixtureFetcher {
    fn new() -> Self {
        let bodies = HashMap::from([
            (PHOTO, encoded(64, 48, image::ImageFormat::Png)),
            (OTHER, encoded(40, 60, image::ImageFormat::Jpeg)),
            (WIDE, encoded(960, 240, image::ImageFormat::Png)),
            (JUNK, Bytes::from_static(b"definitely not pixels")),
        ]);
        Self { bodies }
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.bodies.get(url).cloned().ok_or(FetchError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}

/// Production settings except for encoder effort, which is turned down to
/// keep the suite quick.
fn fast_transcode() -> TranscodeConfig {
    TranscodeConfig {
        full: EncodeParams {
            speed: Speed::new(10),
            ..EncodeParams::full()
        },
        preview: EncodeParams::preview(),
    }
}

fn orchestrator(store: Arc<dyn ArtifactStore>, catalog: Arc<dyn CatalogStore>) -> Orchestrator {
    let pool = TranscodePool::new(Arc::new(RustBackend::new()), fast_transcode(), 2).unwrap();
    Orchestrator::new(
        Arc::new(FixtureFetcher::new()),
        Arc::new(pool),
        store,
        catalog,
        Timeouts::default(),
    )
}

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    catalog: Arc<MemoryCatalog>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new(BASE));
    let catalog = Arc::new(MemoryCatalog::new());
    let state = AppState::new(
        orchestrator(store.clone(), catalog.clone()),
        PaginationConfig::default(),
    );
    TestApp {
        router: api::app(state),
        store,
        catalog,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

async fn send_json(router: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, bytes) = send(router, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, bytes) = send(router, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn create(app: &TestApp, url: &str) -> Value {
    let (status, record) = send_json(&app.router, "POST", "/images", json!({ "url": url })).await;
    assert_eq!(status, StatusCode::OK, "create failed: {record}");
    record
}

fn locator(record: &Value, field: &str) -> String {
    record[field].as_str().unwrap().to_string()
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap()
}

// =============================================================================
// Listing
// =============================================================================

#[tokio::test]
async fn empty_catalog_lists_no_pages() {
    let app = test_app();
    let (status, body) = get_json(&app.router, "/images").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "data": [], "page": 1, "limit": 12, "total": 0, "totalPages": 0 })
    );
}

#[tokio::test]
async fn five_records_in_pages_of_two() {
    let app = test_app();
    let mut created = Vec::new();
    for _ in 0..5 {
        created.push(create(&app, PHOTO).await["id"].clone());
    }

    let mut seen = Vec::new();
    for page in 1..=3 {
        let (status, body) = get_json(&app.router, &format!("/images?page={page}&limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 5);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["page"], page);
        assert_eq!(body["limit"], 2);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), if page == 3 { 1 } else { 2 });
        seen.extend(data.iter().map(|r| r["id"].clone()));
    }

    // Newest first, every record exactly once.
    created.reverse();
    assert_eq!(seen, created);

    let (status, beyond) = get_json(&app.router, "/images?page=4&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(beyond["data"], json!([]));
    assert_eq!(beyond["totalPages"], 3);
}

#[tokio::test]
async fn junk_paging_parameters_fall_back_to_defaults() {
    let app = test_app();
    let (status, body) = get_json(&app.router, "/images?page=abc&limit=-3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 12);
}

#[tokio::test]
async fn oversized_limit_is_capped() {
    let app = test_app();
    let (_, body) = get_json(&app.router, "/images?limit=5000").await;
    assert_eq!(body["limit"], 100);
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn create_stores_resolvable_artifacts() {
    let app = test_app();
    let record = create(&app, PHOTO).await;

    assert_eq!(record["source_url"], PHOTO);
    assert_eq!(record["width"], 64);
    assert_eq!(record["height"], 48);
    assert_eq!(record["created_at"], record["updated_at"]);

    let full = app.store.resolve(&locator(&record, "full_locator")).unwrap();
    let preview = app.store.resolve(&locator(&record, "preview_locator")).unwrap();
    assert_eq!(full.content_type, "image/avif");
    assert_eq!(preview.content_type, "image/avif");
    assert!(!preview.bytes.is_empty());
    assert!(preview.bytes.len() <= full.bytes.len());

    // The listed record is the one just created.
    let (_, page) = get_json(&app.router, "/images").await;
    assert_eq!(page["data"][0], record);
}

#[tokio::test]
async fn preview_is_downscaled_full_is_not() {
    let app = test_app();
    let record = create(&app, WIDE).await;
    assert_eq!((record["width"].as_u64(), record["height"].as_u64()), (Some(960), Some(240)));

    let backend = RustBackend::new();
    let decode = |field: &str| {
        let bytes = app.store.resolve(&locator(&record, field)).unwrap().bytes;
        gallery_intake::imaging::ImageBackend::decode(&backend, &bytes).unwrap()
    };
    let full = decode("full_locator");
    let preview = decode("preview_locator");
    assert_eq!((full.width(), full.height()), (960, 240));
    assert_eq!((preview.width(), preview.height()), (480, 120));
}

#[tokio::test]
async fn create_accepts_jpeg_sources() {
    let app = test_app();
    let record = create(&app, OTHER).await;
    assert_eq!((record["width"].as_u64(), record["height"].as_u64()), (Some(40), Some(60)));
}

#[tokio::test]
async fn create_without_url_is_rejected() {
    let app = test_app();
    for body in [json!({}), json!({ "url": "" }), json!({ "url": "   " })] {
        let (status, err) = send_json(&app.router, "POST", "/images", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&err), "VALIDATION_ERROR");
    }
    assert_eq!(app.catalog.count().await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/images")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, bytes) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn unreachable_source_commits_nothing() {
    let app = test_app();
    create(&app, PHOTO).await;

    let (status, err) = send_json(
        &app.router,
        "POST",
        "/images",
        json!({ "url": "https://photos.example.com/missing.png" }),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&err), "INTERNAL_ERROR");
    assert!(!err["error"]["message"].as_str().unwrap().contains("missing.png"));
    assert_eq!(app.catalog.count().await.unwrap(), 1);
    assert_eq!(app.store.len(), 2);
}

#[tokio::test]
async fn undecodable_source_commits_nothing() {
    let app = test_app();
    let (status, _) = send_json(&app.router, "POST", "/images", json!({ "url": JUNK })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.catalog.count().await.unwrap(), 0);
    assert!(app.store.is_empty());
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn update_replaces_artifacts() {
    let app = test_app();
    let before = create(&app, PHOTO).await;

    let (status, after) = send_json(
        &app.router,
        "PUT",
        "/images",
        json!({ "id": before["id"], "url": OTHER }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["id"], before["id"]);
    assert_eq!(after["source_url"], OTHER);
    assert_eq!(after["created_at"], before["created_at"]);
    assert_eq!((after["width"].as_u64(), after["height"].as_u64()), (Some(40), Some(60)));

    for field in ["full_locator", "preview_locator"] {
        assert_ne!(after[field], before[field]);
        assert!(app.store.resolve(&locator(&before, field)).is_none());
        assert!(app.store.resolve(&locator(&after, field)).is_some());
    }
    assert_eq!(app.store.len(), 2);
}

#[tokio::test]
async fn update_errors() {
    let app = test_app();
    let record = create(&app, PHOTO).await;

    let (status, err) = send_json(
        &app.router,
        "PUT",
        "/images",
        json!({ "id": uuid::Uuid::new_v4(), "url": OTHER }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&err), "NOT_FOUND");

    let (status, _) =
        send_json(&app.router, "PUT", "/images", json!({ "id": "nope", "url": OTHER })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&app.router, "PUT", "/images", json!({ "id": record["id"] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(&app.router, "PUT", "/images", json!({ "url": OTHER })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_update_keeps_the_old_record() {
    let app = test_app();
    let before = create(&app, PHOTO).await;

    let (status, _) = send_json(
        &app.router,
        "PUT",
        "/images",
        json!({ "id": before["id"], "url": JUNK }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (_, page) = get_json(&app.router, "/images").await;
    assert_eq!(page["data"][0], before);
    assert!(app.store.resolve(&locator(&before, "full_locator")).is_some());
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn delete_removes_record_and_artifacts() {
    let app = test_app();
    let record = create(&app, PHOTO).await;

    let (status, body) =
        send_json(&app.router, "DELETE", "/images", json!({ "id": record["id"] })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "id": record["id"] }));

    assert!(app.store.is_empty());
    let (_, page) = get_json(&app.router, "/images").await;
    assert_eq!(page["total"], 0);

    let (status, err) =
        send_json(&app.router, "DELETE", "/images", json!({ "id": record["id"] })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&err), "NOT_FOUND");
}

#[tokio::test]
async fn delete_requires_a_valid_id() {
    let app = test_app();
    let (status, _) = send_json(&app.router, "DELETE", "/images", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_json(&app.router, "DELETE", "/images", json!({ "id": "42" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Health and artifact serving
// =============================================================================

#[tokio::test]
async fn health_probes() {
    let app = test_app();
    for (uri, expected) in [("/health/liveness", "ok"), ("/health/readiness", "ready")] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from(expected));
    }
}

#[tokio::test]
async fn filesystem_artifacts_are_served_at_their_locator() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FilesystemStore::new(tmp.path(), BASE));
    store.validate().await.unwrap();
    let state = AppState::new(
        orchestrator(store.clone(), Arc::new(MemoryCatalog::new())),
        PaginationConfig::default(),
    )
    .serving_artifacts_from(tmp.path());
    let router = api::app(state);

    let (status, record) = send_json(&router, "POST", "/images", json!({ "url": PHOTO })).await;
    assert_eq!(status, StatusCode::OK);

    let full = locator(&record, "full_locator");
    let path = full.strip_prefix("http://localhost").unwrap();
    let request = Request::builder().uri(path).body(Body::empty()).unwrap();
    let (status, bytes) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    let on_disk = std::fs::read(tmp.path().join(path.trim_start_matches("/artifacts/"))).unwrap();
    assert_eq!(bytes.as_ref(), on_disk.as_slice());

    let request = Request::builder()
        .uri("/artifacts/images/nope/full.avif")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
