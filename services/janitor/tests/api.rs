//! Integration tests for the janitor HTTP API

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use chrono::{TimeDelta, Utc};
use inventory::{ImageDetail, Inventory, MemoryRegistry};
use janitor::JanitorBuilder;
use registry_driver::{BatchDelete, Driver, DriverError, Page};
use serde_json::{json, Value};
use tower::ServiceExt;

fn image(digest: &str, size: u64, pulled_days_ago: Option<i64>) -> ImageDetail {
    let now = Utc::now();
    ImageDetail {
        digest: digest.into(),
        size,
        pushed_at: now - TimeDelta::days(400),
        tags: vec!["latest".into()],
        last_pulled_at: pulled_days_ago.map(|days| now - TimeDelta::days(days)),
    }
}

/// Helper to create a janitor over a seeded in-memory registry
fn test_janitor() -> (Arc<MemoryRegistry>, axum::Router) {
    let registry = Arc::new(MemoryRegistry::new());
    registry.push("web", image("sha256:fresh", 100, Some(2)));
    registry.push("web", image("sha256:stale", 300, Some(60)));
    registry.push("web", image("sha256:never", 200, None));
    registry.push("api", image("sha256:api", 50, Some(1)));

    let app = JanitorBuilder::new(Inventory::from_arc(registry.clone()))
        .allow_origin("http://localhost:3000".parse().unwrap())
        .build();
    (registry, app)
}

async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn get(app: &axum::Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

fn digests(images: &Value) -> Vec<&str> {
    images
        .as_array()
        .unwrap()
        .iter()
        .map(|image| image["imageDigest"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let (_, app) = test_janitor();

    let response = get(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_list_repositories() {
    let (_, app) = test_janitor();

    let response = get(&app, "/api/repositories").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!(["api", "web"]));
}

#[tokio::test]
async fn test_images_require_repository() {
    let (registry, app) = test_janitor();

    for uri in ["/api/images", "/api/images/largest?limit=2", "/api/images?repository="] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(
            json_body(response).await,
            json!({ "error": "repository parameter is required" })
        );
    }
    assert_eq!(registry.calls().list_images, 0);
}

#[tokio::test]
async fn test_list_images() {
    let (_, app) = test_janitor();

    let response = get(&app, "/api/images?repository=web").await;
    assert_eq!(response.status(), StatusCode::OK);

    let images = json_body(response).await;
    assert_eq!(digests(&images), ["sha256:fresh", "sha256:stale", "sha256:never"]);

    let never = &images[2];
    assert_eq!(never["repositoryName"], "web");
    assert_eq!(never["imageTag"], "latest");
    assert_eq!(never["lastPullDate"], never["imagePushedAt"]);
}

#[tokio::test]
async fn test_rankings() {
    let (_, app) = test_janitor();

    let response = get(&app, "/api/images/largest?repository=web&limit=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(digests(&json_body(response).await), ["sha256:stale", "sha256:never"]);

    let response = get(&app, "/api/images/most-downloaded?repository=web&limit=bogus").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        digests(&json_body(response).await),
        ["sha256:fresh", "sha256:stale", "sha256:never"]
    );
}

#[tokio::test]
async fn test_unknown_repository_is_server_error() {
    let (_, app) = test_janitor();

    let response = get(&app, "/api/images?repository=missing").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_global_stats() {
    let (registry, app) = test_janitor();
    registry.create_repository("empty");

    let response = get(&app, "/api/global-stats").await;
    assert_eq!(response.status(), StatusCode::OK);

    let stats = json_body(response).await;
    assert_eq!(stats["totalRepositories"], 3);
    assert_eq!(stats["totalImages"], 4);
    assert_eq!(stats["totalSize"], 650);
    assert_eq!(stats["topRepositoriesBySize"][0]["name"], "web");
    assert_eq!(stats["topRepositoriesBySize"][0]["imageCount"], 3);

    let calls = registry.calls();
    let response = get(&app, "/api/global-stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.calls(), calls);
}

#[tokio::test]
async fn test_expired_preview() {
    let (registry, app) = test_janitor();

    let response = get(&app, "/api/images/expired?repository=web&daysOld=30").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(digests(&json_body(response).await), ["sha256:stale", "sha256:never"]);

    let response = get(&app, "/api/images/expired?repository=web&daysOld=soon").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(registry.digests("web").len(), 3);
}

#[tokio::test]
async fn test_delete_images() {
    let (registry, app) = test_janitor();

    let response = post(
        &app,
        "/api/images/delete",
        json!({ "repositoryName": "web", "imageDigests": ["sha256:fresh"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "Images deleted successfully", "deleted": 1 })
    );
    assert_eq!(registry.digests("web"), ["sha256:stale", "sha256:never"]);
}

#[tokio::test]
async fn test_delete_requires_digests() {
    let (registry, app) = test_janitor();

    let response = post(
        &app,
        "/api/images/delete",
        json!({ "repositoryName": "web", "imageDigests": [] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "repositoryName and imageDigests are required" })
    );
    assert!(registry.calls().delete_batches.is_empty());
}

#[tokio::test]
async fn test_malformed_body() {
    let (_, app) = test_janitor();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/images/delete")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request: "));
}

#[tokio::test]
async fn test_partial_delete() {
    let (registry, app) = test_janitor();
    registry.refuse("sha256:stale", "ImageReferencedByManifestList");

    let response = post(
        &app,
        "/api/images/delete",
        json!({ "repositoryName": "web", "imageDigests": ["sha256:fresh", "sha256:stale"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        json_body(response).await,
        json!({
            "message": "Partially completed: 1 images deleted, but encountered 1 errors",
            "deleted": 1,
            "errors": ["Failed to delete image sha256:stale: ImageReferencedByManifestList"],
        })
    );
}

#[tokio::test]
async fn test_delete_by_date() {
    let (registry, app) = test_janitor();

    let response = post(
        &app,
        "/api/images/delete-by-date",
        json!({ "repositoryName": "web", "daysOld": 30 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["deleted"], 2);
    assert_eq!(registry.digests("web"), ["sha256:fresh"]);
}

#[tokio::test]
async fn test_delete_by_date_nothing_expired() {
    let (registry, app) = test_janitor();

    let response = post(
        &app,
        "/api/images/delete-by-date",
        json!({ "repositoryName": "api", "daysOld": 30 }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "No images found matching criteria", "deleted": 0 })
    );
    assert!(registry.calls().delete_batches.is_empty());
}

/// A registry that accepts every delete call without reporting anything.
#[derive(Debug)]
struct Silent;

#[async_trait::async_trait]
impl Driver for Silent {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn list_repositories(&self, _: Option<&str>) -> Result<Page<String>, DriverError> {
        Ok(Page::last(vec!["web".into()]))
    }

    async fn list_images(&self, _: &str, _: Option<&str>) -> Result<Page<ImageDetail>, DriverError> {
        Ok(Page::last(Vec::new()))
    }

    async fn delete_images(&self, _: &str, _: &[String]) -> Result<BatchDelete, DriverError> {
        Ok(BatchDelete::default())
    }
}

#[tokio::test]
async fn test_delete_by_date_given_digests_never_reports_empty_selection() {
    let app = JanitorBuilder::new(Inventory::new(Silent)).build();

    let response = post(
        &app,
        "/api/images/delete-by-date",
        json!({ "repositoryName": "web", "imageDigests": ["sha256:gone"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "message": "Images deleted successfully", "deleted": 0 })
    );
}

#[tokio::test]
async fn test_delete_by_date_requires_age() {
    let (_, app) = test_janitor();

    let response = post(
        &app,
        "/api/images/delete-by-date",
        json!({ "repositoryName": "web" }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await,
        json!({ "error": "daysOld (> 0) is required when imageDigests is not provided" })
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let (_, app) = test_janitor();

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/images/delete")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
}
