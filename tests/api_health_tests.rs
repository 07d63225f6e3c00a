//! 健康检查 API 集成测试

use axum::http::StatusCode;

mod common;
use common::{create_test_app, send};

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert!(json["uptime_secs"].is_number());
}

#[tokio::test]
async fn test_readiness_endpoint() {
    let (app, _, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/ready", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"][0]["name"], "storage");
}

#[tokio::test]
async fn test_catalog_endpoint() {
    let (app, _, _) = create_test_app();

    let (status, json) = send(&app, "GET", "/api/v1/catalog", None).await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = json["modules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["leads", "deals", "contacts", "accounts"]);
}

#[tokio::test]
async fn test_response_carries_tracking_headers() {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    let (app, _, _) = create_test_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-trace-id", "trace-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-trace-id"], "trace-abc");
    assert!(response.headers().contains_key("x-request-id"));
}
