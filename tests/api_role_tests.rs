//! 角色 API 集成测试

use axum::http::StatusCode;
use serde_json::json;

mod common;
use common::{create_role, create_test_app, send};

#[tokio::test]
async fn test_create_and_list_roles() {
    let (app, _, _) = create_test_app();
    let director = create_role(&app, "Director", None).await;
    create_role(&app, "Manager", Some(&director)).await;

    let (status, json) = send(&app, "GET", "/api/v1/roles", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["roles"][0]["name"], "Director");
    assert_eq!(json["roles"][1]["hierarchy_level"], 2);
}

#[tokio::test]
async fn test_duplicate_name_is_conflict() {
    let (app, _, _) = create_test_app();
    create_role(&app, "Sales", None).await;

    let (status, json) = send(&app, "POST", "/api/v1/roles", Some(json!({ "name": "SALES" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], 409);
    assert!(json["error"]["request_id"].is_string());
}

#[tokio::test]
async fn test_empty_name_rejected() {
    let (app, _, _) = create_test_app();
    let (status, _) = send(&app, "POST", "/api/v1/roles", Some(json!({ "name": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tree_and_reparent() {
    let (app, _, _) = create_test_app();
    let a = create_role(&app, "A", None).await;
    let b = create_role(&app, "B", None).await;
    let c = create_role(&app, "C", Some(&b)).await;

    let (status, json) = send(
        &app,
        "PUT",
        &format!("/api/v1/roles/{}", b),
        Some(json!({ "parent_id": a })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"]["hierarchy_level"], 2);

    let (_, json) = send(&app, "GET", &format!("/api/v1/roles/{}", c), None).await;
    assert_eq!(json["role"]["hierarchy_level"], 3);

    let (status, json) = send(&app, "GET", "/api/v1/roles/tree", None).await;
    assert_eq!(status, StatusCode::OK);
    let roots = json["roots"].as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["role"]["name"], "A");
    assert_eq!(roots[0]["children"][0]["children"][0]["role"]["name"], "C");

    // 提升为根角色
    let (status, json) = send(
        &app,
        "PUT",
        &format!("/api/v1/roles/{}", b),
        Some(json!({ "parent_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["role"]["hierarchy_level"], 1);
}

#[tokio::test]
async fn test_cycle_rejected() {
    let (app, _, _) = create_test_app();
    let a = create_role(&app, "A", None).await;
    let b = create_role(&app, "B", Some(&a)).await;

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/roles/{}", a),
        Some(json!({ "parent_id": b })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = send(&app, "GET", &format!("/api/v1/roles/{}", a), None).await;
    assert!(json["role"]["parent_id"].is_null());
}

#[tokio::test]
async fn test_delete_role_with_children() {
    let (app, _, _) = create_test_app();
    let parent = create_role(&app, "Director", None).await;
    let child = create_role(&app, "Manager", Some(&parent)).await;

    let (status, json) = send(&app, "DELETE", &format!("/api/v1/roles/{}", parent), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"]["message"].as_str().unwrap().contains("Manager"));

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/roles/{}", child), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &format!("/api/v1/roles/{}", parent), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/api/v1/roles/{}", parent), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_system_role_cannot_be_deleted() {
    let (app, _, _) = create_test_app();
    let (_, json) = send(
        &app,
        "POST",
        "/api/v1/roles",
        Some(json!({ "name": "Administrator", "is_system": true })),
    )
    .await;
    let id = json["role"]["id"].as_str().unwrap();

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/roles/{}", id), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
