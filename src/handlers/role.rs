//! 角色管理的 HTTP 处理器

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::actor_id;
use crate::{error::AppError, middleware::AppState, models::role::*};

/// 列出所有角色
pub async fn list_roles(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let roles = state.role_service.list().await?;

    Ok(Json(json!({
        "roles": roles,
        "count": roles.len()
    })))
}

/// 角色树
pub async fn role_tree(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let tree = state.role_service.tree().await?;
    Ok(Json(json!({ "roots": tree })))
}

/// 创建角色
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state
        .role_service
        .create_role(req, actor_id(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "role": role }))))
}

/// 获取角色详情
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.role_service.get(id).await?;
    Ok(Json(json!({ "role": role })))
}

/// 更新角色（含重新挂载）
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role = state.role_service.update_role(id, req).await?;
    Ok(Json(json!({ "role": role })))
}

/// 删除角色
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.role_service.delete_role(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
