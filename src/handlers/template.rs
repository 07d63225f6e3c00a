//! 权限模板的 HTTP 处理器

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::actor_id;
use crate::{error::AppError, middleware::AppState, models::template::*};

pub async fn list_templates(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let templates = state.permission_service.list_templates().await?;

    Ok(Json(json!({
        "templates": templates,
        "count": templates.len()
    })))
}

/// 从角色当前权限创建模板
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateTemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let template = state
        .permission_service
        .create_template(req.source_role_id, &req.name, req.description, actor_id(&headers))
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "template": template }))))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.permission_service.delete_template(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 合并应用到目标角色
pub async fn apply_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ApplyTemplateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .permission_service
        .apply_template(id, req.role_id)
        .await?;
    Ok(Json(outcome))
}
