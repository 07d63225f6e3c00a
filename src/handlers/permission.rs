//! 权限编辑的 HTTP 处理器
//! 修改类接口都返回修改后的冲突与依赖告警

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, middleware::AppState, models::permission::*};

/// 角色的权限单元、聚合状态与统计
pub async fn get_role_permissions(
    State(state): State<Arc<AppState>>,
    Path(role_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.permission_service.role_permissions(role_id).await?;
    Ok(Json(view))
}

/// 有效权限查询
pub async fn get_effective_permission(
    State(state): State<Arc<AppState>>,
    Path(role_id): Path<Uuid>,
    Query(query): Query<EffectiveQuery>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.permission_service;
    let effective = match &query.field_id {
        Some(field_id) => {
            service
                .effective_field_permission(role_id, &query.module_id, field_id, query.permission_type)
                .await?
        }
        None => {
            service
                .effective_module_permission(role_id, &query.module_id, query.permission_type)
                .await?
        }
    };

    Ok(Json(json!({
        "role_id": role_id,
        "module_id": query.module_id,
        "field_id": query.field_id,
        "permission_type": query.permission_type,
        "permission": effective
    })))
}

/// 设置模块权限（read/write/delete 级联到字段）
pub async fn set_module_permission(
    State(state): State<Arc<AppState>>,
    Path((role_id, module_id)): Path<(Uuid, String)>,
    Json(req): Json<SetPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .permission_service
        .set_module_permission(role_id, &module_id, req.permission_type, req.value)
        .await?;
    Ok(Json(outcome))
}

/// 设置字段权限
pub async fn set_field_permission(
    State(state): State<Arc<AppState>>,
    Path((role_id, module_id, field_id)): Path<(Uuid, String, String)>,
    Json(req): Json<SetPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .permission_service
        .set_field_permission(role_id, &module_id, &field_id, req.permission_type, req.value)
        .await?;
    Ok(Json(outcome))
}

/// 批量设置
pub async fn bulk_set(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let outcome = state
        .permission_service
        .bulk_set(&req.role_ids, &req.module_ids, req.permission_type, req.value)
        .await?;
    Ok(Json(outcome))
}

/// 全选
pub async fn select_all(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectAllRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let outcome = state
        .permission_service
        .select_all_modules(&req.role_ids, &req.module_ids, req.value)
        .await?;
    Ok(Json(outcome))
}

/// 复制权限
pub async fn copy_permissions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CopyPermissionsRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let outcome = state
        .permission_service
        .copy_permissions(req.source_role_id, &req.target_role_ids, &req.module_ids)
        .await?;
    Ok(Json(outcome))
}

/// 冲突报告
pub async fn list_conflicts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConflictQuery>,
) -> Result<impl IntoResponse, AppError> {
    let conflicts = state
        .permission_service
        .conflicts(query.include_fields)
        .await?;

    Ok(Json(json!({
        "conflicts": conflicts,
        "count": conflicts.len()
    })))
}

/// 依赖告警
pub async fn list_warnings(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let warnings = state.permission_service.warnings().await?;

    Ok(Json(json!({
        "warnings": warnings,
        "count": warnings.len()
    })))
}

/// 编辑会话状态（保存失败后保留的修改）
pub async fn session_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.permission_service.session_status().await)
}

/// 重试保存
pub async fn save_session(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let outcome = state.permission_service.save_pending().await?;
    Ok(Json(outcome))
}

/// 放弃未保存的修改
pub async fn discard_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.permission_service.discard_pending().await?;
    Ok(Json(outcome))
}
