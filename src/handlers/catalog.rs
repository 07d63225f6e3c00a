//! 模块/字段目录

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{middleware::AppState, models::catalog::ModuleCatalog};

/// 返回当前加载的目录
pub async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<ModuleCatalog> {
    Json(state.permission_service.catalog().clone())
}
