//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer};

use crate::{handlers, middleware::AppState};

/// 请求体上限
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    let api_routes = Router::new()
        .route("/api/v1/catalog", get(handlers::catalog::get_catalog))

        // 角色
        .route(
            "/api/v1/roles",
            get(handlers::role::list_roles).post(handlers::role::create_role),
        )
        .route("/api/v1/roles/tree", get(handlers::role::role_tree))
        .route(
            "/api/v1/roles/{id}",
            get(handlers::role::get_role)
                .put(handlers::role::update_role)
                .delete(handlers::role::delete_role),
        )

        // 单个角色的权限
        .route(
            "/api/v1/roles/{id}/permissions",
            get(handlers::permission::get_role_permissions),
        )
        .route(
            "/api/v1/roles/{id}/permissions/effective",
            get(handlers::permission::get_effective_permission),
        )
        .route(
            "/api/v1/roles/{id}/permissions/modules/{module_id}",
            put(handlers::permission::set_module_permission),
        )
        .route(
            "/api/v1/roles/{id}/permissions/modules/{module_id}/fields/{field_id}",
            put(handlers::permission::set_field_permission),
        )

        // 批量操作
        .route("/api/v1/permissions/bulk", post(handlers::permission::bulk_set))
        .route("/api/v1/permissions/select-all", post(handlers::permission::select_all))
        .route("/api/v1/permissions/copy", post(handlers::permission::copy_permissions))

        // 编辑会话
        .route("/api/v1/permissions/session", get(handlers::permission::session_status))
        .route("/api/v1/permissions/session/save", post(handlers::permission::save_session))
        .route(
            "/api/v1/permissions/session/discard",
            post(handlers::permission::discard_session),
        )

        // 报告
        .route("/api/v1/permissions/conflicts", get(handlers::permission::list_conflicts))
        .route("/api/v1/permissions/warnings", get(handlers::permission::list_warnings))

        // 模板
        .route(
            "/api/v1/templates",
            get(handlers::template::list_templates).post(handlers::template::create_template),
        )
        .route("/api/v1/templates/{id}", delete(handlers::template::delete_template))
        .route(
            "/api/v1/templates/{id}/apply",
            post(handlers::template::apply_template),
        );

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CompressionLayer::new())
        .layer(axum::middleware::from_fn(crate::middleware::request_tracking_middleware))
        .with_state(state)
}
