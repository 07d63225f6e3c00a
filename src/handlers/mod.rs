//! HTTP 处理器模块

use axum::http::HeaderMap;
use uuid::Uuid;

pub mod catalog;
pub mod health;
pub mod permission;
pub mod role;
pub mod template;

/// 调用方身份由上游网关通过 `x-user-id` 传入，仅用于记录创建人
pub(crate) fn actor_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}
