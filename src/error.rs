//! 统一错误模型
//! 定义所有错误类型和错误响应格式

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::permission::CellRef;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// 角色名称冲突（大小写不敏感）
    #[error("Role name already exists: {0}")]
    DuplicateName(String),

    /// 重新挂载父角色会形成环
    #[error("Circular reference: role {role_id} cannot be placed under {parent_id}")]
    CircularReference { role_id: Uuid, parent_id: Uuid },

    /// 存在子角色，禁止删除
    #[error("Role {role_id} still has child roles: {}", children.join(", "))]
    HasChildren { role_id: Uuid, children: Vec<String> },

    #[error("System role cannot be modified: {0}")]
    SystemRole(String),

    /// 持久化失败，内存中的修改保持 Dirty，可重试
    #[error("Persistence error: {message} ({} cells not saved)", failed_cells.len())]
    Persistence {
        message: String,
        failed_cells: Vec<CellRef>,
    },

    /// 上次保存失败的修改尚未处理
    #[error("{0} unsaved permission cells pending")]
    UnsavedChanges(usize),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateName(_)
            | AppError::CircularReference { .. }
            | AppError::HasChildren { .. }
            | AppError::UnsavedChanges(_) => StatusCode::CONFLICT,
            AppError::SystemRole(_) => StatusCode::FORBIDDEN,
            AppError::Persistence { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotFound(msg) => format!("Resource not found: {}", msg),
            AppError::BadRequest(msg) | AppError::Validation(msg) => msg.clone(),
            AppError::DuplicateName(name) => format!("A role named '{}' already exists", name),
            AppError::CircularReference { .. } => {
                "Moving the role there would create a circular hierarchy".to_string()
            }
            AppError::HasChildren { children, .. } => format!(
                "Role cannot be deleted while it has child roles: {}",
                children.join(", ")
            ),
            AppError::SystemRole(name) => format!("System role '{}' cannot be modified", name),
            AppError::Persistence { failed_cells, .. } => format!(
                "Failed to save {} permission cells, the changes are kept and the save can be retried",
                failed_cells.len()
            ),
            AppError::UnsavedChanges(cells) => format!(
                "{} permission cells from a failed save are pending, save or discard them first",
                cells
            ),
            AppError::Database(_) => "Database error occurred".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    /// 调用方可以直接重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Persistence { .. })
    }

    // 便捷方法
    pub fn not_found(msg: &str) -> Self {
        AppError::NotFound(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        AppError::Validation(msg.to_string())
    }
}

/// 错误响应 DTO
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_cells: Vec<CellRef>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        let failed_cells = match &self {
            AppError::Persistence { failed_cells, .. } => failed_cells.clone(),
            _ => Vec::new(),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.user_message(),
                request_id,
                failed_cells,
            },
        };

        // 客户端错误记 warn，服务端错误记 error
        if status.is_server_error() {
            tracing::error!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Application error"
            );
        } else {
            tracing::warn!(
                code = self.code(),
                message = %self,
                request_id = %error_response.error.request_id,
                "Request rejected"
            );
        }

        (status, Json(error_response)).into_response()
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 请求体校验失败
impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}
