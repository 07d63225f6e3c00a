//! 分层 RBAC 权限解析引擎
//! 角色层级、模块/字段权限、冲突与依赖校验，以及对应的 HTTP 接口

pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod storage;
pub mod telemetry;
