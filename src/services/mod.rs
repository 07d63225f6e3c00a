//! Business logic services layer

pub mod conflict;
pub mod dependency;
pub mod hierarchy;
pub mod permission_map;
pub mod permission_service;
pub mod permission_session;
pub mod resolver;
pub mod role_service;

pub use hierarchy::RoleHierarchy;
pub use permission_map::PermissionMap;
pub use permission_service::PermissionService;
pub use permission_session::{PermissionSession, SessionState};
pub use role_service::RoleService;
