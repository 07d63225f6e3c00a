//! Repository layer
//!
//! `RoleStore` / `PermissionStore` 是引擎与持久化之间的边界，
//! 提供 PostgreSQL 与内存两种实现。

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        permission::{FieldPermissionCell, ModulePermissionCell},
        role::Role,
        template::PermissionSet,
    },
    storage::HealthStatus,
};

pub mod memory;
pub mod permission_repo;
pub mod role_repo;

pub use memory::InMemoryStore;
pub use permission_repo::PermissionRepository;
pub use role_repo::RoleRepository;

/// 角色存储
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// 名称冲突（大小写不敏感）返回 `DuplicateName`
    async fn create_role(&self, role: &Role) -> Result<Role>;

    async fn update_role(&self, role: &Role) -> Result<bool>;

    /// 一次性写入多个角色（重新挂载后的子树）。全部写入或全部不写；有角色不存在时返回 false
    async fn update_roles(&self, roles: &[Role]) -> Result<bool>;

    /// 存在子角色时返回 `HasChildren`
    async fn delete_role(&self, id: Uuid) -> Result<bool>;

    async fn health(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

/// 权限单元与模板存储
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn load_module_permissions(&self, role_id: Uuid) -> Result<Vec<ModulePermissionCell>>;

    async fn load_field_permissions(
        &self,
        role_id: Uuid,
        module_id: &str,
    ) -> Result<Vec<FieldPermissionCell>>;

    async fn upsert_module_permission(&self, cell: &ModulePermissionCell) -> Result<()>;

    async fn upsert_field_permission(&self, cell: &FieldPermissionCell) -> Result<()>;

    /// 幂等批量写入，全部成功或全部失败
    async fn upsert_batch(
        &self,
        modules: &[ModulePermissionCell],
        fields: &[FieldPermissionCell],
    ) -> Result<()>;

    async fn list_templates(&self) -> Result<Vec<PermissionSet>>;

    async fn get_template(&self, id: Uuid) -> Result<Option<PermissionSet>>;

    async fn create_template(&self, set: &PermissionSet) -> Result<PermissionSet>;

    async fn delete_template(&self, id: Uuid) -> Result<bool>;
}
