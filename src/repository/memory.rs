//! 内存存储
//! `memory` 后端与测试使用，语义与 PostgreSQL 实现一致

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PermissionStore, RoleStore};
use crate::{
    error::{AppError, Result},
    models::{
        permission::{FieldPermissionCell, ModulePermissionCell},
        role::Role,
        template::PermissionSet,
    },
    services::permission_map::PermissionMap,
};

#[derive(Default)]
pub struct InMemoryStore {
    roles: RwLock<HashMap<Uuid, Role>>,
    cells: RwLock<PermissionMap>,
    templates: RwLock<HashMap<Uuid, PermissionSet>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开后所有权限写入都返回错误，用于模拟持久化故障
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for InMemoryStore {
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.read().await.values().cloned().collect();
        roles.sort_by(|a, b| (a.hierarchy_level, &a.name).cmp(&(b.hierarchy_level, &b.name)));
        Ok(roles)
    }

    async fn create_role(&self, role: &Role) -> Result<Role> {
        let mut roles = self.roles.write().await;
        if roles.values().any(|r| r.name_matches(&role.name)) {
            return Err(AppError::DuplicateName(role.name.clone()));
        }
        roles.insert(role.id, role.clone());
        Ok(role.clone())
    }

    async fn update_role(&self, role: &Role) -> Result<bool> {
        let mut roles = self.roles.write().await;
        if roles
            .values()
            .any(|r| r.id != role.id && r.name_matches(&role.name))
        {
            return Err(AppError::DuplicateName(role.name.clone()));
        }
        match roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_roles(&self, updated: &[Role]) -> Result<bool> {
        let mut roles = self.roles.write().await;
        if updated.iter().any(|role| !roles.contains_key(&role.id)) {
            return Ok(false);
        }
        for role in updated {
            if roles
                .values()
                .any(|r| r.id != role.id && r.name_matches(&role.name))
            {
                return Err(AppError::DuplicateName(role.name.clone()));
            }
        }

        for role in updated {
            roles.insert(role.id, role.clone());
        }
        Ok(true)
    }

    async fn delete_role(&self, id: Uuid) -> Result<bool> {
        let mut roles = self.roles.write().await;
        let mut children: Vec<String> = roles
            .values()
            .filter(|r| r.parent_id == Some(id))
            .map(|r| r.name.clone())
            .collect();
        if !children.is_empty() {
            children.sort();
            return Err(AppError::HasChildren {
                role_id: id,
                children,
            });
        }

        let removed = roles.remove(&id).is_some();
        if removed {
            self.cells.write().await.remove_role(id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn load_module_permissions(&self, role_id: Uuid) -> Result<Vec<ModulePermissionCell>> {
        Ok(self.cells.read().await.module_cells_for(role_id))
    }

    async fn load_field_permissions(
        &self,
        role_id: Uuid,
        module_id: &str,
    ) -> Result<Vec<FieldPermissionCell>> {
        Ok(self.cells.read().await.field_cells_for(role_id, module_id))
    }

    async fn upsert_module_permission(&self, cell: &ModulePermissionCell) -> Result<()> {
        self.check_writable()?;
        self.cells
            .write()
            .await
            .put_module(cell.role_id, &cell.module_id, cell.flags);
        Ok(())
    }

    async fn upsert_field_permission(&self, cell: &FieldPermissionCell) -> Result<()> {
        self.check_writable()?;
        self.cells
            .write()
            .await
            .put_field(cell.role_id, &cell.module_id, &cell.field_id, cell.flags());
        Ok(())
    }

    async fn upsert_batch(
        &self,
        modules: &[ModulePermissionCell],
        fields: &[FieldPermissionCell],
    ) -> Result<()> {
        self.check_writable()?;
        let mut cells = self.cells.write().await;
        for cell in modules {
            cells.put_module(cell.role_id, &cell.module_id, cell.flags);
        }
        for cell in fields {
            cells.put_field(cell.role_id, &cell.module_id, &cell.field_id, cell.flags());
        }
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<PermissionSet>> {
        let mut sets: Vec<PermissionSet> = self
            .templates
            .read()
            .await
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        sets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sets)
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<PermissionSet>> {
        Ok(self
            .templates
            .read()
            .await
            .get(&id)
            .filter(|s| s.is_active)
            .cloned())
    }

    async fn create_template(&self, set: &PermissionSet) -> Result<PermissionSet> {
        let mut templates = self.templates.write().await;
        if templates
            .values()
            .any(|s| s.name.to_lowercase() == set.name.to_lowercase())
        {
            return Err(AppError::DuplicateName(set.name.clone()));
        }
        templates.insert(set.id, set.clone());
        Ok(set.clone())
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool> {
        Ok(self.templates.write().await.remove(&id).is_some())
    }
}
