//! 角色管理服务
//!
//! 名称与父角色校验在任何写入之前完成；重新挂载时整棵子树的层级在同一批次中写入。
//! 写操作持有同一把锁，校验所用的层级快照在写入前不会过期。

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use super::hierarchy::RoleHierarchy;
use crate::{
    error::{AppError, Result},
    events::{EngineEvent, EventBus},
    models::role::{CreateRoleRequest, Role, RoleNode, UpdateRoleRequest},
    repository::RoleStore,
};

pub struct RoleService {
    store: Arc<dyn RoleStore>,
    events: EventBus,
    write_lock: Mutex<()>,
}

impl RoleService {
    pub fn new(store: Arc<dyn RoleStore>, events: EventBus) -> Self {
        Self {
            store,
            events,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn hierarchy(&self) -> Result<RoleHierarchy> {
        Ok(RoleHierarchy::new(self.store.list_roles().await?))
    }

    /// 按层级、名称排序
    pub async fn list(&self) -> Result<Vec<Role>> {
        let mut roles = self.store.list_roles().await?;
        roles.sort_by(|a, b| (a.hierarchy_level, &a.name).cmp(&(b.hierarchy_level, &b.name)));
        Ok(roles)
    }

    pub async fn get(&self, id: Uuid) -> Result<Role> {
        let hierarchy = self.hierarchy().await?;
        hierarchy.require(id).cloned()
    }

    pub async fn tree(&self) -> Result<Vec<RoleNode>> {
        Ok(self.hierarchy().await?.build_tree())
    }

    pub async fn create_role(&self, req: CreateRoleRequest, created_by: Option<Uuid>) -> Result<Role> {
        req.validate()?;

        let _guard = self.write_lock.lock().await;
        let hierarchy = self.hierarchy().await?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Role name must not be empty"));
        }
        if hierarchy.find_by_name(name).is_some() {
            tracing::warn!(name = %name, "Role name already exists");
            return Err(AppError::DuplicateName(name.to_string()));
        }
        let level = hierarchy.level_under(req.parent_id)?;

        let mut role = Role::new(name, req.parent_id, level);
        role.description = req.description;
        role.business_unit = req.business_unit;
        role.is_system = req.is_system;
        role.created_by = created_by;

        let role = self.store.create_role(&role).await?;

        tracing::info!(
            role_id = %role.id,
            name = %role.name,
            parent_id = ?role.parent_id,
            level = role.hierarchy_level,
            "Role created"
        );
        self.events.publish(EngineEvent::RoleCreated {
            role_id: role.id,
            name: role.name.clone(),
            parent_id: role.parent_id,
        });

        Ok(role)
    }

    pub async fn update_role(&self, id: Uuid, req: UpdateRoleRequest) -> Result<Role> {
        req.validate()?;

        let _guard = self.write_lock.lock().await;
        let mut hierarchy = self.hierarchy().await?;
        let existing = hierarchy.require(id)?.clone();
        if existing.is_system {
            tracing::warn!(role_id = %id, "Attempt to modify system role");
            return Err(AppError::SystemRole(existing.name));
        }

        let mut role = existing.clone();
        if let Some(name) = &req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::validation("Role name must not be empty"));
            }
            if hierarchy
                .find_by_name(name)
                .is_some_and(|other| other.id != id)
            {
                tracing::warn!(name = %name, "Role name already exists");
                return Err(AppError::DuplicateName(name.to_string()));
            }
            role.name = name.to_string();
        }
        if let Some(description) = req.description {
            role.description = Some(description);
        }
        if let Some(business_unit) = req.business_unit {
            role.business_unit = Some(business_unit);
        }
        if let Some(is_active) = req.is_active {
            role.is_active = is_active;
        }

        // 先校验并计算整棵子树的新层级，再写入
        let relevelled = match req.parent_id {
            Some(new_parent) if new_parent != existing.parent_id => {
                let changed = hierarchy.reparent(id, new_parent)?;
                let placed = hierarchy.require(id)?;
                role.parent_id = placed.parent_id;
                role.hierarchy_level = placed.hierarchy_level;
                Some(changed)
            }
            _ => None,
        };
        role.updated_at = Utc::now();

        let written = match relevelled {
            Some(changed) => {
                // 角色自身与重新计算层级的后代在同一批次中写入
                let mut batch = vec![role.clone()];
                batch.extend(changed.into_iter().filter(|r| r.id != id));
                self.store.update_roles(&batch).await?.then_some(batch.len())
            }
            None => self.store.update_role(&role).await?.then_some(0),
        };
        let Some(relevelled_count) = written else {
            return Err(AppError::not_found(&format!("role {}", id)));
        };
        let moved = relevelled_count > 0;

        tracing::info!(role_id = %id, name = %role.name, "Role updated");
        self.events.publish(EngineEvent::RoleUpdated {
            role_id: id,
            name: role.name.clone(),
        });
        if moved {
            tracing::info!(
                role_id = %id,
                old_parent_id = ?existing.parent_id,
                new_parent_id = ?role.parent_id,
                relevelled = relevelled_count,
                "Role moved"
            );
            self.events.publish(EngineEvent::RoleMoved {
                role_id: id,
                old_parent_id: existing.parent_id,
                new_parent_id: role.parent_id,
                relevelled: relevelled_count,
            });
        }

        Ok(role)
    }

    /// 系统角色不可删除；有子角色时拒绝并列出子角色名称
    pub async fn delete_role(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let hierarchy = self.hierarchy().await?;
        let role = hierarchy.require(id)?;
        if role.is_system {
            tracing::warn!(role_id = %id, "Attempt to delete system role");
            return Err(AppError::SystemRole(role.name.clone()));
        }
        if !hierarchy.can_delete(id) {
            let children = hierarchy
                .children(id)
                .iter()
                .map(|r| r.name.clone())
                .collect();
            tracing::warn!(role_id = %id, "Role still has children");
            return Err(AppError::HasChildren { role_id: id, children });
        }

        if !self.store.delete_role(id).await? {
            return Err(AppError::not_found(&format!("role {}", id)));
        }

        tracing::info!(role_id = %id, name = %role.name, "Role deleted");
        self.events.publish(EngineEvent::RoleDeleted {
            role_id: id,
            name: role.name.clone(),
        });
        Ok(())
    }
}
