//! 继承解析
//!
//! 祖先的权限只是参考信息：`effective` 始终等于角色自己的直接授权，
//! 继承关系不会放宽访问。

use uuid::Uuid;

use super::{hierarchy::RoleHierarchy, permission_map::PermissionMap};
use crate::{
    error::{AppError, Result},
    models::{
        catalog::ModuleCatalog,
        permission::{AggregateState, EffectivePermission, PermissionSummary, PermissionType},
    },
};

pub struct Resolver<'a> {
    hierarchy: &'a RoleHierarchy,
    map: &'a PermissionMap,
    catalog: &'a ModuleCatalog,
}

impl<'a> Resolver<'a> {
    pub fn new(hierarchy: &'a RoleHierarchy, map: &'a PermissionMap, catalog: &'a ModuleCatalog) -> Self {
        Self {
            hierarchy,
            map,
            catalog,
        }
    }

    pub fn effective_module_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
    ) -> Result<EffectivePermission> {
        self.hierarchy.require(role_id)?;
        self.catalog.require_module(module_id)?;

        let direct = self.map.module(role_id, module_id).get(perm);
        let inherited_from = self
            .hierarchy
            .ancestors(role_id)
            .into_iter()
            .find(|ancestor| self.map.module(*ancestor, module_id).get(perm));

        Ok(EffectivePermission {
            direct,
            inherited: inherited_from.is_some(),
            effective: direct,
            inherited_from,
        })
    }

    pub fn effective_field_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        field_id: &str,
        perm: PermissionType,
    ) -> Result<EffectivePermission> {
        self.hierarchy.require(role_id)?;
        require_field(self.catalog, module_id, field_id)?;
        require_field_scoped(perm)?;

        let direct = self.map.field(role_id, module_id, field_id).get(perm);
        let inherited_from = self
            .hierarchy
            .ancestors(role_id)
            .into_iter()
            .find(|ancestor| self.map.field(*ancestor, module_id, field_id).get(perm));

        Ok(EffectivePermission {
            direct,
            inherited: inherited_from.is_some(),
            effective: direct,
            inherited_from,
        })
    }

    /// 三态聚合，按需从单元派生，不单独存储
    pub fn module_aggregate_state(
        &self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
    ) -> Result<AggregateState> {
        let module = self.catalog.require_module(module_id)?;
        let module_granted = self.map.module(role_id, module_id).get(perm);

        if !perm.is_field_scoped() || module.fields.is_empty() {
            return Ok(if module_granted {
                AggregateState::All
            } else {
                AggregateState::Empty
            });
        }

        let granted_fields = module
            .fields
            .iter()
            .filter(|f| self.map.field(role_id, module_id, &f.id).get(perm))
            .count();

        Ok(if module_granted && granted_fields == module.fields.len() {
            AggregateState::All
        } else if module_granted || granted_fields > 0 {
            AggregateState::Partial
        } else {
            AggregateState::Empty
        })
    }

    /// 直接授权数、祖先授权数（逐级累加，不去重）及其总和
    pub fn permission_summary(&self, role_id: Uuid) -> Result<PermissionSummary> {
        self.hierarchy.require(role_id)?;

        let direct = self.map.granted_count(role_id);
        let inherited = self
            .hierarchy
            .ancestors(role_id)
            .into_iter()
            .map(|ancestor| self.map.granted_count(ancestor))
            .sum();

        Ok(PermissionSummary {
            direct,
            inherited,
            total: direct + inherited,
        })
    }
}

/// 设置模块单元，read/write/delete 同时级联到目录中该模块的所有字段
pub fn set_module_permission(
    map: &mut PermissionMap,
    catalog: &ModuleCatalog,
    role_id: Uuid,
    module_id: &str,
    perm: PermissionType,
    value: bool,
) -> Result<()> {
    let module = catalog.require_module(module_id)?;

    map.set_module_flag(role_id, module_id, perm, value);
    if perm.is_field_scoped() {
        for field in &module.fields {
            map.set_field_flag(role_id, module_id, &field.id, perm, value);
        }
    }

    Ok(())
}

/// 设置单个字段单元，不影响模块单元
pub fn set_field_permission(
    map: &mut PermissionMap,
    catalog: &ModuleCatalog,
    role_id: Uuid,
    module_id: &str,
    field_id: &str,
    perm: PermissionType,
    value: bool,
) -> Result<()> {
    require_field(catalog, module_id, field_id)?;
    require_field_scoped(perm)?;

    map.set_field_flag(role_id, module_id, field_id, perm, value);
    Ok(())
}

fn require_field(catalog: &ModuleCatalog, module_id: &str, field_id: &str) -> Result<()> {
    let module = catalog.require_module(module_id)?;
    if !module.has_field(field_id) {
        return Err(AppError::NotFound(format!("field {}.{}", module_id, field_id)));
    }
    Ok(())
}

fn require_field_scoped(perm: PermissionType) -> Result<()> {
    if !perm.is_field_scoped() {
        return Err(AppError::BadRequest(format!(
            "Permission type '{}' only applies at module scope",
            perm
        )));
    }
    Ok(())
}
