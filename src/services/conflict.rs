//! 冲突检测
//! 子角色直接拥有而父角色没有的权限。仅作为告警，不阻止保存。

use super::{hierarchy::RoleHierarchy, permission_map::PermissionMap};
use crate::models::{
    catalog::ModuleCatalog,
    permission::{Conflict, ConflictKind, PermissionType},
    role::Role,
};

/// 模块级扫描：角色 × 模块 × 权限类型
pub fn detect_conflicts(
    hierarchy: &RoleHierarchy,
    map: &PermissionMap,
    catalog: &ModuleCatalog,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for (role, parent) in parent_pairs(hierarchy) {
        for module in &catalog.modules {
            let own = map.module(role.id, &module.id);
            let parent_flags = map.module(parent.id, &module.id);

            for perm in PermissionType::ALL {
                if own.get(perm) && !parent_flags.get(perm) {
                    conflicts.push(Conflict {
                        kind: ConflictKind::Override,
                        role_id: role.id,
                        parent_id: parent.id,
                        module_id: module.id.clone(),
                        field_id: None,
                        permission_type: perm,
                        message: format!(
                            "Role '{}' has '{}' on module '{}' but its parent '{}' does not",
                            role.name, perm, module.name, parent.name
                        ),
                    });
                }
            }
        }
    }

    conflicts
}

/// 字段级扫描，单独报告
pub fn detect_field_conflicts(
    hierarchy: &RoleHierarchy,
    map: &PermissionMap,
    catalog: &ModuleCatalog,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for (role, parent) in parent_pairs(hierarchy) {
        for module in &catalog.modules {
            for field in &module.fields {
                let own = map.field(role.id, &module.id, &field.id);
                let parent_flags = map.field(parent.id, &module.id, &field.id);

                for perm in PermissionType::FIELD_SCOPED {
                    if own.get(perm) && !parent_flags.get(perm) {
                        conflicts.push(Conflict {
                            kind: ConflictKind::Override,
                            role_id: role.id,
                            parent_id: parent.id,
                            module_id: module.id.clone(),
                            field_id: Some(field.id.clone()),
                            permission_type: perm,
                            message: format!(
                                "Role '{}' has '{}' on field '{}.{}' but its parent '{}' does not",
                                role.name, perm, module.name, field.name, parent.name
                            ),
                        });
                    }
                }
            }
        }
    }

    conflicts
}

/// 所有 (子角色, 父角色) 对，按子角色层级与名称排序以保证输出稳定
fn parent_pairs(hierarchy: &RoleHierarchy) -> Vec<(&Role, &Role)> {
    let mut pairs: Vec<(&Role, &Role)> = hierarchy
        .roles()
        .filter_map(|role| hierarchy.parent(role.id).map(|parent| (role, parent)))
        .collect();
    pairs.sort_by(|(a, _), (b, _)| {
        (a.hierarchy_level, &a.name).cmp(&(b.hierarchy_level, &b.name))
    });
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::resolver::set_module_permission;

    fn setup() -> (RoleHierarchy, ModuleCatalog, Role, Role) {
        let director = Role::new("Director", None, 1);
        let manager = Role::new("Manager", Some(director.id), 2);
        let h = RoleHierarchy::new(vec![director.clone(), manager.clone()]);
        (h, ModuleCatalog::default_crm(), director, manager)
    }

    #[test]
    fn test_manager_write_on_deals_is_single_conflict() {
        let (h, catalog, director, manager) = setup();
        let mut map = PermissionMap::new();
        set_module_permission(&mut map, &catalog, manager.id, "deals", PermissionType::Write, true)
            .unwrap();
        map.set_module_flag(director.id, "deals", PermissionType::Write, false);

        let conflicts = detect_conflicts(&h, &map, &catalog);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.role_id, manager.id);
        assert_eq!(c.module_id, "deals");
        assert_eq!(c.permission_type, PermissionType::Write);
        assert!(c.message.contains("Manager"));
        assert!(c.message.contains("Deals"));
        assert!(c.message.contains("write"));
    }

    #[test]
    fn test_no_conflict_when_parent_holds_permission() {
        let (h, catalog, director, manager) = setup();
        let mut map = PermissionMap::new();
        map.set_module_flag(director.id, "leads", PermissionType::Read, true);
        map.set_module_flag(manager.id, "leads", PermissionType::Read, true);
        // 父角色多出的权限不是冲突
        map.set_module_flag(director.id, "leads", PermissionType::Delete, true);

        assert!(detect_conflicts(&h, &map, &catalog).is_empty());
    }

    #[test]
    fn test_field_conflicts_reported_separately() {
        let (h, catalog, _, manager) = setup();
        let mut map = PermissionMap::new();
        map.set_field_flag(manager.id, "deals", "amount", PermissionType::Read, true);

        assert!(detect_conflicts(&h, &map, &catalog).is_empty());
        let fields = detect_field_conflicts(&h, &map, &catalog);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field_id.as_deref(), Some("amount"));
    }
}
