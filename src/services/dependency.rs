//! 权限依赖校验
//! write/delete/export 依赖 read，import 依赖 write。只告警，不自动修正。

use uuid::Uuid;

use super::permission_map::PermissionMap;
use crate::models::permission::{
    DependencyRule, DependencyWarning, FieldPermissionCell, ModulePermissionCell, PermissionFlags,
};

/// 违反的规则
pub fn violated_rules(flags: &PermissionFlags) -> Vec<DependencyRule> {
    DependencyRule::ALL
        .into_iter()
        .filter(|rule| {
            let (granted, required) = rule.pair();
            flags.get(granted) && !flags.get(required)
        })
        .collect()
}

pub fn validate_module_cell(cell: &ModulePermissionCell) -> Vec<DependencyWarning> {
    warnings_for(cell.role_id, &cell.module_id, None, &cell.flags)
}

/// 字段单元上不存在 export/import，相关规则自然不会触发
pub fn validate_field_cell(cell: &FieldPermissionCell) -> Vec<DependencyWarning> {
    warnings_for(cell.role_id, &cell.module_id, Some(&cell.field_id), &cell.flags())
}

/// 校验整张表
pub fn validate_map(map: &PermissionMap) -> Vec<DependencyWarning> {
    let modules = map.module_cells().flat_map(|c| validate_module_cell(&c));
    let fields = map.field_cells().flat_map(|c| validate_field_cell(&c));
    modules.chain(fields).collect()
}

fn warnings_for(
    role_id: Uuid,
    module_id: &str,
    field_id: Option<&str>,
    flags: &PermissionFlags,
) -> Vec<DependencyWarning> {
    violated_rules(flags)
        .into_iter()
        .map(|rule| {
            let scope = match field_id {
                Some(f) => format!("{}.{}", module_id, f),
                None => module_id.to_string(),
            };
            DependencyWarning {
                rule,
                role_id,
                module_id: module_id.to_string(),
                field_id: field_id.map(str::to_string),
                message: format!("{} on {}", rule.message(), scope),
            }
        })
        .collect()
}
