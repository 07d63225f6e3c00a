//! 权限表
//! 每个角色的模块级与字段级权限单元。缺失的单元视为全部为 false。

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{
    catalog::ModuleDef,
    permission::{
        CellRef, FieldPermissionCell, ModulePermissionCell, PermissionFlags, PermissionType,
    },
    template::TemplateCell,
};

type ModuleKey = (Uuid, String);
type FieldKey = (Uuid, String, String);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionMap {
    modules: BTreeMap<ModuleKey, PermissionFlags>,
    fields: BTreeMap<FieldKey, PermissionFlags>,
}

impl PermissionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells(modules: Vec<ModulePermissionCell>, fields: Vec<FieldPermissionCell>) -> Self {
        let mut map = Self::new();
        for cell in modules {
            map.put_module(cell.role_id, &cell.module_id, cell.flags);
        }
        for cell in fields {
            let flags = cell.flags();
            map.put_field(cell.role_id, &cell.module_id, &cell.field_id, flags);
        }
        map
    }

    pub fn module(&self, role_id: Uuid, module_id: &str) -> PermissionFlags {
        self.modules
            .get(&(role_id, module_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn field(&self, role_id: Uuid, module_id: &str, field_id: &str) -> PermissionFlags {
        self.fields
            .get(&(role_id, module_id.to_string(), field_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn put_module(&mut self, role_id: Uuid, module_id: &str, flags: PermissionFlags) {
        self.modules.insert((role_id, module_id.to_string()), flags);
    }

    /// 字段单元只保存 read/write/delete
    pub fn put_field(&mut self, role_id: Uuid, module_id: &str, field_id: &str, flags: PermissionFlags) {
        self.fields.insert(
            (role_id, module_id.to_string(), field_id.to_string()),
            flags.field_scoped(),
        );
    }

    /// 设置模块单元的一个类型（不级联）
    pub fn set_module_flag(&mut self, role_id: Uuid, module_id: &str, perm: PermissionType, value: bool) {
        self.modules
            .entry((role_id, module_id.to_string()))
            .or_default()
            .set(perm, value);
    }

    pub fn set_field_flag(
        &mut self,
        role_id: Uuid,
        module_id: &str,
        field_id: &str,
        perm: PermissionType,
        value: bool,
    ) {
        debug_assert!(perm.is_field_scoped());
        self.fields
            .entry((role_id, module_id.to_string(), field_id.to_string()))
            .or_default()
            .set(perm, value);
    }

    pub fn module_cells(&self) -> impl Iterator<Item = ModulePermissionCell> + '_ {
        self.modules
            .iter()
            .map(|((role_id, module_id), flags)| ModulePermissionCell {
                role_id: *role_id,
                module_id: module_id.clone(),
                flags: *flags,
            })
    }

    pub fn field_cells(&self) -> impl Iterator<Item = FieldPermissionCell> + '_ {
        self.fields
            .iter()
            .map(|((role_id, module_id, field_id), flags)| {
                FieldPermissionCell::from_flags(*role_id, module_id, field_id, *flags)
            })
    }

    pub fn module_cells_for(&self, role_id: Uuid) -> Vec<ModulePermissionCell> {
        self.module_cells().filter(|c| c.role_id == role_id).collect()
    }

    pub fn field_cells_for(&self, role_id: Uuid, module_id: &str) -> Vec<FieldPermissionCell> {
        self.field_cells()
            .filter(|c| c.role_id == role_id && c.module_id == module_id)
            .collect()
    }

    /// 一个角色所有单元中为 true 的条目数
    pub fn granted_count(&self, role_id: Uuid) -> usize {
        let module_count: usize = self
            .modules
            .iter()
            .filter(|((rid, _), _)| *rid == role_id)
            .map(|(_, flags)| flags.granted_count())
            .sum();
        let field_count: usize = self
            .fields
            .iter()
            .filter(|((rid, _, _), _)| *rid == role_id)
            .map(|(_, flags)| flags.granted_count())
            .sum();
        module_count + field_count
    }

    /// 将 `source` 在某模块下的单元深拷贝到 `target`。
    /// 目录中的每个字段都写入显式单元，目标原有的值被完整覆盖。
    pub fn copy_module(&mut self, source: Uuid, target: Uuid, module: &ModuleDef) {
        let module_flags = self.module(source, &module.id);
        self.put_module(target, &module.id, module_flags);

        for field in &module.fields {
            let flags = self.field(source, &module.id, &field.id);
            self.put_field(target, &module.id, &field.id, flags);
        }
    }

    /// 角色当前的全部单元，用于生成模板
    pub fn snapshot(&self, role_id: Uuid) -> Vec<TemplateCell> {
        let modules = self
            .module_cells()
            .filter(|c| c.role_id == role_id)
            .map(|c| TemplateCell {
                module_id: c.module_id,
                field_id: None,
                flags: c.flags,
            });
        let fields = self
            .field_cells()
            .filter(|c| c.role_id == role_id)
            .map(|c| TemplateCell {
                flags: c.flags(),
                module_id: c.module_id,
                field_id: Some(c.field_id),
            });
        modules.chain(fields).collect()
    }

    /// 与 `baseline` 相比发生变化的单元
    pub fn diff(&self, baseline: &PermissionMap) -> (Vec<ModulePermissionCell>, Vec<FieldPermissionCell>) {
        let modules = self
            .module_cells()
            .filter(|c| baseline.module(c.role_id, &c.module_id) != c.flags)
            .collect();
        let fields = self
            .field_cells()
            .filter(|c| baseline.field(c.role_id, &c.module_id, &c.field_id) != c.flags())
            .collect();
        (modules, fields)
    }

    /// 删除角色时清理其单元
    pub fn remove_role(&mut self, role_id: Uuid) {
        self.modules.retain(|(rid, _), _| *rid != role_id);
        self.fields.retain(|(rid, _, _), _| *rid != role_id);
    }

    pub fn cell_refs(modules: &[ModulePermissionCell], fields: &[FieldPermissionCell]) -> Vec<CellRef> {
        modules
            .iter()
            .map(|c| CellRef {
                role_id: c.role_id,
                module_id: c.module_id.clone(),
                field_id: None,
            })
            .chain(fields.iter().map(|c| CellRef {
                role_id: c.role_id,
                module_id: c.module_id.clone(),
                field_id: Some(c.field_id.clone()),
            }))
            .collect()
    }
}
