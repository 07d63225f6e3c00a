//! Permission cell models
//!
//! 模块级与字段级权限单元、派生视图（三态聚合、冲突、依赖告警）。

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// 权限类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Read,
    Write,
    Delete,
    Export,
    Import,
    Hide,
}

impl PermissionType {
    pub const ALL: [PermissionType; 6] = [
        PermissionType::Read,
        PermissionType::Write,
        PermissionType::Delete,
        PermissionType::Export,
        PermissionType::Import,
        PermissionType::Hide,
    ];

    /// 字段级单元只有 read/write/delete
    pub const FIELD_SCOPED: [PermissionType; 3] =
        [PermissionType::Read, PermissionType::Write, PermissionType::Delete];

    /// "全选" 开关覆盖的类型（不含 import/hide）
    pub const SELECT_ALL: [PermissionType; 4] = [
        PermissionType::Read,
        PermissionType::Write,
        PermissionType::Delete,
        PermissionType::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Read => "read",
            PermissionType::Write => "write",
            PermissionType::Delete => "delete",
            PermissionType::Export => "export",
            PermissionType::Import => "import",
            PermissionType::Hide => "hide",
        }
    }

    pub fn is_field_scoped(self) -> bool {
        Self::FIELD_SCOPED.contains(&self)
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个单元上每种权限类型的布尔值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFlags {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub export: bool,
    #[serde(default)]
    pub import: bool,
    #[serde(default)]
    pub hide: bool,
}

impl PermissionFlags {
    pub fn get(&self, perm: PermissionType) -> bool {
        match perm {
            PermissionType::Read => self.read,
            PermissionType::Write => self.write,
            PermissionType::Delete => self.delete,
            PermissionType::Export => self.export,
            PermissionType::Import => self.import,
            PermissionType::Hide => self.hide,
        }
    }

    pub fn set(&mut self, perm: PermissionType, value: bool) {
        match perm {
            PermissionType::Read => self.read = value,
            PermissionType::Write => self.write = value,
            PermissionType::Delete => self.delete = value,
            PermissionType::Export => self.export = value,
            PermissionType::Import => self.import = value,
            PermissionType::Hide => self.hide = value,
        }
    }

    /// 为 true 的条目数
    pub fn granted_count(&self) -> usize {
        PermissionType::ALL.iter().filter(|p| self.get(**p)).count()
    }

    /// 仅保留字段级类型
    pub fn field_scoped(self) -> Self {
        Self {
            read: self.read,
            write: self.write,
            delete: self.delete,
            ..Self::default()
        }
    }
}

/// Module permission cell, keyed by (role_id, module_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePermissionCell {
    pub role_id: Uuid,
    pub module_id: String,
    #[serde(flatten)]
    pub flags: PermissionFlags,
}

/// Field permission cell, keyed by (role_id, module_id, field_id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPermissionCell {
    pub role_id: Uuid,
    pub module_id: String,
    pub field_id: String,
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl FieldPermissionCell {
    pub fn from_flags(role_id: Uuid, module_id: &str, field_id: &str, flags: PermissionFlags) -> Self {
        Self {
            role_id,
            module_id: module_id.to_string(),
            field_id: field_id.to_string(),
            read: flags.read,
            write: flags.write,
            delete: flags.delete,
        }
    }

    pub fn flags(&self) -> PermissionFlags {
        PermissionFlags {
            read: self.read,
            write: self.write,
            delete: self.delete,
            ..PermissionFlags::default()
        }
    }
}

/// 单元地址（用于报告未保存的单元）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub role_id: Uuid,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
}

/// 模块级三态聚合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateState {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "some")]
    Partial,
    #[serde(rename = "none")]
    Empty,
}

/// 有效权限：`effective` 始终等于 `direct`，继承仅作参考
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectivePermission {
    pub direct: bool,
    pub inherited: bool,
    pub effective: bool,
    /// 最近一个直接拥有该权限的祖先
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherited_from: Option<Uuid>,
}

/// Permission counts for a role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSummary {
    pub direct: usize,
    pub inherited: usize,
    pub total: usize,
}

/// 冲突类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// 子角色拥有父角色没有的权限
    Override,
}

/// Derived, non-persisted conflict record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub role_id: Uuid,
    pub parent_id: Uuid,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    pub permission_type: PermissionType,
    pub message: String,
}

/// 依赖规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyRule {
    WriteRequiresRead,
    DeleteRequiresRead,
    ExportRequiresRead,
    ImportRequiresWrite,
}

impl DependencyRule {
    pub const ALL: [DependencyRule; 4] = [
        DependencyRule::WriteRequiresRead,
        DependencyRule::DeleteRequiresRead,
        DependencyRule::ExportRequiresRead,
        DependencyRule::ImportRequiresWrite,
    ];

    /// (拥有的权限, 依赖的权限)
    pub fn pair(&self) -> (PermissionType, PermissionType) {
        match self {
            DependencyRule::WriteRequiresRead => (PermissionType::Write, PermissionType::Read),
            DependencyRule::DeleteRequiresRead => (PermissionType::Delete, PermissionType::Read),
            DependencyRule::ExportRequiresRead => (PermissionType::Export, PermissionType::Read),
            DependencyRule::ImportRequiresWrite => (PermissionType::Import, PermissionType::Write),
        }
    }

    pub fn message(&self) -> String {
        let (granted, required) = self.pair();
        format!("{} requires {}", granted, required)
    }
}

/// Advisory warning for a cell that violates a dependency rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyWarning {
    pub rule: DependencyRule,
    pub role_id: Uuid,
    pub module_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    pub message: String,
}

/// 每次操作都随结果返回的非阻塞发现
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<DependencyWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.warnings.is_empty()
    }
}

/// 设置单个权限
#[derive(Debug, Deserialize)]
pub struct SetPermissionRequest {
    pub permission_type: PermissionType,
    pub value: bool,
}

/// 角色 × 模块 批量设置
#[derive(Debug, Deserialize, Validate)]
pub struct BulkPermissionRequest {
    #[validate(length(min = 1))]
    pub role_ids: Vec<Uuid>,
    #[validate(length(min = 1))]
    pub module_ids: Vec<String>,
    pub permission_type: PermissionType,
    pub value: bool,
}

/// 全选 read/write/delete/export
#[derive(Debug, Deserialize, Validate)]
pub struct SelectAllRequest {
    #[validate(length(min = 1))]
    pub role_ids: Vec<Uuid>,
    #[validate(length(min = 1))]
    pub module_ids: Vec<String>,
    pub value: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CopyPermissionsRequest {
    pub source_role_id: Uuid,
    #[validate(length(min = 1))]
    pub target_role_ids: Vec<Uuid>,
    #[validate(length(min = 1))]
    pub module_ids: Vec<String>,
}

/// 有效权限查询；`field_id` 缺失时查询模块级
#[derive(Debug, Deserialize)]
pub struct EffectiveQuery {
    pub module_id: String,
    pub field_id: Option<String>,
    pub permission_type: PermissionType,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConflictQuery {
    #[serde(default)]
    pub include_fields: bool,
}
