//! 权限编辑会话
//!
//! 会话持有一份工作副本和一份规范副本（最近一次加载/保存的状态）。
//! 任何修改使会话变为 Dirty；保存成功或放弃修改后回到 Clean。
//! 保存只提交与规范副本不同的单元，并通过一次批量写入完成。

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    conflict, dependency,
    hierarchy::RoleHierarchy,
    permission_map::PermissionMap,
    resolver::{self, Resolver},
};
use crate::{
    error::{AppError, Result},
    models::{
        catalog::{ModuleCatalog, ModuleDef},
        permission::{
            AggregateState, CellRef, Conflict, DependencyWarning, EffectivePermission,
            FieldPermissionCell, ModulePermissionCell, PermissionSummary, PermissionType,
            ValidationReport,
        },
        template::PermissionSet,
    },
    repository::{PermissionStore, RoleStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Clean,
    Dirty,
}

/// 批量操作写入的单元数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub module_cells: usize,
    pub field_cells: usize,
}

/// 一次成功保存的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub role_ids: Vec<Uuid>,
    pub module_cells: usize,
    pub field_cells: usize,
}

impl SaveOutcome {
    pub fn is_empty(&self) -> bool {
        self.module_cells == 0 && self.field_cells == 0
    }
}

pub struct PermissionSession {
    catalog: Arc<ModuleCatalog>,
    hierarchy: RoleHierarchy,
    baseline: PermissionMap,
    working: PermissionMap,
    state: SessionState,
    saving: bool,
}

impl PermissionSession {
    pub fn new(catalog: Arc<ModuleCatalog>, hierarchy: RoleHierarchy, map: PermissionMap) -> Self {
        Self {
            catalog,
            hierarchy,
            baseline: map.clone(),
            working: map,
            state: SessionState::Clean,
            saving: false,
        }
    }

    /// 从存储加载所有角色及其权限单元
    pub async fn load(
        roles: &dyn RoleStore,
        store: &dyn PermissionStore,
        catalog: Arc<ModuleCatalog>,
    ) -> Result<Self> {
        let hierarchy = RoleHierarchy::new(roles.list_roles().await?);
        let map = Self::load_map(&hierarchy, store, &catalog).await?;
        Ok(Self::new(catalog, hierarchy, map))
    }

    async fn load_map(
        hierarchy: &RoleHierarchy,
        store: &dyn PermissionStore,
        catalog: &ModuleCatalog,
    ) -> Result<PermissionMap> {
        let mut modules = Vec::new();
        let mut fields = Vec::new();

        for role in hierarchy.roles() {
            modules.extend(store.load_module_permissions(role.id).await?);
            for module_id in catalog.module_ids() {
                fields.extend(store.load_field_permissions(role.id, module_id).await?);
            }
        }

        tracing::debug!(
            roles = hierarchy.len(),
            module_cells = modules.len(),
            field_cells = fields.len(),
            "Permission map loaded"
        );

        Ok(PermissionMap::from_cells(modules, fields))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.state == SessionState::Dirty
    }

    /// 保存进行中
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    pub fn map(&self) -> &PermissionMap {
        &self.working
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.hierarchy, &self.working, &self.catalog)
    }

    fn mark_dirty(&mut self) {
        self.state = SessionState::Dirty;
    }

    // ==================== 派生视图 ====================

    pub fn effective_module_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
    ) -> Result<EffectivePermission> {
        self.resolver()
            .effective_module_permission(role_id, module_id, perm)
    }

    pub fn effective_field_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        field_id: &str,
        perm: PermissionType,
    ) -> Result<EffectivePermission> {
        self.resolver()
            .effective_field_permission(role_id, module_id, field_id, perm)
    }

    pub fn module_aggregate_state(
        &self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
    ) -> Result<AggregateState> {
        self.resolver().module_aggregate_state(role_id, module_id, perm)
    }

    pub fn permission_summary(&self, role_id: Uuid) -> Result<PermissionSummary> {
        self.resolver().permission_summary(role_id)
    }

    pub fn detect_conflicts(&self) -> Vec<Conflict> {
        conflict::detect_conflicts(&self.hierarchy, &self.working, &self.catalog)
    }

    pub fn detect_field_conflicts(&self) -> Vec<Conflict> {
        conflict::detect_field_conflicts(&self.hierarchy, &self.working, &self.catalog)
    }

    pub fn dependency_warnings(&self) -> Vec<DependencyWarning> {
        dependency::validate_map(&self.working)
    }

    /// 当前工作副本上的全部非阻塞发现
    pub fn report(&self) -> ValidationReport {
        ValidationReport {
            conflicts: self.detect_conflicts(),
            warnings: self.dependency_warnings(),
        }
    }

    /// 与规范副本不同的单元
    pub fn dirty_cells(&self) -> (Vec<ModulePermissionCell>, Vec<FieldPermissionCell>) {
        self.working.diff(&self.baseline)
    }

    // ==================== 单元修改 ====================

    pub fn set_module_permission(
        &mut self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
        value: bool,
    ) -> Result<()> {
        self.hierarchy.require(role_id)?;
        resolver::set_module_permission(&mut self.working, &self.catalog, role_id, module_id, perm, value)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn set_field_permission(
        &mut self,
        role_id: Uuid,
        module_id: &str,
        field_id: &str,
        perm: PermissionType,
        value: bool,
    ) -> Result<()> {
        self.hierarchy.require(role_id)?;
        resolver::set_field_permission(
            &mut self.working,
            &self.catalog,
            role_id,
            module_id,
            field_id,
            perm,
            value,
        )?;
        self.mark_dirty();
        Ok(())
    }

    // ==================== 批量与模板 ====================

    /// 先校验全部角色与模块，任何一个不存在都不会修改任何单元
    fn validate_targets(&self, role_ids: &[Uuid], module_ids: &[String]) -> Result<Vec<ModuleDef>> {
        if role_ids.is_empty() || module_ids.is_empty() {
            return Err(AppError::BadRequest(
                "At least one role and one module must be selected".to_string(),
            ));
        }
        for role_id in role_ids {
            self.hierarchy.require(*role_id)?;
        }
        let mut seen = BTreeSet::new();
        module_ids
            .iter()
            .filter(|m| seen.insert(m.as_str()))
            .map(|m| self.catalog.require_module(m).cloned())
            .collect()
    }

    /// 角色 × 模块 的笛卡尔积上设置同一个权限类型
    pub fn bulk_set(
        &mut self,
        role_ids: &[Uuid],
        module_ids: &[String],
        perm: PermissionType,
        value: bool,
    ) -> Result<BulkOutcome> {
        self.bulk_apply(role_ids, module_ids, &[perm], value)
    }

    /// 一次性设置 read/write/delete/export（不含 import/hide）
    pub fn select_all_modules(
        &mut self,
        role_ids: &[Uuid],
        module_ids: &[String],
        value: bool,
    ) -> Result<BulkOutcome> {
        self.bulk_apply(role_ids, module_ids, &PermissionType::SELECT_ALL, value)
    }

    fn bulk_apply(
        &mut self,
        role_ids: &[Uuid],
        module_ids: &[String],
        perms: &[PermissionType],
        value: bool,
    ) -> Result<BulkOutcome> {
        let modules = self.validate_targets(role_ids, module_ids)?;
        let cascades = perms.iter().any(|p| p.is_field_scoped());

        let mut outcome = BulkOutcome::default();
        for role_id in dedup(role_ids) {
            for module in &modules {
                for perm in perms {
                    resolver::set_module_permission(
                        &mut self.working,
                        &self.catalog,
                        role_id,
                        &module.id,
                        *perm,
                        value,
                    )?;
                }
                outcome.module_cells += 1;
                if cascades {
                    outcome.field_cells += module.fields.len();
                }
            }
        }

        self.mark_dirty();
        tracing::info!(
            roles = role_ids.len(),
            modules = module_ids.len(),
            perms = ?perms,
            value,
            module_cells = outcome.module_cells,
            field_cells = outcome.field_cells,
            "Bulk permission update"
        );
        Ok(outcome)
    }

    /// 把源角色在指定模块下的单元深拷贝到每个目标角色
    pub fn copy_permissions(
        &mut self,
        source_role_id: Uuid,
        target_role_ids: &[Uuid],
        module_ids: &[String],
    ) -> Result<()> {
        self.hierarchy.require(source_role_id)?;
        if target_role_ids.contains(&source_role_id) {
            return Err(AppError::BadRequest(
                "Source role cannot also be a copy target".to_string(),
            ));
        }
        let modules = self.validate_targets(target_role_ids, module_ids)?;

        for target in dedup(target_role_ids) {
            for module in &modules {
                self.working.copy_module(source_role_id, target, module);
            }
        }

        self.mark_dirty();
        tracing::info!(
            source_role_id = %source_role_id,
            targets = target_role_ids.len(),
            modules = module_ids.len(),
            "Permissions copied"
        );
        Ok(())
    }

    /// 对角色当前的全部单元做快照
    pub fn create_template(
        &self,
        source_role_id: Uuid,
        name: &str,
        description: Option<String>,
        created_by: Option<Uuid>,
    ) -> Result<PermissionSet> {
        self.hierarchy.require(source_role_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Template name must not be empty"));
        }

        let now = Utc::now();
        Ok(PermissionSet {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            cells: self.working.snapshot(source_role_id),
            is_template: true,
            is_active: true,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    /// 合并覆盖：模板中的单元覆盖目标角色，模板中没有的单元保持不变。
    /// 目录中已不存在的模块或字段会被跳过。返回写入的单元数。
    pub fn apply_template(&mut self, set: &PermissionSet, target_role_id: Uuid) -> Result<usize> {
        self.hierarchy.require(target_role_id)?;

        let mut applied = 0;
        for cell in &set.cells {
            let Some(module) = self.catalog.module(&cell.module_id) else {
                tracing::warn!(template_id = %set.id, module_id = %cell.module_id, "Template module not in catalog, skipped");
                continue;
            };
            match &cell.field_id {
                None => self.working.put_module(target_role_id, &cell.module_id, cell.flags),
                Some(field_id) if module.has_field(field_id) => {
                    self.working
                        .put_field(target_role_id, &cell.module_id, field_id, cell.flags)
                }
                Some(field_id) => {
                    tracing::warn!(template_id = %set.id, module_id = %cell.module_id, field_id = %field_id, "Template field not in catalog, skipped");
                    continue;
                }
            }
            applied += 1;
        }

        self.mark_dirty();
        tracing::info!(
            template_id = %set.id,
            role_id = %target_role_id,
            applied,
            "Template applied"
        );
        Ok(applied)
    }

    /// 尚未保存的单元地址
    pub fn pending_cells(&self) -> Vec<CellRef> {
        let (modules, fields) = self.dirty_cells();
        PermissionMap::cell_refs(&modules, &fields)
    }

    // ==================== 提交 ====================

    /// 一次批量写入全部脏单元。失败时保持 Dirty 并列出未保存的单元，可直接重试。
    pub async fn save(&mut self, store: &dyn PermissionStore) -> Result<SaveOutcome> {
        let (modules, fields) = self.dirty_cells();
        if modules.is_empty() && fields.is_empty() {
            self.state = SessionState::Clean;
            return Ok(SaveOutcome::default());
        }

        self.saving = true;
        let result = store.upsert_batch(&modules, &fields).await;
        self.saving = false;

        match result {
            Ok(()) => {
                self.baseline = self.working.clone();
                self.state = SessionState::Clean;

                let role_ids: BTreeSet<Uuid> = modules
                    .iter()
                    .map(|c| c.role_id)
                    .chain(fields.iter().map(|c| c.role_id))
                    .collect();

                metrics::counter!("rbac.permission_cells.saved")
                    .increment((modules.len() + fields.len()) as u64);
                tracing::info!(
                    roles = role_ids.len(),
                    module_cells = modules.len(),
                    field_cells = fields.len(),
                    "Permissions saved"
                );

                Ok(SaveOutcome {
                    role_ids: role_ids.into_iter().collect(),
                    module_cells: modules.len(),
                    field_cells: fields.len(),
                })
            }
            Err(e) => {
                metrics::counter!("rbac.permission_saves.failed").increment(1);
                tracing::error!(
                    error = %e,
                    module_cells = modules.len(),
                    field_cells = fields.len(),
                    "Failed to save permissions"
                );
                Err(AppError::Persistence {
                    message: e.to_string(),
                    failed_cells: PermissionMap::cell_refs(&modules, &fields),
                })
            }
        }
    }

    /// 放弃内存中的修改，从存储重新加载
    pub async fn discard(&mut self, roles: &dyn RoleStore, store: &dyn PermissionStore) -> Result<()> {
        let hierarchy = RoleHierarchy::new(roles.list_roles().await?);
        let map = Self::load_map(&hierarchy, store, &self.catalog).await?;

        self.hierarchy = hierarchy;
        self.baseline = map.clone();
        self.working = map;
        self.state = SessionState::Clean;
        self.saving = false;

        tracing::info!("Permission edits discarded");
        Ok(())
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        catalog::{FieldDef, ModuleDef},
        role::Role,
    };

    fn module(id: &str, fields: &[&str]) -> ModuleDef {
        ModuleDef {
            id: id.to_string(),
            name: id.to_uppercase(),
            fields: fields
                .iter()
                .map(|f| FieldDef {
                    id: f.to_string(),
                    name: f.to_string(),
                })
                .collect(),
        }
    }

    fn session() -> (PermissionSession, Role, Role, Role) {
        let catalog = ModuleCatalog::new(vec![
            module("leads", &["name", "email"]),
            module("deals", &["amount", "stage"]),
            module("cases", &["subject", "priority"]),
        ]);
        let director = Role::new("Director", None, 1);
        let manager = Role::new("Manager", Some(director.id), 2);
        let rep = Role::new("Rep", Some(manager.id), 3);
        let hierarchy = RoleHierarchy::new(vec![director.clone(), manager.clone(), rep.clone()]);
        (
            PermissionSession::new(Arc::new(catalog), hierarchy, PermissionMap::new()),
            director,
            manager,
            rep,
        )
    }

    #[test]
    fn test_mutation_marks_dirty() {
        let (mut s, director, _, _) = session();
        assert_eq!(s.state(), SessionState::Clean);
        s.set_module_permission(director.id, "leads", PermissionType::Read, true)
            .unwrap();
        assert!(s.is_dirty());
    }

    #[test]
    fn test_bulk_set_touches_exact_cross_product() {
        let (mut s, director, manager, rep) = session();
        let modules = vec!["leads".to_string(), "deals".to_string()];

        let outcome = s
            .bulk_set(&[director.id, manager.id], &modules, PermissionType::Read, true)
            .unwrap();
        assert_eq!(outcome, BulkOutcome { module_cells: 4, field_cells: 8 });

        let (dirty_modules, dirty_fields) = s.dirty_cells();
        assert_eq!(dirty_modules.len(), 4);
        assert_eq!(dirty_fields.len(), 8);
        assert!(dirty_modules.iter().all(|c| c.flags.read && c.flags.granted_count() == 1));
        assert!(dirty_fields.iter().all(|c| c.read && !c.write && !c.delete));
        assert!(dirty_modules.iter().all(|c| c.role_id != rep.id && c.module_id != "cases"));
    }

    #[test]
    fn test_bulk_set_is_all_or_nothing() {
        let (mut s, director, _, _) = session();
        let modules = vec!["leads".to_string(), "unknown".to_string()];
        assert!(s
            .bulk_set(&[director.id], &modules, PermissionType::Read, true)
            .is_err());
        assert_eq!(s.state(), SessionState::Clean);
        assert!(s.map().module_cells().next().is_none());

        let missing_role = s.bulk_set(
            &[director.id, Uuid::new_v4()],
            &["leads".to_string()],
            PermissionType::Read,
            true,
        );
        assert!(matches!(missing_role, Err(AppError::NotFound(_))));
        assert!(s.map().module_cells().next().is_none());
    }

    #[test]
    fn test_select_all_skips_import_and_hide() {
        let (mut s, director, _, _) = session();
        s.select_all_modules(&[director.id], &["deals".to_string()], true)
            .unwrap();

        let flags = s.map().module(director.id, "deals");
        assert!(flags.read && flags.write && flags.delete && flags.export);
        assert!(!flags.import && !flags.hide);
        let field = s.map().field(director.id, "deals", "amount");
        assert!(field.read && field.write && field.delete);
        assert!(s.dependency_warnings().is_empty());
    }

    #[test]
    fn test_copy_permissions_rekeys_and_keeps_source() {
        let (mut s, director, manager, _) = session();
        s.set_module_permission(director.id, "deals", PermissionType::Write, true)
            .unwrap();
        s.set_field_permission(director.id, "deals", "stage", PermissionType::Read, true)
            .unwrap();
        s.set_field_permission(manager.id, "deals", "amount", PermissionType::Delete, true)
            .unwrap();
        let source_before = (
            s.map().module_cells_for(director.id),
            s.map().field_cells_for(director.id, "deals"),
        );

        s.copy_permissions(director.id, &[manager.id], &["deals".to_string()])
            .unwrap();

        assert_eq!(s.map().module(manager.id, "deals"), s.map().module(director.id, "deals"));
        for field in ["amount", "stage"] {
            assert_eq!(
                s.map().field(manager.id, "deals", field),
                s.map().field(director.id, "deals", field)
            );
        }
        let copied = s.map().field_cells_for(manager.id, "deals");
        assert!(copied.iter().all(|c| c.role_id == manager.id));
        assert_eq!(
            source_before,
            (
                s.map().module_cells_for(director.id),
                s.map().field_cells_for(director.id, "deals"),
            )
        );
    }

    #[test]
    fn test_copy_rejects_source_in_targets() {
        let (mut s, director, manager, _) = session();
        let result = s.copy_permissions(director.id, &[manager.id, director.id], &["deals".to_string()]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(!s.is_dirty());
    }

    #[test]
    fn test_template_merge_leaves_other_cells() {
        let (mut s, director, manager, _) = session();
        s.set_module_permission(director.id, "leads", PermissionType::Read, true)
            .unwrap();
        s.set_module_permission(manager.id, "cases", PermissionType::Export, true)
            .unwrap();

        let template = s
            .create_template(director.id, "Read leads", None, None)
            .unwrap();
        assert!(template.is_template);
        assert_eq!(template.module_cell_count(), 1);
        assert_eq!(template.field_cell_count(), 2);

        let applied = s.apply_template(&template, manager.id).unwrap();
        assert_eq!(applied, 3);
        assert!(s.map().module(manager.id, "leads").read);
        assert!(s.map().field(manager.id, "leads", "email").read);
        assert!(s.map().module(manager.id, "cases").export);
    }

    #[test]
    fn test_apply_template_skips_unknown_catalog_entries() {
        let (mut s, director, _, _) = session();
        let mut template = s.create_template(director.id, "Empty", None, None).unwrap();
        template.cells.push(crate::models::template::TemplateCell {
            module_id: "invoices".to_string(),
            field_id: None,
            flags: Default::default(),
        });
        template.cells.push(crate::models::template::TemplateCell {
            module_id: "deals".to_string(),
            field_id: Some("ghost".to_string()),
            flags: Default::default(),
        });
        assert_eq!(s.apply_template(&template, director.id).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_stays_dirty_then_discard() {
        let store = crate::repository::InMemoryStore::new();
        let director = Role::new("Director", None, 1);
        store.create_role(&director).await.unwrap();
        let catalog = Arc::new(ModuleCatalog::new(vec![module("deals", &["amount", "stage"])]));

        let mut s = PermissionSession::load(&store, &store, catalog).await.unwrap();
        s.set_module_permission(director.id, "deals", PermissionType::Read, true)
            .unwrap();

        store.set_fail_writes(true);
        match s.save(&store).await {
            Err(AppError::Persistence { failed_cells, .. }) => assert_eq!(failed_cells.len(), 3),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(s.is_dirty());
        assert!(!s.is_saving());

        s.discard(&store, &store).await.unwrap();
        assert_eq!(s.state(), SessionState::Clean);
        assert!(!s.map().module(director.id, "deals").read);

        store.set_fail_writes(false);
        s.set_module_permission(director.id, "deals", PermissionType::Read, true)
            .unwrap();
        let saved = s.save(&store).await.unwrap();
        assert_eq!((saved.module_cells, saved.field_cells), (1, 2));
        assert_eq!(s.state(), SessionState::Clean);
        assert!(s.dirty_cells().0.is_empty());

        let reloaded = PermissionSession::load(&store, &store, Arc::new(ModuleCatalog::new(vec![module("deals", &["amount", "stage"])])))
            .await
            .unwrap();
        assert!(reloaded.map().field(director.id, "deals", "stage").read);
    }

    #[test]
    fn test_report_combines_conflicts_and_warnings() {
        let (mut s, _, manager, _) = session();
        s.set_module_permission(manager.id, "deals", PermissionType::Import, true)
            .unwrap();
        let report = s.report();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.is_clean());
    }
}
