//! 权限编辑服务
//!
//! 每个修改请求在同一把异步锁内完成 加载 → 修改 → 保存，
//! 同一进程中的两个请求不会交错写入各自的批次。
//! 成功的修改连同当前的冲突与依赖告警一起返回。
//! 保存失败时会话保持 Dirty 并由服务保留，直到重试保存或放弃；期间新的修改被拒绝。

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::permission_session::{BulkOutcome, PermissionSession, SaveOutcome, SessionState};
use crate::{
    error::{AppError, Result},
    events::{EngineEvent, EventBus},
    models::{
        catalog::ModuleCatalog,
        permission::{
            AggregateState, CellRef, Conflict, DependencyWarning, EffectivePermission,
            FieldPermissionCell, ModulePermissionCell, PermissionSummary, PermissionType,
            ValidationReport,
        },
        template::PermissionSet,
    },
    repository::{PermissionStore, RoleStore},
};

/// 修改结果及修改后的校验报告
#[derive(Debug, Clone, Serialize)]
pub struct EditOutcome<T> {
    pub result: T,
    pub saved: SaveOutcome,
    pub report: ValidationReport,
}

/// 单个角色的权限视图
#[derive(Debug, Clone, Serialize)]
pub struct RolePermissions {
    pub role_id: Uuid,
    pub modules: Vec<ModulePermissionCell>,
    pub fields: Vec<FieldPermissionCell>,
    /// module_id → 字段级权限类型的聚合状态
    pub aggregates: BTreeMap<String, BTreeMap<PermissionType, AggregateState>>,
    pub summary: PermissionSummary,
}

/// 编辑会话状态
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub saving: bool,
    pub pending_cells: Vec<CellRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscardOutcome {
    pub discarded_cells: usize,
    pub report: ValidationReport,
}

pub struct PermissionService {
    roles: Arc<dyn RoleStore>,
    store: Arc<dyn PermissionStore>,
    catalog: Arc<ModuleCatalog>,
    events: EventBus,
    /// 保存失败后保留的会话；锁本身串行化所有修改
    pending: Mutex<Option<PermissionSession>>,
    saving: AtomicBool,
}

impl PermissionService {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        store: Arc<dyn PermissionStore>,
        catalog: Arc<ModuleCatalog>,
        events: EventBus,
    ) -> Self {
        Self {
            roles,
            store,
            catalog,
            events,
            pending: Mutex::new(None),
            saving: AtomicBool::new(false),
        }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// 从存储加载一个新的编辑会话
    pub async fn open_session(&self) -> Result<PermissionSession> {
        PermissionSession::load(self.roles.as_ref(), self.store.as_ref(), self.catalog.clone()).await
    }

    /// 加载 → 修改 → 保存。修改失败时不写入任何单元；保存失败时会话被保留并返回 `Persistence`。
    async fn edit<T, F>(&self, op: F) -> Result<EditOutcome<T>>
    where
        F: FnOnce(&mut PermissionSession) -> Result<T>,
    {
        let mut pending = self.pending.lock().await;
        if let Some(session) = pending.as_ref() {
            let cells = session.pending_cells().len();
            tracing::warn!(pending_cells = cells, "Edit rejected, unsaved permission changes pending");
            return Err(AppError::UnsavedChanges(cells));
        }

        let mut session = self.open_session().await?;
        let result = op(&mut session)?;
        match self.commit(&mut session).await {
            Ok(saved) => Ok(EditOutcome {
                result,
                saved,
                report: self.report(&session),
            }),
            Err(e) => {
                *pending = Some(session);
                Err(e)
            }
        }
    }

    async fn commit(&self, session: &mut PermissionSession) -> Result<SaveOutcome> {
        self.saving.store(true, Ordering::SeqCst);
        let result = session.save(self.store.as_ref()).await;
        self.saving.store(false, Ordering::SeqCst);
        let saved = result?;

        if !saved.is_empty() {
            self.events.publish(EngineEvent::PermissionsSaved {
                role_ids: saved.role_ids.clone(),
                module_cells: saved.module_cells,
                field_cells: saved.field_cells,
            });
        }
        Ok(saved)
    }

    fn report(&self, session: &PermissionSession) -> ValidationReport {
        let report = session.report();
        metrics::gauge!("rbac.conflicts").set(report.conflicts.len() as f64);
        report
    }

    // ==================== 会话 ====================

    pub async fn session_status(&self) -> SessionStatus {
        if self.saving.load(Ordering::SeqCst) {
            return SessionStatus {
                state: SessionState::Dirty,
                saving: true,
                pending_cells: Vec::new(),
            };
        }

        match self.pending.lock().await.as_ref() {
            Some(session) => SessionStatus {
                state: session.state(),
                saving: session.is_saving(),
                pending_cells: session.pending_cells(),
            },
            None => SessionStatus {
                state: SessionState::Clean,
                saving: false,
                pending_cells: Vec::new(),
            },
        }
    }

    /// 重试保存上次失败的修改；没有待保存的修改时什么也不写
    pub async fn save_pending(&self) -> Result<EditOutcome<()>> {
        let mut pending = self.pending.lock().await;
        let Some(mut session) = pending.take() else {
            let session = self.open_session().await?;
            return Ok(EditOutcome {
                result: (),
                saved: SaveOutcome::default(),
                report: self.report(&session),
            });
        };

        tracing::info!(pending_cells = session.pending_cells().len(), "Retrying permission save");
        match self.commit(&mut session).await {
            Ok(saved) => Ok(EditOutcome {
                result: (),
                saved,
                report: self.report(&session),
            }),
            Err(e) => {
                *pending = Some(session);
                Err(e)
            }
        }
    }

    /// 放弃保留的修改并从存储重新加载
    pub async fn discard_pending(&self) -> Result<DiscardOutcome> {
        let mut pending = self.pending.lock().await;
        let Some(session) = pending.as_mut() else {
            let session = self.open_session().await?;
            return Ok(DiscardOutcome {
                discarded_cells: 0,
                report: self.report(&session),
            });
        };

        let discarded_cells = session.pending_cells().len();
        session
            .discard(self.roles.as_ref(), self.store.as_ref())
            .await?;
        let report = self.report(session);
        *pending = None;

        self.events
            .publish(EngineEvent::PermissionsDiscarded { cells: discarded_cells });
        Ok(DiscardOutcome {
            discarded_cells,
            report,
        })
    }

    // ==================== 查询 ====================

    pub async fn role_permissions(&self, role_id: Uuid) -> Result<RolePermissions> {
        let session = self.open_session().await?;
        session.hierarchy().require(role_id)?;

        let mut fields = Vec::new();
        let mut aggregates = BTreeMap::new();
        for module in &self.catalog.modules {
            fields.extend(session.map().field_cells_for(role_id, &module.id));

            let mut states = BTreeMap::new();
            for perm in PermissionType::FIELD_SCOPED {
                states.insert(perm, session.module_aggregate_state(role_id, &module.id, perm)?);
            }
            aggregates.insert(module.id.clone(), states);
        }

        Ok(RolePermissions {
            role_id,
            modules: session.map().module_cells_for(role_id),
            fields,
            aggregates,
            summary: session.permission_summary(role_id)?,
        })
    }

    pub async fn effective_module_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
    ) -> Result<EffectivePermission> {
        self.open_session()
            .await?
            .effective_module_permission(role_id, module_id, perm)
    }

    pub async fn effective_field_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        field_id: &str,
        perm: PermissionType,
    ) -> Result<EffectivePermission> {
        self.open_session()
            .await?
            .effective_field_permission(role_id, module_id, field_id, perm)
    }

    /// 模块级冲突；`include_fields` 时附加字段级扫描结果
    pub async fn conflicts(&self, include_fields: bool) -> Result<Vec<Conflict>> {
        let session = self.open_session().await?;
        let mut conflicts = session.detect_conflicts();
        if include_fields {
            conflicts.extend(session.detect_field_conflicts());
        }
        metrics::gauge!("rbac.conflicts").set(conflicts.len() as f64);
        Ok(conflicts)
    }

    pub async fn warnings(&self) -> Result<Vec<DependencyWarning>> {
        Ok(self.open_session().await?.dependency_warnings())
    }

    // ==================== 修改 ====================

    pub async fn set_module_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        perm: PermissionType,
        value: bool,
    ) -> Result<EditOutcome<()>> {
        tracing::info!(role_id = %role_id, module_id = %module_id, perm = %perm, value, "Set module permission");
        self.edit(|s| s.set_module_permission(role_id, module_id, perm, value))
            .await
    }

    pub async fn set_field_permission(
        &self,
        role_id: Uuid,
        module_id: &str,
        field_id: &str,
        perm: PermissionType,
        value: bool,
    ) -> Result<EditOutcome<()>> {
        tracing::info!(
            role_id = %role_id,
            module_id = %module_id,
            field_id = %field_id,
            perm = %perm,
            value,
            "Set field permission"
        );
        self.edit(|s| s.set_field_permission(role_id, module_id, field_id, perm, value))
            .await
    }

    pub async fn bulk_set(
        &self,
        role_ids: &[Uuid],
        module_ids: &[String],
        perm: PermissionType,
        value: bool,
    ) -> Result<EditOutcome<BulkOutcome>> {
        self.edit(|s| s.bulk_set(role_ids, module_ids, perm, value))
            .await
    }

    pub async fn select_all_modules(
        &self,
        role_ids: &[Uuid],
        module_ids: &[String],
        value: bool,
    ) -> Result<EditOutcome<BulkOutcome>> {
        self.edit(|s| s.select_all_modules(role_ids, module_ids, value))
            .await
    }

    pub async fn copy_permissions(
        &self,
        source_role_id: Uuid,
        target_role_ids: &[Uuid],
        module_ids: &[String],
    ) -> Result<EditOutcome<()>> {
        self.edit(|s| s.copy_permissions(source_role_id, target_role_ids, module_ids))
            .await
    }

    // ==================== 模板 ====================

    pub async fn list_templates(&self) -> Result<Vec<PermissionSet>> {
        self.store.list_templates().await
    }

    pub async fn create_template(
        &self,
        source_role_id: Uuid,
        name: &str,
        description: Option<String>,
        created_by: Option<Uuid>,
    ) -> Result<PermissionSet> {
        let session = self.open_session().await?;
        let set = session.create_template(source_role_id, name, description, created_by)?;
        let set = self.store.create_template(&set).await?;

        tracing::info!(
            template_id = %set.id,
            name = %set.name,
            source_role_id = %source_role_id,
            cells = set.cells.len(),
            "Template created"
        );
        self.events.publish(EngineEvent::TemplateCreated {
            template_id: set.id,
            name: set.name.clone(),
        });
        Ok(set)
    }

    pub async fn delete_template(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_template(id).await? {
            return Err(AppError::not_found(&format!("template {}", id)));
        }
        tracing::info!(template_id = %id, "Template deleted");
        self.events.publish(EngineEvent::TemplateDeleted { template_id: id });
        Ok(())
    }

    pub async fn apply_template(&self, template_id: Uuid, role_id: Uuid) -> Result<EditOutcome<usize>> {
        let set = self
            .store
            .get_template(template_id)
            .await?
            .ok_or_else(|| AppError::not_found(&format!("template {}", template_id)))?;

        let outcome = self.edit(|s| s.apply_template(&set, role_id)).await?;
        self.events.publish(EngineEvent::TemplateApplied {
            template_id,
            role_id,
        });
        Ok(outcome)
    }
}
