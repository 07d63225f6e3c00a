//! Permission repository (权限单元与模板的数据访问)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::PermissionStore;
use crate::{
    error::{AppError, Result},
    models::{
        permission::{FieldPermissionCell, ModulePermissionCell, PermissionFlags},
        template::{PermissionSet, TemplateCell},
    },
};

#[derive(sqlx::FromRow)]
struct ModulePermissionRow {
    role_id: Uuid,
    module_id: String,
    can_read: bool,
    can_write: bool,
    can_delete: bool,
    can_export: bool,
    can_import: bool,
    can_hide: bool,
}

impl From<ModulePermissionRow> for ModulePermissionCell {
    fn from(row: ModulePermissionRow) -> Self {
        ModulePermissionCell {
            role_id: row.role_id,
            module_id: row.module_id,
            flags: PermissionFlags {
                read: row.can_read,
                write: row.can_write,
                delete: row.can_delete,
                export: row.can_export,
                import: row.can_import,
                hide: row.can_hide,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct FieldPermissionRow {
    role_id: Uuid,
    module_id: String,
    field_id: String,
    can_read: bool,
    can_write: bool,
    can_delete: bool,
}

impl From<FieldPermissionRow> for FieldPermissionCell {
    fn from(row: FieldPermissionRow) -> Self {
        FieldPermissionCell {
            role_id: row.role_id,
            module_id: row.module_id,
            field_id: row.field_id,
            read: row.can_read,
            write: row.can_write,
            delete: row.can_delete,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PermissionSetRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    cells: Json<Vec<TemplateCell>>,
    is_template: bool,
    is_active: bool,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PermissionSetRow> for PermissionSet {
    fn from(row: PermissionSetRow) -> Self {
        PermissionSet {
            id: row.id,
            name: row.name,
            description: row.description,
            cells: row.cells.0,
            is_template: row.is_template,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const UPSERT_MODULE: &str = r#"
    INSERT INTO module_permissions (
        role_id, module_id, can_read, can_write, can_delete, can_export, can_import, can_hide
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (role_id, module_id) DO UPDATE SET
        can_read = EXCLUDED.can_read,
        can_write = EXCLUDED.can_write,
        can_delete = EXCLUDED.can_delete,
        can_export = EXCLUDED.can_export,
        can_import = EXCLUDED.can_import,
        can_hide = EXCLUDED.can_hide,
        updated_at = NOW()
"#;

const UPSERT_FIELD: &str = r#"
    INSERT INTO field_permissions (role_id, module_id, field_id, can_read, can_write, can_delete)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (role_id, module_id, field_id) DO UPDATE SET
        can_read = EXCLUDED.can_read,
        can_write = EXCLUDED.can_write,
        can_delete = EXCLUDED.can_delete,
        updated_at = NOW()
"#;

pub struct PermissionRepository {
    db: PgPool,
}

impl PermissionRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn upsert_module_tx(
        tx: &mut Transaction<'_, Postgres>,
        cell: &ModulePermissionCell,
    ) -> Result<()> {
        sqlx::query(UPSERT_MODULE)
            .bind(cell.role_id)
            .bind(&cell.module_id)
            .bind(cell.flags.read)
            .bind(cell.flags.write)
            .bind(cell.flags.delete)
            .bind(cell.flags.export)
            .bind(cell.flags.import)
            .bind(cell.flags.hide)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn upsert_field_tx(
        tx: &mut Transaction<'_, Postgres>,
        cell: &FieldPermissionCell,
    ) -> Result<()> {
        sqlx::query(UPSERT_FIELD)
            .bind(cell.role_id)
            .bind(&cell.module_id)
            .bind(&cell.field_id)
            .bind(cell.read)
            .bind(cell.write)
            .bind(cell.delete)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PermissionRepository {
    // ==================== Cells ====================

    async fn load_module_permissions(&self, role_id: Uuid) -> Result<Vec<ModulePermissionCell>> {
        let rows = sqlx::query_as::<_, ModulePermissionRow>(
            r#"
            SELECT role_id, module_id, can_read, can_write, can_delete, can_export, can_import, can_hide
            FROM module_permissions
            WHERE role_id = $1
            ORDER BY module_id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn load_field_permissions(
        &self,
        role_id: Uuid,
        module_id: &str,
    ) -> Result<Vec<FieldPermissionCell>> {
        let rows = sqlx::query_as::<_, FieldPermissionRow>(
            r#"
            SELECT role_id, module_id, field_id, can_read, can_write, can_delete
            FROM field_permissions
            WHERE role_id = $1 AND module_id = $2
            ORDER BY field_id
            "#,
        )
        .bind(role_id)
        .bind(module_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_module_permission(&self, cell: &ModulePermissionCell) -> Result<()> {
        let mut tx = self.db.begin().await?;
        Self::upsert_module_tx(&mut tx, cell).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_field_permission(&self, cell: &FieldPermissionCell) -> Result<()> {
        let mut tx = self.db.begin().await?;
        Self::upsert_field_tx(&mut tx, cell).await?;
        tx.commit().await?;
        Ok(())
    }

    /// 单个事务，全部成功或全部回滚
    async fn upsert_batch(
        &self,
        modules: &[ModulePermissionCell],
        fields: &[FieldPermissionCell],
    ) -> Result<()> {
        let mut tx = self.db.begin().await?;

        for cell in modules {
            Self::upsert_module_tx(&mut tx, cell).await?;
        }
        for cell in fields {
            Self::upsert_field_tx(&mut tx, cell).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            module_cells = modules.len(),
            field_cells = fields.len(),
            "Permission batch committed"
        );
        Ok(())
    }

    // ==================== Templates ====================

    async fn list_templates(&self) -> Result<Vec<PermissionSet>> {
        let rows = sqlx::query_as::<_, PermissionSetRow>(
            "SELECT * FROM permission_sets WHERE is_active ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<PermissionSet>> {
        let row = sqlx::query_as::<_, PermissionSetRow>(
            "SELECT * FROM permission_sets WHERE id = $1 AND is_active",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn create_template(&self, set: &PermissionSet) -> Result<PermissionSet> {
        let row = sqlx::query_as::<_, PermissionSetRow>(
            r#"
            INSERT INTO permission_sets (
                id, name, description, cells, is_template, is_active, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(set.id)
        .bind(&set.name)
        .bind(&set.description)
        .bind(Json(&set.cells))
        .bind(set.is_template)
        .bind(set.is_active)
        .bind(set.created_by)
        .bind(set.created_at)
        .bind(set.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::DuplicateName(set.name.clone())
            }
            _ => AppError::Database(e),
        })?;

        Ok(row.into())
    }

    async fn delete_template(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM permission_sets WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
