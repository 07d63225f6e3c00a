//! Role repository (角色数据访问)

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::RoleStore;
use crate::{
    error::{AppError, Result},
    models::role::Role,
    storage::{self, HealthStatus},
};

pub struct RoleRepository {
    db: PgPool,
}

impl RoleRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 子角色名称（删除被阻止时用于报告）
    async fn child_names(&self, id: Uuid) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM roles WHERE parent_id = $1 ORDER BY name",
        )
        .bind(id)
        .fetch_all(&self.db)
        .await?;

        Ok(names)
    }
}

#[async_trait]
impl RoleStore for RoleRepository {
    /// 列出所有角色
    async fn list_roles(&self) -> Result<Vec<Role>> {
        let roles =
            sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY hierarchy_level, name")
                .fetch_all(&self.db)
                .await?;

        Ok(roles)
    }

    /// 创建角色
    async fn create_role(&self, role: &Role) -> Result<Role> {
        let created = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (
                id, name, description, parent_id, hierarchy_level, business_unit,
                is_system, is_active, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.parent_id)
        .bind(role.hierarchy_level)
        .bind(&role.business_unit)
        .bind(role.is_system)
        .bind(role.is_active)
        .bind(role.created_by)
        .bind(role.created_at)
        .bind(role.updated_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, &role.name))?;

        Ok(created)
    }

    /// 更新角色
    async fn update_role(&self, role: &Role) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET
                name = $2,
                description = $3,
                parent_id = $4,
                hierarchy_level = $5,
                business_unit = $6,
                is_active = $7,
                updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.parent_id)
        .bind(role.hierarchy_level)
        .bind(&role.business_unit)
        .bind(role.is_active)
        .bind(role.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, &role.name))?;

        Ok(result.rows_affected() > 0)
    }

    /// 批量更新（移动后的整棵子树），单个事务
    async fn update_roles(&self, roles: &[Role]) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        for role in roles {
            let result = sqlx::query(
                r#"
                UPDATE roles
                SET
                    name = $2,
                    description = $3,
                    parent_id = $4,
                    hierarchy_level = $5,
                    business_unit = $6,
                    is_active = $7,
                    updated_at = $8
                WHERE id = $1
                "#,
            )
            .bind(role.id)
            .bind(&role.name)
            .bind(&role.description)
            .bind(role.parent_id)
            .bind(role.hierarchy_level)
            .bind(&role.business_unit)
            .bind(role.is_active)
            .bind(role.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, &role.name))?;

            if result.rows_affected() == 0 {
                tracing::warn!(role_id = %role.id, "Role missing during batch update, rolling back");
                tx.rollback().await?;
                return Ok(false);
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    /// 删除角色，存在子角色时拒绝
    async fn delete_role(&self, id: Uuid) -> Result<bool> {
        let children = self.child_names(id).await?;
        if !children.is_empty() {
            return Err(AppError::HasChildren {
                role_id: id,
                children,
            });
        }

        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(|e| match &e {
                // 并发插入子角色时由外键兜底
                sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                    AppError::HasChildren {
                        role_id: id,
                        children: Vec::new(),
                    }
                }
                _ => AppError::Database(e),
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn health(&self) -> HealthStatus {
        storage::ping(&self.db).await
    }
}

fn map_unique_violation(e: sqlx::Error, name: &str) -> AppError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::DuplicateName(name.to_string())
        }
        _ => AppError::Database(e),
    }
}
