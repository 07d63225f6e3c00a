//! 存储后端装配
//!
//! 按 `storage.backend` 打开 PostgreSQL 或内存存储，交给引擎的是两个存储接口，
//! 调用方不关心具体实现。

use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::{AppConfig, DatabaseConfig, StorageBackend},
    error::{AppError, Result},
    repository::{InMemoryStore, PermissionRepository, PermissionStore, RoleRepository, RoleStore},
};

/// 引擎使用的存储接口
pub struct Stores {
    pub roles: Arc<dyn RoleStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

/// 打开配置的存储后端；postgres 后端按配置执行迁移
pub async fn open(config: &AppConfig) -> Result<Stores> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let pool = connect(&config.database).await?;
            if config.database.run_migrations {
                migrate(&pool).await?;
            }
            Ok(Stores {
                roles: Arc::new(RoleRepository::new(pool.clone())),
                permissions: Arc::new(PermissionRepository::new(pool)),
            })
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            Ok(Stores {
                roles: store.clone(),
                permissions: store,
            })
        }
    }
}

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let url = config.url.as_ref().ok_or_else(|| {
        AppError::Config("database.url is required for the postgres storage backend".to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .test_before_acquire(true)
        .connect(url.expose_secret())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to the permission database");
            AppError::Database(e)
        })?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Permission database connected"
    );
    Ok(pool)
}

/// roles / permission cells / permission_sets 表
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Permission schema migration failed");
            AppError::Database(e.into())
        })?;

    tracing::info!("Permission schema up to date");
    Ok(())
}

/// 存储健康状态（/ready 使用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

pub async fn ping(pool: &PgPool) -> HealthStatus {
    metrics::gauge!("rbac.db.pool.size").set(pool.size() as f64);
    metrics::gauge!("rbac.db.pool.idle").set(pool.num_idle() as f64);

    match sqlx::query("SELECT 1").execute(pool).await {
        Ok(_) => HealthStatus::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            HealthStatus::Unhealthy(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CatalogConfig, LoggingConfig, ServerConfig, StorageConfig};
    use crate::models::{permission::ModulePermissionCell, role::Role};

    fn config(backend: StorageBackend) -> AppConfig {
        AppConfig {
            server: ServerConfig {
                addr: "127.0.0.1:3000".to_string(),
                graceful_shutdown_timeout_secs: 5,
            },
            storage: StorageConfig {
                backend,
                event_capacity: 16,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 2,
                min_connections: 1,
                acquire_timeout_secs: 1,
                idle_timeout_secs: 60,
                max_lifetime_secs: 60,
                run_migrations: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            catalog: CatalogConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_memory_backend_shares_one_store() {
        let stores = open(&config(StorageBackend::Memory)).await.unwrap();
        let role = Role::new("Director", None, 1);
        stores.roles.create_role(&role).await.unwrap();

        let mut cell = ModulePermissionCell {
            role_id: role.id,
            module_id: "deals".to_string(),
            flags: Default::default(),
        };
        cell.flags.read = true;
        stores.permissions.upsert_module_permission(&cell).await.unwrap();
        assert_eq!(stores.permissions.load_module_permissions(role.id).await.unwrap(), vec![cell]);

        // 删除角色时其权限单元一并移除
        assert!(stores.roles.delete_role(role.id).await.unwrap());
        assert!(stores.permissions.load_module_permissions(role.id).await.unwrap().is_empty());
        assert!(stores.roles.health().await.is_healthy());
    }

    #[tokio::test]
    async fn test_postgres_backend_requires_url() {
        match open(&config(StorageBackend::Postgres)).await {
            Err(AppError::Config(msg)) => assert!(msg.contains("database.url")),
            Err(other) => panic!("unexpected error: {:?}", other),
            Ok(_) => panic!("opened postgres without a url"),
        }
    }

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(!HealthStatus::Unhealthy("Connection refused".to_string()).is_healthy());
    }
}
