//! PostgreSQL 仓库测试
//!
//! 需要可用的数据库：设置 TEST_DATABASE_URL 后运行 `cargo test -- --ignored`

use rbac_engine::{
    config::StorageBackend,
    error::AppError,
    models::{
        permission::{FieldPermissionCell, ModulePermissionCell, PermissionFlags},
        role::Role,
        template::{PermissionSet, TemplateCell},
    },
    repository::{PermissionRepository, PermissionStore, RoleRepository, RoleStore},
};
use serial_test::serial;

mod common;
use common::{create_test_config, setup_test_db};

fn read_only() -> PermissionFlags {
    PermissionFlags {
        read: true,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_role_crud_and_duplicate_name() {
    let config = create_test_config(StorageBackend::Postgres);
    let pool = setup_test_db(&config).await;
    let repo = RoleRepository::new(pool);

    let director = Role::new("Director", None, 1);
    repo.create_role(&director).await.unwrap();

    let dup = repo.create_role(&Role::new("DIRECTOR", None, 1)).await;
    assert!(matches!(dup, Err(AppError::DuplicateName(_))));

    let mut renamed = director.clone();
    renamed.name = "Head of Sales".to_string();
    assert!(repo.update_role(&renamed).await.unwrap());

    let roles = repo.list_roles().await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].name, "Head of Sales");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_delete_with_children_rejected() {
    let config = create_test_config(StorageBackend::Postgres);
    let pool = setup_test_db(&config).await;
    let repo = RoleRepository::new(pool);

    let parent = Role::new("Director", None, 1);
    let child = Role::new("Manager", Some(parent.id), 2);
    repo.create_role(&parent).await.unwrap();
    repo.create_role(&child).await.unwrap();

    match repo.delete_role(parent.id).await {
        Err(AppError::HasChildren { children, .. }) => assert_eq!(children, vec!["Manager"]),
        other => panic!("unexpected: {:?}", other),
    }

    assert!(repo.delete_role(child.id).await.unwrap());
    assert!(repo.delete_role(parent.id).await.unwrap());
    assert!(!repo.delete_role(parent.id).await.unwrap());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_upsert_batch_is_idempotent() {
    let config = create_test_config(StorageBackend::Postgres);
    let pool = setup_test_db(&config).await;
    let roles = RoleRepository::new(pool.clone());
    let perms = PermissionRepository::new(pool);

    let role = Role::new("Director", None, 1);
    roles.create_role(&role).await.unwrap();

    let module = ModulePermissionCell {
        role_id: role.id,
        module_id: "deals".to_string(),
        flags: read_only(),
    };
    let field = FieldPermissionCell::from_flags(role.id, "deals", "amount", read_only());

    perms
        .upsert_batch(&[module.clone()], &[field.clone()])
        .await
        .unwrap();
    perms
        .upsert_batch(&[module.clone()], &[field.clone()])
        .await
        .unwrap();

    assert_eq!(perms.load_module_permissions(role.id).await.unwrap(), vec![module]);
    assert_eq!(
        perms.load_field_permissions(role.id, "deals").await.unwrap(),
        vec![field]
    );
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_failed_batch_rolls_back() {
    let config = create_test_config(StorageBackend::Postgres);
    let pool = setup_test_db(&config).await;
    let roles = RoleRepository::new(pool.clone());
    let perms = PermissionRepository::new(pool);

    let role = Role::new("Director", None, 1);
    roles.create_role(&role).await.unwrap();

    let valid = ModulePermissionCell {
        role_id: role.id,
        module_id: "deals".to_string(),
        flags: read_only(),
    };
    // 外键违反，整批回滚
    let orphan = ModulePermissionCell {
        role_id: uuid::Uuid::new_v4(),
        module_id: "deals".to_string(),
        flags: read_only(),
    };

    assert!(perms.upsert_batch(&[valid, orphan], &[]).await.is_err());
    assert!(perms.load_module_permissions(role.id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_template_storage_roundtrip() {
    let config = create_test_config(StorageBackend::Postgres);
    let pool = setup_test_db(&config).await;
    let perms = PermissionRepository::new(pool);

    let now = chrono::Utc::now();
    let set = PermissionSet {
        id: uuid::Uuid::new_v4(),
        name: "Deal reader".to_string(),
        description: Some("read deals".to_string()),
        cells: vec![
            TemplateCell {
                module_id: "deals".to_string(),
                field_id: None,
                flags: read_only(),
            },
            TemplateCell {
                module_id: "deals".to_string(),
                field_id: Some("amount".to_string()),
                flags: read_only(),
            },
        ],
        is_template: true,
        is_active: true,
        created_by: None,
        created_at: now,
        updated_at: now,
    };

    perms.create_template(&set).await.unwrap();
    let loaded = perms.get_template(set.id).await.unwrap().unwrap();
    assert_eq!(loaded.cells, set.cells);

    let mut dup = set.clone();
    dup.id = uuid::Uuid::new_v4();
    dup.name = "deal READER".to_string();
    assert!(matches!(
        perms.create_template(&dup).await,
        Err(AppError::DuplicateName(_))
    ));

    assert!(perms.delete_template(set.id).await.unwrap());
    assert!(perms.list_templates().await.unwrap().is_empty());
}
