//! Role domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    /// 根角色为 1，子角色为父角色 + 1
    pub hierarchy_level: i32,
    pub business_unit: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// 构造一个尚未持久化的角色
    pub fn new(name: impl Into<String>, parent_id: Option<Uuid>, hierarchy_level: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            parent_id,
            hierarchy_level,
            business_unit: None,
            is_system: false,
            is_active: true,
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 名称比较大小写不敏感
    pub fn name_matches(&self, other: &str) -> bool {
        self.name.trim().to_lowercase() == other.trim().to_lowercase()
    }
}

/// Role tree node
#[derive(Debug, Clone, Serialize)]
pub struct RoleNode {
    pub role: Role,
    pub children: Vec<RoleNode>,
}

/// Create role request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub is_system: bool,
}

/// Update role request
///
/// `parent_id` 区分三种情况：字段缺失表示不变，`null` 表示提升为根角色，
/// 具体值表示移动到新的父角色下。
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub parent_id: Option<Option<Uuid>>,
    #[validate(length(max = 100))]
    pub business_unit: Option<String>,
    pub is_active: Option<bool>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matches_case_insensitive() {
        let role = Role::new("Sales Manager", None, 1);
        assert!(role.name_matches("sales manager"));
        assert!(role.name_matches("  SALES MANAGER "));
        assert!(!role.name_matches("Sales"));
    }

    #[test]
    fn test_update_request_parent_tristate() {
        let missing: UpdateRoleRequest = serde_json::from_str(r#"{"name":"A"}"#).unwrap();
        assert_eq!(missing.parent_id, None);

        let cleared: UpdateRoleRequest = serde_json::from_str(r#"{"parent_id":null}"#).unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let id = Uuid::new_v4();
        let moved: UpdateRoleRequest =
            serde_json::from_str(&format!(r#"{{"parent_id":"{}"}}"#, id)).unwrap();
        assert_eq!(moved.parent_id, Some(Some(id)));
    }

    #[test]
    fn test_create_request_validation() {
        let req = CreateRoleRequest {
            name: String::new(),
            description: None,
            parent_id: None,
            business_unit: None,
            is_system: false,
        };
        assert!(req.validate().is_err());
    }
}
