//! Permission set (template) models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::permission::PermissionFlags;

/// 模板中的一个单元；`field_id` 为空表示模块级单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCell {
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    #[serde(flatten)]
    pub flags: PermissionFlags,
}

/// Named reusable snapshot of permission cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub cells: Vec<TemplateCell>,
    pub is_template: bool,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionSet {
    pub fn module_cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.field_id.is_none()).count()
    }

    pub fn field_cell_count(&self) -> usize {
        self.cells.len() - self.module_cell_count()
    }
}

/// Create template request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTemplateRequest {
    pub source_role_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

/// Apply template request
#[derive(Debug, Deserialize)]
pub struct ApplyTemplateRequest {
    pub role_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_cell_json_is_lossless() {
        let cell = TemplateCell {
            module_id: "deals".to_string(),
            field_id: Some("amount".to_string()),
            flags: PermissionFlags {
                read: true,
                write: false,
                delete: true,
                export: false,
                import: false,
                hide: true,
            },
        };

        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(json["module_id"], "deals");
        assert_eq!(json["field_id"], "amount");
        assert_eq!(json["hide"], true);

        let back: TemplateCell = serde_json::from_value(json).unwrap();
        assert_eq!(back, cell);
    }

    #[test]
    fn test_module_cell_omits_field_id() {
        let cell = TemplateCell {
            module_id: "leads".to_string(),
            field_id: None,
            flags: PermissionFlags::default(),
        };
        let json = serde_json::to_value(&cell).unwrap();
        assert!(json.get("field_id").is_none());
    }
}
