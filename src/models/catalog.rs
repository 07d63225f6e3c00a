//! 模块 / 字段目录
//! 权限的可寻址目标，引擎只读

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl ModuleDef {
    pub fn has_field(&self, field_id: &str) -> bool {
        self.fields.iter().any(|f| f.id == field_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCatalog {
    pub modules: Vec<ModuleDef>,
}

impl ModuleCatalog {
    pub fn new(modules: Vec<ModuleDef>) -> Self {
        Self { modules }
    }

    /// 内置 CRM 目录
    pub fn default_crm() -> Self {
        fn module(id: &str, name: &str, fields: &[(&str, &str)]) -> ModuleDef {
            ModuleDef {
                id: id.to_string(),
                name: name.to_string(),
                fields: fields
                    .iter()
                    .map(|(id, name)| FieldDef {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
            }
        }

        Self::new(vec![
            module(
                "leads",
                "Leads",
                &[
                    ("name", "Name"),
                    ("email", "Email"),
                    ("phone", "Phone"),
                    ("company", "Company"),
                    ("status", "Status"),
                    ("source", "Source"),
                    ("score", "Lead Score"),
                ],
            ),
            module(
                "deals",
                "Deals",
                &[
                    ("name", "Deal Name"),
                    ("amount", "Amount"),
                    ("stage", "Stage"),
                    ("probability", "Probability"),
                    ("close_date", "Close Date"),
                    ("owner", "Owner"),
                ],
            ),
            module(
                "contacts",
                "Contacts",
                &[
                    ("first_name", "First Name"),
                    ("last_name", "Last Name"),
                    ("email", "Email"),
                    ("phone", "Phone"),
                    ("position", "Position"),
                    ("account", "Account"),
                ],
            ),
            module(
                "accounts",
                "Accounts",
                &[
                    ("name", "Account Name"),
                    ("industry", "Industry"),
                    ("revenue", "Annual Revenue"),
                    ("employees", "Employees"),
                    ("website", "Website"),
                ],
            ),
        ])
    }

    /// 从 JSON/TOML 文件加载目录
    pub fn from_file(path: &str) -> Result<Self, AppError> {
        let catalog: ModuleCatalog = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?
            .try_deserialize()?;

        catalog.validate()?;

        tracing::info!(path = %path, modules = catalog.modules.len(), "Module catalog loaded");
        Ok(catalog)
    }

    /// 模块与字段 id 必须唯一
    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = std::collections::HashSet::new();
        for module in &self.modules {
            if !seen.insert(module.id.as_str()) {
                return Err(AppError::Config(format!("Duplicate module id: {}", module.id)));
            }
            let mut fields = std::collections::HashSet::new();
            for field in &module.fields {
                if !fields.insert(field.id.as_str()) {
                    return Err(AppError::Config(format!(
                        "Duplicate field id {} in module {}",
                        field.id, module.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn module(&self, module_id: &str) -> Option<&ModuleDef> {
        self.modules.iter().find(|m| m.id == module_id)
    }

    pub fn require_module(&self, module_id: &str) -> Result<&ModuleDef, AppError> {
        self.module(module_id)
            .ok_or_else(|| AppError::NotFound(format!("module {}", module_id)))
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.id.as_str())
    }
}
