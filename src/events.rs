//! 引擎事件
//! 角色与权限变更通过进程内广播发出，审计/通知等协作方自行订阅并决定存储方式

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// 引擎事件类型
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    RoleCreated {
        role_id: Uuid,
        name: String,
        parent_id: Option<Uuid>,
    },
    RoleUpdated {
        role_id: Uuid,
        name: String,
    },
    /// 重新挂载；`relevelled` 为层级发生变化的角色数（含自身）
    RoleMoved {
        role_id: Uuid,
        old_parent_id: Option<Uuid>,
        new_parent_id: Option<Uuid>,
        relevelled: usize,
    },
    RoleDeleted {
        role_id: Uuid,
        name: String,
    },
    PermissionsSaved {
        role_ids: Vec<Uuid>,
        module_cells: usize,
        field_cells: usize,
    },
    /// 放弃保存失败后保留的修改
    PermissionsDiscarded {
        cells: usize,
    },
    TemplateCreated {
        template_id: Uuid,
        name: String,
    },
    TemplateApplied {
        template_id: Uuid,
        role_id: Uuid,
    },
    TemplateDeleted {
        template_id: Uuid,
    },
}

impl EngineEvent {
    /// 事件类型名称
    pub fn event_type(&self) -> &'static str {
        match self {
            EngineEvent::RoleCreated { .. } => "role_created",
            EngineEvent::RoleUpdated { .. } => "role_updated",
            EngineEvent::RoleMoved { .. } => "role_moved",
            EngineEvent::RoleDeleted { .. } => "role_deleted",
            EngineEvent::PermissionsSaved { .. } => "permissions_saved",
            EngineEvent::PermissionsDiscarded { .. } => "permissions_discarded",
            EngineEvent::TemplateCreated { .. } => "template_created",
            EngineEvent::TemplateApplied { .. } => "template_applied",
            EngineEvent::TemplateDeleted { .. } => "template_deleted",
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"type\":\"{}\"}}", self.event_type()))
    }
}

/// 事件总线
#[derive(Clone)]
pub struct EventBus {
    /// 广播发送器（用于向所有订阅者发送事件）
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// 创建新的事件总线
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// 发布事件；没有订阅者时直接丢弃
    pub fn publish(&self, event: EngineEvent) {
        tracing::info!(event = event.event_type(), payload = %event.to_json(), "Engine event");
        if self.sender.send(event).is_err() {
            tracing::debug!("No event subscribers");
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}
