//! 角色层级管理
//!
//! 以 id 为索引的角色 arena。负责构建角色树、计算层级、
//! 检测重新挂载时的环，以及删除约束。

use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::role::{Role, RoleNode},
};

#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    roles: HashMap<Uuid, Role>,
}

impl RoleHierarchy {
    pub fn new(roles: Vec<Role>) -> Self {
        Self {
            roles: roles.into_iter().map(|r| (r.id, r)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<&Role> {
        self.roles.get(&id)
    }

    pub fn require(&self, id: Uuid) -> Result<&Role> {
        self.roles
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("role {}", id)))
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.roles.contains_key(&id)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name_matches(name))
    }

    pub fn insert(&mut self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub fn remove(&mut self, id: Uuid) -> Option<Role> {
        self.roles.remove(&id)
    }

    /// 已存在的父角色（悬空引用视为根）
    pub fn parent(&self, id: Uuid) -> Option<&Role> {
        self.roles
            .get(&id)
            .and_then(|r| r.parent_id)
            .and_then(|pid| self.roles.get(&pid))
    }

    /// 直接子角色，按名称排序
    pub fn children(&self, id: Uuid) -> Vec<&Role> {
        let mut children: Vec<&Role> = self
            .roles
            .values()
            .filter(|r| r.parent_id == Some(id))
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /// 删除前检查：存在任意子角色（无论是否启用）即不可删除
    pub fn can_delete(&self, id: Uuid) -> bool {
        !self.roles.values().any(|r| r.parent_id == Some(id))
    }

    /// 祖先链，由近到远；遇到悬空引用或既有环时停止
    pub fn ancestors(&self, id: Uuid) -> Vec<Uuid> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = self.parent(id);

        while let Some(parent) = current {
            if !visited.insert(parent.id) {
                break;
            }
            chain.push(parent.id);
            current = self.parent(parent.id);
        }

        chain
    }

    /// 所有后代（广度优先）
    pub fn descendants(&self, id: Uuid) -> Vec<Uuid> {
        let mut result = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for child in self.children(current) {
                if visited.insert(child.id) {
                    result.push(child.id);
                    queue.push_back(child.id);
                }
            }
        }

        result
    }

    /// 按父子关系分组构建森林
    pub fn build_tree(&self) -> Vec<RoleNode> {
        let mut by_parent: HashMap<Option<Uuid>, Vec<&Role>> = HashMap::new();
        for role in self.roles.values() {
            let key = role.parent_id.filter(|pid| self.roles.contains_key(pid));
            by_parent.entry(key).or_default().push(role);
        }
        for group in by_parent.values_mut() {
            group.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let mut visited = HashSet::new();
        let mut forest = Vec::new();
        if let Some(roots) = by_parent.get(&None) {
            for root in roots {
                forest.push(Self::build_node(root, &by_parent, &mut visited));
            }
        }

        // 既有环中的角色无法从根到达，作为根单独展示
        let mut orphans: Vec<&Role> = self
            .roles
            .values()
            .filter(|r| !visited.contains(&r.id))
            .collect();
        orphans.sort_by(|a, b| a.name.cmp(&b.name));
        for role in orphans {
            if !visited.contains(&role.id) {
                tracing::warn!(role_id = %role.id, "Role unreachable from any root, hierarchy contains a cycle");
                forest.push(Self::build_node(role, &by_parent, &mut visited));
            }
        }

        forest
    }

    fn build_node(
        role: &Role,
        by_parent: &HashMap<Option<Uuid>, Vec<&Role>>,
        visited: &mut HashSet<Uuid>,
    ) -> RoleNode {
        visited.insert(role.id);
        let mut children = Vec::new();
        if let Some(kids) = by_parent.get(&Some(role.id)) {
            for kid in kids {
                if !visited.contains(&kid.id) {
                    children.push(Self::build_node(kid, by_parent, visited));
                }
            }
        }

        RoleNode {
            role: role.clone(),
            children,
        }
    }

    /// 根为 1，否则为父层级 + 1
    pub fn compute_level(&self, id: Uuid) -> Result<i32> {
        self.require(id)?;

        let mut level = 1;
        let mut visited = HashSet::from([id]);
        let mut current = self.parent(id);

        while let Some(parent) = current {
            if !visited.insert(parent.id) {
                return Err(AppError::CircularReference {
                    role_id: id,
                    parent_id: parent.id,
                });
            }
            level += 1;
            current = self.parent(parent.id);
        }

        Ok(level)
    }

    /// 将 `role_id` 挂到 `candidate_parent_id` 下是否会形成环
    pub fn would_create_cycle(&self, role_id: Uuid, candidate_parent_id: Uuid) -> bool {
        if role_id == candidate_parent_id {
            return true;
        }

        let mut visited = HashSet::new();
        let mut current = Some(candidate_parent_id);

        while let Some(id) = current {
            if id == role_id {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            current = self.roles.get(&id).and_then(|r| r.parent_id);
        }

        false
    }

    /// 校验新角色的父角色并返回其层级
    pub fn level_under(&self, parent_id: Option<Uuid>) -> Result<i32> {
        match parent_id {
            None => Ok(1),
            Some(pid) => {
                self.require(pid)?;
                Ok(self.compute_level(pid)? + 1)
            }
        }
    }

    /// 重新挂载角色，并对整棵被移动的子树重新计算层级。
    /// 返回所有发生变化的角色（被移动的角色在首位）。
    pub fn reparent(&mut self, role_id: Uuid, new_parent_id: Option<Uuid>) -> Result<Vec<Role>> {
        self.require(role_id)?;

        if let Some(pid) = new_parent_id {
            self.require(pid)?;
            if self.would_create_cycle(role_id, pid) {
                return Err(AppError::CircularReference {
                    role_id,
                    parent_id: pid,
                });
            }
        }

        let new_level = self.level_under(new_parent_id)?;
        let now = Utc::now();
        let mut changed = Vec::new();

        if let Some(role) = self.roles.get_mut(&role_id) {
            if role.parent_id != new_parent_id || role.hierarchy_level != new_level {
                role.parent_id = new_parent_id;
                role.hierarchy_level = new_level;
                role.updated_at = now;
                changed.push(role.clone());
            }
        }

        let mut queue = VecDeque::from([(role_id, new_level)]);
        while let Some((parent_id, parent_level)) = queue.pop_front() {
            let child_ids: Vec<Uuid> = self.children(parent_id).iter().map(|r| r.id).collect();
            for child_id in child_ids {
                if let Some(child) = self.roles.get_mut(&child_id) {
                    if child.hierarchy_level != parent_level + 1 {
                        child.hierarchy_level = parent_level + 1;
                        child.updated_at = now;
                        changed.push(child.clone());
                    }
                    queue.push_back((child_id, parent_level + 1));
                }
            }
        }

        tracing::debug!(
            role_id = %role_id,
            new_parent_id = ?new_parent_id,
            relevelled = changed.len(),
            "Role reparented"
        );

        Ok(changed)
    }
}
