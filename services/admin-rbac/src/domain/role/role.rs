//! 角色实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::menu::{ActionId, MenuId};
use crate::domain::reconcile::Keyed;
use crate::domain::user::{UserId, UserRole};
use crate::domain::{Status, define_id};

define_id!(RoleId);
define_id!(RoleMenuId);

/// 角色实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub remark: String,
    pub sequence: i32,
    pub status: Status,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub role_menus: Vec<RoleMenu>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: RoleId::new(),
            name: name.into(),
            remark: String::new(),
            sequence: 0,
            status: Status::Enabled,
            created_by: String::new(),
            created_at: now,
            updated_at: now,
            role_menus: Vec::new(),
        }
    }
}

/// 角色查询条件
#[derive(Debug, Clone, Default)]
pub struct RoleQuery {
    pub ids: Vec<RoleId>,
    /// 名称精确匹配
    pub name: Option<String>,
    /// 名称或备注包含该值，按字面匹配
    pub keyword: Option<String>,
    /// 只返回该用户绑定的角色
    pub user_id: Option<UserId>,
    pub status: Option<Status>,
}

impl RoleQuery {
    /// 内存过滤，与 SQL 条件保持一致
    pub fn matches(&self, role: &Role, user_roles: &[UserRole]) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&role.id) {
            return false;
        }
        if self.name.as_ref().is_some_and(|name| &role.name != name) {
            return false;
        }
        if let Some(keyword) = &self.keyword {
            if !role.name.contains(keyword.as_str()) && !role.remark.contains(keyword.as_str()) {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            let bound = user_roles
                .iter()
                .any(|b| &b.user_id == user_id && b.role_id == role.id);
            if !bound {
                return false;
            }
        }
        self.status.is_none_or(|status| role.status == status)
    }
}

/// 角色菜单授权
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMenu {
    pub id: RoleMenuId,
    pub role_id: RoleId,
    pub menu_id: MenuId,
    pub action_id: ActionId,
}

impl RoleMenu {
    pub fn new(role_id: RoleId, menu_id: MenuId, action_id: ActionId) -> Self {
        Self {
            id: RoleMenuId::new(),
            role_id,
            menu_id,
            action_id,
        }
    }
}

impl Keyed for RoleMenu {
    type Key = (MenuId, ActionId);

    fn natural_key(&self) -> Self::Key {
        (self.menu_id, self.action_id)
    }
}
