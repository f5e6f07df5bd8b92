//! 菜单实体

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tree::join_parent_path;
use crate::domain::reconcile::Keyed;
use crate::domain::{Status, define_id};

define_id!(MenuId);
define_id!(ActionId);
define_id!(ResourceId);

/// 菜单节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    pub id: MenuId,
    pub name: String,
    pub sequence: i32,
    pub icon: String,
    pub router: String,
    pub component: String,
    pub parent_id: Option<MenuId>,
    /// 祖先 ID 以 `/` 连接，根节点为空
    pub parent_path: String,
    pub hidden: bool,
    pub status: Status,
    pub remark: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<MenuAction>,
}

impl Menu {
    pub fn new(name: impl Into<String>, parent_id: Option<MenuId>) -> Self {
        let now = Utc::now();
        Self {
            id: MenuId::new(),
            name: name.into(),
            sequence: 0,
            icon: String::new(),
            router: String::new(),
            component: String::new(),
            parent_id,
            parent_path: String::new(),
            hidden: false,
            status: Status::Enabled,
            remark: String::new(),
            created_by: String::new(),
            created_at: now,
            updated_at: now,
            actions: Vec::new(),
        }
    }

    /// 子节点的 parent_path
    pub fn joined_path(&self) -> String {
        join_parent_path(&self.parent_path, &self.id.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// 菜单动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuAction {
    pub id: ActionId,
    pub menu_id: MenuId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ActionResource>,
}

impl MenuAction {
    pub fn new(menu_id: MenuId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            menu_id,
            code: code.into(),
            name: name.into(),
            resources: Vec::new(),
        }
    }
}

impl Keyed for MenuAction {
    type Key = String;

    fn natural_key(&self) -> String {
        self.code.clone()
    }
}

/// 动作对应的接口资源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResource {
    pub id: ResourceId,
    pub action_id: ActionId,
    pub method: String,
    pub path: String,
}

impl ActionResource {
    pub fn new(action_id: ActionId, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(),
            action_id,
            method: method.into(),
            path: path.into(),
        }
    }
}

impl Keyed for ActionResource {
    type Key = (String, String);

    fn natural_key(&self) -> (String, String) {
        (self.method.clone(), self.path.clone())
    }
}

/// 菜单查询条件
#[derive(Debug, Clone, Default)]
pub struct MenuQuery {
    pub ids: Vec<MenuId>,
    pub name: Option<String>,
    pub parent_id: Option<MenuId>,
    /// 匹配 `parent_path` 等于该值或以 `该值/` 开头的节点
    pub prefix_parent_path: Option<String>,
    pub hidden: Option<bool>,
    pub status: Option<Status>,
}

impl MenuQuery {
    pub fn enabled() -> Self {
        Self {
            status: Some(Status::Enabled),
            ..Default::default()
        }
    }

    pub fn by_ids(ids: Vec<MenuId>) -> Self {
        Self {
            ids,
            ..Default::default()
        }
    }

    /// 内存过滤，与 SQL 条件保持一致
    pub fn matches(&self, menu: &Menu) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&menu.id) {
            return false;
        }
        if let Some(name) = &self.name {
            if !menu.name.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(parent_id) = &self.parent_id {
            if menu.parent_id.as_ref() != Some(parent_id) {
                return false;
            }
        }
        if let Some(prefix) = &self.prefix_parent_path {
            if !super::tree::has_path_prefix(&menu.parent_path, prefix) {
                return false;
            }
        }
        if let Some(hidden) = self.hidden {
            if menu.hidden != hidden {
                return false;
            }
        }
        if let Some(status) = self.status {
            if menu.status != status {
                return false;
            }
        }
        true
    }
}
