//! 角色相关命令定义

use serde::Deserialize;

use crate::domain::Status;
use crate::domain::menu::{ActionId, MenuId};

/// 角色对某个菜单动作的授权
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RoleMenuInput {
    pub menu_id: MenuId,
    pub action_id: ActionId,
}

/// 创建 / 更新角色命令
#[derive(Debug, Clone, Deserialize)]
pub struct RoleCommand {
    pub name: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub role_menus: Vec<RoleMenuInput>,
    /// 执行操作的用户 (用于审计)
    #[serde(skip)]
    pub performed_by: String,
}

impl RoleCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remark: String::new(),
            sequence: 0,
            status: Status::Enabled,
            role_menus: Vec::new(),
            performed_by: String::new(),
        }
    }

    pub fn grant(mut self, menu_id: MenuId, action_id: ActionId) -> Self {
        self.role_menus.push(RoleMenuInput { menu_id, action_id });
        self
    }
}
