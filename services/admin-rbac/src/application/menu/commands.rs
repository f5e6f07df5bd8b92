//! 菜单相关命令定义

use serde::Deserialize;

use crate::domain::Status;
use crate::domain::menu::{
    ActionResource, Menu, MenuAction, MenuId, MenuQuery, MenuTree,
};

/// 接口资源
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceInput {
    pub method: String,
    pub path: String,
}

/// 菜单动作及其资源
#[derive(Debug, Clone, Deserialize)]
pub struct ActionInput {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ResourceInput>,
}

impl ActionInput {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.resources.push(ResourceInput {
            method: method.into(),
            path: path.into(),
        });
        self
    }

    /// 转换为动作实体，分配新的 ID
    pub fn into_action(self, menu_id: MenuId) -> MenuAction {
        let mut action = MenuAction::new(menu_id, self.code, self.name);
        action.resources = self
            .resources
            .into_iter()
            .map(|r| ActionResource::new(action.id, r.method, r.path))
            .collect();
        action
    }
}

/// 创建 / 更新菜单命令
#[derive(Debug, Clone, Deserialize)]
pub struct MenuCommand {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub component: String,
    pub parent_id: Option<MenuId>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub actions: Vec<ActionInput>,
    /// 执行操作的用户 (用于审计)
    #[serde(skip)]
    pub performed_by: String,
}

impl MenuCommand {
    pub fn new(name: impl Into<String>, parent_id: Option<MenuId>) -> Self {
        Self {
            name: name.into(),
            sequence: 0,
            icon: String::new(),
            router: String::new(),
            component: String::new(),
            parent_id,
            hidden: false,
            status: Status::Enabled,
            remark: String::new(),
            actions: Vec::new(),
            performed_by: String::new(),
        }
    }

    pub fn with_action(mut self, action: ActionInput) -> Self {
        self.actions.push(action);
        self
    }

    /// 把命令中的字段写入实体，不修改 id / 路径 / 创建信息
    pub(crate) fn apply_to(&self, menu: &mut Menu) {
        menu.name = self.name.clone();
        menu.sequence = self.sequence;
        menu.icon = self.icon.clone();
        menu.router = self.router.clone();
        menu.component = self.component.clone();
        menu.hidden = self.hidden;
        menu.status = self.status;
        menu.remark = self.remark.clone();
    }
}

/// 菜单初始化数据 (递归)
#[derive(Debug, Clone, Deserialize)]
pub struct MenuSeed {
    pub name: String,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub router: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub actions: Vec<ActionInput>,
    #[serde(default)]
    pub children: Vec<MenuSeed>,
}

impl MenuSeed {
    pub(crate) fn into_command(self, parent_id: Option<MenuId>) -> (MenuCommand, Vec<MenuSeed>) {
        let command = MenuCommand {
            name: self.name,
            sequence: self.sequence,
            icon: self.icon,
            router: self.router,
            component: self.component,
            parent_id,
            hidden: self.hidden,
            status: Status::Enabled,
            remark: String::new(),
            actions: self.actions,
            performed_by: "system".to_string(),
        };
        (command, self.children)
    }
}

/// 菜单列表查询
#[derive(Debug, Clone, Default)]
pub struct ListMenusQuery {
    pub filter: MenuQuery,
    pub include_actions: bool,
    /// 以树形返回
    pub tree: bool,
}

/// 菜单列表结果
#[derive(Debug, Clone)]
pub enum MenuListResult {
    List(Vec<Menu>),
    Tree(Vec<MenuTree>),
}
