//! 菜单服务
//!
//! 维护菜单树的物化路径，并对比菜单动作与资源的增删改。
//! 所有操作都在调用方传入的 Unit of Work 中执行，不自行提交。

use std::collections::{HashMap, VecDeque};

use backoffice_errors::{AppError, AppResult};
use chrono::Utc;
use tracing::{debug, info};

use super::commands::*;
use crate::domain::Status;
use crate::domain::menu::{
    ActionId, ActionResource, Menu, MenuAction, MenuId, MenuQuery, build_tree, has_path_prefix,
    replace_path_prefix,
};
use crate::domain::reconcile::{Reconciliation, duplicate_keys, reconcile};
use crate::domain::unit_of_work::UnitOfWork;

/// 菜单服务
#[derive(Debug, Clone, Default)]
pub struct MenuService;

impl MenuService {
    pub fn new() -> Self {
        Self
    }

    /// 创建菜单及其动作
    pub async fn create(&self, uow: &dyn UnitOfWork, cmd: MenuCommand) -> AppResult<MenuId> {
        check_actions(&cmd.actions)?;
        self.check_sibling_name(uow, cmd.parent_id.as_ref(), &cmd.name, None)
            .await?;
        let parent_path = self.parent_path_of(uow, cmd.parent_id.as_ref()).await?;

        let mut menu = Menu::new(cmd.name.clone(), cmd.parent_id);
        cmd.apply_to(&mut menu);
        menu.parent_path = parent_path;
        menu.created_by = cmd.performed_by.clone();

        uow.menus().create(&menu).await?;
        let actions = cmd
            .actions
            .into_iter()
            .map(|a| a.into_action(menu.id))
            .collect::<Vec<_>>();
        self.create_actions(uow, &actions).await?;

        info!(
            menu_id = %menu.id,
            name = %menu.name,
            parent_path = %menu.parent_path,
            "Menu created"
        );
        Ok(menu.id)
    }

    /// 递归导入菜单树
    pub async fn create_menus(
        &self,
        uow: &dyn UnitOfWork,
        parent_id: Option<MenuId>,
        seeds: Vec<MenuSeed>,
    ) -> AppResult<usize> {
        let mut pending: VecDeque<(Option<MenuId>, MenuSeed)> =
            seeds.into_iter().map(|s| (parent_id, s)).collect();
        let mut created = 0;

        while let Some((parent, seed)) = pending.pop_front() {
            let (cmd, children) = seed.into_command(parent);
            let id = self.create(uow, cmd).await?;
            created += 1;
            pending.extend(children.into_iter().map(|c| (Some(id), c)));
        }

        info!(created, "Menus imported");
        Ok(created)
    }

    /// 更新菜单字段、父节点与动作
    pub async fn update(
        &self,
        uow: &dyn UnitOfWork,
        id: MenuId,
        cmd: MenuCommand,
    ) -> AppResult<()> {
        if cmd.parent_id == Some(id) {
            return Err(AppError::validation("Menu cannot be its own parent"));
        }
        check_actions(&cmd.actions)?;

        let mut menu = self.find(uow, &id).await?;
        if menu.name != cmd.name || menu.parent_id != cmd.parent_id {
            self.check_sibling_name(uow, cmd.parent_id.as_ref(), &cmd.name, Some(&id))
                .await?;
        }

        if menu.parent_id != cmd.parent_id {
            self.relocate(uow, &mut menu, cmd.parent_id).await?;
        }

        cmd.apply_to(&mut menu);
        menu.updated_at = Utc::now();
        uow.menus().update(&menu).await?;

        self.update_actions(uow, id, cmd.actions).await?;
        Ok(())
    }

    /// 移动节点到新的父节点下，并同步所有后代的路径
    pub async fn reparent(
        &self,
        uow: &dyn UnitOfWork,
        id: MenuId,
        new_parent_id: Option<MenuId>,
    ) -> AppResult<Menu> {
        if new_parent_id == Some(id) {
            return Err(AppError::validation("Menu cannot be its own parent"));
        }

        let mut menu = self.find(uow, &id).await?;
        if menu.parent_id == new_parent_id {
            return Ok(menu);
        }
        self.check_sibling_name(uow, new_parent_id.as_ref(), &menu.name, Some(&id))
            .await?;

        self.relocate(uow, &mut menu, new_parent_id).await?;
        menu.updated_at = Utc::now();
        uow.menus().update(&menu).await?;
        Ok(menu)
    }

    async fn relocate(
        &self,
        uow: &dyn UnitOfWork,
        menu: &mut Menu,
        new_parent_id: Option<MenuId>,
    ) -> AppResult<()> {
        let old_joined = menu.joined_path();

        let new_parent_path = match new_parent_id.as_ref() {
            None => String::new(),
            Some(parent_id) => {
                let parent = uow
                    .menus()
                    .find_by_id(parent_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::not_found(format!("Parent menu {} not found", parent_id))
                    })?;
                if has_path_prefix(&parent.parent_path, &old_joined) {
                    return Err(AppError::validation(
                        "Menu cannot be moved under its own descendant",
                    ));
                }
                parent.joined_path()
            }
        };

        menu.parent_id = new_parent_id;
        menu.parent_path = new_parent_path;
        let new_joined = menu.joined_path();

        let moved = self.propagate_path(uow, &old_joined, &new_joined).await?;
        debug!(menu_id = %menu.id, %old_joined, %new_joined, moved, "Menu relocated");
        Ok(())
    }

    /// 将 `old_joined` 前缀替换为 `new_joined`，返回更新的后代数量
    async fn propagate_path(
        &self,
        uow: &dyn UnitOfWork,
        old_joined: &str,
        new_joined: &str,
    ) -> AppResult<usize> {
        let descendants = uow
            .menus()
            .query(&MenuQuery {
                prefix_parent_path: Some(old_joined.to_string()),
                ..Default::default()
            })
            .await?;

        let mut moved = 0;
        for descendant in descendants {
            if let Some(path) = replace_path_prefix(&descendant.parent_path, old_joined, new_joined)
            {
                uow.menus()
                    .update_parent_path(&descendant.id, &path)
                    .await?;
                moved += 1;
            }
        }
        Ok(moved)
    }

    /// 删除菜单；存在子菜单时拒绝
    pub async fn delete(&self, uow: &dyn UnitOfWork, id: MenuId) -> AppResult<()> {
        self.find(uow, &id).await?;

        let children = uow.menus().count_children(&id).await?;
        if children > 0 {
            return Err(AppError::conflict(format!(
                "Menu {} has {} child menu(s) and cannot be deleted",
                id, children
            )));
        }

        uow.role_menus().delete_by_menu(&id).await?;
        uow.resources().delete_by_menu(&id).await?;
        uow.actions().delete_by_menu(&id).await?;
        uow.menus().delete(&id).await?;

        info!(menu_id = %id, "Menu deleted");
        Ok(())
    }

    pub async fn update_status(
        &self,
        uow: &dyn UnitOfWork,
        id: MenuId,
        status: Status,
    ) -> AppResult<()> {
        self.find(uow, &id).await?;
        uow.menus().update_status(&id, status).await
    }

    /// 获取菜单及其动作、资源
    pub async fn get(&self, uow: &dyn UnitOfWork, id: MenuId) -> AppResult<Menu> {
        let mut menu = self.find(uow, &id).await?;
        menu.actions = self.load_actions(uow, &[id]).await?;
        Ok(menu)
    }

    pub async fn query(
        &self,
        uow: &dyn UnitOfWork,
        query: ListMenusQuery,
    ) -> AppResult<MenuListResult> {
        let mut menus = uow.menus().query(&query.filter).await?;

        if query.include_actions && !menus.is_empty() {
            let ids: Vec<MenuId> = menus.iter().map(|m| m.id).collect();
            let mut by_menu: HashMap<MenuId, Vec<MenuAction>> = HashMap::new();
            for action in self.load_actions(uow, &ids).await? {
                by_menu.entry(action.menu_id).or_default().push(action);
            }
            for menu in &mut menus {
                menu.actions = by_menu.remove(&menu.id).unwrap_or_default();
            }
        }

        if query.tree {
            Ok(MenuListResult::Tree(build_tree(menus)))
        } else {
            Ok(MenuListResult::List(menus))
        }
    }

    /// 对比并同步菜单动作
    ///
    /// 动作以 code 对比，资源以 (method, path) 对比。已存在的动作保留原 ID，
    /// 仅在名称变化时更新；被删除的动作连同其资源和角色授权一起删除。
    pub async fn update_actions(
        &self,
        uow: &dyn UnitOfWork,
        menu_id: MenuId,
        inputs: Vec<ActionInput>,
    ) -> AppResult<Reconciliation<MenuAction>> {
        check_actions(&inputs)?;

        let old = self.load_actions(uow, &[menu_id]).await?;
        let new = inputs
            .into_iter()
            .map(|a| a.into_action(menu_id))
            .collect::<Vec<_>>();
        let diff = reconcile(old, new);

        self.create_actions(uow, &diff.to_add).await?;

        for action in &diff.to_remove {
            uow.role_menus().delete_by_action(&action.id).await?;
            uow.resources().delete_by_action(&action.id).await?;
            uow.actions().delete(&action.id).await?;
        }

        for (old_action, new_action) in &diff.to_update {
            if old_action.name != new_action.name {
                let mut renamed = old_action.clone();
                renamed.name = new_action.name.clone();
                uow.actions().update(&renamed).await?;
            }

            let incoming = new_action
                .resources
                .iter()
                .map(|r| ActionResource::new(old_action.id, r.method.clone(), r.path.clone()))
                .collect();
            let resources = reconcile(old_action.resources.clone(), incoming);
            for resource in &resources.to_add {
                uow.resources().create(resource).await?;
            }
            for resource in &resources.to_remove {
                uow.resources().delete(&resource.id).await?;
            }
        }

        debug!(
            menu_id = %menu_id,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            kept = diff.to_update.len(),
            "Menu actions reconciled"
        );
        Ok(diff)
    }

    async fn create_actions(&self, uow: &dyn UnitOfWork, actions: &[MenuAction]) -> AppResult<()> {
        for action in actions {
            uow.actions().create(action).await?;
            for resource in &action.resources {
                uow.resources().create(resource).await?;
            }
        }
        Ok(())
    }

    /// 加载菜单的动作并填充资源
    pub(crate) async fn load_actions(
        &self,
        uow: &dyn UnitOfWork,
        menu_ids: &[MenuId],
    ) -> AppResult<Vec<MenuAction>> {
        let mut actions = uow.actions().find_by_menus(menu_ids).await?;
        if actions.is_empty() {
            return Ok(actions);
        }

        let action_ids: Vec<ActionId> = actions.iter().map(|a| a.id).collect();
        let mut by_action: HashMap<ActionId, Vec<ActionResource>> = HashMap::new();
        for resource in uow.resources().find_by_actions(&action_ids).await? {
            by_action.entry(resource.action_id).or_default().push(resource);
        }
        for action in &mut actions {
            action.resources = by_action.remove(&action.id).unwrap_or_default();
        }
        Ok(actions)
    }

    async fn find(&self, uow: &dyn UnitOfWork, id: &MenuId) -> AppResult<Menu> {
        uow.menus()
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Menu {} not found", id)))
    }

    async fn parent_path_of(
        &self,
        uow: &dyn UnitOfWork,
        parent_id: Option<&MenuId>,
    ) -> AppResult<String> {
        let Some(parent_id) = parent_id else {
            return Ok(String::new());
        };
        let parent = uow
            .menus()
            .find_by_id(parent_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Parent menu {} not found", parent_id)))?;
        Ok(parent.joined_path())
    }

    async fn check_sibling_name(
        &self,
        uow: &dyn UnitOfWork,
        parent_id: Option<&MenuId>,
        name: &str,
        exclude: Option<&MenuId>,
    ) -> AppResult<()> {
        match uow.menus().find_sibling_by_name(parent_id, name).await? {
            Some(existing) if Some(&existing.id) != exclude => Err(AppError::validation(format!(
                "Menu '{}' already exists under the same parent",
                name
            ))),
            _ => Ok(()),
        }
    }
}

/// 同一菜单中动作 code 不能重复，同一动作中资源不能重复
fn check_actions(actions: &[ActionInput]) -> AppResult<()> {
    let codes = actions
        .iter()
        .map(|a| MenuAction::new(MenuId::default(), a.code.clone(), a.name.clone()))
        .collect::<Vec<_>>();
    if let Some(code) = duplicate_keys(&codes).into_iter().next() {
        return Err(AppError::validation(format!(
            "Duplicate action code '{}'",
            code
        )));
    }

    for action in actions {
        let resources = action
            .resources
            .iter()
            .map(|r| ActionResource::new(ActionId::default(), r.method.clone(), r.path.clone()))
            .collect::<Vec<_>>();
        if let Some((method, path)) = duplicate_keys(&resources).into_iter().next() {
            return Err(AppError::validation(format!(
                "Duplicate resource {} {} in action '{}'",
                method, path, action.code
            )));
        }
    }
    Ok(())
}
