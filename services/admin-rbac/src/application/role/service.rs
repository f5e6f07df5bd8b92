//! 角色服务

use backoffice_errors::{AppError, AppResult};
use chrono::Utc;
use tracing::{debug, info};

use super::commands::*;
use crate::domain::Status;
use crate::domain::reconcile::{KeyedMap, reconcile};
use crate::domain::role::{Role, RoleId, RoleMenu, RoleQuery};
use crate::domain::unit_of_work::UnitOfWork;

/// 角色服务
#[derive(Debug, Clone, Default)]
pub struct RoleService;

impl RoleService {
    pub fn new() -> Self {
        Self
    }

    pub async fn create(&self, uow: &dyn UnitOfWork, cmd: RoleCommand) -> AppResult<RoleId> {
        self.check_name(uow, &cmd.name).await?;
        self.check_role_menus(uow, &cmd.role_menus).await?;

        let mut role = Role::new(cmd.name.clone());
        role.remark = cmd.remark;
        role.sequence = cmd.sequence;
        role.status = cmd.status;
        role.created_by = cmd.performed_by;

        uow.roles().create(&role).await?;
        for binding in bindings_of(role.id, &cmd.role_menus) {
            uow.role_menus().create(&binding).await?;
        }

        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role.id)
    }

    /// 更新角色并同步菜单授权
    pub async fn update(
        &self,
        uow: &dyn UnitOfWork,
        id: RoleId,
        cmd: RoleCommand,
    ) -> AppResult<()> {
        let mut role = self.get(uow, id).await?;
        if role.name != cmd.name {
            self.check_name(uow, &cmd.name).await?;
        }
        self.check_role_menus(uow, &cmd.role_menus).await?;

        let old = std::mem::take(&mut role.role_menus);
        role.name = cmd.name;
        role.remark = cmd.remark;
        role.sequence = cmd.sequence;
        role.status = cmd.status;
        role.updated_at = Utc::now();
        uow.roles().update(&role).await?;

        let diff = reconcile(old, bindings_of(id, &cmd.role_menus));
        for binding in &diff.to_add {
            uow.role_menus().create(binding).await?;
        }
        for binding in &diff.to_remove {
            uow.role_menus().delete(&binding.id).await?;
        }

        debug!(
            role_id = %id,
            granted = diff.to_add.len(),
            revoked = diff.to_remove.len(),
            "Role menus reconciled"
        );
        Ok(())
    }

    /// 删除角色；仍有用户持有时拒绝
    pub async fn delete(&self, uow: &dyn UnitOfWork, id: RoleId) -> AppResult<()> {
        self.find(uow, &id).await?;

        if uow.user_roles().exists_by_role(&id).await? {
            return Err(AppError::conflict(format!(
                "Role {} is still assigned to users",
                id
            )));
        }

        uow.role_menus().delete_by_role(&id).await?;
        uow.roles().delete(&id).await?;

        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    pub async fn update_status(
        &self,
        uow: &dyn UnitOfWork,
        id: RoleId,
        status: Status,
    ) -> AppResult<()> {
        self.find(uow, &id).await?;
        uow.roles().update_status(&id, status).await
    }

    /// 获取角色及其菜单授权
    pub async fn get(&self, uow: &dyn UnitOfWork, id: RoleId) -> AppResult<Role> {
        let mut role = self.find(uow, &id).await?;
        role.role_menus = uow.role_menus().find_by_roles(&[id]).await?;
        Ok(role)
    }

    /// 按条件列出角色，不含菜单授权
    pub async fn query(&self, uow: &dyn UnitOfWork, query: &RoleQuery) -> AppResult<Vec<Role>> {
        uow.roles().query(query).await
    }

    async fn find(&self, uow: &dyn UnitOfWork, id: &RoleId) -> AppResult<Role> {
        uow.roles()
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Role {} not found", id)))
    }

    async fn check_name(&self, uow: &dyn UnitOfWork, name: &str) -> AppResult<()> {
        if uow.roles().find_by_name(name).await?.is_some() {
            return Err(AppError::validation(format!(
                "Role '{}' already exists",
                name
            )));
        }
        Ok(())
    }

    /// 授权的菜单与动作必须存在，且动作属于该菜单
    async fn check_role_menus(
        &self,
        uow: &dyn UnitOfWork,
        inputs: &[RoleMenuInput],
    ) -> AppResult<()> {
        for input in inputs {
            if uow.menus().find_by_id(&input.menu_id).await?.is_none() {
                return Err(AppError::not_found(format!(
                    "Menu {} not found",
                    input.menu_id
                )));
            }
            match uow.actions().find_by_id(&input.action_id).await? {
                None => {
                    return Err(AppError::not_found(format!(
                        "Menu action {} not found",
                        input.action_id
                    )));
                }
                Some(action) if action.menu_id != input.menu_id => {
                    return Err(AppError::validation(format!(
                        "Action {} does not belong to menu {}",
                        input.action_id, input.menu_id
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// 重复的 (menu, action) 只保留一条
fn bindings_of(role_id: RoleId, inputs: &[RoleMenuInput]) -> Vec<RoleMenu> {
    KeyedMap::build(
        inputs
            .iter()
            .map(|i| RoleMenu::new(role_id, i.menu_id, i.action_id)),
    )
    .into_ordered()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::menu::{ActionId, MenuId};

    #[test]
    fn test_duplicate_bindings_collapse() {
        let role_id = RoleId::new();
        let (menu, action) = (MenuId::new(), ActionId::new());
        let inputs = vec![
            RoleMenuInput { menu_id: menu, action_id: action },
            RoleMenuInput { menu_id: menu, action_id: action },
        ];
        let bindings = bindings_of(role_id, &inputs);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].role_id, role_id);
    }
}
