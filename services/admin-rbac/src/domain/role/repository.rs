//! 角色仓储接口

use async_trait::async_trait;
use backoffice_errors::AppResult;

use super::role::{Role, RoleId, RoleMenu, RoleMenuId, RoleQuery};
use crate::domain::Status;
use crate::domain::menu::{ActionId, MenuId};

/// 角色仓储接口
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role: &Role) -> AppResult<()>;

    async fn update(&self, role: &Role) -> AppResult<()>;

    async fn update_status(&self, id: &RoleId, status: Status) -> AppResult<()>;

    async fn delete(&self, id: &RoleId) -> AppResult<()>;

    async fn find_by_id(&self, id: &RoleId) -> AppResult<Option<Role>>;

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>>;

    async fn find_by_ids(&self, ids: &[RoleId]) -> AppResult<Vec<Role>>;

    /// 按 sequence、id 排序，不含授权
    async fn query(&self, query: &RoleQuery) -> AppResult<Vec<Role>>;
}

/// 角色菜单授权仓储接口
#[async_trait]
pub trait RoleMenuRepository: Send + Sync {
    async fn create(&self, binding: &RoleMenu) -> AppResult<()>;

    async fn delete(&self, id: &RoleMenuId) -> AppResult<()>;

    async fn delete_by_role(&self, role_id: &RoleId) -> AppResult<()>;

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()>;

    async fn delete_by_action(&self, action_id: &ActionId) -> AppResult<()>;

    async fn find_by_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<RoleMenu>>;
}
