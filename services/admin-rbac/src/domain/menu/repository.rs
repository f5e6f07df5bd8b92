//! 菜单仓储接口

use async_trait::async_trait;
use backoffice_errors::AppResult;

use super::menu::{ActionId, ActionResource, Menu, MenuAction, MenuId, MenuQuery, ResourceId};
use crate::domain::Status;

/// 菜单仓储接口
#[async_trait]
pub trait MenuRepository: Send + Sync {
    async fn create(&self, menu: &Menu) -> AppResult<()>;

    /// 更新菜单字段 (含 parent_id / parent_path)
    async fn update(&self, menu: &Menu) -> AppResult<()>;

    async fn update_status(&self, id: &MenuId, status: Status) -> AppResult<()>;

    async fn update_parent_path(&self, id: &MenuId, parent_path: &str) -> AppResult<()>;

    async fn delete(&self, id: &MenuId) -> AppResult<()>;

    async fn find_by_id(&self, id: &MenuId) -> AppResult<Option<Menu>>;

    /// 按 sequence 排序返回
    async fn query(&self, query: &MenuQuery) -> AppResult<Vec<Menu>>;

    /// 同一父节点下的同名菜单
    async fn find_sibling_by_name(
        &self,
        parent_id: Option<&MenuId>,
        name: &str,
    ) -> AppResult<Option<Menu>>;

    async fn count_children(&self, id: &MenuId) -> AppResult<i64>;

    async fn count(&self) -> AppResult<i64>;
}

/// 菜单动作仓储接口
#[async_trait]
pub trait MenuActionRepository: Send + Sync {
    async fn create(&self, action: &MenuAction) -> AppResult<()>;

    async fn update(&self, action: &MenuAction) -> AppResult<()>;

    async fn delete(&self, id: &ActionId) -> AppResult<()>;

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()>;

    async fn find_by_id(&self, id: &ActionId) -> AppResult<Option<MenuAction>>;

    /// 不含资源
    async fn find_by_menus(&self, menu_ids: &[MenuId]) -> AppResult<Vec<MenuAction>>;
}

/// 动作资源仓储接口
#[async_trait]
pub trait ActionResourceRepository: Send + Sync {
    async fn create(&self, resource: &ActionResource) -> AppResult<()>;

    async fn delete(&self, id: &ResourceId) -> AppResult<()>;

    async fn delete_by_action(&self, action_id: &ActionId) -> AppResult<()>;

    /// 删除菜单下所有动作的资源
    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()>;

    async fn find_by_actions(&self, action_ids: &[ActionId]) -> AppResult<Vec<ActionResource>>;
}
