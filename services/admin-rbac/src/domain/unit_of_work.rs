//! Unit of Work 模式
//!
//! 一个请求内的所有仓储共享同一个事务，由事务作用域统一提交或回滚。

use async_trait::async_trait;
use backoffice_errors::AppResult;

use crate::domain::menu::{ActionResourceRepository, MenuActionRepository, MenuRepository};
use crate::domain::role::{RoleMenuRepository, RoleRepository};
use crate::domain::user::{UserRepository, UserRoleRepository};

/// Unit of Work trait
///
/// `commit` / `rollback` 消耗内部事务，之后仓储调用返回错误。
/// 未提交即被丢弃的 Unit of Work 视为回滚。
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    fn menus(&self) -> &dyn MenuRepository;

    fn actions(&self) -> &dyn MenuActionRepository;

    fn resources(&self) -> &dyn ActionResourceRepository;

    fn roles(&self) -> &dyn RoleRepository;

    fn role_menus(&self) -> &dyn RoleMenuRepository;

    fn users(&self) -> &dyn UserRepository;

    fn user_roles(&self) -> &dyn UserRoleRepository;

    /// 提交事务
    async fn commit(&self) -> AppResult<()>;

    /// 回滚事务
    async fn rollback(&self) -> AppResult<()>;
}

/// Unit of Work 工厂 trait
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    /// 开始新的事务
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}
