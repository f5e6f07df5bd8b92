//! 用户仓储接口

use async_trait::async_trait;
use backoffice_errors::AppResult;

use super::user::{User, UserId, UserQuery, UserRole, UserRoleId};
use crate::domain::Status;
use crate::domain::role::RoleId;

/// 用户仓储接口
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> AppResult<()>;

    /// 更新资料；`password` 为 None 时保留原密码
    async fn update(&self, user: &User) -> AppResult<()>;

    async fn update_status(&self, id: &UserId, status: Status) -> AppResult<()>;

    async fn delete(&self, id: &UserId) -> AppResult<()>;

    async fn find_by_id(&self, id: &UserId) -> AppResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    /// 按创建时间排序，不含密码与角色绑定
    async fn query(&self, query: &UserQuery) -> AppResult<Vec<User>>;
}

/// 用户角色仓储接口
#[async_trait]
pub trait UserRoleRepository: Send + Sync {
    async fn create(&self, binding: &UserRole) -> AppResult<()>;

    async fn delete(&self, id: &UserRoleId) -> AppResult<()>;

    async fn delete_by_user(&self, user_id: &UserId) -> AppResult<()>;

    async fn find_by_user(&self, user_id: &UserId) -> AppResult<Vec<UserRole>>;

    async fn find_by_users(&self, user_ids: &[UserId]) -> AppResult<Vec<UserRole>>;

    async fn exists_by_role(&self, role_id: &RoleId) -> AppResult<bool>;
}
