//! 事务内仓储
//!
//! 所有仓储共享同一个事务，不直接使用连接池。

use std::sync::Arc;

use async_trait::async_trait;
use backoffice_adapter_postgres::map_sqlx_error;
use backoffice_errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder, Transaction};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Status;
use crate::domain::menu::{
    ActionId, ActionResource, ActionResourceRepository, Menu, MenuAction, MenuActionRepository,
    MenuId, MenuQuery, MenuRepository, ResourceId,
};
use crate::domain::role::{
    Role, RoleId, RoleMenu, RoleMenuId, RoleMenuRepository, RoleQuery, RoleRepository,
};
use crate::domain::user::{
    HashedPassword, User, UserId, UserQuery, UserRepository, UserRole, UserRoleId,
    UserRoleRepository,
};

/// 共享事务
pub type SharedTx = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

macro_rules! define_tx_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedTx,
        }

        impl $name {
            pub fn new(tx: SharedTx) -> Self {
                Self { tx }
            }
        }
    };
}

define_tx_repo!(TxMenuRepository);
define_tx_repo!(TxMenuActionRepository);
define_tx_repo!(TxActionResourceRepository);
define_tx_repo!(TxRoleRepository);
define_tx_repo!(TxRoleMenuRepository);
define_tx_repo!(TxUserRepository);
define_tx_repo!(TxUserRoleRepository);

/// 取出进行中的事务连接，提交或回滚之后再访问返回错误
fn active<'a>(slot: &'a mut Option<Transaction<'static, Postgres>>) -> AppResult<&'a mut PgConnection> {
    slot.as_deref_mut()
        .ok_or_else(|| AppError::internal("Transaction already finished"))
}

const MENU_COLUMNS: &str = "id, name, sequence, icon, router, component, parent_id, parent_path, \
     hidden, status, remark, created_by, created_at, updated_at";

#[async_trait]
impl MenuRepository for TxMenuRepository {
    async fn create(&self, menu: &Menu) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            r#"
            INSERT INTO menus (id, name, sequence, icon, router, component, parent_id, parent_path,
                               hidden, status, remark, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(menu.id.0)
        .bind(&menu.name)
        .bind(menu.sequence)
        .bind(&menu.icon)
        .bind(&menu.router)
        .bind(&menu.component)
        .bind(menu.parent_id.map(|p| p.0))
        .bind(&menu.parent_path)
        .bind(menu.hidden)
        .bind(menu.status.as_i16())
        .bind(&menu.remark)
        .bind(&menu.created_by)
        .bind(menu.created_at)
        .bind(menu.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, menu: &Menu) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            r#"
            UPDATE menus
            SET name = $2, sequence = $3, icon = $4, router = $5, component = $6, parent_id = $7,
                parent_path = $8, hidden = $9, status = $10, remark = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(menu.id.0)
        .bind(&menu.name)
        .bind(menu.sequence)
        .bind(&menu.icon)
        .bind(&menu.router)
        .bind(&menu.component)
        .bind(menu.parent_id.map(|p| p.0))
        .bind(&menu.parent_path)
        .bind(menu.hidden)
        .bind(menu.status.as_i16())
        .bind(&menu.remark)
        .bind(menu.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_status(&self, id: &MenuId, status: Status) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("UPDATE menus SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(status.as_i16())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_parent_path(&self, id: &MenuId, parent_path: &str) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("UPDATE menus SET parent_path = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(parent_path)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &MenuId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM menus WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &MenuId) -> AppResult<Option<Menu>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, MenuRow>(&format!(
            "SELECT {} FROM menus WHERE id = $1",
            MENU_COLUMNS
        ))
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Menu::from))
    }

    async fn query(&self, query: &MenuQuery) -> AppResult<Vec<Menu>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let mut builder = menu_query(query);

        let rows = builder
            .build_query_as::<MenuRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Menu::from).collect())
    }

    async fn find_sibling_by_name(
        &self,
        parent_id: Option<&MenuId>,
        name: &str,
    ) -> AppResult<Option<Menu>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, MenuRow>(&format!(
            "SELECT {} FROM menus WHERE parent_id IS NOT DISTINCT FROM $1 AND name = $2 LIMIT 1",
            MENU_COLUMNS
        ))
        .bind(parent_id.map(|p| p.0))
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Menu::from))
    }

    async fn count_children(&self, id: &MenuId) -> AppResult<i64> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menus WHERE parent_id = $1")
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }

    async fn count(&self) -> AppResult<i64> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menus")
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(count)
    }
}

#[async_trait]
impl MenuActionRepository for TxMenuActionRepository {
    async fn create(&self, action: &MenuAction) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("INSERT INTO menu_actions (id, menu_id, code, name) VALUES ($1, $2, $3, $4)")
            .bind(action.id.0)
            .bind(action.menu_id.0)
            .bind(&action.code)
            .bind(&action.name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, action: &MenuAction) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("UPDATE menu_actions SET code = $2, name = $3 WHERE id = $1")
            .bind(action.id.0)
            .bind(&action.code)
            .bind(&action.name)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &ActionId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM menu_actions WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM menu_actions WHERE menu_id = $1")
            .bind(menu_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ActionId) -> AppResult<Option<MenuAction>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, MenuActionRow>(
            "SELECT id, menu_id, code, name FROM menu_actions WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(MenuAction::from))
    }

    async fn find_by_menus(&self, menu_ids: &[MenuId]) -> AppResult<Vec<MenuAction>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let ids: Vec<Uuid> = menu_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, MenuActionRow>(
            "SELECT id, menu_id, code, name FROM menu_actions WHERE menu_id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(MenuAction::from).collect())
    }
}

#[async_trait]
impl ActionResourceRepository for TxActionResourceRepository {
    async fn create(&self, resource: &ActionResource) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            "INSERT INTO action_resources (id, action_id, method, path) VALUES ($1, $2, $3, $4)",
        )
        .bind(resource.id.0)
        .bind(resource.action_id.0)
        .bind(&resource.method)
        .bind(&resource.path)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM action_resources WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_action(&self, action_id: &ActionId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM action_resources WHERE action_id = $1")
            .bind(action_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            r#"
            DELETE FROM action_resources
            WHERE action_id IN (SELECT id FROM menu_actions WHERE menu_id = $1)
            "#,
        )
        .bind(menu_id.0)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_actions(&self, action_ids: &[ActionId]) -> AppResult<Vec<ActionResource>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let ids: Vec<Uuid> = action_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, ActionResourceRow>(
            r#"
            SELECT id, action_id, method, path FROM action_resources
            WHERE action_id = ANY($1) ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ActionResource::from).collect())
    }
}

#[async_trait]
impl RoleRepository for TxRoleRepository {
    async fn create(&self, role: &Role) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, remark, sequence, status,
                               created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(role.id.0)
        .bind(&role.name)
        .bind(&role.remark)
        .bind(role.sequence)
        .bind(role.status.as_i16())
        .bind(&role.created_by)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, role: &Role) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            r#"
            UPDATE roles
            SET name = $2, remark = $3, sequence = $4, status = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(role.id.0)
        .bind(&role.name)
        .bind(&role.remark)
        .bind(role.sequence)
        .bind(role.status.as_i16())
        .bind(role.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_status(&self, id: &RoleId, status: Status) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("UPDATE roles SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(status.as_i16())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &RoleId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &RoleId) -> AppResult<Option<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, remark, sequence, status, created_by, created_at, updated_at
            FROM roles WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Role::from))
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, remark, sequence, status, created_by, created_at, updated_at
            FROM roles WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Role::from))
    }

    async fn find_by_ids(&self, ids: &[RoleId]) -> AppResult<Vec<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, remark, sequence, status, created_by, created_at, updated_at
            FROM roles WHERE id = ANY($1)
            ORDER BY sequence, id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Role::from).collect())
    }

    async fn query(&self, query: &RoleQuery) -> AppResult<Vec<Role>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let rows = role_query(query)
            .build_query_as::<RoleRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Role::from).collect())
    }
}

#[async_trait]
impl RoleMenuRepository for TxRoleMenuRepository {
    async fn create(&self, binding: &RoleMenu) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            "INSERT INTO role_menus (id, role_id, menu_id, action_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(binding.id.0)
        .bind(binding.role_id.0)
        .bind(binding.menu_id.0)
        .bind(binding.action_id.0)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &RoleMenuId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM role_menus WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_role(&self, role_id: &RoleId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM role_menus WHERE role_id = $1")
            .bind(role_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM role_menus WHERE menu_id = $1")
            .bind(menu_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_action(&self, action_id: &ActionId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM role_menus WHERE action_id = $1")
            .bind(action_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<RoleMenu>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let ids: Vec<Uuid> = role_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, RoleMenuRow>(
            r#"
            SELECT id, role_id, menu_id, action_id
            FROM role_menus
            WHERE role_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RoleMenu::from).collect())
    }
}

#[async_trait]
impl UserRepository for TxUserRepository {
    async fn create(&self, user: &User) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, real_name, password_hash, email, phone, status,
                               created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.real_name)
        .bind(user.password.as_ref().map(|p| p.as_str()))
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.status.as_i16())
        .bind(&user.created_by)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        // 未提供新密码时保留原值
        sqlx::query(
            r#"
            UPDATE users
            SET username = $2, real_name = $3, password_hash = COALESCE($4, password_hash),
                email = $5, phone = $6, status = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(&user.real_name)
        .bind(user.password.as_ref().map(|p| p.as_str()))
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.status.as_i16())
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_status(&self, id: &UserId, status: Status) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("UPDATE users SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(status.as_i16())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &UserId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &UserId) -> AppResult<Option<User>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, real_name, password_hash, email, phone, status,
                   created_by, created_at, updated_at
            FROM users WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(User::from))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, real_name, password_hash, email, phone, status,
                   created_by, created_at, updated_at
            FROM users WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(User::from))
    }

    async fn query(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let rows = user_query(query)
            .build_query_as::<UserRow>()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl UserRoleRepository for TxUserRoleRepository {
    async fn create(&self, binding: &UserRole) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("INSERT INTO user_roles (id, user_id, role_id) VALUES ($1, $2, $3)")
            .bind(binding.id.0)
            .bind(binding.user_id.0)
            .bind(binding.role_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, id: &UserRoleId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM user_roles WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_by_user(&self, user_id: &UserId) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id.0)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_user(&self, user_id: &UserId) -> AppResult<Vec<UserRole>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let rows = sqlx::query_as::<_, UserRoleRow>(
            "SELECT id, user_id, role_id FROM user_roles WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id.0)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(UserRole::from).collect())
    }

    async fn find_by_users(&self, user_ids: &[UserId]) -> AppResult<Vec<UserRole>> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let ids: Vec<Uuid> = user_ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query_as::<_, UserRoleRow>(
            "SELECT id, user_id, role_id FROM user_roles WHERE user_id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(UserRole::from).collect())
    }

    async fn exists_by_role(&self, role_id: &RoleId) -> AppResult<bool> {
        let mut guard = self.tx.lock().await;
        let tx = active(&mut guard)?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM user_roles WHERE role_id = $1)")
                .bind(role_id.0)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(exists)
    }
}

/// 组装菜单查询；名称与路径前缀按字面匹配，不解释 `%` `_`
fn menu_query(query: &MenuQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("SELECT {} FROM menus WHERE 1 = 1", MENU_COLUMNS));

    if !query.ids.is_empty() {
        let ids: Vec<Uuid> = query.ids.iter().map(|id| id.0).collect();
        builder.push(" AND id = ANY(");
        builder.push_bind(ids);
        builder.push(")");
    }
    if let Some(name) = &query.name {
        builder.push(" AND strpos(name, ");
        builder.push_bind(name.clone());
        builder.push(") > 0");
    }
    if let Some(parent_id) = &query.parent_id {
        builder.push(" AND parent_id = ");
        builder.push_bind(parent_id.0);
    }
    if let Some(prefix) = &query.prefix_parent_path {
        builder.push(" AND (parent_path = ");
        builder.push_bind(prefix.clone());
        builder.push(" OR starts_with(parent_path, ");
        builder.push_bind(format!("{}/", prefix));
        builder.push("))");
    }
    if let Some(hidden) = query.hidden {
        builder.push(" AND hidden = ");
        builder.push_bind(hidden);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_i16());
    }
    builder.push(" ORDER BY sequence, id");
    builder
}

fn role_query(query: &RoleQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, name, remark, sequence, status, created_by, created_at, updated_at \
         FROM roles WHERE 1 = 1",
    );

    if !query.ids.is_empty() {
        let ids: Vec<Uuid> = query.ids.iter().map(|id| id.0).collect();
        builder.push(" AND id = ANY(");
        builder.push_bind(ids);
        builder.push(")");
    }
    if let Some(name) = &query.name {
        builder.push(" AND name = ");
        builder.push_bind(name.clone());
    }
    if let Some(keyword) = &query.keyword {
        builder.push(" AND (strpos(name, ");
        builder.push_bind(keyword.clone());
        builder.push(") > 0 OR strpos(remark, ");
        builder.push_bind(keyword.clone());
        builder.push(") > 0)");
    }
    if let Some(user_id) = &query.user_id {
        builder.push(" AND id IN (SELECT role_id FROM user_roles WHERE user_id = ");
        builder.push_bind(user_id.0);
        builder.push(")");
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_i16());
    }
    builder.push(" ORDER BY sequence, id");
    builder
}

/// 密码列固定返回 NULL
fn user_query(query: &UserQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, username, real_name, NULL::VARCHAR AS password_hash, email, phone, status, \
         created_by, created_at, updated_at FROM users WHERE 1 = 1",
    );

    if let Some(username) = &query.username {
        builder.push(" AND username = ");
        builder.push_bind(username.clone());
    }
    if let Some(real_name) = &query.real_name {
        builder.push(" AND real_name = ");
        builder.push_bind(real_name.clone());
    }
    if let Some(keyword) = &query.keyword {
        let mut columns = ["username", "real_name", "phone", "email"].into_iter().peekable();
        builder.push(" AND (");
        while let Some(column) = columns.next() {
            builder.push(format!("strpos({column}, "));
            builder.push_bind(keyword.clone());
            builder.push(") > 0");
            if columns.peek().is_some() {
                builder.push(" OR ");
            }
        }
        builder.push(")");
    }
    if !query.role_ids.is_empty() {
        let ids: Vec<Uuid> = query.role_ids.iter().map(|id| id.0).collect();
        builder.push(" AND id IN (SELECT user_id FROM user_roles WHERE role_id = ANY(");
        builder.push_bind(ids);
        builder.push("))");
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_i16());
    }
    builder.push(" ORDER BY created_at, id");
    builder
}

// ============ 行映射 ============

#[derive(sqlx::FromRow)]
struct MenuRow {
    id: Uuid,
    name: String,
    sequence: i32,
    icon: String,
    router: String,
    component: String,
    parent_id: Option<Uuid>,
    parent_path: String,
    hidden: bool,
    status: i16,
    remark: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MenuRow> for Menu {
    fn from(row: MenuRow) -> Self {
        Self {
            id: MenuId(row.id),
            name: row.name,
            sequence: row.sequence,
            icon: row.icon,
            router: row.router,
            component: row.component,
            parent_id: row.parent_id.map(MenuId),
            parent_path: row.parent_path,
            hidden: row.hidden,
            status: Status::from_i16(row.status),
            remark: row.remark,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            actions: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MenuActionRow {
    id: Uuid,
    menu_id: Uuid,
    code: String,
    name: String,
}

impl From<MenuActionRow> for MenuAction {
    fn from(row: MenuActionRow) -> Self {
        Self {
            id: ActionId(row.id),
            menu_id: MenuId(row.menu_id),
            code: row.code,
            name: row.name,
            resources: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ActionResourceRow {
    id: Uuid,
    action_id: Uuid,
    method: String,
    path: String,
}

impl From<ActionResourceRow> for ActionResource {
    fn from(row: ActionResourceRow) -> Self {
        Self {
            id: ResourceId(row.id),
            action_id: ActionId(row.action_id),
            method: row.method,
            path: row.path,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    remark: String,
    sequence: i32,
    status: i16,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: RoleId(row.id),
            name: row.name,
            remark: row.remark,
            sequence: row.sequence,
            status: Status::from_i16(row.status),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            role_menus: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleMenuRow {
    id: Uuid,
    role_id: Uuid,
    menu_id: Uuid,
    action_id: Uuid,
}

impl From<RoleMenuRow> for RoleMenu {
    fn from(row: RoleMenuRow) -> Self {
        Self {
            id: RoleMenuId(row.id),
            role_id: RoleId(row.role_id),
            menu_id: MenuId(row.menu_id),
            action_id: ActionId(row.action_id),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    real_name: String,
    password_hash: Option<String>,
    email: String,
    phone: String,
    status: i16,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            username: row.username,
            real_name: row.real_name,
            password: row.password_hash.map(HashedPassword::from_hash),
            email: row.email,
            phone: row.phone,
            status: Status::from_i16(row.status),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            user_roles: Vec::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRoleRow {
    id: Uuid,
    user_id: Uuid,
    role_id: Uuid,
}

impl From<UserRoleRow> for UserRole {
    fn from(row: UserRoleRow) -> Self {
        Self {
            id: UserRoleId(row.id),
            user_id: UserId(row.user_id),
            role_id: RoleId(row.role_id),
        }
    }
}
