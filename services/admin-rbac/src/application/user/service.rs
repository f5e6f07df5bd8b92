//! 用户服务

use std::collections::{HashMap, HashSet};

use backoffice_errors::{AppError, AppResult};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::commands::*;
use crate::domain::Status;
use crate::domain::menu::{MenuId, MenuQuery, MenuTree, build_tree, missing_ancestor_ids};
use crate::domain::reconcile::{KeyedMap, reconcile};
use crate::domain::role::RoleId;
use crate::domain::unit_of_work::UnitOfWork;
use crate::domain::user::{HashedPassword, User, UserId, UserQuery, UserRole, plain_matches};

/// 用户服务
#[derive(Debug, Clone)]
pub struct UserService {
    super_admin: SuperAdmin,
}

impl UserService {
    pub fn new(super_admin: SuperAdmin) -> Self {
        Self { super_admin }
    }

    pub fn is_super_admin(&self, subject: &str) -> bool {
        subject == self.super_admin.username
    }

    pub async fn create(&self, uow: &dyn UnitOfWork, cmd: CreateUserCommand) -> AppResult<UserId> {
        self.check_username(uow, &cmd.username).await?;
        self.check_roles(uow, &cmd.role_ids).await?;

        let mut user = User::new(cmd.username, cmd.real_name);
        user.password = Some(hash_password(cmd.password.expose_secret())?);
        user.email = cmd.email;
        user.phone = cmd.phone;
        user.status = cmd.status;
        user.created_by = cmd.performed_by;

        uow.users().create(&user).await?;
        for binding in bindings_of(user.id, &cmd.role_ids) {
            uow.user_roles().create(&binding).await?;
        }

        info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user.id)
    }

    /// 更新用户资料并同步角色
    pub async fn update(
        &self,
        uow: &dyn UnitOfWork,
        id: UserId,
        cmd: UpdateUserCommand,
    ) -> AppResult<()> {
        let mut user = self.get(uow, id).await?;
        if user.username != cmd.username {
            self.check_username(uow, &cmd.username).await?;
        }
        self.check_roles(uow, &cmd.role_ids).await?;

        let old = std::mem::take(&mut user.user_roles);
        user.username = cmd.username;
        user.real_name = cmd.real_name;
        user.email = cmd.email;
        user.phone = cmd.phone;
        user.status = cmd.status;
        user.password = match cmd.password.as_ref().map(|p| p.expose_secret()) {
            Some(plain) if !plain.is_empty() => Some(hash_password(plain)?),
            _ => None,
        };
        user.updated_at = Utc::now();
        uow.users().update(&user).await?;

        let diff = reconcile(old, bindings_of(id, &cmd.role_ids));
        for binding in &diff.to_add {
            uow.user_roles().create(binding).await?;
        }
        for binding in &diff.to_remove {
            uow.user_roles().delete(&binding.id).await?;
        }

        debug!(
            user_id = %id,
            granted = diff.to_add.len(),
            revoked = diff.to_remove.len(),
            "User roles reconciled"
        );
        Ok(())
    }

    pub async fn delete(&self, uow: &dyn UnitOfWork, id: UserId) -> AppResult<()> {
        self.find(uow, &id).await?;
        uow.user_roles().delete_by_user(&id).await?;
        uow.users().delete(&id).await?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    pub async fn update_status(
        &self,
        uow: &dyn UnitOfWork,
        id: UserId,
        status: Status,
    ) -> AppResult<()> {
        self.find(uow, &id).await?;
        uow.users().update_status(&id, status).await
    }

    /// 获取用户及其角色绑定
    pub async fn get(&self, uow: &dyn UnitOfWork, id: UserId) -> AppResult<User> {
        let mut user = self.find(uow, &id).await?;
        user.user_roles = uow.user_roles().find_by_user(&id).await?;
        Ok(user)
    }

    /// 按条件列出用户并附带角色绑定，不返回密码
    pub async fn query(&self, uow: &dyn UnitOfWork, query: &UserQuery) -> AppResult<Vec<User>> {
        let mut users = uow.users().query(query).await?;
        if users.is_empty() {
            return Ok(users);
        }

        let ids: Vec<UserId> = users.iter().map(|u| u.id).collect();
        let mut by_user: HashMap<UserId, Vec<UserRole>> = HashMap::new();
        for binding in uow.user_roles().find_by_users(&ids).await? {
            by_user.entry(binding.user_id).or_default().push(binding);
        }
        for user in &mut users {
            user.user_roles = by_user.remove(&user.id).unwrap_or_default();
        }
        Ok(users)
    }

    /// 校验用户名与密码
    pub async fn verify(
        &self,
        uow: &dyn UnitOfWork,
        username: &str,
        password: &str,
    ) -> AppResult<UserInfo> {
        if self.is_super_admin(username) {
            if plain_matches(password, self.super_admin.password.expose_secret()) {
                return Ok(self.super_admin_info());
            }
            warn!(username, "Invalid super admin password");
            return Err(AppError::unauthorized("Invalid username or password"));
        }

        let user = uow
            .users()
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid username or password"))?;

        let matched = match &user.password {
            Some(hashed) => hashed
                .verify(password)
                .map_err(|e| AppError::internal(e.to_string()))?,
            None => false,
        };
        if !matched {
            warn!(username, "Invalid password");
            return Err(AppError::unauthorized("Invalid username or password"));
        }
        if !user.status.is_enabled() {
            return Err(AppError::forbidden("User is disabled"));
        }

        self.user_info(uow, &user.id.to_string()).await
    }

    /// 用户基本信息及启用的角色
    pub async fn user_info(&self, uow: &dyn UnitOfWork, subject: &str) -> AppResult<UserInfo> {
        if self.is_super_admin(subject) {
            return Ok(self.super_admin_info());
        }

        let id = parse_user_id(subject)?;
        let user = self.get(uow, id).await?;
        let role_ids: Vec<RoleId> = user.user_roles.iter().map(|ur| ur.role_id).collect();
        let roles = if role_ids.is_empty() {
            Vec::new()
        } else {
            uow.roles()
                .find_by_ids(&role_ids)
                .await?
                .into_iter()
                .filter(|r| r.status.is_enabled())
                .collect()
        };

        Ok(UserInfo {
            user_id: user.id.to_string(),
            username: user.username,
            real_name: user.real_name,
            roles,
        })
    }

    /// 用户有权访问的菜单树
    ///
    /// 由 用户角色 → 角色菜单 → 启用的菜单 推导，并补齐缺失的祖先节点。
    /// 超级管理员获得全部启用的菜单。
    pub async fn menu_tree(&self, uow: &dyn UnitOfWork, subject: &str) -> AppResult<Vec<MenuTree>> {
        if self.is_super_admin(subject) {
            let menus = uow.menus().query(&MenuQuery::enabled()).await?;
            return Ok(build_tree(menus));
        }

        let no_permission = || AppError::forbidden("User has no menu permission");
        let id = parse_user_id(subject)?;

        let role_ids: Vec<RoleId> = uow
            .user_roles()
            .find_by_user(&id)
            .await?
            .into_iter()
            .map(|ur| ur.role_id)
            .collect();
        if role_ids.is_empty() {
            return Err(no_permission());
        }
        let role_ids: Vec<RoleId> = uow
            .roles()
            .find_by_ids(&role_ids)
            .await?
            .into_iter()
            .filter(|r| r.status.is_enabled())
            .map(|r| r.id)
            .collect();
        if role_ids.is_empty() {
            return Err(no_permission());
        }

        let bindings = uow.role_menus().find_by_roles(&role_ids).await?;
        let mut seen = HashSet::new();
        let menu_ids: Vec<MenuId> = bindings
            .iter()
            .map(|b| b.menu_id)
            .filter(|id| seen.insert(*id))
            .collect();
        if menu_ids.is_empty() {
            return Err(no_permission());
        }

        let mut query = MenuQuery::enabled();
        query.ids = menu_ids;
        let mut menus = uow.menus().query(&query).await?;
        if menus.is_empty() {
            return Err(no_permission());
        }

        let ancestors = missing_ancestor_ids(&menus);
        if !ancestors.is_empty() {
            menus.extend(uow.menus().query(&MenuQuery::by_ids(ancestors)).await?);
        }
        menus.sort_by_key(|m| m.sequence);

        Ok(build_tree(menus))
    }

    fn super_admin_info(&self) -> UserInfo {
        UserInfo {
            user_id: self.super_admin.username.clone(),
            username: self.super_admin.username.clone(),
            real_name: self.super_admin.real_name.clone(),
            roles: Vec::new(),
        }
    }

    async fn find(&self, uow: &dyn UnitOfWork, id: &UserId) -> AppResult<User> {
        uow.users()
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {} not found", id)))
    }

    /// 用户名不能与超级管理员相同，也不能重复
    async fn check_username(&self, uow: &dyn UnitOfWork, username: &str) -> AppResult<()> {
        if self.is_super_admin(username) {
            return Err(AppError::validation(format!(
                "Username '{}' is reserved",
                username
            )));
        }
        if uow.users().find_by_username(username).await?.is_some() {
            return Err(AppError::validation(format!(
                "User '{}' already exists",
                username
            )));
        }
        Ok(())
    }

    async fn check_roles(&self, uow: &dyn UnitOfWork, role_ids: &[RoleId]) -> AppResult<()> {
        for role_id in role_ids {
            if uow.roles().find_by_id(role_id).await?.is_none() {
                return Err(AppError::not_found(format!("Role {} not found", role_id)));
            }
        }
        Ok(())
    }
}

fn hash_password(plain: &str) -> AppResult<HashedPassword> {
    HashedPassword::from_plain(plain).map_err(|e| AppError::validation(e.to_string()))
}

fn parse_user_id(subject: &str) -> AppResult<UserId> {
    subject
        .parse()
        .map_err(|_| AppError::validation(format!("Invalid user id '{}'", subject)))
}

/// 重复的角色只保留一条
fn bindings_of(user_id: UserId, role_ids: &[RoleId]) -> Vec<UserRole> {
    KeyedMap::build(role_ids.iter().map(|role_id| UserRole::new(user_id, *role_id))).into_ordered()
}
