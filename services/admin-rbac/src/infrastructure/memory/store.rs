//! 内存存储
//!
//! 开始事务时复制已提交的状态，提交时整体写回。事务持有存储锁，
//! 同一时刻只有一个 Unit of Work 在执行，等价于串行化隔离。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use backoffice_errors::{AppError, AppResult};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::Status;
use crate::domain::menu::{
    ActionId, ActionResource, ActionResourceRepository, Menu, MenuAction, MenuActionRepository,
    MenuId, MenuQuery, MenuRepository, ResourceId,
};
use crate::domain::policy::{GroupingRule, PermissionRule, PolicyRules, PolicySource};
use crate::domain::role::{
    Role, RoleId, RoleMenu, RoleMenuId, RoleMenuRepository, RoleQuery, RoleRepository,
};
use crate::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use crate::domain::user::{
    User, UserId, UserQuery, UserRepository, UserRole, UserRoleId, UserRoleRepository,
};

/// 全部表的内存副本
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub menus: Vec<Menu>,
    /// 不含资源
    pub actions: Vec<MenuAction>,
    pub resources: Vec<ActionResource>,
    pub roles: Vec<Role>,
    pub role_menus: Vec<RoleMenu>,
    pub users: Vec<User>,
    pub user_roles: Vec<UserRole>,
}

impl MemoryState {
    /// 推导权限规则，只统计启用的角色和用户
    pub fn policy_rules(&self) -> PolicyRules {
        let enabled_role = |id: &RoleId| {
            self.roles
                .iter()
                .any(|r| &r.id == id && r.status.is_enabled())
        };
        let enabled_user = |id: &UserId| {
            self.users
                .iter()
                .any(|u| &u.id == id && u.status.is_enabled())
        };

        let mut permissions = Vec::new();
        for binding in self.role_menus.iter().filter(|b| enabled_role(&b.role_id)) {
            for resource in self
                .resources
                .iter()
                .filter(|r| r.action_id == binding.action_id)
            {
                permissions.push(PermissionRule {
                    role: binding.role_id.to_string(),
                    path: resource.path.clone(),
                    method: resource.method.clone(),
                });
            }
        }

        let groupings = self
            .user_roles
            .iter()
            .filter(|ur| enabled_user(&ur.user_id) && enabled_role(&ur.role_id))
            .map(|ur| GroupingRule {
                user: ur.user_id.to_string(),
                role: ur.role_id.to_string(),
            })
            .collect();

        PolicyRules {
            permissions,
            groupings,
        }
    }
}

/// 内存存储，克隆后共享同一份数据
#[derive(Clone, Default)]
pub struct MemoryStore {
    committed: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
    fail_policy_load: Arc<AtomicBool>,
    commits: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已提交状态的副本
    pub async fn snapshot(&self) -> MemoryState {
        self.committed.lock().await.clone()
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// 让下一次提交失败，数据不写回
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// 控制规则加载是否失败
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_policy_load_failure(&self, fail: bool) {
        self.fail_policy_load.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl UnitOfWorkFactory for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.committed.clone().lock_owned().await;
        let state = guard.clone();
        Ok(Box::new(MemoryUnitOfWork::new(
            Working { guard, state },
            self.clone(),
        )))
    }
}

#[async_trait]
impl PolicySource for MemoryStore {
    async fn load_rules(&self) -> AppResult<PolicyRules> {
        if self.fail_policy_load.load(Ordering::SeqCst) {
            return Err(AppError::database("Policy source unavailable"));
        }
        Ok(self.committed.lock().await.policy_rules())
    }
}

/// 事务内的工作副本
struct Working {
    guard: OwnedMutexGuard<MemoryState>,
    state: MemoryState,
}

type SharedState = Arc<Mutex<Option<Working>>>;

macro_rules! define_memory_repo {
    ($name:ident) => {
        pub struct $name {
            tx: SharedState,
        }

        impl $name {
            fn new(tx: SharedState) -> Self {
                Self { tx }
            }

            async fn with_state<R>(
                &self,
                f: impl FnOnce(&mut MemoryState) -> AppResult<R> + Send,
            ) -> AppResult<R> {
                let mut guard = self.tx.lock().await;
                let working = guard
                    .as_mut()
                    .ok_or_else(|| AppError::internal("Transaction consumed"))?;
                f(&mut working.state)
            }
        }
    };
}

define_memory_repo!(MemoryMenuRepository);
define_memory_repo!(MemoryMenuActionRepository);
define_memory_repo!(MemoryActionResourceRepository);
define_memory_repo!(MemoryRoleRepository);
define_memory_repo!(MemoryRoleMenuRepository);
define_memory_repo!(MemoryUserRepository);
define_memory_repo!(MemoryUserRoleRepository);

/// 内存 Unit of Work
pub struct MemoryUnitOfWork {
    tx: SharedState,
    store: MemoryStore,
    menu_repo: MemoryMenuRepository,
    action_repo: MemoryMenuActionRepository,
    resource_repo: MemoryActionResourceRepository,
    role_repo: MemoryRoleRepository,
    role_menu_repo: MemoryRoleMenuRepository,
    user_repo: MemoryUserRepository,
    user_role_repo: MemoryUserRoleRepository,
}

impl MemoryUnitOfWork {
    fn new(working: Working, store: MemoryStore) -> Self {
        let tx: SharedState = Arc::new(Mutex::new(Some(working)));
        Self {
            tx: tx.clone(),
            store,
            menu_repo: MemoryMenuRepository::new(tx.clone()),
            action_repo: MemoryMenuActionRepository::new(tx.clone()),
            resource_repo: MemoryActionResourceRepository::new(tx.clone()),
            role_repo: MemoryRoleRepository::new(tx.clone()),
            role_menu_repo: MemoryRoleMenuRepository::new(tx.clone()),
            user_repo: MemoryUserRepository::new(tx.clone()),
            user_role_repo: MemoryUserRoleRepository::new(tx),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn menus(&self) -> &dyn MenuRepository {
        &self.menu_repo
    }

    fn actions(&self) -> &dyn MenuActionRepository {
        &self.action_repo
    }

    fn resources(&self) -> &dyn ActionResourceRepository {
        &self.resource_repo
    }

    fn roles(&self) -> &dyn RoleRepository {
        &self.role_repo
    }

    fn role_menus(&self) -> &dyn RoleMenuRepository {
        &self.role_menu_repo
    }

    fn users(&self) -> &dyn UserRepository {
        &self.user_repo
    }

    fn user_roles(&self) -> &dyn UserRoleRepository {
        &self.user_role_repo
    }

    async fn commit(&self) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        let Working {
            guard: mut committed,
            state,
        } = guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;

        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(AppError::database("Failed to commit transaction: injected failure"));
        }

        *committed = state;
        self.store.commits.fetch_add(1, Ordering::SeqCst);
        debug!("Memory transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> AppResult<()> {
        let mut guard = self.tx.lock().await;
        guard
            .take()
            .ok_or_else(|| AppError::internal("Transaction already consumed"))?;
        debug!("Memory transaction rolled back");
        Ok(())
    }
}

fn sorted_by_sequence(mut menus: Vec<Menu>) -> Vec<Menu> {
    menus.sort_by_key(|m| m.sequence);
    menus
}

#[async_trait]
impl MenuRepository for MemoryMenuRepository {
    async fn create(&self, menu: &Menu) -> AppResult<()> {
        let menu = Menu {
            actions: Vec::new(),
            ..menu.clone()
        };
        self.with_state(move |s| {
            if s.menus.iter().any(|m| m.id == menu.id) {
                return Err(AppError::conflict(format!("Menu {} already exists", menu.id)));
            }
            s.menus.push(menu);
            Ok(())
        })
        .await
    }

    async fn update(&self, menu: &Menu) -> AppResult<()> {
        let menu = menu.clone();
        self.with_state(move |s| {
            if let Some(existing) = s.menus.iter_mut().find(|m| m.id == menu.id) {
                *existing = Menu {
                    actions: Vec::new(),
                    created_at: existing.created_at,
                    created_by: existing.created_by.clone(),
                    ..menu
                };
            }
            Ok(())
        })
        .await
    }

    async fn update_status(&self, id: &MenuId, status: Status) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            if let Some(menu) = s.menus.iter_mut().find(|m| m.id == id) {
                menu.status = status;
            }
            Ok(())
        })
        .await
    }

    async fn update_parent_path(&self, id: &MenuId, parent_path: &str) -> AppResult<()> {
        let id = *id;
        let parent_path = parent_path.to_string();
        self.with_state(move |s| {
            if let Some(menu) = s.menus.iter_mut().find(|m| m.id == id) {
                menu.parent_path = parent_path;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &MenuId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.menus.retain(|m| m.id != id);
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &MenuId) -> AppResult<Option<Menu>> {
        let id = *id;
        self.with_state(move |s| Ok(s.menus.iter().find(|m| m.id == id).cloned()))
            .await
    }

    async fn query(&self, query: &MenuQuery) -> AppResult<Vec<Menu>> {
        let query = query.clone();
        self.with_state(move |s| {
            Ok(sorted_by_sequence(
                s.menus.iter().filter(|m| query.matches(m)).cloned().collect(),
            ))
        })
        .await
    }

    async fn find_sibling_by_name(
        &self,
        parent_id: Option<&MenuId>,
        name: &str,
    ) -> AppResult<Option<Menu>> {
        let parent_id = parent_id.copied();
        let name = name.to_string();
        self.with_state(move |s| {
            Ok(s
                .menus
                .iter()
                .find(|m| m.parent_id == parent_id && m.name == name)
                .cloned())
        })
        .await
    }

    async fn count_children(&self, id: &MenuId) -> AppResult<i64> {
        let id = *id;
        self.with_state(move |s| {
            Ok(s.menus.iter().filter(|m| m.parent_id == Some(id)).count() as i64)
        })
        .await
    }

    async fn count(&self) -> AppResult<i64> {
        self.with_state(|s| Ok(s.menus.len() as i64)).await
    }
}

#[async_trait]
impl MenuActionRepository for MemoryMenuActionRepository {
    async fn create(&self, action: &MenuAction) -> AppResult<()> {
        let action = MenuAction {
            resources: Vec::new(),
            ..action.clone()
        };
        self.with_state(move |s| {
            if !s.menus.iter().any(|m| m.id == action.menu_id) {
                return Err(AppError::validation(format!(
                    "Menu {} does not exist",
                    action.menu_id
                )));
            }
            if s
                .actions
                .iter()
                .any(|a| a.menu_id == action.menu_id && a.code == action.code)
            {
                return Err(AppError::conflict(format!(
                    "Action code '{}' already exists",
                    action.code
                )));
            }
            s.actions.push(action);
            Ok(())
        })
        .await
    }

    async fn update(&self, action: &MenuAction) -> AppResult<()> {
        let action = action.clone();
        self.with_state(move |s| {
            if let Some(existing) = s.actions.iter_mut().find(|a| a.id == action.id) {
                existing.code = action.code;
                existing.name = action.name;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &ActionId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.actions.retain(|a| a.id != id);
            Ok(())
        })
        .await
    }

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()> {
        let menu_id = *menu_id;
        self.with_state(move |s| {
            s.actions.retain(|a| a.menu_id != menu_id);
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &ActionId) -> AppResult<Option<MenuAction>> {
        let id = *id;
        self.with_state(move |s| Ok(s.actions.iter().find(|a| a.id == id).cloned()))
            .await
    }

    async fn find_by_menus(&self, menu_ids: &[MenuId]) -> AppResult<Vec<MenuAction>> {
        let menu_ids = menu_ids.to_vec();
        self.with_state(move |s| {
            Ok(s.actions
                .iter()
                .filter(|a| menu_ids.contains(&a.menu_id))
                .cloned()
                .collect())
        })
        .await
    }
}

#[async_trait]
impl ActionResourceRepository for MemoryActionResourceRepository {
    async fn create(&self, resource: &ActionResource) -> AppResult<()> {
        let resource = resource.clone();
        self.with_state(move |s| {
            if s.resources.iter().any(|r| {
                r.action_id == resource.action_id
                    && r.method == resource.method
                    && r.path == resource.path
            }) {
                return Err(AppError::conflict(format!(
                    "Resource {} {} already exists",
                    resource.method, resource.path
                )));
            }
            s.resources.push(resource);
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &ResourceId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.resources.retain(|r| r.id != id);
            Ok(())
        })
        .await
    }

    async fn delete_by_action(&self, action_id: &ActionId) -> AppResult<()> {
        let action_id = *action_id;
        self.with_state(move |s| {
            s.resources.retain(|r| r.action_id != action_id);
            Ok(())
        })
        .await
    }

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()> {
        let menu_id = *menu_id;
        self.with_state(move |s| {
            let action_ids: Vec<ActionId> = s
                .actions
                .iter()
                .filter(|a| a.menu_id == menu_id)
                .map(|a| a.id)
                .collect();
            s.resources.retain(|r| !action_ids.contains(&r.action_id));
            Ok(())
        })
        .await
    }

    async fn find_by_actions(&self, action_ids: &[ActionId]) -> AppResult<Vec<ActionResource>> {
        let action_ids = action_ids.to_vec();
        self.with_state(move |s| {
            Ok(s.resources
                .iter()
                .filter(|r| action_ids.contains(&r.action_id))
                .cloned()
                .collect())
        })
        .await
    }
}

#[async_trait]
impl RoleRepository for MemoryRoleRepository {
    async fn create(&self, role: &Role) -> AppResult<()> {
        let role = Role {
            role_menus: Vec::new(),
            ..role.clone()
        };
        self.with_state(move |s| {
            if s.roles.iter().any(|r| r.name == role.name) {
                return Err(AppError::conflict(format!("Role '{}' already exists", role.name)));
            }
            s.roles.push(role);
            Ok(())
        })
        .await
    }

    async fn update(&self, role: &Role) -> AppResult<()> {
        let role = role.clone();
        self.with_state(move |s| {
            if let Some(existing) = s.roles.iter_mut().find(|r| r.id == role.id) {
                existing.name = role.name;
                existing.remark = role.remark;
                existing.sequence = role.sequence;
                existing.status = role.status;
                existing.updated_at = role.updated_at;
            }
            Ok(())
        })
        .await
    }

    async fn update_status(&self, id: &RoleId, status: Status) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            if let Some(role) = s.roles.iter_mut().find(|r| r.id == id) {
                role.status = status;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &RoleId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.roles.retain(|r| r.id != id);
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &RoleId) -> AppResult<Option<Role>> {
        let id = *id;
        self.with_state(move |s| Ok(s.roles.iter().find(|r| r.id == id).cloned()))
            .await
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        let name = name.to_string();
        self.with_state(move |s| Ok(s.roles.iter().find(|r| r.name == name).cloned()))
            .await
    }

    async fn find_by_ids(&self, ids: &[RoleId]) -> AppResult<Vec<Role>> {
        let ids = ids.to_vec();
        self.with_state(move |s| {
            Ok(s.roles
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn query(&self, query: &RoleQuery) -> AppResult<Vec<Role>> {
        let query = query.clone();
        self.with_state(move |s| {
            let mut roles: Vec<Role> = s
                .roles
                .iter()
                .filter(|r| query.matches(r, &s.user_roles))
                .cloned()
                .collect();
            roles.sort_by_key(|r| (r.sequence, r.id));
            Ok(roles)
        })
        .await
    }
}

#[async_trait]
impl RoleMenuRepository for MemoryRoleMenuRepository {
    async fn create(&self, binding: &RoleMenu) -> AppResult<()> {
        let binding = binding.clone();
        self.with_state(move |s| {
            s.role_menus.push(binding);
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &RoleMenuId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.role_menus.retain(|b| b.id != id);
            Ok(())
        })
        .await
    }

    async fn delete_by_role(&self, role_id: &RoleId) -> AppResult<()> {
        let role_id = *role_id;
        self.with_state(move |s| {
            s.role_menus.retain(|b| b.role_id != role_id);
            Ok(())
        })
        .await
    }

    async fn delete_by_menu(&self, menu_id: &MenuId) -> AppResult<()> {
        let menu_id = *menu_id;
        self.with_state(move |s| {
            s.role_menus.retain(|b| b.menu_id != menu_id);
            Ok(())
        })
        .await
    }

    async fn delete_by_action(&self, action_id: &ActionId) -> AppResult<()> {
        let action_id = *action_id;
        self.with_state(move |s| {
            s.role_menus.retain(|b| b.action_id != action_id);
            Ok(())
        })
        .await
    }

    async fn find_by_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<RoleMenu>> {
        let role_ids = role_ids.to_vec();
        self.with_state(move |s| {
            Ok(s.role_menus
                .iter()
                .filter(|b| role_ids.contains(&b.role_id))
                .cloned()
                .collect())
        })
        .await
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: &User) -> AppResult<()> {
        let user = User {
            user_roles: Vec::new(),
            ..user.clone()
        };
        self.with_state(move |s| {
            if s.users.iter().any(|u| u.username == user.username) {
                return Err(AppError::conflict(format!(
                    "User '{}' already exists",
                    user.username
                )));
            }
            s.users.push(user);
            Ok(())
        })
        .await
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        let user = user.clone();
        self.with_state(move |s| {
            if let Some(existing) = s.users.iter_mut().find(|u| u.id == user.id) {
                existing.username = user.username;
                existing.real_name = user.real_name;
                existing.email = user.email;
                existing.phone = user.phone;
                existing.status = user.status;
                existing.updated_at = user.updated_at;
                if user.password.is_some() {
                    existing.password = user.password;
                }
            }
            Ok(())
        })
        .await
    }

    async fn update_status(&self, id: &UserId, status: Status) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            if let Some(user) = s.users.iter_mut().find(|u| u.id == id) {
                user.status = status;
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &UserId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.users.retain(|u| u.id != id);
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &UserId) -> AppResult<Option<User>> {
        let id = *id;
        self.with_state(move |s| Ok(s.users.iter().find(|u| u.id == id).cloned()))
            .await
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let username = username.to_string();
        self.with_state(move |s| Ok(s.users.iter().find(|u| u.username == username).cloned()))
            .await
    }

    async fn query(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let query = query.clone();
        self.with_state(move |s| {
            let mut users: Vec<User> = s
                .users
                .iter()
                .filter(|u| query.matches(u, &s.user_roles))
                .map(|u| User {
                    password: None,
                    ..u.clone()
                })
                .collect();
            users.sort_by_key(|u| (u.created_at, u.id));
            Ok(users)
        })
        .await
    }
}

#[async_trait]
impl UserRoleRepository for MemoryUserRoleRepository {
    async fn create(&self, binding: &UserRole) -> AppResult<()> {
        let binding = binding.clone();
        self.with_state(move |s| {
            s.user_roles.push(binding);
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &UserRoleId) -> AppResult<()> {
        let id = *id;
        self.with_state(move |s| {
            s.user_roles.retain(|b| b.id != id);
            Ok(())
        })
        .await
    }

    async fn delete_by_user(&self, user_id: &UserId) -> AppResult<()> {
        let user_id = *user_id;
        self.with_state(move |s| {
            s.user_roles.retain(|b| b.user_id != user_id);
            Ok(())
        })
        .await
    }

    async fn find_by_user(&self, user_id: &UserId) -> AppResult<Vec<UserRole>> {
        let user_id = *user_id;
        self.with_state(move |s| {
            Ok(s.user_roles
                .iter()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn find_by_users(&self, user_ids: &[UserId]) -> AppResult<Vec<UserRole>> {
        let user_ids = user_ids.to_vec();
        self.with_state(move |s| {
            Ok(s.user_roles
                .iter()
                .filter(|b| user_ids.contains(&b.user_id))
                .cloned()
                .collect())
        })
        .await
    }

    async fn exists_by_role(&self, role_id: &RoleId) -> AppResult<bool> {
        let role_id = *role_id;
        self.with_state(move |s| Ok(s.user_roles.iter().any(|b| b.role_id == role_id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_writes_back() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();
        uow.menus().create(&Menu::new("System", None)).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.snapshot().await.menus.len(), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_changes() {
        let store = MemoryStore::new();

        let uow = store.begin().await.unwrap();
        uow.menus().create(&Menu::new("System", None)).await.unwrap();
        uow.rollback().await.unwrap();

        let uow = store.begin().await.unwrap();
        uow.menus().create(&Menu::new("Other", None)).await.unwrap();
        drop(uow);

        assert!(store.snapshot().await.menus.is_empty());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_consumed_transaction_rejects_calls() {
        let store = MemoryStore::new();
        let uow = store.begin().await.unwrap();
        uow.commit().await.unwrap();

        assert!(uow.menus().count().await.is_err());
        assert!(uow.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_injected_commit_failure() {
        let store = MemoryStore::new();
        store.fail_next_commit();

        let uow = store.begin().await.unwrap();
        uow.menus().create(&Menu::new("System", None)).await.unwrap();
        assert!(matches!(uow.commit().await, Err(AppError::Database(_))));
        assert!(store.snapshot().await.menus.is_empty());
    }

    #[tokio::test]
    async fn test_policy_rules_skip_disabled() {
        let mut state = MemoryState::default();
        let menu = Menu::new("Menus", None);
        let mut action = MenuAction::new(menu.id, "view", "View");
        action.resources.clear();
        let resource = ActionResource::new(action.id, "GET", "/api/v1/menus");

        let active = Role::new("active");
        let mut disabled = Role::new("disabled");
        disabled.status = Status::Disabled;
        let alice = User::new("alice", "Alice");
        let mut bob = User::new("bob", "Bob");
        bob.status = Status::Disabled;

        state.role_menus.push(RoleMenu::new(active.id, menu.id, action.id));
        state.role_menus.push(RoleMenu::new(disabled.id, menu.id, action.id));
        state.user_roles.push(UserRole::new(alice.id, active.id));
        state.user_roles.push(UserRole::new(alice.id, disabled.id));
        state.user_roles.push(UserRole::new(bob.id, active.id));
        state.menus.push(menu);
        state.actions.push(action);
        state.resources.push(resource);
        state.roles.extend([active.clone(), disabled]);
        state.users.extend([alice.clone(), bob]);

        let rules = state.policy_rules();
        assert_eq!(rules.permissions.len(), 1);
        assert_eq!(rules.permissions[0].role, active.id.to_string());
        assert_eq!(rules.groupings.len(), 1);
        assert_eq!(rules.groupings[0].user, alice.id.to_string());
    }
}
